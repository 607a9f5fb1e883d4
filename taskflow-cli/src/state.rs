use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// `$TASKFLOW_HOME`, or `~/.taskflow`.
pub fn taskflow_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TASKFLOW_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".taskflow"))
}

pub fn ensure_taskflow_home() -> Result<PathBuf> {
    let dir = taskflow_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn tasks_path() -> Result<PathBuf> {
    Ok(ensure_taskflow_home()?.join("tasks.json"))
}

pub fn reminders_dir() -> Result<PathBuf> {
    let dir = ensure_taskflow_home()?.join("reminders");
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Write via a sibling temp file and rename, so readers never see a torn file.
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
