use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use taskflow_core::{Priority, Settings, SortOption};

use crate::state::{ensure_taskflow_home, write_atomic};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub notifications: NotificationsSection,
    pub tasks: TasksSection,
    pub display: DisplaySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsSection {
    pub enabled: bool,
    /// Minutes before due for the default reminder.
    pub lead_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksSection {
    pub default_priority: Priority,
    pub sort: SortOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    /// IANA timezone used to read and print due dates.
    pub timezone: String,
}

impl Default for NotificationsSection {
    fn default() -> Self {
        let s = Settings::default();
        Self {
            enabled: s.notifications_enabled,
            lead_minutes: s.default_lead_minutes,
        }
    }
}

impl Default for TasksSection {
    fn default() -> Self {
        let s = Settings::default();
        Self {
            default_priority: s.default_priority,
            sort: s.sort_option,
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

impl Config {
    pub fn settings(&self) -> Settings {
        Settings {
            default_priority: self.tasks.default_priority,
            notifications_enabled: self.notifications.enabled,
            default_lead_minutes: self.notifications.lead_minutes,
            sort_option: self.tasks.sort,
        }
    }

    pub fn apply_settings(&mut self, s: &Settings) {
        self.tasks.default_priority = s.default_priority;
        self.tasks.sort = s.sort_option;
        self.notifications.enabled = s.notifications_enabled;
        self.notifications.lead_minutes = s.default_lead_minutes;
    }

    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.display
            .timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid timezone in config: {}", self.display.timezone))
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_taskflow_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    let cfg: Config = toml::from_str(&s).context("parse config.toml")?;
    if let Err(e) = cfg.settings().validate() {
        bail!("invalid config {}: {e}", p.display());
    }
    Ok(cfg)
}

pub fn save_config(cfg: &Config) -> Result<()> {
    save_config_to(&config_path()?, cfg)
}

pub fn save_config_to(p: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    write_atomic(p, &s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg.settings(), Settings::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");

        let mut cfg = Config::default();
        cfg.apply_settings(&Settings {
            default_priority: Priority::High,
            notifications_enabled: false,
            default_lead_minutes: 15,
            sort_option: SortOption::DueDate,
        });
        cfg.display.timezone = "Europe/Rome".to_string();
        save_config_to(&p, &cfg).unwrap();

        let loaded = load_config_from(&p).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.timezone().unwrap(), chrono_tz::Europe::Rome);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(&p, "[notifications]\nlead_minutes = 30\n").unwrap();

        let s = load_config_from(&p).unwrap().settings();
        assert_eq!(s.default_lead_minutes, 30);
        assert!(s.notifications_enabled);
        assert_eq!(s.sort_option, SortOption::Priority);
    }

    #[test]
    fn rejects_oversized_lead() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(&p, "[notifications]\nlead_minutes = 99999\n").unwrap();
        assert!(load_config_from(&p).is_err());
    }
}
