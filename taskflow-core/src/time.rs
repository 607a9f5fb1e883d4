//! Time utilities: timezone-aware due dates and an injectable clock.

use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Wall-clock formats accepted for a due date.
const DUE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

/// Resolve a due date typed as local wall-clock time in the IANA zone `tz`.
///
/// A time repeated by a DST fall-back resolves to its first occurrence. A time
/// skipped by spring-forward does not exist and is rejected.
pub fn parse_local_due(local: &str, tz: &str) -> Result<DateTime<Utc>> {
    let zone: Tz = tz
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown timezone '{tz}'"))?;

    let text = local.trim();
    let wall = DUE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .ok_or_else(|| anyhow::anyhow!("due date '{text}' is not YYYY-MM-DD HH:MM"))?;

    match zone.from_local_datetime(&wall) {
        LocalResult::Single(at) | LocalResult::Ambiguous(at, _) => Ok(at.with_timezone(&Utc)),
        LocalResult::None => anyhow::bail!("{text} does not exist in {zone} (skipped by a DST change)"),
    }
}

/// Calendar day of `instant` as seen in `tz`.
pub fn local_day(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}
