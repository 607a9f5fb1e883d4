//! Repeat rules and next-occurrence arithmetic.
//!
//! Weekday/weekend checks use the UTC calendar of the due instant. Callers
//! that care about local days should convert first (see `crate::time`).

use chrono::{DateTime, Datelike, Duration, Months, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatRule {
    #[default]
    Never,
    Hourly,
    Daily,
    Weekdays,
    Weekends,
    Weekly,
    Monthly,
    Quarterly,
    Biannually,
    Yearly,
}

impl RepeatRule {
    pub const ALL: [RepeatRule; 10] = [
        RepeatRule::Never,
        RepeatRule::Hourly,
        RepeatRule::Daily,
        RepeatRule::Weekdays,
        RepeatRule::Weekends,
        RepeatRule::Weekly,
        RepeatRule::Monthly,
        RepeatRule::Quarterly,
        RepeatRule::Biannually,
        RepeatRule::Yearly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RepeatRule::Never => "never",
            RepeatRule::Hourly => "hourly",
            RepeatRule::Daily => "daily",
            RepeatRule::Weekdays => "weekdays",
            RepeatRule::Weekends => "weekends",
            RepeatRule::Weekly => "weekly",
            RepeatRule::Monthly => "monthly",
            RepeatRule::Quarterly => "quarterly",
            RepeatRule::Biannually => "biannually",
            RepeatRule::Yearly => "yearly",
        }
    }

    /// The first occurrence strictly after `due`, or `None` for `Never`.
    ///
    /// Month-based rules clamp to the last day of shorter months
    /// (Jan 31 + 1 month = Feb 28/29).
    pub fn next_occurrence(self, due: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            RepeatRule::Never => None,
            RepeatRule::Hourly => Some(due + Duration::hours(1)),
            RepeatRule::Daily => Some(due + Duration::days(1)),
            RepeatRule::Weekdays => Some(next_matching_day(due, |d| !is_weekend(d))),
            RepeatRule::Weekends => Some(next_matching_day(due, is_weekend)),
            RepeatRule::Weekly => Some(due + Duration::weeks(1)),
            RepeatRule::Monthly => due.checked_add_months(Months::new(1)),
            RepeatRule::Quarterly => due.checked_add_months(Months::new(3)),
            RepeatRule::Biannually => due.checked_add_months(Months::new(6)),
            RepeatRule::Yearly => due.checked_add_months(Months::new(12)),
        }
    }
}

impl std::fmt::Display for RepeatRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RepeatRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| format!("unknown repeat rule: {s}"))
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

fn next_matching_day(due: DateTime<Utc>, accept: impl Fn(Weekday) -> bool) -> DateTime<Utc> {
    let mut next = due + Duration::days(1);
    while !accept(next.weekday()) {
        next += Duration::days(1);
    }
    next
}
