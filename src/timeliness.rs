// src/timeliness.rs
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::records::{TimeEntry, UNKNOWN};

// --- Submission timestamp parsing ---

// Trailing `Z` or `+HH:MM` / `-HHMM` after a clock time.
static TZ_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?)(?:Z|[+-]\d{2}:?\d{2})$")
        .expect("Invalid timezone suffix regex")
});

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parses a submission timestamp, ignoring any timezone suffix. If no full date-time
/// format fits, the first ten characters are tried as a plain date (midnight).
pub fn parse_submission_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    let cleaned = TZ_SUFFIX.replace(trimmed, "$1");

    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return Some(parsed);
        }
    }

    let date_part = cleaned.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// --- Timeliness records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TimelinessCategory {
    #[serde(rename = "Same Day")]
    SameDay,
    #[serde(rename = "1 Day Late")]
    OneDayLate,
    #[serde(rename = "2 Days Late")]
    TwoDaysLate,
    #[serde(rename = "3+ Days Late")]
    ThreePlusDaysLate,
}

impl TimelinessCategory {
    /// Display order, earliest first.
    pub const ALL: [TimelinessCategory; 4] = [
        TimelinessCategory::SameDay,
        TimelinessCategory::OneDayLate,
        TimelinessCategory::TwoDaysLate,
        TimelinessCategory::ThreePlusDaysLate,
    ];

    /// Submissions on or before the work date count as same day.
    pub fn from_delay(delay_days: i64) -> Self {
        match delay_days {
            d if d <= 0 => TimelinessCategory::SameDay,
            1 => TimelinessCategory::OneDayLate,
            2 => TimelinessCategory::TwoDaysLate,
            _ => TimelinessCategory::ThreePlusDaysLate,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimelinessCategory::SameDay => "Same Day",
            TimelinessCategory::OneDayLate => "1 Day Late",
            TimelinessCategory::TwoDaysLate => "2 Days Late",
            TimelinessCategory::ThreePlusDaysLate => "3+ Days Late",
        }
    }
}

impl std::fmt::Display for TimelinessCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinessRecord {
    pub entry_id: i64,
    pub work_date: NaiveDate,
    pub submission_date: NaiveDate,
    pub delay_days: i64,
    pub category: TimelinessCategory,
    pub employee_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub hours: Decimal,
}

/// One record per entry that has both a work date and a parseable submission
/// timestamp. Entries missing either are left out of the population entirely.
pub fn analyze(entries: &[TimeEntry]) -> Vec<TimelinessRecord> {
    let records: Vec<TimelinessRecord> = entries.iter().filter_map(timeliness_of).collect();
    debug!(
        "Timeliness analysis kept {} of {} entries",
        records.len(),
        entries.len()
    );
    records
}

fn timeliness_of(entry: &TimeEntry) -> Option<TimelinessRecord> {
    let work_date = entry.work_date?;
    let submission_date = entry.submitted_at?.date();
    let delay_days = (submission_date - work_date).num_days();

    Some(TimelinessRecord {
        entry_id: entry.id,
        work_date,
        submission_date,
        delay_days,
        category: TimelinessCategory::from_delay(delay_days),
        employee_name: entry
            .employee_name()
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        hours: entry.hours,
    })
}
