// src/reporting.rs
//
// Aggregates over reconciliation and timeliness output. Grouping goes through
// `BTreeMap` so equal sort keys come out in name order on every run.

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::reconciliation::{MissingEntryRecord, ReconciliationOutcome, Urgency};
use crate::records::UNKNOWN;
use crate::roster::ManagerMapping;
use crate::timeliness::{TimelinessCategory, TimelinessRecord};

pub const MIN_RANKED_ENTRIES: usize = 3;
pub const RANKING_SIZE: usize = 10;
pub const VOLUME_RANKING_SIZE: usize = 15;
pub const WEEKLY_TREND_THRESHOLD_DAYS: i64 = 14;

/// Share of logged entries among all scheduled work, in percent. Nothing scheduled and
/// nothing logged counts as fully compliant.
pub fn compliance_rate(logged: usize, missing: usize) -> f64 {
    let total = logged + missing;
    if total == 0 {
        100.0
    } else {
        logged as f64 / total as f64 * 100.0
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn mean(sum: i64, count: usize) -> Option<f64> {
    (count > 0).then(|| sum as f64 / count as f64)
}

// --- Compliance summary ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrgencyCount {
    pub urgency: Urgency,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceSummary {
    pub compliance_rate: f64,
    pub missing_entries: usize,
    pub logged_entries: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_hours_missing: Decimal,
    /// High, Medium, Low, in that order.
    pub urgency_breakdown: Vec<UrgencyCount>,
}

pub fn summarize(outcome: &ReconciliationOutcome) -> ComplianceSummary {
    let urgency_breakdown = Urgency::ALL
        .iter()
        .map(|u| UrgencyCount {
            urgency: *u,
            count: outcome.records.iter().filter(|r| r.urgency == *u).count(),
        })
        .collect();

    ComplianceSummary {
        compliance_rate: compliance_rate(outcome.timesheet_entry_count, outcome.missing_count),
        missing_entries: outcome.missing_count,
        logged_entries: outcome.timesheet_entry_count,
        total_hours_missing: outcome.records.iter().map(|r| r.allocated_hours).sum(),
        urgency_breakdown,
    }
}

// --- Timeliness ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: TimelinessCategory,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinessSummary {
    pub total_entries: usize,
    pub same_day_rate: f64,
    pub late_entries: usize,
    /// `None` when there is nothing to average.
    pub average_delay: Option<f64>,
    pub very_late_entries: usize,
    pub distribution: Vec<CategoryCount>,
}

pub fn timeliness_summary(records: &[TimelinessRecord]) -> TimelinessSummary {
    let same_day = records
        .iter()
        .filter(|r| r.category == TimelinessCategory::SameDay)
        .count();

    TimelinessSummary {
        total_entries: records.len(),
        same_day_rate: percent(same_day, records.len()),
        late_entries: records.iter().filter(|r| r.delay_days > 0).count(),
        average_delay: mean(records.iter().map(|r| r.delay_days).sum(), records.len()),
        very_late_entries: records.iter().filter(|r| r.delay_days >= 3).count(),
        distribution: TimelinessCategory::ALL
            .iter()
            .map(|c| CategoryCount {
                category: *c,
                count: records.iter().filter(|r| r.category == *c).count(),
            })
            .collect(),
    }
}

#[derive(Debug, Default)]
struct DelayTally {
    entries: usize,
    delay_sum: i64,
    same_day: usize,
    hours: Decimal,
}

impl DelayTally {
    fn add(&mut self, record: &TimelinessRecord) {
        self.entries += 1;
        self.delay_sum += record.delay_days;
        if record.category == TimelinessCategory::SameDay {
            self.same_day += 1;
        }
        self.hours += record.hours;
    }

    fn average_delay(&self) -> f64 {
        mean(self.delay_sum, self.entries).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTimeliness {
    pub work_date: NaiveDate,
    pub total_entries: usize,
    pub average_delay: f64,
    pub same_day_count: usize,
    pub same_day_rate: f64,
}

/// One row per work date, oldest first.
pub fn daily_trend(records: &[TimelinessRecord]) -> Vec<DailyTimeliness> {
    let mut by_date: BTreeMap<NaiveDate, DelayTally> = BTreeMap::new();
    for record in records {
        by_date.entry(record.work_date).or_default().add(record);
    }
    by_date
        .into_iter()
        .map(|(work_date, tally)| DailyTimeliness {
            work_date,
            total_entries: tally.entries,
            average_delay: tally.average_delay(),
            same_day_count: tally.same_day,
            same_day_rate: percent(tally.same_day, tally.entries),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeTimeliness {
    pub employee_name: String,
    pub total_entries: usize,
    pub average_delay: f64,
    pub same_day_count: usize,
    pub same_day_rate: f64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_hours: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmployeeRanking {
    /// Every ranked employee, best same-day rate first.
    pub ranked: Vec<EmployeeTimeliness>,
    pub top_performers: Vec<EmployeeTimeliness>,
    pub bottom_performers: Vec<EmployeeTimeliness>,
    pub top_by_volume: Vec<EmployeeTimeliness>,
}

/// Ranks employees with at least `MIN_RANKED_ENTRIES` entries by same-day rate.
/// Entries without an employee are ranked under "Unknown".
pub fn employee_ranking(records: &[TimelinessRecord]) -> EmployeeRanking {
    let mut by_employee: BTreeMap<&str, DelayTally> = BTreeMap::new();
    for record in records {
        by_employee
            .entry(record.employee_name.as_str())
            .or_default()
            .add(record);
    }

    let mut ranked: Vec<EmployeeTimeliness> = by_employee
        .into_iter()
        .filter(|(_, tally)| tally.entries >= MIN_RANKED_ENTRIES)
        .map(|(name, tally)| EmployeeTimeliness {
            employee_name: name.to_string(),
            total_entries: tally.entries,
            average_delay: tally.average_delay(),
            same_day_count: tally.same_day,
            same_day_rate: percent(tally.same_day, tally.entries),
            total_hours: tally.hours,
        })
        .collect();
    ranked.sort_by(|a, b| b.same_day_rate.total_cmp(&a.same_day_rate));

    let top_performers = ranked.iter().take(RANKING_SIZE).cloned().collect();
    let bottom_performers = ranked[ranked.len().saturating_sub(RANKING_SIZE)..].to_vec();

    let mut top_by_volume = ranked.clone();
    top_by_volume.sort_by(|a, b| b.total_entries.cmp(&a.total_entries));
    top_by_volume.truncate(VOLUME_RANKING_SIZE);

    EmployeeRanking {
        ranked,
        top_performers,
        bottom_performers,
        top_by_volume,
    }
}

// --- Missing-entry breakdowns ---

#[derive(Debug, Default)]
struct MissingTally<'a> {
    entries: usize,
    hours: Decimal,
    high: usize,
    medium: usize,
    low: usize,
    max_days_overdue: i64,
    designers: BTreeSet<&'a str>,
}

impl<'a> MissingTally<'a> {
    fn add(&mut self, record: &'a MissingEntryRecord) {
        if self.entries == 0 || record.days_overdue > self.max_days_overdue {
            self.max_days_overdue = record.days_overdue;
        }
        self.entries += 1;
        self.hours += record.allocated_hours;
        match record.urgency {
            Urgency::High => self.high += 1,
            Urgency::Medium => self.medium += 1,
            Urgency::Low => self.low += 1,
        }
        self.designers.insert(record.designer.as_str());
    }
}

fn tally_by<'a, K, F>(
    records: impl IntoIterator<Item = &'a MissingEntryRecord>,
    key: F,
) -> Vec<(K, MissingTally<'a>)>
where
    K: Ord,
    F: Fn(&'a MissingEntryRecord) -> K,
{
    let mut groups: BTreeMap<K, MissingTally<'a>> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().add(record);
    }
    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|a, b| b.1.entries.cmp(&a.1.entries));
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesignerMetrics {
    pub designer: String,
    pub missing_entries: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_hours_missing: Decimal,
    pub high_urgency: usize,
    pub medium_urgency: usize,
    pub low_urgency: usize,
    pub max_days_overdue: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub risk_score: Decimal,
}

/// Per-designer counts, most missing entries first. Risk weighs a high-urgency slot at
/// 10, a medium one at 3 and each missing hour at 0.5.
pub fn designer_metrics<'a>(
    records: impl IntoIterator<Item = &'a MissingEntryRecord>,
) -> Vec<DesignerMetrics> {
    tally_by(records, |r| r.designer.as_str())
        .into_iter()
        .map(|(designer, t)| DesignerMetrics {
            designer: designer.to_string(),
            missing_entries: t.entries,
            total_hours_missing: t.hours,
            high_urgency: t.high,
            medium_urgency: t.medium,
            low_urgency: t.low,
            max_days_overdue: t.max_days_overdue,
            risk_score: Decimal::from(t.high * 10)
                + Decimal::from(t.medium * 3)
                + t.hours * Decimal::new(5, 1),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectMetrics {
    pub project: String,
    pub missing_entries: usize,
    pub unique_designers: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_hours_missing: Decimal,
    pub high_urgency: usize,
}

pub fn project_metrics(records: &[MissingEntryRecord]) -> Vec<ProjectMetrics> {
    tally_by(records, |r| r.project.as_str())
        .into_iter()
        .map(|(project, t)| ProjectMetrics {
            project: project.to_string(),
            missing_entries: t.entries,
            unique_designers: t.designers.len(),
            total_hours_missing: t.hours,
            high_urgency: t.high,
        })
        .collect()
}

/// Designers with missing entries on one project.
pub fn project_drill_down(records: &[MissingEntryRecord], project: &str) -> Vec<DesignerMetrics> {
    designer_metrics(records.iter().filter(|r| r.project == project))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerMetrics {
    pub manager: String,
    pub missing_entries: usize,
    pub unique_designers: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_hours_missing: Decimal,
}

pub fn manager_of<'a>(mapping: &'a ManagerMapping, designer: &str) -> &'a str {
    mapping
        .get(designer)
        .map(|m| m.manager_name.as_str())
        .unwrap_or(UNKNOWN)
}

/// Missing entries grouped by the designer's manager; designers not in the roster
/// land under "Unknown".
pub fn manager_metrics(
    records: &[MissingEntryRecord],
    mapping: &ManagerMapping,
) -> Vec<ManagerMetrics> {
    tally_by(records, |r| manager_of(mapping, &r.designer))
        .into_iter()
        .map(|(manager, t)| ManagerMetrics {
            manager: manager.to_string(),
            missing_entries: t.entries,
            unique_designers: t.designers.len(),
            total_hours_missing: t.hours,
        })
        .collect()
}

pub fn team_drill_down(
    records: &[MissingEntryRecord],
    mapping: &ManagerMapping,
    manager: &str,
) -> Vec<DesignerMetrics> {
    designer_metrics(
        records
            .iter()
            .filter(|r| manager_of(mapping, &r.designer) == manager),
    )
}

// --- Historical trend ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalPoint {
    pub date: NaiveDate,
    /// `None` when the point could not be computed.
    pub compliance_rate: Option<f64>,
    pub missing_count: usize,
    pub timesheet_count: usize,
    pub total_entries: usize,
}

impl HistoricalPoint {
    pub fn from_outcome(date: NaiveDate, outcome: &ReconciliationOutcome) -> Self {
        Self {
            date,
            compliance_rate: Some(compliance_rate(
                outcome.timesheet_entry_count,
                outcome.missing_count,
            )),
            missing_count: outcome.missing_count,
            timesheet_count: outcome.timesheet_entry_count,
            total_entries: outcome.missing_count + outcome.timesheet_entry_count,
        }
    }

    pub fn unavailable(date: NaiveDate) -> Self {
        Self {
            date,
            compliance_rate: None,
            missing_count: 0,
            timesheet_count: 0,
            total_entries: 0,
        }
    }
}

/// Weekly steps for ranges longer than two weeks, daily otherwise.
pub fn trend_interval_days(start: NaiveDate, end: NaiveDate) -> i64 {
    if (end - start).num_days() > WEEKLY_TREND_THRESHOLD_DAYS {
        7
    } else {
        1
    }
}

/// Sample dates from `start` up to and including `end`.
pub fn trend_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let step = Duration::days(trend_interval_days(start, end));
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        current += step;
    }
    dates
}
