// src/slot_query.rs
//
// Fetches every planning slot that overlaps a date window. Deployments disagree on how
// date-range predicates behave, so several query variants run and their results are
// unioned rather than trusting the first one that answers.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, warn};

use crate::domain::{Condition, Domain, DomainTerm, Operator};
use crate::field_cache::FieldDiscoveryCache;
use crate::odoo_client::{RawRecord, RecordGateway};
use crate::records::{normalize_slots, Slot};

pub const SLOT_MODEL: &str = "planning.slot";
pub const SHIFT_STATUS_FIELD: &str = "x_studio_shift_status";
pub const FALLBACK_LOOKBACK_DAYS: i64 = 30;

pub const SLOT_FIELDS: &[&str] = &[
    "id",
    "name",
    "resource_id",
    "start_datetime",
    "end_datetime",
    "allocated_hours",
    "state",
    "project_id",
    "task_id",
    SHIFT_STATUS_FIELD,
    "create_uid",
    "x_studio_sub_task_1",
    "x_studio_task_activity",
    "x_studio_service_category_1",
];

/// Shift status filter offered to report callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShiftStatus {
    #[default]
    All,
    Planned,
    Forecasted,
}

impl ShiftStatus {
    /// Value to filter on, `None` for no filter.
    pub fn filter_value(&self) -> Option<&'static str> {
        match self {
            ShiftStatus::All => None,
            ShiftStatus::Planned => Some("Planned"),
            ShiftStatus::Forecasted => Some("Forecasted"),
        }
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.filter_value().unwrap_or("All"))
    }
}

impl FromStr for ShiftStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(ShiftStatus::All),
            "planned" => Ok(ShiftStatus::Planned),
            "forecasted" => Ok(ShiftStatus::Forecasted),
            other => Err(format!(
                "unknown shift status '{}' (expected All, Planned or Forecasted)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryVariant {
    /// Starts inside the window, ends inside it, or spans across it.
    Overlap,
    /// Placeholder for a date-field based strategy; produces no domain and is skipped.
    Reserved,
    /// Start timestamp between the window's first day and the day after its last.
    StartInRange,
}

impl QueryVariant {
    pub const ALL: [QueryVariant; 3] = [
        QueryVariant::Overlap,
        QueryVariant::Reserved,
        QueryVariant::StartInRange,
    ];

    pub fn base_domain(&self, window: &SlotWindow) -> Domain {
        let first = window.start.format("%Y-%m-%d").to_string();
        let after_last = window.day_after_end().format("%Y-%m-%d").to_string();

        match self {
            QueryVariant::Overlap => {
                let from = format!("{} 00:00:00", first);
                let until = format!("{} 00:00:00", after_last);
                Domain::from_terms(vec![
                    DomainTerm::Or,
                    DomainTerm::And,
                    Domain::cond("start_datetime", Operator::Ge, from.as_str()),
                    Domain::cond("start_datetime", Operator::Lt, until.as_str()),
                    DomainTerm::Or,
                    DomainTerm::And,
                    Domain::cond("end_datetime", Operator::Ge, from.as_str()),
                    Domain::cond("end_datetime", Operator::Lt, until.as_str()),
                    DomainTerm::And,
                    Domain::cond("start_datetime", Operator::Lt, from.as_str()),
                    Domain::cond("end_datetime", Operator::Ge, until.as_str()),
                ])
            }
            QueryVariant::Reserved => Domain::empty(),
            QueryVariant::StartInRange => Domain::all_of([
                Condition::new("start_datetime", Operator::Ge, first),
                Condition::new("start_datetime", Operator::Lt, after_last),
            ]),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            QueryVariant::Overlap => "overlap",
            QueryVariant::Reserved => "reserved",
            QueryVariant::StartInRange => "start-in-range",
        }
    }
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SlotWindow {
    /// A missing end date means a single-day window.
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Self {
        Self {
            start,
            end: end.unwrap_or(start),
        }
    }

    pub fn day_after_end(&self) -> NaiveDate {
        self.end + Duration::days(1)
    }
}

/// Returns the deduplicated union of all slots overlapping `window`, first occurrence
/// kept. Failing variants are logged and skipped; if nothing at all can be fetched the
/// result is empty rather than an error.
pub async fn fetch_slots<G: RecordGateway + ?Sized>(
    gateway: &G,
    cache: &mut FieldDiscoveryCache,
    window: SlotWindow,
    status: Option<&str>,
) -> Vec<Slot> {
    let (fields, schema) = cache.available_fields(gateway, SLOT_MODEL, SLOT_FIELDS).await;

    let status_clause = match status {
        Some(value) if schema.contains_key(SHIFT_STATUS_FIELD) => {
            info!("Filtering planning slots by {}: {}", SHIFT_STATUS_FIELD, value);
            Some(Condition::new(SHIFT_STATUS_FIELD, Operator::Eq, value))
        }
        Some(value) => {
            warn!(
                "Shift status filter '{}' ignored: {} is not exposed on {}",
                value, SHIFT_STATUS_FIELD, SLOT_MODEL
            );
            None
        }
        None => None,
    };

    let mut collected: Vec<RawRecord> = Vec::new();
    let mut any_results = false;

    for (index, variant) in QueryVariant::ALL.iter().enumerate() {
        let base = variant.base_domain(&window);
        if base.is_empty() {
            continue;
        }
        let domain = match &status_clause {
            Some(clause) => base.and_also(clause.clone()),
            None => base,
        };

        info!("Trying planning slot domain {} ({})", index + 1, variant.label());
        match gateway.search_read(SLOT_MODEL, &domain, &fields).await {
            Ok(rows) if !rows.is_empty() => {
                info!("Found {} planning slots with domain {}", rows.len(), index + 1);
                any_results = true;
                collected.extend(rows);
            }
            Ok(_) => {}
            Err(e) => warn!("Error with planning slot domain {}: {}", index + 1, e),
        }
    }

    if !any_results {
        collected = permissive_fallback(gateway, &window, &fields, status_clause).await;
    }

    let slots = dedupe_by_id(normalize_slots(&collected));
    info!(
        "Returning {} unique planning slots for date range {} to {}",
        slots.len(),
        window.start,
        window.end
    );
    slots
}

/// Everything since a month before the window, narrowed to slots whose raw start
/// string mentions the window's end date.
async fn permissive_fallback<G: RecordGateway + ?Sized>(
    gateway: &G,
    window: &SlotWindow,
    fields: &[String],
    status_clause: Option<Condition>,
) -> Vec<RawRecord> {
    info!("Trying to get all recent planning slots");
    let since = window.start - Duration::days(FALLBACK_LOOKBACK_DAYS);
    let mut domain = Domain::all_of([Condition::new(
        "start_datetime",
        Operator::Ge,
        since.format("%Y-%m-%d").to_string(),
    )]);
    if let Some(clause) = status_clause {
        domain = domain.and_also(clause);
    }

    let recent = match gateway.search_read(SLOT_MODEL, &domain, fields).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Error with permissive planning slot query: {}", e);
            return Vec::new();
        }
    };

    let end_text = window.end.format("%Y-%m-%d").to_string();
    let end_compact = end_text.replace('-', "");
    let matching: Vec<RawRecord> = recent
        .into_iter()
        .filter(|row| {
            let start = row
                .get("start_datetime")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            start.contains(&end_text) || start.replace('-', "").contains(&end_compact)
        })
        .collect();

    info!("Filtered to {} planning slots for the date range", matching.len());
    matching
}

pub fn dedupe_by_id(slots: Vec<Slot>) -> Vec<Slot> {
    let mut seen = HashSet::new();
    slots.into_iter().filter(|s| seen.insert(s.id)).collect()
}
