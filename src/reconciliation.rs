// src/reconciliation.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::records::{ReferenceTables, Slot, TimeEntry, UNKNOWN};

// --- Match policy ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchTier {
    /// Resource id + task + project, and the resource's own login must have logged it.
    ExactIdentity,
    /// Designer display name + task + project.
    NameTaskProject,
    /// Any time logged by the designer in the window, on any task.
    NameOnly,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::ExactIdentity => "exact-identity",
            MatchTier::NameTaskProject => "name-task-project",
            MatchTier::NameOnly => "name-only",
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchPolicyError {
    #[error("Unknown match tier '{0}' (expected exact-identity, name-task-project or name-only)")]
    UnknownTier(String),
    #[error("Match policy needs at least one tier")]
    Empty,
}

impl FromStr for MatchTier {
    type Err = MatchPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact-identity" | "exact" => Ok(MatchTier::ExactIdentity),
            "name-task-project" | "name-task" => Ok(MatchTier::NameTaskProject),
            "name-only" => Ok(MatchTier::NameOnly),
            other => Err(MatchPolicyError::UnknownTier(other.to_string())),
        }
    }
}

/// Ordered list of tiers tried per slot; the first tier that finds logged hours wins.
///
/// The name-only tier credits a designer for any time logged in the window, even on an
/// unrelated task, which can hide genuinely missing entries. It is on by default and
/// callers that want stricter results drop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPolicy {
    tiers: Vec<MatchTier>,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                MatchTier::ExactIdentity,
                MatchTier::NameTaskProject,
                MatchTier::NameOnly,
            ],
        }
    }
}

impl MatchPolicy {
    /// Keeps the given order and drops repeated tiers.
    pub fn new(tiers: impl IntoIterator<Item = MatchTier>) -> Result<Self, MatchPolicyError> {
        let mut ordered = Vec::new();
        for tier in tiers {
            if !ordered.contains(&tier) {
                ordered.push(tier);
            }
        }
        if ordered.is_empty() {
            return Err(MatchPolicyError::Empty);
        }
        Ok(Self { tiers: ordered })
    }

    /// Parses a comma separated tier list such as `exact-identity,name-task-project`.
    pub fn parse_list(list: &str) -> Result<Self, MatchPolicyError> {
        let tiers = list
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(MatchTier::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(tiers)
    }

    pub fn tiers(&self) -> &[MatchTier] {
        &self.tiers
    }
}

impl FromStr for MatchPolicy {
    type Err = MatchPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_list(s)
    }
}

// --- Aggregated timesheets ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedTimesheet {
    pub hours: Decimal,
    pub entry_ids: Vec<i64>,
    /// Logins that logged the contributing entries.
    pub user_ids: BTreeSet<i64>,
}

impl AggregatedTimesheet {
    fn add(&mut self, entry: &TimeEntry) {
        self.hours += entry.hours;
        self.entry_ids.push(entry.id);
        if let Some(user_id) = entry.user_id {
            self.user_ids.insert(user_id);
        }
    }
}

type IdKey = (i64, Option<i64>, Option<i64>);
type NameKey = (String, Option<i64>, Option<i64>);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierMatch {
    pub tier: MatchTier,
    pub hours: Decimal,
}

/// Logged time grouped three ways, built once per window and read-only afterwards.
#[derive(Debug, Default)]
pub struct MatchIndex {
    by_identity: HashMap<IdKey, AggregatedTimesheet>,
    by_name_task_project: HashMap<NameKey, AggregatedTimesheet>,
    by_name: HashMap<String, AggregatedTimesheet>,
}

impl MatchIndex {
    pub fn build(entries: &[TimeEntry]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            if let Some(employee_id) = entry.employee_id() {
                index
                    .by_identity
                    .entry((employee_id, entry.task_id, entry.project_id))
                    .or_default()
                    .add(entry);
            }
            if let Some(name) = entry.employee_name() {
                index
                    .by_name_task_project
                    .entry((name.to_string(), entry.task_id, entry.project_id))
                    .or_default()
                    .add(entry);
                index.by_name.entry(name.to_string()).or_default().add(entry);
            }
        }
        debug!(
            "Built match index: {} identity keys, {} name+task keys, {} names",
            index.by_identity.len(),
            index.by_name_task_project.len(),
            index.by_name.len()
        );
        index
    }

    /// Tries each tier of `policy` in order and returns the first one with hours > 0.
    pub fn lookup(
        &self,
        slot: &Slot,
        refs: &ReferenceTables,
        policy: &MatchPolicy,
    ) -> Option<TierMatch> {
        policy.tiers().iter().find_map(|tier| {
            let hours = self.tier_hours(*tier, slot, refs)?;
            (hours > Decimal::ZERO).then_some(TierMatch { tier: *tier, hours })
        })
    }

    pub fn aggregate(&self, tier: MatchTier, slot: &Slot) -> Option<&AggregatedTimesheet> {
        match tier {
            MatchTier::ExactIdentity => {
                let resource_id = slot.resource_id()?;
                self.by_identity
                    .get(&(resource_id, slot.task_id(), slot.project_id()))
            }
            MatchTier::NameTaskProject => {
                let name = resolvable_name(slot)?;
                self.by_name_task_project
                    .get(&(name.to_string(), slot.task_id(), slot.project_id()))
            }
            MatchTier::NameOnly => self.by_name.get(resolvable_name(slot)?),
        }
    }

    fn tier_hours(&self, tier: MatchTier, slot: &Slot, refs: &ReferenceTables) -> Option<Decimal> {
        let aggregate = self.aggregate(tier, slot)?;
        if tier == MatchTier::ExactIdentity {
            // Someone else logging against the same key does not count.
            let login = refs.resource_user_id(slot.resource_id()?)?;
            if !aggregate.user_ids.contains(&login) {
                return None;
            }
        }
        Some(aggregate.hours)
    }
}

fn resolvable_name(slot: &Slot) -> Option<&str> {
    slot.resource_name().filter(|name| *name != UNKNOWN)
}

// --- Missing entries ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    pub const ALL: [Urgency; 3] = [Urgency::High, Urgency::Medium, Urgency::Low];

    pub fn from_days_overdue(days: i64) -> Self {
        match days {
            d if d >= 2 => Urgency::High,
            1 => Urgency::Medium,
            _ => Urgency::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::High => "High",
            Urgency::Medium => "Medium",
            Urgency::Low => "Low",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned slot with no credible logged time. Field names serialize to the
/// column headers of the exported table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingEntryRecord {
    #[serde(skip)]
    pub slot_id: i64,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Designer")]
    pub designer: String,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Client Success Member")]
    pub client_success_member: String,
    #[serde(rename = "Task")]
    pub task: String,
    #[serde(rename = "Start Time")]
    pub start_time: String,
    #[serde(rename = "End Time")]
    pub end_time: String,
    #[serde(rename = "Allocated Hours", with = "rust_decimal::serde::float")]
    pub allocated_hours: Decimal,
    #[serde(rename = "Days Overdue")]
    pub days_overdue: i64,
    #[serde(rename = "Urgency")]
    pub urgency: Urgency,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationOutcome {
    pub records: Vec<MissingEntryRecord>,
    pub missing_count: usize,
    pub timesheet_entry_count: usize,
    pub matched_by_tier: BTreeMap<MatchTier, usize>,
}

impl ReconciliationOutcome {
    /// No records, but still the number of entries that were seen.
    pub fn empty(timesheet_entry_count: usize) -> Self {
        Self {
            timesheet_entry_count,
            ..Self::default()
        }
    }
}

/// Emits one record per slot that no tier of `policy` can match, in slot order.
pub fn reconcile(
    slots: &[Slot],
    entries: &[TimeEntry],
    refs: &ReferenceTables,
    end_date: NaiveDate,
    policy: &MatchPolicy,
) -> ReconciliationOutcome {
    let index = MatchIndex::build(entries);
    let mut outcome = ReconciliationOutcome::empty(entries.len());

    for slot in slots {
        match index.lookup(slot, refs, policy) {
            Some(found) => {
                debug!(
                    "Slot {} matched by {} ({} hours)",
                    slot.id, found.tier, found.hours
                );
                *outcome.matched_by_tier.entry(found.tier).or_insert(0) += 1;
            }
            None => outcome.records.push(missing_record(slot, refs, end_date)),
        }
    }

    outcome.missing_count = outcome.records.len();
    info!(
        "Reconciled {} slots against {} timesheet entries: {} missing",
        slots.len(),
        outcome.timesheet_entry_count,
        outcome.missing_count
    );
    outcome
}

fn missing_record(slot: &Slot, refs: &ReferenceTables, end_date: NaiveDate) -> MissingEntryRecord {
    let task_date = slot.start.map(|s| s.date()).unwrap_or(end_date);
    let days_overdue = (end_date - task_date).num_days();

    MissingEntryRecord {
        slot_id: slot.id,
        date: task_date,
        designer: slot.resource_name().unwrap_or(UNKNOWN).to_string(),
        project: refs.project_name(slot.project_id()),
        client_success_member: refs.user_name(slot.creator.as_ref().map(|c| c.id)),
        task: refs.task_name(slot.task_id()),
        start_time: clock_time(slot.start, slot.start_text.as_deref()),
        end_time: clock_time(slot.end, slot.end_text.as_deref()),
        allocated_hours: slot.allocated_hours,
        days_overdue,
        urgency: Urgency::from_days_overdue(days_overdue),
    }
}

/// `HH:MM` for a parsed timestamp, the stored text when it did not parse.
fn clock_time(parsed: Option<chrono::NaiveDateTime>, raw: Option<&str>) -> String {
    match (parsed, raw) {
        (Some(ts), _) => ts.format("%H:%M").to_string(),
        (None, Some(text)) => text.to_string(),
        (None, None) => UNKNOWN.to_string(),
    }
}
