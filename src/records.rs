// src/records.rs
//
// Normalization layer between the gateway and the engine. The record store hands back
// loosely typed values (a relation may be `[id, "name"]`, a bare id, or `false`; an
// absent text field is `false`); everything past this module works on the typed
// structs below.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::odoo_client::RawRecord;
use crate::timeliness::parse_submission_timestamp;

pub const ODOO_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const ODOO_DATE_FORMAT: &str = "%Y-%m-%d";
pub const UNKNOWN: &str = "Unknown";

// --- Field coercion ---

/// A many-to-one reference: the related record's id and, when the backend sent one,
/// its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Many2One {
    pub id: i64,
    pub name: Option<String>,
}

pub fn many2one(value: Option<&Value>) -> Option<Many2One> {
    match value? {
        Value::Array(items) => {
            let id = items.first()?.as_i64()?;
            let name = items.get(1).and_then(Value::as_str).map(str::to_string);
            Some(Many2One { id, name })
        }
        Value::Number(n) => n.as_i64().map(|id| Many2One { id, name: None }),
        _ => None,
    }
}

/// Only the `[id, name]` form. Planning slots always send their relations that way;
/// anything else on a slot is treated as unset.
pub fn many2one_pair(value: Option<&Value>) -> Option<Many2One> {
    match value? {
        Value::Array(_) => many2one(value),
        _ => None,
    }
}

pub fn many2one_id(value: Option<&Value>) -> Option<i64> {
    many2one(value).map(|m| m.id)
}

/// String form of a value for tabular output: booleans become `True`/`False`,
/// null becomes the empty string.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// A text field that is actually set. `false`, null and non-strings count as absent.
pub fn text_field(record: &RawRecord, key: &str) -> Option<String> {
    match record.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

pub fn hours_field(record: &RawRecord, key: &str) -> Decimal {
    match record.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(Decimal::from_f64)
            .unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

pub fn record_id(record: &RawRecord) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

pub fn parse_odoo_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, ODOO_DATETIME_FORMAT).ok()
}

pub fn parse_odoo_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, ODOO_DATE_FORMAT).ok()
}

// --- Slot ---

/// A planned work assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub id: i64,
    pub name: String,
    pub resource: Option<Many2One>,
    /// Start timestamp as stored, kept for display when it does not parse.
    pub start_text: Option<String>,
    pub end_text: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub allocated_hours: Decimal,
    pub project: Option<Many2One>,
    pub task: Option<Many2One>,
    pub creator: Option<Many2One>,
    pub shift_status: Option<String>,
    pub state: Option<String>,
}

impl Slot {
    pub fn from_raw(record: &RawRecord) -> Option<Self> {
        let Some(id) = record_id(record) else {
            warn!("Skipping planning slot without an id: {:?}", record.get("name"));
            return None;
        };

        let start_text = text_field(record, "start_datetime");
        let end_text = text_field(record, "end_datetime");

        Some(Self {
            id,
            name: record
                .get("name")
                .map(display_text)
                .unwrap_or_else(|| "Unnamed Slot".to_string()),
            resource: many2one_pair(record.get("resource_id")),
            start: start_text.as_deref().and_then(parse_odoo_datetime),
            end: end_text.as_deref().and_then(parse_odoo_datetime),
            start_text,
            end_text,
            allocated_hours: hours_field(record, "allocated_hours"),
            project: many2one_pair(record.get("project_id")),
            task: many2one_pair(record.get("task_id")),
            creator: many2one_pair(record.get("create_uid")),
            shift_status: text_field(record, "x_studio_shift_status"),
            state: text_field(record, "state"),
        })
    }

    /// The designer's display name, if the resource reference carried one.
    pub fn resource_name(&self) -> Option<&str> {
        self.resource.as_ref().and_then(|r| r.name.as_deref())
    }

    pub fn resource_id(&self) -> Option<i64> {
        self.resource.as_ref().map(|r| r.id)
    }

    pub fn task_id(&self) -> Option<i64> {
        self.task.as_ref().map(|t| t.id)
    }

    pub fn project_id(&self) -> Option<i64> {
        self.project.as_ref().map(|p| p.id)
    }
}

// --- Time entry ---

/// A logged timesheet line.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntry {
    pub id: i64,
    pub description: String,
    pub work_date: Option<NaiveDate>,
    /// When the entry was submitted; `None` if absent or unparseable.
    pub submitted_at: Option<NaiveDateTime>,
    pub hours: Decimal,
    pub employee: Option<Many2One>,
    pub task_id: Option<i64>,
    pub project_id: Option<i64>,
    /// The login that logged the entry.
    pub user_id: Option<i64>,
}

impl TimeEntry {
    pub fn from_raw(record: &RawRecord) -> Option<Self> {
        let Some(id) = record_id(record) else {
            warn!("Skipping timesheet entry without an id");
            return None;
        };

        Some(Self {
            id,
            description: record.get("name").map(display_text).unwrap_or_default(),
            work_date: text_field(record, "date").as_deref().and_then(parse_odoo_date),
            submitted_at: text_field(record, "create_date")
                .as_deref()
                .and_then(parse_submission_timestamp),
            hours: hours_field(record, "unit_amount"),
            employee: many2one(record.get("employee_id")),
            task_id: many2one_id(record.get("task_id")),
            project_id: many2one_id(record.get("project_id")),
            user_id: many2one_id(record.get("user_id")),
        })
    }

    pub fn employee_id(&self) -> Option<i64> {
        self.employee.as_ref().map(|e| e.id)
    }

    pub fn employee_name(&self) -> Option<&str> {
        self.employee.as_ref().and_then(|e| e.name.as_deref())
    }
}

pub fn normalize_slots(records: &[RawRecord]) -> Vec<Slot> {
    records.iter().filter_map(Slot::from_raw).collect()
}

pub fn normalize_entries(records: &[RawRecord]) -> Vec<TimeEntry> {
    records.iter().filter_map(TimeEntry::from_raw).collect()
}

// --- Reference tables ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    /// Login linked to the resource, used for the identity cross-check.
    pub user_id: Option<i64>,
}

/// id -> name lookups, built once per report and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub resources: HashMap<i64, Resource>,
    pub projects: HashMap<i64, String>,
    pub users: HashMap<i64, String>,
    pub tasks: HashMap<i64, String>,
}

impl ReferenceTables {
    pub fn resource_user_id(&self, resource_id: i64) -> Option<i64> {
        self.resources.get(&resource_id).and_then(|r| r.user_id)
    }

    pub fn project_name(&self, id: Option<i64>) -> String {
        lookup_name(&self.projects, id)
    }

    pub fn task_name(&self, id: Option<i64>) -> String {
        lookup_name(&self.tasks, id)
    }

    pub fn user_name(&self, id: Option<i64>) -> String {
        lookup_name(&self.users, id)
    }
}

fn lookup_name(table: &HashMap<i64, String>, id: Option<i64>) -> String {
    id.and_then(|id| table.get(&id))
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn name_table(records: &[RawRecord]) -> HashMap<i64, String> {
    records
        .iter()
        .filter_map(|r| {
            let id = record_id(r)?;
            let name = r
                .get("name")
                .map(display_text)
                .unwrap_or_else(|| UNKNOWN.to_string());
            Some((id, name))
        })
        .collect()
}

pub fn resource_table(records: &[RawRecord]) -> HashMap<i64, Resource> {
    records
        .iter()
        .filter_map(|r| {
            let id = record_id(r)?;
            Some((
                id,
                Resource {
                    name: r
                        .get("name")
                        .map(display_text)
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                    user_id: many2one_id(r.get("user_id")),
                },
            ))
        })
        .collect()
}
