// src/test_support.rs
//
// In-memory record store used by the unit tests. It evaluates domains against canned
// records so the query planner and pipeline run end to end without a network.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::domain::{Condition, Domain, DomainTerm, Operator};
use crate::odoo_client::{FieldInfo, FieldMap, OdooError, RawRecord, RecordGateway};

type FailRule = Box<dyn Fn(&str, &Domain) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub model: String,
    pub domain: Domain,
    pub fields: Vec<String>,
}

#[derive(Default)]
pub struct FakeGateway {
    records: HashMap<String, Vec<RawRecord>>,
    schemas: HashMap<String, FieldMap>,
    failing_models: HashSet<String>,
    timeout_models: HashSet<String>,
    fail_rules: Vec<FailRule>,
    queries: Mutex<Vec<RecordedQuery>>,
    schema_calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields(mut self, model: &str, fields: &[&str]) -> Self {
        let map = fields
            .iter()
            .map(|f| (f.to_string(), FieldInfo::default()))
            .collect();
        self.schemas.insert(model.to_string(), map);
        self
    }

    pub fn with_records(mut self, model: &str, records: Vec<Value>) -> Self {
        let rows = records
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.records.insert(model.to_string(), rows);
        self
    }

    pub fn failing_model(mut self, model: &str) -> Self {
        self.failing_models.insert(model.to_string());
        self
    }

    /// Every query on `model` fails the way an unreachable server does.
    pub fn timing_out_model(mut self, model: &str) -> Self {
        self.timeout_models.insert(model.to_string());
        self
    }

    pub fn fail_when<F>(mut self, rule: F) -> Self
    where
        F: Fn(&str, &Domain) -> bool + Send + Sync + 'static,
    {
        self.fail_rules.push(Box::new(rule));
        self
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn queries_for(&self, model: &str) -> Vec<RecordedQuery> {
        self.queries()
            .into_iter()
            .filter(|q| q.model == model)
            .collect()
    }

    pub fn schema_calls(&self) -> Vec<String> {
        self.schema_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordGateway for FakeGateway {
    async fn search_read(
        &self,
        model: &str,
        domain: &Domain,
        fields: &[String],
    ) -> Result<Vec<RawRecord>, OdooError> {
        self.queries.lock().unwrap().push(RecordedQuery {
            model: model.to_string(),
            domain: domain.clone(),
            fields: fields.to_vec(),
        });

        if self.timeout_models.contains(model) {
            return Err(OdooError::Timeout {
                model: model.to_string(),
                seconds: 30,
            });
        }
        if self.failing_models.contains(model) || self.fail_rules.iter().any(|r| r(model, domain)) {
            return Err(OdooError::Rpc {
                message: format!("simulated failure on {}", model),
            });
        }

        let rows = self.records.get(model).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| matches_domain(row, domain.terms()))
            .collect())
    }

    async fn fields_get(&self, model: &str) -> Result<FieldMap, OdooError> {
        self.schema_calls.lock().unwrap().push(model.to_string());
        self.schemas.get(model).cloned().ok_or_else(|| OdooError::Rpc {
            message: format!("no schema registered for {}", model),
        })
    }
}

// --- Domain evaluation ---

fn matches_domain(row: &RawRecord, terms: &[DomainTerm]) -> bool {
    let mut rest = terms;
    while !rest.is_empty() {
        let (ok, tail) = eval(row, rest);
        if !ok {
            return false;
        }
        rest = tail;
    }
    true
}

fn eval<'a>(row: &RawRecord, terms: &'a [DomainTerm]) -> (bool, &'a [DomainTerm]) {
    match &terms[0] {
        DomainTerm::And => {
            let (a, rest) = eval(row, &terms[1..]);
            let (b, rest) = eval(row, rest);
            (a && b, rest)
        }
        DomainTerm::Or => {
            let (a, rest) = eval(row, &terms[1..]);
            let (b, rest) = eval(row, rest);
            (a || b, rest)
        }
        DomainTerm::Leaf(cond) => (eval_condition(row, cond), &terms[1..]),
    }
}

fn eval_condition(row: &RawRecord, cond: &Condition) -> bool {
    let actual = match row.get(&cond.field) {
        // many2one values compare on their id
        Some(Value::Array(pair)) => pair.first().cloned().unwrap_or(Value::Null),
        Some(v) => v.clone(),
        None => return false,
    };
    let ordering = match (&actual, &cond.value) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (a, b) => {
            return cond.op == Operator::Eq && a == b;
        }
    };
    match cond.op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Lt => ordering == Ordering::Less,
    }
}

// --- Record builders ---

pub fn slot_record(
    id: i64,
    resource: Option<(i64, &str)>,
    start: &str,
    end: &str,
    hours: f64,
    project: Option<i64>,
    task: Option<i64>,
    status: &str,
) -> Value {
    json!({
        "id": id,
        "name": format!("Slot {}", id),
        "resource_id": resource.map(|(rid, name)| json!([rid, name])).unwrap_or(json!(false)),
        "start_datetime": start,
        "end_datetime": end,
        "allocated_hours": hours,
        "project_id": project.map(|p| json!([p, format!("Project {}", p)])).unwrap_or(json!(false)),
        "task_id": task.map(|t| json!([t, format!("Task {}", t)])).unwrap_or(json!(false)),
        "x_studio_shift_status": status,
        "create_uid": [90, "Casey Success"],
    })
}

pub fn timesheet_record(
    id: i64,
    employee: Option<(i64, &str)>,
    date: &str,
    create_date: Option<&str>,
    hours: f64,
    task: Option<i64>,
    project: Option<i64>,
    user: Option<i64>,
) -> Value {
    json!({
        "id": id,
        "name": "/",
        "date": date,
        "create_date": create_date.map(Value::from).unwrap_or(json!(false)),
        "unit_amount": hours,
        "employee_id": employee.map(|(eid, name)| json!([eid, name])).unwrap_or(json!(false)),
        "task_id": task.map(|t| json!([t, format!("Task {}", t)])).unwrap_or(json!(false)),
        "project_id": project.map(|p| json!([p, format!("Project {}", p)])).unwrap_or(json!(false)),
        "user_id": user.map(|u| json!([u, format!("User {}", u)])).unwrap_or(json!(false)),
    })
}
