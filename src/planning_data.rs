// src/planning_data.rs
use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use crate::domain::{Condition, Domain, Operator};
use crate::field_cache::FieldDiscoveryCache;
use crate::odoo_client::{OdooError, RawRecord, RecordGateway};
use crate::records::{name_table, normalize_entries, resource_table, ReferenceTables, TimeEntry};

pub const TIMESHEET_MODEL: &str = "account.analytic.line";
pub const RESOURCE_MODEL: &str = "resource.resource";
pub const PROJECT_MODEL: &str = "project.project";
pub const USER_MODEL: &str = "res.users";
pub const TASK_MODEL: &str = "project.task";

pub const TIMESHEET_FIELDS: &[&str] = &[
    "id",
    "name",
    "date",
    "unit_amount",
    "employee_id",
    "task_id",
    "project_id",
    "user_id",
    "company_id",
    "create_date",
];

const RESOURCE_FIELDS: &[&str] = &["id", "name", "user_id", "resource_type", "company_id"];
const NAME_FIELDS: &[&str] = &["id", "name"];

/// Time entries whose work date falls in `[start, end]`. Unlike slot queries this
/// propagates failure, since the caller has to tell "nobody logged anything" apart
/// from "we could not ask".
pub async fn fetch_time_entries<G: RecordGateway + ?Sized>(
    gateway: &G,
    cache: &mut FieldDiscoveryCache,
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> Result<Vec<TimeEntry>, OdooError> {
    let end = end.unwrap_or(start);
    let (fields, _) = cache
        .available_fields(gateway, TIMESHEET_MODEL, TIMESHEET_FIELDS)
        .await;

    let domain = Domain::all_of([
        Condition::new("date", Operator::Ge, start.format("%Y-%m-%d").to_string()),
        Condition::new(
            "date",
            Operator::Lt,
            (end + Duration::days(1)).format("%Y-%m-%d").to_string(),
        ),
    ]);

    let rows = gateway.search_read(TIMESHEET_MODEL, &domain, &fields).await?;
    info!(
        "Found {} timesheet entries between {} and {}",
        rows.len(),
        start,
        end
    );
    Ok(normalize_entries(&rows))
}

/// Loads the id -> name lookups. Each table is fetched on its own; one that fails is
/// logged and left empty so the others remain usable.
pub async fn fetch_reference_tables<G: RecordGateway + ?Sized>(gateway: &G) -> ReferenceTables {
    let resources = fetch_table(gateway, RESOURCE_MODEL, RESOURCE_FIELDS).await;
    let projects = fetch_table(gateway, PROJECT_MODEL, NAME_FIELDS).await;
    let users = fetch_table(gateway, USER_MODEL, NAME_FIELDS).await;
    let tasks = fetch_table(gateway, TASK_MODEL, NAME_FIELDS).await;

    let tables = ReferenceTables {
        resources: resource_table(&resources),
        projects: name_table(&projects),
        users: name_table(&users),
        tasks: name_table(&tasks),
    };
    info!(
        "Loaded reference data: {} resources, {} projects, {} users, {} tasks",
        tables.resources.len(),
        tables.projects.len(),
        tables.users.len(),
        tables.tasks.len()
    );
    tables
}

async fn fetch_table<G: RecordGateway + ?Sized>(
    gateway: &G,
    model: &str,
    fields: &[&str],
) -> Vec<RawRecord> {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    match gateway.search_read(model, &Domain::empty(), &fields).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Failed to fetch reference table {}: {}", model, e);
            Vec::new()
        }
    }
}
