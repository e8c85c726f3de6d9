// src/roster.rs
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

pub const EMPLOYEE_NAME_COLUMN: &str = "Employee Name";
pub const MANAGER_COLUMN: &str = "Manager";
pub const WORK_EMAIL_COLUMN: &str = "Work Email";
pub const LOGIN_COLUMN: &str = "Microsoft ID";

const REQUIRED_COLUMNS: [&str; 4] = [
    EMPLOYEE_NAME_COLUMN,
    MANAGER_COLUMN,
    WORK_EMAIL_COLUMN,
    LOGIN_COLUMN,
];

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Failed to open roster file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read roster CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Required columns missing from roster: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub employee_name: Option<String>,
    pub manager: Option<String>,
    pub work_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerInfo {
    pub manager_name: String,
    pub manager_email: String,
}

/// Employee name -> manager.
pub type ManagerMapping = HashMap<String, ManagerInfo>;

#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let path = path.as_ref();
        info!("Loading employee data from CSV: {}", path.display());
        let file = File::open(path).map_err(|e| {
            error!("Employee data file not readable: {} ({})", path.display(), e);
            e
        })?;
        Self::from_reader(file)
    }

    /// Fails when any required column is absent, regardless of row content.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RosterError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let position = |name: &str| headers.iter().position(|h| h == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .into_iter()
            .filter(|c| position(*c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            error!("Required columns missing from CSV: {:?}", missing);
            return Err(RosterError::MissingColumns(missing));
        }

        // All required columns were found above. The login column is only checked for.
        let [name_at, manager_at, email_at, _] =
            REQUIRED_COLUMNS.map(|c| position(c).unwrap_or_default());

        let mut entries = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let cell = |at: usize| {
                row.get(at)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };
            entries.push(RosterEntry {
                employee_name: cell(name_at),
                manager: cell(manager_at),
                work_email: cell(email_at),
            });
        }

        info!("Successfully loaded employee data with {} rows", entries.len());
        Ok(Self { entries })
    }

    pub fn find(&self, employee_name: &str) -> Option<&RosterEntry> {
        self.entries
            .iter()
            .find(|e| e.employee_name.as_deref() == Some(employee_name))
    }

    /// Maps each employee with a manager to that manager's name and email. The email
    /// comes from the manager's own row; employees whose manager has none are skipped.
    pub fn manager_mapping(&self) -> ManagerMapping {
        let mut mapping = ManagerMapping::new();
        for entry in &self.entries {
            let (Some(employee), Some(manager)) = (&entry.employee_name, &entry.manager) else {
                continue;
            };
            let Some(email) = self.find(manager).and_then(|m| m.work_email.clone()) else {
                warn!(
                    "Could not find email for manager '{}' of employee '{}'",
                    manager, employee
                );
                continue;
            };
            mapping.insert(
                employee.clone(),
                ManagerInfo {
                    manager_name: manager.clone(),
                    manager_email: email,
                },
            );
        }
        info!("Loaded {} employee-manager relationships", mapping.len());
        mapping
    }
}
