// src/compliance.rs
//
// One report invocation: the caller builds a `ReportContext`, runs one or more reports
// through it, and drops it. Schema lookups are cached inside the context only.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::field_cache::FieldDiscoveryCache;
use crate::odoo_client::{OdooError, RecordGateway};
use crate::planning_data::{fetch_reference_tables, fetch_time_entries};
use crate::reconciliation::{
    reconcile, MatchPolicy, MatchTier, MissingEntryRecord, ReconciliationOutcome,
};
use crate::reporting::{
    daily_trend, designer_metrics, employee_ranking, manager_metrics, project_drill_down,
    project_metrics, summarize, team_drill_down, timeliness_summary, trend_dates,
    ComplianceSummary, DailyTimeliness, DesignerMetrics, EmployeeRanking, HistoricalPoint,
    ManagerMetrics, ProjectMetrics, TimelinessSummary,
};
use crate::roster::ManagerMapping;
use crate::slot_query::{fetch_slots, ShiftStatus, SlotWindow};
use crate::timeliness::{analyze, TimelinessRecord};

pub struct ReportContext {
    gateway: Arc<dyn RecordGateway>,
    fields: FieldDiscoveryCache,
    policy: MatchPolicy,
    managers: ManagerMapping,
}

impl ReportContext {
    pub fn new(gateway: Arc<dyn RecordGateway>) -> Self {
        Self {
            gateway,
            fields: FieldDiscoveryCache::new(),
            policy: MatchPolicy::default(),
            managers: ManagerMapping::new(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_managers(mut self, managers: ManagerMapping) -> Self {
        self.managers = managers;
        self
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    pub fn fields(&self) -> &FieldDiscoveryCache {
        &self.fields
    }

    /// Reconciles the month containing `end_date`, up to and including it. Connectivity
    /// failures are returned; any other failure of the time-entry source is logged and
    /// yields an empty outcome.
    pub async fn missing_entries(
        &mut self,
        end_date: NaiveDate,
        status: ShiftStatus,
    ) -> Result<ReconciliationOutcome, OdooError> {
        match self.try_missing_entries(end_date, status).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_connectivity() => {
                error!("Lost connection while generating report for {}: {}", end_date, e);
                Err(e)
            }
            Err(e) => {
                error!("Error generating report for {}: {}", end_date, e);
                Ok(ReconciliationOutcome::empty(0))
            }
        }
    }

    async fn try_missing_entries(
        &mut self,
        end_date: NaiveDate,
        status: ShiftStatus,
    ) -> Result<ReconciliationOutcome, OdooError> {
        let window = SlotWindow::new(month_start(end_date), Some(end_date));
        let gateway = self.gateway.as_ref();

        let mut slots = fetch_slots(gateway, &mut self.fields, window, status.filter_value()).await;
        if let Some(wanted) = status.filter_value() {
            slots.retain(|s| s.shift_status.as_deref() == Some(wanted));
            info!(
                "Post-filtered to {} slots with shift status {}",
                slots.len(),
                wanted
            );
        }

        // Without entries every slot would look missing, so this one aborts the report.
        let entries =
            fetch_time_entries(gateway, &mut self.fields, window.start, Some(window.end)).await?;
        let refs = fetch_reference_tables(gateway).await;

        Ok(reconcile(&slots, &entries, &refs, end_date, &self.policy))
    }

    pub async fn missing_entries_report(
        &mut self,
        end_date: NaiveDate,
        status: ShiftStatus,
    ) -> Result<MissingEntriesReport, OdooError> {
        let outcome = self.missing_entries(end_date, status).await?;
        Ok(MissingEntriesReport::build(
            end_date,
            status,
            outcome,
            &self.managers,
        ))
    }

    /// Timeliness over entries whose work date is in `[start, end]`.
    pub async fn timeliness_report(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TimelinessReport, OdooError> {
        let gateway = self.gateway.as_ref();
        let entries = match fetch_time_entries(gateway, &mut self.fields, start, Some(end)).await {
            Ok(entries) => entries,
            Err(e) if e.is_connectivity() => {
                error!("Lost connection while fetching timesheet entries: {}", e);
                return Err(e);
            }
            Err(e) => {
                error!("Failed to fetch timesheet entries for timeliness analysis: {}", e);
                Vec::new()
            }
        };
        if entries.is_empty() {
            info!("No timesheet entries found between {} and {}", start, end);
        }
        Ok(TimelinessReport::from_records(start, end, analyze(&entries)))
    }

    /// One point per interval between `start` and `end`, each a full report with that
    /// day as its end date. Points that fail stay in the series without a rate; a
    /// connectivity failure aborts the whole series.
    pub async fn historical_compliance(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        status: ShiftStatus,
    ) -> Result<Vec<HistoricalPoint>, OdooError> {
        let mut points = Vec::new();
        for date in trend_dates(start, end) {
            match self.try_missing_entries(date, status).await {
                Ok(outcome) => points.push(HistoricalPoint::from_outcome(date, &outcome)),
                Err(e) if e.is_connectivity() => {
                    error!("Lost connection while computing trend point {}: {}", date, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Error getting data for {}: {}", date, e);
                    points.push(HistoricalPoint::unavailable(date));
                }
            }
        }
        Ok(points)
    }
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

// --- Report bundles ---

#[derive(Debug, Clone, Serialize)]
pub struct MissingEntriesReport {
    pub window_start: NaiveDate,
    pub end_date: NaiveDate,
    pub shift_status: ShiftStatus,
    pub summary: ComplianceSummary,
    pub matched_by_tier: BTreeMap<MatchTier, usize>,
    pub records: Vec<MissingEntryRecord>,
    pub designers: Vec<DesignerMetrics>,
    pub projects: Vec<ProjectMetrics>,
    /// Empty when no roster was loaded.
    pub managers: Vec<ManagerMetrics>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drill_downs: Vec<DrillDown>,
}

/// Per-designer metrics restricted to one project or one manager's team.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum DrillDown {
    Project {
        project: String,
        designers: Vec<DesignerMetrics>,
    },
    Team {
        manager: String,
        designers: Vec<DesignerMetrics>,
    },
}

impl MissingEntriesReport {
    pub fn build(
        end_date: NaiveDate,
        shift_status: ShiftStatus,
        outcome: ReconciliationOutcome,
        managers: &ManagerMapping,
    ) -> Self {
        let manager_rows = if managers.is_empty() {
            Vec::new()
        } else {
            manager_metrics(&outcome.records, managers)
        };
        Self {
            window_start: month_start(end_date),
            end_date,
            shift_status,
            summary: summarize(&outcome),
            designers: designer_metrics(&outcome.records),
            projects: project_metrics(&outcome.records),
            managers: manager_rows,
            matched_by_tier: outcome.matched_by_tier,
            records: outcome.records,
            drill_downs: Vec::new(),
        }
    }

    pub fn with_project_drill_down(mut self, project: &str) -> Self {
        let designers = project_drill_down(&self.records, project);
        self.drill_downs.push(DrillDown::Project {
            project: project.to_string(),
            designers,
        });
        self
    }

    /// Designers are assigned to teams through `managers`; those missing from it fall
    /// under "Unknown".
    pub fn with_team_drill_down(mut self, manager: &str, managers: &ManagerMapping) -> Self {
        let designers = team_drill_down(&self.records, managers, manager);
        self.drill_downs.push(DrillDown::Team {
            manager: manager.to_string(),
            designers,
        });
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelinessReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub summary: TimelinessSummary,
    pub daily: Vec<DailyTimeliness>,
    pub employees: EmployeeRanking,
    pub records: Vec<TimelinessRecord>,
}

impl TimelinessReport {
    pub fn from_records(start: NaiveDate, end: NaiveDate, records: Vec<TimelinessRecord>) -> Self {
        Self {
            start_date: start,
            end_date: end,
            summary: timeliness_summary(&records),
            daily: daily_trend(&records),
            employees: employee_ranking(&records),
            records,
        }
    }
}
