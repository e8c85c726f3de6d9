// src/server.rs
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::compliance::{month_start, MissingEntriesReport, ReportContext, TimelinessReport};
use crate::config::AppConfig;
use crate::odoo_client::{OdooClient, OdooConfig, OdooError, RecordGateway};
use crate::reconciliation::{MatchPolicy, MatchPolicyError};
use crate::reporting::HistoricalPoint;
use crate::roster::{ManagerMapping, RosterError};
use crate::slot_query::ShiftStatus;

// --- Error Handling ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Odoo request failed: {0}")]
    Odoo(#[from] OdooError),
    #[error("Roster could not be loaded: {0}")]
    Roster(#[from] RosterError),
    #[error("Configuration error: {0}")]
    Config(#[from] envy::Error),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    #[error("Invalid server address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MatchPolicyError> for AppError {
    fn from(e: MatchPolicyError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Odoo(e) if e.is_connectivity() => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error occurred: {}", self); // Log the original error

        let status_code = self.status_code();
        let message = match &self {
            AppError::Odoo(e) if e.is_connectivity() => "Could not reach Odoo.".to_string(),
            AppError::Odoo(_) => "Odoo returned an error. Details logged.".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Roster(_) | AppError::Config(_) => "Configuration error.".to_string(),
            AppError::TlsConfig(_) | AppError::InvalidAddress(_) | AppError::Io(_) => {
                "Internal server error.".to_string()
            }
        };

        (status_code, Json(json!({ "error": message }))).into_response()
    }
}

// --- Gateway connection ---

/// Opens a fresh gateway session per request; nothing is shared between reports.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn RecordGateway>, OdooError>;
}

pub struct OdooConnector {
    config: OdooConfig,
}

impl OdooConnector {
    pub fn new(config: OdooConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl GatewayConnector for OdooConnector {
    async fn connect(&self) -> Result<Arc<dyn RecordGateway>, OdooError> {
        let client = OdooClient::connect(self.config.clone()).await?;
        Ok(Arc::new(client))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn GatewayConnector>,
    pub managers: Arc<ManagerMapping>,
}

impl AppState {
    async fn context(&self, tiers: Option<&str>) -> Result<ReportContext, AppError> {
        let policy = match tiers {
            Some(list) => MatchPolicy::parse_list(list)?,
            None => MatchPolicy::default(),
        };
        let gateway = self.connector.connect().await?;
        Ok(ReportContext::new(gateway)
            .with_policy(policy)
            .with_managers(self.managers.as_ref().clone()))
    }
}

// --- Query parameters ---

#[derive(Debug, Default, Deserialize)]
pub struct MissingParams {
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub tiers: Option<String>,
    /// Adds a per-designer breakdown for this project.
    pub project: Option<String>,
    /// Adds a per-designer breakdown for this manager's team.
    pub manager: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub tiers: Option<String>,
}

fn parse_date(name: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    raw.map(|value| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest(format!("{} must be YYYY-MM-DD, got '{}'", name, value))
        })
    })
    .transpose()
}

fn parse_status(raw: Option<&str>) -> Result<ShiftStatus, AppError> {
    raw.map(str::parse::<ShiftStatus>)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(AppError::BadRequest)
}

/// Start and end default to the first of the current month and today.
fn parse_range(params: &RangeParams) -> Result<(NaiveDate, NaiveDate), AppError> {
    let end = parse_date("end_date", params.end_date.as_deref())?
        .unwrap_or_else(|| Local::now().date_naive());
    let start = parse_date("start_date", params.start_date.as_deref())?
        .unwrap_or_else(|| month_start(end));
    if start > end {
        return Err(AppError::BadRequest(format!(
            "start_date {} is after end_date {}",
            start, end
        )));
    }
    Ok((start, end))
}

// --- Web Handlers ---

pub async fn handle_status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "server_time": Local::now().to_rfc3339(),
    }))
}

pub async fn handle_missing_report(
    State(state): State<AppState>,
    Query(params): Query<MissingParams>,
) -> Result<Json<MissingEntriesReport>, AppError> {
    let end_date = parse_date("end_date", params.end_date.as_deref())?
        .unwrap_or_else(|| Local::now().date_naive());
    let status = parse_status(params.status.as_deref())?;
    info!("Handling missing entries report for {} ({})", end_date, status);

    let mut context = state.context(params.tiers.as_deref()).await?;
    let mut report = context.missing_entries_report(end_date, status).await?;
    if let Some(project) = params.project.as_deref() {
        report = report.with_project_drill_down(project);
    }
    if let Some(manager) = params.manager.as_deref() {
        report = report.with_team_drill_down(manager, &state.managers);
    }
    Ok(Json(report))
}

pub async fn handle_timeliness_report(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<TimelinessReport>, AppError> {
    let (start, end) = parse_range(&params)?;
    info!("Handling timeliness report for {} to {}", start, end);

    let mut context = state.context(None).await?;
    Ok(Json(context.timeliness_report(start, end).await?))
}

pub async fn handle_trend_report(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<HistoricalPoint>>, AppError> {
    let (start, end) = parse_range(&params)?;
    let status = parse_status(params.status.as_deref())?;
    info!("Handling compliance trend for {} to {} ({})", start, end, status);

    let mut context = state.context(params.tiers.as_deref()).await?;
    Ok(Json(context.historical_compliance(start, end, status).await?))
}

pub fn router(state: AppState) -> Router {
    let report_routes = Router::new()
        .route("/missing", get(handle_missing_report))
        .route("/timeliness", get(handle_timeliness_report))
        .route("/trend", get(handle_trend_report));

    Router::new()
        .route("/status", get(handle_status))
        .nest("/api/report", report_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves over TLS when both cert and key paths are configured, plain HTTP otherwise.
pub async fn serve(config: &AppConfig, state: AppState) -> Result<(), AppError> {
    let addr = config.socket_addr()?;
    let app = router(state);

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .map_err(|e| {
                    let err_msg = format!("Failed to load TLS cert/key: {}", e);
                    error!("{}", err_msg);
                    AppError::TlsConfig(err_msg)
                })?;
            info!(
                "TLS configuration loaded successfully from {} and {}",
                cert_path.display(),
                key_path.display()
            );
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("Starting server on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}
