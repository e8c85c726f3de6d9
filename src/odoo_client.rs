// src/odoo_client.rs

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::Domain;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const JSONRPC_PATH: &str = "jsonrpc";

/// A record exactly as the record store returned it.
pub type RawRecord = serde_json::Map<String, Value>;

/// Field metadata keyed by field name, as returned by `fields_get`.
pub type FieldMap = HashMap<String, FieldInfo>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldInfo {
    #[serde(default)]
    pub string: Option<String>,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub relation: Option<String>,
}

// --- Gateway Error Type ---
#[derive(Error, Debug)]
pub enum OdooError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Authentication rejected for user '{username}' on database '{db}'")]
    AuthenticationFailed { db: String, username: String },

    #[error("Remote call failed: {message}")]
    Rpc { message: String },

    #[error("Call against '{model}' timed out after {seconds}s")]
    Timeout { model: String, seconds: u64 },

    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),
}

impl OdooError {
    /// Auth and transport failures. These abort a whole report instead of being
    /// skipped like a single failing query.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            OdooError::Request(_)
                | OdooError::UrlParse(_)
                | OdooError::AuthenticationFailed { .. }
                | OdooError::Timeout { .. }
        )
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OdooConfig {
    pub url: String,
    pub db: String,
    pub username: String,
    pub password: String,
    pub request_timeout_secs: u64,
}

impl Default for OdooConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            db: String::new(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Read access to the record store. This is the only boundary the engine depends on,
/// so the transport behind it is replaceable.
#[async_trait]
pub trait RecordGateway: Send + Sync {
    async fn search_read(
        &self,
        model: &str,
        domain: &Domain,
        fields: &[String],
    ) -> Result<Vec<RawRecord>, OdooError>;

    async fn fields_get(&self, model: &str) -> Result<FieldMap, OdooError>;
}

// --- JSON-RPC envelope ---

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: RpcParams<'a>,
    id: u64,
}

#[derive(Debug, Serialize)]
struct RpcParams<'a> {
    service: &'a str,
    method: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: Option<String>,
}

impl RpcErrorPayload {
    fn describe(self) -> String {
        let detail = self.data.and_then(|d| d.message);
        match (self.message, detail) {
            (Some(m), Some(d)) => format!("{}: {}", m, d),
            (Some(m), None) => m,
            (None, Some(d)) => d,
            (None, None) => "unknown remote error".to_string(),
        }
    }
}

// --- Client ---

/// An authenticated session against one database. Owned by the caller of a report
/// invocation; nothing here is global.
#[derive(Clone)]
pub struct OdooClient {
    config: Arc<OdooConfig>,
    http_client: Client,
    endpoint: Url,
    uid: i64,
    next_id: Arc<AtomicU64>,
}

impl OdooClient {
    /// Builds the HTTP client and authenticates. A rejected login is
    /// `OdooError::AuthenticationFailed`.
    pub async fn connect(config: OdooConfig) -> Result<Self, OdooError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http_client = Client::builder().timeout(timeout).build()?;
        let endpoint = Self::endpoint_url(&config.url)?;

        let mut client = Self {
            config: Arc::new(config),
            http_client,
            endpoint,
            uid: 0,
            next_id: Arc::new(AtomicU64::new(1)),
        };

        let args = json!([
            client.config.db,
            client.config.username,
            client.config.password,
            {}
        ]);
        let result = match client.call("authenticate", "common", "authenticate", args).await {
            Ok(value) => value,
            Err(e) => {
                error!("Odoo connection error: {}", e);
                return Err(e);
            }
        };

        // A failed login comes back as `false`, not as an RPC error.
        match result.as_i64() {
            Some(uid) if uid > 0 => {
                client.uid = uid;
                info!("Successfully connected to Odoo (UID: {})", uid);
                Ok(client)
            }
            _ => {
                error!("Odoo authentication failed - invalid credentials");
                Err(OdooError::AuthenticationFailed {
                    db: client.config.db.clone(),
                    username: client.config.username.clone(),
                })
            }
        }
    }

    pub fn endpoint_url(base: &str) -> Result<Url, OdooError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(JSONRPC_PATH)?)
    }

    async fn call(
        &self,
        label: &str,
        service: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, OdooError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams {
                service,
                method,
                args,
            },
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let seconds = self.config.request_timeout_secs;
        let send = self
            .http_client
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send();

        let response = match tokio::time::timeout(Duration::from_secs(seconds), send).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Call '{}' timed out after {}s", label, seconds);
                return Err(OdooError::Timeout {
                    model: label.to_string(),
                    seconds,
                });
            }
        };

        let status = response.status();
        debug!("Received response for '{}': Status={}", label, status);
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
            error!("RPC Error Response: Status={}, Body='{}'", status, body);
            return Err(OdooError::Rpc {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let bytes = response.bytes().await?;
        let envelope: RpcResponse = serde_json::from_slice(&bytes)?;
        if let Some(err) = envelope.error {
            return Err(OdooError::Rpc {
                message: err.describe(),
            });
        }
        envelope
            .result
            .ok_or_else(|| OdooError::UnexpectedResponse(format!("'{}' returned no result", label)))
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        positional: Value,
        keyword: Value,
    ) -> Result<Value, OdooError> {
        let args = json!([
            self.config.db,
            self.uid,
            self.config.password,
            model,
            method,
            positional,
            keyword
        ]);
        self.call(model, "object", "execute_kw", args).await
    }
}

#[async_trait]
impl RecordGateway for OdooClient {
    async fn search_read(
        &self,
        model: &str,
        domain: &Domain,
        fields: &[String],
    ) -> Result<Vec<RawRecord>, OdooError> {
        let value = self
            .execute_kw(
                model,
                "search_read",
                json!([domain.to_json()]),
                json!({ "fields": fields }),
            )
            .await?;

        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(OdooError::UnexpectedResponse(format!(
                        "search_read on {} returned a non-object row: {}",
                        model, other
                    ))),
                })
                .collect(),
            other => Err(OdooError::UnexpectedResponse(format!(
                "search_read on {} returned {}",
                model, other
            ))),
        }
    }

    async fn fields_get(&self, model: &str) -> Result<FieldMap, OdooError> {
        let value = self
            .execute_kw(
                model,
                "fields_get",
                json!([]),
                json!({ "attributes": ["string", "type", "relation"] }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_appends_jsonrpc_path() {
        let url = OdooClient::endpoint_url("https://example.odoo.com/").unwrap();
        assert_eq!(url.as_str(), "https://example.odoo.com/jsonrpc");

        let url = OdooClient::endpoint_url("https://example.odoo.com/odoo").unwrap();
        assert_eq!(url.as_str(), "https://example.odoo.com/odoo/jsonrpc");
    }

    #[test]
    fn test_endpoint_url_rejects_garbage() {
        let err = OdooClient::endpoint_url("not a url").unwrap_err();
        assert!(matches!(err, OdooError::UrlParse(_)));
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_rpc_error_message_includes_detail() {
        let payload: RpcErrorPayload = serde_json::from_value(json!({
            "message": "Odoo Server Error",
            "data": { "message": "Invalid field 'x_studio_shift_status'" }
        }))
        .unwrap();
        assert_eq!(
            payload.describe(),
            "Odoo Server Error: Invalid field 'x_studio_shift_status'"
        );
    }

    #[test]
    fn test_field_info_tolerates_missing_attributes() {
        let fields: FieldMap = serde_json::from_value(json!({
            "resource_id": { "string": "Resource", "type": "many2one", "relation": "resource.resource" },
            "allocated_hours": { "type": "float" }
        }))
        .unwrap();
        assert_eq!(
            fields["resource_id"].relation.as_deref(),
            Some("resource.resource")
        );
        assert_eq!(fields["allocated_hours"].string, None);
    }

    #[test]
    fn test_rpc_failures_are_not_connectivity_errors() {
        let err = OdooError::Rpc {
            message: "boom".into(),
        };
        assert!(!err.is_connectivity());
    }
}
