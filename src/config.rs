// src/config.rs
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::odoo_client::{OdooConfig, DEFAULT_REQUEST_TIMEOUT_SECS};

pub const DEFAULT_ROSTER_PATH: &str = "uhd_data.csv";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    // Odoo connection
    pub odoo_url: String,
    pub odoo_db: String,
    pub odoo_username: String,
    pub odoo_password: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // Employee roster
    #[serde(default = "default_roster_path")]
    pub roster_path: PathBuf,

    // Server Configuration
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// TLS is only enabled when both paths are set.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_roster_path() -> PathBuf {
    PathBuf::from(DEFAULT_ROSTER_PATH)
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        envy::from_env::<AppConfig>()
    }

    /// Same as `from_env` but without touching `.env`, for callers that already
    /// assembled the variables themselves.
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(vars)
    }

    pub fn odoo(&self) -> OdooConfig {
        OdooConfig {
            url: self.odoo_url.clone(),
            db: self.odoo_db.clone(),
            username: self.odoo_username.clone(),
            password: self.odoo_password.clone(),
            request_timeout_secs: self.request_timeout_secs,
        }
    }

    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server_host, self.server_port).parse()
    }
}
