// src/lib.rs
pub mod compliance;
pub mod config;
pub mod domain;
pub mod field_cache;
pub mod odoo_client;
pub mod planning_data;
pub mod reconciliation;
pub mod records;
pub mod reporting;
pub mod roster;
pub mod server;
pub mod slot_query;
pub mod timeliness;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod server_tests;
