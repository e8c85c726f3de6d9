// src/field_cache.rs

use std::collections::HashMap;
use tracing::{debug, error};

use crate::odoo_client::{FieldMap, RecordGateway};

/// Per-model schema cache for one report invocation.
///
/// A failed schema lookup yields an empty map and is not cached, so the next caller
/// retries instead of inheriting the failure.
#[derive(Debug, Default)]
pub struct FieldDiscoveryCache {
    models: HashMap<String, FieldMap>,
}

impl FieldDiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fields_for<G: RecordGateway + ?Sized>(
        &mut self,
        gateway: &G,
        model: &str,
    ) -> FieldMap {
        if let Some(fields) = self.models.get(model) {
            debug!("Field cache hit for model {}", model);
            return fields.clone();
        }

        match gateway.fields_get(model).await {
            Ok(fields) => {
                debug!("Discovered {} fields on model {}", fields.len(), model);
                self.models.insert(model.to_string(), fields.clone());
                fields
            }
            Err(e) => {
                error!("Error getting fields for model {}: {}", model, e);
                FieldMap::new()
            }
        }
    }

    /// Keeps only the wanted fields the schema exposes, in the order they were asked for.
    pub async fn available_fields<G: RecordGateway + ?Sized>(
        &mut self,
        gateway: &G,
        model: &str,
        wanted: &[&str],
    ) -> (Vec<String>, FieldMap) {
        let fields = self.fields_for(gateway, model).await;
        let requested = wanted
            .iter()
            .filter(|name| fields.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        (requested, fields)
    }

    pub fn is_cached(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }
}
