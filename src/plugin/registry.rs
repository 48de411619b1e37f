use std::collections::HashMap;

use crate::plugin::endpoint::Endpoint;
use crate::plugin::manifest::{PluginDescriptor, PluginId};

#[derive(Debug)]
pub struct PluginRecord {
    pub id: PluginId,
    pub endpoint: Box<dyn Endpoint>,
    pub trusted_origin: String,
}

#[derive(Debug, Default)]
pub struct PluginRegistry {
    records: HashMap<PluginId, PluginRecord>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the record for `id`, silently replacing any earlier registration.
    pub fn insert(
        &mut self,
        id: PluginId,
        endpoint: Box<dyn Endpoint>,
        trusted_origin: impl Into<String>,
    ) {
        let trusted_origin = trusted_origin.into();
        tracing::info!("registering plugin {id} (origin {trusted_origin})");

        let record = PluginRecord {
            id: id.clone(),
            endpoint,
            trusted_origin,
        };
        if self.records.insert(id, record).is_some() {
            tracing::debug!("previous registration replaced");
        }
    }

    pub fn register(&mut self, descriptor: &PluginDescriptor, endpoint: Box<dyn Endpoint>) {
        self.insert(descriptor.id(), endpoint, descriptor.trusted_origin());
    }

    pub fn unregister(&mut self, id: &PluginId) -> Option<PluginRecord> {
        let removed = self.records.remove(id);
        if removed.is_some() {
            tracing::info!("unregistered plugin {id}");
        }
        removed
    }

    pub fn lookup(&self, id: &str) -> Option<&PluginRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lookup(id).is_some()
    }

    pub fn plugin_count(&self) -> usize {
        self.records.len()
    }

    pub fn summary_notification(&self) -> String {
        format!("plugins: {} registered", self.plugin_count())
    }

    pub fn list_notifications(&self) -> Vec<String> {
        if self.records.is_empty() {
            return vec!["plugins: none registered".to_string()];
        }

        let mut rows: Vec<String> = self
            .records
            .values()
            .map(|record| format!("plugin {} ({})", record.id, record.trusted_origin))
            .collect();

        rows.sort();
        rows
    }
}
