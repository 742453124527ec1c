//! Access to report definitions.
//!
//! Definitions are owned by an external store. The execution services only
//! read them through [`DefinitionStore`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::report::ReportDefinition;

/// Errors raised while loading definitions into the in-memory store.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("Failed to read definition file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse definition: {0}")]
    Parse(#[from] serde_json::Error),
}

#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Fetch a report definition by id.
    async fn report_definition(&self, report_id: &str) -> Option<Arc<ReportDefinition>>;

    /// All known report ids.
    async fn report_ids(&self) -> Vec<String>;
}

/// Definitions held in memory, keyed by report id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDefinitionStore {
    reports: HashMap<String, Arc<ReportDefinition>>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definitions(definitions: impl IntoIterator<Item = ReportDefinition>) -> Self {
        let mut store = Self::new();
        for definition in definitions {
            store.insert(definition);
        }
        store
    }

    pub fn insert(&mut self, definition: ReportDefinition) {
        self.reports
            .insert(definition.id.clone(), Arc::new(definition));
    }

    /// Parse either a single definition or an array of definitions.
    pub fn from_json_str(json: &str) -> Result<Self, DefinitionError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let definitions: Vec<ReportDefinition> = if value.is_array() {
            serde_json::from_value(value)?
        } else {
            vec![serde_json::from_value(value)?]
        };
        Ok(Self::with_definitions(definitions))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn report_definition(&self, report_id: &str) -> Option<Arc<ReportDefinition>> {
        self.reports.get(report_id).cloned()
    }

    async fn report_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.reports.keys().cloned().collect();
        ids.sort();
        ids
    }
}
