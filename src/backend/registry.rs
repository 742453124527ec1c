//! Datasource name → driver lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::{BackendDriver, BackendError, BackendResult, SqliteDriver, Vendor, WorkerDriver};
use crate::config::{Settings, SettingsError};
use crate::worker::WorkerClient;

/// Drivers keyed by lowercase datasource name.
///
/// Unknown names resolve to the fallback driver when one is set.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    drivers: HashMap<String, Arc<dyn BackendDriver>>,
    fallback: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its own name.
    pub fn register(&mut self, driver: Arc<dyn BackendDriver>) -> &mut Self {
        self.drivers.insert(driver.name().to_lowercase(), driver);
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn BackendDriver>) -> Self {
        self.register(driver);
        self
    }

    /// Set the driver used for unregistered datasource names.
    pub fn with_fallback(mut self, name: &str) -> Self {
        self.fallback = Some(name.to_lowercase());
        self
    }

    pub fn get(&self, datasource: &str) -> BackendResult<Arc<dyn BackendDriver>> {
        self.drivers
            .get(&datasource.to_lowercase())
            .or_else(|| self.fallback.as_ref().and_then(|f| self.drivers.get(f)))
            .cloned()
            .ok_or_else(|| BackendError::NoBackend(datasource.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build drivers for every configured backend.
    ///
    /// One worker process is spawned and shared when any backend needs it.
    pub async fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let mut registry = Self::new();
        let mut client: Option<Arc<WorkerClient>> = None;

        let mut names: Vec<&String> = settings.backends.keys().collect();
        names.sort();

        for name in names {
            let backend = &settings.backends[name];
            let driver: Arc<dyn BackendDriver> = match backend.vendor_type()? {
                Vendor::Sqlite => Arc::new(
                    SqliteDriver::open(
                        name.as_str(),
                        backend.resolved_connection_string()?,
                        &settings.results.schema,
                    )
                    .map_err(|e| SettingsError::InvalidConfig(format!("backend {}: {}", name, e)))?,
                ),
                Vendor::Redshift | Vendor::Athena => {
                    let shared = match &client {
                        Some(shared) => shared.clone(),
                        None => {
                            let spawned = WorkerClient::spawn_with_settings(&settings.worker)
                                .await
                                .map_err(|e| {
                                    SettingsError::InvalidConfig(format!("worker: {}", e))
                                })?;
                            let spawned = Arc::new(spawned);
                            client = Some(spawned.clone());
                            spawned
                        }
                    };
                    Arc::new(WorkerDriver::from_settings(name, backend, shared)?)
                }
            };
            tracing::debug!(backend = %name, vendor = %backend.vendor, "registered backend");
            registry.register(driver);
        }

        if let Some(fallback) = &settings.default_backend {
            registry = registry.with_fallback(fallback);
        }
        Ok(registry)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("drivers", &self.names())
            .field("fallback", &self.fallback)
            .finish()
    }
}
