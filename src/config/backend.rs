//! Per-backend connection configuration.

use serde::{Deserialize, Serialize};

use super::settings::{expand_env_vars, SettingsError};
use crate::backend::Vendor;

/// One `[backends.<name>]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendSettings {
    /// Warehouse vendor (redshift, athena, sqlite).
    pub vendor: String,

    /// Connection string (supports ${ENV_VAR} expansion).
    #[serde(default)]
    pub connection_string: String,

    /// Catalog statements run against, where the vendor has one.
    #[serde(default)]
    pub catalog: Option<String>,

    /// Database statements run against.
    #[serde(default)]
    pub database: Option<String>,
}

impl BackendSettings {
    pub fn new(vendor: Vendor, connection_string: impl Into<String>) -> Self {
        Self {
            vendor: vendor.as_str().to_string(),
            connection_string: connection_string.into(),
            catalog: None,
            database: None,
        }
    }

    /// Get the vendor type.
    pub fn vendor_type(&self) -> Result<Vendor, SettingsError> {
        self.vendor
            .parse()
            .map_err(|_| SettingsError::UnsupportedVendor(self.vendor.clone()))
    }

    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }
}
