//! TOML-based configuration for reportal.
//!
//! Supports a config file (reportal.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! default_backend = "datamart"
//!
//! [backends.datamart]
//! vendor = "redshift"
//! connection_string = "${DATAMART_URL}"
//! database = "datamart"
//!
//! [backends.nomis]
//! vendor = "athena"
//! connection_string = "${ATHENA_WORKGROUP}"
//! catalog = "nomis"
//! database = "DIGITAL_PRISON_REPORTING"
//!
//! [results]
//! schema = "reports"
//! default_page_size = 20
//!
//! [formula]
//! env = "dev"
//!
//! [worker]
//! path = "./reportal-worker"
//! timeout_secs = 30
//!
//! [worker.pool]
//! max_idle_conns = 5
//! max_open_conns = 10
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::backend::BackendSettings;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    #[error("Unsupported vendor: {0}")]
    UnsupportedVendor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Backend used for datasource names with no configured backend.
    pub default_backend: Option<String>,

    /// Named warehouse backends, keyed by datasource name.
    pub backends: HashMap<String, BackendSettings>,

    /// Where result and summary tables are materialized.
    pub results: ResultSettings,

    /// Formula configuration.
    pub formula: FormulaSettings,

    /// Worker configuration.
    pub worker: WorkerSettings,
}

/// Result table configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResultSettings {
    /// Schema result and summary tables are created in.
    pub schema: String,

    /// Page size used when a caller does not send one.
    pub default_page_size: u64,
}

impl Default for ResultSettings {
    fn default() -> Self {
        Self {
            schema: "reports".to_string(),
            default_page_size: 20,
        }
    }
}

/// Formula configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FormulaSettings {
    /// Environment token substituted for `${env}` in generated links.
    pub env: Option<String>,
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to the driver worker binary.
    pub path: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Connection pool settings.
    pub pool: PoolSettings,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            path: None,
            timeout_secs: 30,
            pool: PoolSettings::default(),
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of idle connections per pool.
    pub max_idle_conns: u32,

    /// Maximum number of open connections per pool.
    pub max_open_conns: u32,

    /// Maximum connection lifetime (e.g., "5m", "1h").
    pub conn_max_lifetime: String,

    /// Maximum connection idle time (e.g., "1m", "30s").
    pub conn_max_idle_time: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle_conns: 5,
            max_open_conns: 10,
            conn_max_lifetime: "5m".to_string(),
            conn_max_idle_time: "1m".to_string(),
        }
    }
}

impl PoolSettings {
    /// Convert to worker command-line arguments.
    pub fn to_worker_args(&self) -> Vec<String> {
        vec![
            "-pool".to_string(),
            format!("-pool-max-idle={}", self.max_idle_conns),
            format!("-pool-max-open={}", self.max_open_conns),
            format!("-pool-conn-lifetime={}", self.conn_max_lifetime),
            format!("-pool-conn-idle={}", self.conn_max_idle_time),
        ]
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text and check backend references.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.check()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `REPORTAL_CONFIG`
    /// 2. `./reportal.toml`
    /// 3. `~/.config/reportal/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("REPORTAL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("reportal.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("reportal").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    fn check(&self) -> Result<(), SettingsError> {
        for backend in self.backends.values() {
            backend.vendor_type()?;
        }
        if let Some(name) = &self.default_backend {
            self.get_backend(name)?;
        }
        if self.results.default_page_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "results.default_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get a backend by name.
    pub fn get_backend(&self, name: &str) -> Result<&BackendSettings, SettingsError> {
        self.backends
            .get(name)
            .ok_or_else(|| SettingsError::BackendNotFound(name.to_string()))
    }

    /// Get the worker binary path, with environment variables expanded.
    pub fn worker_path(&self) -> Option<PathBuf> {
        let path = self.worker.path.as_ref()?;
        let expanded = expand_env_vars(path).ok()?;
        Some(PathBuf::from(expanded))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut var_name = String::new();
        while let Some(&ch) = chars.peek() {
            if braced && ch == '}' {
                chars.next();
                break;
            }
            if !braced && !(ch.is_alphanumeric() || ch == '_') {
                break;
            }
            var_name.push(ch);
            chars.next();
        }

        if var_name.is_empty() && !braced {
            // Just a lone $, keep it
            result.push('$');
            continue;
        }
        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
