//! Configuration module for reportal.
//!
//! Handles backend configuration, environment variables, and settings.

mod backend;
mod settings;

pub use backend::BackendSettings;
pub use settings::{
    expand_env_vars, FormulaSettings, PoolSettings, ResultSettings, Settings, SettingsError,
    WorkerSettings,
};
