//! Canonical execution states and vendor vocabularies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::BackendError;
use crate::sql::Dialect;

/// Backend-agnostic statement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Submitted,
    Started,
    Picked,
    Finished,
    Failed,
    Aborted,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Started => "STARTED",
            Self::Picked => "PICKED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Aborted)
    }

    /// Position in the lifecycle; terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Started => 1,
            Self::Picked => 2,
            Self::Finished | Self::Failed | Self::Aborted => 3,
        }
    }

    /// Combine a freshly polled state with the last observed one.
    ///
    /// Terminal states are sticky and no state moves backwards.
    pub fn advance(previous: Option<Self>, observed: Self) -> Self {
        match previous {
            Some(prev) if prev.is_terminal() => prev,
            Some(prev) if observed.rank() < prev.rank() => prev,
            _ => observed,
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported warehouse vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Redshift,
    Athena,
    Sqlite,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Redshift => "redshift",
            Vendor::Athena => "athena",
            Vendor::Sqlite => "sqlite",
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Vendor::Redshift => Dialect::Redshift,
            Vendor::Athena => Dialect::Athena,
            Vendor::Sqlite => Dialect::Sqlite,
        }
    }

    /// Translate a vendor state name into the canonical vocabulary.
    pub fn translate(&self, state: &str) -> Result<ExecutionState, BackendError> {
        let normalized = state.trim().to_ascii_uppercase();
        let translated = match self {
            Vendor::Redshift | Vendor::Sqlite => match normalized.as_str() {
                "SUBMITTED" => Some(ExecutionState::Submitted),
                "STARTED" => Some(ExecutionState::Started),
                "PICKED" => Some(ExecutionState::Picked),
                "FINISHED" => Some(ExecutionState::Finished),
                "FAILED" => Some(ExecutionState::Failed),
                "ABORTED" => Some(ExecutionState::Aborted),
                _ => None,
            },
            Vendor::Athena => match normalized.as_str() {
                "QUEUED" => Some(ExecutionState::Submitted),
                "RUNNING" => Some(ExecutionState::Started),
                "SUCCEEDED" => Some(ExecutionState::Finished),
                "FAILED" => Some(ExecutionState::Failed),
                "CANCELLED" => Some(ExecutionState::Aborted),
                _ => None,
            },
        };
        translated.ok_or_else(|| BackendError::UnknownState {
            vendor: self.as_str(),
            state: state.to_string(),
        })
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redshift" => Ok(Vendor::Redshift),
            "athena" => Ok(Vendor::Athena),
            "sqlite" => Ok(Vendor::Sqlite),
            other => Err(format!("Unknown vendor: {}", other)),
        }
    }
}

/// Status of a statement as reported by its driver, in vendor vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VendorStatus {
    pub state: String,
    pub duration_nanos: Option<u64>,
    pub result_rows: Option<u64>,
    pub result_size_bytes: Option<u64>,
    pub error: Option<String>,
    /// Vendor classification of the error, e.g. `SYNTAX_ERROR`.
    pub error_category: Option<String>,
    pub state_change_reason: Option<String>,
}

impl VendorStatus {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_error_category(mut self, category: impl Into<String>) -> Self {
        self.error_category = Some(category.into());
        self
    }

    pub fn with_state_change_reason(mut self, reason: impl Into<String>) -> Self {
        self.state_change_reason = Some(reason.into());
        self
    }
}

/// Status of a statement in canonical vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementExecutionStatus {
    pub status: ExecutionState,
    pub duration_nanos: u64,
    pub result_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_change_reason: Option<String>,
}

impl StatementExecutionStatus {
    pub fn new(status: ExecutionState) -> Self {
        Self {
            status,
            duration_nanos: 0,
            result_rows: 0,
            result_size_bytes: None,
            error: None,
            error_category: None,
            state_change_reason: None,
        }
    }

    /// Translate a driver status through the vendor vocabulary.
    ///
    /// Counters the driver does not report read as zero.
    pub fn from_vendor(vendor: Vendor, status: VendorStatus) -> Result<Self, BackendError> {
        Ok(Self {
            status: vendor.translate(&status.state)?,
            duration_nanos: status.duration_nanos.unwrap_or(0),
            result_rows: status.result_rows.unwrap_or(0),
            result_size_bytes: status.result_size_bytes,
            error: status.error,
            error_category: status.error_category,
            state_change_reason: status.state_change_reason,
        })
    }

    pub fn with_state(mut self, status: ExecutionState) -> Self {
        self.status = status;
        self
    }
}
