//! Requests and responses of the execution services.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::{ExecutionState, StatementExecutionStatus, StatementTarget};

/// Handle returned by an asynchronous submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementExecutionResponse {
    /// Opaque result table id the statement materializes.
    pub table_id: String,
    /// Execution id to poll. For multiphase reports this is the root id.
    pub execution_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// What a status poll addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionHandle<'a> {
    Execution(&'a str),
    /// A result table; polling checks the table exists.
    Table(&'a str),
}

/// An asynchronous report submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub report_id: String,
    pub variant_id: String,
    #[serde(default)]
    pub filters: HashMap<String, String>,
    #[serde(default)]
    pub sort_column: Option<String>,
    #[serde(default = "ascending")]
    pub sorted_asc: bool,
}

impl ReportRequest {
    pub fn new(report_id: impl Into<String>, variant_id: impl Into<String>) -> Self {
        Self {
            report_id: report_id.into(),
            variant_id: variant_id.into(),
            filters: HashMap::new(),
            sort_column: None,
            sorted_asc: true,
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn sorted_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.sort_column = Some(column.into());
        self.sorted_asc = ascending;
        self
    }
}

/// A page request. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: u64,
    pub page_size: u64,
}

impl Page {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self { page, page_size }
    }
}

fn ascending() -> bool {
    true
}

/// Identifies an execution on one datasource.
///
/// Execution ids are only unique per backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionKey {
    pub datasource: String,
    pub execution_id: String,
}

impl ExecutionKey {
    pub fn new(datasource: &str, execution_id: &str) -> Self {
        Self {
            datasource: datasource.to_lowercase(),
            execution_id: execution_id.to_string(),
        }
    }
}

/// One statement of a multiphase execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExecution {
    pub root_execution_id: String,
    /// Set once this phase is submitted.
    pub current_execution_id: Option<String>,
    pub datasource: String,
    pub catalog: Option<String>,
    pub database: Option<String>,
    /// Declared phase index.
    pub index: u32,
    /// Fully rendered statement.
    pub query: String,
    pub current_state: Option<ExecutionState>,
    pub error: Option<String>,
}

impl QueryExecution {
    pub fn target(&self) -> StatementTarget {
        StatementTarget {
            catalog: self.catalog.clone(),
            database: self.database.clone(),
        }
    }
}

/// A report split into sequential statements behind one root handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiphaseQueryExecution {
    /// Datasource callers poll the root through.
    pub datasource: String,
    /// Execution id of the first phase; what callers poll.
    pub root_execution_id: String,
    pub table_id: String,
    pub phases: Vec<QueryExecution>,
    /// Position of the phase running or being submitted.
    pub current: usize,
}

impl MultiphaseQueryExecution {
    pub fn key(&self) -> ExecutionKey {
        ExecutionKey::new(&self.datasource, &self.root_execution_id)
    }

    pub fn current_phase(&self) -> Option<&QueryExecution> {
        self.phases.get(self.current)
    }

    pub fn is_last_phase(&self) -> bool {
        self.current + 1 >= self.phases.len()
    }

    /// True once any phase failed or was aborted.
    pub fn is_stopped(&self) -> bool {
        self.phases.iter().any(|p| {
            matches!(
                p.current_state,
                Some(ExecutionState::Failed | ExecutionState::Aborted)
            )
        })
    }

    /// Record a polled status of the phase at `position`.
    ///
    /// When that phase is current and has finished, the next phase becomes
    /// current and is returned for submission. Each phase is handed out at
    /// most once, so concurrent polls cannot submit it twice. Polls of a
    /// phase that is no longer current are ignored.
    pub fn record_phase(
        &mut self,
        position: usize,
        status: &StatementExecutionStatus,
    ) -> Option<QueryExecution> {
        if position != self.current {
            return None;
        }
        let phase = self.phases.get_mut(position)?;
        let state = ExecutionState::advance(phase.current_state, status.status);
        phase.current_state = Some(state);
        if status.error.is_some() {
            phase.error = status.error.clone();
        }

        if state != ExecutionState::Finished || self.is_stopped() || self.is_last_phase() {
            return None;
        }
        self.current += 1;
        self.phases.get(self.current).cloned()
    }

    /// Record the execution id of the submitted phase at `position`.
    pub fn phase_submitted(&mut self, position: usize, execution_id: &str) {
        if let Some(phase) = self.phases.get_mut(position) {
            phase.current_execution_id = Some(execution_id.to_string());
            phase.current_state = Some(ExecutionState::Submitted);
        }
    }

    /// Hand back a phase whose submission failed; a later poll claims it
    /// again.
    pub fn release_phase(&mut self, position: usize) {
        let unsubmitted = self
            .phases
            .get(position)
            .is_some_and(|p| p.current_execution_id.is_none());
        if position > 0 && position == self.current && unsubmitted {
            self.current = position - 1;
        }
    }

    pub fn abort_current(&mut self) {
        if let Some(phase) = self.phases.get_mut(self.current) {
            phase.current_state = Some(ExecutionState::Aborted);
        }
    }
}
