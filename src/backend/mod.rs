//! Warehouse backend drivers.
//!
//! Every warehouse is reached through a [`BackendDriver`]: submit a
//! statement, poll it, cancel it, read rows, and manage materialized
//! tables. Drivers report states in their own vocabulary; [`Vendor`]
//! translates them into [`ExecutionState`].
//!
//! - [`WorkerDriver`] - vendors served by the external driver worker
//! - [`SqliteDriver`] - in-process SQLite for local runs and tests

mod registry;
mod sqlite;
mod state;
mod worker;

pub use registry::BackendRegistry;
pub use sqlite::SqliteDriver;
pub use state::{ExecutionState, StatementExecutionStatus, Vendor, VendorStatus};
pub use worker::WorkerDriver;

use async_trait::async_trait;

use crate::filter::Filter;
use crate::query::{QueryComposer, SortOrder};
use crate::sql::Dialect;
use crate::value::Row;
use crate::worker::WorkerError;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Concurrent-statement or throttling limit; the caller may retry.
    #[error("Backend is busy: {0}")]
    Busy(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Unknown {vendor} statement state: {state}")]
    UnknownState { vendor: &'static str, state: String },

    #[error("Unknown execution id: {0}")]
    UnknownExecution(String),

    #[error("Statement failed: {0}")]
    StatementFailed(String),

    #[error("No backend registered for datasource {0}")]
    NoBackend(String),

    #[error(transparent)]
    Worker(WorkerError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl BackendError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Busy(_) => "BACKEND_BUSY",
            Self::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            Self::UnknownState { .. } => "UNKNOWN_STATE",
            Self::UnknownExecution(_) => "UNKNOWN_EXECUTION",
            Self::StatementFailed(_) => "STATEMENT_FAILED",
            Self::NoBackend(_) => "NO_BACKEND",
            Self::Worker(_) => "WORKER_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    pub fn is_entity_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound(_))
    }
}

impl From<WorkerError> for BackendError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Throttled(message) => Self::Busy(message),
            WorkerError::EntityNotFound(message) => Self::EntityNotFound(message),
            other => Self::Worker(other),
        }
    }
}

/// Where a statement runs, for vendors with catalogs and databases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementTarget {
    pub catalog: Option<String>,
    pub database: Option<String>,
}

/// A page read from a materialized table.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    /// Schema-qualified table name.
    pub table: &'a str,
    pub filters: &'a [Filter],
    pub sort: Option<&'a SortOrder>,
    /// 1-based page number.
    pub page: u64,
    pub page_size: u64,
}

/// A warehouse the orchestrator can run statements on.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    /// Datasource name this driver is registered under.
    fn name(&self) -> &str;

    fn vendor(&self) -> Vendor;

    fn dialect(&self) -> Dialect {
        self.vendor().dialect()
    }

    /// Submit a statement; returns the vendor execution id.
    async fn submit_statement(&self, sql: &str, target: &StatementTarget) -> BackendResult<String>;

    /// Current state of a submitted statement.
    async fn status(&self, execution_id: &str) -> BackendResult<VendorStatus>;

    /// Request cancellation. `false` when the statement already finished.
    async fn cancel(&self, execution_id: &str) -> BackendResult<bool>;

    /// Run a query to completion and return its rows.
    async fn query(&self, sql: &str) -> BackendResult<Vec<Row>>;

    /// Read one page of a table. Pages before the first are empty.
    async fn read_page(&self, request: PageRequest<'_>) -> BackendResult<Vec<Row>> {
        let composer = QueryComposer::new(self.dialect(), "");
        match composer.page_query(
            request.table,
            request.filters,
            request.sort,
            request.page,
            request.page_size,
        ) {
            Some(sql) => self.query(&sql).await,
            None => Ok(Vec::new()),
        }
    }

    async fn table_exists(&self, table: &str) -> BackendResult<bool>;

    /// Materialize `select` into `table`, waiting for completion.
    async fn create_as_select(&self, table: &str, select: &str) -> BackendResult<()>;
}
