//! Protocol types for worker communication.
//!
//! The driver worker speaks NDJSON: one request envelope per line on
//! stdin, one response envelope per line on stdout, correlated by `id`.

use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Envelope
// ============================================================================

/// Request envelope sent to the worker.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation.
    pub id: String,
    /// Method name (e.g., "statement.submit").
    pub method: String,
    /// Method-specific parameters.
    pub params: serde_json::Value,
}

/// Response envelope received from the worker.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to.
    pub id: String,
    /// Whether the request succeeded.
    pub success: bool,
    /// Result data (present if success = true).
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error information (present if success = false).
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

/// Error information in a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Connection Parameters (included in all requests)
// ============================================================================

/// Warehouse connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Vendor driver name (e.g., "redshift", "athena").
    pub driver: String,
    /// Driver-specific connection string.
    pub connection_string: String,
}

// ============================================================================
// Statement Parameters
// ============================================================================

/// Parameters for `statement.submit`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitStatementParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    /// SQL statement to run asynchronously.
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Parameters for `statement.status` and `statement.cancel`.
#[derive(Debug, Clone, Serialize)]
pub struct StatementParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    /// Vendor execution id returned by `statement.submit`.
    pub execution_id: String,
}

/// Parameters for `query.execute`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteQueryParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    /// SQL query to execute.
    pub sql: String,
    /// Query parameters (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<serde_json::Value>>,
}

/// Parameters for `table.exists`.
#[derive(Debug, Clone, Serialize)]
pub struct TableParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    /// Schema-qualified table name.
    pub table: String,
}

/// Parameters for `table.create_as_select`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateAsSelectParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    /// Schema-qualified table to create.
    pub table: String,
    /// Full `CREATE TABLE ... AS` statement in the vendor dialect.
    pub sql: String,
}

// ============================================================================
// Response Types
// ============================================================================

/// Response from `statement.submit`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitStatementResponse {
    pub execution_id: String,
}

/// Response from `statement.status`, in the vendor's own vocabulary.
#[derive(Debug, Clone, Deserialize)]
pub struct StatementStatusResponse {
    /// Vendor state name (e.g., "RUNNING", "SUCCEEDED").
    pub state: String,
    #[serde(default)]
    pub duration_nanos: Option<u64>,
    #[serde(default)]
    pub result_rows: Option<u64>,
    #[serde(default)]
    pub result_size_bytes: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_category: Option<String>,
    #[serde(default)]
    pub state_change_reason: Option<String>,
}

/// Response from `statement.cancel`.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelStatementResponse {
    pub cancelled: bool,
}

/// Column information in query results.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResultColumn {
    /// Column name or alias.
    pub name: String,
    /// Database-specific type.
    pub data_type: String,
}

/// Response from `query.execute`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteQueryResponse {
    /// Result column descriptions.
    pub columns: Vec<QueryResultColumn>,
    /// Result data rows.
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Number of rows returned.
    pub row_count: i32,
}

/// Response from `table.exists`.
#[derive(Debug, Clone, Deserialize)]
pub struct TableExistsResponse {
    pub exists: bool,
}

/// Response from `table.create_as_select`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAsSelectResponse {
    #[serde(default)]
    pub rows_affected: Option<i64>,
}

// ============================================================================
// Method Names
// ============================================================================

/// Worker method names.
pub mod methods {
    pub const SUBMIT_STATEMENT: &str = "statement.submit";
    pub const STATEMENT_STATUS: &str = "statement.status";
    pub const CANCEL_STATEMENT: &str = "statement.cancel";
    pub const EXECUTE_QUERY: &str = "query.execute";
    pub const TABLE_EXISTS: &str = "table.exists";
    pub const CREATE_AS_SELECT: &str = "table.create_as_select";
}
