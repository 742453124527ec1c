//! In-process SQLite backend.
//!
//! Statements run to completion at submission; status polls report the
//! recorded outcome. Outcomes of the most recent statements are kept,
//! older ones are forgotten. Result tables live in an attached schema so they can
//! be addressed as `<schema>.<table>` like on the warehouses.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use super::{BackendDriver, BackendError, BackendResult, ExecutionState, StatementTarget, Vendor, VendorStatus};
use crate::retained::Retained;
use crate::sql::dialect::helpers;
use crate::sql::SqlDialect;
use crate::value::{Row, Value};

const MAIN_SCHEMA: &str = "main";

/// Statement outcomes kept for status polls.
pub const DEFAULT_STATEMENT_RETENTION: usize = 1024;

#[derive(Debug, Clone)]
struct SqliteStatement {
    state: ExecutionState,
    duration_nanos: u64,
    error: Option<String>,
}

pub struct SqliteDriver {
    name: String,
    conn: Mutex<Connection>,
    statements: Mutex<Retained<String, SqliteStatement>>,
}

impl SqliteDriver {
    /// Open an in-memory database with `result_schema` attached.
    pub fn open_in_memory(name: impl Into<String>, result_schema: &str) -> BackendResult<Self> {
        Self::with_connection(name, Connection::open_in_memory()?, result_schema)
    }

    /// Open a database file (or `:memory:`) with `result_schema` attached.
    pub fn open<P: AsRef<Path>>(
        name: impl Into<String>,
        path: P,
        result_schema: &str,
    ) -> BackendResult<Self> {
        let path = path.as_ref();
        let conn = if path.as_os_str().is_empty() || path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::with_connection(name, conn, result_schema)
    }

    fn with_connection(
        name: impl Into<String>,
        conn: Connection,
        result_schema: &str,
    ) -> BackendResult<Self> {
        let schema = helpers::sanitize_identifier(result_schema);
        if !schema.is_empty() && !schema.eq_ignore_ascii_case(MAIN_SCHEMA) {
            conn.execute_batch(&format!("ATTACH DATABASE ':memory:' AS {}", schema))?;
        }
        Ok(Self {
            name: name.into(),
            conn: Mutex::new(conn),
            statements: Mutex::new(Retained::new(DEFAULT_STATEMENT_RETENTION)),
        })
    }

    /// Keep the outcomes of at most `capacity` statements.
    pub fn with_statement_retention(self, capacity: usize) -> Self {
        Self {
            statements: Mutex::new(Retained::new(capacity)),
            ..self
        }
    }

    fn statements(&self) -> BackendResult<MutexGuard<'_, Retained<String, SqliteStatement>>> {
        self.statements
            .lock()
            .map_err(|_| BackendError::StatementFailed("sqlite statement log poisoned".into()))
    }

    /// Run setup SQL (fixture tables, seed rows).
    pub fn seed(&self, sql: &str) -> BackendResult<()> {
        self.with_conn(|conn| conn.execute_batch(sql))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> BackendResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| BackendError::StatementFailed("sqlite connection poisoned".into()))?;
        f(&conn).map_err(classify)
    }

    fn run_query(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<Row>> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), to_value(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}

/// SQLite reports missing tables as generic errors; pick them out.
fn classify(err: rusqlite::Error) -> BackendError {
    let message = err.to_string();
    if message.contains("no such table") {
        BackendError::EntityNotFound(message)
    } else {
        BackendError::Sqlite(err)
    }
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Long(n),
        ValueRef::Real(n) => Value::Double(n),
        ValueRef::Text(text) | ValueRef::Blob(text) => {
            Value::String(String::from_utf8_lossy(text).into_owned())
        }
    }
}

fn split_table(table: &str) -> (&str, &str) {
    table.split_once('.').unwrap_or((MAIN_SCHEMA, table))
}

#[async_trait]
impl BackendDriver for SqliteDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn vendor(&self) -> Vendor {
        Vendor::Sqlite
    }

    async fn submit_statement(&self, sql: &str, _target: &StatementTarget) -> BackendResult<String> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let outcome = self.with_conn(|conn| conn.execute_batch(sql));
        let duration_nanos = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);

        let statement = match outcome {
            Ok(()) => SqliteStatement {
                state: ExecutionState::Finished,
                duration_nanos,
                error: None,
            },
            Err(err) => {
                tracing::warn!(%execution_id, error = %err, "sqlite statement failed");
                SqliteStatement {
                    state: ExecutionState::Failed,
                    duration_nanos,
                    error: Some(err.to_string()),
                }
            }
        };
        self.statements()?.insert(execution_id.clone(), statement);
        Ok(execution_id)
    }

    async fn status(&self, execution_id: &str) -> BackendResult<VendorStatus> {
        let statement = self
            .statements()?
            .get(execution_id)
            .cloned()
            .ok_or_else(|| BackendError::UnknownExecution(execution_id.to_string()))?;
        Ok(VendorStatus {
            state: statement.state.as_str().to_string(),
            duration_nanos: Some(statement.duration_nanos),
            error: statement.error,
            ..VendorStatus::default()
        })
    }

    async fn cancel(&self, execution_id: &str) -> BackendResult<bool> {
        if self.statements()?.contains(execution_id) {
            // Statements complete during submission
            Ok(false)
        } else {
            Err(BackendError::UnknownExecution(execution_id.to_string()))
        }
    }

    async fn query(&self, sql: &str) -> BackendResult<Vec<Row>> {
        self.with_conn(|conn| Self::run_query(conn, sql))
    }

    async fn table_exists(&self, table: &str) -> BackendResult<bool> {
        let (schema, name) = split_table(table);
        let sql = format!(
            "SELECT count(*) FROM {}.sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            helpers::sanitize_identifier(schema)
        );
        let conn = self
            .conn
            .lock()
            .map_err(|_| BackendError::StatementFailed("sqlite connection poisoned".into()))?;
        match conn.query_row(&sql, [name], |row| row.get::<_, i64>(0)) {
            Ok(count) => Ok(count > 0),
            // Schema not attached
            Err(rusqlite::Error::SqliteFailure(_, Some(message)))
                if message.contains("unknown database") =>
            {
                Ok(false)
            }
            Err(err) => Err(classify(err)),
        }
    }

    async fn create_as_select(&self, table: &str, select: &str) -> BackendResult<()> {
        let sql = self.dialect().create_table_as(table, select);
        self.with_conn(|conn| conn.execute_batch(&sql))
    }
}
