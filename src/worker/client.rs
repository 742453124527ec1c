//! Async client for communicating with the driver worker process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};

use super::error::{WorkerError, WorkerResult};
use super::protocol::{
    methods, CancelStatementResponse, ConnectionParams, CreateAsSelectParams,
    CreateAsSelectResponse, ErrorInfo, ExecuteQueryParams, ExecuteQueryResponse, RequestEnvelope,
    ResponseEnvelope, StatementParams, StatementStatusResponse, SubmitStatementParams,
    SubmitStatementResponse, TableExistsResponse, TableParams,
};
use crate::config::WorkerSettings;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>>;

/// Async client for the driver worker.
///
/// The client spawns the worker as a child process and communicates via
/// NDJSON (newline-delimited JSON) over stdin/stdout. Each request has a
/// unique ID for correlation with responses, enabling concurrent requests.
pub struct WorkerClient {
    /// Writer for sending requests to worker stdin.
    stdin: Arc<Mutex<BufWriter<ChildStdin>>>,

    /// Map of pending request IDs to response channels.
    pending: PendingMap,

    /// Handle to the worker child process.
    _child: Child,

    /// Handle to the background reader task.
    reader_task: tokio::task::JoinHandle<()>,

    /// Request timeout duration.
    timeout: Duration,
}

impl WorkerClient {
    /// Spawn a new worker process with the default timeout.
    pub async fn spawn<P: AsRef<Path>>(worker_path: P) -> WorkerResult<Self> {
        let defaults = WorkerSettings::default();
        Self::spawn_with_args(worker_path, &[], Duration::from_secs(defaults.timeout_secs)).await
    }

    /// Spawn a worker using settings configuration.
    ///
    /// Pool settings from the configuration are passed to the worker.
    pub async fn spawn_with_settings(settings: &WorkerSettings) -> WorkerResult<Self> {
        let worker_path = Self::resolve_worker_path(settings)?;
        let pool_args = settings.pool.to_worker_args();

        Self::spawn_with_args(
            &worker_path,
            &pool_args,
            Duration::from_secs(settings.timeout_secs),
        )
        .await
    }

    /// Resolve the worker binary path from settings.
    fn resolve_worker_path(settings: &WorkerSettings) -> WorkerResult<PathBuf> {
        if let Some(path) = &settings.path {
            let expanded = crate::config::expand_env_vars(path).map_err(|e| {
                WorkerError::SpawnFailed(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    e.to_string(),
                ))
            })?;
            return Ok(PathBuf::from(expanded));
        }

        // Search common locations
        let candidates = ["reportal-worker", "./reportal-worker", "./worker/reportal-worker"];
        for candidate in candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(path);
            }
        }

        Err(WorkerError::SpawnFailed(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Worker binary not found. Set worker.path in config",
        )))
    }

    /// Spawn a worker with command-line arguments and a request timeout.
    pub async fn spawn_with_args<P: AsRef<Path>>(
        worker_path: P,
        args: &[String],
        timeout: Duration,
    ) -> WorkerResult<Self> {
        let mut child = Command::new(worker_path.as_ref())
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerError::SpawnFailed)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(WorkerError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "worker stdio not captured",
            )));
        };

        let stdin = Arc::new(Mutex::new(BufWriter::new(stdin)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let reader_task = Self::spawn_reader_task(stdout, pending.clone());

        tracing::info!(path = %worker_path.as_ref().display(), "driver worker started");

        Ok(Self {
            stdin,
            pending,
            _child: child,
            reader_task,
            timeout,
        })
    }

    /// Spawn the background task that reads responses from the worker.
    fn spawn_reader_task(stdout: ChildStdout, pending: PendingMap) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => match serde_json::from_str::<ResponseEnvelope>(&line) {
                        Ok(resp) => {
                            let mut pending = pending.lock().await;
                            if let Some(tx) = pending.remove(&resp.id) {
                                let _ = tx.send(resp);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "worker: failed to parse response");
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "worker: read error");
                        break;
                    }
                }
            }

            // Worker exited - notify all pending requests with error responses
            let mut pending = pending.lock().await;
            if !pending.is_empty() {
                tracing::warn!(pending = pending.len(), "driver worker exited with requests in flight");
            }
            for (id, tx) in pending.drain() {
                let error_response = ResponseEnvelope {
                    id,
                    success: false,
                    result: None,
                    error: Some(ErrorInfo {
                        code: "WORKER_EXITED".to_string(),
                        message: "Worker process exited unexpectedly".to_string(),
                    }),
                };
                let _ = tx.send(error_response);
            }
        })
    }

    /// Send a request to the worker and wait for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The worker has already exited
    /// - Serialization fails
    /// - Writing to the worker fails
    /// - The request times out
    /// - The worker returns an error response
    /// - Deserialization of the response fails
    pub async fn request<P, R>(&self, method: &str, params: P) -> WorkerResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if !self.is_alive() {
            return Err(WorkerError::WorkerExited);
        }
        let id = uuid::Uuid::new_v4().to_string();

        let request = RequestEnvelope {
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params).map_err(WorkerError::SerializeFailed)?,
        };

        // Register response channel
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        tracing::debug!(request_id = %id, method, "worker request");

        // Send request
        {
            let mut stdin = self.stdin.lock().await;
            let line =
                serde_json::to_string(&request).map_err(WorkerError::SerializeFailed)? + "\n";
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(WorkerError::WriteFailed)?;
            stdin.flush().await.map_err(WorkerError::WriteFailed)?;
        }

        // Wait for response with timeout
        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => return Err(WorkerError::ChannelClosed),
            Err(_) => {
                // Timeout - clean up pending request to prevent memory leak
                let mut pending = self.pending.lock().await;
                pending.remove(&id);
                return Err(WorkerError::Timeout(self.timeout.as_secs()));
            }
        };

        if response.success {
            let result = response.result.unwrap_or(serde_json::Value::Null);
            serde_json::from_value(result).map_err(WorkerError::DeserializeFailed)
        } else {
            let error = response.error.unwrap_or_else(|| ErrorInfo {
                code: "UNKNOWN".to_string(),
                message: "Unknown error".to_string(),
            });
            Err(Self::classify_error(&error.code, &error.message))
        }
    }

    /// Classify a worker error code into a more specific error type.
    ///
    /// Vendor exception names are accepted alongside the worker's own codes.
    fn classify_error(code: &str, message: &str) -> WorkerError {
        match code {
            "THROTTLED"
            | "STATEMENT_LIMIT_EXCEEDED"
            | "ActiveStatementsExceededException"
            | "TooManyRequestsException" => WorkerError::Throttled(message.to_string()),
            "ENTITY_NOT_FOUND" | "TABLE_NOT_FOUND" | "EntityNotFoundException" => {
                WorkerError::EntityNotFound(message.to_string())
            }
            "STATEMENT_FINISHED" | "ALREADY_FINISHED" => {
                WorkerError::AlreadyFinished(message.to_string())
            }
            "WORKER_EXITED" => WorkerError::WorkerExited,
            "CONNECTION_FAILED" => WorkerError::ConnectionFailed(message.to_string()),
            "INVALID_REQUEST" => WorkerError::InvalidRequest(message.to_string()),
            "METHOD_NOT_FOUND" => WorkerError::MethodNotFound(message.to_string()),
            _ => WorkerError::remote(code, message),
        }
    }

    /// Check if the worker is still running.
    pub fn is_alive(&self) -> bool {
        !self.reader_task.is_finished()
    }
}

// Convenience methods for the statement protocol
impl WorkerClient {
    /// Submit a statement for asynchronous execution.
    pub async fn submit_statement(
        &self,
        connection: &ConnectionParams,
        sql: &str,
        catalog: Option<&str>,
        database: Option<&str>,
    ) -> WorkerResult<SubmitStatementResponse> {
        self.request(
            methods::SUBMIT_STATEMENT,
            SubmitStatementParams {
                connection: connection.clone(),
                sql: sql.to_string(),
                catalog: catalog.map(str::to_string),
                database: database.map(str::to_string),
            },
        )
        .await
    }

    pub async fn statement_status(
        &self,
        connection: &ConnectionParams,
        execution_id: &str,
    ) -> WorkerResult<StatementStatusResponse> {
        self.request(
            methods::STATEMENT_STATUS,
            StatementParams {
                connection: connection.clone(),
                execution_id: execution_id.to_string(),
            },
        )
        .await
    }

    pub async fn cancel_statement(
        &self,
        connection: &ConnectionParams,
        execution_id: &str,
    ) -> WorkerResult<CancelStatementResponse> {
        self.request(
            methods::CANCEL_STATEMENT,
            StatementParams {
                connection: connection.clone(),
                execution_id: execution_id.to_string(),
            },
        )
        .await
    }

    /// Execute a SQL query and wait for its rows.
    pub async fn execute_query(
        &self,
        connection: &ConnectionParams,
        sql: &str,
    ) -> WorkerResult<ExecuteQueryResponse> {
        self.request(
            methods::EXECUTE_QUERY,
            ExecuteQueryParams {
                connection: connection.clone(),
                sql: sql.to_string(),
                args: None,
            },
        )
        .await
    }

    pub async fn table_exists(
        &self,
        connection: &ConnectionParams,
        table: &str,
    ) -> WorkerResult<TableExistsResponse> {
        self.request(
            methods::TABLE_EXISTS,
            TableParams {
                connection: connection.clone(),
                table: table.to_string(),
            },
        )
        .await
    }

    /// Run a `CREATE TABLE ... AS` statement to completion.
    pub async fn create_as_select(
        &self,
        connection: &ConnectionParams,
        table: &str,
        sql: &str,
    ) -> WorkerResult<CreateAsSelectResponse> {
        self.request(
            methods::CREATE_AS_SELECT,
            CreateAsSelectParams {
                connection: connection.clone(),
                table: table.to_string(),
                sql: sql.to_string(),
            },
        )
        .await
    }
}
