//! Driver for vendors served by the external driver worker.

use std::sync::Arc;

use async_trait::async_trait;

use super::{BackendDriver, BackendResult, StatementTarget, Vendor, VendorStatus};
use crate::config::{BackendSettings, SettingsError};
use crate::sql::SqlDialect;
use crate::value::{row_from_columns, Row};
use crate::worker::protocol::ConnectionParams;
use crate::worker::{WorkerClient, WorkerError};

/// A backend reached over the worker's NDJSON protocol.
///
/// Several drivers may share one worker process.
pub struct WorkerDriver {
    name: String,
    vendor: Vendor,
    connection: ConnectionParams,
    default_target: StatementTarget,
    client: Arc<WorkerClient>,
}

impl WorkerDriver {
    pub fn new(
        name: impl Into<String>,
        vendor: Vendor,
        connection_string: impl Into<String>,
        client: Arc<WorkerClient>,
    ) -> Self {
        Self {
            name: name.into(),
            vendor,
            connection: ConnectionParams {
                driver: vendor.as_str().to_string(),
                connection_string: connection_string.into(),
            },
            default_target: StatementTarget::default(),
            client,
        }
    }

    /// Build a driver from a `[backends.<name>]` table.
    pub fn from_settings(
        name: &str,
        settings: &BackendSettings,
        client: Arc<WorkerClient>,
    ) -> Result<Self, SettingsError> {
        let mut driver = Self::new(
            name,
            settings.vendor_type()?,
            settings.resolved_connection_string()?,
            client,
        );
        driver.default_target = StatementTarget {
            catalog: settings.catalog.clone(),
            database: settings.database.clone(),
        };
        Ok(driver)
    }
}

#[async_trait]
impl BackendDriver for WorkerDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn vendor(&self) -> Vendor {
        self.vendor
    }

    async fn submit_statement(&self, sql: &str, target: &StatementTarget) -> BackendResult<String> {
        let catalog = target.catalog.as_deref().or(self.default_target.catalog.as_deref());
        let database = target
            .database
            .as_deref()
            .or(self.default_target.database.as_deref());
        let response = self
            .client
            .submit_statement(&self.connection, sql, catalog, database)
            .await?;
        Ok(response.execution_id)
    }

    async fn status(&self, execution_id: &str) -> BackendResult<VendorStatus> {
        let response = self
            .client
            .statement_status(&self.connection, execution_id)
            .await?;
        Ok(VendorStatus {
            state: response.state,
            duration_nanos: response.duration_nanos,
            result_rows: response.result_rows,
            result_size_bytes: response.result_size_bytes,
            error: response.error,
            error_category: response.error_category,
            state_change_reason: response.state_change_reason,
        })
    }

    async fn cancel(&self, execution_id: &str) -> BackendResult<bool> {
        match self
            .client
            .cancel_statement(&self.connection, execution_id)
            .await
        {
            Ok(response) => Ok(response.cancelled),
            Err(WorkerError::AlreadyFinished(message)) => {
                tracing::debug!(execution_id, %message, "statement already finished");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn query(&self, sql: &str) -> BackendResult<Vec<Row>> {
        let response = self.client.execute_query(&self.connection, sql).await?;
        let columns: Vec<String> = response.columns.into_iter().map(|c| c.name).collect();
        Ok(response
            .rows
            .into_iter()
            .map(|values| row_from_columns(&columns, values))
            .collect())
    }

    async fn table_exists(&self, table: &str) -> BackendResult<bool> {
        Ok(self.client.table_exists(&self.connection, table).await?.exists)
    }

    async fn create_as_select(&self, table: &str, select: &str) -> BackendResult<()> {
        let sql = self.dialect().create_table_as(table, select);
        self.client
            .create_as_select(&self.connection, table, &sql)
            .await?;
        Ok(())
    }
}
