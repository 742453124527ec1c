//! Asynchronous report execution.
//!
//! A submission materializes the report into a fresh result table and
//! returns at once; callers poll the execution, then page through the
//! table. Summaries are derived tables built lazily from the result table.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::ledger::{ExecutionLedger, InMemoryLedger};
use super::model::{
    CancelResponse, ExecutionHandle, ExecutionKey, MultiphaseQueryExecution, Page, QueryExecution,
    ReportRequest, StatementExecutionResponse,
};
use super::present::{present_rows, total};
use crate::backend::{
    BackendDriver, BackendError, BackendRegistry, ExecutionState, PageRequest, StatementExecutionStatus,
    StatementTarget,
};
use crate::config::Settings;
use crate::definition::{DefinitionStore, ReportDefinition, ReportSummary, ResolvedReport};
use crate::error::{ReportError, ReportResult};
use crate::filter::{validate_and_map, Filter};
use crate::formula::FormulaEngine;
use crate::policy::{evaluate, CallerContext, PolicyResult};
use crate::query::{generate_table_id, resolve_sort, QueryComposer, SortOrder};
use crate::value::Row;

/// Submits, tracks and reads asynchronous report executions.
pub struct AsyncExecutionService {
    definitions: Arc<dyn DefinitionStore>,
    backends: BackendRegistry,
    ledger: Arc<dyn ExecutionLedger>,
    formulas: FormulaEngine,
    result_schema: String,
    default_page_size: u64,
}

impl AsyncExecutionService {
    pub fn new(definitions: Arc<dyn DefinitionStore>, backends: BackendRegistry) -> Self {
        let defaults = Settings::default();
        Self {
            definitions,
            backends,
            ledger: Arc::new(InMemoryLedger::new()),
            formulas: FormulaEngine::new(),
            result_schema: defaults.results.schema,
            default_page_size: defaults.results.default_page_size,
        }
    }

    /// Build the service with drivers for every configured backend.
    pub async fn from_settings(
        definitions: Arc<dyn DefinitionStore>,
        settings: &Settings,
    ) -> ReportResult<Self> {
        let backends = BackendRegistry::from_settings(settings).await?;
        Ok(Self::new(definitions, backends).with_settings(settings))
    }

    /// Apply the `[results]` and `[formula]` settings.
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.result_schema = settings.results.schema.clone();
        self.default_page_size = settings.results.default_page_size;
        self.formulas = FormulaEngine::with_env(settings.formula.env.clone());
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn ExecutionLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_formula_engine(mut self, formulas: FormulaEngine) -> Self {
        self.formulas = formulas;
        self
    }

    pub fn with_result_schema(mut self, schema: impl Into<String>) -> Self {
        self.result_schema = schema.into();
        self
    }

    fn composer(&self, driver: &dyn BackendDriver) -> QueryComposer {
        QueryComposer::new(driver.dialect(), self.result_schema.clone())
    }

    async fn definition(&self, report_id: &str, variant_id: &str) -> ReportResult<Arc<ReportDefinition>> {
        self.definitions
            .report_definition(report_id)
            .await
            .filter(|d| d.resolve(variant_id).is_some())
            .ok_or_else(|| ReportError::invalid_reference(report_id, variant_id))
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Validate a request against its definition and submit it.
    ///
    /// Filters are checked for the non-interactive stage.
    pub async fn submit_report(
        &self,
        request: &ReportRequest,
        caller: Option<&CallerContext>,
    ) -> ReportResult<StatementExecutionResponse> {
        let definition = self.definition(&request.report_id, &request.variant_id).await?;
        let report = definition
            .resolve(&request.variant_id)
            .ok_or_else(|| ReportError::invalid_reference(&request.report_id, &request.variant_id))?;

        let filters = validate_and_map(report, &request.filters, Some(false), None)?;
        let sort = resolve_sort(report, request.sort_column.as_deref(), request.sorted_asc)?;
        let policy = evaluate(&definition.policies, caller);

        let response = self.submit(report, &filters, sort.as_ref(), &policy).await?;
        info!(
            report_id = %request.report_id,
            variant_id = %request.variant_id,
            execution_id = %response.execution_id,
            user = caller.and_then(|c| c.username.as_deref()).unwrap_or("-"),
            "report requested"
        );
        Ok(response)
    }

    /// Submit the layered report statement, materializing a new result table.
    ///
    /// A denied policy still submits; the statement selects no rows.
    pub async fn submit(
        &self,
        report: ResolvedReport<'_>,
        filters: &[Filter],
        sort: Option<&SortOrder>,
        policy: &PolicyResult,
    ) -> ReportResult<StatementExecutionResponse> {
        let table_id = generate_table_id();
        let target = StatementTarget {
            catalog: report.variant.catalog.clone(),
            database: report.variant.database.clone(),
        };

        if !report.definition.dataset.multiphase_query.is_empty() {
            return self
                .submit_multiphase(report, filters, sort, policy, table_id, target)
                .await;
        }

        let driver = self.backends.get(report.datasource())?;
        let composer = self.composer(driver.as_ref());
        let select = composer.layered_query(&report.definition.dataset.query, policy, filters, sort);
        let sql = composer.create_result_table(&table_id, &select);

        let execution_id = driver.submit_statement(&sql, &target).await?;
        self.ledger.observe(
            &ExecutionKey::new(driver.name(), &execution_id),
            StatementExecutionStatus::new(ExecutionState::Submitted),
        );

        info!(
            %execution_id,
            %table_id,
            datasource = driver.name(),
            denied = policy.is_deny(),
            "submitted report statement"
        );
        Ok(StatementExecutionResponse {
            table_id,
            execution_id,
        })
    }

    async fn submit_multiphase(
        &self,
        report: ResolvedReport<'_>,
        filters: &[Filter],
        sort: Option<&SortOrder>,
        policy: &PolicyResult,
        table_id: String,
        target: StatementTarget,
    ) -> ReportResult<StatementExecutionResponse> {
        let phases = report.definition.dataset.phases();
        let last = phases.len() - 1;
        let root_driver = self.backends.get(report.datasource())?;

        let mut rendered = Vec::with_capacity(phases.len());
        for (position, phase) in phases.into_iter().enumerate() {
            let datasource = phase
                .datasource
                .clone()
                .unwrap_or_else(|| report.datasource().to_string());
            let driver = self.backends.get(&datasource)?;
            let composer = self.composer(driver.as_ref());

            let query = if position == last {
                let query = composer.phase_query(&table_id, position, &phase.query);
                let select = composer.layered_query(&query, policy, filters, sort);
                composer.create_result_table(&table_id, &select)
            } else {
                composer.create_phase_table(&table_id, position, &phase.query)
            };
            rendered.push((datasource, phase.index, query));
        }

        let (first_datasource, _, first_query) = &rendered[0];
        let root_execution_id = self
            .backends
            .get(first_datasource)?
            .submit_statement(first_query, &target)
            .await?;

        let phases = rendered
            .into_iter()
            .enumerate()
            .map(|(position, (datasource, index, query))| QueryExecution {
                root_execution_id: root_execution_id.clone(),
                current_execution_id: (position == 0).then(|| root_execution_id.clone()),
                datasource,
                catalog: target.catalog.clone(),
                database: target.database.clone(),
                index,
                query,
                current_state: (position == 0).then_some(ExecutionState::Submitted),
                error: None,
            })
            .collect();
        let execution = MultiphaseQueryExecution {
            datasource: root_driver.name().to_string(),
            root_execution_id: root_execution_id.clone(),
            table_id: table_id.clone(),
            phases,
            current: 0,
        };
        self.ledger.observe(
            &execution.key(),
            StatementExecutionStatus::new(ExecutionState::Submitted),
        );
        self.ledger.save_multiphase(execution);

        info!(
            execution_id = %root_execution_id,
            %table_id,
            phases = last + 1,
            "submitted multiphase report"
        );
        Ok(StatementExecutionResponse {
            table_id,
            execution_id: root_execution_id,
        })
    }

    // =========================================================================
    // Status and Cancellation
    // =========================================================================

    /// Poll an execution of a report.
    pub async fn status(
        &self,
        report_id: &str,
        variant_id: &str,
        handle: ExecutionHandle<'_>,
    ) -> ReportResult<StatementExecutionStatus> {
        let definition = self.definition(report_id, variant_id).await?;
        self.poll_status(&definition.datasource, handle).await
    }

    /// Poll an execution or a result table on a datasource.
    ///
    /// A terminal execution reports the status it first turned terminal
    /// with. A missing result table is [`ReportError::MissingTable`],
    /// distinct from any in-flight state.
    pub async fn poll_status(
        &self,
        datasource: &str,
        handle: ExecutionHandle<'_>,
    ) -> ReportResult<StatementExecutionStatus> {
        let driver = self.backends.get(datasource)?;
        match handle {
            ExecutionHandle::Table(table_id) => {
                let table = self.composer(driver.as_ref()).result_table(table_id);
                if driver.table_exists(&table).await? {
                    Ok(StatementExecutionStatus::new(ExecutionState::Finished))
                } else {
                    Err(ReportError::MissingTable(table_id.to_string()))
                }
            }
            ExecutionHandle::Execution(execution_id) => {
                let key = ExecutionKey::new(driver.name(), execution_id);
                let previous = self.ledger.last_status(&key);
                if let Some(done) = previous.as_ref().filter(|s| s.status.is_terminal()) {
                    return Ok(done.clone());
                }
                if let Some(execution) = self.ledger.multiphase(&key) {
                    return self.poll_multiphase(execution).await;
                }
                self.poll_execution(driver.as_ref(), &key, previous.map(|s| s.status))
                    .await
            }
        }
    }

    async fn poll_execution(
        &self,
        driver: &dyn BackendDriver,
        key: &ExecutionKey,
        previous: Option<ExecutionState>,
    ) -> ReportResult<StatementExecutionStatus> {
        let execution_id = key.execution_id.as_str();
        let vendor_status = driver.status(execution_id).await?;
        let status = StatementExecutionStatus::from_vendor(driver.vendor(), vendor_status)?;
        let status = self.ledger.observe(key, status);

        if previous != Some(status.status) {
            debug!(execution_id, state = %status.status, datasource = driver.name(), "execution state changed");
        }
        if status.status == ExecutionState::Failed {
            warn!(
                execution_id,
                error = ?status.error,
                error_category = ?status.error_category,
                "statement failed"
            );
        }
        Ok(status)
    }

    /// Advance a multiphase execution by at most one phase.
    ///
    /// The root reports STARTED while later phases remain; the final
    /// phase's terminal status becomes the root's.
    async fn poll_multiphase(
        &self,
        execution: MultiphaseQueryExecution,
    ) -> ReportResult<StatementExecutionStatus> {
        let key = execution.key();
        let position = execution.current;
        let Some(phase) = execution.current_phase() else {
            return Err(BackendError::UnknownExecution(key.execution_id).into());
        };
        let Some(phase_execution_id) = phase.current_execution_id.as_deref() else {
            // Another poll is submitting this phase.
            return Ok(self.observe_started(&key));
        };

        let driver = self.backends.get(&phase.datasource)?;
        let vendor_status = driver.status(phase_execution_id).await?;
        let status = StatementExecutionStatus::from_vendor(driver.vendor(), vendor_status)?;

        let mut claimed = None;
        let tracked = self
            .ledger
            .update_multiphase(&key, &mut |record| claimed = record.record_phase(position, &status));
        if let Some(next) = claimed {
            return self.submit_phase(&key, position + 1, next).await;
        }
        if !tracked {
            // Settled by a concurrent poll.
            if let Some(done) = self.ledger.last_status(&key).filter(|s| s.status.is_terminal()) {
                return Ok(done);
            }
        }

        if status.status == ExecutionState::Finished && !execution.is_last_phase() {
            return Ok(self.observe_started(&key));
        }
        let status = self.ledger.observe(&key, status);
        if status.status.is_terminal() {
            self.ledger.remove_multiphase(&key);
        }
        if status.status == ExecutionState::Failed {
            warn!(
                execution_id = %key.execution_id,
                phase = position,
                error = ?status.error,
                "multiphase statement failed"
            );
        }
        Ok(status)
    }

    /// Submit a phase claimed by [`MultiphaseQueryExecution::record_phase`].
    async fn submit_phase(
        &self,
        key: &ExecutionKey,
        position: usize,
        phase: QueryExecution,
    ) -> ReportResult<StatementExecutionStatus> {
        let submitted = match self.backends.get(&phase.datasource) {
            Ok(driver) => driver.submit_statement(&phase.query, &phase.target()).await,
            Err(err) => Err(err),
        };
        match submitted {
            Ok(phase_execution_id) => {
                self.ledger.update_multiphase(key, &mut |record| {
                    record.phase_submitted(position, &phase_execution_id)
                });
                info!(
                    execution_id = %key.execution_id,
                    phase = position,
                    %phase_execution_id,
                    "advanced multiphase execution"
                );
                Ok(self.observe_started(key))
            }
            Err(err) => {
                self.ledger
                    .update_multiphase(key, &mut |record| record.release_phase(position));
                warn!(execution_id = %key.execution_id, phase = position, error = %err, "phase submission failed");
                Err(err.into())
            }
        }
    }

    fn observe_started(&self, key: &ExecutionKey) -> StatementExecutionStatus {
        self.ledger
            .observe(key, StatementExecutionStatus::new(ExecutionState::Started))
    }

    /// Poll several executions concurrently.
    pub async fn statuses(
        &self,
        executions: &[(&str, &str)],
    ) -> Vec<ReportResult<StatementExecutionStatus>> {
        join_all(
            executions
                .iter()
                .map(|(datasource, id)| self.poll_status(datasource, ExecutionHandle::Execution(id))),
        )
        .await
    }

    /// Cancel an execution of a report.
    pub async fn cancel(
        &self,
        report_id: &str,
        variant_id: &str,
        execution_id: &str,
    ) -> ReportResult<CancelResponse> {
        let definition = self.definition(report_id, variant_id).await?;
        self.cancel_on(&definition.datasource, execution_id).await
    }

    /// Best-effort cancellation; an already finished statement is not an
    /// error.
    ///
    /// A multiphase execution cancels its current phase. While that phase
    /// is still being submitted nothing is cancelled.
    pub async fn cancel_on(&self, datasource: &str, execution_id: &str) -> ReportResult<CancelResponse> {
        let driver = self.backends.get(datasource)?;
        let key = ExecutionKey::new(driver.name(), execution_id);

        let (driver, target_id) = match self.ledger.multiphase(&key) {
            Some(execution) => {
                let phase = execution
                    .current_phase()
                    .and_then(|p| p.current_execution_id.clone().map(|id| (p.datasource.clone(), id)));
                let Some((phase_datasource, phase_execution_id)) = phase else {
                    info!(execution_id, "cancel requested while a phase is being submitted");
                    return Ok(CancelResponse { cancelled: false });
                };
                (self.backends.get(&phase_datasource)?, phase_execution_id)
            }
            None => (driver, execution_id.to_string()),
        };

        let cancelled = driver.cancel(&target_id).await?;
        if cancelled {
            self.ledger
                .update_multiphase(&key, &mut |record| record.abort_current());
            self.ledger
                .observe(&key, StatementExecutionStatus::new(ExecutionState::Aborted));
            self.ledger.remove_multiphase(&key);
        }
        info!(execution_id, cancelled, datasource = driver.name(), "cancel requested");
        Ok(CancelResponse { cancelled })
    }

    // =========================================================================
    // Results
    // =========================================================================

    /// Read a page of a result table.
    ///
    /// Pages past the end are empty; a missing table is
    /// [`ReportError::MissingTable`].
    pub async fn paginate(
        &self,
        datasource: &str,
        table_id: &str,
        page: Page,
        filters: &[Filter],
        sort: Option<&SortOrder>,
    ) -> ReportResult<Vec<Row>> {
        let driver = self.backends.get(datasource)?;
        let table = self.composer(driver.as_ref()).result_table(table_id);
        driver
            .read_page(PageRequest {
                table: &table,
                filters,
                sort,
                page: page.page,
                page_size: page.page_size,
            })
            .await
            .map_err(|err| missing_table(err, table_id))
    }

    /// A page of report rows with result-time filters, formulas applied.
    ///
    /// Filters here are checked for the interactive stage.
    pub async fn report_result(
        &self,
        request: &ReportRequest,
        table_id: &str,
        page: Option<Page>,
    ) -> ReportResult<Vec<Row>> {
        let definition = self.definition(&request.report_id, &request.variant_id).await?;
        let report = definition
            .resolve(&request.variant_id)
            .ok_or_else(|| ReportError::invalid_reference(&request.report_id, &request.variant_id))?;

        let filters = validate_and_map(report, &request.filters, Some(true), None)?;
        let sort = resolve_sort(report, request.sort_column.as_deref(), request.sorted_asc)?;
        let page = page.unwrap_or(Page::new(1, self.default_page_size));

        let rows = self
            .paginate(report.datasource(), table_id, page, &filters, sort.as_ref())
            .await?;
        present_rows(report, &self.formulas, rows)
    }

    /// Count the rows of a result table matching result-time filters.
    pub async fn count(&self, request: &ReportRequest, table_id: &str) -> ReportResult<u64> {
        let definition = self.definition(&request.report_id, &request.variant_id).await?;
        let report = definition
            .resolve(&request.variant_id)
            .ok_or_else(|| ReportError::invalid_reference(&request.report_id, &request.variant_id))?;
        let filters = validate_and_map(report, &request.filters, Some(true), None)?;

        let driver = self.backends.get(report.datasource())?;
        let composer = self.composer(driver.as_ref());
        let sql = composer.count_query(&composer.result_table(table_id), &filters);
        let rows = driver
            .query(&sql)
            .await
            .map_err(|err| missing_table(err, table_id))?;
        total(&rows)
    }

    /// Rows of a report summary over a result table.
    pub async fn summary_result(
        &self,
        report_id: &str,
        variant_id: &str,
        table_id: &str,
        summary_id: &str,
    ) -> ReportResult<Vec<Row>> {
        let definition = self.definition(report_id, variant_id).await?;
        let report = definition
            .resolve(variant_id)
            .ok_or_else(|| ReportError::invalid_reference(report_id, variant_id))?;
        let summary = report
            .summary(summary_id)
            .ok_or_else(|| ReportError::UnknownSummary(summary_id.to_string()))?;
        self.read_summary(report.datasource(), table_id, summary).await
    }

    /// Read a summary table, creating it once if the backend reports it
    /// missing.
    pub async fn read_summary(
        &self,
        datasource: &str,
        table_id: &str,
        summary: &ReportSummary,
    ) -> ReportResult<Vec<Row>> {
        let driver = self.backends.get(datasource)?;
        let composer = self.composer(driver.as_ref());
        let read = composer.read_summary(table_id, &summary.id);

        match driver.query(&read).await {
            Ok(rows) => Ok(rows),
            Err(err) if err.is_entity_not_found() => {
                let table = composer.summary_table(table_id, &summary.id);
                info!(%table_id, summary_id = %summary.id, %table, "creating summary table");
                driver
                    .create_as_select(&table, &composer.summary_query(table_id, summary))
                    .await?;
                driver
                    .query(&read)
                    .await
                    .map_err(|err| missing_table(err, &table))
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn missing_table(err: BackendError, table_id: &str) -> ReportError {
    if err.is_entity_not_found() {
        ReportError::MissingTable(table_id.to_string())
    } else {
        err.into()
    }
}
