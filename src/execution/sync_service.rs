//! Synchronous report execution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use super::model::{Page, ReportRequest};
use super::present::{present_rows, total};
use crate::backend::BackendRegistry;
use crate::config::Settings;
use crate::definition::{DefinitionStore, ReportDefinition};
use crate::error::{ReportError, ReportResult};
use crate::filter::{truncate_based_on_suffix, FilterValidator};
use crate::formula::FormulaEngine;
use crate::policy::{evaluate, CallerContext};
use crate::query::{resolve_sort, QueryComposer};
use crate::value::{Row, Value};

/// Runs report queries to completion and returns presented rows.
///
/// All filters are validated together; stages do not apply.
pub struct SyncExecutionService {
    definitions: Arc<dyn DefinitionStore>,
    backends: BackendRegistry,
    formulas: FormulaEngine,
}

impl SyncExecutionService {
    pub fn new(definitions: Arc<dyn DefinitionStore>, backends: BackendRegistry) -> Self {
        Self {
            definitions,
            backends,
            formulas: FormulaEngine::new(),
        }
    }

    pub fn with_formula_engine(mut self, formulas: FormulaEngine) -> Self {
        self.formulas = formulas;
        self
    }

    pub async fn from_settings(
        definitions: Arc<dyn DefinitionStore>,
        settings: &Settings,
    ) -> ReportResult<Self> {
        let backends = BackendRegistry::from_settings(settings).await?;
        Ok(Self::new(definitions, backends)
            .with_formula_engine(FormulaEngine::with_env(settings.formula.env.clone())))
    }

    async fn definition(&self, report_id: &str, variant_id: &str) -> ReportResult<Arc<ReportDefinition>> {
        self.definitions
            .report_definition(report_id)
            .await
            .filter(|d| d.resolve(variant_id).is_some())
            .ok_or_else(|| ReportError::invalid_reference(report_id, variant_id))
    }

    /// One page of formula-applied report rows.
    pub async fn execute(
        &self,
        request: &ReportRequest,
        page: Page,
        caller: Option<&CallerContext>,
    ) -> ReportResult<Vec<Row>> {
        let definition = self.definition(&request.report_id, &request.variant_id).await?;
        let report = definition
            .resolve(&request.variant_id)
            .ok_or_else(|| ReportError::invalid_reference(&request.report_id, &request.variant_id))?;

        let filters = FilterValidator::new(report).validate_and_map(&request.filters, None, None)?;
        let sort = resolve_sort(report, request.sort_column.as_deref(), request.sorted_asc)?;
        let policy = evaluate(&definition.policies, caller);

        let driver = self.backends.get(report.datasource())?;
        let composer = QueryComposer::new(driver.dialect(), "");
        let Some(sql) = composer.layered_page_query(
            &definition.dataset.query,
            &policy,
            &filters,
            sort.as_ref(),
            page.page,
            page.page_size,
        ) else {
            return Ok(Vec::new());
        };

        let rows = driver.query(&sql).await?;
        info!(
            report_id = %request.report_id,
            datasource = driver.name(),
            rows = rows.len(),
            user = caller.and_then(|c| c.username.as_deref()).unwrap_or("-"),
            "executed report"
        );
        present_rows(report, &self.formulas, rows)
    }

    /// Number of rows the report yields for the caller and filters.
    pub async fn count(
        &self,
        request: &ReportRequest,
        caller: Option<&CallerContext>,
    ) -> ReportResult<u64> {
        let definition = self.definition(&request.report_id, &request.variant_id).await?;
        let report = definition
            .resolve(&request.variant_id)
            .ok_or_else(|| ReportError::invalid_reference(&request.report_id, &request.variant_id))?;

        let filters = FilterValidator::new(report).validate_and_map(&request.filters, None, None)?;
        let policy = evaluate(&definition.policies, caller);

        let driver = self.backends.get(report.datasource())?;
        let composer = QueryComposer::new(driver.dialect(), "");
        let rows = driver
            .query(&composer.layered_count_query(&definition.dataset.query, &policy, &filters))
            .await?;
        total(&rows)
    }

    /// Distinct values of `field` starting with `prefix`, for type-ahead
    /// filters.
    ///
    /// Other supplied filters narrow the values; mandatory filters are not
    /// required.
    pub async fn field_values(
        &self,
        request: &ReportRequest,
        field: &str,
        prefix: &str,
        caller: Option<&CallerContext>,
    ) -> ReportResult<Vec<String>> {
        let definition = self.definition(&request.report_id, &request.variant_id).await?;
        let report = definition
            .resolve(&request.variant_id)
            .ok_or_else(|| ReportError::invalid_reference(&request.report_id, &request.variant_id))?;

        let validator = FilterValidator::new(report);
        let dynamic = validator.dynamic_filter(field, prefix)?;

        let others: HashMap<String, String> = request
            .filters
            .iter()
            .filter(|(key, _)| truncate_based_on_suffix(key) != field)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let exempt = HashSet::from([field.to_string()]);
        let mut filters = validator.validate_and_map(&others, None, Some(&exempt))?;
        filters.push(dynamic);

        let limit = report
            .filter_definition(field)
            .and_then(|d| d.dynamic_options.as_ref())
            .and_then(|o| o.max_results);
        let policy = evaluate(&definition.policies, caller);

        let driver = self.backends.get(report.datasource())?;
        let composer = QueryComposer::new(driver.dialect(), "");
        let sql = composer.distinct_values_query(&definition.dataset.query, &policy, &filters, field, limit);
        let rows = driver.query(&sql).await?;
        debug!(field, prefix, values = rows.len(), "looked up field values");

        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove(field))
            .filter(|value| !value.is_null())
            .map(|value| match value {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect())
    }
}
