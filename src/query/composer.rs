//! Layered query composer.

use uuid::Uuid;

use super::{SortOrder, DATASET_, FILTER_, POLICY_};
use crate::definition::ReportSummary;
use crate::filter::{Filter, FilterTag};
use crate::policy::{PolicyResult, POLICY_PERMIT};
use crate::sql::dialect::helpers;
use crate::sql::{Dialect, SqlDialect};

/// Replaced with the base result table in summary queries.
pub const TABLE_ID_TOKEN: &str = "${table_id}";
/// Replaced with the previous phase's table in multiphase queries.
pub const PHASE_TABLE_TOKEN: &str = "${phase_table}";

const MULTISELECT_SEPARATOR: char = ',';

/// Generate an opaque result table id: `_` followed by a UUID with `-`
/// replaced by `_`.
pub fn generate_table_id() -> String {
    format!("_{}", Uuid::new_v4().to_string().replace('-', "_"))
}

/// Renders report SQL for one dialect and result schema.
#[derive(Debug, Clone)]
pub struct QueryComposer {
    dialect: Dialect,
    schema: String,
}

impl QueryComposer {
    pub fn new(dialect: Dialect, result_schema: impl Into<String>) -> Self {
        Self {
            dialect,
            schema: result_schema.into(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn result_schema(&self) -> &str {
        &self.schema
    }

    // =========================================================================
    // Table Names
    // =========================================================================

    pub fn result_table(&self, table_id: &str) -> String {
        self.dialect.qualify(&self.schema, table_id)
    }

    pub fn summary_table(&self, table_id: &str, summary_id: &str) -> String {
        let name = format!("{}_{}", table_id, helpers::sanitize_identifier(summary_id));
        self.dialect.qualify(&self.schema, &name)
    }

    /// Intermediate table of the phase at `position` in execution order.
    pub fn phase_table(&self, table_id: &str, position: usize) -> String {
        self.dialect
            .qualify(&self.schema, &format!("{}_p{}", table_id, position))
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Render validated filters as one predicate; no filters is `TRUE`.
    pub fn filter_predicate(&self, filters: &[Filter]) -> String {
        if filters.is_empty() {
            return POLICY_PERMIT.to_string();
        }
        filters
            .iter()
            .map(|f| self.predicate(f))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn predicate(&self, filter: &Filter) -> String {
        let d = &self.dialect;
        let field = filter.field.as_str();
        let value = filter.value.as_str();
        match filter.tag {
            FilterTag::Standard => format!("lower({}) = lower({})", field, d.quote_string(value)),
            FilterTag::Boolean => {
                format!("{} = {}", field, d.format_bool(value.eq_ignore_ascii_case("true")))
            }
            FilterTag::RangeStart => format!("{} >= {}", field, self.range_literal(value)),
            FilterTag::RangeEnd => format!("{} <= {}", field, self.range_literal(value)),
            FilterTag::DateRangeStart => d.date_range_start(field, value),
            FilterTag::DateRangeEnd => d.date_range_end(field, value),
            FilterTag::Dynamic => d.prefix_match(field, value),
            FilterTag::Multiselect => {
                let options = value
                    .split(MULTISELECT_SEPARATOR)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("lower({})", d.quote_string(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("lower({}) IN ({})", field, options)
            }
        }
    }

    /// Numbers are inlined; anything else is quoted.
    fn range_literal(&self, value: &str) -> String {
        if value.parse::<f64>().is_ok_and(f64::is_finite) {
            value.to_string()
        } else {
            self.dialect.quote_string(value)
        }
    }

    // =========================================================================
    // Report Queries
    // =========================================================================

    /// The `WITH dataset_ ..., policy_ ..., filter_ ...` prefix.
    fn layers(&self, dataset_query: &str, policy: &PolicyResult, filters: &[Filter]) -> String {
        format!(
            "WITH {d} AS ({query}),{p} AS (SELECT * FROM {d} WHERE {policy}),{f} AS (SELECT * FROM {p} WHERE {filters})",
            d = DATASET_,
            p = POLICY_,
            f = FILTER_,
            query = clean(dataset_query),
            policy = policy.as_str(),
            filters = self.filter_predicate(filters),
        )
    }

    /// The full layered select over a dataset query.
    pub fn layered_query(
        &self,
        dataset_query: &str,
        policy: &PolicyResult,
        filters: &[Filter],
        sort: Option<&SortOrder>,
    ) -> String {
        format!(
            "{} SELECT * FROM {}{}",
            self.layers(dataset_query, policy, filters),
            FILTER_,
            order_by(sort)
        )
    }

    /// One page of the layered select, for synchronous execution.
    pub fn layered_page_query(
        &self,
        dataset_query: &str,
        policy: &PolicyResult,
        filters: &[Filter],
        sort: Option<&SortOrder>,
        page: u64,
        page_size: u64,
    ) -> Option<String> {
        let limit = self.page_clause(page, page_size)?;
        Some(format!(
            "{}{}",
            self.layered_query(dataset_query, policy, filters, sort),
            limit
        ))
    }

    pub fn layered_count_query(
        &self,
        dataset_query: &str,
        policy: &PolicyResult,
        filters: &[Filter],
    ) -> String {
        format!(
            "{} SELECT COUNT(1) AS total FROM {}",
            self.layers(dataset_query, policy, filters),
            FILTER_
        )
    }

    /// Distinct values of one field over the filtered layer.
    pub fn distinct_values_query(
        &self,
        dataset_query: &str,
        policy: &PolicyResult,
        filters: &[Filter],
        field: &str,
        limit: Option<u64>,
    ) -> String {
        format!(
            "{} SELECT DISTINCT {field} FROM {f} WHERE {field} IS NOT NULL ORDER BY {field} asc{limit}",
            self.layers(dataset_query, policy, filters),
            field = field,
            f = FILTER_,
            limit = self.dialect.emit_limit_offset(limit, None),
        )
    }

    // =========================================================================
    // Result Tables
    // =========================================================================

    pub fn create_result_table(&self, table_id: &str, select: &str) -> String {
        self.dialect
            .create_table_as(&self.result_table(table_id), select)
    }

    /// Substitute the previous phase's table into a phase query.
    pub fn phase_query(&self, table_id: &str, position: usize, query: &str) -> String {
        let query = clean(query);
        match position.checked_sub(1) {
            Some(previous) => query.replace(PHASE_TABLE_TOKEN, &self.phase_table(table_id, previous)),
            None => query.to_string(),
        }
    }

    /// Materialize a non-final phase into its intermediate table.
    pub fn create_phase_table(&self, table_id: &str, position: usize, query: &str) -> String {
        self.dialect.create_table_as(
            &self.phase_table(table_id, position),
            &self.phase_query(table_id, position, query),
        )
    }

    /// A page of a materialized table. Pages start at 1; `None` for page 0.
    pub fn page_query(
        &self,
        table: &str,
        filters: &[Filter],
        sort: Option<&SortOrder>,
        page: u64,
        page_size: u64,
    ) -> Option<String> {
        let limit = self.page_clause(page, page_size)?;
        Some(format!(
            "SELECT * FROM {} WHERE {}{}{}",
            table,
            self.filter_predicate(filters),
            order_by(sort),
            limit
        ))
    }

    pub fn count_query(&self, table: &str, filters: &[Filter]) -> String {
        format!(
            "SELECT COUNT(1) AS total FROM {} WHERE {}",
            table,
            self.filter_predicate(filters)
        )
    }

    fn page_clause(&self, page: u64, page_size: u64) -> Option<String> {
        let offset = page.checked_sub(1)?.checked_mul(page_size)?;
        Some(self.dialect.emit_limit_offset(Some(page_size), Some(offset)))
    }

    // =========================================================================
    // Summaries
    // =========================================================================

    /// The summary's query with `${table_id}` bound to the result table.
    pub fn summary_query(&self, table_id: &str, summary: &ReportSummary) -> String {
        clean(&summary.query).replace(TABLE_ID_TOKEN, &self.result_table(table_id))
    }

    pub fn create_summary_table(&self, table_id: &str, summary: &ReportSummary) -> String {
        self.dialect.create_table_as(
            &self.summary_table(table_id, &summary.id),
            &self.summary_query(table_id, summary),
        )
    }

    pub fn read_summary(&self, table_id: &str, summary_id: &str) -> String {
        format!("SELECT * FROM {}", self.summary_table(table_id, summary_id))
    }
}

fn order_by(sort: Option<&SortOrder>) -> String {
    sort.map(SortOrder::clause).unwrap_or_default()
}

/// Trim whitespace and a trailing statement terminator.
fn clean(query: &str) -> &str {
    let query = query.trim();
    query.strip_suffix(';').unwrap_or(query).trim_end()
}
