//! Sort column resolution.

use crate::definition::ResolvedReport;
use crate::error::{ValidationError, ValidationErrorKind};

/// A resolved `ORDER BY` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub column: String,
    pub ascending: bool,
}

impl SortOrder {
    pub fn new(column: impl Into<String>, ascending: bool) -> Self {
        Self {
            column: column.into(),
            ascending,
        }
    }

    /// The `ORDER BY` clause, including its leading space.
    pub fn clause(&self) -> String {
        format!(
            " ORDER BY {} {}",
            self.column,
            if self.ascending { "asc" } else { "desc" }
        )
    }
}

/// Pick the sort column for a request.
///
/// A requested column must name a sortable report field. Without a request
/// the variant's `defaultSort` field is used; no default means no ordering.
pub fn resolve_sort(
    report: ResolvedReport<'_>,
    requested: Option<&str>,
    ascending: bool,
) -> Result<Option<SortOrder>, ValidationError> {
    match requested.map(str::trim).filter(|c| !c.is_empty()) {
        Some(column) => report
            .variant
            .fields
            .iter()
            .find(|f| f.sortable && f.field_name() == column)
            .map(|f| Some(SortOrder::new(f.field_name(), ascending)))
            .ok_or_else(|| ValidationErrorKind::InvalidSortColumn.error(&[column])),
        None => Ok(report
            .variant
            .fields
            .iter()
            .find(|f| f.default_sort)
            .map(|f| SortOrder::new(f.field_name(), ascending))),
    }
}
