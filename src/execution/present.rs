//! Turning backend rows into report rows.

use crate::backend::BackendError;
use crate::definition::ResolvedReport;
use crate::error::ReportResult;
use crate::formula::{FormulaEngine, FormulaError};
use crate::value::{coerce_row, Row, Value};

/// Coerce rows to the schema, apply formulas, then keep visible columns.
///
/// When the variant declares no fields every column is kept.
pub(crate) fn present_rows(
    report: ResolvedReport<'_>,
    engine: &FormulaEngine,
    rows: Vec<Row>,
) -> ReportResult<Vec<Row>> {
    let rows = rows
        .into_iter()
        .map(|row| coerce_row(row, report.schema()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(FormulaError::from)?;
    let mut rows = engine.apply_all(rows, &report.formulas())?;

    if !report.variant.fields.is_empty() {
        for row in &mut rows {
            row.retain(|column, _| report.report_field(column).is_some_and(|f| f.visible));
        }
    }
    Ok(rows)
}

/// Read the `total` column of a count query.
pub(crate) fn total(rows: &[Row]) -> ReportResult<u64> {
    let value = rows
        .first()
        .and_then(|row| row.get("total"))
        .ok_or_else(|| BackendError::StatementFailed("count query returned no rows".into()))?;
    let count = match value {
        Value::Long(n) => u64::try_from(*n).ok(),
        Value::Double(n) if *n >= 0.0 => Some(*n as u64),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    count.ok_or_else(|| {
        BackendError::StatementFailed(format!("count query returned {:?}", value)).into()
    })
}
