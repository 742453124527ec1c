//! Computed display columns.
//!
//! A report variant may attach a formula template to a column. Templates
//! come in three forms, recognized by prefix:
//!
//! - `make_url(href, text, newTab)` renders an anchor tag
//! - `format_date(${column}, "pattern")` reformats a date column
//! - anything else is plain `${column}` interpolation
//!
//! Columns without a formula pass through unchanged.

mod date_format;

pub use date_format::{format_with_pattern, to_chrono_format};

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::value::{Row, Value};

const MAKE_URL: &str = "make_url(";
const FORMAT_DATE: &str = "format_date(";
const ENV_TOKEN: &str = "${env}";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_.]+)\}").expect("placeholder regex is valid")
});

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    #[error("Formula for column '{column}' is malformed: {formula}")]
    Malformed { column: String, formula: String },

    #[error("Column '{column}' holds {found}, which cannot be formatted as a date")]
    NotADate { column: String, found: String },

    #[error(transparent)]
    Coercion(#[from] crate::value::CoercionError),
}

/// Applies formula templates to result rows.
#[derive(Debug, Clone, Default)]
pub struct FormulaEngine {
    env: Option<String>,
}

impl FormulaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the environment token substituted for `${env}` in URLs.
    pub fn with_env(env: Option<String>) -> Self {
        Self {
            env: env.filter(|e| !e.is_empty()),
        }
    }

    /// Apply `formulas` (column → template) to a row.
    ///
    /// Output columns are the row's columns plus any formula-only columns.
    pub fn apply(&self, row: &Row, formulas: &BTreeMap<String, String>) -> Result<Row, FormulaError> {
        let mut out = row.clone();
        for (column, formula) in formulas {
            let formula = formula.trim();
            if formula.is_empty() {
                continue;
            }
            let value = self.evaluate(column, formula, row)?;
            out.insert(column.clone(), Value::String(value));
        }
        Ok(out)
    }

    /// Apply formulas to every row.
    pub fn apply_all(
        &self,
        rows: Vec<Row>,
        formulas: &BTreeMap<String, String>,
    ) -> Result<Vec<Row>, FormulaError> {
        if formulas.is_empty() {
            return Ok(rows);
        }
        rows.iter().map(|row| self.apply(row, formulas)).collect()
    }

    fn evaluate(&self, column: &str, formula: &str, row: &Row) -> Result<String, FormulaError> {
        if let Some(args) = formula.strip_prefix(MAKE_URL) {
            let args = arguments(column, formula, args)?;
            self.make_url(&args, row)
                .ok_or_else(|| malformed(column, formula))
        } else if let Some(args) = formula.strip_prefix(FORMAT_DATE) {
            let args = arguments(column, formula, args)?;
            format_date(column, formula, &args, row)
        } else {
            Ok(interpolate(formula, row))
        }
    }

    fn make_url(&self, args: &[String], row: &Row) -> Option<String> {
        let href = args.first()?;
        let text = args.get(1).unwrap_or(href);
        let new_tab = args
            .get(2)
            .is_some_and(|flag| flag.eq_ignore_ascii_case("TRUE"));

        let href = substitute_blank(&self.apply_env(href), row);
        let text = substitute_blank(&self.apply_env(text), row);

        if new_tab {
            Some(format!("<a href={} target=\"_blank\">{}</a>", href, text))
        } else {
            Some(format!("<a href={}>{}</a>", href, text))
        }
    }

    fn apply_env(&self, template: &str) -> String {
        match &self.env {
            Some(env) => template.replace(ENV_TOKEN, env),
            None => template
                .replace(&format!("-{}", ENV_TOKEN), "")
                .replace(ENV_TOKEN, ""),
        }
    }
}

fn format_date(
    column: &str,
    formula: &str,
    args: &[String],
    row: &Row,
) -> Result<String, FormulaError> {
    let (Some(source), Some(pattern)) = (args.first(), args.get(1)) else {
        return Err(malformed(column, formula));
    };
    let source = PLACEHOLDER
        .captures(source)
        .and_then(|c| c.get(1))
        .map_or(source.as_str(), |m| m.as_str());

    match row.get(source) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::Date(date)) => Ok(date
            .and_hms_opt(0, 0, 0)
            .map(|dt| format_with_pattern(&dt, pattern))
            .unwrap_or_default()),
        Some(Value::DateTime(dt)) => Ok(format_with_pattern(dt, pattern)),
        Some(other) => Err(FormulaError::NotADate {
            column: source.to_string(),
            found: format!("{:?}", other),
        }),
    }
}

/// Replace `${name}` with the row value; null becomes empty, unknown names
/// are left in place.
pub fn interpolate(template: &str, row: &Row) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| match row.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Replace `${name}` with the row value; null and unknown names become empty.
fn substitute_blank(template: &str, row: &Row) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            row.get(&caps[1]).map(Value::to_string).unwrap_or_default()
        })
        .into_owned()
}

/// Split the argument list of `name(a, "b", c)` after the opening paren.
fn arguments(column: &str, formula: &str, rest: &str) -> Result<Vec<String>, FormulaError> {
    let inner = rest
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| malformed(column, formula))?;

    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in inner.chars() {
        match (c, quote) {
            ('\'' | '"', None) => quote = Some(c),
            (q, Some(open)) if q == open => quote = None,
            ('{', None) => {
                depth += 1;
                current.push(c);
            }
            ('}', None) => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (',', None) if depth == 0 => args.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if quote.is_some() {
        return Err(malformed(column, formula));
    }
    args.push(current);

    Ok(args.into_iter().map(|a| a.trim().to_string()).collect())
}

fn malformed(column: &str, formula: &str) -> FormulaError {
    FormulaError::Malformed {
        column: column.to_string(),
        formula: formula.to_string(),
    }
}
