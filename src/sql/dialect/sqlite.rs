//! SQLite SQL dialect.
//!
//! Used by the in-process backend. Dates are stored as ISO text, so date
//! ranges compare strings and use `date()` arithmetic for the end bound.
//! Booleans are stored as integers.

use super::helpers;
use super::SqlDialect;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn date_range_start(&self, field: &str, value: &str) -> String {
        format!("{} >= {}", field, helpers::quote_string_single(value))
    }

    fn date_range_end(&self, field: &str, value: &str) -> String {
        format!(
            "{} < date({}, '+1 day')",
            field,
            helpers::quote_string_single(value)
        )
    }
}
