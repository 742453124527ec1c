//! Amazon Athena (Trino engine) SQL dialect.
//!
//! - ANSI identifier quoting (`"`)
//! - No `ILIKE`; prefix matching lowercases both sides
//! - `INTERVAL '1' DAY` literals

use super::helpers;
use super::SqlDialect;

/// Amazon Athena SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Athena;

impl SqlDialect for Athena {
    fn name(&self) -> &'static str {
        "athena"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    // Uses default date ranges (CAST ... AS timestamp, INTERVAL '1' DAY)
}
