//! Amazon Redshift SQL dialect.
//!
//! Redshift features used by report queries:
//! - PostgreSQL-based syntax
//! - ANSI identifier quoting (`"`)
//! - `ILIKE` for case-insensitive prefix matching
//! - `INTERVAL '1 day'` literals

use super::helpers;
use super::SqlDialect;

/// Amazon Redshift SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Redshift;

impl SqlDialect for Redshift {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn date_range_end(&self, field: &str, value: &str) -> String {
        helpers::date_range_end_cast(field, value, "INTERVAL '1 day'")
    }

    fn prefix_match(&self, field: &str, prefix: &str) -> String {
        format!("{} ILIKE {}", field, helpers::quote_like_prefix(prefix))
    }
}
