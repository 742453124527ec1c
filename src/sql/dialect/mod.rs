//! SQL dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for the syntax differences
//! between the warehouses reports run on. Each dialect implements
//! `SqlDialect` to handle:
//!
//! - Identifier and literal quoting
//! - Boolean literals: true/false vs 1/0
//! - Pagination
//! - Date range bounds and case-insensitive prefix matching
//! - `CREATE TABLE ... AS` materialization
//!
//! # Usage
//!
//! ```ignore
//! use reportal::sql::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Athena;
//! let predicate = dialect.prefix_match("name", "ab");
//! ```

pub mod helpers;
mod athena;
mod redshift;
mod sqlite;

pub use athena::Athena;
pub use redshift::Redshift;
pub use sqlite::Sqlite;

use std::str::FromStr;

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal with `''` escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit the LIMIT/OFFSET suffix, including its leading space.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Qualify a table with its schema.
    fn qualify(&self, schema: &str, table: &str) -> String {
        if schema.is_empty() {
            table.to_string()
        } else {
            format!("{}.{}", schema, table)
        }
    }

    /// Materialize a select into a new table.
    fn create_table_as(&self, table: &str, select: &str) -> String {
        format!("CREATE TABLE {} AS {}", table, select)
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Inclusive lower bound of a date range.
    fn date_range_start(&self, field: &str, value: &str) -> String {
        helpers::date_range_start_cast(field, value)
    }

    /// Upper bound of a date range; the whole end day is included.
    fn date_range_end(&self, field: &str, value: &str) -> String {
        helpers::date_range_end_cast(field, value, "INTERVAL '1' DAY")
    }

    /// Case-insensitive "starts with" match.
    fn prefix_match(&self, field: &str, prefix: &str) -> String {
        format!(
            "lower({}) LIKE lower({}) ESCAPE '\\'",
            field,
            helpers::quote_like_prefix(prefix)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Redshift,
    Athena,
    Sqlite,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Redshift => &Redshift,
            Dialect::Athena => &Athena,
            Dialect::Sqlite => &Sqlite,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        self.dialect().qualify(schema, table)
    }

    fn create_table_as(&self, table: &str, select: &str) -> String {
        self.dialect().create_table_as(table, select)
    }

    fn date_range_start(&self, field: &str, value: &str) -> String {
        self.dialect().date_range_start(field, value)
    }

    fn date_range_end(&self, field: &str, value: &str) -> String {
        self.dialect().date_range_end(field, value)
    }

    fn prefix_match(&self, field: &str, prefix: &str) -> String {
        self.dialect().prefix_match(field, prefix)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redshift" => Ok(Dialect::Redshift),
            "athena" => Ok(Dialect::Athena),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(format!("Unknown dialect: {}", other)),
        }
    }
}
