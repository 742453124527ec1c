//! Shared helper functions for SQL dialect implementations.
//!
//! Dialects compose these to implement `SqlDialect` with minimal
//! duplication.

// =============================================================================
// Identifier and String Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Redshift, Athena, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote string with single quotes (standard SQL).
/// Used by: All dialects
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote a `LIKE` prefix pattern, escaping the wildcards in the prefix.
pub fn quote_like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    quote_string_single(&format!("{}%", escaped))
}

/// Keep `[A-Za-z0-9_]`, replace everything else with `_`.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Redshift, Athena
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: SQLite
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit ` LIMIT n OFFSET m` (standard SQL). Empty when neither is set.
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> String {
    let mut sql = String::new();
    if let Some(lim) = limit {
        sql.push_str(&format!(" LIMIT {}", lim));
    }
    if let Some(off) = offset {
        sql.push_str(&format!(" OFFSET {}", off));
    }
    sql
}

// =============================================================================
// Date Ranges
// =============================================================================

/// `field >= CAST('value' AS timestamp)`
pub fn date_range_start_cast(field: &str, value: &str) -> String {
    format!("{} >= CAST({} AS timestamp)", field, quote_string_single(value))
}

/// `field < CAST('value' AS timestamp) + <interval>`; the end day is inclusive.
pub fn date_range_end_cast(field: &str, value: &str, one_day: &str) -> String {
    format!(
        "{} < (CAST({} AS timestamp) + {})",
        field,
        quote_string_single(value),
        one_day
    )
}
