//! SQL generation module.
//!
//! Report SQL is composed textually from layered subqueries (see
//! [`crate::query`]); this module holds the per-warehouse rendering rules.
//!
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;

pub use dialect::{Dialect, SqlDialect};
