//! Report SQL composition.
//!
//! Report queries are built as textual layers over the dataset query:
//!
//! ```text
//! WITH dataset_ AS (<dataset query>),
//!      policy_  AS (SELECT * FROM dataset_ WHERE <policy predicate>),
//!      filter_  AS (SELECT * FROM policy_ WHERE <filter predicates>)
//! SELECT * FROM filter_ [ORDER BY <column> asc|desc]
//! ```
//!
//! Everything vendor-specific is delegated to the [`Dialect`](crate::sql::Dialect),
//! so the orchestration code never touches quoting or date arithmetic.

mod composer;
mod sort;

pub use composer::{generate_table_id, QueryComposer, PHASE_TABLE_TOKEN, TABLE_ID_TOKEN};
pub use sort::{resolve_sort, SortOrder};

pub const DATASET_: &str = "dataset_";
pub const POLICY_: &str = "policy_";
pub const FILTER_: &str = "filter_";
