//! # Reportal
//!
//! Declarative report execution over interchangeable data-warehouse
//! backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        ReportDefinition (dataset, fields, policies)      │
//! └─────────────────────────────────────────────────────────┘
//!            │                              │
//!            ▼ [filter]                     ▼ [policy]
//! ┌──────────────────────────┐  ┌──────────────────────────┐
//! │   typed Filters          │  │  predicate / TRUE / FALSE │
//! └──────────────────────────┘  └──────────────────────────┘
//!            │                              │
//!            └──────────────┬───────────────┘
//!                           ▼ [query + sql dialects]
//! ┌─────────────────────────────────────────────────────────┐
//! │        layered SQL: dataset_ → policy_ → filter_         │
//! └─────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼ [execution → backend]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Redshift / Athena (worker process)  ·  SQLite (local)  │
//! └─────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼ [formula]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 presented result rows                    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod definition;
pub mod error;
pub mod execution;
pub mod filter;
pub mod formula;
pub mod policy;
pub mod query;
mod retained;
pub mod sql;
pub mod value;
pub mod worker;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::backend::{
        BackendDriver, BackendError, BackendRegistry, ExecutionState, SqliteDriver,
        StatementExecutionStatus, Vendor, WorkerDriver,
    };
    pub use crate::config::Settings;
    pub use crate::definition::{
        DefinitionStore, FilterDefinition, FilterType, InMemoryDefinitionStore, ReportDefinition,
        ResolvedReport,
    };
    pub use crate::error::{ReportError, ReportResult, ValidationError, ValidationErrorKind};
    pub use crate::execution::{
        AsyncExecutionService, ExecutionHandle, Page, ReportRequest, StatementExecutionResponse,
        SyncExecutionService,
    };
    pub use crate::filter::{Filter, FilterTag, FilterValidator};
    pub use crate::formula::FormulaEngine;
    pub use crate::policy::{evaluate, CallerContext, PolicyResult};
    pub use crate::query::{QueryComposer, SortOrder};
    pub use crate::sql::{Dialect, SqlDialect};
    pub use crate::value::{Row, Value};
}

pub use error::{ReportError, ReportResult};
pub use sql::Dialect;
