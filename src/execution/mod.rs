//! Report execution services.
//!
//! ```text
//! request ──► filter validation + policy ──► QueryComposer ──► BackendDriver
//!                                                                  │
//!   AsyncExecutionService: CREATE TABLE AS, poll, page, summarize ◄┤
//!   SyncExecutionService:  query, present rows                    ◄┘
//! ```

mod async_service;
mod ledger;
mod model;
mod present;
mod sync_service;

pub use async_service::AsyncExecutionService;
pub use ledger::{ExecutionLedger, InMemoryLedger, DEFAULT_TERMINAL_RETENTION};
pub use model::{
    CancelResponse, ExecutionHandle, ExecutionKey, MultiphaseQueryExecution, Page, QueryExecution,
    ReportRequest, StatementExecutionResponse,
};
pub use sync_service::SyncExecutionService;
