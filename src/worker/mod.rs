//! Worker communication module.
//!
//! Warehouse vendors without an in-process driver are reached through a
//! long-running driver worker. The worker owns the vendor SDKs (statement
//! APIs, credentials, connection pools); this crate only speaks the
//! protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  reportal (Rust + Tokio)                        │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                    WorkerClient (Async)                   │  │
//! │  │  - Spawns the driver worker as child process              │  │
//! │  │  - NDJSON protocol over stdin/stdout                      │  │
//! │  │  - Request IDs for concurrent request correlation         │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                              │                                   │
//! │               stdin (NDJSON) │ stdout (NDJSON)                  │
//! │                              ▼                                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          Driver Worker (Redshift Data API, Athena, ...)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use reportal::worker::WorkerClient;
//!
//! let client = WorkerClient::spawn("./reportal-worker").await?;
//! let id = client.submit_statement(&connection, "SELECT 1", None, None).await?;
//! ```

mod client;
mod error;
pub mod protocol;

pub use client::WorkerClient;
pub use error::{WorkerError, WorkerResult};
