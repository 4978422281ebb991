//! Consistent, parallel, row-level table synchronization.
//!
//! Compares tables between a MySQL source and a MySQL or PostgreSQL
//! destination (SQL Server via script output) at one fixed logical instant,
//! and produces the INSERT/UPDATE/DELETE statements that make the
//! destination converge to the source.
//!
//! A run proceeds in two phases. Setup loads the catalog, compiles per-table
//! SQL ([`schema`]), and brings a pool of source sessions to a single agreed
//! consistent-snapshot read point ([`snapshot`]). The pipeline ([`pipeline`])
//! then streams each table through six worker pools connected by bounded
//! channels: key-space browsing, source and destination range reads
//! ([`chunk`]), sort-merge comparison ([`diff`]), and statement generation
//! and application ([`apply`]).
//!
//! ```no_run
//! # async fn example() -> rowsync::Result<()> {
//! let config = rowsync::SyncConfig::load("sync.yaml")?;
//! let report = rowsync::pipeline::run(config).await?;
//! println!("{} table(s) synchronized", report.tables.len());
//! # Ok(())
//! # }
//! ```

pub mod apply;
pub mod chunk;
pub mod config;
pub mod conn;
pub mod core;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod snapshot;
pub mod stats;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use stats::StatsReport;
