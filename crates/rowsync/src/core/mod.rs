//! Core data model shared by every pipeline stage.
//!
//! - [`catalog`]: raw per-table catalog facts (columns, indexes, key metadata)
//! - [`row`]: rows, chunk boundaries and DML operations flowing between stages
//!
//! Everything here is built once before the pipeline starts and is immutable
//! afterwards, so it can be shared freely across worker tasks.

pub mod catalog;
pub mod row;

pub use catalog::{ColumnInfo, ColumnKind, IndexInfo, TableFacts};
pub use row::{
    ChunkBoundary, ChunkOps, ChunkPair, DataChunk, DmlKind, DmlOp, ExecutableStatement, Field,
    KeyTuple, RowRecord, StatementParam,
};
