//! Error types for the synchronization library.

use thiserror::Error;

/// Main error type for synchronization operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, conflicting flags).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error.
    #[error("Source database error: {0}")]
    Source(#[from] mysql_async::Error),

    /// Destination database connection or query error (PostgreSQL).
    #[error("Destination database error: {0}")]
    Dest(#[from] tokio_postgres::Error),

    /// Snapshot coordination failed (sessions could not agree on a read point).
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Schema validation failed for one or more tables.
    ///
    /// Carries the aggregated per-table messages so every problem is
    /// reported in a single pass before the pipeline starts.
    #[error("Schema validation failed:\n{}", .0.join("\n"))]
    Schema(Vec<String>),

    /// A pipeline stage failed for a specific table.
    #[error("Sync failed for table {table}: {message}")]
    Table { table: String, message: String },

    /// An inter-stage channel closed unexpectedly (a downstream pool died).
    #[error("Pipeline channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// IO error (stats report, SQL script output).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error (stats report).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a Table error.
    pub fn table(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Table {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) => 2,
            SyncError::Schema(_) => 3,
            SyncError::Snapshot(_) => 4,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_error_display() {
        let err = SyncError::table("shop.orders", "chunk fetch failed");
        assert_eq!(
            err.to_string(),
            "Sync failed for table shop.orders: chunk fetch failed"
        );
    }

    #[test]
    fn test_schema_error_aggregates_messages() {
        let err = SyncError::Schema(vec![
            "shop.a: no usable key".to_string(),
            "shop.b: column count mismatch".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("shop.a"));
        assert!(text.contains("shop.b"));
    }
}
