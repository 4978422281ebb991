//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Source database connection (MySQL).
    pub source: SourceConfig,

    /// Destination database connection and dialect.
    pub dest: DestConfig,

    /// Tables to synchronize.
    pub tables: Vec<TableSpec>,

    /// Pipeline behavior configuration.
    #[serde(default)]
    pub sync: SyncOptions,
}

/// Source database (MySQL) connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,
}

/// Destination database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestConfig {
    /// Destination SQL dialect.
    pub dialect: DialectName,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (0 selects the dialect default).
    #[serde(default)]
    pub port: u16,

    /// Database name (required for PostgreSQL).
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,
}

impl DestConfig {
    /// Effective port, falling back to the dialect default.
    pub fn effective_port(&self) -> u16 {
        if self.port != 0 {
            return self.port;
        }
        match self.dialect {
            DialectName::Mysql => 3306,
            DialectName::Postgres => 5432,
            DialectName::Mssql => 1433,
        }
    }

    /// Build a connection string for tokio-postgres.
    pub fn pg_connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host,
            self.effective_port(),
            self.database,
            self.user,
            self.password
        )
    }
}

/// Supported destination dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectName {
    /// MySQL / MariaDB.
    Mysql,
    /// PostgreSQL.
    Postgres,
    /// Microsoft SQL Server (SQL script output only; no direct execution).
    Mssql,
}

impl DialectName {
    /// Dialect identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectName::Mysql => "mysql",
            DialectName::Postgres => "postgres",
            DialectName::Mssql => "mssql",
        }
    }
}

/// One (schema, table) pair to synchronize, with optional destination remapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Source schema (database) name.
    pub schema: String,

    /// Table name.
    pub table: String,

    /// Destination schema name (defaults to the source schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_schema: Option<String>,
}

impl TableSpec {
    /// Fully qualified source name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Effective destination schema.
    pub fn effective_dest_schema(&self) -> &str {
        self.dest_schema.as_deref().unwrap_or(&self.schema)
    }
}

/// Pipeline behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Number of chunk browser workers.
    #[serde(default = "default_browsers")]
    pub browsers: usize,

    /// Number of source (and destination) chunk reader workers.
    #[serde(default = "default_readers")]
    pub readers: usize,

    /// Number of destination writer workers.
    #[serde(default = "default_writers")]
    pub writers: usize,

    /// Target number of rows per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Maximum rows per multi-row INSERT statement.
    #[serde(default = "default_insert_size")]
    pub insert_size: usize,

    /// Promote the best secondary index to a synthetic primary key when a
    /// table has no true primary key.
    #[serde(default)]
    pub allow_synthetic_pk: bool,

    /// Suppress INSERT statements (count them as no-ops instead).
    #[serde(default)]
    pub no_insert: bool,

    /// Suppress UPDATE statements.
    #[serde(default)]
    pub no_update: bool,

    /// Suppress DELETE statements.
    #[serde(default)]
    pub no_delete: bool,

    /// Write the per-table counter report to this file as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_path: Option<PathBuf>,

    /// Render DML as dialect-safe literal SQL into this file instead of
    /// executing it against the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_output: Option<PathBuf>,

    /// Timeout for short control queries, in seconds.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,

    /// Timeout for chunk data fetches, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            browsers: default_browsers(),
            readers: default_readers(),
            writers: default_writers(),
            chunk_size: default_chunk_size(),
            insert_size: default_insert_size(),
            allow_synthetic_pk: false,
            no_insert: false,
            no_update: false,
            no_delete: false,
            stats_path: None,
            sql_output: None,
            statement_timeout_secs: default_statement_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

// Default value functions for serde

fn default_mysql_port() -> u16 {
    3306
}

fn default_browsers() -> usize {
    2
}

fn default_readers() -> usize {
    4
}

fn default_writers() -> usize {
    4
}

fn default_chunk_size() -> u64 {
    10_000
}

fn default_insert_size() -> usize {
    100
}

fn default_statement_timeout() -> u64 {
    30
}

fn default_fetch_timeout() -> u64 {
    600
}
