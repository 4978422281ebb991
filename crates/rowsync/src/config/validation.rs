//! Configuration validation.
//!
//! All checks here run before any connection is opened; a failure aborts the
//! run with a [`SyncError::Config`].

use super::{DialectName, SyncConfig};
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &SyncConfig) -> Result<()> {
    if config.source.host.is_empty() {
        return Err(SyncError::Config("source.host is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(SyncError::Config("source.user is required".into()));
    }

    let script_only = config.sync.sql_output.is_some();
    if config.dest.dialect == DialectName::Mssql && !script_only {
        return Err(SyncError::Config(
            "dest.dialect 'mssql' supports SQL script output only; set sync.sql_output".into(),
        ));
    }
    if !script_only {
        if config.dest.host.is_empty() {
            return Err(SyncError::Config("dest.host is required".into()));
        }
        if config.dest.dialect == DialectName::Postgres && config.dest.database.is_empty() {
            return Err(SyncError::Config(
                "dest.database is required for postgres".into(),
            ));
        }
    }

    if config.tables.is_empty() {
        return Err(SyncError::Config("at least one table is required".into()));
    }
    for spec in &config.tables {
        if spec.schema.is_empty() || spec.table.is_empty() {
            return Err(SyncError::Config(
                "tables entries require both schema and table".into(),
            ));
        }
    }

    let sync = &config.sync;
    if sync.browsers == 0 || sync.readers == 0 || sync.writers == 0 {
        return Err(SyncError::Config(
            "sync.browsers, sync.readers and sync.writers must be at least 1".into(),
        ));
    }
    if sync.chunk_size == 0 {
        return Err(SyncError::Config("sync.chunk_size must be at least 1".into()));
    }
    if sync.insert_size == 0 {
        return Err(SyncError::Config("sync.insert_size must be at least 1".into()));
    }
    if sync.insert_size as u64 > sync.chunk_size {
        return Err(SyncError::Config(format!(
            "sync.insert_size ({}) must not exceed sync.chunk_size ({})",
            sync.insert_size, sync.chunk_size
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DestConfig, SourceConfig, SyncOptions, TableSpec};

    fn valid_config() -> SyncConfig {
        SyncConfig {
            source: SourceConfig {
                host: "localhost".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: "secret".to_string(),
            },
            dest: DestConfig {
                dialect: DialectName::Postgres,
                host: "localhost".to_string(),
                port: 5432,
                database: "shop".to_string(),
                user: "postgres".to_string(),
                password: "secret".to_string(),
            },
            tables: vec![TableSpec {
                schema: "shop".to_string(),
                table: "orders".to_string(),
                dest_schema: None,
            }],
            sync: SyncOptions::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_no_tables() {
        let mut config = valid_config();
        config.tables.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_mssql_requires_script_output() {
        let mut config = valid_config();
        config.dest.dialect = DialectName::Mssql;
        assert!(validate(&config).is_err());

        config.sync.sql_output = Some("out.sql".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_insert_size_bounded_by_chunk_size() {
        let mut config = valid_config();
        config.sync.chunk_size = 50;
        config.sync.insert_size = 100;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.sync.readers = 0;
        assert!(validate(&config).is_err());
    }
}
