//! Raw per-table catalog facts and the introspection queries that load them.
//!
//! The shapes here are the schema compiler's input: columns with semantic
//! kind flags, declared primary key, secondary indexes with cardinality, and
//! the storage facts needed for usability checks.

use mysql_async::prelude::*;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Semantic kind of a column, driving comparison and rendering decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Exact integer types.
    Integer,
    /// Approximate floating-point types.
    Float,
    /// Character data (including enums and sets).
    Character,
    /// Raw binary data.
    Binary,
    /// Date/time types compared as instants rather than text.
    DateTime,
    /// Anything else (decimal, json, ...): compared textually.
    Other,
}

/// Compiled column metadata. Immutable once built.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Source data-type tag (lowercase, e.g. "varchar", "datetime").
    pub data_type: String,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Semantic kind.
    pub kind: ColumnKind,

    /// Whether literal values require quoting in SQL text.
    pub needs_quote: bool,

    /// Whether a date/time column carries fractional seconds.
    pub fractional_seconds: bool,

    /// Whether the column is an enum (affects synthetic-key election).
    pub is_enum: bool,
}

impl ColumnInfo {
    /// Build column metadata from catalog facts, classifying the type tag.
    pub fn new(name: String, data_type: String, nullable: bool, datetime_precision: u32) -> Self {
        let data_type = data_type.to_lowercase();
        let kind = classify_type(&data_type);
        let is_enum = data_type == "enum";
        let needs_quote = !matches!(kind, ColumnKind::Integer | ColumnKind::Float);
        let fractional_seconds = kind == ColumnKind::DateTime && datetime_precision > 0;
        Self {
            name,
            data_type,
            nullable,
            kind,
            needs_quote,
            fractional_seconds,
            is_enum,
        }
    }

    /// Whether this column holds raw binary data.
    pub fn is_binary(&self) -> bool {
        self.kind == ColumnKind::Binary
    }

    /// Whether this column is compared as a date/time instant.
    pub fn is_datetime(&self) -> bool {
        self.kind == ColumnKind::DateTime
    }
}

/// Classify a type tag from either the MySQL or PostgreSQL catalog.
fn classify_type(data_type: &str) -> ColumnKind {
    match data_type {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" | "bit"
        | "int2" | "int4" | "int8" => ColumnKind::Integer,
        "float" | "double" | "real" | "double precision" | "float4" | "float8" => ColumnKind::Float,
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set"
        | "character" | "character varying" | "json" | "jsonb" | "uuid" => ColumnKind::Character,
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "bytea" => {
            ColumnKind::Binary
        }
        "datetime" | "timestamp" | "timestamptz" | "timestamp without time zone"
        | "timestamp with time zone" => ColumnKind::DateTime,
        _ => ColumnKind::Other,
    }
}

/// Secondary index facts.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,

    /// Indexed column names in key order.
    pub columns: Vec<String>,

    /// Estimated distinct-value count from the catalog.
    pub cardinality: u64,

    /// Whether the index is declared unique.
    pub unique: bool,
}

/// Raw catalog facts for one table, as loaded from the database.
#[derive(Debug, Clone)]
pub struct TableFacts {
    /// Schema (database) name.
    pub schema: String,

    /// Table name.
    pub table: String,

    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,

    /// Declared primary-key column names (empty when none exists).
    pub primary_key: Vec<String>,

    /// Secondary indexes with cardinality.
    pub indexes: Vec<IndexInfo>,

    /// Approximate row count.
    pub row_count: u64,

    /// Estimated average row size in bytes.
    pub avg_row_bytes: u64,

    /// Storage engine name (empty when the catalog does not report one).
    pub engine: String,

    /// Catalog table kind ("BASE TABLE", "VIEW", ...).
    pub table_kind: String,

    /// Whether any trigger is defined on the table.
    pub has_triggers: bool,
}

impl TableFacts {
    /// Fully qualified name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Load catalog facts for one table from a MySQL session.
pub async fn mysql_table_facts(
    conn: &mut mysql_async::Conn,
    schema: &str,
    table: &str,
) -> Result<TableFacts> {
    let cols: Vec<(String, String, String, Option<u32>)> = conn
        .exec(
            "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, DATETIME_PRECISION \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
            (schema, table),
        )
        .await?;
    if cols.is_empty() {
        return Err(SyncError::table(
            format!("{}.{}", schema, table),
            "table not found in source catalog",
        ));
    }

    let columns: Vec<ColumnInfo> = cols
        .into_iter()
        .map(|(name, data_type, is_nullable, precision)| {
            ColumnInfo::new(name, data_type, is_nullable == "YES", precision.unwrap_or(0))
        })
        .collect();

    // STATISTICS yields one row per (index, position); fold into IndexInfo,
    // keeping the cardinality of the last key part (the widest estimate).
    let stats: Vec<(String, i64, String, Option<u64>)> = conn
        .exec(
            "SELECT INDEX_NAME, NON_UNIQUE, COLUMN_NAME, CARDINALITY \
             FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY INDEX_NAME, SEQ_IN_INDEX",
            (schema, table),
        )
        .await?;

    let mut primary_key = Vec::new();
    let mut indexes: Vec<IndexInfo> = Vec::new();
    for (index_name, non_unique, column_name, cardinality) in stats {
        if index_name == "PRIMARY" {
            primary_key.push(column_name);
            continue;
        }
        match indexes.iter_mut().find(|i| i.name == index_name) {
            Some(idx) => {
                idx.columns.push(column_name);
                idx.cardinality = cardinality.unwrap_or(idx.cardinality);
            }
            None => indexes.push(IndexInfo {
                name: index_name,
                columns: vec![column_name],
                cardinality: cardinality.unwrap_or(0),
                unique: non_unique == 0,
            }),
        }
    }

    let table_row: Option<(Option<String>, String, Option<u64>, Option<u64>)> = conn
        .exec_first(
            "SELECT ENGINE, TABLE_TYPE, TABLE_ROWS, AVG_ROW_LENGTH \
             FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
            (schema, table),
        )
        .await?;
    let (engine, table_kind, row_count, avg_row_bytes) = match table_row {
        Some((engine, kind, rows, avg)) => {
            (engine.unwrap_or_default(), kind, rows.unwrap_or(0), avg.unwrap_or(0))
        }
        None => (String::new(), String::new(), 0, 0),
    };

    let trigger_count: Option<u64> = conn
        .exec_first(
            "SELECT COUNT(*) FROM information_schema.TRIGGERS \
             WHERE EVENT_OBJECT_SCHEMA = ? AND EVENT_OBJECT_TABLE = ?",
            (schema, table),
        )
        .await?;

    let facts = TableFacts {
        schema: schema.to_string(),
        table: table.to_string(),
        columns,
        primary_key,
        indexes,
        row_count,
        avg_row_bytes,
        engine,
        table_kind,
        has_triggers: trigger_count.unwrap_or(0) > 0,
    };
    debug!(
        "loaded source facts for {}: {} columns, pk [{}], {} indexes",
        facts.full_name(),
        facts.columns.len(),
        facts.primary_key.join(", "),
        facts.indexes.len()
    );
    Ok(facts)
}

/// Load catalog facts for one table from a PostgreSQL destination.
///
/// Index and storage facts are not needed on the destination side; only the
/// column shape and primary key participate in cross-validation.
pub async fn pg_table_facts(
    client: &tokio_postgres::Client,
    schema: &str,
    table: &str,
) -> Result<TableFacts> {
    // information_schema exposes domain types; cast to concrete types so
    // the values decode as plain text/int4.
    let rows = client
        .query(
            "SELECT column_name::text, data_type::text, is_nullable::text, \
                    datetime_precision::int \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
            &[&schema, &table],
        )
        .await?;
    if rows.is_empty() {
        return Err(SyncError::table(
            format!("{}.{}", schema, table),
            "table not found in destination catalog",
        ));
    }

    let columns: Vec<ColumnInfo> = rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let is_nullable: String = row.get(2);
            let precision: Option<i32> = row.get(3);
            ColumnInfo::new(
                name,
                data_type,
                is_nullable == "YES",
                precision.unwrap_or(0).max(0) as u32,
            )
        })
        .collect();

    let pk_rows = client
        .query(
            "SELECT kcu.column_name::text \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
              AND tc.table_name = kcu.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = $1 AND tc.table_name = $2 \
             ORDER BY kcu.ordinal_position",
            &[&schema, &table],
        )
        .await?;
    let primary_key = pk_rows.iter().map(|r| r.get(0)).collect();

    Ok(TableFacts {
        schema: schema.to_string(),
        table: table.to_string(),
        columns,
        primary_key,
        indexes: Vec::new(),
        row_count: 0,
        avg_row_bytes: 0,
        engine: String::new(),
        table_kind: "BASE TABLE".to_string(),
        has_triggers: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_mysql_types() {
        assert_eq!(classify_type("bigint"), ColumnKind::Integer);
        assert_eq!(classify_type("double"), ColumnKind::Float);
        assert_eq!(classify_type("varchar"), ColumnKind::Character);
        assert_eq!(classify_type("longblob"), ColumnKind::Binary);
        assert_eq!(classify_type("datetime"), ColumnKind::DateTime);
        assert_eq!(classify_type("decimal"), ColumnKind::Other);
    }

    #[test]
    fn test_classify_postgres_types() {
        assert_eq!(classify_type("integer"), ColumnKind::Integer);
        assert_eq!(classify_type("double precision"), ColumnKind::Float);
        assert_eq!(classify_type("character varying"), ColumnKind::Character);
        assert_eq!(classify_type("bytea"), ColumnKind::Binary);
        assert_eq!(
            classify_type("timestamp without time zone"),
            ColumnKind::DateTime
        );
    }

    #[test]
    fn test_column_info_flags() {
        let col = ColumnInfo::new("ts".into(), "DATETIME".into(), true, 6);
        assert!(col.is_datetime());
        assert!(col.fractional_seconds);
        assert!(col.needs_quote);

        let col = ColumnInfo::new("id".into(), "int".into(), false, 0);
        assert!(!col.needs_quote);
        assert_eq!(col.kind, ColumnKind::Integer);

        let col = ColumnInfo::new("state".into(), "enum".into(), false, 0);
        assert!(col.is_enum);
        assert_eq!(col.kind, ColumnKind::Character);
    }
}
