//! Schema compiler.
//!
//! Turns raw catalog facts into [`TableMeta`] records holding precompiled
//! SQL text for every query the pipeline runs: chunk-range selects for both
//! sides, the browser's key-walk statements, and the DML skeletons the
//! statement generator fills in per row. Built once before the pipeline
//! starts, then shared read-only by all workers.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::TableSpec;
use crate::core::{ColumnInfo, TableFacts};
use crate::dialect::{qualify, Dialect, DialectKind, MysqlDialect};
use crate::error::{Result, SyncError};

/// The chunk-fetch query shapes for one side of one table.
///
/// Which one applies depends on the chunk boundary: the first chunk of a
/// table has no lower bound, the last has no upper bound, everything in
/// between is an interval. A table small enough for a single chunk has no
/// bound at all and scans the whole table.
#[derive(Debug, Clone)]
pub struct ChunkQueries {
    /// `begin <= key < end`.
    pub interval: String,
    /// `begin <= key` (final chunk).
    pub lower_only: String,
    /// `key < end` (first chunk).
    pub upper_only: String,
    /// Unbounded (single-chunk table).
    pub full: String,
}

/// Compiled, immutable metadata for one synchronized table.
#[derive(Debug)]
pub struct TableMeta {
    /// Index into the run's table list; scopes chunk ids.
    pub table_id: usize,

    /// Source schema (database) name.
    pub source_schema: String,

    /// Destination schema name (after remapping).
    pub dest_schema: String,

    /// Table name (identical on both sides).
    pub table: String,

    /// Columns in source ordinal order; validated to match the destination.
    pub columns: Vec<ColumnInfo>,

    /// Destination-side type tags, used for parameter casts.
    pub dest_types: Vec<String>,

    /// Primary-key column positions, in key order.
    pub pk_cols: Vec<usize>,

    /// Whether the key is a promoted secondary index.
    pub synthetic_key: bool,

    /// Approximate row count from the source catalog.
    pub row_count: u64,

    /// Quoted source table reference.
    pub src_ref: String,

    /// Quoted destination table reference.
    pub dest_ref: String,

    /// Quoted source key column list (for browse ORDER BY / select).
    src_key_list: String,

    /// Chunk-fetch queries against the source.
    pub src_queries: ChunkQueries,

    /// Chunk-fetch queries against the destination.
    pub dest_queries: ChunkQueries,

    /// `SELECT <keys> FROM <src> ORDER BY <keys> LIMIT 1`.
    pub browse_first_sql: String,

    /// `INSERT INTO <dest> (<cols>) VALUES ` — the generator appends one
    /// or more parenthesized row groups.
    pub insert_prefix: String,

    /// `UPDATE <dest> SET `.
    pub update_prefix: String,

    /// `DELETE FROM <dest> WHERE `.
    pub delete_prefix: String,

    /// Destination-quoted column names, the per-column skeleton fragments
    /// the generator joins with placeholders or NULL keywords.
    pub dest_quoted_cols: Vec<String>,
}

impl TableMeta {
    /// Fully qualified source name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.source_schema, self.table)
    }

    /// Key column metadata in key order.
    pub fn key_columns(&self) -> Vec<&ColumnInfo> {
        self.pk_cols.iter().map(|&i| &self.columns[i]).collect()
    }

    /// Semantic kinds of the key columns, in key order.
    pub fn key_kinds(&self) -> Vec<crate::core::ColumnKind> {
        self.pk_cols.iter().map(|&i| self.columns[i].kind).collect()
    }

    /// The browser's advance statement for a given chunk size: the key
    /// tuple reached after advancing `n` rows from the bound key. Chunk
    /// size is inlined, so growing it means re-preparing.
    pub fn browse_advance_sql(&self, n: u64) -> String {
        let lower = staircase_mysql(self, true);
        format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT {}, 1",
            self.src_key_list,
            self.src_ref,
            lower,
            self.src_key_list,
            n.saturating_sub(1)
        )
    }
}

/// Build the disjunctive staircase predicate over the key columns.
///
/// For key (k1..kn) and a lower bound this is
/// `(k1 > ?) OR (k1 = ? AND k2 > ?) OR ... OR (k1 = ? AND .. AND kn >= ?)`,
/// implementing inclusive-lower composite-key comparison without a single
/// concatenated tuple compare; the upper bound uses `<` throughout for
/// exclusive-upper semantics. Parameter order per disjunct is the equality
/// prefix followed by the comparison value (see [`range_params`]).
fn staircase(
    dialect: &dyn Dialect,
    meta_cols: &[(&ColumnInfo, &str)],
    lower: bool,
    next_param: &mut usize,
) -> String {
    let n = meta_cols.len();
    let mut disjuncts = Vec::with_capacity(n);
    for i in 0..n {
        let mut terms = Vec::with_capacity(i + 1);
        for &(col, dest_type) in &meta_cols[..i] {
            *next_param += 1;
            terms.push(format!(
                "{} = {}",
                dialect.quote_ident(&col.name),
                dialect.value_placeholder(*next_param, col, dest_type)
            ));
        }
        let (col, dest_type) = meta_cols[i];
        let op = if lower {
            if i == n - 1 {
                ">="
            } else {
                ">"
            }
        } else {
            "<"
        };
        *next_param += 1;
        terms.push(format!(
            "{} {} {}",
            dialect.quote_ident(&col.name),
            op,
            dialect.value_placeholder(*next_param, col, dest_type)
        ));
        disjuncts.push(format!("({})", terms.join(" AND ")));
    }
    format!("({})", disjuncts.join(" OR "))
}

/// Source-side staircase (MySQL `?` placeholders, no casts).
fn staircase_mysql(meta: &TableMeta, lower: bool) -> String {
    let dialect = MysqlDialect;
    let cols: Vec<(&ColumnInfo, &str)> = meta
        .pk_cols
        .iter()
        .map(|&i| (&meta.columns[i], meta.columns[i].data_type.as_str()))
        .collect();
    let mut next = 0;
    staircase(&dialect, &cols, lower, &mut next)
}

/// Bind order for one staircase bound: for each disjunct `i`, the equality
/// prefix `key[0..i]` followed by the compared value `key[i]`.
pub fn range_params(key: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut params = Vec::with_capacity(key.len() * (key.len() + 1) / 2);
    for i in 0..key.len() {
        for k in &key[..i] {
            params.push(k.clone());
        }
        params.push(key[i].clone());
    }
    params
}

/// Per-parameter column kinds for one staircase bound, mirroring the
/// [`range_params`] bind order. Needed to type-prepare destination
/// statements (binary key columns bind as bytes, everything else as text).
pub fn range_param_kinds(key_kinds: &[crate::core::ColumnKind]) -> Vec<crate::core::ColumnKind> {
    let mut kinds = Vec::with_capacity(key_kinds.len() * (key_kinds.len() + 1) / 2);
    for i in 0..key_kinds.len() {
        for &k in &key_kinds[..i] {
            kinds.push(k);
        }
        kinds.push(key_kinds[i]);
    }
    kinds
}

/// Aggregated schema validation outcome across all requested tables.
#[derive(Debug, Default)]
pub struct SchemaReport {
    /// Fatal per-table messages (same-dialect runs).
    pub errors: Vec<String>,

    /// Downgraded messages (heterogeneous runs).
    pub warnings: Vec<String>,
}

impl SchemaReport {
    fn push(&mut self, heterogeneous: bool, message: String) {
        if heterogeneous {
            self.warnings.push(message);
        } else {
            self.errors.push(message);
        }
    }
}

/// Compile all requested tables, aggregating validation problems so every
/// table's issues are reported in one pass.
pub fn compile_tables(
    specs: &[TableSpec],
    src_facts: &[TableFacts],
    dest_facts: &[TableFacts],
    dest_dialect: DialectKind,
    allow_synthetic_pk: bool,
) -> Result<Vec<Arc<TableMeta>>> {
    let heterogeneous = dest_dialect.name() != "mysql";
    let mut report = SchemaReport::default();
    let mut metas = Vec::with_capacity(specs.len());

    for (table_id, ((spec, src), dest)) in specs
        .iter()
        .zip(src_facts.iter())
        .zip(dest_facts.iter())
        .enumerate()
    {
        validate_table(src, heterogeneous, &mut report);
        cross_validate(src, dest, heterogeneous, &mut report);

        match elect_key(src, allow_synthetic_pk, &dest_dialect) {
            Ok((pk_cols, synthetic)) => {
                metas.push(Arc::new(compile_one(
                    table_id,
                    spec,
                    src,
                    dest,
                    pk_cols,
                    synthetic,
                    dest_dialect,
                )));
            }
            Err(message) => {
                // No usable key is always fatal: the pipeline cannot chunk
                // or match rows without one.
                report.errors.push(message);
            }
        }
    }

    for w in &report.warnings {
        warn!("schema: {}", w);
    }
    if !report.errors.is_empty() {
        return Err(SyncError::Schema(std::mem::take(&mut report.errors)));
    }
    Ok(metas)
}

/// Storage-level usability checks on the source table.
fn validate_table(src: &TableFacts, heterogeneous: bool, report: &mut SchemaReport) {
    let name = src.full_name();
    if !src.table_kind.is_empty() && src.table_kind != "BASE TABLE" {
        report.push(
            heterogeneous,
            format!("{}: not a base table ({})", name, src.table_kind),
        );
    }
    if !src.engine.is_empty() && !src.engine.eq_ignore_ascii_case("InnoDB") {
        report.push(
            heterogeneous,
            format!(
                "{}: engine {} does not guarantee consistent snapshot reads",
                name, src.engine
            ),
        );
    }
    if src.has_triggers {
        report.push(heterogeneous, format!("{}: table has triggers", name));
    }
}

/// Structural comparison of the source and destination column sets.
fn cross_validate(
    src: &TableFacts,
    dest: &TableFacts,
    heterogeneous: bool,
    report: &mut SchemaReport,
) {
    let name = src.full_name();
    if src.columns.len() != dest.columns.len() {
        report.push(
            heterogeneous,
            format!(
                "{}: column count mismatch (source {}, destination {})",
                name,
                src.columns.len(),
                dest.columns.len()
            ),
        );
        return;
    }
    for (s, d) in src.columns.iter().zip(dest.columns.iter()) {
        if !s.name.eq_ignore_ascii_case(&d.name) {
            report.push(
                heterogeneous,
                format!(
                    "{}: column order mismatch (source '{}' vs destination '{}')",
                    name, s.name, d.name
                ),
            );
            continue;
        }
        if s.nullable != d.nullable {
            report.push(
                heterogeneous,
                format!("{}.{}: nullability differs", name, s.name),
            );
        }
        if s.kind != d.kind {
            report.push(
                heterogeneous,
                format!(
                    "{}.{}: column kind differs ({:?} vs {:?})",
                    name, s.name, s.kind, d.kind
                ),
            );
        } else if !heterogeneous && s.data_type != d.data_type {
            report.push(
                heterogeneous,
                format!(
                    "{}.{}: type differs ({} vs {})",
                    name, s.name, s.data_type, d.data_type
                ),
            );
        }
        // A destination without fractional seconds truncates on write, so
        // every fractional source value would re-diff on the next run.
        if s.is_datetime() && d.is_datetime() && s.fractional_seconds && !d.fractional_seconds {
            report.push(
                heterogeneous,
                format!(
                    "{}.{}: destination drops fractional seconds",
                    name, s.name
                ),
            );
        }
    }
}

/// Choose the key: the declared primary key, or the best synthetic one.
///
/// A synthetic key is the best secondary index containing no nullable
/// column: declared-unique indexes first, then enum-free ones (unless the
/// destination dialect compares enums reliably), then by cardinality.
fn elect_key(
    src: &TableFacts,
    allow_synthetic_pk: bool,
    dest_dialect: &DialectKind,
) -> std::result::Result<(Vec<usize>, bool), String> {
    let name = src.full_name();
    let col_pos = |col: &str| src.columns.iter().position(|c| c.name == col);

    if !src.primary_key.is_empty() {
        let mut pk_cols = Vec::with_capacity(src.primary_key.len());
        for col in &src.primary_key {
            match col_pos(col) {
                Some(i) => pk_cols.push(i),
                None => return Err(format!("{}: primary key column '{}' missing", name, col)),
            }
        }
        return Ok((pk_cols, false));
    }

    if !allow_synthetic_pk {
        return Err(format!(
            "{}: no primary key (synthetic keys are disabled)",
            name
        ));
    }

    let mut best: Option<(&crate::core::IndexInfo, Vec<usize>, bool)> = None;
    for index in &src.indexes {
        let cols: Option<Vec<usize>> = index.columns.iter().map(|c| col_pos(c)).collect();
        let Some(cols) = cols else { continue };
        if cols.iter().any(|&i| src.columns[i].nullable) {
            continue;
        }
        let has_enum = cols.iter().any(|&i| src.columns[i].is_enum);
        if has_enum && !dest_dialect.supports_enum_compare() {
            continue;
        }
        let better = match &best {
            None => true,
            // Unique indexes win, then enum-free ones; cardinality breaks
            // ties.
            Some((b, _, b_enum)) => {
                if index.unique != b.unique {
                    index.unique
                } else if *b_enum != has_enum {
                    *b_enum
                } else {
                    index.cardinality > b.cardinality
                }
            }
        };
        if better {
            best = Some((index, cols, has_enum));
        }
    }

    match best {
        Some((index, cols, _)) => {
            debug!(
                "{}: promoting index {} (cardinality {}) to synthetic key",
                name, index.name, index.cardinality
            );
            Ok((cols, true))
        }
        None => Err(format!(
            "{}: no primary key and no null-free index to promote",
            name
        )),
    }
}

/// Compile one validated table.
fn compile_one(
    table_id: usize,
    spec: &TableSpec,
    src: &TableFacts,
    dest: &TableFacts,
    pk_cols: Vec<usize>,
    synthetic_key: bool,
    dest_dialect: DialectKind,
) -> TableMeta {
    let src_dialect = MysqlDialect;
    let dest_schema = spec.effective_dest_schema().to_string();

    let src_ref = qualify(&src_dialect, &src.schema, &src.table);
    let dest_ref = qualify(&dest_dialect, &dest_schema, &src.table);

    let dest_quoted_cols: Vec<String> = src
        .columns
        .iter()
        .map(|c| dest_dialect.quote_ident(&c.name))
        .collect();
    let dest_col_list = dest_quoted_cols.join(", ");
    let src_key_list = pk_cols
        .iter()
        .map(|&i| src_dialect.quote_ident(&src.columns[i].name))
        .collect::<Vec<_>>()
        .join(", ");

    let dest_types: Vec<String> = dest.columns.iter().map(|c| c.data_type.clone()).collect();

    let src_key: Vec<(&ColumnInfo, &str)> = pk_cols
        .iter()
        .map(|&i| (&src.columns[i], src.columns[i].data_type.as_str()))
        .collect();
    let dest_key: Vec<(&ColumnInfo, &str)> = pk_cols
        .iter()
        .map(|&i| (&src.columns[i], dest_types[i].as_str()))
        .collect();

    let src_queries = chunk_queries(&src_dialect, &src.columns, &src_ref, &src_key);
    let dest_queries = chunk_queries(&dest_dialect, &src.columns, &dest_ref, &dest_key);

    let browse_first_sql = format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT 1",
        src_key_list, src_ref, src_key_list
    );

    let insert_prefix = format!("INSERT INTO {} ({}) VALUES ", dest_ref, dest_col_list);
    let update_prefix = format!("UPDATE {} SET ", dest_ref);
    let delete_prefix = format!("DELETE FROM {} WHERE ", dest_ref);

    TableMeta {
        table_id,
        source_schema: src.schema.clone(),
        dest_schema,
        table: src.table.clone(),
        columns: src.columns.clone(),
        dest_types,
        pk_cols,
        synthetic_key,
        row_count: src.row_count,
        src_ref,
        dest_ref,
        src_key_list,
        src_queries,
        dest_queries,
        browse_first_sql,
        insert_prefix,
        update_prefix,
        delete_prefix,
        dest_quoted_cols,
    }
}

/// The chunk-fetch query variants for one side.
fn chunk_queries(
    dialect: &dyn Dialect,
    columns: &[ColumnInfo],
    table_ref: &str,
    key: &[(&ColumnInfo, &str)],
) -> ChunkQueries {
    let col_list = columns
        .iter()
        .map(|c| dialect.select_expr(c))
        .collect::<Vec<_>>()
        .join(", ");
    let select = format!("SELECT {} FROM {}", col_list, table_ref);

    let mut next = 0;
    let lower = staircase(dialect, key, true, &mut next);
    let upper = staircase(dialect, key, false, &mut next);
    let interval = format!("{} WHERE {} AND {}", select, lower, upper);

    let mut next = 0;
    let lower_only = format!(
        "{} WHERE {}",
        select,
        staircase(dialect, key, true, &mut next)
    );
    let mut next = 0;
    let upper_only = format!(
        "{} WHERE {}",
        select,
        staircase(dialect, key, false, &mut next)
    );

    ChunkQueries {
        interval,
        lower_only,
        upper_only,
        full: select,
    }
}

/// Minimal compiled table (int key `id`, nullable varchar `v`) for unit
/// tests in other modules.
#[cfg(test)]
pub fn test_meta() -> Arc<TableMeta> {
    test_meta_for(crate::config::DialectName::Mysql)
}

#[cfg(test)]
pub fn test_meta_for(dialect: crate::config::DialectName) -> Arc<TableMeta> {
    let columns = vec![
        ColumnInfo::new("id".into(), "int".into(), false, 0),
        ColumnInfo::new("v".into(), "varchar".into(), true, 0),
    ];
    let facts = TableFacts {
        schema: "shop".into(),
        table: "orders".into(),
        columns,
        primary_key: vec!["id".into()],
        indexes: vec![],
        row_count: 1000,
        avg_row_bytes: 64,
        engine: "InnoDB".into(),
        table_kind: "BASE TABLE".into(),
        has_triggers: false,
    };
    let spec = TableSpec {
        schema: "shop".into(),
        table: "orders".into(),
        dest_schema: None,
    };
    compile_tables(
        &[spec],
        std::slice::from_ref(&facts),
        std::slice::from_ref(&facts),
        DialectKind::from_name(dialect),
        false,
    )
    .expect("test table compiles")
    .remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DialectName;
    use crate::core::IndexInfo;

    fn col(name: &str, data_type: &str, nullable: bool) -> ColumnInfo {
        ColumnInfo::new(name.into(), data_type.into(), nullable, 0)
    }

    fn facts(columns: Vec<ColumnInfo>, primary_key: Vec<&str>) -> TableFacts {
        TableFacts {
            schema: "shop".into(),
            table: "orders".into(),
            columns,
            primary_key: primary_key.into_iter().map(String::from).collect(),
            indexes: vec![],
            row_count: 1000,
            avg_row_bytes: 64,
            engine: "InnoDB".into(),
            table_kind: "BASE TABLE".into(),
            has_triggers: false,
        }
    }

    fn spec() -> TableSpec {
        TableSpec {
            schema: "shop".into(),
            table: "orders".into(),
            dest_schema: None,
        }
    }

    fn compile_single(
        src: &TableFacts,
        dest: &TableFacts,
        dialect: DialectName,
        synthetic: bool,
    ) -> Result<Vec<Arc<TableMeta>>> {
        compile_tables(
            &[spec()],
            std::slice::from_ref(src),
            std::slice::from_ref(dest),
            DialectKind::from_name(dialect),
            synthetic,
        )
    }

    #[test]
    fn test_staircase_single_column() {
        let src = facts(
            vec![col("id", "int", false), col("v", "varchar", true)],
            vec!["id"],
        );
        let meta =
            &compile_single(&src, &src, DialectName::Mysql, false).unwrap()[0];
        assert_eq!(
            meta.src_queries.interval,
            "SELECT `id`, `v` FROM `shop`.`orders` WHERE ((`id` >= ?)) AND ((`id` < ?))"
        );
        assert_eq!(
            meta.src_queries.lower_only,
            "SELECT `id`, `v` FROM `shop`.`orders` WHERE ((`id` >= ?))"
        );
    }

    #[test]
    fn test_staircase_composite_key() {
        let src = facts(
            vec![
                col("a", "int", false),
                col("b", "int", false),
                col("c", "int", false),
            ],
            vec!["a", "b", "c"],
        );
        let meta =
            &compile_single(&src, &src, DialectName::Mysql, false).unwrap()[0];
        let lower = "((`a` > ?) OR (`a` = ? AND `b` > ?) OR (`a` = ? AND `b` = ? AND `c` >= ?))";
        let upper = "((`a` < ?) OR (`a` = ? AND `b` < ?) OR (`a` = ? AND `b` = ? AND `c` < ?))";
        assert_eq!(
            meta.src_queries.interval,
            format!(
                "SELECT `a`, `b`, `c` FROM `shop`.`orders` WHERE {} AND {}",
                lower, upper
            )
        );
    }

    #[test]
    fn test_postgres_placeholders_numbered_and_cast() {
        let src = facts(
            vec![col("id", "int", false), col("v", "varchar", true)],
            vec!["id"],
        );
        let mut dest = src.clone();
        dest.columns = vec![col("id", "integer", false), col("v", "character varying", true)];
        let meta =
            &compile_single(&src, &dest, DialectName::Postgres, false).unwrap()[0];
        assert_eq!(
            meta.dest_queries.interval,
            "SELECT cast(\"id\" as text), cast(\"v\" as text) FROM \"shop\".\"orders\" \
             WHERE ((\"id\" >= cast($1 as integer))) AND ((\"id\" < cast($2 as integer)))"
        );
    }

    #[test]
    fn test_range_params_order() {
        let key = vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()];
        let params = range_params(&key);
        let as_str: Vec<&str> = params
            .iter()
            .map(|p| std::str::from_utf8(p).unwrap())
            .collect();
        assert_eq!(as_str, vec!["1", "1", "2", "1", "2", "3"]);
    }

    #[test]
    fn test_browse_advance_sql_inlines_chunk_size() {
        let src = facts(vec![col("id", "int", false)], vec!["id"]);
        let meta =
            &compile_single(&src, &src, DialectName::Mysql, false).unwrap()[0];
        let sql = meta.browse_advance_sql(1000);
        assert!(sql.ends_with("LIMIT 999, 1"));
        assert!(sql.contains("WHERE ((`id` >= ?))"));
        assert!(sql.contains("ORDER BY `id`"));
    }

    #[test]
    fn test_synthetic_key_prefers_cardinality_and_null_free() {
        let mut src = facts(
            vec![
                col("a", "int", false),
                col("b", "int", true),
                col("c", "varchar", false),
            ],
            vec![],
        );
        src.indexes = vec![
            IndexInfo {
                name: "idx_b".into(),
                columns: vec!["b".into()],
                cardinality: 900,
                unique: false,
            },
            IndexInfo {
                name: "idx_a".into(),
                columns: vec!["a".into()],
                cardinality: 500,
                unique: false,
            },
            IndexInfo {
                name: "idx_c".into(),
                columns: vec!["c".into()],
                cardinality: 100,
                unique: false,
            },
        ];
        let meta = &compile_single(&src, &src, DialectName::Mysql, true).unwrap()[0];
        // idx_b is out (nullable column); idx_a beats idx_c on cardinality.
        assert_eq!(meta.pk_cols, vec![0]);
        assert!(meta.synthetic_key);
    }

    #[test]
    fn test_synthetic_key_prefers_unique_index() {
        let mut src = facts(
            vec![col("a", "int", false), col("c", "varchar", false)],
            vec![],
        );
        src.indexes = vec![
            IndexInfo {
                name: "idx_c".into(),
                columns: vec!["c".into()],
                cardinality: 900,
                unique: false,
            },
            IndexInfo {
                name: "uq_a".into(),
                columns: vec!["a".into()],
                cardinality: 100,
                unique: true,
            },
        ];
        let meta = &compile_single(&src, &src, DialectName::Mysql, true).unwrap()[0];
        // The unique index wins despite its lower cardinality.
        assert_eq!(meta.pk_cols, vec![0]);
        assert!(meta.synthetic_key);
    }

    #[test]
    fn test_fractional_seconds_loss_fatal_same_dialect() {
        let src = facts(
            vec![
                col("id", "int", false),
                ColumnInfo::new("ts".into(), "datetime".into(), true, 6),
            ],
            vec!["id"],
        );
        let mut dest = src.clone();
        dest.columns[1] = ColumnInfo::new("ts".into(), "datetime".into(), true, 0);
        let err = compile_single(&src, &dest, DialectName::Mysql, false).unwrap_err();
        assert!(err.to_string().contains("fractional seconds"));
        // The widening direction is harmless.
        assert!(compile_single(&dest, &src, DialectName::Mysql, false).is_ok());
    }

    #[test]
    fn test_no_key_is_fatal() {
        let src = facts(vec![col("a", "int", true)], vec![]);
        let err = compile_single(&src, &src, DialectName::Mysql, true).unwrap_err();
        assert!(err.to_string().contains("no null-free index"));
    }

    #[test]
    fn test_schema_mismatch_fatal_same_dialect() {
        let src = facts(
            vec![col("id", "int", false), col("v", "varchar", true)],
            vec!["id"],
        );
        let mut dest = src.clone();
        dest.columns[1] = col("v", "varchar", false);
        let err = compile_single(&src, &dest, DialectName::Mysql, false).unwrap_err();
        assert!(err.to_string().contains("nullability differs"));
    }

    #[test]
    fn test_schema_mismatch_warns_heterogeneous() {
        let src = facts(
            vec![col("id", "int", false), col("v", "varchar", true)],
            vec!["id"],
        );
        let mut dest = src.clone();
        dest.columns = vec![col("id", "integer", false), col("v", "text", false)];
        // Nullability differs, but heterogeneous runs proceed with warnings.
        assert!(compile_single(&src, &dest, DialectName::Postgres, false).is_ok());
    }

    #[test]
    fn test_trigger_fatal_same_dialect() {
        let mut src = facts(vec![col("id", "int", false)], vec!["id"]);
        src.has_triggers = true;
        assert!(compile_single(&src, &src, DialectName::Mysql, false).is_err());
        assert!(compile_single(&src, &src, DialectName::Postgres, false).is_ok());
    }
}
