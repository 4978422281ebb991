//! Statement generation.
//!
//! Renders [`DmlOp`]s into dialect-specific SQL by walking the precompiled
//! per-table skeleton fragments. Two rendering paths exist:
//!
//! - parameterized: values bind as positional parameters (the driver handles
//!   escaping), NULLs inline as `NULL`/`IS NULL` keywords so the parameter
//!   list only carries concrete values;
//! - literal: values render as dialect-safe escaped literals, for the SQL
//!   script output mode.
//!
//! Consecutive inserts batch into multi-row statements up to the configured
//! insert size, clamped so no statement exceeds the dialect's parameter
//! ceiling.

use crate::config::SyncOptions;
use crate::core::{
    ColumnInfo, DmlKind, DmlOp, ExecutableStatement, RowRecord, StatementParam,
};
use crate::dialect::{Dialect, DialectKind};
use crate::schema::TableMeta;

pub struct StatementGenerator {
    dialect: DialectKind,
    insert_size: usize,
}

impl StatementGenerator {
    pub fn new(dialect: DialectKind, opts: &SyncOptions) -> Self {
        Self {
            dialect,
            insert_size: opts.insert_size.max(1),
        }
    }

    /// Most servers cap positional parameters per statement; SQL Server at
    /// 2100, the PostgreSQL wire protocol at an i16 count.
    fn max_params(&self) -> usize {
        match self.dialect {
            DialectKind::Mssql(_) => 2100,
            _ => 65_000,
        }
    }

    /// Rows per multi-row INSERT for a table, respecting both the
    /// configured insert size and the parameter ceiling.
    fn batch_rows(&self, meta: &TableMeta) -> usize {
        let per_row = meta.columns.len().max(1);
        self.insert_size.min((self.max_params() / per_row).max(1))
    }

    /// Render one chunk's ops. Inserts arrive grouped by the merge, so
    /// batching only needs to coalesce consecutive runs.
    pub fn generate(&self, meta: &TableMeta, ops: Vec<DmlOp>) -> Vec<ExecutableStatement> {
        let batch_rows = self.batch_rows(meta);
        let mut statements = Vec::new();
        let mut pending: Vec<RowRecord> = Vec::new();

        for op in ops {
            match op.kind {
                DmlKind::Insert => {
                    if let Some(row) = op.new_row {
                        pending.push(row);
                        if pending.len() >= batch_rows {
                            statements.push(self.insert(meta, std::mem::take(&mut pending)));
                        }
                    }
                }
                DmlKind::Update => {
                    self.flush_inserts(meta, &mut pending, &mut statements);
                    if let (Some(new_row), Some(match_row)) = (op.new_row, op.match_row) {
                        statements.push(self.update(meta, &new_row, &match_row));
                    }
                }
                DmlKind::Delete => {
                    self.flush_inserts(meta, &mut pending, &mut statements);
                    if let Some(match_row) = op.match_row {
                        statements.push(self.delete(meta, &match_row));
                    }
                }
            }
        }
        self.flush_inserts(meta, &mut pending, &mut statements);
        statements
    }

    fn flush_inserts(
        &self,
        meta: &TableMeta,
        pending: &mut Vec<RowRecord>,
        statements: &mut Vec<ExecutableStatement>,
    ) {
        if !pending.is_empty() {
            statements.push(self.insert(meta, std::mem::take(pending)));
        }
    }

    fn insert(&self, meta: &TableMeta, rows: Vec<RowRecord>) -> ExecutableStatement {
        let mut sql = meta.insert_prefix.clone();
        let mut params = Vec::new();
        let mut idx = 0;
        for (r, row) in rows.iter().enumerate() {
            if r > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (i, field) in row.fields.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                match field {
                    None => sql.push_str("NULL"),
                    Some(value) => {
                        idx += 1;
                        sql.push_str(&self.dialect.value_placeholder(
                            idx,
                            &meta.columns[i],
                            &meta.dest_types[i],
                        ));
                        params.push(self.param(value, &meta.columns[i]));
                    }
                }
            }
            sql.push(')');
        }
        ExecutableStatement {
            table_id: meta.table_id,
            kind: DmlKind::Insert,
            sql,
            params,
            rows: rows.len() as u64,
        }
    }

    fn update(
        &self,
        meta: &TableMeta,
        new_row: &RowRecord,
        match_row: &RowRecord,
    ) -> ExecutableStatement {
        let mut sql = meta.update_prefix.clone();
        let mut params = Vec::new();
        let mut idx = 0;
        for (i, field) in new_row.fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&meta.dest_quoted_cols[i]);
            sql.push_str(" = ");
            match field {
                None => sql.push_str("NULL"),
                Some(value) => {
                    idx += 1;
                    sql.push_str(&self.dialect.value_placeholder(
                        idx,
                        &meta.columns[i],
                        &meta.dest_types[i],
                    ));
                    params.push(self.param(value, &meta.columns[i]));
                }
            }
        }
        sql.push_str(" WHERE ");
        self.push_match(meta, match_row, &mut sql, &mut params, &mut idx);
        ExecutableStatement {
            table_id: meta.table_id,
            kind: DmlKind::Update,
            sql,
            params,
            rows: 1,
        }
    }

    fn delete(&self, meta: &TableMeta, match_row: &RowRecord) -> ExecutableStatement {
        let mut sql = meta.delete_prefix.clone();
        let mut params = Vec::new();
        let mut idx = 0;
        self.push_match(meta, match_row, &mut sql, &mut params, &mut idx);
        ExecutableStatement {
            table_id: meta.table_id,
            kind: DmlKind::Delete,
            sql,
            params,
            rows: 1,
        }
    }

    /// WHERE clause matching every column of the previously observed
    /// destination row, so a concurrently changed row is left alone.
    fn push_match(
        &self,
        meta: &TableMeta,
        row: &RowRecord,
        sql: &mut String,
        params: &mut Vec<StatementParam>,
        idx: &mut usize,
    ) {
        for (i, field) in row.fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            sql.push_str(&meta.dest_quoted_cols[i]);
            match field {
                None => sql.push_str(" IS NULL"),
                Some(value) => {
                    *idx += 1;
                    sql.push_str(" = ");
                    sql.push_str(&self.dialect.value_placeholder(
                        *idx,
                        &meta.columns[i],
                        &meta.dest_types[i],
                    ));
                    params.push(self.param(value, &meta.columns[i]));
                }
            }
        }
    }

    /// Bind one value: binary columns as bytes, everything else as text.
    /// NUL bytes are stripped from text for dialects that reject them in
    /// text parameters; values that are not valid UTF-8 fall back to a byte
    /// binding rather than being corrupted.
    fn param(&self, value: &[u8], col: &ColumnInfo) -> StatementParam {
        if col.is_binary() {
            return StatementParam::Bytes(value.to_vec());
        }
        match std::str::from_utf8(value) {
            Ok(s) => {
                if self.dialect.rejects_nul_in_text() && s.contains('\0') {
                    StatementParam::Text(s.replace('\0', ""))
                } else {
                    StatementParam::Text(s.to_string())
                }
            }
            Err(_) => StatementParam::Bytes(value.to_vec()),
        }
    }

    /// Render one op as literal SQL for the script output mode, terminated
    /// with a statement separator.
    pub fn render_script(&self, meta: &TableMeta, op: &DmlOp) -> Option<String> {
        match op.kind {
            DmlKind::Insert => {
                let row = op.new_row.as_ref()?;
                let mut sql = meta.insert_prefix.clone();
                sql.push('(');
                sql.push_str(&self.literal_list(meta, row, ", ", false));
                sql.push_str(");");
                Some(sql)
            }
            DmlKind::Update => {
                let new_row = op.new_row.as_ref()?;
                let match_row = op.match_row.as_ref()?;
                let mut sql = meta.update_prefix.clone();
                sql.push_str(&self.literal_list(meta, new_row, ", ", true));
                sql.push_str(" WHERE ");
                sql.push_str(&self.literal_match(meta, match_row));
                sql.push(';');
                Some(sql)
            }
            DmlKind::Delete => {
                let match_row = op.match_row.as_ref()?;
                let mut sql = meta.delete_prefix.clone();
                sql.push_str(&self.literal_match(meta, match_row));
                sql.push(';');
                Some(sql)
            }
        }
    }

    fn literal_list(&self, meta: &TableMeta, row: &RowRecord, sep: &str, assign: bool) -> String {
        row.fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let value = match field {
                    None => "NULL".to_string(),
                    Some(v) => self.dialect.literal(v, &meta.columns[i]),
                };
                if assign {
                    format!("{} = {}", meta.dest_quoted_cols[i], value)
                } else {
                    value
                }
            })
            .collect::<Vec<_>>()
            .join(sep)
    }

    fn literal_match(&self, meta: &TableMeta, row: &RowRecord) -> String {
        row.fields
            .iter()
            .enumerate()
            .map(|(i, field)| match field {
                None => format!("{} IS NULL", meta.dest_quoted_cols[i]),
                Some(v) => format!(
                    "{} = {}",
                    meta.dest_quoted_cols[i],
                    self.dialect.literal(v, &meta.columns[i])
                ),
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DialectName;
    use crate::schema::test_meta;

    fn generator(dialect: DialectName, insert_size: usize) -> StatementGenerator {
        let opts = SyncOptions {
            insert_size,
            ..SyncOptions::default()
        };
        StatementGenerator::new(DialectKind::from_name(dialect), &opts)
    }

    fn row(id: &str, v: Option<&str>) -> RowRecord {
        RowRecord::new(vec![
            Some(id.as_bytes().to_vec()),
            v.map(|v| v.as_bytes().to_vec()),
        ])
    }

    #[test]
    fn test_insert_batches_consecutive_rows() {
        let meta = test_meta();
        let g = generator(DialectName::Mysql, 2);
        let ops = vec![
            DmlOp::insert(0, row("1", Some("a"))),
            DmlOp::insert(0, row("2", None)),
            DmlOp::insert(0, row("3", Some("c"))),
        ];
        let stmts = g.generate(&meta, ops);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].rows, 2);
        assert_eq!(
            stmts[0].sql,
            "INSERT INTO `shop`.`orders` (`id`, `v`) VALUES (?, ?), (?, NULL)"
        );
        assert_eq!(stmts[0].params.len(), 3);
        assert_eq!(stmts[1].rows, 1);
    }

    #[test]
    fn test_update_and_delete_interrupt_a_batch() {
        let meta = test_meta();
        let g = generator(DialectName::Mysql, 100);
        let ops = vec![
            DmlOp::insert(0, row("1", Some("a"))),
            DmlOp::delete(0, row("2", Some("b"))),
            DmlOp::insert(0, row("3", Some("c"))),
        ];
        let stmts = g.generate(&meta, ops);
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[0].kind, DmlKind::Insert);
        assert_eq!(stmts[1].kind, DmlKind::Delete);
        assert_eq!(stmts[2].kind, DmlKind::Insert);
    }

    #[test]
    fn test_update_matches_full_row_and_inlines_null() {
        let meta = test_meta();
        let g = generator(DialectName::Mysql, 100);
        let stmts = g.generate(
            &meta,
            vec![DmlOp::update(0, row("1", Some("new")), row("1", None))],
        );
        assert_eq!(
            stmts[0].sql,
            "UPDATE `shop`.`orders` SET `id` = ?, `v` = ? WHERE `id` = ? AND `v` IS NULL"
        );
        assert_eq!(stmts[0].params.len(), 3);
    }

    #[test]
    fn test_postgres_placeholders_number_sequentially() {
        let meta = crate::schema::test_meta_for(DialectName::Postgres);
        let g = generator(DialectName::Postgres, 100);
        let stmts = g.generate(&meta, vec![DmlOp::delete(0, row("7", Some("x")))]);
        assert_eq!(
            stmts[0].sql,
            "DELETE FROM \"shop\".\"orders\" WHERE \"id\" = cast($1 as int) AND \"v\" = cast($2 as varchar)"
        );
    }

    #[test]
    fn test_nul_stripping_only_where_rejected() {
        let meta = test_meta();
        let col = &meta.columns[1];

        let pg = generator(DialectName::Postgres, 100);
        assert_eq!(
            pg.param(b"a\0b", col),
            StatementParam::Text("ab".to_string())
        );

        let my = generator(DialectName::Mysql, 100);
        assert_eq!(
            my.param(b"a\0b", col),
            StatementParam::Text("a\0b".to_string())
        );
    }

    #[test]
    fn test_invalid_utf8_text_binds_as_bytes() {
        let meta = test_meta();
        let g = generator(DialectName::Mysql, 100);
        assert_eq!(
            g.param(&[0xff, 0xfe], &meta.columns[1]),
            StatementParam::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_script_rendering_inlines_literals() {
        let meta = test_meta();
        let g = generator(DialectName::Mysql, 100);

        let sql = g
            .render_script(&meta, &DmlOp::insert(0, row("1", Some("it's"))))
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO `shop`.`orders` (`id`, `v`) VALUES (1, 'it\\'s');"
        );

        let sql = g
            .render_script(&meta, &DmlOp::delete(0, row("2", None)))
            .unwrap();
        assert_eq!(
            sql,
            "DELETE FROM `shop`.`orders` WHERE `id` = 2 AND `v` IS NULL;"
        );
    }

    #[test]
    fn test_parameter_ceiling_clamps_batch() {
        let meta = test_meta();
        let g = generator(DialectName::Mssql, 5000);
        // Two columns per row, 2100-parameter ceiling: 1050 rows.
        assert_eq!(g.batch_rows(&meta), 1050);
    }
}
