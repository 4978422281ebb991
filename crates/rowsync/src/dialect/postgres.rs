//! PostgreSQL dialect.

use super::escape;
use super::Dialect;
use crate::core::{ColumnInfo, ColumnKind};

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    /// Every non-binary value crosses the wire as `text` (statements are
    /// prepared with explicit `text`/`bytea` parameter types), so typed
    /// columns get a cast wrapped around the placeholder. Casting a text
    /// column to its own type is a no-op.
    fn value_placeholder(&self, index: usize, col: &ColumnInfo, dest_type: &str) -> String {
        match col.kind {
            ColumnKind::Binary => self.placeholder(index),
            _ => format!("cast({} as {})", self.placeholder(index), dest_type),
        }
    }

    /// Non-binary columns are fetched as text so rows compare byte-for-byte
    /// with the source's wire form; binary columns stay raw bytes.
    fn select_expr(&self, col: &ColumnInfo) -> String {
        match col.kind {
            ColumnKind::Binary => self.quote_ident(&col.name),
            _ => format!("cast({} as text)", self.quote_ident(&col.name)),
        }
    }

    fn supports_enum_compare(&self) -> bool {
        false
    }

    fn rejects_nul_in_text(&self) -> bool {
        true
    }

    fn literal(&self, bytes: &[u8], col: &ColumnInfo) -> String {
        if !col.needs_quote {
            return String::from_utf8_lossy(bytes).into_owned();
        }
        if col.is_binary() || !escape::is_renderable_text(bytes) || bytes.contains(&0) {
            return escape::pg_binary_literal(bytes);
        }
        escape::pg_literal(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(data_type: &str) -> ColumnInfo {
        ColumnInfo::new("c".into(), data_type.into(), true, 0)
    }

    #[test]
    fn test_quote_ident() {
        let d = PostgresDialect;
        assert_eq!(d.quote_ident("name"), "\"name\"");
        assert_eq!(d.quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_value_placeholder_casts_all_but_binary() {
        let d = PostgresDialect;
        assert_eq!(d.value_placeholder(2, &col("bytea"), "bytea"), "$2");
        assert_eq!(
            d.value_placeholder(1, &col("varchar"), "character varying"),
            "cast($1 as character varying)"
        );
        assert_eq!(
            d.value_placeholder(3, &col("int"), "integer"),
            "cast($3 as integer)"
        );
        assert_eq!(
            d.value_placeholder(1, &col("datetime"), "timestamp without time zone"),
            "cast($1 as timestamp without time zone)"
        );
    }

    #[test]
    fn test_select_expr_casts_all_but_binary() {
        let d = PostgresDialect;
        assert_eq!(d.select_expr(&col("bytea")), "\"c\"");
        assert_eq!(d.select_expr(&col("text")), "cast(\"c\" as text)");
        assert_eq!(d.select_expr(&col("integer")), "cast(\"c\" as text)");
    }

    #[test]
    fn test_literal_by_kind() {
        let d = PostgresDialect;
        assert_eq!(d.literal(b"42", &col("integer")), "42");
        assert_eq!(d.literal(b"it's", &col("text")), "'it''s'");
        assert_eq!(d.literal(&[0x01, 0x02], &col("bytea")), "'\\x0102'");
    }
}
