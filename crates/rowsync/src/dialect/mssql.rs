//! Microsoft SQL Server dialect.
//!
//! Serves SQL-text generation and literal escaping for the script output
//! mode; there is no direct execution path for this dialect.

use super::escape;
use super::Dialect;
use crate::core::ColumnInfo;

/// SQL Server dialect implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn supports_enum_compare(&self) -> bool {
        false
    }

    fn rejects_nul_in_text(&self) -> bool {
        false
    }

    fn literal(&self, bytes: &[u8], col: &ColumnInfo) -> String {
        if !col.needs_quote {
            return String::from_utf8_lossy(bytes).into_owned();
        }
        if col.is_binary() || !escape::is_renderable_text(bytes) {
            return escape::mssql_binary_literal(bytes);
        }
        escape::mssql_literal(bytes)
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
        let d = MssqlDialect;
        assert_eq!(d.quote_ident("name"), "[name]");
        assert_eq!(d.quote_ident("we]ird"), "[we]]ird]");
    }

    #[test]
    fn test_literal_by_kind() {
        let d = MssqlDialect;
        assert_eq!(d.literal(b"42", &col("int")), "42");
        assert_eq!(d.literal(b"a\nb", &col("varchar")), "'a' + CHAR(10) + 'b'");
        assert_eq!(d.literal(&[0x0a, 0x0b], &col("varbinary")), "0x0A0B");
    }
}
