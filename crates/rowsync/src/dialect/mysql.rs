//! MySQL/MariaDB dialect.

use super::escape;
use super::Dialect;
use crate::core::ColumnInfo;

/// MySQL/MariaDB dialect implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn supports_enum_compare(&self) -> bool {
        true
    }

    fn rejects_nul_in_text(&self) -> bool {
        false
    }

    fn literal(&self, bytes: &[u8], col: &ColumnInfo) -> String {
        if !col.needs_quote {
            return String::from_utf8_lossy(bytes).into_owned();
        }
        if col.is_binary() || !escape::is_renderable_text(bytes) {
            return escape::mysql_binary_literal(bytes);
        }
        escape::mysql_literal(bytes)
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
        let d = MysqlDialect;
        assert_eq!(d.quote_ident("name"), "`name`");
        assert_eq!(d.quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_literal_by_kind() {
        let d = MysqlDialect;
        assert_eq!(d.literal(b"42", &col("int")), "42");
        assert_eq!(d.literal(b"it's", &col("varchar")), "'it\\'s'");
        assert_eq!(d.literal(&[0xde, 0xad], &col("blob")), "X'DEAD'");
        // Invalid UTF-8 in a text column falls back to hex.
        assert_eq!(d.literal(&[0xff], &col("varchar")), "X'FF'");
    }
}
