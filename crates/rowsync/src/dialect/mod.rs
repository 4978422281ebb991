//! SQL dialect adapters.
//!
//! Each destination engine gets a [`Dialect`] implementation covering
//! identifier quoting, parameter placeholder syntax and literal escaping.
//! Dialects are pure string machinery with no connection state.
//!
//! [`DialectKind`] provides enum-based static dispatch: the compiler
//! generates a match statement instead of a vtable lookup.

mod escape;
mod mssql;
mod mysql;
mod postgres;

pub use escape::is_renderable_text;
pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;

use crate::config::DialectName;
use crate::core::ColumnInfo;

/// SQL syntax strategy for a destination database engine.
pub trait Dialect: Send + Sync {
    /// Dialect identifier ("mysql", "postgres", "mssql").
    fn name(&self) -> &'static str;

    /// Quote an identifier (schema, table or column name).
    fn quote_ident(&self, name: &str) -> String;

    /// Parameter placeholder for the given 1-based index.
    fn placeholder(&self, index: usize) -> String;

    /// Placeholder for a column value, adding a cast where the dialect
    /// needs one to accept text-form parameters for typed columns.
    fn value_placeholder(&self, index: usize, col: &ColumnInfo, dest_type: &str) -> String {
        let _ = (col, dest_type);
        self.placeholder(index)
    }

    /// Select-list expression for a column in a chunk-fetch query, adding a
    /// cast where the dialect must return typed values in textual form.
    fn select_expr(&self, col: &ColumnInfo) -> String {
        self.quote_ident(&col.name)
    }

    /// Whether the dialect can compare enum columns reliably, making an
    /// enum-bearing index acceptable as a synthetic key.
    fn supports_enum_compare(&self) -> bool;

    /// Whether text parameters must not contain NUL bytes.
    fn rejects_nul_in_text(&self) -> bool;

    /// Render a column value as a safe standalone SQL literal.
    fn literal(&self, bytes: &[u8], col: &ColumnInfo) -> String;
}

/// Enum-based static dispatch over the supported dialects.
#[derive(Debug, Clone, Copy)]
pub enum DialectKind {
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
    Mssql(MssqlDialect),
}

impl DialectKind {
    /// Create a dialect from its configuration name.
    pub fn from_name(name: DialectName) -> Self {
        match name {
            DialectName::Mysql => DialectKind::Mysql(MysqlDialect),
            DialectName::Postgres => DialectKind::Postgres(PostgresDialect),
            DialectName::Mssql => DialectKind::Mssql(MssqlDialect),
        }
    }

    fn inner(&self) -> &dyn Dialect {
        match self {
            DialectKind::Mysql(d) => d,
            DialectKind::Postgres(d) => d,
            DialectKind::Mssql(d) => d,
        }
    }
}

impl Dialect for DialectKind {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn quote_ident(&self, name: &str) -> String {
        self.inner().quote_ident(name)
    }

    fn placeholder(&self, index: usize) -> String {
        self.inner().placeholder(index)
    }

    fn value_placeholder(&self, index: usize, col: &ColumnInfo, dest_type: &str) -> String {
        self.inner().value_placeholder(index, col, dest_type)
    }

    fn select_expr(&self, col: &ColumnInfo) -> String {
        self.inner().select_expr(col)
    }

    fn supports_enum_compare(&self) -> bool {
        self.inner().supports_enum_compare()
    }

    fn rejects_nul_in_text(&self) -> bool {
        self.inner().rejects_nul_in_text()
    }

    fn literal(&self, bytes: &[u8], col: &ColumnInfo) -> String {
        self.inner().literal(bytes, col)
    }
}

/// Qualified `schema.table` reference in a dialect.
pub fn qualify(dialect: &dyn Dialect, schema: &str, table: &str) -> String {
    format!(
        "{}.{}",
        dialect.quote_ident(schema),
        dialect.quote_ident(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_dispatch() {
        let d = DialectKind::from_name(DialectName::Mysql);
        assert_eq!(d.name(), "mysql");
        assert_eq!(d.quote_ident("orders"), "`orders`");

        let d = DialectKind::from_name(DialectName::Postgres);
        assert_eq!(d.placeholder(3), "$3");

        let d = DialectKind::from_name(DialectName::Mssql);
        assert_eq!(d.quote_ident("orders"), "[orders]");
    }

    #[test]
    fn test_qualify() {
        let d = DialectKind::from_name(DialectName::Postgres);
        assert_eq!(qualify(&d, "shop", "orders"), "\"shop\".\"orders\"");
    }
}
