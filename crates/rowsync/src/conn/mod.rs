//! Database connections and session setup.
//!
//! The pipeline owns plain connections rather than pooled ones: snapshot
//! coordination must control exactly which sessions exist and when each one
//! opens its transaction, so sessions are opened individually and handed to
//! their worker by value.

use std::time::Duration;

use bytes::BytesMut;
use mysql_async::prelude::*;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::NoTls;
use tracing::{debug, error};

use crate::config::{DestConfig, DialectName, SourceConfig};
use crate::core::{Field, KeyTuple, RowRecord, StatementParam};
use crate::error::{Result, SyncError};

/// Open one MySQL session against the source and normalize it.
///
/// Every source session runs with a fixed character set, UTC session time
/// zone and REPEATABLE READ isolation, so values read by different workers
/// compare byte-for-byte and consistent-snapshot transactions are possible.
pub async fn connect_source(cfg: &SourceConfig) -> Result<mysql_async::Conn> {
    let opts = mysql_async::OptsBuilder::default()
        .ip_or_hostname(cfg.host.clone())
        .tcp_port(cfg.port)
        .user(Some(cfg.user.clone()))
        .pass(Some(cfg.password.clone()));
    let mut conn = mysql_async::Conn::new(opts).await?;

    conn.query_drop("SET NAMES utf8mb4").await?;
    conn.query_drop("SET time_zone = '+00:00'").await?;
    conn.query_drop("SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .await?;
    // Long-lived snapshot transactions must survive idle stretches while
    // other workers drain their chunks.
    conn.query_drop("SET SESSION wait_timeout = 86400").await?;
    conn.query_drop("SET SESSION net_write_timeout = 3600").await?;

    debug!("source session {} established", conn.id());
    Ok(conn)
}

/// An open destination, one of the directly executable dialects.
///
/// SQL Server destinations never get a handle; they are script-only and go
/// through the SQL output file instead.
pub enum DestHandle {
    MySql(mysql_async::Conn),
    Postgres(PgDest),
}

/// A tokio-postgres client plus its spawned connection driver.
pub struct PgDest {
    pub client: tokio_postgres::Client,
    driver: tokio::task::JoinHandle<()>,
}

impl Drop for PgDest {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Open one session against the destination.
pub async fn connect_dest(cfg: &DestConfig) -> Result<DestHandle> {
    match cfg.dialect {
        DialectName::Mysql => {
            let opts = mysql_async::OptsBuilder::default()
                .ip_or_hostname(cfg.host.clone())
                .tcp_port(cfg.effective_port())
                .user(Some(cfg.user.clone()))
                .pass(Some(cfg.password.clone()));
            let mut conn = mysql_async::Conn::new(opts).await?;
            conn.query_drop("SET NAMES utf8mb4").await?;
            conn.query_drop("SET time_zone = '+00:00'").await?;
            Ok(DestHandle::MySql(conn))
        }
        DialectName::Postgres => {
            let (client, connection) =
                tokio_postgres::connect(&cfg.pg_connection_string(), NoTls).await?;
            let driver = tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("postgres connection error: {}", e);
                }
            });
            Ok(DestHandle::Postgres(PgDest { client, driver }))
        }
        DialectName::Mssql => Err(SyncError::Config(
            "mssql destinations are script-only and cannot be connected".to_string(),
        )),
    }
}

impl DestHandle {
    /// Keep an idle session alive.
    pub async fn ping(&mut self) -> Result<()> {
        match self {
            DestHandle::MySql(conn) => conn.ping().await?,
            DestHandle::Postgres(pg) => {
                pg.client.simple_query("SELECT 1").await?;
            }
        }
        Ok(())
    }
}

/// A statement parameter bound to a PostgreSQL statement.
///
/// Statements are prepared with explicit `text`/`bytea` parameter types and
/// typed columns get a `cast(...)` in the SQL text, so every value crosses
/// the wire in its textual (or raw binary) form regardless of the column
/// type. `accepts` is unconditional for that reason.
#[derive(Debug)]
pub enum PgParam<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

impl ToSql for PgParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgParam::Text(s) => <&str as ToSql>::to_sql(s, ty, out),
            PgParam::Bytes(b) => <&[u8] as ToSql>::to_sql(b, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Borrow statement parameters as PostgreSQL bind values.
pub fn pg_params(params: &[StatementParam]) -> Vec<PgParam<'_>> {
    params
        .iter()
        .map(|p| match p {
            StatementParam::Text(s) => PgParam::Text(s),
            StatementParam::Bytes(b) => PgParam::Bytes(b),
        })
        .collect()
}

/// The prepared-statement parameter types for a statement: `bytea` for
/// binary values, `text` for everything else.
pub fn pg_param_types(params: &[StatementParam]) -> Vec<Type> {
    params
        .iter()
        .map(|p| match p {
            StatementParam::Text(_) => Type::TEXT,
            StatementParam::Bytes(_) => Type::BYTEA,
        })
        .collect()
}

/// Convert statement parameters to MySQL bind values.
pub fn mysql_params(params: &[StatementParam]) -> Vec<mysql_async::Value> {
    params
        .iter()
        .map(|p| match p {
            StatementParam::Text(s) => mysql_async::Value::Bytes(s.as_bytes().to_vec()),
            StatementParam::Bytes(b) => mysql_async::Value::Bytes(b.clone()),
        })
        .collect()
}

/// Convert a MySQL protocol value into the textual field form rows travel
/// in. The binary protocol returns typed values, so numeric and temporal
/// values are rendered back to the text the server would have sent over the
/// text protocol.
pub fn mysql_field(value: mysql_async::Value) -> Field {
    use mysql_async::Value;
    match value {
        Value::NULL => None,
        Value::Bytes(b) => Some(b),
        Value::Int(i) => Some(i.to_string().into_bytes()),
        Value::UInt(u) => Some(u.to_string().into_bytes()),
        Value::Float(f) => Some(f.to_string().into_bytes()),
        Value::Double(d) => Some(d.to_string().into_bytes()),
        Value::Date(y, mo, d, h, mi, s, us) => {
            let mut text = format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s);
            if us > 0 {
                text.push_str(&format!(".{:06}", us));
            }
            Some(text.into_bytes())
        }
        Value::Time(neg, days, h, m, s, us) => {
            let hours = days * 24 + u32::from(h);
            let mut text = format!(
                "{}{:02}:{:02}:{:02}",
                if neg { "-" } else { "" },
                hours,
                m,
                s
            );
            if us > 0 {
                text.push_str(&format!(".{:06}", us));
            }
            Some(text.into_bytes())
        }
    }
}

/// Convert a full MySQL result row.
pub fn mysql_row(row: mysql_async::Row) -> RowRecord {
    RowRecord::new(row.unwrap().into_iter().map(mysql_field).collect())
}

/// Convert a key-column result row. Key columns are null-free by
/// construction, so an absent value never occurs here.
pub fn mysql_key(row: mysql_async::Row) -> KeyTuple {
    row.unwrap()
        .into_iter()
        .map(|v| mysql_field(v).unwrap_or_default())
        .collect()
}

/// Run a future with a deadline, mapping expiry to a timeout error.
pub async fn with_timeout<T, F>(secs: u64, what: &'static str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{} timed out after {}s", what, secs),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_conversion() {
        let params = vec![
            StatementParam::Text("abc".to_string()),
            StatementParam::Bytes(vec![0x00, 0xff]),
        ];

        let my = mysql_params(&params);
        assert_eq!(my[0], mysql_async::Value::Bytes(b"abc".to_vec()));
        assert_eq!(my[1], mysql_async::Value::Bytes(vec![0x00, 0xff]));

        let types = pg_param_types(&params);
        assert_eq!(types, vec![Type::TEXT, Type::BYTEA]);
    }

    #[test]
    fn test_mysql_field_renders_text_form() {
        use mysql_async::Value;
        assert_eq!(mysql_field(Value::NULL), None);
        assert_eq!(mysql_field(Value::Int(-7)), Some(b"-7".to_vec()));
        assert_eq!(
            mysql_field(Value::Bytes(vec![0xde, 0xad])),
            Some(vec![0xde, 0xad])
        );
        assert_eq!(
            mysql_field(Value::Date(2024, 3, 9, 12, 30, 5, 0)),
            Some(b"2024-03-09 12:30:05".to_vec())
        );
        assert_eq!(
            mysql_field(Value::Date(2024, 3, 9, 12, 30, 5, 1500)),
            Some(b"2024-03-09 12:30:05.001500".to_vec())
        );
        assert_eq!(
            mysql_field(Value::Time(true, 1, 2, 3, 4, 0)),
            Some(b"-26:03:04".to_vec())
        );
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout(0, "sleep", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_mssql_has_no_direct_connection() {
        let cfg = DestConfig {
            dialect: DialectName::Mssql,
            host: "h".into(),
            port: 0,
            database: String::new(),
            user: "u".into(),
            password: String::new(),
        };
        let result = futures::executor::block_on(connect_dest(&cfg));
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
