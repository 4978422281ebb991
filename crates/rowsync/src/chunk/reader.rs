//! Chunk readers: materialize the rows inside a boundary.
//!
//! Two structurally identical workers exist because they target different
//! connections and dialects: the source reader runs against an elected
//! snapshot session, the destination reader against a destination handle
//! with possibly different query text and placeholder numbering. Each keeps
//! a bounded LRU of prepared statements per table.

use std::sync::Arc;

use mysql_async::prelude::*;
use tokio::sync::mpsc;
use tokio_postgres::types::{ToSql, Type};
use tracing::debug;

use super::{boundary_params, SharedReceiver, StatementCache};
use crate::config::SyncOptions;
use crate::conn::{mysql_row, with_timeout, DestHandle, PgParam};
use crate::core::{ChunkBoundary, ChunkPair, ColumnKind, DataChunk, RowRecord};
use crate::error::{Result, SyncError};
use crate::schema::{range_param_kinds, ChunkQueries, TableMeta};
use crate::stats::{Action, Phase, StatsHandle};

/// The prepared statements for one table's chunk queries.
#[derive(Clone)]
struct MysqlStmts {
    interval: mysql_async::Statement,
    lower_only: mysql_async::Statement,
    upper_only: mysql_async::Statement,
    full: mysql_async::Statement,
}

impl MysqlStmts {
    async fn prepare(conn: &mut mysql_async::Conn, queries: &ChunkQueries) -> Result<Self> {
        Ok(Self {
            interval: conn.prep(&queries.interval).await?,
            lower_only: conn.prep(&queries.lower_only).await?,
            upper_only: conn.prep(&queries.upper_only).await?,
            full: conn.prep(&queries.full).await?,
        })
    }

    fn select(&self, boundary: &ChunkBoundary) -> &mysql_async::Statement {
        match (&boundary.begin, &boundary.end) {
            (Some(_), Some(_)) => &self.interval,
            (Some(_), None) => &self.lower_only,
            (None, Some(_)) => &self.upper_only,
            (None, None) => &self.full,
        }
    }

    async fn close(self, conn: &mut mysql_async::Conn) -> Result<()> {
        conn.close(self.interval).await?;
        conn.close(self.lower_only).await?;
        conn.close(self.upper_only).await?;
        conn.close(self.full).await?;
        Ok(())
    }
}

/// Fetch one boundary's rows over a MySQL session.
async fn mysql_fetch(
    conn: &mut mysql_async::Conn,
    stmts: &MysqlStmts,
    boundary: &ChunkBoundary,
    timeout_secs: u64,
) -> Result<Vec<RowRecord>> {
    let stmt = stmts.select(boundary);
    let params: Vec<mysql_async::Value> = boundary_params(boundary)
        .into_iter()
        .map(mysql_async::Value::Bytes)
        .collect();
    let rows: Vec<mysql_async::Row> = with_timeout(timeout_secs, "chunk fetch", async {
        Ok(conn.exec(stmt, params).await?)
    })
    .await?;
    Ok(rows.into_iter().map(mysql_row).collect())
}

/// Source-side chunk reader. Owns an elected snapshot session.
pub struct SourceChunkReader {
    conn: mysql_async::Conn,
    cache: StatementCache<MysqlStmts>,
    tables: Vec<Arc<TableMeta>>,
    fetch_timeout_secs: u64,
    stats: StatsHandle,
}

impl SourceChunkReader {
    pub fn new(
        conn: mysql_async::Conn,
        tables: Vec<Arc<TableMeta>>,
        cache_capacity: usize,
        opts: &SyncOptions,
        stats: StatsHandle,
    ) -> Self {
        Self {
            conn,
            cache: StatementCache::new(cache_capacity),
            tables,
            fetch_timeout_secs: opts.fetch_timeout_secs,
            stats,
        }
    }

    /// Consume boundaries until the browser pool closes the channel.
    pub async fn run(
        mut self,
        input: SharedReceiver<ChunkBoundary>,
        out: mpsc::Sender<DataChunk>,
    ) -> Result<mysql_async::Conn> {
        while let Some(boundary) = input.recv().await {
            let meta = Arc::clone(&self.tables[boundary.table_id]);
            let rows = self
                .fetch(&meta, &boundary)
                .await
                .map_err(|e| SyncError::table(meta.full_name(), e.to_string()))?;
            self.stats
                .record(meta.table_id, Phase::SrcRead, Action::Read, rows.len() as u64);
            out.send(DataChunk { boundary, rows })
                .await
                .map_err(|_| SyncError::ChannelClosed("source chunks"))?;
        }
        for stmts in self.cache.drain() {
            stmts.close(&mut self.conn).await?;
        }
        Ok(self.conn)
    }

    async fn fetch(&mut self, meta: &TableMeta, boundary: &ChunkBoundary) -> Result<Vec<RowRecord>> {
        let stmts = match self.cache.get(meta.table_id) {
            Some(s) => s.clone(),
            None => {
                let stmts = MysqlStmts::prepare(&mut self.conn, &meta.src_queries).await?;
                if let Some(evicted) = self.cache.insert(meta.table_id, stmts.clone()) {
                    debug!("closing evicted source statements");
                    evicted.close(&mut self.conn).await?;
                }
                stmts
            }
        };
        mysql_fetch(&mut self.conn, &stmts, boundary, self.fetch_timeout_secs).await
    }
}

/// Per-table destination statements, one arm per executable dialect.
#[derive(Clone)]
enum DestStmts {
    MySql(MysqlStmts),
    Pg {
        interval: tokio_postgres::Statement,
        lower_only: tokio_postgres::Statement,
        upper_only: tokio_postgres::Statement,
        full: tokio_postgres::Statement,
    },
}

/// Destination-side chunk reader. Pairs each source chunk with the rows the
/// destination holds in the same key range.
pub struct DestChunkReader {
    handle: DestHandle,
    cache: StatementCache<DestStmts>,
    tables: Vec<Arc<TableMeta>>,
    fetch_timeout_secs: u64,
    stats: StatsHandle,
}

impl DestChunkReader {
    pub fn new(
        handle: DestHandle,
        tables: Vec<Arc<TableMeta>>,
        cache_capacity: usize,
        opts: &SyncOptions,
        stats: StatsHandle,
    ) -> Self {
        Self {
            handle,
            cache: StatementCache::new(cache_capacity),
            tables,
            fetch_timeout_secs: opts.fetch_timeout_secs,
            stats,
        }
    }

    pub async fn run(
        mut self,
        input: SharedReceiver<DataChunk>,
        out: mpsc::Sender<ChunkPair>,
    ) -> Result<DestHandle> {
        while let Some(chunk) = input.recv().await {
            let meta = Arc::clone(&self.tables[chunk.boundary.table_id]);
            let dest_rows = self
                .fetch(&meta, &chunk.boundary)
                .await
                .map_err(|e| SyncError::table(meta.full_name(), e.to_string()))?;
            self.stats.record(
                meta.table_id,
                Phase::DstRead,
                Action::Read,
                dest_rows.len() as u64,
            );
            out.send(ChunkPair {
                boundary: chunk.boundary,
                source_rows: chunk.rows,
                dest_rows,
            })
            .await
            .map_err(|_| SyncError::ChannelClosed("chunk pairs"))?;
        }
        if let DestHandle::MySql(conn) = &mut self.handle {
            for stmts in self.cache.drain() {
                if let DestStmts::MySql(s) = stmts {
                    s.close(conn).await?;
                }
            }
        }
        Ok(self.handle)
    }

    async fn fetch(&mut self, meta: &TableMeta, boundary: &ChunkBoundary) -> Result<Vec<RowRecord>> {
        let stmts = match self.cache.get(meta.table_id) {
            Some(s) => s.clone(),
            None => {
                let stmts = self.prepare(meta).await?;
                let evicted = self.cache.insert(meta.table_id, stmts.clone());
                if let (Some(DestStmts::MySql(old)), DestHandle::MySql(conn)) =
                    (evicted, &mut self.handle)
                {
                    debug!("closing evicted destination statements");
                    old.close(conn).await?;
                }
                stmts
            }
        };
        match (&mut self.handle, &stmts) {
            (DestHandle::MySql(conn), DestStmts::MySql(s)) => {
                mysql_fetch(conn, s, boundary, self.fetch_timeout_secs).await
            }
            (DestHandle::Postgres(pg), DestStmts::Pg { .. }) => {
                pg_fetch(
                    &pg.client,
                    &stmts,
                    meta,
                    boundary,
                    self.fetch_timeout_secs,
                )
                .await
            }
            // Statements are prepared on the same handle they run on.
            _ => Err(SyncError::table(
                meta.full_name(),
                "destination statement prepared for a different dialect",
            )),
        }
    }

    async fn prepare(&mut self, meta: &TableMeta) -> Result<DestStmts> {
        match &mut self.handle {
            DestHandle::MySql(conn) => Ok(DestStmts::MySql(
                MysqlStmts::prepare(conn, &meta.dest_queries).await?,
            )),
            DestHandle::Postgres(pg) => {
                let one: Vec<Type> = range_param_kinds(&meta.key_kinds())
                    .into_iter()
                    .map(kind_type)
                    .collect();
                let both: Vec<Type> = one.iter().chain(one.iter()).cloned().collect();
                Ok(DestStmts::Pg {
                    interval: pg
                        .client
                        .prepare_typed(&meta.dest_queries.interval, &both)
                        .await?,
                    lower_only: pg
                        .client
                        .prepare_typed(&meta.dest_queries.lower_only, &one)
                        .await?,
                    upper_only: pg
                        .client
                        .prepare_typed(&meta.dest_queries.upper_only, &one)
                        .await?,
                    full: pg.client.prepare(&meta.dest_queries.full).await?,
                })
            }
        }
    }
}

fn kind_type(kind: ColumnKind) -> Type {
    if kind == ColumnKind::Binary {
        Type::BYTEA
    } else {
        Type::TEXT
    }
}

async fn pg_fetch(
    client: &tokio_postgres::Client,
    stmts: &DestStmts,
    meta: &TableMeta,
    boundary: &ChunkBoundary,
    timeout_secs: u64,
) -> Result<Vec<RowRecord>> {
    let DestStmts::Pg {
        interval,
        lower_only,
        upper_only,
        full,
    } = stmts
    else {
        return Err(SyncError::table(
            meta.full_name(),
            "destination statement prepared for a different dialect",
        ));
    };
    let stmt = match (&boundary.begin, &boundary.end) {
        (Some(_), Some(_)) => interval,
        (Some(_), None) => lower_only,
        (None, Some(_)) => upper_only,
        (None, None) => full,
    };

    // Key parameter kinds repeat per present bound, mirroring the bind order.
    let one = range_param_kinds(&meta.key_kinds());
    let mut kinds: Vec<ColumnKind> = Vec::new();
    if boundary.begin.is_some() {
        kinds.extend(one.iter().copied());
    }
    if boundary.end.is_some() {
        kinds.extend(one.iter().copied());
    }

    let raw = boundary_params(boundary);
    let params: Vec<PgParam<'_>> = raw
        .iter()
        .zip(kinds)
        .map(|(p, kind)| match (kind, std::str::from_utf8(p)) {
            (ColumnKind::Binary, _) | (_, Err(_)) => PgParam::Bytes(p),
            (_, Ok(s)) => PgParam::Text(s),
        })
        .collect();
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as _).collect();

    let rows = with_timeout(timeout_secs, "chunk fetch", async {
        Ok(client.query(stmt, &refs).await?)
    })
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut fields = Vec::with_capacity(meta.columns.len());
        for (i, col) in meta.columns.iter().enumerate() {
            let field = if col.is_binary() {
                row.try_get::<_, Option<Vec<u8>>>(i)?
            } else {
                row.try_get::<_, Option<String>>(i)?.map(String::into_bytes)
            };
            fields.push(field);
        }
        records.push(RowRecord::new(fields));
    }
    Ok(records)
}
