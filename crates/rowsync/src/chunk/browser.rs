//! Chunk browser: walks a table's key space into bounded ranges.

use mysql_async::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::TableQueue;
use crate::config::SyncOptions;
use crate::conn::{mysql_key, with_timeout};
use crate::core::{ChunkBoundary, KeyTuple};
use crate::error::{Result, SyncError};
use crate::schema::{range_params, TableMeta};
use crate::stats::{Action, Phase, StatsHandle};

/// One browser worker. Owns an elected snapshot session and handles one
/// table at a time from the shared queue.
pub struct ChunkBrowser {
    conn: mysql_async::Conn,
    chunk_size: u64,
    fetch_timeout_secs: u64,
    out: mpsc::Sender<ChunkBoundary>,
    stats: StatsHandle,
}

/// Boundary bookkeeping for one table walk, kept apart from the session
/// I/O. Guarantees the emitted boundaries tile the key space: the first
/// chunk is unbounded below, consecutive chunks share their bound key,
/// and the last chunk is unbounded above.
struct WalkState {
    table_id: usize,
    chunk_id: u64,
    current: KeyTuple,
    begin: Option<KeyTuple>,
    chunks: u64,
}

enum WalkStep {
    /// An interior boundary; the walk continues from its end key.
    Boundary(ChunkBoundary),
    /// The advance landed on the current key; grow the stride and retry.
    Stalled,
    /// The final unbounded-upper boundary.
    Finished(ChunkBoundary),
}

impl WalkState {
    fn new(table_id: usize, first_key: KeyTuple) -> Self {
        Self {
            table_id,
            chunk_id: ChunkBoundary::base_id(table_id),
            current: first_key,
            begin: None,
            chunks: 0,
        }
    }

    fn advance(&mut self, next: Option<KeyTuple>) -> WalkStep {
        match next {
            Some(key) if key == self.current => WalkStep::Stalled,
            Some(key) => {
                self.chunk_id += 1;
                self.chunks += 1;
                let boundary = ChunkBoundary {
                    table_id: self.table_id,
                    chunk_id: self.chunk_id,
                    begin: self.begin.take(),
                    end: Some(key.clone()),
                };
                self.begin = Some(key.clone());
                self.current = key;
                WalkStep::Boundary(boundary)
            }
            None => {
                self.chunk_id += 1;
                self.chunks += 1;
                WalkStep::Finished(ChunkBoundary {
                    table_id: self.table_id,
                    chunk_id: self.chunk_id,
                    begin: self.begin.take(),
                    end: None,
                })
            }
        }
    }
}

/// Stride growth after a stalled advance. The advance predicate is
/// inclusive, so a stride of one always lands on the current key; growth
/// must add at least one row or the walk re-prepares the same statement
/// forever.
fn grow_stride(n: u64) -> u64 {
    n + (n / 2).max(1)
}

impl ChunkBrowser {
    pub fn new(
        conn: mysql_async::Conn,
        opts: &SyncOptions,
        out: mpsc::Sender<ChunkBoundary>,
        stats: StatsHandle,
    ) -> Self {
        Self {
            conn,
            chunk_size: opts.chunk_size,
            fetch_timeout_secs: opts.fetch_timeout_secs,
            out,
            stats,
        }
    }

    /// Drain the table queue. Returns the session for the pipeline to
    /// close once the whole run is done.
    pub async fn run(mut self, tables: TableQueue) -> Result<mysql_async::Conn> {
        while let Some(meta) = tables.next() {
            self.browse_table(&meta)
                .await
                .map_err(|e| SyncError::table(meta.full_name(), e.to_string()))?;
        }
        Ok(self.conn)
    }

    /// Walk one table from its minimum key to the end, emitting ordered,
    /// non-overlapping boundaries.
    async fn browse_table(&mut self, meta: &TableMeta) -> Result<()> {
        let timeout = self.fetch_timeout_secs;
        debug!(
            "{}: walking ~{} rows by key ({})",
            meta.full_name(),
            meta.row_count,
            meta.key_columns()
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let first: Option<mysql_async::Row> = with_timeout(timeout, "first key fetch", async {
            Ok(self.conn.query_first(&meta.browse_first_sql).await?)
        })
        .await?;
        let Some(row) = first else {
            // Converging to an empty source still has to visit the
            // destination rows, so the table becomes one unbounded chunk.
            debug!("{}: empty source table, single full-range chunk", meta.full_name());
            self.send(
                meta,
                ChunkBoundary {
                    table_id: meta.table_id,
                    chunk_id: ChunkBoundary::base_id(meta.table_id) + 1,
                    begin: None,
                    end: None,
                },
            )
            .await?;
            return Ok(());
        };
        let mut walk = WalkState::new(meta.table_id, mysql_key(row));

        let mut n = self.chunk_size;
        let mut stmt = self.conn.prep(meta.browse_advance_sql(n)).await?;

        loop {
            let params: Vec<mysql_async::Value> = range_params(&walk.current)
                .into_iter()
                .map(mysql_async::Value::Bytes)
                .collect();
            let next: Option<mysql_async::Row> = with_timeout(timeout, "chunk advance", async {
                Ok(self.conn.exec_first(&stmt, params).await?)
            })
            .await?;

            match walk.advance(next.map(mysql_key)) {
                WalkStep::Stalled => {
                    // A synthetic key with heavy duplication can stall the
                    // walk: N rows ahead lands on the same tuple.
                    n = grow_stride(n);
                    trace!("{}: key stalled, growing stride to {}", meta.full_name(), n);
                    self.conn.close(stmt).await?;
                    stmt = self.conn.prep(meta.browse_advance_sql(n)).await?;
                }
                WalkStep::Boundary(boundary) => self.send(meta, boundary).await?,
                WalkStep::Finished(boundary) => {
                    self.send(meta, boundary).await?;
                    break;
                }
            }
        }
        self.conn.close(stmt).await?;
        debug!("{}: browsed into {} chunks", meta.full_name(), walk.chunks);
        Ok(())
    }

    async fn send(&self, meta: &TableMeta, boundary: ChunkBoundary) -> Result<()> {
        self.stats
            .record(meta.table_id, Phase::Browse, Action::Read, 1);
        self.out
            .send(boundary)
            .await
            .map_err(|_| SyncError::ChannelClosed("chunk boundaries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64) -> KeyTuple {
        vec![n.to_string().into_bytes()]
    }

    #[test]
    fn test_walk_boundaries_tile_the_key_space() {
        let mut walk = WalkState::new(3, key(10));
        let mut bounds = Vec::new();
        for k in [20, 30, 40] {
            match walk.advance(Some(key(k))) {
                WalkStep::Boundary(b) => bounds.push(b),
                _ => panic!("expected an interior boundary"),
            }
        }
        match walk.advance(None) {
            WalkStep::Finished(b) => bounds.push(b),
            _ => panic!("expected the final boundary"),
        }

        assert!(bounds[0].begin.is_none());
        assert!(bounds.last().is_some_and(|b| b.end.is_none()));
        assert_eq!(bounds[0].chunk_id, ChunkBoundary::base_id(3) + 1);
        for pair in bounds.windows(2) {
            // No gap, no overlap: each chunk starts where the last ended.
            assert_eq!(pair[0].end, pair[1].begin);
            assert_eq!(pair[0].chunk_id + 1, pair[1].chunk_id);
        }
        assert_eq!(walk.chunks, 4);
    }

    #[test]
    fn test_stalled_walk_resumes_after_stride_growth() {
        let mut walk = WalkState::new(0, key(10));
        assert!(matches!(walk.advance(Some(key(10))), WalkStep::Stalled));
        // The stall emitted nothing; the next distinct key resumes the walk
        // with the bookkeeping unchanged.
        match walk.advance(Some(key(11))) {
            WalkStep::Boundary(b) => {
                assert!(b.begin.is_none());
                assert_eq!(b.end, Some(key(11)));
                assert_eq!(b.chunk_id, 1);
            }
            _ => panic!("expected an interior boundary"),
        }
    }

    #[test]
    fn test_grow_stride_makes_progress_from_one() {
        assert_eq!(grow_stride(1), 2);
        assert_eq!(grow_stride(2), 3);
        assert_eq!(grow_stride(1000), 1500);
    }
}
