//! Run orchestration.
//!
//! Builds the whole pipeline for one run: catalog load, schema compile,
//! snapshot election, then six worker pools connected exclusively through
//! bounded channels. Shutdown is structural: each stage finishes when its
//! input channel closes, which happens when the upstream pool's workers
//! drop their senders. Stages are then drained in order and every owned
//! connection is handed back and closed.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::apply::{DmlWriter, ScriptFile, StatementGenerator, WriteTarget};
use crate::chunk::{
    ChunkBrowser, DestChunkReader, SharedReceiver, SourceChunkReader, TableQueue,
};
use crate::config::{DialectName, SyncConfig};
use crate::conn::{connect_dest, connect_source, DestHandle};
use crate::core::{catalog, ChunkOps, ChunkPair, DataChunk, TableFacts};
use crate::dialect::DialectKind;
use crate::diff::diff_chunk;
use crate::error::{Result, SyncError};
use crate::schema;
use crate::snapshot;
use crate::stats::{self, StatsReport};

/// Extra snapshot sessions opened beyond the needed count, since a session
/// racing the lock can land on a different position and be discarded.
const SNAPSHOT_SPARE_SESSIONS: usize = 2;

/// Execute one synchronization run end to end.
pub async fn run(config: SyncConfig) -> Result<StatsReport> {
    config.validate()?;
    let opts = config.sync.clone();
    let dialect = DialectKind::from_name(config.dest.dialect);
    let script_mode = config.script_mode();
    // SQL Server is script-only: without a direct connection the
    // destination reads as empty and the script becomes a full load.
    let dest_reachable = config.dest.dialect != DialectName::Mssql;

    // Catalog load.
    let mut catalog_conn = connect_source(&config.source).await?;
    let mut src_facts = Vec::with_capacity(config.tables.len());
    for spec in &config.tables {
        src_facts.push(catalog::mysql_table_facts(&mut catalog_conn, &spec.schema, &spec.table).await?);
    }
    catalog_conn.disconnect().await?;
    let dest_facts = load_dest_facts(&config, &src_facts).await?;

    // Schema compile.
    let metas = schema::compile_tables(
        &config.tables,
        &src_facts,
        &dest_facts,
        dialect,
        opts.allow_synthetic_pk,
    )?;
    let table_names: Vec<String> = metas.iter().map(|m| m.full_name()).collect();
    info!("compiled {} table(s)", metas.len());

    // Snapshot election: one session per browser and per source reader.
    let needed = opts.browsers + opts.readers;
    let snap = snapshot::establish(&config.source, needed + SNAPSHOT_SPARE_SESSIONS, needed).await?;
    let position = snap.position.to_string();
    let mut sessions = snap.sessions;
    let reader_sessions: Vec<_> = sessions.split_off(opts.browsers);
    let browser_sessions = sessions;

    let (stats_handle, aggregator) = stats::channel();
    let stats_task = tokio::spawn(aggregator.run());

    // Inter-stage channels; capacities scale with the consumer pool so a
    // slow stage back-pressures the whole pipeline.
    let (boundary_tx, boundary_rx) = mpsc::channel(opts.readers * 4);
    let (chunk_tx, chunk_rx) = mpsc::channel(opts.readers * 2);
    let (pair_tx, pair_rx) = mpsc::channel(opts.readers * 2);
    let (ops_tx, ops_rx) = mpsc::channel(opts.writers * 2);

    // Browser pool.
    let table_queue = TableQueue::new(metas.iter().cloned());
    let browsers: Vec<JoinHandle<Result<mysql_async::Conn>>> = browser_sessions
        .into_iter()
        .map(|conn| {
            let browser = ChunkBrowser::new(conn, &opts, boundary_tx.clone(), stats_handle.clone());
            let queue = table_queue.clone();
            tokio::spawn(browser.run(queue))
        })
        .collect();
    drop(boundary_tx);

    // Source reader pool. The statement cache is sized to the number of
    // tables a worker can see interleaved, one per browser plus one.
    let cache_capacity = opts.browsers + 1;
    let boundary_rx = SharedReceiver::new(boundary_rx);
    let src_readers: Vec<JoinHandle<Result<mysql_async::Conn>>> = reader_sessions
        .into_iter()
        .map(|conn| {
            let reader = SourceChunkReader::new(
                conn,
                metas.clone(),
                cache_capacity,
                &opts,
                stats_handle.clone(),
            );
            tokio::spawn(reader.run(boundary_rx.clone(), chunk_tx.clone()))
        })
        .collect();
    drop(chunk_tx);

    // Destination reader pool.
    let chunk_rx = SharedReceiver::new(chunk_rx);
    let mut dest_readers: Vec<JoinHandle<Result<Option<DestHandle>>>> = Vec::new();
    for _ in 0..opts.readers {
        let handle = if dest_reachable {
            let handle = connect_dest(&config.dest).await?;
            let reader = DestChunkReader::new(
                handle,
                metas.clone(),
                cache_capacity,
                &opts,
                stats_handle.clone(),
            );
            let input = chunk_rx.clone();
            let out = pair_tx.clone();
            tokio::spawn(async move { reader.run(input, out).await.map(Some) })
        } else {
            let input = chunk_rx.clone();
            let out = pair_tx.clone();
            tokio::spawn(async move {
                empty_dest_reader(input, out).await?;
                Ok(None)
            })
        };
        dest_readers.push(handle);
    }
    drop(pair_tx);

    // Differ pool: pure CPU, one worker per reader.
    let pair_rx = SharedReceiver::new(pair_rx);
    let differs: Vec<JoinHandle<Result<()>>> = (0..opts.readers)
        .map(|_| {
            let input = pair_rx.clone();
            let out = ops_tx.clone();
            let metas = metas.clone();
            tokio::spawn(async move {
                while let Some(pair) = input.recv().await {
                    let meta = Arc::clone(&metas[pair.boundary.table_id]);
                    let ops = diff_chunk(&meta, pair);
                    if ops.is_empty() {
                        continue;
                    }
                    out.send(ChunkOps {
                        table_id: meta.table_id,
                        ops,
                    })
                    .await
                    .map_err(|_| SyncError::ChannelClosed("chunk edits"))?;
                }
                Ok(())
            })
        })
        .collect();
    drop(ops_tx);

    // Writer pool.
    let script = match &opts.sql_output {
        Some(path) => Some(ScriptFile::create(path).await?),
        None => None,
    };
    let ops_rx = SharedReceiver::new(ops_rx);
    let mut writers: Vec<JoinHandle<Result<WriteTarget>>> = Vec::new();
    for _ in 0..opts.writers {
        let target = match &script {
            Some(script) => WriteTarget::Script(script.clone()),
            None => WriteTarget::Db(connect_dest(&config.dest).await?),
        };
        let writer = DmlWriter::new(
            target,
            StatementGenerator::new(dialect, &opts),
            metas.clone(),
            &opts,
            stats_handle.clone(),
        );
        writers.push(tokio::spawn(writer.run(ops_rx.clone())));
    }
    drop(stats_handle);

    // Drain stages in pipeline order; each pool's completion closes the
    // next stage's input.
    let browser_conns = collect(browsers).await?;
    debug!("browser pool drained");
    let reader_conns = collect(src_readers).await?;
    debug!("source reader pool drained");
    let dest_handles = collect(dest_readers).await?;
    debug!("destination reader pool drained");
    collect(differs).await?;
    let targets = collect(writers).await?;
    debug!("writer pool drained");

    for conn in browser_conns.into_iter().chain(reader_conns) {
        conn.disconnect().await?;
    }
    for handle in dest_handles.into_iter().flatten() {
        close_dest(handle).await?;
    }
    for target in targets {
        if let WriteTarget::Db(handle) = target {
            close_dest(handle).await?;
        }
    }

    // All stats handles are gone; the aggregator finishes.
    let totals = stats_task.await?;
    totals.log_summary(&table_names);
    let report = totals.report(&position, &table_names);
    if let Some(path) = &opts.stats_path {
        tokio::fs::write(path, serde_json::to_vec_pretty(&report)?).await?;
        info!("stats report written to {}", path.display());
    }
    if script_mode {
        info!("SQL script written, destination untouched");
    }
    info!("run complete at source position {}", position);
    Ok(report)
}

/// Await a worker pool, propagating the first failure.
async fn collect<T>(handles: Vec<JoinHandle<Result<T>>>) -> Result<Vec<T>> {
    let results = try_join_all(handles).await?;
    results.into_iter().collect()
}

/// Destination-reader stand-in for script-only dialects: every chunk pairs
/// with an empty destination, so the script re-creates the source range.
async fn empty_dest_reader(
    input: SharedReceiver<DataChunk>,
    out: mpsc::Sender<ChunkPair>,
) -> Result<()> {
    while let Some(chunk) = input.recv().await {
        out.send(ChunkPair {
            boundary: chunk.boundary,
            source_rows: chunk.rows,
            dest_rows: Vec::new(),
        })
        .await
        .map_err(|_| SyncError::ChannelClosed("chunk pairs"))?;
    }
    Ok(())
}

async fn close_dest(handle: DestHandle) -> Result<()> {
    match handle {
        DestHandle::MySql(conn) => conn.disconnect().await?,
        // Dropping the client aborts the connection driver.
        DestHandle::Postgres(_) => {}
    }
    Ok(())
}

/// Load destination catalog facts for cross-validation. Script-only
/// dialects have no connection; the source shape stands in, remapped to
/// the destination schema.
async fn load_dest_facts(config: &SyncConfig, src_facts: &[TableFacts]) -> Result<Vec<TableFacts>> {
    if config.dest.dialect == DialectName::Mssql {
        return Ok(config
            .tables
            .iter()
            .zip(src_facts)
            .map(|(spec, facts)| {
                let mut facts = facts.clone();
                facts.schema = spec.effective_dest_schema().to_string();
                facts
            })
            .collect());
    }

    let mut handle = connect_dest(&config.dest).await?;
    handle.ping().await?;
    let mut dest_facts = Vec::with_capacity(config.tables.len());
    for spec in &config.tables {
        let schema = spec.effective_dest_schema();
        let facts = match &mut handle {
            DestHandle::MySql(conn) => {
                catalog::mysql_table_facts(conn, schema, &spec.table).await?
            }
            DestHandle::Postgres(pg) => {
                catalog::pg_table_facts(&pg.client, schema, &spec.table).await?
            }
        };
        dest_facts.push(facts);
    }
    close_dest(handle).await?;
    Ok(dest_facts)
}
