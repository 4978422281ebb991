//! Consistent-snapshot coordination across source sessions.
//!
//! Every worker that reads the source must see the table set frozen at one
//! logical instant. The coordinator brings a set of candidate sessions to a
//! single agreed transactional read point: a lock session briefly blocks
//! writes while every candidate opens a consistent-snapshot transaction and
//! records its own binary-log position; candidates whose position matches
//! the agreed one are elected, the rest are closed. The global lock is held
//! only for that registration window, never for the data transfer.

use std::collections::HashMap;

use futures::future::try_join_all;
use mysql_async::prelude::*;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::conn::connect_source;
use crate::error::{Result, SyncError};

/// A binary-log coordinate: the read point sessions must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinlogPosition {
    pub file: String,
    pub position: u64,
}

impl std::fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.position)
    }
}

/// The outcome of snapshot coordination: elected sessions, all positioned
/// at `position` inside an open consistent-snapshot transaction.
pub struct Snapshot {
    pub position: BinlogPosition,
    pub sessions: Vec<mysql_async::Conn>,
}

/// Bring `needed` sessions to one consistent read point.
///
/// Opens `candidates` sessions (a few more than needed, since a session
/// racing the lock can land on a different position) plus one lock session.
/// Any session that fails to configure or ping is fatal; there is no
/// partial retry.
pub async fn establish(cfg: &SourceConfig, candidates: usize, needed: usize) -> Result<Snapshot> {
    debug_assert!(candidates >= needed);

    // Phase 1: all candidates configure their connection and signal
    // readiness by connecting successfully.
    let mut sessions =
        try_join_all((0..candidates).map(|_| connect_source(cfg))).await?;
    try_join_all(sessions.iter_mut().map(|c| c.ping())).await?;
    let mut lock_session = connect_source(cfg).await?;

    // Phase 2: block writes globally and capture the position the barrier
    // is meant to hold at.
    lock_session
        .query_drop("FLUSH TABLES WITH READ LOCK")
        .await?;
    let lock_pos = match master_position(&mut lock_session).await {
        Ok(pos) => pos,
        Err(e) => {
            // Never leave the server locked behind a failed run.
            let _ = lock_session.query_drop("UNLOCK TABLES").await;
            return Err(e);
        }
    };
    info!("source locked at {}", lock_pos);

    // Phase 3: every candidate opens its snapshot under the barrier and
    // records the position it actually sees.
    let started = try_join_all(sessions.drain(..).map(|mut conn| async move {
        conn.query_drop("START TRANSACTION WITH CONSISTENT SNAPSHOT")
            .await?;
        let pos = master_position(&mut conn).await?;
        Ok::<_, SyncError>((conn, pos))
    }))
    .await;

    // Phase 4: release the barrier before acting on the outcome.
    lock_session.query_drop("UNLOCK TABLES").await?;
    lock_session.disconnect().await?;
    let started = started?;

    // Phase 5: tally and elect.
    let positions: Vec<BinlogPosition> = started.iter().map(|(_, p)| p.clone()).collect();
    let elected_idx = elect(&positions, &lock_pos, needed)?;

    let mut elected = Vec::with_capacity(needed);
    let mut discarded = Vec::new();
    for (i, (conn, _)) in started.into_iter().enumerate() {
        if elected_idx.contains(&i) {
            elected.push(conn);
        } else {
            discarded.push(conn);
        }
    }
    if !discarded.is_empty() {
        warn!(
            "discarding {} session(s) off the agreed position",
            discarded.len()
        );
        try_join_all(discarded.into_iter().map(|c| c.disconnect())).await?;
    }

    info!(
        "snapshot established at {} with {} session(s)",
        lock_pos,
        elected.len()
    );
    Ok(Snapshot {
        position: lock_pos,
        sessions: elected,
    })
}

/// Election over the tallied per-session positions.
///
/// The agreed position is the one reported by at least `needed` sessions.
/// It must equal the lock session's observed position; a difference means
/// the write barrier failed to hold and the run aborts.
fn elect(
    positions: &[BinlogPosition],
    lock_pos: &BinlogPosition,
    needed: usize,
) -> Result<Vec<usize>> {
    let mut tally: HashMap<&BinlogPosition, usize> = HashMap::new();
    for pos in positions {
        *tally.entry(pos).or_default() += 1;
    }
    for (pos, count) in &tally {
        debug!("position {} reported by {} session(s)", pos, count);
    }

    let agreed = tally
        .iter()
        .filter(|(_, &count)| count >= needed)
        .map(|(&pos, _)| pos)
        .max_by_key(|pos| tally[pos])
        .ok_or_else(|| {
            SyncError::Snapshot(format!(
                "no position reached {} agreeing sessions (saw {:?})",
                needed,
                tally
                    .iter()
                    .map(|(p, c)| format!("{}x{}", p, c))
                    .collect::<Vec<_>>()
            ))
        })?;

    if agreed != lock_pos {
        return Err(SyncError::Snapshot(format!(
            "agreed position {} differs from lock position {}; snapshot barrier failed to hold",
            agreed, lock_pos
        )));
    }

    Ok(positions
        .iter()
        .enumerate()
        .filter(|(_, p)| *p == agreed)
        .map(|(i, _)| i)
        .take(needed)
        .collect())
}

/// Read the session's effective binary-log position.
async fn master_position(conn: &mut mysql_async::Conn) -> Result<BinlogPosition> {
    let row: Option<mysql_async::Row> = conn.query_first("SHOW MASTER STATUS").await?;
    let mut row = row.ok_or_else(|| {
        SyncError::Snapshot("SHOW MASTER STATUS returned nothing; binary logging must be enabled".to_string())
    })?;
    let file: Option<String> = row.take(0);
    let position: Option<u64> = row.take(1);
    match (file, position) {
        (Some(file), Some(position)) => Ok(BinlogPosition { file, position }),
        _ => Err(SyncError::Snapshot(
            "malformed SHOW MASTER STATUS row".to_string(),
        )),
    }
}
