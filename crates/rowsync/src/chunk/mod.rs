//! Chunking: key-space browsing and range reads.
//!
//! The browser walks each table's key space and emits [`ChunkBoundary`]s;
//! the readers materialize the rows inside a boundary from the source and,
//! independently, from the destination. Worker pools share their input
//! through [`TableQueue`] / [`SharedReceiver`] rather than through any
//! mutable state of their own.

mod browser;
mod cache;
mod reader;

pub use browser::ChunkBrowser;
pub use cache::StatementCache;
pub use reader::{DestChunkReader, SourceChunkReader};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::core::ChunkBoundary;
use crate::schema::{range_params, TableMeta};

/// Work queue of tables for the browser pool. Each table is owned by
/// exactly one worker; workers pull until the queue is empty.
#[derive(Clone)]
pub struct TableQueue {
    inner: Arc<Mutex<VecDeque<Arc<TableMeta>>>>,
}

impl TableQueue {
    pub fn new(tables: impl IntoIterator<Item = Arc<TableMeta>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tables.into_iter().collect())),
        }
    }

    /// Claim the next table, or `None` when all are taken.
    pub fn next(&self) -> Option<Arc<TableMeta>> {
        self.inner
            .lock()
            .expect("table queue lock poisoned")
            .pop_front()
    }
}

/// A multi-consumer wrapper over a bounded mpsc receiver.
///
/// Workers in a pool race on `recv`; closing the sender side drains the
/// queue and then releases every worker with `None`, which is the
/// pipeline's only shutdown signal.
pub struct SharedReceiver<T> {
    inner: Arc<tokio::sync::Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }
}

/// The bind values for a boundary's range predicate: the lower bound's
/// staircase parameters followed by the upper bound's.
pub fn boundary_params(boundary: &ChunkBoundary) -> Vec<Vec<u8>> {
    let mut params = Vec::new();
    if let Some(begin) = &boundary.begin {
        params.extend(range_params(begin));
    }
    if let Some(end) = &boundary.end {
        params.extend(range_params(end));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_boundary_params_lower_then_upper() {
        let boundary = ChunkBoundary {
            table_id: 0,
            chunk_id: 1,
            begin: Some(key(&["1", "2"])),
            end: Some(key(&["5", "6"])),
        };
        let params: Vec<String> = boundary_params(&boundary)
            .into_iter()
            .map(|p| String::from_utf8(p).unwrap())
            .collect();
        // Staircase order per bound: k1, then k1,k2.
        assert_eq!(params, vec!["1", "1", "2", "5", "5", "6"]);
    }

    #[test]
    fn test_boundary_params_absent_bounds() {
        let boundary = ChunkBoundary {
            table_id: 0,
            chunk_id: 1,
            begin: None,
            end: Some(key(&["9"])),
        };
        assert_eq!(boundary_params(&boundary), vec![b"9".to_vec()]);

        let boundary = ChunkBoundary {
            table_id: 0,
            chunk_id: 2,
            begin: None,
            end: None,
        };
        assert!(boundary_params(&boundary).is_empty());
    }

    #[tokio::test]
    async fn test_shared_receiver_drains_then_closes() {
        let (tx, rx) = mpsc::channel(4);
        let shared = SharedReceiver::new(rx);
        tx.send(1u32).await.unwrap();
        tx.send(2u32).await.unwrap();
        drop(tx);

        let a = shared.clone();
        assert_eq!(a.recv().await, Some(1));
        assert_eq!(shared.recv().await, Some(2));
        assert_eq!(shared.recv().await, None);
    }

    #[test]
    fn test_table_queue_hands_out_each_table_once() {
        let meta = crate::schema::test_meta();
        let queue = TableQueue::new(vec![meta.clone(), meta]);
        assert!(queue.next().is_some());
        assert!(queue.next().is_some());
        assert!(queue.next().is_none());
    }
}
