//! Run counters.
//!
//! Workers never share counter state; each sends [`CounterEvent`]s through
//! a cloneable [`StatsHandle`] and a single aggregator task folds them into
//! per-table, per-phase totals. The aggregator finishes when every handle
//! has been dropped, which the pipeline uses as its natural end-of-run
//! barrier for accounting.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

/// Pipeline phase a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Browse,
    SrcRead,
    DstRead,
    DstWrite,
}

/// What happened, within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Write,
    /// A suppressed write (a `no_insert`/`no_update`/`no_delete` switch).
    NoOp,
}

/// One counter increment.
#[derive(Debug)]
pub struct CounterEvent {
    pub table_id: usize,
    pub phase: Phase,
    pub action: Action,
    pub count: u64,
}

/// Cloneable sender side of the stats queue.
#[derive(Clone)]
pub struct StatsHandle {
    tx: mpsc::UnboundedSender<CounterEvent>,
}

impl StatsHandle {
    /// Record a counter increment. A closed aggregator is ignored; stats
    /// must never take the pipeline down.
    pub fn record(&self, table_id: usize, phase: Phase, action: Action, count: u64) {
        let _ = self.tx.send(CounterEvent {
            table_id,
            phase,
            action,
            count,
        });
    }
}

/// Single-consumer counter aggregator.
pub struct StatsAggregator {
    rx: mpsc::UnboundedReceiver<CounterEvent>,
    totals: HashMap<(usize, Phase, Action), u64>,
}

/// Create the stats queue.
pub fn channel() -> (StatsHandle, StatsAggregator) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        StatsHandle { tx },
        StatsAggregator {
            rx,
            totals: HashMap::new(),
        },
    )
}

impl StatsAggregator {
    /// Fold events until every handle is dropped, then return the totals.
    pub async fn run(mut self) -> StatsTotals {
        while let Some(event) = self.rx.recv().await {
            *self
                .totals
                .entry((event.table_id, event.phase, event.action))
                .or_default() += event.count;
        }
        StatsTotals {
            totals: self.totals,
        }
    }
}

/// Final counter totals for the run.
#[derive(Debug)]
pub struct StatsTotals {
    totals: HashMap<(usize, Phase, Action), u64>,
}

impl StatsTotals {
    /// Look up one counter.
    pub fn get(&self, table_id: usize, phase: Phase, action: Action) -> u64 {
        self.totals
            .get(&(table_id, phase, action))
            .copied()
            .unwrap_or(0)
    }

    /// Build the serializable per-table report, given the table names in
    /// table-id order.
    pub fn report(&self, position: &str, table_names: &[String]) -> StatsReport {
        let tables = table_names
            .iter()
            .enumerate()
            .map(|(id, name)| TableReport {
                table: name.clone(),
                chunks: self.get(id, Phase::Browse, Action::Read),
                source_rows: self.get(id, Phase::SrcRead, Action::Read),
                dest_rows: self.get(id, Phase::DstRead, Action::Read),
                rows_written: self.get(id, Phase::DstWrite, Action::Write),
                rows_suppressed: self.get(id, Phase::DstWrite, Action::NoOp),
            })
            .collect();
        StatsReport {
            position: position.to_string(),
            tables,
        }
    }

    /// Log a one-line summary per table.
    pub fn log_summary(&self, table_names: &[String]) {
        for (id, name) in table_names.iter().enumerate() {
            info!(
                "{}: {} chunks, {} source rows, {} dest rows, {} written, {} suppressed",
                name,
                self.get(id, Phase::Browse, Action::Read),
                self.get(id, Phase::SrcRead, Action::Read),
                self.get(id, Phase::DstRead, Action::Read),
                self.get(id, Phase::DstWrite, Action::Write),
                self.get(id, Phase::DstWrite, Action::NoOp),
            );
        }
    }
}

/// Per-run counter report, written as JSON when a stats path is configured.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    /// The binary-log position the run synchronized to.
    pub position: String,

    pub tables: Vec<TableReport>,
}

/// Per-table counters.
#[derive(Debug, Serialize)]
pub struct TableReport {
    pub table: String,
    pub chunks: u64,
    pub source_rows: u64,
    pub dest_rows: u64,
    pub rows_written: u64,
    pub rows_suppressed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_aggregates_across_handles() {
        let (handle, aggregator) = channel();
        let h2 = handle.clone();

        handle.record(0, Phase::SrcRead, Action::Read, 10);
        h2.record(0, Phase::SrcRead, Action::Read, 5);
        h2.record(1, Phase::DstWrite, Action::NoOp, 2);
        drop(handle);
        drop(h2);

        let totals = aggregator.run().await;
        assert_eq!(totals.get(0, Phase::SrcRead, Action::Read), 15);
        assert_eq!(totals.get(1, Phase::DstWrite, Action::NoOp), 2);
        assert_eq!(totals.get(1, Phase::Browse, Action::Read), 0);
    }

    #[tokio::test]
    async fn test_report_shape() {
        let (handle, aggregator) = channel();
        handle.record(0, Phase::Browse, Action::Read, 3);
        handle.record(0, Phase::DstWrite, Action::Write, 7);
        drop(handle);

        let totals = aggregator.run().await;
        let report = totals.report("bin.000001:4242", &["shop.orders".to_string()]);
        assert_eq!(report.position, "bin.000001:4242");
        assert_eq!(report.tables.len(), 1);
        assert_eq!(report.tables[0].chunks, 3);
        assert_eq!(report.tables[0].rows_written, 7);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"shop.orders\""));
    }
}
