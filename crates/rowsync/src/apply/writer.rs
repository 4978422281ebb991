//! Statement writer.
//!
//! Applies one chunk's edits at a time: either executed directly against a
//! destination handle, or rendered as literal SQL into the shared script
//! file. Suppression switches turn whole categories of edits into counted
//! no-ops.

use std::path::Path;
use std::sync::Arc;

use mysql_async::prelude::*;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::chunk::SharedReceiver;
use crate::config::SyncOptions;
use crate::conn::{mysql_params, pg_param_types, pg_params, with_timeout, DestHandle};
use crate::core::{ChunkOps, DmlKind, DmlOp, ExecutableStatement};
use crate::error::{Result, SyncError};
use crate::schema::TableMeta;
use crate::stats::{Action, Phase, StatsHandle};

use super::StatementGenerator;

/// Where rendered statements go.
pub enum WriteTarget {
    Db(DestHandle),
    Script(ScriptFile),
}

/// The shared SQL script file. Writers append whole statements under the
/// lock, so concurrent workers never interleave partial lines.
#[derive(Clone)]
pub struct ScriptFile {
    file: Arc<Mutex<tokio::fs::File>>,
}

impl ScriptFile {
    pub async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    async fn append(&self, statement: &str) -> Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(statement.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.file.lock().await.flush().await?;
        Ok(())
    }
}

/// One writer worker.
pub struct DmlWriter {
    target: WriteTarget,
    generator: StatementGenerator,
    tables: Vec<Arc<TableMeta>>,
    no_insert: bool,
    no_update: bool,
    no_delete: bool,
    statement_timeout_secs: u64,
    stats: StatsHandle,
}

impl DmlWriter {
    pub fn new(
        target: WriteTarget,
        generator: StatementGenerator,
        tables: Vec<Arc<TableMeta>>,
        opts: &SyncOptions,
        stats: StatsHandle,
    ) -> Self {
        Self {
            target,
            generator,
            tables,
            no_insert: opts.no_insert,
            no_update: opts.no_update,
            no_delete: opts.no_delete,
            statement_timeout_secs: opts.statement_timeout_secs,
            stats,
        }
    }

    fn suppressed(&self, kind: DmlKind) -> bool {
        match kind {
            DmlKind::Insert => self.no_insert,
            DmlKind::Update => self.no_update,
            DmlKind::Delete => self.no_delete,
        }
    }

    /// Consume chunk edits until the differ pool closes the channel.
    pub async fn run(mut self, input: SharedReceiver<ChunkOps>) -> Result<WriteTarget> {
        while let Some(chunk) = input.recv().await {
            let meta = Arc::clone(&self.tables[chunk.table_id]);
            self.apply(&meta, chunk.ops)
                .await
                .map_err(|e| SyncError::table(meta.full_name(), e.to_string()))?;
        }
        if let WriteTarget::Script(script) = &self.target {
            script.flush().await?;
        }
        Ok(self.target)
    }

    async fn apply(&mut self, meta: &TableMeta, ops: Vec<DmlOp>) -> Result<()> {
        let mut live = Vec::with_capacity(ops.len());
        for op in ops {
            if self.suppressed(op.kind) {
                self.stats
                    .record(meta.table_id, Phase::DstWrite, Action::NoOp, 1);
            } else {
                live.push(op);
            }
        }

        match &mut self.target {
            WriteTarget::Db(handle) => {
                for statement in self.generator.generate(meta, live) {
                    let affected = execute(handle, &statement, self.statement_timeout_secs).await?;
                    if affected == 0 && statement.kind != DmlKind::Insert {
                        // The full-row WHERE matched nothing: the destination
                        // row changed after we read it. Deliberately a no-op.
                        debug!(
                            "{}: {} matched no rows, destination changed concurrently",
                            meta.full_name(),
                            statement.kind.as_str()
                        );
                    }
                    self.stats.record(
                        meta.table_id,
                        Phase::DstWrite,
                        Action::Write,
                        statement.rows,
                    );
                }
            }
            WriteTarget::Script(script) => {
                for op in &live {
                    if let Some(statement) = self.generator.render_script(meta, op) {
                        script.append(&statement).await?;
                        self.stats
                            .record(meta.table_id, Phase::DstWrite, Action::Write, 1);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Execute one parameterized statement, returning the affected-row count.
async fn execute(
    handle: &mut DestHandle,
    statement: &ExecutableStatement,
    timeout_secs: u64,
) -> Result<u64> {
    match handle {
        DestHandle::MySql(conn) => {
            let params = mysql_params(&statement.params);
            with_timeout(timeout_secs, "statement execution", async {
                conn.exec_drop(&statement.sql, params).await?;
                Ok(conn.affected_rows())
            })
            .await
        }
        DestHandle::Postgres(pg) => {
            let types = pg_param_types(&statement.params);
            let params = pg_params(&statement.params);
            let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as _).collect();
            with_timeout(timeout_secs, "statement execution", async {
                let prepared = pg.client.prepare_typed(&statement.sql, &types).await?;
                Ok(pg.client.execute(&prepared, &refs).await?)
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DialectName;
    use crate::core::RowRecord;
    use crate::dialect::DialectKind;
    use crate::schema::test_meta;
    use crate::stats;
    use tokio::sync::mpsc;

    fn row(id: &str) -> RowRecord {
        RowRecord::new(vec![Some(id.as_bytes().to_vec()), None])
    }

    #[tokio::test]
    async fn test_script_target_writes_statements_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sql");
        let script = ScriptFile::create(&path).await.unwrap();

        let meta = test_meta();
        let opts = SyncOptions {
            no_delete: true,
            ..SyncOptions::default()
        };
        let (handle, aggregator) = stats::channel();
        let generator =
            StatementGenerator::new(DialectKind::from_name(DialectName::Mysql), &opts);
        let writer = DmlWriter::new(
            WriteTarget::Script(script),
            generator,
            vec![meta],
            &opts,
            handle,
        );

        let (tx, rx) = mpsc::channel(4);
        tx.send(ChunkOps {
            table_id: 0,
            ops: vec![DmlOp::insert(0, row("1")), DmlOp::delete(0, row("2"))],
        })
        .await
        .unwrap();
        drop(tx);
        writer.run(SharedReceiver::new(rx)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "INSERT INTO `shop`.`orders` (`id`, `v`) VALUES (1, NULL);\n"
        );

        // The suppressed delete is counted, not written.
        let totals = aggregator.run().await;
        assert_eq!(totals.get(0, Phase::DstWrite, Action::Write), 1);
        assert_eq!(totals.get(0, Phase::DstWrite, Action::NoOp), 1);
    }
}
