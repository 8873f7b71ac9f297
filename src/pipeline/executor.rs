//! Range execution: the two strategies behind one entry point.
//!
//! [`RangePipeline::run`] resolves a job range against the manifest,
//! partitions it into minibatches, and drives them with one of two
//! strategies selected by the worker-count hint:
//!
//! * **Sequential** — one minibatch after another on the caller's task,
//!   events logged directly; no queue, no shared state beyond the single
//!   engine each minibatch loads.
//! * **Pooled** — minibatches striped across a fixed set of concurrent
//!   workers (worker *i* takes minibatches *i*, *i+n*, …; disjoint by
//!   construction, per-worker order preserved), all emitting into one
//!   bounded channel drained by a single aggregator.
//!
//! ## Shutdown discipline (pooled)
//!
//! Workers are joined to completion *before* the sentinel is enqueued, and
//! the aggregator is joined *after* it: every event emitted by any worker
//! is logged, and the aggregator never exits early. A worker-boundary
//! error (engine load, scratch setup) is fatal to that worker only; the
//! remaining workers finish and the first error surfaces after the drain.

use crate::cluster::JobRange;
use crate::config::RunOptions;
use crate::engine::EngineLoader;
use crate::error::Corpus2MdError;
use crate::events::{
    drain_events, EventLogger, EventSink, QueueMessage, EVENT_QUEUE_CAPACITY,
};
use crate::manifest::{self, ManifestEntry};
use crate::pipeline::document::PipelineContext;
use crate::pipeline::minibatch::{run_minibatch, MinibatchReport};
use crate::storage::{ObjectStore, StorageLocation};
use crossbeam::channel::bounded;
use std::sync::Arc;
use tracing::{debug, info};

/// How minibatches are driven across the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    Pooled { workers: usize },
}

impl ExecutionStrategy {
    /// One worker means sequential; anything more means a pool.
    pub fn from_workers(workers: usize) -> Self {
        match workers {
            0 | 1 => ExecutionStrategy::Sequential,
            n => ExecutionStrategy::Pooled { workers: n },
        }
    }
}

/// Aggregate tally for a whole range execution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub minibatches: usize,
}

impl RunSummary {
    pub fn absorb(&mut self, report: MinibatchReport) {
        self.succeeded += report.succeeded;
        self.skipped += report.skipped;
        self.failed += report.failed;
        self.minibatches += 1;
    }

    fn merge(&mut self, other: RunSummary) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.minibatches += other.minibatches;
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// One range execution, wired with its collaborators.
pub struct RangePipeline {
    pub store: Arc<dyn ObjectStore>,
    pub loader: Arc<dyn EngineLoader>,
    pub index: StorageLocation,
    pub source: StorageLocation,
    pub dest: StorageLocation,
    pub options: RunOptions,
    pub logger: Arc<dyn EventLogger>,
}

impl RangePipeline {
    /// Execute the assigned range to completion.
    pub async fn run(&self, range: JobRange) -> Result<RunSummary, Corpus2MdError> {
        info!(
            "run(offset={}, length={}, workers={}, min_length={:?})",
            range.offset, range.length, self.options.workers, self.options.min_length
        );

        let entries = manifest::resolve_range(&*self.store, &self.index, range).await?;
        if entries.is_empty() {
            info!("nothing to process in this range");
            return Ok(RunSummary::default());
        }

        let minibatch_size = self.options.minibatch_size.unwrap_or_else(|| {
            manifest::default_minibatch_size(entries.len(), self.options.workers)
        });
        let minibatches = manifest::partition_into_minibatches(&entries, minibatch_size)?;
        let strategy = ExecutionStrategy::from_workers(self.options.workers);
        info!(
            "processing {} files in {} minibatches of up to {} ({:?})",
            entries.len(),
            minibatches.len(),
            minibatch_size,
            strategy
        );

        let summary = match strategy {
            ExecutionStrategy::Sequential => self.run_sequential(minibatches).await?,
            ExecutionStrategy::Pooled { workers } => {
                self.run_pooled(minibatches, workers).await?
            }
        };

        info!(
            "all files processed: {} succeeded, {} skipped, {} failed across {} minibatches",
            summary.succeeded, summary.skipped, summary.failed, summary.minibatches
        );
        Ok(summary)
    }

    fn context(&self, sink: EventSink) -> PipelineContext {
        PipelineContext {
            store: Arc::clone(&self.store),
            loader: Arc::clone(&self.loader),
            source: self.source.clone(),
            dest: self.dest.clone(),
            min_length: self.options.min_length,
            write_metadata: self.options.write_metadata,
            sink,
        }
    }

    async fn run_sequential(
        &self,
        minibatches: Vec<Vec<ManifestEntry>>,
    ) -> Result<RunSummary, Corpus2MdError> {
        let ctx = self.context(EventSink::Direct(Arc::clone(&self.logger)));
        let mut summary = RunSummary::default();
        for entries in minibatches {
            summary.absorb(run_minibatch(entries, ctx.clone()).await?);
        }
        Ok(summary)
    }

    async fn run_pooled(
        &self,
        minibatches: Vec<Vec<ManifestEntry>>,
        workers: usize,
    ) -> Result<RunSummary, Corpus2MdError> {
        let (tx, rx) = bounded(EVENT_QUEUE_CAPACITY);
        let logger = Arc::clone(&self.logger);
        let aggregator = tokio::task::spawn_blocking(move || drain_events(rx, logger));

        let ctx = self.context(EventSink::Queued(tx.clone()));
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let mine: Vec<Vec<ManifestEntry>> = minibatches
                .iter()
                .skip(worker)
                .step_by(workers)
                .cloned()
                .collect();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                let mut summary = RunSummary::default();
                for entries in mine {
                    summary.absorb(run_minibatch(entries, ctx.clone()).await?);
                }
                Ok::<RunSummary, Corpus2MdError>(summary)
            }));
        }
        // Only workers hold sink clones from here on.
        drop(ctx);

        // Drain the pool to completion before the sentinel goes in.
        let mut summary = RunSummary::default();
        let mut first_error: Option<Corpus2MdError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(worker_summary)) => summary.merge(worker_summary),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error
                        .get_or_insert(Corpus2MdError::Internal(format!("worker panicked: {e}")));
                }
            }
        }

        // Sentinel after the pool, aggregator join after the sentinel.
        let _ = tx.send(QueueMessage::Shutdown);
        drop(tx);
        let drained = aggregator
            .await
            .map_err(|e| Corpus2MdError::Internal(format!("aggregator panicked: {e}")))?;
        debug!("aggregator drained {} events", drained);

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_selection_from_worker_hint() {
        assert_eq!(
            ExecutionStrategy::from_workers(0),
            ExecutionStrategy::Sequential
        );
        assert_eq!(
            ExecutionStrategy::from_workers(1),
            ExecutionStrategy::Sequential
        );
        assert_eq!(
            ExecutionStrategy::from_workers(4),
            ExecutionStrategy::Pooled { workers: 4 }
        );
    }

    #[test]
    fn summary_absorbs_and_merges() {
        let mut a = RunSummary::default();
        a.absorb(MinibatchReport {
            succeeded: 3,
            skipped: 1,
            failed: 0,
        });
        a.absorb(MinibatchReport {
            succeeded: 2,
            skipped: 0,
            failed: 1,
        });
        assert_eq!(a.minibatches, 2);
        assert_eq!(a.total(), 7);

        let mut b = RunSummary::default();
        b.merge(a);
        assert_eq!(b.succeeded, 5);
        assert_eq!(b.minibatches, 2);
    }
}
