//! The minibatch worker: one engine load, many documents.
//!
//! ## Why a blocking core?
//!
//! The conversion engine is CPU-bound and not async-safe, and an instance
//! must survive across every document in the minibatch to amortize its
//! load cost. The whole minibatch therefore runs inside one
//! `spawn_blocking` task that owns the engine for its lifetime; the
//! storage futures inside each document step are driven from that thread
//! with `Handle::block_on`, tokio's documented bridge for exactly this
//! sync-owns-async shape. The engine never crosses a thread boundary.

use crate::error::Corpus2MdError;
use crate::manifest::ManifestEntry;
use crate::pipeline::document::{convert_one, ConversionOutcome, PipelineContext};
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Tally of one minibatch's outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MinibatchReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MinibatchReport {
    pub fn record(&mut self, outcome: &ConversionOutcome) {
        match outcome {
            ConversionOutcome::Success { .. } => self.succeeded += 1,
            ConversionOutcome::Skipped(_) => self.skipped += 1,
            ConversionOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Process one minibatch: load the engine exactly once, then convert every
/// entry strictly in order. Failed entries are not retried; engine-load
/// failure is fatal to this minibatch and reported as `Err`.
pub async fn run_minibatch(
    entries: Vec<ManifestEntry>,
    ctx: PipelineContext,
) -> Result<MinibatchReport, Corpus2MdError> {
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || run_minibatch_blocking(handle, entries, ctx))
        .await
        .map_err(|e| Corpus2MdError::Internal(format!("minibatch task panicked: {e}")))?
}

fn run_minibatch_blocking(
    handle: Handle,
    entries: Vec<ManifestEntry>,
    ctx: PipelineContext,
) -> Result<MinibatchReport, Corpus2MdError> {
    // Scratch for every fetch and artifact in this minibatch; removed when
    // the guard drops, including on early return.
    let scratch = tempfile::tempdir()
        .map_err(|e| Corpus2MdError::Internal(format!("scratch dir: {e}")))?;

    let load_start = Instant::now();
    let engine = ctx.loader.load()?;
    info!(
        "engine loaded in {}ms",
        load_start.elapsed().as_millis()
    );

    info!("minibatch of {} files", entries.len());
    let batch_start = Instant::now();
    let mut report = MinibatchReport::default();

    for entry in &entries {
        let doc_start = Instant::now();
        let outcome = handle.block_on(convert_one(entry, &ctx, engine.as_ref(), scratch.path()));
        debug!(
            "{} -> {} in {}ms",
            entry,
            outcome.kind(),
            doc_start.elapsed().as_millis()
        );
        report.record(&outcome);
    }

    info!(
        "minibatch done in {}ms: {} succeeded, {} skipped, {} failed",
        batch_start.elapsed().as_millis(),
        report.succeeded,
        report.skipped,
        report.failed
    );
    Ok(report)
}
