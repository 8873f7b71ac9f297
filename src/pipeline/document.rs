//! The per-document conversion step.
//!
//! [`convert_one`] is the pipeline's fault-isolation boundary: it never
//! returns `Err`. Every failure mode — fetch, engine, scratch write,
//! upload — is caught here and folded into a [`ConversionOutcome`] plus an
//! emitted event, so the enclosing minibatch continues regardless of any
//! single document's fate.
//!
//! ## The quality gate
//!
//! Some corpus documents are scans that were never OCRed properly; they
//! carry almost no embedded text, convert badly, and cost as much engine
//! time as good documents. When a minimum length is configured, a cheap
//! pre-check reads the embedded text length and skips the full conversion
//! for anything below the threshold.

use crate::engine::{ConversionEngine, EngineLoader};
use crate::error::DocError;
use crate::events::EventSink;
use crate::manifest::ManifestEntry;
use crate::storage::{ObjectStore, StorageLocation};
use std::path::Path;
use std::sync::Arc;

/// Everything a worker needs to process documents, cloneable across
/// workers. The engine itself is deliberately absent: each worker loads
/// its own through `loader`.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn ObjectStore>,
    pub loader: Arc<dyn EngineLoader>,
    pub source: StorageLocation,
    pub dest: StorageLocation,
    pub min_length: Option<usize>,
    pub write_metadata: bool,
    pub sink: EventSink,
}

/// Why a document was skipped without producing an artifact. Benign;
/// logged as informational, not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Embedded text below the configured quality threshold; the full
    /// conversion never ran.
    BelowMinLength { length: usize, min_length: usize },
    /// Conversion produced only whitespace; nothing worth uploading.
    EmptyResult,
}

/// The fate of one document.
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    /// Converted and uploaded; `artifact` is the destination-relative path.
    Success { artifact: String },
    Skipped(SkipReason),
    Failed(DocError),
}

impl ConversionOutcome {
    /// Coarse outcome class, used for tallies and idempotence checks.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionOutcome::Success { .. } => "success",
            ConversionOutcome::Skipped(_) => "skipped",
            ConversionOutcome::Failed(_) => "failed",
        }
    }
}

/// Convert one document end to end: fetch, gate, convert, persist, upload.
///
/// Never raises past this boundary. `scratch` is the minibatch's temp
/// directory; local files written here are cleaned up when the enclosing
/// directory guard drops.
pub async fn convert_one(
    entry: &ManifestEntry,
    ctx: &PipelineContext,
    engine: &dyn ConversionEngine,
    scratch: &Path,
) -> ConversionOutcome {
    ctx.sink.info(format!("converting {entry}"));

    let outcome = match convert_inner(entry, ctx, engine, scratch).await {
        Ok(outcome) => outcome,
        Err(e) => ConversionOutcome::Failed(e),
    };

    match &outcome {
        ConversionOutcome::Success { artifact } => {
            ctx.sink.info(format!("uploaded {artifact}"));
        }
        ConversionOutcome::Skipped(SkipReason::BelowMinLength { length, min_length }) => {
            ctx.sink.info(format!(
                "skipping {entry}: embedded text {length} chars, below minimum {min_length}"
            ));
        }
        ConversionOutcome::Skipped(SkipReason::EmptyResult) => {
            ctx.sink
                .info(format!("empty conversion result for {entry}; nothing uploaded"));
        }
        ConversionOutcome::Failed(e) => {
            ctx.sink.error(e.to_string());
        }
    }

    outcome
}

async fn convert_inner(
    entry: &ManifestEntry,
    ctx: &PipelineContext,
    engine: &dyn ConversionEngine,
    scratch: &Path,
) -> Result<ConversionOutcome, DocError> {
    // Fetch the source document into scratch under its own basename.
    let src_url = ctx
        .source
        .join(entry.as_str())
        .map_err(|e| DocError::Fetch {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;
    let local = scratch.join(entry.file_name());
    ctx.store
        .fetch(&src_url, &local)
        .await
        .map_err(|e| DocError::Fetch {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;

    // Quality gate: cheap embedded-text pre-check, full conversion avoided
    // entirely for documents below the threshold.
    if let Some(min_length) = ctx.min_length {
        let length = engine
            .embedded_text_length(&local)
            .map_err(|e| DocError::Engine {
                entry: entry.to_string(),
                detail: e.to_string(),
            })?;
        if length < min_length {
            return Ok(ConversionOutcome::Skipped(SkipReason::BelowMinLength {
                length,
                min_length,
            }));
        }
    }

    let converted = engine.convert(&local).map_err(|e| DocError::Engine {
        entry: entry.to_string(),
        detail: e.to_string(),
    })?;

    if converted.text.trim().is_empty() {
        return Ok(ConversionOutcome::Skipped(SkipReason::EmptyResult));
    }

    // Write the artifact locally, then upload it to the mirrored
    // destination path with the extension swapped.
    let local_name = ManifestEntry::new(entry.file_name());
    let artifact = entry.with_extension("md");
    let out_path = scratch.join(local_name.with_extension("md"));
    tokio::fs::write(&out_path, &converted.text)
        .await
        .map_err(|e| DocError::Scratch {
            entry: entry.to_string(),
            detail: e.to_string(),
        })?;

    let dest_url = ctx.dest.join(&artifact).map_err(|e| DocError::Upload {
        entry: entry.to_string(),
        reason: e.to_string(),
    })?;
    ctx.store
        .upload(&out_path, &dest_url)
        .await
        .map_err(|e| DocError::Upload {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;

    // Optional metadata sidecar, mirrored next to the artifact.
    if ctx.write_metadata {
        let sidecar = entry.with_suffix("_meta.json");
        let meta_path = scratch.join(local_name.with_suffix("_meta.json"));
        let json = serde_json::to_string_pretty(&converted.metadata).map_err(|e| {
            DocError::Scratch {
                entry: entry.to_string(),
                detail: e.to_string(),
            }
        })?;
        tokio::fs::write(&meta_path, json)
            .await
            .map_err(|e| DocError::Scratch {
                entry: entry.to_string(),
                detail: e.to_string(),
            })?;

        let meta_url = ctx.dest.join(&sidecar).map_err(|e| DocError::Upload {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;
        ctx.store
            .upload(&meta_path, &meta_url)
            .await
            .map_err(|e| DocError::Upload {
                entry: entry.to_string(),
                reason: e.to_string(),
            })?;
    }

    Ok(ConversionOutcome::Success { artifact })
}
