//! Error types for the corpus2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Corpus2MdError`] — **Fatal**: the run (or one worker) cannot proceed
//!   at all (missing config, unresolvable credentials, unreachable manifest,
//!   engine load failure). Returned as `Err(Corpus2MdError)` from startup
//!   and orchestration functions.
//!
//! * [`DocError`] — **Non-fatal**: a single document failed (fetch error,
//!   engine error, upload error) but the rest of the minibatch is fine.
//!   Carried inside [`crate::pipeline::ConversionOutcome::Failed`] so the
//!   batch keeps moving and a narrow re-run range can be computed from the
//!   log afterwards.
//!
//! The separation is structural on purpose: callers distinguish fatal from
//! recoverable by type, never by inspecting log text.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the corpus2md library.
///
/// Per-document failures use [`DocError`] and are stored in
/// [`crate::pipeline::ConversionOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Corpus2MdError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// Configuration file was not found at the given path.
    #[error("configuration file not found: '{path}'\nPass --config <PATH> or create corpus2md.toml in the working directory.")]
    ConfigNotFound { path: PathBuf },

    /// Configuration file exists but could not be parsed or validated.
    #[error("invalid configuration in '{path}': {detail}")]
    InvalidConfigFile { path: PathBuf, detail: String },

    /// A value-level constraint failed (zero batch size, bad URL, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required cluster environment variable is absent.
    #[error("missing required environment variable {name}\nThis process looks like a cluster task but its environment contract is incomplete.")]
    MissingEnvVar { name: &'static str },

    /// A cluster environment variable is present but unusable.
    #[error("environment variable {name} is invalid: {detail}")]
    InvalidEnvVar { name: &'static str, detail: String },

    // ── Startup collaborator errors ───────────────────────────────────────
    /// The credential provider could not produce the access token.
    #[error("failed to resolve credentials from vault '{vault}': {detail}")]
    CredentialResolve { vault: String, detail: String },

    /// The corpus manifest could not be fetched or read.
    #[error("failed to resolve the corpus manifest: {detail}")]
    ManifestUnavailable { detail: String },

    /// A storage location URL is not usable as a base for joining paths.
    #[error("invalid storage location '{location}': {detail}")]
    InvalidLocation { location: String, detail: String },

    // ── Worker-boundary errors ────────────────────────────────────────────
    /// The conversion engine could not be loaded; fatal to the worker that
    /// tried, before any of its entries were touched.
    #[error("failed to load the conversion engine: {0}\nCheck that the pdfium shared library is installed, or point PDFIUM_LIB_PATH at a copy.")]
    EngineLoad(String),

    // ── Distributor errors ────────────────────────────────────────────────
    /// The cluster scheduler rejected the job submission.
    #[error("job submission failed: {detail}")]
    SubmitFailed { detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, runtime teardown, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A non-fatal error scoped to a single document.
///
/// Produced by the document converter and consumed by the minibatch worker;
/// every variant names the manifest entry so the log alone is enough to
/// re-run a narrow offset/length range covering the failures.
#[derive(Debug, Clone, Error)]
pub enum DocError {
    /// The source document could not be fetched from the object store.
    #[error("fetch failed for '{entry}': {reason}")]
    Fetch { entry: String, reason: String },

    /// The conversion engine rejected the document (pre-check or full run).
    #[error("conversion failed for '{entry}': {detail}")]
    Engine { entry: String, detail: String },

    /// A local scratch write failed.
    #[error("scratch write failed for '{entry}': {detail}")]
    Scratch { entry: String, detail: String },

    /// The converted artifact (or its metadata sidecar) could not be uploaded.
    #[error("upload failed for '{entry}': {reason}")]
    Upload { entry: String, reason: String },
}

impl DocError {
    /// The manifest entry this failure belongs to.
    pub fn entry(&self) -> &str {
        match self {
            DocError::Fetch { entry, .. }
            | DocError::Engine { entry, .. }
            | DocError::Scratch { entry, .. }
            | DocError::Upload { entry, .. } => entry,
        }
    }
}
