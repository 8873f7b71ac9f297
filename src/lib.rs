//! # corpus2md
//!
//! Range-partitioned batch conversion of a remotely-stored PDF corpus to
//! Markdown artifacts, fanned out across a batch-compute cluster.
//!
//! ## Why this crate?
//!
//! Converting millions of documents with an expensive conversion engine is
//! dominated by two costs: loading the engine, and losing work to bad
//! inputs. This crate amortizes the first (one engine load per minibatch,
//! not per document) and contains the second (every per-document failure
//! becomes an outcome and a log line, never an aborted run), while slicing
//! the corpus into disjoint offset/length ranges so any number of cluster
//! tasks can work without coordination.
//!
//! ## Pipeline Overview
//!
//! ```text
//! manifest (one relative path per line, order defines all partitions)
//!  │
//!  ├─ 1. Distribute  plan [offset, length) ranges, one cluster task each
//!  ├─ 2. Resolve     fetch the manifest, take this task's slice
//!  ├─ 3. Partition   split the slice into fixed-size minibatches
//!  ├─ 4. Convert     per minibatch: load engine once, then per document
//!  │                 fetch → quality gate → convert → upload
//!  └─ 5. Aggregate   progress/error events into one ordered log
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use corpus2md::{
//!     cluster::JobRange, config::RunOptions, engine::PdfiumEngineLoader,
//!     events::TracingEventLogger, pipeline::RangePipeline,
//!     storage::{HttpObjectStore, StorageLocation},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = RangePipeline {
//!         store: Arc::new(HttpObjectStore::new(300)?),
//!         loader: Arc::new(PdfiumEngineLoader::default()),
//!         index: StorageLocation::parse("https://acct.example.net/corpus/index.txt?sig=...")?,
//!         source: StorageLocation::parse("https://acct.example.net/corpus?sig=...")?,
//!         dest: StorageLocation::parse("https://acct.example.net/markdown?sig=...")?,
//!         options: RunOptions::default(),
//!         logger: Arc::new(TracingEventLogger),
//!     };
//!     let summary = pipeline.run(JobRange { offset: 0, length: 500 }).await?;
//!     eprintln!("{} converted, {} skipped, {} failed",
//!         summary.succeeded, summary.skipped, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Execution topologies
//!
//! | Strategy   | Selected by    | Engine instances | Event path |
//! |------------|----------------|------------------|------------|
//! | Sequential | `workers == 1` | one per minibatch, one at a time | direct, synchronous |
//! | Pooled     | `workers > 1`  | one per in-flight minibatch | bounded queue → single aggregator |
//!
//! Both run the identical per-minibatch contract; the choice is pure
//! configuration. There is no per-document retry and no cancellation: a
//! failed document is simply absent from the output set, and the log
//! carries enough context to re-run a narrow range over the failures.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `corpus2md` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cluster;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod events;
pub mod manifest;
pub mod pipeline;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cluster::{build_job, plan_ranges, ClusterScheduler, JobRange, JobSpec, TaskSpec};
pub use config::{ClusterEnv, JobConfig, RunOptions};
pub use engine::{ConversionEngine, ConvertedDocument, EngineLoader, PdfiumEngineLoader};
pub use error::{Corpus2MdError, DocError};
pub use events::{Event, EventLogger, EventSink, TracingEventLogger};
pub use manifest::ManifestEntry;
pub use pipeline::{ConversionOutcome, RangePipeline, RunSummary, SkipReason};
pub use storage::{HttpObjectStore, ObjectStore, StorageLocation, UrlTemplate};
