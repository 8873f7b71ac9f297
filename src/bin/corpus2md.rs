//! CLI binary for corpus2md.
//!
//! One binary, three roles, selected at startup:
//!
//! * **Cluster worker** — detected via the batch agent's task marker
//!   variable; reads the environment contract, resolves credentials, and
//!   processes its assigned range.
//! * **Submit** (default outside the cluster) — loads the TOML config,
//!   counts the manifest, plans ranges, and submits one task per range.
//! * **Local** (`--local`) — runs the configured range in this process,
//!   for debugging without a cluster round-trip.

use anyhow::{Context, Result};
use clap::Parser;
use corpus2md::cluster::{self, BatchServiceClient, ClusterScheduler, JobRange};
use corpus2md::config::{ClusterEnv, JobConfig, RunOptions};
use corpus2md::credentials::{
    KeyVaultClient, ManagedIdentityCredential, SecretProvider, BATCH_RESOURCE,
};
use corpus2md::engine::PdfiumEngineLoader;
use corpus2md::events::TracingEventLogger;
use corpus2md::pipeline::{RangePipeline, RunSummary};
use corpus2md::storage::HttpObjectStore;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"MODES:
  Inside a scheduled cluster task (AZ_BATCH_TASK_ID set) the binary reads
  its range and locations from the CORPUS2MD_* environment contract and
  processes that range. Outside the cluster it loads the config file and
  submits one task per planned range; --local instead runs the configured
  range in this process.

EXAMPLES:
  # Submit the whole corpus as one job (one task per 500 files)
  corpus2md --config corpus2md.toml

  # See the plan without submitting anything
  corpus2md --dry-run

  # Debug one range locally with 4 workers and the quality gate on
  corpus2md --local --workers 4 --min-length 2000

  # Persist the aggregated log (2000 is the usual production threshold)
  corpus2md --local --min-length 2000 --log-file corpus2md.log

CONFIG FILE (TOML):
  index_url     = "https://acct.blob.example.net/corpus/index.txt?{sas_token}"
  src_url       = "https://acct.blob.example.net/corpus?{sas_token}"
  dst_url       = "https://acct.blob.example.net/markdown?{sas_token}"
  keyvault_name = "kv-corpus"
  identity_id   = "00000000-0000-0000-0000-000000000000"
  secret_name   = "storage-sas"
  batch_url     = "https://acct.batch.example.net"
  pool_id       = "gpu-pool"
  batch_size    = 500
  task_command  = "corpus2md --min-length 2000"

CLUSTER ENVIRONMENT CONTRACT (all required inside a task):
  CORPUS2MD_JOB_OFFSET      first manifest index of this task's range
  CORPUS2MD_JOB_LENGTH      number of entries in the range
  CORPUS2MD_INDEX_URL       templated manifest location
  CORPUS2MD_SRC_URL         templated source location
  CORPUS2MD_DST_URL         templated destination location
  CORPUS2MD_KEYVAULT_NAME   vault holding the storage access token
  CORPUS2MD_IDENTITY_ID     managed identity used to read the vault
  CORPUS2MD_SECRET_NAME     name of the token secret

OUTPUT LAYOUT:
  A/B/doc.pdf  ->  A/B/doc.md   (directory mirrored, extension swapped)
  with --write-metadata also:  A/B/doc_meta.json
"#;

/// Convert a remote PDF corpus to Markdown across a batch cluster.
#[derive(Parser, Debug)]
#[command(
    name = "corpus2md",
    version,
    about = "Convert a remote PDF corpus to Markdown across a batch cluster",
    long_about = "Slices a corpus manifest into offset/length ranges, submits one cluster task \
per range, and inside each task converts documents one minibatch at a time — loading the \
conversion engine once per minibatch and containing every per-document failure.",
    arg_required_else_help = false,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the TOML configuration file (non-cluster modes).
    #[arg(short, long, env = "CORPUS2MD_CONFIG", default_value = "corpus2md.toml")]
    config: PathBuf,

    /// Worker count hint: 1 runs minibatches sequentially, more runs a pool.
    #[arg(short, long, env = "CORPUS2MD_WORKERS", default_value_t = 1)]
    workers: usize,

    /// Skip documents whose embedded text is shorter than this many chars
    /// (cheap pre-check; the full conversion never runs for them). Unset
    /// disables the gate; 2000 is the usual production threshold.
    #[arg(long, env = "CORPUS2MD_MIN_LENGTH")]
    min_length: Option<usize>,

    /// Manifest entries per minibatch. Default: range length / (workers * 2).
    #[arg(long, env = "CORPUS2MD_MINIBATCH_SIZE")]
    minibatch_size: Option<usize>,

    /// Upload a _meta.json sidecar next to each converted artifact.
    #[arg(long, env = "CORPUS2MD_WRITE_METADATA")]
    write_metadata: bool,

    /// Run the configured range in this process instead of submitting.
    #[arg(long)]
    local: bool,

    /// Plan the job and print its tasks without submitting anything.
    #[arg(long)]
    dry_run: bool,

    /// Write the log to this file (append) instead of stderr.
    #[arg(long, env = "CORPUS2MD_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Explicit path to the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Storage transfer timeout in seconds.
    #[arg(long, env = "CORPUS2MD_TRANSFER_TIMEOUT", default_value_t = 300)]
    transfer_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CORPUS2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CORPUS2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    if cluster::in_cluster() {
        cluster_worker(&cli).await
    } else {
        let config = JobConfig::load(&cli.config)?;
        if cli.local {
            run_local(&cli, &config).await
        } else {
            submit(&cli, &config).await
        }
    }
}

// ── Logging setup ────────────────────────────────────────────────────────

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {path:?}"))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

// ── Modes ────────────────────────────────────────────────────────────────

fn run_options(cli: &Cli, config: Option<&JobConfig>) -> RunOptions {
    RunOptions {
        workers: cli.workers.max(1),
        min_length: cli.min_length,
        minibatch_size: cli
            .minibatch_size
            .or_else(|| config.and_then(|c| c.minibatch_size)),
        write_metadata: cli.write_metadata || config.is_some_and(|c| c.write_metadata),
    }
}

fn pipeline_for(
    cli: &Cli,
    options: RunOptions,
    index: corpus2md::StorageLocation,
    source: corpus2md::StorageLocation,
    dest: corpus2md::StorageLocation,
) -> Result<RangePipeline> {
    Ok(RangePipeline {
        store: Arc::new(HttpObjectStore::new(cli.transfer_timeout)?),
        loader: Arc::new(PdfiumEngineLoader {
            library_path: cli.pdfium_lib.clone(),
        }),
        index,
        source,
        dest,
        options,
        logger: Arc::new(TracingEventLogger),
    })
}

/// Inside a scheduled task: env contract → fresh token → assigned range.
async fn cluster_worker(cli: &Cli) -> Result<()> {
    let env = ClusterEnv::from_env()?;

    let credential = ManagedIdentityCredential::new(&env.identity_id)?;
    let vault = KeyVaultClient::new(&env.keyvault_name, credential)?;
    let token = vault
        .secret(&env.secret_name)
        .await
        .context("Failed to resolve the storage access token")?;

    let pipeline = pipeline_for(
        cli,
        run_options(cli, None),
        env.index_url.resolve(&token)?,
        env.src_url.resolve(&token)?,
        env.dst_url.resolve(&token)?,
    )?;

    let summary = pipeline
        .run(JobRange {
            offset: env.offset,
            length: env.length,
        })
        .await
        .context("Range execution failed")?;

    report(&summary, cli.quiet);
    Ok(())
}

/// `--local`: run the config file's range in this process.
async fn run_local(cli: &Cli, config: &JobConfig) -> Result<()> {
    let credential = ManagedIdentityCredential::new(&config.identity_id)?;
    let vault = KeyVaultClient::new(&config.keyvault_name, credential)?;
    let token = vault
        .secret(&config.secret_name)
        .await
        .context("Failed to resolve the storage access token")?;

    let pipeline = pipeline_for(
        cli,
        run_options(cli, Some(config)),
        config.index_url.resolve(&token)?,
        config.src_url.resolve(&token)?,
        config.dst_url.resolve(&token)?,
    )?;

    let range = JobRange {
        offset: config.offset.unwrap_or(0),
        length: config.length.unwrap_or(usize::MAX),
    };
    let summary = pipeline.run(range).await.context("Range execution failed")?;

    report(&summary, cli.quiet);
    Ok(())
}

/// Default non-cluster mode: plan the job and hand it to the scheduler.
async fn submit(cli: &Cli, config: &JobConfig) -> Result<()> {
    let credential = ManagedIdentityCredential::new(&config.identity_id)?;
    let vault = KeyVaultClient::new(&config.keyvault_name, credential.clone())?;
    let token = vault
        .secret(&config.secret_name)
        .await
        .context("Failed to resolve the storage access token")?;

    let store = HttpObjectStore::new(cli.transfer_timeout)?;
    let index = config.index_url.resolve(&token)?;
    let total = corpus2md::manifest::count_entries(&store, &index)
        .await
        .context("Failed to count the corpus manifest")?;

    let job = cluster::build_job(config, total, chrono::Local::now())?;
    eprintln!(
        "{} {} files -> {} tasks of up to {} (job {})",
        bold("plan:"),
        total,
        job.tasks.len(),
        config.batch_size,
        job.id
    );

    if cli.dry_run {
        for task in &job.tasks {
            let offset = &task.environment[corpus2md::config::ENV_JOB_OFFSET];
            let length = &task.environment[corpus2md::config::ENV_JOB_LENGTH];
            eprintln!(
                "  {}  {}",
                task.id,
                dim(&format!("offset={offset} length={length}"))
            );
        }
        eprintln!("{} nothing submitted (--dry-run)", dim("note:"));
        return Ok(());
    }

    let bearer = credential
        .token(BATCH_RESOURCE)
        .await
        .context("Failed to resolve the batch-service token")?;
    let scheduler = BatchServiceClient::new(&config.batch_url, bearer)?;
    scheduler
        .submit(&job)
        .await
        .context("Job submission failed")?;

    eprintln!(
        "{} job {} submitted to pool {}",
        green("✔"),
        bold(&job.id),
        config.pool_id
    );
    Ok(())
}

fn report(summary: &RunSummary, quiet: bool) {
    if quiet {
        return;
    }
    let mark = if summary.failed == 0 {
        green("✔")
    } else {
        red("✘")
    };
    eprintln!(
        "{mark} {} converted  {} skipped  {} failed  {}",
        bold(&summary.succeeded.to_string()),
        summary.skipped,
        summary.failed,
        dim(&format!("({} minibatches)", summary.minibatches)),
    );
}
