//! The job distributor: range planning and cluster submission.
//!
//! Run once, outside the cluster. The distributor counts the manifest,
//! covers `[0, total)` with consecutive disjoint [`JobRange`]s, wraps each
//! range in a task (command line + environment contract), and submits the
//! whole set as one job to the batch scheduler. Execution results are never
//! observed here — retry and completion tracking belong to the scheduler.
//!
//! Submission is not idempotent: every submit mints a fresh job id and no
//! deduplication against earlier runs is attempted.

use crate::config::{self, JobConfig};
use crate::error::Corpus2MdError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

/// A contiguous offset/length slice of the manifest assigned to one
/// cluster task. May extend past the end of the manifest; the partitioner
/// clamps when slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRange {
    pub offset: usize,
    pub length: usize,
}

/// One unit of cluster work derived from a [`JobRange`].
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: String,
    pub command_line: String,
    pub environment: BTreeMap<String, String>,
}

/// A full submission: one task per planned range.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: String,
    pub pool_id: String,
    pub tasks: Vec<TaskSpec>,
}

/// Cover `[0, total_file_count)` in consecutive non-overlapping chunks of
/// `batch_size`, the final chunk possibly shorter.
pub fn plan_ranges(
    total_file_count: usize,
    batch_size: usize,
) -> Result<Vec<JobRange>, Corpus2MdError> {
    if batch_size == 0 {
        return Err(Corpus2MdError::InvalidConfig(
            "batch size must be >= 1".into(),
        ));
    }
    let mut ranges = Vec::with_capacity(total_file_count.div_ceil(batch_size));
    let mut offset = 0;
    while offset < total_file_count {
        ranges.push(JobRange {
            offset,
            length: batch_size.min(total_file_count - offset),
        });
        offset += batch_size;
    }
    Ok(ranges)
}

/// Build the job for a corpus of `total_file_count` documents.
///
/// The task environment carries the *templated* storage URLs plus the
/// credential references; each worker resolves its own fresh access token
/// at startup. Tasks can sit queued for hours, long past the lifetime of
/// any token resolved at submission time.
pub fn build_job(
    config: &JobConfig,
    total_file_count: usize,
    now: DateTime<Local>,
) -> Result<JobSpec, Corpus2MdError> {
    let ranges = plan_ranges(total_file_count, config.batch_size)?;
    let job_id = format!(
        "{}{}",
        config.job_id_prefix,
        now.format("%Y-%m-%d-%H-%M-%S")
    );

    let tasks = ranges
        .iter()
        .map(|range| {
            let mut environment = BTreeMap::new();
            environment.insert(config::ENV_JOB_OFFSET.into(), range.offset.to_string());
            environment.insert(config::ENV_JOB_LENGTH.into(), range.length.to_string());
            environment.insert(
                config::ENV_INDEX_URL.into(),
                config.index_url.as_str().into(),
            );
            environment.insert(config::ENV_SRC_URL.into(), config.src_url.as_str().into());
            environment.insert(config::ENV_DST_URL.into(), config.dst_url.as_str().into());
            environment.insert(
                config::ENV_KEYVAULT_NAME.into(),
                config.keyvault_name.clone(),
            );
            environment.insert(config::ENV_IDENTITY_ID.into(), config.identity_id.clone());
            environment.insert(config::ENV_SECRET_NAME.into(), config.secret_name.clone());

            TaskSpec {
                id: format!(
                    "task-{}-{}",
                    range.offset,
                    range.offset + range.length - 1
                ),
                command_line: config.task_command.clone(),
                environment,
            }
        })
        .collect();

    Ok(JobSpec {
        id: job_id,
        pool_id: config.pool_id.clone(),
        tasks,
    })
}

// ── Scheduler client ─────────────────────────────────────────────────────

/// Accepts a job for execution. The production implementation talks to the
/// batch service REST API; tests record submissions.
#[async_trait]
pub trait ClusterScheduler: Send + Sync {
    async fn submit(&self, job: &JobSpec) -> Result<(), Corpus2MdError>;
}

const BATCH_API_VERSION: &str = "2024-02-01.19.0";

/// The task-collection endpoint accepts at most this many tasks per call.
const TASKS_PER_REQUEST: usize = 100;

/// Batch-service REST client, authenticated with an OAuth bearer token.
pub struct BatchServiceClient {
    base: String,
    bearer: String,
    client: reqwest::Client,
}

impl BatchServiceClient {
    pub fn new(
        batch_url: impl Into<String>,
        bearer: impl Into<String>,
    ) -> Result<Self, Corpus2MdError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Corpus2MdError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            base: batch_url.into().trim_end_matches('/').to_string(),
            bearer: bearer.into(),
            client,
        })
    }

    async fn post(&self, url: &str, body: serde_json::Value) -> Result<(), Corpus2MdError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.bearer)
            .json(&body)
            .send()
            .await
            .map_err(|e| Corpus2MdError::SubmitFailed {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Corpus2MdError::SubmitFailed {
                detail: format!("HTTP {status}: {detail}"),
            });
        }
        Ok(())
    }
}

/// JSON body for one task in an `addtaskcollection` request.
fn task_json(task: &TaskSpec) -> serde_json::Value {
    json!({
        "id": task.id,
        "commandLine": task.command_line,
        "environmentSettings": task
            .environment
            .iter()
            .map(|(name, value)| json!({"name": name, "value": value}))
            .collect::<Vec<_>>(),
    })
}

#[async_trait]
impl ClusterScheduler for BatchServiceClient {
    async fn submit(&self, job: &JobSpec) -> Result<(), Corpus2MdError> {
        info!(
            "submitting job '{}' with {} tasks to pool '{}'",
            job.id,
            job.tasks.len(),
            job.pool_id
        );

        let job_url = format!("{}/jobs?api-version={}", self.base, BATCH_API_VERSION);
        self.post(
            &job_url,
            json!({"id": job.id, "poolInfo": {"poolId": job.pool_id}}),
        )
        .await?;

        let tasks_url = format!(
            "{}/jobs/{}/addtaskcollection?api-version={}",
            self.base, job.id, BATCH_API_VERSION
        );
        for chunk in job.tasks.chunks(TASKS_PER_REQUEST) {
            let body = json!({"value": chunk.iter().map(task_json).collect::<Vec<_>>()});
            self.post(&tasks_url, body).await?;
        }

        info!("job '{}' submitted", job.id);
        Ok(())
    }
}

/// True when this process is running inside a scheduled cluster task.
/// The batch agent sets this marker variable on every task it starts.
pub fn in_cluster() -> bool {
    std::env::var_os("AZ_BATCH_TASK_ID").is_some()
}
