//! Typed configuration: file config, cluster environment contract, and
//! per-run options.
//!
//! Two startup paths exist, mirroring the two places the binary runs:
//!
//! * **Outside the cluster** — a TOML file ([`JobConfig`]) supplies the
//!   storage locations, credential references, and batch sizing used to
//!   plan and submit a job (or to run one range locally with `--local`).
//! * **Inside a cluster task** — the scheduler provides the environment
//!   contract ([`ClusterEnv`]); every variable is required and any absence
//!   is a fatal startup error.
//!
//! Both are explicit values constructed once at startup and passed by
//! parameter; fields are declared and validated at load time, never
//! discovered at first access.

use crate::error::Corpus2MdError;
use crate::storage::UrlTemplate;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

// ── Cluster environment contract ─────────────────────────────────────────

pub const ENV_JOB_OFFSET: &str = "CORPUS2MD_JOB_OFFSET";
pub const ENV_JOB_LENGTH: &str = "CORPUS2MD_JOB_LENGTH";
pub const ENV_INDEX_URL: &str = "CORPUS2MD_INDEX_URL";
pub const ENV_SRC_URL: &str = "CORPUS2MD_SRC_URL";
pub const ENV_DST_URL: &str = "CORPUS2MD_DST_URL";
pub const ENV_KEYVAULT_NAME: &str = "CORPUS2MD_KEYVAULT_NAME";
pub const ENV_IDENTITY_ID: &str = "CORPUS2MD_IDENTITY_ID";
pub const ENV_SECRET_NAME: &str = "CORPUS2MD_SECRET_NAME";

/// Every variable a cluster task must receive. Used when building task
/// environments and when validating them on the worker side.
pub const REQUIRED_ENV_VARS: &[&str] = &[
    ENV_JOB_OFFSET,
    ENV_JOB_LENGTH,
    ENV_INDEX_URL,
    ENV_SRC_URL,
    ENV_DST_URL,
    ENV_KEYVAULT_NAME,
    ENV_IDENTITY_ID,
    ENV_SECRET_NAME,
];

/// The environment contract read by a worker process running inside a
/// scheduled task.
#[derive(Debug, Clone)]
pub struct ClusterEnv {
    pub offset: usize,
    pub length: usize,
    pub index_url: UrlTemplate,
    pub src_url: UrlTemplate,
    pub dst_url: UrlTemplate,
    pub keyvault_name: String,
    pub identity_id: String,
    pub secret_name: String,
}

fn required_var(name: &'static str) -> Result<String, Corpus2MdError> {
    std::env::var(name).map_err(|_| Corpus2MdError::MissingEnvVar { name })
}

fn parsed_var<T: FromStr>(name: &'static str) -> Result<T, Corpus2MdError>
where
    T::Err: std::fmt::Display,
{
    required_var(name)?
        .parse()
        .map_err(|e: T::Err| Corpus2MdError::InvalidEnvVar {
            name,
            detail: e.to_string(),
        })
}

impl ClusterEnv {
    /// Read the full contract from the process environment, failing fast
    /// on the first absent or unparsable variable.
    pub fn from_env() -> Result<Self, Corpus2MdError> {
        Ok(Self {
            offset: parsed_var(ENV_JOB_OFFSET)?,
            length: parsed_var(ENV_JOB_LENGTH)?,
            index_url: UrlTemplate::new(required_var(ENV_INDEX_URL)?),
            src_url: UrlTemplate::new(required_var(ENV_SRC_URL)?),
            dst_url: UrlTemplate::new(required_var(ENV_DST_URL)?),
            keyvault_name: required_var(ENV_KEYVAULT_NAME)?,
            identity_id: required_var(ENV_IDENTITY_ID)?,
            secret_name: required_var(ENV_SECRET_NAME)?,
        })
    }
}

// ── File configuration ───────────────────────────────────────────────────

fn default_job_id_prefix() -> String {
    "corpus2md-".to_string()
}

/// Non-cluster configuration, loaded from a TOML file.
///
/// Storage URLs stay templated here; the `{sas_token}` placeholder is
/// substituted at startup once the vault secret is resolved.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub index_url: UrlTemplate,
    pub src_url: UrlTemplate,
    pub dst_url: UrlTemplate,

    pub keyvault_name: String,
    pub identity_id: String,
    pub secret_name: String,

    pub batch_url: String,
    pub pool_id: String,
    #[serde(default = "default_job_id_prefix")]
    pub job_id_prefix: String,

    /// Manifest entries per cluster task.
    pub batch_size: usize,

    /// Shell command each task runs; the worker invocation.
    pub task_command: String,

    /// Entries per minibatch. When absent, derived from the range length
    /// and worker count ([`crate::manifest::default_minibatch_size`]).
    #[serde(default)]
    pub minibatch_size: Option<usize>,

    /// Upload a `_meta.json` sidecar next to each text artifact.
    #[serde(default)]
    pub write_metadata: bool,

    /// Range for `--local` runs. Defaults to the whole manifest.
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub length: Option<usize>,
}

impl JobConfig {
    /// Load and validate the configuration file.
    pub fn load(path: &Path) -> Result<Self, Corpus2MdError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Corpus2MdError::ConfigNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                Corpus2MdError::InvalidConfigFile {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                }
            }
        })?;

        let config: JobConfig =
            toml::from_str(&text).map_err(|e| Corpus2MdError::InvalidConfigFile {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        config.validate().map_err(|detail| {
            Corpus2MdError::InvalidConfigFile {
                path: path.to_path_buf(),
                detail,
            }
        })?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be >= 1".into());
        }
        if self.minibatch_size == Some(0) {
            return Err("minibatch_size must be >= 1 when set".into());
        }
        if self.task_command.trim().is_empty() {
            return Err("task_command must not be empty".into());
        }
        Ok(())
    }
}

// ── Per-run options ──────────────────────────────────────────────────────

/// Knobs for one range execution, assembled by the binary from CLI flags
/// plus file config.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker count hint: 1 selects the sequential strategy, more selects
    /// the pooled strategy.
    pub workers: usize,

    /// Quality gate: skip documents whose embedded text is shorter than
    /// this, without running the full conversion. `None` disables the gate.
    pub min_length: Option<usize>,

    /// Explicit minibatch size; formula default when `None`.
    pub minibatch_size: Option<usize>,

    /// Upload the metadata sidecar next to each artifact.
    pub write_metadata: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            min_length: None,
            minibatch_size: None,
            write_metadata: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
        index_url = "https://h.example.net/corpus/index.txt?{sas_token}"
        src_url = "https://h.example.net/corpus?{sas_token}"
        dst_url = "https://h.example.net/markdown?{sas_token}"
        keyvault_name = "kv-corpus"
        identity_id = "identity-1"
        secret_name = "storage-sas"
        batch_url = "https://acct.batch.example.net"
        pool_id = "gpu-pool"
        batch_size = 500
        task_command = "corpus2md --min-length 2000"
    "#;

    fn write_config(text: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus2md.toml");
        std::fs::write(&path, text).unwrap();
        (dir, path)
    }

    #[test]
    fn full_config_loads_with_defaults() {
        let (_dir, path) = write_config(FULL_CONFIG);
        let config = JobConfig::load(&path).unwrap();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.job_id_prefix, "corpus2md-");
        assert_eq!(config.minibatch_size, None);
        assert!(!config.write_metadata);
        assert!(config.src_url.as_str().contains("{sas_token}"));
    }

    #[test]
    fn missing_key_fails_at_load() {
        let (_dir, path) = write_config("batch_size = 10");
        let err = JobConfig::load(&path).unwrap_err();
        assert!(matches!(err, Corpus2MdError::InvalidConfigFile { .. }));
    }

    #[test]
    fn missing_file_is_config_not_found() {
        let err = JobConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, Corpus2MdError::ConfigNotFound { .. }));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let text = FULL_CONFIG.replace("batch_size = 500", "batch_size = 0");
        let (_dir, path) = write_config(&text);
        assert!(JobConfig::load(&path).is_err());
    }

    #[test]
    fn cluster_env_round_trip_and_fail_fast() {
        // One test covers both directions; parallel tests must not race on
        // the process environment.
        std::env::set_var(ENV_JOB_OFFSET, "500");
        std::env::set_var(ENV_JOB_LENGTH, "250");
        std::env::set_var(ENV_INDEX_URL, "https://h/corpus/index.txt?{sas_token}");
        std::env::set_var(ENV_SRC_URL, "https://h/corpus?{sas_token}");
        std::env::set_var(ENV_DST_URL, "https://h/markdown?{sas_token}");
        std::env::set_var(ENV_KEYVAULT_NAME, "kv");
        std::env::set_var(ENV_IDENTITY_ID, "id");
        std::env::set_var(ENV_SECRET_NAME, "sas");

        let env = ClusterEnv::from_env().unwrap();
        assert_eq!(env.offset, 500);
        assert_eq!(env.length, 250);
        assert_eq!(env.keyvault_name, "kv");

        std::env::set_var(ENV_JOB_OFFSET, "not-a-number");
        assert!(matches!(
            ClusterEnv::from_env().unwrap_err(),
            Corpus2MdError::InvalidEnvVar { name, .. } if name == ENV_JOB_OFFSET
        ));

        std::env::remove_var(ENV_SECRET_NAME);
        std::env::set_var(ENV_JOB_OFFSET, "500");
        assert!(matches!(
            ClusterEnv::from_env().unwrap_err(),
            Corpus2MdError::MissingEnvVar { name } if name == ENV_SECRET_NAME
        ));
    }
}
