//! Job descriptors, ids, and results
//!
//! A `Job` is a single unit of execution: a fixed parameter tuple bound to
//! a workflow invocation. Jobs are immutable once planned and never
//! reference each other.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A short opaque token — 10 hex characters of a fresh random value — used
/// as the sole namespace prefix for every job-scoped identifier (network
/// name, compose project prefix, clone directory suffix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh, unique JobId.
    pub fn new() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        JobId(hex[..10].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `bb_net_<JobId>` — this job's private container network name.
    pub fn network_name(&self) -> String {
        format!("bb_net_{}", self.0)
    }

    /// `bb_<JobId>` — this job's compose-project prefix.
    pub fn compose_prefix(&self) -> String {
        format!("bb_{}", self.0)
    }

    /// `bb_job_<JobId>` — the clone directory basename for this job.
    pub fn clone_dirname(&self) -> String {
        format!("bb_job_{}", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Either a named model or a request to use the mock model; mutually
/// exclusive per spec.md §6's child-process invocation contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelChoice {
    Named(String),
    Mock,
}

/// A single unit of execution: one invocation of the workflow binary with
/// a fixed parameter tuple. Immutable after planning; jobs carry no
/// cross-references to one another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub workflow_type: String,
    pub task_dir: String,
    pub bounty_number: String,
    pub model: ModelChoice,
    pub phase_iterations: u32,
    pub vulnerability_type: Option<String>,
}

/// Runtime handles owned exclusively by one job. Created at job start,
/// destroyed at job end; lifetime is strictly nested within the job's
/// execution span.
#[derive(Debug, Clone)]
pub struct JobResources {
    pub job_id: JobId,
    pub clone_path: PathBuf,
    pub network_name: String,
    pub compose_prefix: String,
}

impl JobResources {
    pub fn new(job_id: JobId, clone_path: PathBuf) -> Self {
        let network_name = job_id.network_name();
        let compose_prefix = job_id.compose_prefix();
        Self {
            job_id,
            clone_path,
            network_name,
            compose_prefix,
        }
    }
}

/// The outcome of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Error,
}

impl JobStatus {
    /// `[OK]` / `[FAIL]` / `[ERR]` markers for the summary table.
    pub fn marker(self) -> &'static str {
        match self {
            JobStatus::Completed => "[OK]",
            JobStatus::Failed => "[FAIL]",
            JobStatus::Error => "[ERR]",
            JobStatus::Pending => "[...]",
            JobStatus::Running => "[...]",
        }
    }
}

/// The outcome record for one completed (or aborted) job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub job: Job,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub duration_secs: f64,
    pub clone_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn pending(job_id: JobId, job: Job) -> Self {
        Self {
            job_id,
            job,
            status: JobStatus::Pending,
            exit_code: None,
            duration_secs: 0.0,
            clone_path: None,
            error: None,
        }
    }
}
