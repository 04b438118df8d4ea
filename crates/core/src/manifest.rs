//! Run manifest
//!
//! The JSON record of a run's planned jobs and final results, written to
//! `parallel_logs/run_manifest.json` under the source repository.
//! Mirrors `run_parallel.py`'s manifest write in `run_all`, which is
//! produced before jobs start (so a crash mid-run still leaves a record
//! of what was planned) and overwritten once results are in.

use crate::config::RunConfig;
use crate::errors::{Result, RunnerError};
use crate::job::{Job, JobResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub generated_at: DateTime<Utc>,
    pub config_path: PathBuf,
    pub config: RunConfig,
    pub workflow_type: String,
    pub max_parallel: usize,
    pub total_jobs: usize,
    pub planned_jobs: Vec<Job>,
    #[serde(default)]
    pub results: Vec<JobResult>,
}

impl RunManifest {
    pub fn planned(
        config_path: PathBuf,
        config: RunConfig,
        max_parallel: usize,
        planned_jobs: Vec<Job>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            workflow_type: config.workflow_type.clone(),
            total_jobs: planned_jobs.len(),
            config_path,
            config,
            max_parallel,
            planned_jobs,
            results: Vec::new(),
        }
    }

    pub fn with_results(mut self, results: Vec<JobResult>) -> Self {
        self.results = results;
        self
    }

    /// Write the manifest as pretty-printed JSON to `path`, creating
    /// parent directories as needed.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RunnerError::CloneFailed {
                message: format!("could not create manifest dir {}: {e}", parent.display()),
            })?;
        }
        let file = fs::File::create(path).map_err(|e| RunnerError::CloneFailed {
            message: format!("could not create manifest file {}: {e}", path.display()),
        })?;
        serde_json::to_writer_pretty(file, self).map_err(|e| RunnerError::CloneFailed {
            message: format!("could not write manifest: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntOrList, ModelDescriptor, RunConfig, TaskDescriptor};
    use crate::planner::generate_jobs;
    use tempfile::tempdir;

    fn config() -> RunConfig {
        RunConfig {
            workflow_type: "exploit_workflow".to_string(),
            trials_per_config: 1,
            tasks: vec![TaskDescriptor {
                task_dir: "bountytasks/lunary".to_string(),
                bounty_number: "0".to_string(),
            }],
            models: vec![ModelDescriptor {
                name: "anthropic/claude-3-5-sonnet".to_string(),
            }],
            phase_iterations: IntOrList(vec![1]),
            vulnerability_type: vec![],
            use_mock_model: true,
        }
    }

    #[test]
    fn writes_and_round_trips_a_planned_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/run_manifest.json");

        let jobs = generate_jobs(&config());
        let config_path = PathBuf::from("run.yaml");
        let manifest = RunManifest::planned(config_path.clone(), config(), 4, jobs.clone());
        manifest.write_to(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: RunManifest = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.planned_jobs.len(), jobs.len());
        assert_eq!(parsed.total_jobs, jobs.len());
        assert_eq!(parsed.max_parallel, 4);
        assert_eq!(parsed.config_path, config_path);
        assert!(parsed.results.is_empty());
    }
}
