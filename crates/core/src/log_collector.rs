//! Log Collector
//!
//! Copies a job's working-tree log artifacts into the run's centralized
//! `parallel_logs/` directory once the job finishes, and captures the
//! child process's stdout/stderr directly to files for the duration of
//! the run. Mirrors `run_parallel.py`'s `_collect_logs` plus the
//! `stdout`/`stderr` file handles passed to
//! `asyncio.create_subprocess_exec` in `run_job`.

use crate::errors::{Result, RunnerError};
use crate::job::JobId;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Clone-relative subtrees copied into `parallel_logs/<kind>/` after a
/// job finishes.
const ARTIFACT_KINDS: &[&str] = &["logs", "full_logs"];

/// Collects per-job log artifacts into the run's shared log directory.
pub struct LogCollector;

impl LogCollector {
    /// Open (creating parent directories as needed) the stdout and
    /// stderr files a job's child process should inherit for the
    /// duration of its run: `<log_dir>/stdout/<JobId>.log` and
    /// `<log_dir>/stderr/<JobId>.log`.
    pub fn open_process_logs(log_dir: &Path, job_id: &JobId) -> Result<(fs::File, fs::File)> {
        let stdout_path = Self::stdout_path(log_dir, job_id);
        let stderr_path = Self::stderr_path(log_dir, job_id);

        for path in [&stdout_path, &stderr_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| RunnerError::CloneFailed {
                    message: format!("could not create log dir {}: {e}", parent.display()),
                })?;
            }
        }

        let stdout = fs::File::create(&stdout_path).map_err(|e| RunnerError::CloneFailed {
            message: format!("could not create {}: {e}", stdout_path.display()),
        })?;
        let stderr = fs::File::create(&stderr_path).map_err(|e| RunnerError::CloneFailed {
            message: format!("could not create {}: {e}", stderr_path.display()),
        })?;

        Ok((stdout, stderr))
    }

    /// After a job finishes, copy the entire contents of the clone's
    /// `logs/` and `full_logs/` subtrees (no extension filtering) into
    /// `<log_dir>/<kind>/<JobId>__<relpath>`, where `<relpath>` is each
    /// file's path relative to the subtree root. Best-effort: a copy
    /// failure is logged and does not fail the job.
    #[instrument(skip(clone_path, log_dir))]
    pub fn collect_artifact_logs(clone_path: &Path, log_dir: &Path, job_id: &JobId) {
        for kind in ARTIFACT_KINDS {
            let source_root = clone_path.join(kind);
            if !source_root.exists() {
                continue;
            }
            let dest_root = log_dir.join(kind);

            for entry in WalkDir::new(&source_root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }

                let Ok(rel) = entry.path().strip_prefix(&source_root) else {
                    continue;
                };
                let dest = dest_root.join(format!("{job_id}__{}", rel.display()));

                if let Some(parent) = dest.parent() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        warn!(path = %parent.display(), error = %e, "could not create log destination dir");
                        continue;
                    }
                }

                if let Err(e) = fs::copy(entry.path(), &dest) {
                    warn!(source = %entry.path().display(), dest = %dest.display(), error = %e, "failed to collect log artifact");
                } else {
                    debug!(dest = %dest.display(), "collected log artifact");
                }
            }
        }
    }

    pub fn stdout_path(log_dir: &Path, job_id: &JobId) -> PathBuf {
        log_dir.join("stdout").join(format!("{job_id}.log"))
    }

    pub fn stderr_path(log_dir: &Path, job_id: &JobId) -> PathBuf {
        log_dir.join("stderr").join(format!("{job_id}.log"))
    }
}
