//! Job Runner
//!
//! Drives a single job through its full lifecycle: clone, isolate,
//! network, exec, collect, clean up. Mirrors `run_parallel.py`'s
//! `run_job`, including its `finally` block's exact teardown order —
//! compose projects down, then project-labeled containers, then
//! network-attached containers, then the network itself, then the
//! clone directory — so a crash partway through a job's containers
//! never leaves another job's resources short-lived and orphaned.

use crate::clone::CloneManager;
use crate::compose::ComposeTeardown;
use crate::container_engine::ContainerEngine;
use crate::dotenv::load_env_file;
use crate::job::{Job, JobId, JobResources, JobResult, JobStatus, ModelChoice};
use crate::log_collector::LogCollector;
use crate::rewrite::IsolationRewriter;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

/// Everything a job needs that is shared across the whole run rather
/// than owned per-job.
pub struct RunnerContext<'a> {
    pub source_dir: &'a Path,
    pub workdir: &'a Path,
    pub log_dir: &'a Path,
    pub engine: &'a dyn ContainerEngine,
    pub keep_clones: bool,
}

/// Drives one job end to end.
pub struct JobRunner;

impl JobRunner {
    #[instrument(skip(ctx, job), fields(job_id))]
    pub async fn run(ctx: &RunnerContext<'_>, job: Job) -> JobResult {
        let job_id = JobId::new();
        tracing::Span::current().record("job_id", job_id.as_str());
        let mut result = JobResult::pending(job_id.clone(), job.clone());
        result.status = JobStatus::Running;

        let started = Instant::now();
        let outcome = Self::run_inner(ctx, &job_id, &job).await;
        result.duration_secs = started.elapsed().as_secs_f64();

        match outcome {
            Ok((exit_code, clone_path)) => {
                result.clone_path = Some(clone_path);
                result.exit_code = Some(exit_code);
                result.status = if exit_code == 0 { JobStatus::Completed } else { JobStatus::Failed };
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "job errored before or during execution");
                result.status = JobStatus::Error;
                result.error = Some(e.to_string());
            }
        }

        result
    }

    async fn run_inner(
        ctx: &RunnerContext<'_>,
        job_id: &JobId,
        job: &Job,
    ) -> crate::errors::Result<(i32, PathBuf)> {
        let clone_path = CloneManager::create(ctx.source_dir, ctx.workdir, job_id)?;
        let resources = JobResources::new(job_id.clone(), clone_path.clone());

        let run_result = Self::isolate_and_execute(ctx, &resources, job).await;

        Self::cleanup(ctx, &resources).await;

        run_result.map(|exit_code| (exit_code, clone_path))
    }

    async fn isolate_and_execute(
        ctx: &RunnerContext<'_>,
        resources: &JobResources,
        job: &Job,
    ) -> crate::errors::Result<i32> {
        IsolationRewriter::rewrite(&resources.clone_path, &resources.job_id)?;
        ctx.engine.create_network(&resources.network_name).await?;

        let env_path = resources.clone_path.join(".env");
        let env_vars = load_env_file(&env_path);

        let (stdout, stderr) = LogCollector::open_process_logs(ctx.log_dir, &resources.job_id)?;

        let args = Self::build_command(job, resources);
        info!(job_id = %resources.job_id, args = ?args, "spawning workflow process");

        let mut command = Command::new(&args[0]);
        command
            .args(&args[1..])
            .current_dir(&resources.clone_path)
            .env("COMPOSE_PROJECT_NAME", &resources.compose_prefix)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .stdin(Stdio::null());

        // Inherit the process environment; a `.env` key only applies
        // when it is not already set in the inherited environment.
        for (key, value) in &env_vars {
            if std::env::var_os(key).is_none() {
                command.env(key, value);
            }
        }

        let status = command.status().await?;

        LogCollector::collect_artifact_logs(&resources.clone_path, ctx.log_dir, &resources.job_id);

        Ok(status.code().unwrap_or(-1))
    }

    /// Build the workflow child-process invocation. Mirrors
    /// `run_parallel.py`'s `build_command`: the clone-local venv
    /// interpreter (falling back to the host runtime) invoking
    /// `workflows.runner` as a module, with the job's parameter tuple
    /// passed as named options.
    fn build_command(job: &Job, resources: &JobResources) -> Vec<String> {
        let mut args = vec![
            Self::runtime_for(&resources.clone_path),
            "-m".to_string(),
            "workflows.runner".to_string(),
            "--workflow-type".to_string(),
            job.workflow_type.clone(),
            "--task_dir".to_string(),
            job.task_dir.clone(),
            "--bounty_number".to_string(),
            job.bounty_number.clone(),
            "--phase_iterations".to_string(),
            job.phase_iterations.to_string(),
        ];

        match &job.model {
            ModelChoice::Named(name) => {
                args.push("--model".to_string());
                args.push(name.clone());
            }
            ModelChoice::Mock => args.push("--use_mock_model".to_string()),
        }

        if let Some(vuln) = &job.vulnerability_type {
            if job.workflow_type.starts_with("detect_") {
                args.push("--vulnerability_type".to_string());
                args.push(vuln.clone());
            }
        }

        args
    }

    /// Prefer the clone-local venv interpreter if present, otherwise
    /// fall back to a host `python3` on `PATH` (the Rust-orchestrator
    /// analogue of the original's `sys.executable` fallback, since the
    /// orchestrator itself is no longer the Python interpreter).
    fn runtime_for(clone_path: &Path) -> String {
        let venv_python = if cfg!(windows) {
            clone_path.join("venv").join("Scripts").join("python.exe")
        } else {
            clone_path.join("venv").join("bin").join("python")
        };
        if venv_python.exists() {
            venv_python.to_string_lossy().into_owned()
        } else {
            "python3".to_string()
        }
    }

    /// Tear down every resource this job owns, in the order that keeps a
    /// partial failure from stranding another job's resources: compose
    /// projects, then project-labeled containers, then network-attached
    /// containers, then the network, then (unless `--keep-clones`) the
    /// clone directory.
    async fn cleanup(ctx: &RunnerContext<'_>, resources: &JobResources) {
        ComposeTeardown::teardown_all(ctx.engine, resources).await;

        match ctx.engine.containers_with_project_label(&resources.compose_prefix).await {
            Ok(ids) => {
                if let Err(e) = ctx.engine.force_remove_containers(&ids).await {
                    warn!(job_id = %resources.job_id, error = %e, "failed to remove project-labeled containers");
                }
            }
            Err(e) => warn!(job_id = %resources.job_id, error = %e, "failed to list project-labeled containers"),
        }

        match ctx.engine.containers_on_network(&resources.network_name).await {
            Ok(ids) => {
                if let Err(e) = ctx.engine.force_remove_containers(&ids).await {
                    warn!(job_id = %resources.job_id, error = %e, "failed to remove network-attached containers");
                }
            }
            Err(e) => warn!(job_id = %resources.job_id, error = %e, "failed to list network-attached containers"),
        }

        if let Err(e) = ctx.engine.remove_network(&resources.network_name).await {
            warn!(job_id = %resources.job_id, error = %e, "failed to remove job network");
        }

        if ctx.keep_clones {
            info!(job_id = %resources.job_id, clone_path = %resources.clone_path.display(), "keeping clone directory");
        } else {
            CloneManager::destroy(&resources.clone_path);
        }
    }
}
