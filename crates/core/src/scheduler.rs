//! Concurrent Scheduler
//!
//! Runs job groups with bounded parallelism. Mirrors `run_parallel.py`'s
//! `run_all`: a semaphore gates how many groups execute at once, and
//! every job within a group runs concurrently with every other job in
//! that same group (groups are sequential chains of jobs that share a
//! port-conflict risk; see `planner::plan_groups`).

use crate::job::JobResult;
use crate::planner::plan_groups;
use crate::runner::{JobRunner, RunnerContext};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::instrument;

pub struct Scheduler;

impl Scheduler {
    /// Run every job in `jobs`, honoring `max_parallel` concurrent
    /// groups. Returns one `JobResult` per job, in the order produced by
    /// job completion (not necessarily planning order).
    #[instrument(skip(ctx, jobs))]
    pub async fn run_all(ctx: &RunnerContext<'_>, jobs: Vec<crate::job::Job>, max_parallel: usize) -> Vec<JobResult> {
        let groups = plan_groups(jobs);
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));

        let group_futures = groups.into_iter().map(|group| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                Self::run_group(ctx, group).await
            }
        });

        join_all(group_futures).await.into_iter().flatten().collect()
    }

    /// Run every job in a single group concurrently and wait for all of
    /// them to finish.
    async fn run_group(ctx: &RunnerContext<'_>, group: Vec<crate::job::Job>) -> Vec<JobResult> {
        let job_futures = group.into_iter().map(|job| JobRunner::run(ctx, job));
        join_all(job_futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntOrList, ModelDescriptor, RunConfig, TaskDescriptor};
    use crate::container_engine::fake::FakeContainerEngine;
    use crate::job::JobStatus;
    use crate::planner::generate_jobs;
    use std::fs;
    use tempfile::tempdir;

    fn config_with_trials(trials: u32) -> RunConfig {
        RunConfig {
            workflow_type: "exploit_workflow".to_string(),
            trials_per_config: trials,
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

    #[tokio::test]
    async fn run_all_produces_one_result_per_job_even_when_spawn_fails() {
        let source = tempdir().unwrap();
        fs::write(source.path().join("marker.txt"), "hi\n").unwrap();
        let workdir = tempdir().unwrap();
        let log_dir = tempdir().unwrap();
        let engine = FakeContainerEngine::default();

        let ctx = RunnerContext {
            source_dir: source.path(),
            workdir: workdir.path(),
            log_dir: log_dir.path(),
            engine: &engine,
            keep_clones: false,
        };

        let jobs = generate_jobs(&config_with_trials(3));
        let results = Scheduler::run_all(&ctx, jobs, 2).await;

        assert_eq!(results.len(), 3);
        // build_command points at a `run_workflow` binary that does not
        // exist on the test host, so every job is expected to error out
        // cleanly rather than panic or hang.
        assert!(results.iter().all(|r| r.status == JobStatus::Error));
    }
}
