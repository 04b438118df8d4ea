//! Job matrix planning
//!
//! Expands a `RunConfig` into a flat, ordered sequence of `Job`s by taking
//! the Cartesian product of tasks × models × phase-iterations (and,
//! for detection workflows with a non-empty vulnerability list,
//! vulnerability type as a fourth factor), then repeating each tuple
//! `trials_per_config` times. Mirrors `run_parallel.py::generate_jobs`.

use crate::config::RunConfig;
use crate::job::{Job, ModelChoice};
use itertools::iproduct;

/// Generate the ordered job list for a run. Order within the product is
/// lexicographic by factor order: tasks, then models, then phase
/// iterations, then (when present) vulnerability type.
pub fn generate_jobs(config: &RunConfig) -> Vec<Job> {
    let include_vuln = config.is_detection_workflow() && !config.vulnerability_type.is_empty();

    let mut jobs = Vec::new();

    if config.tasks.is_empty() || config.models.is_empty() || config.trials_per_config == 0 {
        return jobs;
    }

    let vuln_factor: Vec<Option<String>> = if include_vuln {
        config.vulnerability_type.iter().cloned().map(Some).collect()
    } else {
        vec![None]
    };

    for (task, model, iters, vuln) in iproduct!(
        config.tasks.iter(),
        config.models.iter(),
        config.phase_iterations.0.iter(),
        vuln_factor.iter()
    ) {
        let model_choice = if config.use_mock_model {
            ModelChoice::Mock
        } else {
            ModelChoice::Named(model.name.clone())
        };

        for _trial in 0..config.trials_per_config {
            jobs.push(Job {
                workflow_type: config.workflow_type.clone(),
                task_dir: task.task_dir.clone(),
                bounty_number: task.bounty_number.clone(),
                model: model_choice.clone(),
                phase_iterations: *iters,
                vulnerability_type: vuln.clone(),
            });
        }
    }

    jobs
}

/// Group jobs into parallel-safe lists. Since every job's docker-compose
/// host ports are remapped to 0 by the Isolation Rewriter, there are no
/// port collisions even for the same task_dir+bounty — so every job gets
/// its own singleton group today. The grouping seam is preserved so a
/// future policy can coalesce port-conflicting jobs into sequential
/// chains within a group.
pub fn plan_groups(jobs: Vec<Job>) -> Vec<Vec<Job>> {
    jobs.into_iter().map(|job| vec![job]).collect()
}
