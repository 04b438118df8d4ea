//! Run summary reporting
//!
//! Prints the human-facing run summary to stdout and decides the
//! process exit code, while everything diagnostic goes through
//! `tracing`. Mirrors `run_parallel.py`'s `run_all` summary block:
//! a per-job status line followed by an aggregate count, with a
//! non-zero exit whenever any job did not complete successfully.

use crate::job::{JobResult, JobStatus};

/// Prints the per-job and aggregate summary to stdout.
pub fn print_summary(results: &[JobResult]) {
    for result in results {
        println!(
            "{} {} (task={} bounty={} model={:?}) in {:.1}s",
            result.status.marker(),
            result.job_id,
            result.job.task_dir,
            result.job.bounty_number,
            result.job.model,
            result.duration_secs,
        );
        if let Some(error) = &result.error {
            println!("       error: {error}");
        }
    }

    let completed = count(results, JobStatus::Completed);
    let failed = count(results, JobStatus::Failed);
    let errored = count(results, JobStatus::Error);

    println!(
        "\n{} completed, {} failed, {} errored ({} total)",
        completed,
        failed,
        errored,
        results.len()
    );
}

fn count(results: &[JobResult], status: JobStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}

/// The process exit code for a finished run: `0` only when every job
/// completed successfully.
pub fn exit_code(results: &[JobResult]) -> i32 {
    if results.iter().all(|r| r.status == JobStatus::Completed) {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobId, ModelChoice};

    fn sample_result(status: JobStatus) -> JobResult {
        JobResult {
            job_id: JobId::new(),
            job: Job {
                workflow_type: "exploit_workflow".to_string(),
                task_dir: "bountytasks/lunary".to_string(),
                bounty_number: "0".to_string(),
                model: ModelChoice::Mock,
                phase_iterations: 1,
                vulnerability_type: None,
            },
            status,
            exit_code: Some(0),
            duration_secs: 1.5,
            clone_path: None,
            error: None,
        }
    }

    #[test]
    fn exit_code_is_zero_only_when_all_jobs_completed() {
        let all_ok = vec![sample_result(JobStatus::Completed), sample_result(JobStatus::Completed)];
        assert_eq!(exit_code(&all_ok), 0);

        let one_failed = vec![sample_result(JobStatus::Completed), sample_result(JobStatus::Failed)];
        assert_eq!(exit_code(&one_failed), 1);

        let empty: Vec<JobResult> = vec![];
        assert_eq!(exit_code(&empty), 0);
    }

    #[test]
    fn exit_code_is_nonzero_on_errored_jobs() {
        let results = vec![sample_result(JobStatus::Error)];
        assert_eq!(exit_code(&results), 1);
    }
}
