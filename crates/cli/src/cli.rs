use clap::Parser;
use std::path::PathBuf;

fn default_workdir() -> PathBuf {
    std::env::temp_dir().join("bountybench_parallel")
}

/// Run a matrix of bounty workflow jobs in parallel, each isolated in
/// its own clone, docker network, and compose project.
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"), version, about)]
pub struct Cli {
    /// Path to the YAML run configuration.
    pub config: PathBuf,

    /// Maximum number of job groups to run concurrently.
    #[arg(short = 'j', long = "max-parallel", default_value_t = 20)]
    pub max_parallel: usize,

    /// Directory where clones, logs, and the run manifest are written.
    #[arg(short = 'w', long = "workdir", default_value_os_t = default_workdir())]
    pub workdir: PathBuf,

    /// Keep each job's clone directory around after it finishes instead
    /// of deleting it.
    #[arg(long)]
    pub keep_clones: bool,
}
