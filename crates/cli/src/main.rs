use anyhow::Context;
use clap::Parser;
use parabench_core::config::ConfigLoader;
use parabench_core::container_engine::CliContainerEngine;
use parabench_core::manifest::RunManifest;
use parabench_core::planner::generate_jobs;
use parabench_core::reporter::{exit_code, print_summary};
use parabench_core::runner::RunnerContext;
use parabench_core::scheduler::Scheduler;
use std::path::Path;
use tracing::info;

mod cli;

fn main() -> anyhow::Result<()> {
    parabench_core::logging::init()?;

    let args = cli::Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build the async runtime")?;

    let code = runtime.block_on(run(args))?;
    std::process::exit(code);
}

async fn run(args: cli::Cli) -> anyhow::Result<i32> {
    let config = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    std::fs::create_dir_all(&args.workdir)
        .with_context(|| format!("creating workdir {}", args.workdir.display()))?;

    let source_dir = args
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::env::current_dir().expect("current dir must be accessible"));

    // The parallel_logs/ tree is shared across every job in this run and
    // is deleted and recreated at the start of every run.
    let log_dir = source_dir.join("parallel_logs");
    match std::fs::remove_dir_all(&log_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("clearing log dir {}", log_dir.display())),
    }
    std::fs::create_dir_all(&log_dir).with_context(|| format!("creating log dir {}", log_dir.display()))?;

    let jobs = generate_jobs(&config);
    info!(count = jobs.len(), "planned jobs");

    let manifest_path = log_dir.join("run_manifest.json");
    RunManifest::planned(args.config.clone(), config.clone(), args.max_parallel, jobs.clone())
        .write_to(&manifest_path)
        .context("writing planned manifest")?;

    let engine = CliContainerEngine::new();
    let ctx = RunnerContext {
        source_dir: &source_dir,
        workdir: &args.workdir,
        log_dir: &log_dir,
        engine: &engine,
        keep_clones: args.keep_clones,
    };

    let results = Scheduler::run_all(&ctx, jobs.clone(), args.max_parallel).await;

    RunManifest::planned(args.config, config, args.max_parallel, jobs)
        .with_results(results.clone())
        .write_to(&manifest_path)
        .context("writing final manifest")?;

    print_summary(&results);

    Ok(exit_code(&results))
}
