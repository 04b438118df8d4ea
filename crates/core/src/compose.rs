//! Compose discovery and teardown
//!
//! Locates the docker-compose files belonging to a job's clone and tears
//! them down through the job's `ContainerEngine`. Mirrors
//! `run_parallel.py`'s `_find_compose_dirs` and the `docker compose down`
//! step of `run_job`'s cleanup block.

use crate::container_engine::ContainerEngine;
use crate::job::JobResources;
use crate::rewrite::IsolationRewriter;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{instrument, warn};

/// Compose files discovered under a clone, paired with the project name
/// they should be torn down under.
pub struct ComposeTeardown;

impl ComposeTeardown {
    /// `docker-compose.yml`/`.yaml` files anywhere under the job's clone.
    pub fn find_compose_files(resources: &JobResources) -> Vec<PathBuf> {
        IsolationRewriter::find_compose_files(&resources.clone_path)
    }

    /// Unique parent directories of every compose file under the job's
    /// clone. A directory holding both `docker-compose.yml` and
    /// `docker-compose.yaml` contributes once.
    pub fn find_compose_dirs(resources: &JobResources) -> Vec<PathBuf> {
        Self::find_compose_files(resources)
            .into_iter()
            .filter_map(|f| f.parent().map(PathBuf::from))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Tear down every compose project found under the clone, one
    /// `compose down` per unique directory. Each failure is logged and
    /// does not prevent the remaining directories (or the rest of job
    /// cleanup) from running.
    #[instrument(skip(engine, resources))]
    pub async fn teardown_all(engine: &dyn ContainerEngine, resources: &JobResources) {
        for compose_dir in Self::find_compose_dirs(resources) {
            let Some(dir_str) = compose_dir.to_str() else {
                warn!(path = ?compose_dir, "compose directory path is not valid UTF-8, skipping");
                continue;
            };
            if let Err(e) = engine.compose_down(dir_str, &resources.compose_prefix).await {
                warn!(compose_dir = dir_str, error = %e, "compose down failed");
            }
        }
    }
}
