//! Container engine integration
//!
//! A thin async wrapper around the `docker` CLI, following the same shape
//! as the teacher's `CliDocker`: every operation shells out via
//! `std::process::Command` inside `tokio::task::spawn_blocking`, bounded
//! by a fixed timeout. Scoped to exactly the teardown operations
//! `run_parallel.py`'s `run_job` cleanup block performs — this
//! orchestrator never builds images or execs into running containers.

use crate::errors::{Result, RunnerError};
use std::process::Command;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Container/network lifecycle operations a job needs from the engine.
/// A trait so tests can substitute `FakeContainerEngine` instead of
/// requiring a live Docker daemon.
#[allow(async_fn_in_trait)]
pub trait ContainerEngine: Send + Sync {
    /// `docker network create <name>`. Best-effort: a network that
    /// already exists is not an error.
    async fn create_network(&self, name: &str) -> Result<()>;

    /// `docker network rm <name>`. Best-effort: a missing network is not
    /// an error.
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Containers attached to `network`, by id.
    async fn containers_on_network(&self, network: &str) -> Result<Vec<String>>;

    /// Containers labeled with the given compose-project name, by id.
    async fn containers_with_project_label(&self, project: &str) -> Result<Vec<String>>;

    /// `docker rm -f` on each id. Failures for individual ids are logged
    /// and otherwise ignored — a container that already exited or was
    /// already removed does not fail job cleanup.
    async fn force_remove_containers(&self, ids: &[String]) -> Result<()>;

    /// `docker compose -p <project> down -v --remove-orphans`, run with
    /// `compose_dir` as the working directory so compose discovers the
    /// file there by its default naming convention.
    async fn compose_down(&self, compose_dir: &str, project: &str) -> Result<()>;
}

/// `docker`-CLI-backed implementation.
pub struct CliContainerEngine {
    docker_path: String,
}

impl CliContainerEngine {
    pub fn new() -> Self {
        Self {
            docker_path: "docker".to_string(),
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output> {
        self.run_in(args, None).await
    }

    async fn run_in(&self, args: Vec<String>, cwd: Option<String>) -> Result<std::process::Output> {
        let docker_path = self.docker_path.clone();
        let joined = args.join(" ");

        let output = timeout(
            COMMAND_TIMEOUT,
            tokio::task::spawn_blocking(move || {
                let mut command = Command::new(&docker_path);
                command.args(&args);
                if let Some(dir) = &cwd {
                    command.current_dir(dir);
                }
                command.output()
            }),
        )
        .await
        .map_err(|_| RunnerError::ContainerEngine {
            message: format!("docker {joined} timed out after {COMMAND_TIMEOUT:?}"),
        })?
        .map_err(|e| RunnerError::ContainerEngine {
            message: format!("docker {joined} task join error: {e}"),
        })?
        .map_err(|e| RunnerError::ContainerEngine {
            message: format!("docker {joined} could not be spawned: {e}"),
        })?;

        Ok(output)
    }
}

impl Default for CliContainerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerEngine for CliContainerEngine {
    #[instrument(skip(self))]
    async fn create_network(&self, name: &str) -> Result<()> {
        debug!(network = name, "creating job network");
        let output = self.run(vec!["network".into(), "create".into(), name.into()]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("already exists") {
                return Ok(());
            }
            return Err(RunnerError::ContainerEngine {
                message: format!("docker network create {name} failed: {stderr}"),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_network(&self, name: &str) -> Result<()> {
        debug!(network = name, "removing job network");
        let output = self.run(vec!["network".into(), "rm".into(), name.into()]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not found") {
                return Ok(());
            }
            warn!(network = name, error = %stderr, "failed to remove network");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn containers_on_network(&self, network: &str) -> Result<Vec<String>> {
        let output = self
            .run(vec![
                "ps".into(),
                "-a".into(),
                "--filter".into(),
                format!("network={network}"),
                "--format".into(),
                "{{.ID}}".into(),
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunnerError::ContainerEngine {
                message: format!("docker ps --filter network={network} failed: {stderr}"),
            });
        }

        Ok(Self::parse_id_lines(&output.stdout))
    }

    #[instrument(skip(self))]
    async fn containers_with_project_label(&self, project: &str) -> Result<Vec<String>> {
        let output = self
            .run(vec![
                "ps".into(),
                "-a".into(),
                "--filter".into(),
                format!("label=com.docker.compose.project={project}"),
                "--format".into(),
                "{{.ID}}".into(),
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunnerError::ContainerEngine {
                message: format!(
                    "docker ps --filter label=com.docker.compose.project={project} failed: {stderr}"
                ),
            });
        }

        Ok(Self::parse_id_lines(&output.stdout))
    }

    #[instrument(skip(self))]
    async fn force_remove_containers(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut args = vec!["rm".to_string(), "-f".to_string()];
        args.extend(ids.iter().cloned());
        let output = self.run(args).await?;
        if !output.status.success() {
            warn!(
                error = %String::from_utf8_lossy(&output.stderr),
                "some containers failed to force-remove"
            );
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn compose_down(&self, compose_dir: &str, project: &str) -> Result<()> {
        let output = self
            .run_in(
                vec![
                    "compose".into(),
                    "-p".into(),
                    project.into(),
                    "down".into(),
                    "-v".into(),
                    "--remove-orphans".into(),
                ],
                Some(compose_dir.to_string()),
            )
            .await?;

        if !output.status.success() {
            warn!(
                compose_dir,
                project,
                error = %String::from_utf8_lossy(&output.stderr),
                "compose down reported an error"
            );
        }
        Ok(())
    }
}

impl CliContainerEngine {
    fn parse_id_lines(stdout: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// In-memory double for tests that exercise cleanup ordering without
    /// a live Docker daemon.
    #[derive(Default)]
    pub struct FakeContainerEngine {
        pub networks: Mutex<Vec<String>>,
        pub removed_containers: Mutex<Vec<String>>,
        pub compose_down_calls: Mutex<Vec<(String, String)>>,
        pub network_containers: Mutex<Vec<String>>,
        pub project_labeled_containers: Mutex<Vec<String>>,
    }

    impl ContainerEngine for FakeContainerEngine {
        async fn create_network(&self, name: &str) -> Result<()> {
            self.networks.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn remove_network(&self, name: &str) -> Result<()> {
            self.networks.lock().unwrap().retain(|n| n != name);
            Ok(())
        }

        async fn containers_on_network(&self, _network: &str) -> Result<Vec<String>> {
            Ok(self.network_containers.lock().unwrap().clone())
        }

        async fn containers_with_project_label(&self, _project: &str) -> Result<Vec<String>> {
            Ok(self.project_labeled_containers.lock().unwrap().clone())
        }

        async fn force_remove_containers(&self, ids: &[String]) -> Result<()> {
            self.removed_containers.lock().unwrap().extend(ids.iter().cloned());
            Ok(())
        }

        async fn compose_down(&self, compose_dir: &str, project: &str) -> Result<()> {
            self.compose_down_calls
                .lock()
                .unwrap()
                .push((compose_dir.to_string(), project.to_string()));
            Ok(())
        }
    }
}
