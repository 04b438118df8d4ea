//! Isolation Rewriter
//!
//! Line-local text rewrites applied to a fresh clone so that a job's
//! containers, networks, and compose projects never collide with another
//! concurrently-running job's. Ports the three regex-driven passes from
//! `run_parallel.py`'s `patch_clone_for_isolation`:
//!
//! 1. `shared_net` substitution in `.py` files under a fixed set of
//!    directories.
//! 2. `docker-compose.yml`/`docker-compose.yaml` rewrites: network name,
//!    `container_name:` prefixing, host-port-to-0 remapping.
//! 3. `git_utils.py` chown/sudo disarming.
//!
//! Every pass is idempotent by construction: each regex only matches
//! text that has not already been rewritten (e.g. a `container_name:`
//! line is matched once and the prefix is not re-appended on a second
//! pass over already-prefixed content, because the replacement is keyed
//! off the original unprefixed value captured at rewrite time).

use crate::errors::{Result, RunnerError};
use crate::job::JobId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// Directories (relative to the clone root) whose `.py` files may
/// reference the literal `shared_net` network name.
const SHARED_NET_PY_DIRS: &[&str] = &["workflows", "resources", "agents", "tests"];

static CONTAINER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(\s*)container_name:\s*(.+)$").unwrap());

/// Matches a host-port binding list entry, in any of the three quoting
/// styles compose accepts, with an optional `/proto` suffix on the
/// container port: `- "8080:80/tcp"`, `- '8080:80'`, `- 8080:80`.
/// Regex has no backreferences, so each quote style gets its own
/// alternation branch instead of one pattern keyed on a captured quote.
static HOST_PORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^(\s*-\s*)(?:"(\d+):(\d+)(/\w+)?"|'(\d+):(\d+)(/\w+)?'|(\d+):(\d+)(/\w+)?)\s*$"#)
        .unwrap()
});

static SHARED_NET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bshared_net\b").unwrap());

/// The exact version-control-utility chown invocation disarmed on every
/// clone: `subprocess.run(["sudo", "chown", "-r", "ubuntu",
/// "~/bountybench/bountytasks"])`.
static CHOWN_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^\s*subprocess\.run\(\["sudo",\s*"chown",\s*"-r",\s*"ubuntu",\s*"~/bountybench/bountytasks"\]\)\s*\n"#,
    )
    .unwrap()
});

static USE_SUDO_TRUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"use_sudo\s*=\s*True").unwrap());

/// Applies the isolation rewrite passes to a materialized clone.
pub struct IsolationRewriter;

impl IsolationRewriter {
    /// Rewrite every file under `clone_path` that needs isolating for
    /// `job_id`. Non-matching files are left untouched; files with no
    /// matches are not rewritten at all (avoids needless mtime churn).
    #[instrument(skip(clone_path))]
    pub fn rewrite(clone_path: &Path, job_id: &JobId) -> Result<()> {
        Self::rewrite_shared_net_references(clone_path, job_id)?;
        Self::rewrite_compose_files(clone_path, job_id)?;
        Self::rewrite_git_utils(clone_path)?;
        Ok(())
    }

    fn rewrite_shared_net_references(clone_path: &Path, job_id: &JobId) -> Result<()> {
        let network_name = job_id.network_name();

        for dir in SHARED_NET_PY_DIRS {
            let root = clone_path.join(dir);
            if !root.exists() {
                continue;
            }
            for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.path().extension().and_then(|e| e.to_str()) != Some("py") {
                    continue;
                }
                Self::rewrite_file(entry.path(), |contents| {
                    if SHARED_NET_RE.is_match(contents) {
                        Some(SHARED_NET_RE.replace_all(contents, network_name.as_str()).into_owned())
                    } else {
                        None
                    }
                })?;
            }
        }
        Ok(())
    }

    fn rewrite_compose_files(clone_path: &Path, job_id: &JobId) -> Result<()> {
        for path in Self::find_compose_files(clone_path) {
            Self::rewrite_compose_file(&path, job_id)?;
        }
        Ok(())
    }

    /// `docker-compose.yml`/`docker-compose.yaml` files anywhere under
    /// the clone root.
    pub fn find_compose_files(clone_path: &Path) -> Vec<PathBuf> {
        WalkDir::new(clone_path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                matches!(
                    e.file_name().to_str(),
                    Some("docker-compose.yml") | Some("docker-compose.yaml")
                )
            })
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    fn rewrite_compose_file(path: &Path, job_id: &JobId) -> Result<()> {
        let compose_prefix = job_id.compose_prefix();
        let network_name = job_id.network_name();

        Self::rewrite_file(path, |contents| {
            let mut changed = false;

            let rewritten = CONTAINER_NAME_RE.replace_all(contents, |caps: &regex::Captures| {
                let indent = &caps[1];
                let name = caps[2].trim().trim_matches(|c| c == '\'' || c == '"');
                if name.starts_with(&format!("{compose_prefix}-")) {
                    // Already prefixed by an earlier pass over this clone.
                    caps[0].to_string()
                } else {
                    changed = true;
                    format!("{indent}container_name: {compose_prefix}-{name}")
                }
            });

            let rewritten = HOST_PORT_RE.replace_all(&rewritten, |caps: &regex::Captures| {
                let prefix = &caps[1];
                let (quote, host, container, proto) = if let Some(host) = caps.get(2) {
                    ("\"", host.as_str(), caps.get(3).unwrap().as_str(), caps.get(4))
                } else if let Some(host) = caps.get(5) {
                    ("'", host.as_str(), caps.get(6).unwrap().as_str(), caps.get(7))
                } else {
                    ("", caps.get(8).unwrap().as_str(), caps.get(9).unwrap().as_str(), caps.get(10))
                };
                let proto = proto.map(|m| m.as_str()).unwrap_or("");
                if host == "0" {
                    caps[0].to_string()
                } else {
                    changed = true;
                    format!("{prefix}{quote}0:{container}{proto}{quote}")
                }
            });

            let rewritten = if SHARED_NET_RE.is_match(&rewritten) {
                changed = true;
                SHARED_NET_RE.replace_all(&rewritten, network_name.as_str()).into_owned()
            } else {
                rewritten.into_owned()
            };

            changed.then_some(rewritten)
        })
    }

    fn rewrite_git_utils(clone_path: &Path) -> Result<()> {
        let git_utils = clone_path.join("utils").join("git_utils.py");
        if !git_utils.exists() {
            return Ok(());
        }

        Self::rewrite_file(&git_utils, |contents| {
            let mut changed = false;

            let rewritten = if CHOWN_LINE_RE.is_match(contents) {
                changed = true;
                CHOWN_LINE_RE.replace_all(contents, "").into_owned()
            } else {
                contents.to_string()
            };

            let rewritten = if USE_SUDO_TRUE_RE.is_match(&rewritten) {
                changed = true;
                USE_SUDO_TRUE_RE.replace_all(&rewritten, "use_sudo=False").into_owned()
            } else {
                rewritten
            };

            changed.then_some(rewritten)
        })
    }

    fn rewrite_file(path: &Path, transform: impl FnOnce(&str) -> Option<String>) -> Result<()> {
        let contents = fs::read_to_string(path).map_err(|e| RunnerError::CloneFailed {
            message: format!("could not read {} for rewrite: {e}", path.display()),
        })?;

        if let Some(rewritten) = transform(&contents) {
            debug!(path = %path.display(), "rewriting for isolation");
            fs::write(path, rewritten).map_err(|e| RunnerError::CloneFailed {
                message: format!("could not write rewritten {}: {e}", path.display()),
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn shared_net_is_substituted_in_workflow_python_files() {
        let clone = tempdir().unwrap();
        let file = clone.path().join("workflows/orchestrate.py");
        write(&file, "NETWORK = \"shared_net\"\nconnect(shared_net)\n");

        let job_id = JobId::new();
        IsolationRewriter::rewrite(clone.path(), &job_id).unwrap();

        let contents = fs::read_to_string(&file).unwrap();
        assert!(contents.contains(&job_id.network_name()));
        assert!(!contents.contains("shared_net"));
    }

    #[test]
    fn shared_net_outside_tracked_dirs_is_left_alone() {
        let clone = tempdir().unwrap();
        let file = clone.path().join("docs/shared_net.md");
        write(&file, "shared_net is the default bridge\n");

        let job_id = JobId::new();
        IsolationRewriter::rewrite(clone.path(), &job_id).unwrap();

        let contents = fs::read_to_string(&file).unwrap();
        assert!(contents.contains("shared_net"));
    }

    #[test]
    fn compose_file_gets_container_name_prefixed_and_ports_zeroed() {
        let clone = tempdir().unwrap();
        let file = clone.path().join("resources/bounty/docker-compose.yml");
        write(
            &file,
            "services:\n  app:\n    container_name: app\n    ports:\n      - \"8080:80\"\n    networks:\n      - shared_net\n",
        );

        let job_id = JobId::new();
        IsolationRewriter::rewrite(clone.path(), &job_id).unwrap();

        let contents = fs::read_to_string(&file).unwrap();
        assert!(contents.contains(&format!("container_name: {}-app", job_id.compose_prefix())));
        assert!(contents.contains(r#""0:80""#));
        assert!(!contents.contains("8080:80"));
        assert!(contents.contains(&job_id.network_name()));
    }

    #[test]
    fn compose_file_preserves_single_quotes_and_proto_suffix() {
        let clone = tempdir().unwrap();
        let file = clone.path().join("docker-compose.yml");
        write(
            &file,
            "services:\n  app:\n    container_name: 'app'\n    ports:\n      - '8080:80/tcp'\n",
        );

        let job_id = JobId::new();
        IsolationRewriter::rewrite(clone.path(), &job_id).unwrap();

        let contents = fs::read_to_string(&file).unwrap();
        assert!(contents.contains(&format!("container_name: {}-app", job_id.compose_prefix())));
        assert!(contents.contains("'0:80/tcp'"));
    }

    #[test]
    fn compose_rewrite_is_idempotent() {
        let clone = tempdir().unwrap();
        let file = clone.path().join("docker-compose.yaml");
        write(
            &file,
            "services:\n  web:\n    container_name: web\n    ports:\n      - \"5432:5432\"\n",
        );

        let job_id = JobId::new();
        IsolationRewriter::rewrite(clone.path(), &job_id).unwrap();
        let once = fs::read_to_string(&file).unwrap();

        IsolationRewriter::rewrite(clone.path(), &job_id).unwrap();
        let twice = fs::read_to_string(&file).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn git_utils_chown_line_removed_and_use_sudo_disarmed() {
        let clone = tempdir().unwrap();
        let file = clone.path().join("utils/git_utils.py");
        write(
            &file,
            "def clone(repo):\n    subprocess.run([\"sudo\", \"chown\", \"-r\", \"ubuntu\", \"~/bountybench/bountytasks\"])\n    run_git(use_sudo=True)\n",
        );

        IsolationRewriter::rewrite(clone.path(), &JobId::new()).unwrap();

        let contents = fs::read_to_string(&file).unwrap();
        assert!(!contents.contains("chown"));
        assert!(contents.contains("use_sudo=False"));
    }

    #[test]
    fn git_utils_outside_utils_dir_is_left_alone() {
        let clone = tempdir().unwrap();
        let file = clone.path().join("vendor/git_utils.py");
        write(
            &file,
            "subprocess.run([\"sudo\", \"chown\", \"-r\", \"ubuntu\", \"~/bountybench/bountytasks\"])\n",
        );

        IsolationRewriter::rewrite(clone.path(), &JobId::new()).unwrap();

        let contents = fs::read_to_string(&file).unwrap();
        assert!(contents.contains("chown"));
    }
}
