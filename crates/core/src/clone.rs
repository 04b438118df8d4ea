//! Clone Manager
//!
//! Materializes and removes isolated working copies of the source tree.
//! Grounded on `run_parallel.py`'s `create_clone`/`cleanup_clone`: a deep
//! copy that preserves symlinks as links, preserves `.git`, and skips a
//! fixed set of large/regenerable directories by basename anywhere in the
//! tree.

use crate::errors::{Result, RunnerError};
use crate::job::JobId;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Basenames skipped anywhere in the tree when cloning — version
/// dependency caches and virtual environments the workflow regenerates
/// or never touches.
pub const CLONE_SKIP_DIRS: &[&str] = &["venv", ".venv", "node_modules", "__pycache__", ".mypy_cache"];

fn is_skip_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| CLONE_SKIP_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Materializes and removes per-job working copies.
pub struct CloneManager;

impl CloneManager {
    /// Produce a deep file-tree copy at `<workdir>/bb_job_<job_id>`.
    ///
    /// Symbolic links are preserved as links (never dereferenced).
    /// `.git` is never skipped, even though it may be large. This is
    /// blocking I/O; callers running inside a cooperative scheduler
    /// should offload it to a worker pool (see `spawn_blocking` callers
    /// in `runner.rs`).
    #[instrument(skip(source))]
    pub fn create(source: &Path, workdir: &Path, job_id: &JobId) -> Result<PathBuf> {
        let clone_path = workdir.join(job_id.clone_dirname());
        debug!(clone_path = %clone_path.display(), "cloning source tree");

        Self::copy_tree(source, &clone_path)?;

        Ok(clone_path)
    }

    fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest).map_err(|e| RunnerError::CloneFailed {
            message: format!("could not create clone dir {}: {e}", dest.display()),
        })?;

        let walker = WalkDir::new(source).min_depth(1).into_iter().filter_entry(|e| {
            // `.git` must always survive, including everything under it;
            // everything else in the skip set is pruned wherever in the
            // tree it appears.
            e.file_name() == std::ffi::OsStr::new(".git") || !is_skip_dir(e)
        });

        for entry in walker {
            let entry = entry.map_err(|e| RunnerError::CloneFailed {
                message: format!("walk error under {}: {e}", source.display()),
            })?;

            let rel = entry
                .path()
                .strip_prefix(source)
                .expect("walkdir yields paths under its root");
            let target = dest.join(rel);

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                Self::copy_symlink(entry.path(), &target)?;
            } else if file_type.is_dir() {
                fs::create_dir_all(&target).map_err(|e| RunnerError::CloneFailed {
                    message: format!("could not create dir {}: {e}", target.display()),
                })?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| RunnerError::CloneFailed {
                        message: format!("could not create dir {}: {e}", parent.display()),
                    })?;
                }
                fs::copy(entry.path(), &target).map_err(|e| RunnerError::CloneFailed {
                    message: format!(
                        "could not copy {} -> {}: {e}",
                        entry.path().display(),
                        target.display()
                    ),
                })?;
            }
        }

        Ok(())
    }

    #[cfg(unix)]
    fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
        let link_target = fs::read_link(source).map_err(|e| RunnerError::CloneFailed {
            message: format!("could not read symlink {}: {e}", source.display()),
        })?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| RunnerError::CloneFailed {
                message: format!("could not create dir {}: {e}", parent.display()),
            })?;
        }
        std::os::unix::fs::symlink(&link_target, target).map_err(|e| RunnerError::CloneFailed {
            message: format!("could not create symlink {}: {e}", target.display()),
        })
    }

    #[cfg(not(unix))]
    fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
        let link_target = fs::read_link(source).map_err(|e| RunnerError::CloneFailed {
            message: format!("could not read symlink {}: {e}", source.display()),
        })?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).ok();
        }
        if source.is_dir() {
            std::os::windows::fs::symlink_dir(&link_target, target)
        } else {
            std::os::windows::fs::symlink_file(&link_target, target)
        }
        .map_err(|e| RunnerError::CloneFailed {
            message: format!("could not create symlink {}: {e}", target.display()),
        })
    }

    /// Best-effort recursive removal. Failures are logged and swallowed —
    /// a clone left behind on disk never fails a job.
    #[instrument]
    pub fn destroy(clone_path: &Path) {
        if let Err(e) = fs::remove_dir_all(clone_path) {
            warn!(clone_path = %clone_path.display(), error = %e, "failed to remove clone directory");
        }
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
    fn clone_preserves_git_and_skips_caches() {
        let src = tempdir().unwrap();
        let workdir = tempdir().unwrap();

        write(&src.path().join(".git/HEAD"), "ref: refs/heads/main\n");
        write(&src.path().join("workflows/utils.py"), "shared_net = 1\n");
        write(&src.path().join("node_modules/pkg/index.js"), "module.exports = {}\n");
        write(&src.path().join("venv/bin/python"), "#!/bin/sh\n");

        let job_id = JobId::new();
        let clone_path = CloneManager::create(src.path(), workdir.path(), &job_id).unwrap();

        assert!(clone_path.join(".git/HEAD").exists());
        assert!(clone_path.join("workflows/utils.py").exists());
        assert!(!clone_path.join("node_modules").exists());
        assert!(!clone_path.join("venv").exists());

        CloneManager::destroy(&clone_path);
        assert!(!clone_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn clone_preserves_symlinks_as_links() {
        let src = tempdir().unwrap();
        let workdir = tempdir().unwrap();

        write(&src.path().join("real/target.txt"), "hi\n");
        std::os::unix::fs::symlink("real/target.txt", src.path().join("link.txt")).unwrap();

        let job_id = JobId::new();
        let clone_path = CloneManager::create(src.path(), workdir.path(), &job_id).unwrap();

        let cloned_link = clone_path.join("link.txt");
        assert!(cloned_link
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false));
    }

    #[cfg(unix)]
    #[test]
    fn clone_preserves_a_symlinked_git_directory() {
        let src = tempdir().unwrap();
        let workdir = tempdir().unwrap();

        write(&src.path().join("real_git/HEAD"), "ref: refs/heads/main\n");
        std::os::unix::fs::symlink("real_git", src.path().join(".git")).unwrap();

        let job_id = JobId::new();
        let clone_path = CloneManager::create(src.path(), workdir.path(), &job_id).unwrap();

        let cloned_git = clone_path.join(".git");
        assert!(cloned_git
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false));
    }

    #[test]
    fn destroy_is_best_effort_on_missing_path() {
        let missing = PathBuf::from("/nonexistent/bb_job_deadbeef00");
        // Must not panic.
        CloneManager::destroy(&missing);
    }
}
