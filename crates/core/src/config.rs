//! Run configuration parsing
//!
//! Loads the declarative YAML run description into a typed `RunConfig`.
//! Mirrors `run_parallel.py`'s `_load_config`/`_ensure_list`: a singleton
//! field may appear as either a scalar or a sequence, and missing optional
//! fields default rather than error.

use crate::errors::{Result, RunnerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A single task entry: a task directory and its bounty identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_dir: String,
    #[serde(deserialize_with = "deserialize_bounty_number")]
    pub bounty_number: String,
}

/// A single model entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
}

/// `phase_iterations` may be written as a scalar or a sequence in the
/// YAML document; both normalize to a non-empty `Vec<u32>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntOrList(pub Vec<u32>);

impl<'de> Deserialize<'de> for IntOrList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Scalar(u32),
            List(Vec<u32>),
        }

        match Shape::deserialize(deserializer)? {
            Shape::Scalar(n) => Ok(IntOrList(vec![n])),
            Shape::List(v) => Ok(IntOrList(v)),
        }
    }
}

impl Default for IntOrList {
    fn default() -> Self {
        IntOrList(vec![1])
    }
}

/// `bounty_number` may appear as either a YAML string or a bare integer;
/// the original Python always coerces it with `str(task["bounty_number"])`.
fn deserialize_bounty_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Str(String),
        Int(i64),
    }

    Ok(match Shape::deserialize(deserializer)? {
        Shape::Str(s) => s,
        Shape::Int(n) => n.to_string(),
    })
}

fn default_trials() -> u32 {
    1
}

/// The parsed run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub workflow_type: String,

    #[serde(default = "default_trials")]
    pub trials_per_config: u32,

    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,

    #[serde(default)]
    pub models: Vec<ModelDescriptor>,

    #[serde(default)]
    pub phase_iterations: IntOrList,

    #[serde(default)]
    pub vulnerability_type: Vec<String>,

    #[serde(default)]
    pub use_mock_model: bool,
}

impl RunConfig {
    /// Whether this run's workflow kind is a detection workflow — the only
    /// kind for which `vulnerability_type` is a meaningful planning factor.
    pub fn is_detection_workflow(&self) -> bool {
        self.workflow_type.starts_with("detect_")
    }
}

/// Loads and validates `RunConfig` values from a YAML document on disk.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a `RunConfig` from the given path.
    ///
    /// Returns `RunnerError::ConfigInvalid` when the file is missing,
    /// unreadable, not valid YAML, or missing a required key.
    pub fn load_from_path(path: &Path) -> Result<RunConfig> {
        let contents = fs::read_to_string(path).map_err(|e| RunnerError::ConfigInvalid {
            message: format!("could not read config file {}: {e}", path.display()),
        })?;

        Self::load_from_str(&contents)
    }

    /// Load a `RunConfig` from an in-memory YAML document.
    pub fn load_from_str(contents: &str) -> Result<RunConfig> {
        serde_yaml::from_str(contents).map_err(|e| RunnerError::ConfigInvalid {
            message: format!("invalid run config: {e}"),
        })
    }
}
