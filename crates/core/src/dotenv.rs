//! `.env` file loading
//!
//! A minimal `KEY=VALUE` parser for the per-job `.env` file
//! `run_parallel.py`'s `run_job` loads before invoking the workflow
//! child process. Only the subset of dotenv syntax the bounty tasks
//! actually use is supported: one assignment per line, optional
//! surrounding single or double quotes, `#`-prefixed comment lines, and
//! blank lines.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Parse a `.env` file at `path` into a map of environment variables.
/// A missing file yields an empty map rather than an error — most
/// bounty tasks have no `.env` at all.
pub fn load_env_file(path: &Path) -> HashMap<String, String> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return HashMap::new(),
    };

    let mut vars = HashMap::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!(path = %path.display(), lineno = lineno + 1, "skipping malformed .env line");
            continue;
        };

        let key = key.trim();
        let value = unquote(value.trim());
        vars.insert(key.to_string(), value);
    }

    debug!(path = %path.display(), count = vars.len(), "loaded .env file");
    vars
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_empty_map() {
        let dir = tempdir().unwrap();
        let vars = load_env_file(&dir.path().join("does_not_exist.env"));
        assert!(vars.is_empty());
    }

    #[test]
    fn parses_quoted_and_unquoted_values_skipping_comments_and_blanks() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(
            &env_path,
            "# a comment\n\nAPI_KEY=\"sk-abc123\"\nMODEL='mock'\nBARE=plain\n",
        )
        .unwrap();

        let vars = load_env_file(&env_path);
        assert_eq!(vars.get("API_KEY").unwrap(), "sk-abc123");
        assert_eq!(vars.get("MODEL").unwrap(), "mock");
        assert_eq!(vars.get("BARE").unwrap(), "plain");
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, "NOVALUE\nOK=1\n").unwrap();

        let vars = load_env_file(&env_path);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("OK").unwrap(), "1");
    }
}
