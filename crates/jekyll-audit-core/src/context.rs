//! Explicit execution context.
//!
//! Everything that would otherwise read the process working directory or
//! environment takes an [`ExecContext`] instead, so a run can be pointed at
//! a temporary directory in tests without touching global state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Working directory and environment for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecContext {
    /// Directory that relative paths are resolved against.
    pub cwd: PathBuf,

    /// Environment handed to every subprocess.
    pub env: BTreeMap<String, String>,
}

impl ExecContext {
    /// Context rooted at `cwd` with an empty environment.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    /// Capture the current process working directory and environment.
    ///
    /// Intended to be called once, at the binary's edge.
    pub fn from_process() -> Result<Self> {
        Ok(Self {
            cwd: std::env::current_dir()?,
            env: std::env::vars().collect(),
        })
    }

    /// Add or replace one environment variable.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Resolve a possibly relative path against the context directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}
