//! Staging of normalised input as files the external tools can read.
//!
//! Every invocation writes its input to a fresh file in the workspace's
//! staging directory. Whether that file outlives the invocation is decided by
//! [`StagingPolicy`]: the historical behaviour is to keep it forever.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use super::error::{DesignError, DesignResult};
use super::workspace::Workspace;

/// File suffix for staged sequence input.
pub const FASTA_SUFFIX: &str = ".fasta";

/// What happens to a staged input file once the invocation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagingPolicy {
    /// Leave the file in the staging directory. Nothing ever deletes it.
    #[default]
    Retain,
    /// Delete the file when its [`StagedInput`] is dropped.
    Cleanup,
}

/// A staged input file.
///
/// Under [`StagingPolicy::Cleanup`] the file is removed on drop, including
/// when the invocation fails part way through.
#[derive(Debug)]
pub struct StagedInput {
    path: PathBuf,
    policy: StagingPolicy,
}

impl StagedInput {
    /// Path of the staged file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lifecycle policy for this file.
    #[must_use]
    pub const fn policy(&self) -> StagingPolicy {
        self.policy
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        if self.policy != StagingPolicy::Cleanup {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed staged input"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove staged input"
            ),
        }
    }
}

/// Writes input files into a workspace's staging directory.
#[derive(Debug, Clone)]
pub struct InputStaging {
    dir: PathBuf,
    policy: StagingPolicy,
}

impl InputStaging {
    /// Creates a staging area for the given workspace.
    #[must_use]
    pub fn new(workspace: &Workspace, policy: StagingPolicy) -> Self {
        Self {
            dir: workspace.staging_dir().to_path_buf(),
            policy,
        }
    }

    /// Writes `content` to a new uniquely named file ending in `suffix`.
    ///
    /// The staging directory is created if missing. The file is created
    /// exclusively, so concurrent callers never share a path, and its content
    /// is flushed to disk before the path is handed out.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::Staging`] if the directory or file cannot be
    /// created or written.
    pub fn stage(&self, content: &str, suffix: &str) -> DesignResult<StagedInput> {
        fs::create_dir_all(&self.dir).map_err(|e| DesignError::Staging {
            path: self.dir.clone(),
            source: e,
        })?;

        let name = format!(
            "input_{}_{}{suffix}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            Uuid::new_v4().simple()
        );
        let path = self.dir.join(name);

        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()
        };
        if let Err(e) = write() {
            // A partially written file is useless to the tools.
            let _ = fs::remove_file(&path);
            return Err(DesignError::Staging { path, source: e });
        }

        tracing::debug!(path = %path.display(), bytes = content.len(), "Staged input file");

        Ok(StagedInput {
            path,
            policy: self.policy,
        })
    }
}
