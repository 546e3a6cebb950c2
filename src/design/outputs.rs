//! Detection of output directories created by the external tools.
//!
//! The tools do not say where they wrote their results. They create a
//! directory named `<output_name>_<suffix>` under the working root, so the
//! best available evidence is a before/after listing of that root plus the
//! modification times of matching directories.
//!
//! # Concurrency hazard
//!
//! The working root is shared by every invocation. If two invocations
//! overlap, directories created by one land in the other's diff window, and
//! [`OutputTracker::latest`] may return a directory created by an unrelated
//! run that used the same prefix. Nothing here guards against that.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::error::{DesignError, DesignResult};
use super::workspace::Workspace;

/// Separator between an output name and the suffix the tools append.
pub const NAME_SEPARATOR: char = '_';

/// Names of the immediate subdirectories of the working root at one instant.
pub type DirectorySnapshot = BTreeSet<String>;

/// Observes subdirectories of a workspace's root.
#[derive(Debug, Clone)]
pub struct OutputTracker {
    root: PathBuf,
}

impl OutputTracker {
    /// Creates a tracker for the given workspace.
    #[must_use]
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            root: workspace.root().to_path_buf(),
        }
    }

    /// Lists the names of the root's immediate subdirectories.
    ///
    /// Entries whose names are not valid UTF-8 are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::Listing`] if the root cannot be read.
    pub fn snapshot(&self) -> DesignResult<DirectorySnapshot> {
        Ok(self
            .directories()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Returns the sorted names present in `after` but not in `before`.
    #[must_use]
    pub fn diff(before: &DirectorySnapshot, after: &DirectorySnapshot) -> Vec<String> {
        after.difference(before).cloned().collect()
    }

    /// Finds the most recently modified directory named `<prefix>_...`.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::Listing`] if the root cannot be read.
    pub fn latest(&self, prefix: &str) -> DesignResult<Option<PathBuf>> {
        let name = select_latest(self.directories()?, prefix);
        Ok(name.map(|n| self.root.join(n)))
    }

    /// Subdirectory names with their modification times.
    ///
    /// Directories whose metadata cannot be read get the Unix epoch, which
    /// ranks them below anything with a real timestamp.
    fn directories(&self) -> DesignResult<Vec<(String, SystemTime)>> {
        let entries = fs::read_dir(&self.root).map_err(|e| DesignError::Listing {
            path: self.root.clone(),
            source: e,
        })?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DesignError::Listing {
                path: self.root.clone(),
                source: e,
            })?;
            let path = entry.path();
            if !is_dir(&path) {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            dirs.push((name, modified));
        }
        Ok(dirs)
    }
}

/// Follows symlinks, like a plain `is_dir` check on the path.
fn is_dir(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_dir())
}

/// Picks the newest candidate whose name starts with `<prefix>_`.
///
/// Equal timestamps are broken by taking the lexicographically greatest
/// name, so the answer does not depend on directory iteration order.
#[must_use]
pub fn select_latest<I>(candidates: I, prefix: &str) -> Option<String>
where
    I: IntoIterator<Item = (String, SystemTime)>,
{
    let wanted = format!("{prefix}{NAME_SEPARATOR}");
    candidates
        .into_iter()
        .filter(|(name, _)| name.starts_with(&wanted))
        .max_by(|(a_name, a_time), (b_name, b_time)| {
            a_time.cmp(b_time).then_with(|| a_name.cmp(b_name))
        })
        .map(|(name, _)| name)
}
