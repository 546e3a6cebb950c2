//! The working root shared by the external tools.

use std::fs;
use std::path::{Path, PathBuf};

/// Default name of the hidden directory that holds staged input files.
pub const DEFAULT_STAGING_DIR: &str = ".mcp_inputs";

/// Filesystem layout for tool invocations.
///
/// The external tools run with the working root as their current directory
/// and create their output directories directly beneath it. Staged inputs
/// live in a hidden subdirectory of the same root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    staging_dir: PathBuf,
}

impl Workspace {
    /// Creates a workspace rooted at `root` with the default staging directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_staging_dir(root, DEFAULT_STAGING_DIR)
    }

    /// Creates a workspace with a custom staging directory name.
    #[must_use]
    pub fn with_staging_dir(root: impl Into<PathBuf>, staging_dir_name: &str) -> Self {
        let root = root.into();
        let staging_dir = root.join(staging_dir_name);
        Self { root, staging_dir }
    }

    /// The working root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The staging directory for input files.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Resolves a path reported by a tool against the working root.
    ///
    /// Absolute paths are returned unchanged.
    #[must_use]
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Whether `path` is an existing directory strictly below the root.
    ///
    /// Both sides are canonicalised, so `..` components and symlinks that
    /// lead out of the root are rejected. The root itself is not inside.
    #[must_use]
    pub fn is_output_dir(&self, path: &Path) -> bool {
        let (Ok(root), Ok(dir)) = (fs::canonicalize(&self.root), fs::canonicalize(path)) else {
            return false;
        };
        dir != root && dir.starts_with(&root) && dir.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_staging_dir_is_hidden_child_of_root() {
        let ws = Workspace::new("/srv/designs");
        assert_eq!(ws.root(), Path::new("/srv/designs"));
        assert_eq!(ws.staging_dir(), Path::new("/srv/designs/.mcp_inputs"));
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let ws = Workspace::with_staging_dir("/srv/designs", ".inputs");
        assert_eq!(ws.staging_dir(), Path::new("/srv/designs/.inputs"));
        assert_eq!(ws.resolve("out_1"), PathBuf::from("/srv/designs/out_1"));
        assert_eq!(ws.resolve("/tmp/out_1"), PathBuf::from("/tmp/out_1"));
    }

    #[test]
    fn output_dir_must_be_strictly_inside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("run_1")).unwrap();
        fs::create_dir(tmp.path().join("elsewhere")).unwrap();
        fs::write(root.join("notes.txt"), "x").unwrap();
        let ws = Workspace::new(&root);

        assert!(ws.is_output_dir(&ws.resolve("run_1")));
        assert!(ws.is_output_dir(&ws.resolve("./run_1/")));
        assert!(!ws.is_output_dir(&ws.resolve(".")));
        assert!(!ws.is_output_dir(&ws.resolve("..")));
        assert!(!ws.is_output_dir(&ws.resolve("../elsewhere")));
        assert!(!ws.is_output_dir(&ws.resolve("/")));
        assert!(!ws.is_output_dir(&ws.resolve("notes.txt")));
        assert!(!ws.is_output_dir(&ws.resolve("missing")));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_not_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::create_dir(tmp.path().join("elsewhere")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("elsewhere"), root.join("run_link")).unwrap();

        let ws = Workspace::new(&root);
        assert!(!ws.is_output_dir(&ws.resolve("run_link")));
    }
}
