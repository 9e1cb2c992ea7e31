//! Path resolution for resync configuration and data files.
//!
//! All resync data is stored in `~/.resync/` unless `RESYNC_HOME` points
//! elsewhere:
//! - `config.yaml` - Main configuration file
//! - `resync.db` - SQLite database holding the operation queue and usage data
//! - `actions.yaml` - Quick action registry

use std::path::PathBuf;

use crate::error::ResyncError;

/// Environment variable that overrides the data root.
pub const HOME_ENV: &str = "RESYNC_HOME";

/// Paths to resync configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.resync/`
    pub root: PathBuf,
    /// Config file: `~/.resync/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.resync/resync.db`
    pub database: PathBuf,
    /// Quick action registry: `~/.resync/actions.yaml`
    pub actions_file: PathBuf,
}

impl Paths {
    /// Resolve paths from `RESYNC_HOME`, falling back to `~/.resync`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `RESYNC_HOME` nor `HOME` is set.
    pub fn new() -> Result<Self, ResyncError> {
        if let Ok(root) = std::env::var(HOME_ENV) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME").map_err(|_| {
            ResyncError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_root(PathBuf::from(home).join(".resync")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("resync.db"),
            actions_file: root.join("actions.yaml"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), ResyncError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                ResyncError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-resync");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("resync.db"));
        assert_eq!(paths.actions_file, root.join("actions.yaml"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested").join("root"));

        paths.ensure_dirs().unwrap();
        assert!(paths.root.exists());

        // Second call is a no-op
        paths.ensure_dirs().unwrap();
    }
}
