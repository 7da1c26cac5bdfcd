//! Unified path management for OPAL state files.
//!
//! All persisted engine state lives under one platform config directory so
//! the layout is predictable across Linux, macOS, and Windows.

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Unified path management for OPAL.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/opal/              # Config directory
/// ├── config.toml              # Engine settings
/// └── state/                   # Key-value store files
///     └── snapshot.json        # Persisted engine snapshot
/// ```
pub struct OpalPaths;

impl OpalPaths {
    /// Returns the OPAL configuration directory.
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: Path to config directory (e.g., `~/.config/opal/`)
    /// - `Err(PathError::HomeDirNotFound)`: Could not determine directory
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join("opal"))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the directory backing the key-value store.
    pub fn state_dir() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("state"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let config_dir = OpalPaths::config_dir().unwrap();
        assert!(config_dir.ends_with("opal"));
    }

    #[test]
    fn test_config_file() {
        let config_file = OpalPaths::config_file().unwrap();
        assert!(config_file.ends_with("config.toml"));
        let config_dir = OpalPaths::config_dir().unwrap();
        assert!(config_file.starts_with(&config_dir));
    }

    #[test]
    fn test_state_dir() {
        let state_dir = OpalPaths::state_dir().unwrap();
        assert!(state_dir.ends_with("state"));
    }
}
