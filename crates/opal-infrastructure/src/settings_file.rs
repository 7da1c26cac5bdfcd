//! Engine settings persistence (`config.toml`).
//!
//! Settings live in a TOML file in the platform config directory. A missing
//! file deserializes to defaults and is created on first save.

use crate::paths::OpalPaths;
use opal_core::error::{OpalError, Result};
use opal_core::settings::EngineSettings;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Loads and saves `EngineSettings` as TOML.
pub struct SettingsService {
    path: PathBuf,
}

impl SettingsService {
    /// Creates a service at the default location (`~/.config/opal/config.toml`).
    pub fn default_location() -> Result<Self> {
        let path = OpalPaths::config_file()
            .map_err(|e| OpalError::config(format!("resolve config path: {}", e)))?;
        Ok(Self::new(path))
    }

    /// Creates a service with an explicit file path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Loads settings, falling back to defaults when the file is missing.
    pub async fn load(&self) -> Result<EngineSettings> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(toml::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no config file, using defaults");
                Ok(EngineSettings::default())
            }
            Err(e) => Err(OpalError::io(format!(
                "read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Saves settings, creating parent directories as needed.
    pub async fn save(&self, settings: &EngineSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| OpalError::io(format!("create {}: {}", parent.display(), e)))?;
        }
        let raw = toml::to_string_pretty(settings)?;
        fs::write(&self.path, raw)
            .await
            .map_err(|e| OpalError::io(format!("write {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::settings::SessionSortKey;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let service = SettingsService::new(temp_dir.path().join("config.toml"));

        let settings = service.load().await.unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let service = SettingsService::new(temp_dir.path().join("nested/config.toml"));

        let mut settings = EngineSettings::default();
        settings.budget_limit = 3.5;
        settings.sort_key = SessionSortKey::Title;
        settings.filter_query = "haiku".to_string();

        service.save(&settings).await.unwrap();
        let reloaded = service.load().await.unwrap();
        assert_eq!(reloaded, settings);
    }
}
