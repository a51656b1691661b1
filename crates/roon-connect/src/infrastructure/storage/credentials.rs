//! [`CredentialStore`] backed by the `[saved_server]` section of the config file.
//!
//! Every write is a read-modify-write of the whole file so the other sections
//! survive untouched.

use std::path::{Path, PathBuf};

use roon_core::ServerDescriptor;
use tracing::{debug, info};

use super::config::{load_config_from, save_config_to, ConfigError, SavedServerEntry};
use crate::application::ports::{CredentialStore, SavedServer, StoreError};

impl From<ConfigError> for StoreError {
    fn from(e: ConfigError) -> Self {
        StoreError(e.to_string())
    }
}

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store on the platform config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoPlatformConfigDir`] if no config directory exists.
    pub fn at_default_location() -> Result<Self, ConfigError> {
        Ok(Self::new(super::config::config_file_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_saved_server(&self) -> Result<Option<SavedServer>, StoreError> {
        let cfg = load_config_from(&self.path)?;
        let Some(entry) = cfg.saved_server else {
            return Ok(None);
        };
        match entry.descriptor() {
            Some(server) => Ok(Some(SavedServer {
                server,
                token: entry.token.filter(|t| !t.is_empty()),
            })),
            None => {
                debug!("saved server entry in {} is incomplete", self.path.display());
                Ok(None)
            }
        }
    }

    fn save_server(&mut self, server: &ServerDescriptor, token: &str) -> Result<(), StoreError> {
        let mut cfg = load_config_from(&self.path)?;
        cfg.saved_server = Some(SavedServerEntry::new(server, Some(token.to_string())));
        save_config_to(&self.path, &cfg)?;
        info!("saved authorization for {server}");
        Ok(())
    }

    fn clear_token(&mut self, unique_id: &str) -> Result<(), StoreError> {
        let mut cfg = load_config_from(&self.path)?;
        match cfg.saved_server.as_mut() {
            Some(entry) if entry.unique_id == unique_id && entry.token.is_some() => {
                entry.token = None;
                save_config_to(&self.path, &cfg)?;
                info!("cleared stored token for {unique_id}");
            }
            _ => debug!("no stored token for {unique_id}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::config::AppConfig;
    use uuid::Uuid;

    fn temp_store() -> (PathBuf, FileCredentialStore) {
        let dir = std::env::temp_dir().join(format!("roon_connect_cred_{}", Uuid::new_v4()));
        let store = FileCredentialStore::new(dir.join("config.toml"));
        (dir, store)
    }

    fn core(id: &str) -> ServerDescriptor {
        ServerDescriptor {
            unique_id: id.to_string(),
            display_name: "Study".to_string(),
            host: "10.0.0.5".to_string(),
            port: 9100,
            version: "2.0".to_string(),
        }
    }

    #[test]
    fn test_load_from_missing_file_returns_none() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load_saved_server().unwrap(), None);
    }

    #[test]
    fn test_save_then_load_returns_server_and_token() {
        // Arrange
        let (dir, mut store) = temp_store();

        // Act
        store.save_server(&core("abc"), "tok123").unwrap();
        let saved = store.load_saved_server().unwrap();

        // Assert
        assert_eq!(
            saved,
            Some(SavedServer {
                server: core("abc"),
                token: Some("tok123".to_string()),
            })
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_preserves_other_sections() {
        // Arrange
        let (dir, mut store) = temp_store();
        let mut cfg = AppConfig::default();
        cfg.general.log_level = "trace".to_string();
        save_config_to(store.path(), &cfg).unwrap();

        // Act
        store.save_server(&core("abc"), "tok").unwrap();

        // Assert
        let reloaded = load_config_from(store.path()).unwrap();
        assert_eq!(reloaded.general.log_level, "trace");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_clear_token_for_matching_server_keeps_descriptor() {
        let (dir, mut store) = temp_store();
        store.save_server(&core("abc"), "tok").unwrap();

        store.clear_token("abc").unwrap();

        let saved = store.load_saved_server().unwrap().expect("server kept");
        assert_eq!(saved.server, core("abc"));
        assert_eq!(saved.token, None);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_clear_token_for_other_server_is_ignored() {
        let (dir, mut store) = temp_store();
        store.save_server(&core("abc"), "tok").unwrap();

        store.clear_token("someone-else").unwrap();

        let saved = store.load_saved_server().unwrap().unwrap();
        assert_eq!(saved.token.as_deref(), Some("tok"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_incomplete_entry_loads_as_none() {
        let (dir, store) = temp_store();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            store.path(),
            "[saved_server]\nunique_id = \"abc\"\nhost = \"\"\nport = 9100\n",
        )
        .unwrap();

        assert_eq!(store.load_saved_server().unwrap(), None);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_file_is_reported_as_store_error() {
        let (dir, store) = temp_store();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(store.path(), "[[[ broken").unwrap();

        let err = store.load_saved_server().unwrap_err();

        assert!(err.to_string().contains("credential store error"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
