//! Host configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::Result;

const CONFIG_FILE: &str = "config.json";
const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:47321";
const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

const ENV_DATA_DIR: &str = "PARLEY_DATA_DIR";
const ENV_LISTEN: &str = "PARLEY_LISTEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub data_dir: PathBuf,
    /// Path to the chat log database
    pub database_path: PathBuf,
    /// Directory scanned for `<locale>.json` files
    pub locale_dir: PathBuf,
    /// Address the command channel listens on
    pub listen_address: String,
    /// Longest accepted frame, in bytes
    pub max_frame_bytes: usize,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_filter: String,
}

/// On-disk overrides; anything omitted keeps its default
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    locale_dir: Option<PathBuf>,
    listen_address: Option<String>,
    max_frame_bytes: Option<usize>,
    log_filter: Option<String>,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("chatlog.db"),
            locale_dir: data_dir.join("locales"),
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            log_filter: "info".to_string(),
            data_dir,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Parley"))
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }

    /// Defaults for `data_dir`, overlaid with `<data_dir>/config.json` if it exists
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let path = data_dir.join(CONFIG_FILE);
        let mut config = Self::new(data_dir);

        if !path.exists() {
            return Ok(config);
        }

        let raw = std::fs::read_to_string(&path)?;
        let file: ConfigFile = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        config.apply(file);
        config.validate()?;

        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Resolve the data directory and listen address from the environment
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var_os(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(Self::data_dir);
        let config = Self::load(data_dir)?;
        Ok(config.with_listen_override(std::env::var(ENV_LISTEN).ok()))
    }

    pub fn with_listen_override(mut self, listen: Option<String>) -> Self {
        if let Some(address) = listen.filter(|a| !a.trim().is_empty()) {
            self.listen_address = address;
        }
        self
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(path) = file.database_path {
            self.database_path = self.data_dir.join(path);
        }
        if let Some(path) = file.locale_dir {
            self.locale_dir = self.data_dir.join(path);
        }
        if let Some(address) = file.listen_address {
            self.listen_address = address;
        }
        if let Some(bytes) = file.max_frame_bytes {
            self.max_frame_bytes = bytes;
        }
        if let Some(filter) = file.log_filter {
            self.log_filter = filter;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_frame_bytes == 0 {
            return Err(CoreError::Config("maxFrameBytes must be positive".to_string()));
        }
        if self.listen_address.trim().is_empty() {
            return Err(CoreError::Config("listenAddress must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

// Simple dirs implementation for the local data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_derive_from_data_dir() {
        let config = Config::new(PathBuf::from("/tmp/parley"));
        assert_eq!(config.database_path, PathBuf::from("/tmp/parley/chatlog.db"));
        assert_eq!(config.locale_dir, PathBuf::from("/tmp/parley/locales"));
        assert_eq!(config.listen_address, "127.0.0.1:47321");
        assert_eq!(config.max_frame_bytes, 1024 * 1024);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::new(dir.path().to_path_buf()));
    }

    #[test]
    fn test_load_overlays_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"listenAddress": "0.0.0.0:9000", "maxFrameBytes": 4096, "localeDir": "i18n"}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.listen_address, "0.0.0.0:9000");
        assert_eq!(config.max_frame_bytes, 4096);
        assert_eq!(config.locale_dir, dir.path().join("i18n"));
        assert_eq!(config.database_path, dir.path().join("chatlog.db"));
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"homepage": "x"}"#).unwrap();

        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_listen_override() {
        let config = Config::new(PathBuf::from("data"))
            .with_listen_override(Some("127.0.0.1:1".to_string()))
            .with_listen_override(Some("  ".to_string()))
            .with_listen_override(None);
        assert_eq!(config.listen_address, "127.0.0.1:1");
    }
}
