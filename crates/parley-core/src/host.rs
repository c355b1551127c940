//! Host state container
//!
//! Everything command handlers share lives here. Cheap to clone; all
//! services share one database connection.

use parley_storage::{ChatLog, Database};

use crate::config::Config;
use crate::settings::SettingsService;
use crate::Result;

#[derive(Clone)]
pub struct Host {
    config: Config,
    db: Database,
    chat_log: ChatLog,
    settings: SettingsService,
}

impl Host {
    /// Open (creating if needed) the data directory and database
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&config.database_path)?;
        tracing::info!(path = %config.database_path.display(), "Opened chat log database");
        Ok(Self::with_database(config, db))
    }

    /// Host backed by an in-memory database
    pub fn in_memory(config: Config) -> Result<Self> {
        Ok(Self::with_database(config, Database::open_in_memory()?))
    }

    fn with_database(config: Config, db: Database) -> Self {
        Self {
            chat_log: ChatLog::new(db.clone()),
            settings: SettingsService::new(db.clone()),
            config,
            db,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn chat_log(&self) -> &ChatLog {
        &self.chat_log
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_storage::NewMessage;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_database() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path().join("nested"));
        let host = Host::open(config.clone()).unwrap();

        assert!(config.database_path.exists());
        assert!(host.database().size_bytes().unwrap() > 0);
    }

    #[test]
    fn test_services_share_database() {
        let host = Host::in_memory(Config::new("unused".into())).unwrap();
        host.chat_log()
            .append_channel_message(&NewMessage {
                character: "Ava".to_string(),
                target: "#lobby".to_string(),
                sender: "Ava".to_string(),
                text: "hello".to_string(),
                sent_at: chrono::Utc::now(),
            })
            .unwrap();
        host.settings()
            .update(&serde_json::json!({"theme": "dark"}))
            .unwrap();

        let clone = host.clone();
        assert_eq!(clone.chat_log().message_count().unwrap(), 1);
        assert_eq!(clone.settings().get().unwrap().theme, "dark");
    }
}
