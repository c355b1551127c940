//! Parley Core
//!
//! Configuration, logging and the shared state every command handler sees.
//! The host owns all persistent state; the UI only renders what it is sent.

mod config;
mod error;
mod host;
mod settings;

pub use config::Config;
pub use error::CoreError;
pub use host::Host;
pub use settings::{AppSettings, NamedValue, SettingsService};

pub use parley_storage::{ChatLog, Database, LogMessage, MessageKind, NewMessage, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging. `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A subscriber may already be installed (tests, embedding hosts)
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
