//! Parley Storage Layer
//!
//! SQLite persistence for chat logs and host settings.
//! Multi-statement writes run inside a transaction.

mod chatlog;
mod database;
mod error;
mod migrations;

pub use chatlog::{ChatLog, LogMessage, MessageKind, NewMessage};
pub use database::{Database, VersionedValue};
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
