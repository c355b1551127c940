//! Chat log store
//!
//! Append-only message log keyed by the logged-in character and the
//! conversation target (a `#channel` or a private-message partner).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::StorageError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Channel,
    Private,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Channel => "channel",
            MessageKind::Private => "private",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "channel" => Ok(MessageKind::Channel),
            "private" => Ok(MessageKind::Private),
            _ => Err(format!("Unknown message kind: {}", s)),
        }
    }
}

/// A message to be appended to the log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub character: String,
    pub target: String,
    pub sender: String,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    pub id: i64,
    pub character: String,
    pub target: String,
    pub kind: MessageKind,
    pub sender: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ChatLog {
    db: Database,
}

impl ChatLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn append_channel_message(&self, message: &NewMessage) -> Result<i64> {
        self.append(MessageKind::Channel, message)
    }

    pub fn append_private_message(&self, message: &NewMessage) -> Result<i64> {
        self.append(MessageKind::Private, message)
    }

    /// Append many messages in one transaction. Returns the number written.
    pub fn append_batch(&self, kind: MessageKind, messages: &[NewMessage]) -> Result<usize> {
        self.db.transaction(|conn| {
            let mut stmt = conn.prepare(INSERT_MESSAGE)?;
            for message in messages {
                stmt.execute(rusqlite::params![
                    message.character,
                    message.target,
                    kind.as_str(),
                    message.sender,
                    message.text,
                    message.sent_at.to_rfc3339(),
                    message.sent_at.timestamp_millis(),
                ])?;
            }
            Ok(messages.len())
        })
    }

    fn append(&self, kind: MessageKind, message: &NewMessage) -> Result<i64> {
        let id = self.db.with_connection(|conn| {
            conn.execute(
                INSERT_MESSAGE,
                rusqlite::params![
                    message.character,
                    message.target,
                    kind.as_str(),
                    message.sender,
                    message.text,
                    message.sent_at.to_rfc3339(),
                    message.sent_at.timestamp_millis(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        tracing::debug!(
            message_id = id,
            kind = kind.as_str(),
            target = %message.target,
            "Logged message"
        );

        Ok(id)
    }

    /// Up to `limit` messages strictly before `before`, newest first
    pub fn recent_before(
        &self,
        character: &str,
        target: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LogMessage>> {
        let rows = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, character, target, kind, sender, body, sent_at
                 FROM messages
                 WHERE character = ?1 AND target = ?2 AND sent_ts < ?3
                 ORDER BY sent_ts DESC, id DESC
                 LIMIT ?4",
            )?;

            let rows: Vec<(i64, String, String, String, String, String, String)> = stmt
                .query_map(
                    rusqlite::params![character, target, before.timestamp_millis(), limit as i64],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    },
                )?
                .collect::<std::result::Result<_, _>>()?;

            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, character, target, kind, sender, text, sent_at)| {
                let sent_at = DateTime::parse_from_rfc3339(&sent_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| StorageError::InvalidTimestamp(id))?;
                let kind = kind
                    .parse()
                    .map_err(|_| StorageError::InvalidKind { id, kind })?;
                Ok(LogMessage {
                    id,
                    character,
                    target,
                    kind,
                    sender,
                    text,
                    sent_at,
                })
            })
            .collect()
    }

    pub fn message_count(&self) -> Result<u64> {
        self.db.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }

    pub fn size_bytes(&self) -> Result<u64> {
        self.db.size_bytes()
    }

    pub fn vacuum(&self) -> Result<u64> {
        self.db.vacuum()
    }

    /// Delete every logged message and compact the file. Returns the new size.
    pub fn clear(&self) -> Result<u64> {
        let removed = self
            .db
            .with_connection(|conn| Ok(conn.execute("DELETE FROM messages", [])?))?;
        tracing::info!(removed, "Cleared chat log");
        self.db.vacuum()
    }
}

const INSERT_MESSAGE: &str = "INSERT INTO messages
     (character, target, kind, sender, body, sent_at, sent_ts)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
