//! Log-import wizard
//!
//! Imports plain-text logs laid out as `<source>/<character>/<target>.log`,
//! one `[<RFC 3339 time>] <sender>: <text>` message per line. Targets that
//! start with `#` are channels; everything else is a private conversation.
//!
//! Steps, produced one at a time:
//! 1. `chooseCharacters` lists the character directories; the reply is the
//!    array of names to import (empty means all).
//! 2. `confirm` summarizes the selection; the reply is `{"confirm": bool}`.
//! 3. `importing` reports `{imported, skipped}` once the import has run.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_channel::{HandlerFault, StreamVerbs, Workflow, WorkflowStep};
use parley_core::{ChatLog, MessageKind, NewMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::blocking_fs;

pub const IMPORT_VERBS: StreamVerbs = StreamVerbs {
    step: "gotImportStep",
    error: "importError",
    finished: "importFinished",
};

const LOG_EXTENSION: &str = "log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Discover,
    ChooseCharacters,
    Summarize,
    Confirm,
    Import,
    Acknowledge,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogFile {
    character: String,
    target: String,
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub characters: Vec<String>,
    pub files: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    confirm: bool,
}

pub struct LogImport {
    source: PathBuf,
    chat_log: ChatLog,
    stage: Stage,
    characters: Vec<String>,
    chosen: Vec<String>,
    files: Vec<LogFile>,
}

impl LogImport {
    pub fn new(source: impl Into<PathBuf>, chat_log: ChatLog) -> Self {
        Self {
            source: source.into(),
            chat_log,
            stage: Stage::Discover,
            characters: Vec::new(),
            chosen: Vec::new(),
            files: Vec::new(),
        }
    }

    fn choose(&mut self, handle_data: Value) -> Result<(), HandlerFault> {
        let requested: Vec<String> = match handle_data {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other)?,
        };

        if let Some(unknown) = requested.iter().find(|name| !self.characters.contains(name)) {
            return Err(HandlerFault::new(format!("Unknown character: {unknown}")));
        }

        self.chosen = if requested.is_empty() {
            self.characters.clone()
        } else {
            requested
        };
        Ok(())
    }
}

#[async_trait]
impl Workflow for LogImport {
    async fn next_step(&mut self) -> Result<Option<WorkflowStep>, HandlerFault> {
        match self.stage {
            Stage::Discover => {
                let source = self.source.clone();
                self.characters = blocking_fs(move || discover_characters(&source)).await?;
                self.stage = Stage::ChooseCharacters;
                Ok(Some(WorkflowStep::new("chooseCharacters", &self.characters)?))
            }
            Stage::Summarize => {
                let source = self.source.clone();
                let chosen = self.chosen.clone();
                let (files, lines) = blocking_fs(move || summarize(&source, &chosen)).await?;

                let summary = ImportSummary {
                    characters: self.chosen.clone(),
                    files: files.len(),
                    lines,
                };
                self.files = files;
                self.stage = Stage::Confirm;
                Ok(Some(WorkflowStep::new("confirm", summary)?))
            }
            Stage::Import => {
                let files = std::mem::take(&mut self.files);
                let chat_log = self.chat_log.clone();
                let report = blocking_fs(move || import_files(&chat_log, &files)).await?;

                tracing::info!(imported = report.imported, skipped = report.skipped, "Log import finished");
                self.stage = Stage::Acknowledge;
                Ok(Some(WorkflowStep::new("importing", report)?))
            }
            Stage::Done => Ok(None),
            Stage::ChooseCharacters | Stage::Confirm | Stage::Acknowledge => Err(HandlerFault::new(
                "Import step requested before the previous step was answered",
            )),
        }
    }

    async fn submit(&mut self, handle_data: Value) -> Result<(), HandlerFault> {
        match self.stage {
            Stage::ChooseCharacters => {
                self.choose(handle_data)?;
                self.stage = Stage::Summarize;
            }
            Stage::Confirm => {
                let answer: Confirmation = serde_json::from_value(handle_data)?;
                self.stage = if answer.confirm {
                    Stage::Import
                } else {
                    tracing::debug!("Log import declined");
                    Stage::Done
                };
            }
            Stage::Acknowledge => self.stage = Stage::Done,
            _ => return Err(HandlerFault::new("No import step is awaiting an answer")),
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.files.clear();
        self.stage = Stage::Done;
    }
}

fn discover_characters(source: &Path) -> anyhow::Result<Vec<String>> {
    let entries = std::fs::read_dir(source)
        .with_context(|| format!("Import source not found: {}", source.display()))?;

    let mut characters = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            characters.push(name.to_string());
        }
    }
    characters.sort();
    Ok(characters)
}

fn summarize(source: &Path, characters: &[String]) -> anyhow::Result<(Vec<LogFile>, usize)> {
    let mut files = Vec::new();
    for character in characters {
        let dir = source.join(character);
        for entry in std::fs::read_dir(&dir).with_context(|| format!("Cannot read {}", dir.display()))? {
            let path = entry?.path();
            let is_log = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(LOG_EXTENSION));
            if !is_log || !path.is_file() {
                continue;
            }
            if let Some(target) = path.file_stem().and_then(|s| s.to_str()) {
                files.push(LogFile {
                    character: character.clone(),
                    target: target.to_string(),
                    path: path.clone(),
                });
            }
        }
    }
    files.sort_by(|a, b| (&a.character, &a.target).cmp(&(&b.character, &b.target)));

    let mut lines = 0;
    for file in &files {
        let content = std::fs::read_to_string(&file.path)
            .with_context(|| format!("Cannot read {}", file.path.display()))?;
        lines += content.lines().filter(|line| !line.trim().is_empty()).count();
    }
    Ok((files, lines))
}

fn import_files(chat_log: &ChatLog, files: &[LogFile]) -> anyhow::Result<ImportReport> {
    let mut report = ImportReport::default();

    for file in files {
        let content = std::fs::read_to_string(&file.path)
            .with_context(|| format!("Cannot read {}", file.path.display()))?;

        let mut messages = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match parse_line(line) {
                Some((sent_at, sender, text)) => messages.push(NewMessage {
                    character: file.character.clone(),
                    target: file.target.clone(),
                    sender,
                    text,
                    sent_at,
                }),
                None => report.skipped += 1,
            }
        }

        let kind = if file.target.starts_with('#') {
            MessageKind::Channel
        } else {
            MessageKind::Private
        };
        report.imported += chat_log.append_batch(kind, &messages)?;
        tracing::debug!(character = %file.character, target = %file.target, count = messages.len(), "Imported log file");
    }

    Ok(report)
}

/// `[<RFC 3339 time>] <sender>: <text>`
fn parse_line(line: &str) -> Option<(DateTime<Utc>, String, String)> {
    let rest = line.trim_end().strip_prefix('[')?;
    let (stamp, rest) = rest.split_once("] ")?;
    let sent_at = DateTime::parse_from_rfc3339(stamp).ok()?.with_timezone(&Utc);
    let (sender, text) = rest.split_once(": ")?;
    if sender.trim().is_empty() {
        return None;
    }
    Some((sent_at, sender.to_string(), text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::Database;
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let ava = dir.path().join("Ava");
        let cy = dir.path().join("Cy");
        std::fs::create_dir_all(&ava).unwrap();
        std::fs::create_dir_all(&cy).unwrap();

        std::fs::write(
            ava.join("#lobby.log"),
            "[2024-05-01T10:00:00Z] Ava: hello\n\
             [2024-05-01T10:01:00Z] Bo: hi there\n\
             this line is garbage\n\
             \n",
        )
        .unwrap();
        std::fs::write(ava.join("Bo.log"), "[2024-05-01T11:00:00+02:00] Bo: psst\n").unwrap();
        std::fs::write(ava.join("notes.txt"), "not a log").unwrap();
        std::fs::write(cy.join("#help.log"), "[2024-05-02T09:00:00Z] Cy: help?\n").unwrap();
        std::fs::write(dir.path().join("stray.log"), "ignored").unwrap();
        dir
    }

    fn chat_log() -> ChatLog {
        ChatLog::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_full_import() {
        let source = fixture();
        let log = chat_log();
        let mut import = LogImport::new(source.path(), log.clone());

        let step = import.next_step().await.unwrap().unwrap();
        assert_eq!(step.step_type, "chooseCharacters");
        assert_eq!(step.step_value, json!(["Ava", "Cy"]));
        import.submit(json!(["Ava"])).await.unwrap();

        let step = import.next_step().await.unwrap().unwrap();
        assert_eq!(step.step_type, "confirm");
        assert_eq!(step.step_value, json!({"characters": ["Ava"], "files": 2, "lines": 4}));
        import.submit(json!({"confirm": true})).await.unwrap();

        let step = import.next_step().await.unwrap().unwrap();
        assert_eq!(step.step_type, "importing");
        assert_eq!(step.step_value, json!({"imported": 3, "skipped": 1}));
        import.submit(Value::Null).await.unwrap();

        assert!(import.next_step().await.unwrap().is_none());
        assert_eq!(log.message_count().unwrap(), 3);

        let private = log.recent_before("Ava", "Bo", Utc::now(), 10).unwrap();
        assert_eq!(private.len(), 1);
        assert_eq!(private[0].kind, MessageKind::Private);
        assert_eq!(private[0].text, "psst");

        let channel = log.recent_before("Ava", "#lobby", Utc::now(), 10).unwrap();
        assert_eq!(channel.len(), 2);
        assert_eq!(channel[0].sender, "Bo");
        assert_eq!(channel[0].kind, MessageKind::Channel);
    }

    #[tokio::test]
    async fn test_empty_choice_means_all() {
        let source = fixture();
        let mut import = LogImport::new(source.path(), chat_log());

        import.next_step().await.unwrap();
        import.submit(json!([])).await.unwrap();

        let step = import.next_step().await.unwrap().unwrap();
        assert_eq!(step.step_value["characters"], json!(["Ava", "Cy"]));
        assert_eq!(step.step_value["files"], json!(3));
    }

    #[tokio::test]
    async fn test_declined_import_writes_nothing() {
        let source = fixture();
        let log = chat_log();
        let mut import = LogImport::new(source.path(), log.clone());

        import.next_step().await.unwrap();
        import.submit(json!([])).await.unwrap();
        import.next_step().await.unwrap();
        import.submit(json!({"confirm": false})).await.unwrap();

        assert!(import.next_step().await.unwrap().is_none());
        assert_eq!(log.message_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_faults() {
        let dir = TempDir::new().unwrap();
        let mut import = LogImport::new(dir.path().join("nope"), chat_log());

        let fault = import.next_step().await.unwrap_err();
        assert!(fault.message().starts_with("Import source not found"));
    }

    #[tokio::test]
    async fn test_unknown_character_rejected() {
        let source = fixture();
        let mut import = LogImport::new(source.path(), chat_log());

        import.next_step().await.unwrap();
        let fault = import.submit(json!(["Zed"])).await.unwrap_err();
        assert_eq!(fault.message(), "Unknown character: Zed");
    }

    #[test]
    fn test_parse_line() {
        let (sent_at, sender, text) = parse_line("[2024-05-01T10:00:00Z] Ava: a: b").unwrap();
        assert_eq!(sent_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(sender, "Ava");
        assert_eq!(text, "a: b");

        assert!(parse_line("2024-05-01T10:00:00Z Ava: hi").is_none());
        assert!(parse_line("[yesterday] Ava: hi").is_none());
        assert!(parse_line("[2024-05-01T10:00:00Z] no separator").is_none());
        assert!(parse_line("[2024-05-01T10:00:00Z] : empty sender").is_none());
    }
}
