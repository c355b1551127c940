use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

/// What the file dialog should offer, e.g. `{"name": "Logs", "extensions": ["log", "txt"]}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn accepts(&self, path: &std::path::Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

#[async_trait]
pub trait FileChooser: Send + Sync + 'static {
    /// `None` when the user dismissed the dialog
    async fn choose(&self, filter: &FileFilter) -> anyhow::Result<Option<PathBuf>>;
}

/// Chooser without a dialog. Selects nothing unless a path was preset.
#[derive(Default)]
pub struct HeadlessFileChooser {
    preset: Mutex<Option<PathBuf>>,
}

impl HeadlessFileChooser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next `choose` with `path`
    pub fn preset(&self, path: impl Into<PathBuf>) {
        *self.preset.lock() = Some(path.into());
    }
}

#[async_trait]
impl FileChooser for HeadlessFileChooser {
    async fn choose(&self, filter: &FileFilter) -> anyhow::Result<Option<PathBuf>> {
        let chosen = self.preset.lock().take();
        Ok(chosen.filter(|path| filter.accepts(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_headless_selects_nothing() {
        let chooser = HeadlessFileChooser::new();
        assert_eq!(chooser.choose(&FileFilter::default()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_preset_respects_filter() {
        let chooser = HeadlessFileChooser::new();
        let logs = FileFilter {
            name: "Logs".to_string(),
            extensions: vec!["log".to_string()],
        };

        chooser.preset("/tmp/sound.wav");
        assert_eq!(chooser.choose(&logs).await.unwrap(), None);

        chooser.preset("/tmp/lobby.LOG");
        assert_eq!(
            chooser.choose(&logs).await.unwrap(),
            Some(PathBuf::from("/tmp/lobby.LOG"))
        );
        // Consumed
        assert_eq!(chooser.choose(&logs).await.unwrap(), None);
    }
}
