use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;

#[async_trait]
pub trait LocaleProvider: Send + Sync + 'static {
    async fn list(&self) -> anyhow::Result<Vec<String>>;
}

/// Locales are the `*.json` files in one directory, named by file stem
pub struct DirectoryLocales {
    dir: PathBuf,
}

impl DirectoryLocales {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl LocaleProvider for DirectoryLocales {
    async fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Cannot read locale directory {}", self.dir.display()))?;

        let mut locales = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_json = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if !is_json || !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                locales.push(stem.to_string());
            }
        }

        locales.sort();
        Ok(locales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lists_json_stems_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["fr.json", "en.json", "notes.txt", "de.JSON"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("xx.json")).unwrap();

        let locales = DirectoryLocales::new(dir.path()).list().await.unwrap();
        assert_eq!(locales, vec!["de", "en", "fr"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = DirectoryLocales::new(dir.path().join("missing"))
            .list()
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Cannot read locale directory"));
    }
}
