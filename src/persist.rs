//! Single-value durable slots.
//!
//! Both the emotion cell and the conversation window persist through a
//! [`Slot`]: the whole value is loaded at once and every save replaces it
//! in full. The file implementation writes to a sibling temp file and
//! renames it over the target so a reader never observes half a value.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::trace;

/// A durable cell holding one serialized value.
#[async_trait]
pub trait Slot: Send + Sync {
    /// Returns the stored contents, or `None` when nothing was ever saved.
    async fn load(&self) -> anyhow::Result<Option<String>>;

    /// Replaces the stored contents.
    async fn save(&self, contents: &str) -> anyhow::Result<()>;

    /// Human readable location used in status output.
    fn describe(&self) -> String;
}

/// [`Slot`] backed by a plain file.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Slot for FileSlot {
    async fn load(&self) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, contents: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        trace!(path = %self.path.display(), bytes = contents.len(), "slot saved");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process [`Slot`], handy for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: Mutex<Option<String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
        }
    }
}

#[async_trait]
impl Slot for MemorySlot {
    async fn load(&self) -> anyhow::Result<Option<String>> {
        Ok(self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("memory slot poisoned"))?
            .clone())
    }

    async fn save(&self, contents: &str) -> anyhow::Result<()> {
        *self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("memory slot poisoned"))? = Some(contents.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "(memory)".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let slot = FileSlot::new(dir.path().join("absent.txt"));
        assert_eq!(slot.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_replaces_whole_file() {
        let dir = tempdir().unwrap();
        let slot = FileSlot::new(dir.path().join("nested/slot.txt"));
        slot.save("a much longer first value").await.unwrap();
        slot.save("short").await.unwrap();
        assert_eq!(slot.load().await.unwrap().as_deref(), Some("short"));
        assert!(!dir.path().join("nested/slot.txt.tmp").exists());
    }

    #[tokio::test]
    async fn memory_slot_round_trips() {
        let slot = MemorySlot::new();
        assert!(slot.load().await.unwrap().is_none());
        slot.save("x").await.unwrap();
        assert_eq!(slot.load().await.unwrap().as_deref(), Some("x"));
    }
}
