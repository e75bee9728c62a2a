use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::memory::ConversationEntry;

const RULE_WIDTH: usize = 50;

/// Append-only, human readable record of every exchange.
///
/// Unlike [`ConversationMemory`](crate::memory::ConversationMemory) this
/// file is never trimmed.
pub struct ConversationLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConversationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entry`. Failures are logged and swallowed.
    pub async fn record(&self, entry: &ConversationEntry) {
        let _guard = self.lock.lock().await;
        if let Err(e) = self.append(entry).await {
            warn!(error = ?e, path = %self.path.display(), "failed to write conversation log");
        }
    }

    async fn append(&self, entry: &ConversationEntry) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let fresh = !tokio::fs::try_exists(&self.path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut text = String::new();
        if fresh {
            text.push_str("Conversation Log\n");
            text.push_str(&"=".repeat(RULE_WIDTH));
            text.push_str("\n\n");
        }
        text.push_str(&format_entry(entry));
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        trace!(path = %self.path.display(), "conversation logged");
        Ok(())
    }

    /// Reads the whole log, `None` when nothing was logged yet.
    pub async fn contents(&self) -> anyhow::Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn format_entry(entry: &ConversationEntry) -> String {
    let mut out = format!("[{}]\nUser: {}\n", stamp(&entry.timestamp), entry.user);
    if let Some(emotion) = &entry.emotion {
        out.push_str(&format!("Detected Emotion: {emotion}\n"));
    }
    out.push_str(&format!("AI: {}\n", entry.ai));
    out.push_str(&"-".repeat(RULE_WIDTH));
    out.push_str("\n\n");
    out
}

fn stamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
