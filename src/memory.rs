use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::persist::Slot;

/// Number of exchanges retained by default.
pub const DEFAULT_CAPACITY: usize = 20;
/// Number of exchanges fed back into prompts.
pub const CONTEXT_ENTRIES: usize = 5;

/// A single user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub user: String,
    pub ai: String,
    #[serde(default)]
    pub emotion: Option<String>,
}

impl ConversationEntry {
    /// Creates an entry stamped with the current local time, to the second.
    pub fn new(user: impl Into<String>, ai: impl Into<String>, emotion: Option<String>) -> Self {
        Self {
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            user: user.into(),
            ai: ai.into(),
            emotion,
        }
    }

    fn write_to(&self, out: &mut String) {
        out.push_str("User: ");
        out.push_str(&self.user);
        out.push_str("\nAI: ");
        out.push_str(&self.ai);
        out.push('\n');
        if let Some(emotion) = &self.emotion {
            out.push_str("Emotion: ");
            out.push_str(emotion);
            out.push('\n');
        }
        out.push_str("---\n");
    }
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Bounded, write-through window of recent exchanges.
///
/// Appends evict from the head once `capacity` is exceeded, and the whole
/// window is saved before the append returns. All mutation happens under
/// one lock so concurrent requests cannot interleave evictions.
pub struct ConversationMemory {
    slot: Arc<dyn Slot>,
    capacity: usize,
    entries: Mutex<VecDeque<ConversationEntry>>,
}

impl ConversationMemory {
    /// Loads the window from `slot`, starting empty when it is absent or
    /// unreadable.
    pub async fn load(slot: Arc<dyn Slot>) -> Self {
        Self::load_with_capacity(slot, DEFAULT_CAPACITY).await
    }

    pub async fn load_with_capacity(slot: Arc<dyn Slot>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries: VecDeque<ConversationEntry> = match slot.load().await {
            Ok(Some(text)) => match serde_json::from_str::<Vec<ConversationEntry>>(&text) {
                Ok(list) => list.into(),
                Err(e) => {
                    warn!(error = %e, slot = %slot.describe(), "conversation memory corrupt, starting empty");
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(e) => {
                warn!(error = ?e, slot = %slot.describe(), "conversation memory unreadable, starting empty");
                VecDeque::new()
            }
        };
        while entries.len() > capacity {
            entries.pop_front();
        }
        info!(count = entries.len(), "conversation memory loaded");
        Self {
            slot,
            capacity,
            entries: Mutex::new(entries),
        }
    }

    /// Appends `entry`, evicting the oldest exchanges beyond capacity, and
    /// persists the window.
    pub async fn append(&self, entry: ConversationEntry) {
        let mut entries = self.entries.lock().await;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        self.persist(&entries).await;
        debug!(count = entries.len(), "conversation entry appended");
    }

    /// Empties the window and persists the empty state.
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.persist(&entries).await;
        info!("conversation memory cleared");
    }

    /// Returns the whole window in chronological order.
    pub async fn all(&self) -> Vec<ConversationEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Returns up to `k` of the newest entries, oldest first.
    pub async fn recent(&self, k: usize) -> Vec<ConversationEntry> {
        let entries = self.entries.lock().await;
        let skip = entries.len().saturating_sub(k);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Formats the newest `k` exchanges as a prompt block.
    ///
    /// Returns an empty string when there is no history.
    pub async fn recent_context(&self, k: usize) -> String {
        let recent = self.recent(k).await;
        if recent.is_empty() {
            return String::new();
        }
        let mut out = String::from("Previous conversation context:\n");
        for entry in &recent {
            entry.write_to(&mut out);
        }
        out
    }

    /// Formats every retained exchange.
    pub async fn transcript(&self) -> String {
        let mut out = String::new();
        for entry in self.entries.lock().await.iter() {
            entry.write_to(&mut out);
        }
        out
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Location of the backing slot.
    pub fn location(&self) -> String {
        self.slot.describe()
    }

    async fn persist(&self, entries: &VecDeque<ConversationEntry>) {
        let list: Vec<&ConversationEntry> = entries.iter().collect();
        let text = match serde_json::to_string_pretty(&list) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to serialize conversation memory");
                return;
            }
        };
        if let Err(e) = self.slot.save(&text).await {
            warn!(error = ?e, slot = %self.slot.describe(), "failed to persist conversation memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{FileSlot, MemorySlot};
    use tempfile::tempdir;
    use tracing_test::traced_test;

    fn entry(n: usize) -> ConversationEntry {
        ConversationEntry::new(format!("u{n}"), format!("a{n}"), None)
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let memory = ConversationMemory::load(Arc::new(MemorySlot::new())).await;
        for n in 1..=25 {
            memory.append(entry(n)).await;
            assert!(memory.len().await <= DEFAULT_CAPACITY);
        }
        let all = memory.all().await;
        assert_eq!(all.len(), 20);
        assert_eq!(all[0].user, "u6");
        assert_eq!(all[19].user, "u25");
    }

    #[tokio::test]
    async fn recent_returns_newest_in_order() {
        let memory = ConversationMemory::load(Arc::new(MemorySlot::new())).await;
        for n in 1..=3 {
            memory.append(entry(n)).await;
        }
        let users: Vec<_> = memory.recent(5).await.into_iter().map(|e| e.user).collect();
        assert_eq!(users, ["u1", "u2", "u3"]);

        let users: Vec<_> = memory.recent(2).await.into_iter().map(|e| e.user).collect();
        assert_eq!(users, ["u2", "u3"]);
    }

    #[tokio::test]
    async fn context_block_lists_exchanges() {
        let memory = ConversationMemory::load(Arc::new(MemorySlot::new())).await;
        assert_eq!(memory.recent_context(5).await, "");
        memory
            .append(ConversationEntry::new("hi", "hello", Some("sad".into())))
            .await;
        memory.append(ConversationEntry::new("bye", "take care", None)).await;
        assert_eq!(
            memory.recent_context(5).await,
            "Previous conversation context:\n\
             User: hi\nAI: hello\nEmotion: sad\n---\n\
             User: bye\nAI: take care\n---\n"
        );
    }

    #[tokio::test]
    async fn clear_persists_empty_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conversation_memory.json");
        let memory = ConversationMemory::load(Arc::new(FileSlot::new(&path))).await;
        memory.append(entry(1)).await;
        memory.clear().await;
        assert!(memory.all().await.is_empty());

        let reloaded = ConversationMemory::load(Arc::new(FileSlot::new(&path))).await;
        assert!(reloaded.is_empty().await);
    }

    #[tokio::test]
    async fn reload_restores_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conversation_memory.json");
        let memory = ConversationMemory::load(Arc::new(FileSlot::new(&path))).await;
        memory
            .append(ConversationEntry::new("hi", "hello", Some("happy".into())))
            .await;

        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json[0]["user"], "hi");
        assert_eq!(json[0]["emotion"], "happy");
        assert_eq!(json[0]["timestamp"].as_str().unwrap().len(), 19);

        let reloaded = ConversationMemory::load(Arc::new(FileSlot::new(&path))).await;
        assert_eq!(reloaded.all().await, memory.all().await);
    }

    #[traced_test]
    #[tokio::test]
    async fn corrupt_slot_starts_empty() {
        let memory =
            ConversationMemory::load(Arc::new(MemorySlot::with_value("{not json"))).await;
        assert!(memory.is_empty().await);
        assert!(logs_contain("conversation memory corrupt"));
    }

    #[tokio::test]
    async fn oversized_file_is_trimmed_on_load() {
        let list: Vec<_> = (1..=30).map(entry).collect();
        let slot = MemorySlot::with_value(serde_json::to_string(&list).unwrap());
        let memory = ConversationMemory::load(Arc::new(slot)).await;
        let all = memory.all().await;
        assert_eq!(all.len(), 20);
        assert_eq!(all[0].user, "u11");
    }
}
