use chrono::{DateTime, Local};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::persist::Slot;

/// Label written when a frame contained no face.
pub const NO_FACE: &str = "no_face";
/// Label written when a face was found but could not be classified.
pub const UNKNOWN: &str = "unknown";

/// Returns true for labels that carry an actual emotion rather than a
/// sentinel.
///
/// ```
/// use confidant::emotion::is_emotion;
/// assert!(is_emotion("happy"));
/// assert!(!is_emotion("no_face"));
/// assert!(!is_emotion("unknown"));
/// ```
pub fn is_emotion(label: &str) -> bool {
    !label.is_empty() && label != NO_FACE && label != UNKNOWN
}

/// A label together with the moment it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub label: String,
    pub at: DateTime<Local>,
}

/// Single-slot cell holding the most recently observed emotion label.
///
/// Writes go through the backing [`Slot`] first and then replace the
/// in-memory value, so a reader sees either the old or the new label and
/// nothing in between. Writers are serialized.
pub struct EmotionStore {
    slot: Arc<dyn Slot>,
    current: RwLock<Option<Observation>>,
    writer: Mutex<()>,
}

impl EmotionStore {
    /// Opens the store, picking up a label left in the slot by an earlier run.
    pub async fn open(slot: Arc<dyn Slot>) -> Self {
        let current = match slot.load().await {
            Ok(Some(text)) => parse_label(&text).map(|label| Observation {
                label,
                at: Local::now(),
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(error = ?e, slot = %slot.describe(), "emotion slot unreadable, starting empty");
                None
            }
        };
        if let Some(obs) = &current {
            info!(label = %obs.label, "restored last emotion");
        }
        Self {
            slot,
            current: RwLock::new(current),
            writer: Mutex::new(()),
        }
    }

    /// Replaces the current label.
    ///
    /// Persistence failures are logged; the in-memory value is updated
    /// regardless so readers keep seeing the freshest observation.
    pub async fn write(&self, label: &str) {
        let label = label.trim();
        let _guard = self.writer.lock().await;
        if let Err(e) = self.slot.save(&format!("{label}\n")).await {
            warn!(error = ?e, %label, "failed to persist emotion");
        }
        let obs = Observation {
            label: label.to_string(),
            at: Local::now(),
        };
        match self.current.write() {
            Ok(mut cur) => *cur = Some(obs),
            Err(poisoned) => *poisoned.into_inner() = Some(obs),
        }
        debug!(%label, "stored current emotion");
    }

    /// Returns the latest label, or `None` when nothing has been observed.
    pub fn read(&self) -> Option<String> {
        self.observation().map(|o| o.label)
    }

    /// Returns the latest label only when it names an actual emotion.
    pub fn read_emotion(&self) -> Option<String> {
        self.read().filter(|l| is_emotion(l))
    }

    /// Time of the most recent write seen by this process.
    pub fn last_updated(&self) -> Option<DateTime<Local>> {
        self.observation().map(|o| o.at)
    }

    fn observation(&self) -> Option<Observation> {
        match self.current.read() {
            Ok(cur) => cur.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Location of the backing slot.
    pub fn location(&self) -> String {
        self.slot.describe()
    }
}

fn parse_label(text: &str) -> Option<String> {
    let label = text.trim();
    (!label.is_empty()).then(|| label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{FileSlot, MemorySlot};
    use tempfile::tempdir;

    #[tokio::test]
    async fn starts_empty_without_slot_contents() {
        let store = EmotionStore::open(Arc::new(MemorySlot::new())).await;
        assert_eq!(store.read(), None);
        assert_eq!(store.last_updated(), None);
    }

    #[tokio::test]
    async fn read_returns_last_write() {
        let store = EmotionStore::open(Arc::new(MemorySlot::new())).await;
        store.write("sad").await;
        store.write("happy").await;
        assert_eq!(store.read().as_deref(), Some("happy"));
        assert!(store.last_updated().is_some());
    }

    #[tokio::test]
    async fn sentinels_are_readable_but_not_emotions() {
        let store = EmotionStore::open(Arc::new(MemorySlot::new())).await;
        store.write(NO_FACE).await;
        assert_eq!(store.read().as_deref(), Some(NO_FACE));
        assert_eq!(store.read_emotion(), None);
    }

    #[tokio::test]
    async fn survives_reopen_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current_emotion.txt");
        let store = EmotionStore::open(Arc::new(FileSlot::new(&path))).await;
        store.write("angry").await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "angry\n");

        let reopened = EmotionStore::open(Arc::new(FileSlot::new(&path))).await;
        assert_eq!(reopened.read().as_deref(), Some("angry"));
    }

    #[tokio::test]
    async fn blank_slot_reads_as_absent() {
        let store = EmotionStore::open(Arc::new(MemorySlot::with_value("  \n"))).await;
        assert_eq!(store.read(), None);
    }

    #[tokio::test]
    async fn concurrent_readers_see_whole_labels() {
        let store = Arc::new(EmotionStore::open(Arc::new(MemorySlot::new())).await);
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    store.write("happy").await;
                    store.write("surprise").await;
                }
            })
        };
        for _ in 0..200 {
            if let Some(label) = store.read() {
                assert!(label == "happy" || label == "surprise");
            }
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        assert_eq!(store.read().as_deref(), Some("surprise"));
    }
}
