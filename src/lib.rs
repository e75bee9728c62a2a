//! Emotion-aware wellness assistant.
//!
//! A background detector keeps an [`EmotionStore`] up to date from webcam
//! frames, a bounded [`ConversationMemory`] remembers recent exchanges, and
//! both feed the prompt sent to the language model for every reply.

pub mod app;
pub mod assistant;
pub mod config;
pub mod conversation_log;
pub mod detector;
pub mod emotion;
pub mod error;
pub mod language;
pub mod llm;
pub mod memory;
pub mod persist;
pub mod prompt;
pub mod report;
pub mod server;
pub mod shutdown;
pub mod speech;
pub mod vision;

pub use assistant::{Assistant, Reply};
pub use detector::{DetectorStatus, EmotionDetector, Start};
pub use emotion::EmotionStore;
pub use error::{ReportError, SettingsError};
pub use memory::{ConversationEntry, ConversationMemory};
pub use shutdown::shutdown_signal;
