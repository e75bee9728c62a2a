//! The conversational core shared by every input channel.

use std::sync::Arc;
use tracing::{error, info};

use crate::conversation_log::ConversationLog;
use crate::emotion::EmotionStore;
use crate::language::{Language, Settings};
use crate::llm::{ModelGateway, gentle_reply};
use crate::memory::{CONTEXT_ENTRIES, ConversationEntry, ConversationMemory};
use crate::prompt::{PromptComposer, PromptParts};
use crate::speech::{Speaker, Utterance};

/// A reply produced for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Emotion known when the reply was composed.
    pub emotion: Option<String>,
    /// The model was unavailable and a local reply was used.
    pub fallback: bool,
}

/// Ties the emotion cell, conversation memory and model together.
pub struct Assistant {
    store: Arc<EmotionStore>,
    memory: Arc<ConversationMemory>,
    log: Arc<ConversationLog>,
    gateway: Arc<ModelGateway>,
    composer: PromptComposer,
    settings: Arc<Settings>,
    speaker: Arc<dyn Speaker>,
}

impl Assistant {
    pub fn new(
        store: Arc<EmotionStore>,
        memory: Arc<ConversationMemory>,
        log: Arc<ConversationLog>,
        gateway: Arc<ModelGateway>,
        settings: Arc<Settings>,
        speaker: Arc<dyn Speaker>,
    ) -> Self {
        Self {
            store,
            memory,
            log,
            gateway,
            composer: PromptComposer::default(),
            settings,
            speaker,
        }
    }

    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn store(&self) -> &Arc<EmotionStore> {
        &self.store
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn log(&self) -> &Arc<ConversationLog> {
        &self.log
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Composes a prompt for `input` and asks the model, without recording
    /// the exchange.
    pub async fn respond(&self, input: &str) -> Reply {
        let emotion = self.store.read_emotion();
        let context = self.memory.recent_context(CONTEXT_ENTRIES).await;
        let language = self.settings.language();
        let parts = PromptParts {
            input,
            emotion: emotion.as_deref(),
            context: Some(&context),
            language: Some(language.code),
        };
        let prompt = match self.composer.compose(parts) {
            Ok(p) => p,
            Err(e) => {
                error!(error = ?e, "prompt template failed, sending raw input");
                input.to_string()
            }
        };
        let completion = self.gateway.complete(&prompt).await;
        let fallback = completion.is_fallback();
        let text = if fallback {
            gentle_reply(input)
        } else {
            completion.into_text()
        };
        Reply {
            text,
            emotion,
            fallback,
        }
    }

    /// Answers `input` and records the exchange under `logged_as`.
    pub async fn converse(&self, input: &str, logged_as: &str) -> Reply {
        let reply = self.respond(input).await;
        self.record(logged_as, &reply.text, reply.emotion.clone()).await;
        reply
    }

    /// Answers a typed message.
    pub async fn chat(&self, message: &str) -> Reply {
        self.converse(message, message).await
    }

    /// Appends an exchange to memory and the conversation log.
    pub async fn record(&self, user: &str, ai: &str, emotion: Option<String>) {
        let entry = ConversationEntry::new(user, ai, emotion);
        self.log.record(&entry).await;
        self.memory.append(entry).await;
        info!(user = %user, "exchange recorded");
    }

    /// Speaks `text` in the current language at its configured rate.
    pub fn speak(&self, text: &str) {
        let language = self.settings.language();
        self.speak_at(text, language, self.settings.rate(language.code));
    }

    /// Speaks `text` with an explicit language and rate.
    pub fn speak_at(&self, text: &str, language: &'static Language, rate: u32) {
        self.speaker.speak(Utterance {
            text: text.to_string(),
            language,
            rate,
        });
    }
}
