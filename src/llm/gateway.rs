use std::sync::Arc;
use tracing::{info, warn};

use super::{RetryPolicy, TextGenerator};

/// Text returned whenever the model cannot produce a reply.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again.";

const GENTLE_CLOSING: &str =
    "Take a slow breath and be gentle with yourself; one small step is enough today.";
const GENTLE_ECHO_CHARS: usize = 80;
const GENTLE_MAX_WORDS: usize = 30;

/// Outcome of a model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The model answered.
    Text(String),
    /// Every attempt failed; carries [`FALLBACK_REPLY`].
    Fallback(String),
}

impl Completion {
    pub fn text(&self) -> &str {
        match self {
            Completion::Text(t) | Completion::Fallback(t) => t,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Completion::Text(t) | Completion::Fallback(t) => t,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Completion::Fallback(_))
    }
}

/// Adapter that always yields usable text.
///
/// Failures, including empty replies, are retried per the policy and then
/// replaced with [`FALLBACK_REPLY`].
pub struct ModelGateway {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl ModelGateway {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Sends `prompt` to the model.
    pub async fn complete(&self, prompt: &str) -> Completion {
        self.complete_with_system(None, prompt).await
    }

    /// Sends `prompt` with separate system instructions.
    pub async fn complete_with_system(&self, system: Option<&str>, prompt: &str) -> Completion {
        let result = self
            .policy
            .retry(|| async {
                let text = self.generator.generate(system, prompt).await?;
                let text = text.trim();
                if text.is_empty() {
                    anyhow::bail!("model returned an empty reply");
                }
                Ok::<_, anyhow::Error>(text.to_string())
            })
            .await;
        match result {
            Ok(text) => {
                info!(model = self.generator.name(), chars = text.len(), "model replied");
                Completion::Text(text)
            }
            Err(e) => {
                warn!(error = ?e, model = self.generator.name(), "model unavailable, using fallback");
                Completion::Fallback(FALLBACK_REPLY.to_string())
            }
        }
    }
}

/// Locally built reply used when the model is unavailable during chat.
///
/// Echoes the start of the user's words followed by a calming suggestion,
/// capped at thirty words.
///
/// ```
/// use confidant::llm::gentle_reply;
/// assert!(gentle_reply("").starts_with("Take a slow breath"));
/// ```
pub fn gentle_reply(user_text: &str) -> String {
    let echo: String = user_text.trim().chars().take(GENTLE_ECHO_CHARS).collect();
    let full = if echo.is_empty() {
        GENTLE_CLOSING.to_string()
    } else {
        format!("{echo} {GENTLE_CLOSING}")
    };
    full.split_whitespace()
        .take(GENTLE_MAX_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}
