//! Access to the external text generation service.

use async_trait::async_trait;

mod gateway;
mod gemini;
mod mock;
mod ollama;
mod retry;

pub use gateway::{Completion, FALLBACK_REPLY, ModelGateway, gentle_reply};
pub use gemini::{DEFAULT_BASE_URL as GEMINI_BASE_URL, GeminiClient};
pub use mock::MockGenerator;
pub use ollama::OllamaClient;
pub use retry::RetryPolicy;

/// A backend able to turn a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates a reply for `prompt`, optionally steered by `system`.
    async fn generate(&self, system: Option<&str>, prompt: &str) -> anyhow::Result<String>;

    /// Short name used in logs and status output.
    fn name(&self) -> &str;
}
