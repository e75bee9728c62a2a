use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    Ollama,
    generation::chat::{ChatMessage, request::ChatMessageRequest},
    models::ModelOptions,
};
use tracing::{debug, error, trace};

use super::TextGenerator;

/// [`TextGenerator`] backed by a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    client: Ollama,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(client: Ollama, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.9,
        }
    }

    /// Connects to the server at `base_url`, e.g. `http://localhost:11434`.
    pub fn from_url(base_url: &str, model: impl Into<String>) -> anyhow::Result<Self> {
        let url = url::Url::parse(base_url)?;
        let host = format!(
            "{}://{}",
            url.scheme(),
            url.host_str()
                .ok_or_else(|| anyhow::anyhow!("ollama url has no host: {base_url}"))?
        );
        let port = url.port_or_known_default().unwrap_or(11434);
        let client = Ollama::builder().host(host.as_str()).port(port).build();
        Ok(Self::new(client, model))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, system: Option<&str>, prompt: &str) -> ChatMessageRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system.to_string()));
        }
        messages.push(ChatMessage::user(prompt.to_string()));
        ChatMessageRequest::new(self.model.clone(), messages)
            .options(ModelOptions::default().temperature(self.temperature))
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, system: Option<&str>, prompt: &str) -> anyhow::Result<String> {
        trace!(target: "llm", model = %self.model, %prompt, "Ollama prompt");
        let req = self.build_request(system, prompt);
        let mut stream = self.client.send_chat_messages_stream(req).await?;
        let mut full = String::new();
        while let Some(res) = stream.next().await {
            match res {
                Ok(resp) => full.push_str(&resp.message.content),
                Err(e) => {
                    error!(?e, "ollama stream error");
                    anyhow::bail!("ollama stream interrupted");
                }
            }
        }
        debug!(target: "llm", response = %full, "Ollama full response");
        Ok(full)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
