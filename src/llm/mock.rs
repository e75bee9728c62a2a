use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, trace};

use super::TextGenerator;

/// Generator returning canned replies, for offline runs and tests.
///
/// Queued replies are handed out in order; once the queue is empty the
/// default reply is used. A queued `Err` simulates a service failure.
pub struct MockGenerator {
    default: String,
    queue: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new("mock response")
    }
}

impl MockGenerator {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            queue: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queues replies served before the default.
    pub fn with_replies<I>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        if let Ok(mut q) = self.queue.lock() {
            q.extend(replies);
        }
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, system: Option<&str>, prompt: &str) -> anyhow::Result<String> {
        trace!(target: "llm", ?system, %prompt, "MockGenerator prompt");
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        let reply = match next {
            Some(Ok(text)) => text,
            Some(Err(e)) => anyhow::bail!(e),
            None => self.default.clone(),
        };
        debug!(target: "llm", response = %reply, "MockGenerator response");
        Ok(reply)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
