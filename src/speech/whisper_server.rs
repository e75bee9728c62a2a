use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::trace;

use super::{Recognition, Recognizer, primary_subtag};

/// Recognizer backed by a whisper.cpp style HTTP server.
///
/// Clips are posted to `/inference` as multipart form data.
#[derive(Clone, Debug)]
pub struct WhisperServerRecognizer {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    text: String,
}

impl WhisperServerRecognizer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Recognizer for WhisperServerRecognizer {
    async fn recognize(&self, wav: &[u8], language: &str) -> anyhow::Result<Recognition> {
        let url = format!("{}/inference", self.base_url.trim_end_matches('/'));
        let file = Part::bytes(wav.to_vec())
            .file_name("clip.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", file)
            .text("language", primary_subtag(language).to_string())
            .text("response_format", "json");
        let resp: InferenceResponse = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let text = resp.text.trim();
        trace!(%language, %text, "whisper server transcript");
        if text.is_empty() || is_non_speech(text) {
            Ok(Recognition::NoMatch)
        } else {
            Ok(Recognition::Text(text.to_string()))
        }
    }
}

/// Whisper marks silence with bracketed annotations such as `[BLANK_AUDIO]`.
fn is_non_speech(text: &str) -> bool {
    (text.starts_with('[') && text.ends_with(']')) || (text.starts_with('(') && text.ends_with(')'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn posts_clip_and_returns_text() {
        // Arrange
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/inference")
                    .body_contains("name=\"language\"\r\n\r\nes")
                    .body_contains("RIFFDATA");
                then.status(200)
                    .json_body(serde_json::json!({"text": " hola amigo \n"}));
            })
            .await;
        let rec = WhisperServerRecognizer::new(server.base_url());

        // Act
        let out = rec.recognize(b"RIFFDATA", "es-MX").await.unwrap();

        // Assert
        assert_eq!(out, Recognition::Text("hola amigo".into()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn blank_audio_is_no_match() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/inference");
                then.status(200)
                    .json_body(serde_json::json!({"text": "[BLANK_AUDIO]"}));
            })
            .await;
        let rec = WhisperServerRecognizer::new(server.base_url());
        assert_eq!(rec.recognize(b"x", "en-US").await.unwrap(), Recognition::NoMatch);
    }

    #[tokio::test]
    async fn server_errors_propagate() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/inference");
                then.status(503);
            })
            .await;
        let rec = WhisperServerRecognizer::new(server.base_url());
        assert!(rec.recognize(b"x", "en-US").await.is_err());
    }
}
