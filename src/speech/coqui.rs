use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{trace, warn};
use urlencoding::encode;

use super::{Speaker, Utterance, primary_subtag};

/// Speaker that streams audio from a Coqui TTS server.
///
/// The synthesized WAV bytes are broadcast to subscribers, each utterance
/// terminated by an empty chunk.
///
/// # Example
/// ```
/// use confidant::speech::CoquiSpeaker;
/// let speaker = CoquiSpeaker::new("http://localhost:5002", "p234");
/// let _ = speaker.subscribe();
/// ```
pub struct CoquiSpeaker {
    client: reqwest::Client,
    base_url: String,
    speaker_id: String,
    tx: Sender<Bytes>,
}

impl CoquiSpeaker {
    pub fn new(base_url: impl Into<String>, speaker_id: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            speaker_id: speaker_id.into(),
            tx,
        }
    }

    /// Subscribes to the audio stream.
    pub fn subscribe(&self) -> Receiver<Bytes> {
        self.tx.subscribe()
    }

    /// Sender feeding the audio stream, for [`SpeechStream`](super::SpeechStream).
    pub fn sender(&self) -> Sender<Bytes> {
        self.tx.clone()
    }

    fn tts_url(base: &str, text: &str, speaker_id: &str, language: &str) -> String {
        format!(
            "{}/api/tts?text={}&speaker_id={}&style_wav=&language_id={}",
            base.trim_end_matches('/'),
            encode(text),
            encode(speaker_id),
            encode(language)
        )
    }
}

impl Speaker for CoquiSpeaker {
    fn speak(&self, utterance: Utterance) {
        let url = Self::tts_url(
            &self.base_url,
            &utterance.text,
            &self.speaker_id,
            primary_subtag(utterance.language.code),
        );
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            trace!(text = %utterance.text, "tts request");
            match client.get(url).send().await.and_then(|r| r.error_for_status()) {
                Ok(resp) => {
                    let mut stream = resp.bytes_stream();
                    while let Some(chunk) = stream.next().await {
                        match chunk {
                            Ok(bytes) => {
                                let _ = tx.send(bytes);
                            }
                            Err(e) => {
                                warn!(error = ?e, "tts stream interrupted");
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!(error = ?e, "tts request failed"),
            }
            let _ = tx.send(Bytes::new());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::lookup;
    use httpmock::prelude::*;

    fn utterance(text: &str, code: &str) -> Utterance {
        Utterance {
            text: text.into(),
            language: lookup(code).unwrap(),
            rate: 180,
        }
    }

    /// Given a TTS server, when speaking, then its audio is broadcast.
    #[tokio::test]
    async fn streams_audio_then_delimiter() {
        // Arrange
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/tts")
                    .query_param("text", "Hello there.")
                    .query_param("speaker_id", "p1")
                    .query_param("style_wav", "")
                    .query_param("language_id", "fr");
                then.status(200).body("RIFF");
            })
            .await;
        let speaker = CoquiSpeaker::new(server.base_url(), "p1");
        let mut rx = speaker.subscribe();

        // Act
        speaker.speak(utterance("Hello there.", "fr-FR"));
        let audio = rx.recv().await.unwrap();
        let end = rx.recv().await.unwrap();

        // Assert
        assert_eq!(audio.as_ref(), b"RIFF");
        assert!(end.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_request_still_terminates_utterance() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tts");
                then.status(500);
            })
            .await;
        let speaker = CoquiSpeaker::new(server.base_url(), "p1");
        let mut rx = speaker.subscribe();
        speaker.speak(utterance("hi", "en-US"));
        assert!(rx.recv().await.unwrap().is_empty());
    }
}
