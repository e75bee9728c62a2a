//! Speech synthesis and recognition boundaries.

use async_trait::async_trait;
use tracing::{debug, info, warn};

mod coqui;
mod say;
mod stream;
#[cfg(feature = "whisper")]
mod whisper;
mod whisper_server;

pub use coqui::CoquiSpeaker;
pub use say::SaySpeaker;
pub use stream::SpeechStream;
#[cfg(feature = "whisper")]
pub use whisper::WhisperRecognizer;
pub use whisper_server::WhisperServerRecognizer;

use crate::language::{DEFAULT_LANGUAGE, Language};

/// Text to be spoken aloud.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub language: &'static Language,
    /// Words per minute.
    pub rate: u32,
}

/// Fire-and-forget text-to-speech output.
pub trait Speaker: Send + Sync {
    /// Queues `utterance` for playback and returns immediately.
    ///
    /// Failures are logged by the implementation.
    fn speak(&self, utterance: Utterance);
}

/// Speaker that discards everything, for headless runs.
#[derive(Debug, Default)]
pub struct SilentSpeaker;

impl Speaker for SilentSpeaker {
    fn speak(&self, utterance: Utterance) {
        debug!(text = %utterance.text, "speech output disabled");
    }
}

/// Outcome of recognizing one clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Text(String),
    /// The clip held no intelligible speech.
    NoMatch,
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribes a WAV clip spoken in `language`.
    async fn recognize(&self, wav: &[u8], language: &str) -> anyhow::Result<Recognition>;
}

/// Primary subtag of a language code, e.g. `en` for `en-US`.
pub(crate) fn primary_subtag(code: &str) -> &str {
    code.split(['-', '_']).next().unwrap_or(code)
}

/// Recognizes `wav`, retrying in English when another language finds
/// nothing. Service failures are logged and reported as no match.
pub async fn recognize_with_fallback(
    recognizer: &dyn Recognizer,
    wav: &[u8],
    language: &str,
) -> Recognition {
    match recognizer.recognize(wav, language).await {
        Ok(Recognition::Text(text)) => {
            info!(%language, %text, "speech recognized");
            return Recognition::Text(text);
        }
        Ok(Recognition::NoMatch) => debug!(%language, "no speech recognized"),
        Err(e) => {
            warn!(error = ?e, %language, "speech recognition failed");
            return Recognition::NoMatch;
        }
    }
    if language == DEFAULT_LANGUAGE {
        return Recognition::NoMatch;
    }
    match recognizer.recognize(wav, DEFAULT_LANGUAGE).await {
        Ok(Recognition::Text(text)) => {
            info!(%text, "speech recognized after falling back to English");
            Recognition::Text(text)
        }
        Ok(Recognition::NoMatch) => Recognition::NoMatch,
        Err(e) => {
            warn!(error = ?e, "English fallback recognition failed");
            Recognition::NoMatch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Recognizer that only understands the listed languages.
    struct OnlyIn {
        languages: Vec<&'static str>,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Recognizer for OnlyIn {
        async fn recognize(&self, _wav: &[u8], language: &str) -> anyhow::Result<Recognition> {
            self.asked.lock().unwrap().push(language.to_string());
            if self.languages.contains(&language) {
                Ok(Recognition::Text(format!("heard in {language}")))
            } else {
                Ok(Recognition::NoMatch)
            }
        }
    }

    fn only_in(languages: &[&'static str]) -> OnlyIn {
        OnlyIn {
            languages: languages.to_vec(),
            asked: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn falls_back_to_english() {
        let rec = only_in(&["en-US"]);
        let out = recognize_with_fallback(&rec, b"wav", "fr-FR").await;
        assert_eq!(out, Recognition::Text("heard in en-US".into()));
        assert_eq!(*rec.asked.lock().unwrap(), ["fr-FR", "en-US"]);
    }

    #[tokio::test]
    async fn english_is_not_retried() {
        let rec = only_in(&[]);
        assert_eq!(
            recognize_with_fallback(&rec, b"wav", "en-US").await,
            Recognition::NoMatch
        );
        assert_eq!(rec.asked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn first_language_wins() {
        let rec = only_in(&["hi-IN", "en-US"]);
        let out = recognize_with_fallback(&rec, b"wav", "hi-IN").await;
        assert_eq!(out, Recognition::Text("heard in hi-IN".into()));
    }

    #[test]
    fn primary_subtag_strips_region() {
        assert_eq!(primary_subtag("pt-BR"), "pt");
        assert_eq!(primary_subtag("ar_001"), "ar");
        assert_eq!(primary_subtag("ja"), "ja");
    }
}
