use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Speaker, Utterance};

const SAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Speaker driving a local `say`-compatible command.
///
/// Each of the language's preferred voices is tried in turn with
/// `-v <voice> -r <rate>`, then the command's default voice.
#[derive(Clone, Debug)]
pub struct SaySpeaker {
    program: Arc<str>,
}

impl Default for SaySpeaker {
    fn default() -> Self {
        Self::new("say")
    }
}

impl SaySpeaker {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: Arc::from(program.as_ref()),
        }
    }

    /// Speaks `utterance` and returns the voice that worked, or `None` when
    /// only the default voice succeeded.
    pub async fn say(&self, utterance: &Utterance) -> anyhow::Result<Option<&'static str>> {
        let rate = utterance.rate.to_string();
        for voice in utterance.language.voices.iter().copied() {
            match self
                .run(&["-v", voice, "-r", &rate, &utterance.text])
                .await
            {
                Ok(()) => return Ok(Some(voice)),
                Err(e) => debug!(error = ?e, %voice, "voice unavailable"),
            }
        }
        self.run(&["-r", &rate, &utterance.text]).await?;
        Ok(None)
    }

    async fn run(&self, args: &[&str]) -> anyhow::Result<()> {
        let status = tokio::time::timeout(
            SAY_TIMEOUT,
            Command::new(&*self.program).args(args).kill_on_drop(true).status(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("{} timed out", self.program))??;
        if !status.success() {
            anyhow::bail!("{} exited with {status}", self.program);
        }
        Ok(())
    }
}

impl Speaker for SaySpeaker {
    fn speak(&self, utterance: Utterance) {
        let speaker = self.clone();
        tokio::spawn(async move {
            match speaker.say(&utterance).await {
                Ok(voice) => info!(
                    language = utterance.language.code,
                    rate = utterance.rate,
                    voice = voice.unwrap_or("default"),
                    "spoke reply"
                ),
                Err(e) => warn!(error = ?e, "all say voices failed"),
            }
        });
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::language::lookup;

    fn utterance() -> Utterance {
        Utterance {
            text: "hello".into(),
            language: lookup("de-DE").unwrap(),
            rate: 160,
        }
    }

    #[tokio::test]
    async fn first_voice_that_succeeds_is_used() {
        let speaker = SaySpeaker::new("true");
        assert_eq!(speaker.say(&utterance()).await.unwrap(), Some("Shelley"));
    }

    #[tokio::test]
    async fn reports_failure_when_every_attempt_fails() {
        let speaker = SaySpeaker::new("false");
        assert!(speaker.say(&utterance()).await.is_err());
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let speaker = SaySpeaker::new("/definitely/not/a/say/binary");
        assert!(speaker.say(&utterance()).await.is_err());
    }
}
