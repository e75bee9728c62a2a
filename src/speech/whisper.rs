use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{Recognition, Recognizer, primary_subtag};

const SAMPLE_RATE: u32 = 16_000;

/// In-process recognizer running a local whisper model.
pub struct WhisperRecognizer {
    ctx: Arc<WhisperContext>,
}

impl WhisperRecognizer {
    /// Load a whisper model from the given path.
    pub fn new(model: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = model
            .as_ref()
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("model path must be valid UTF-8"))?;
        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())?;
        Ok(Self { ctx: Arc::new(ctx) })
    }
}

/// Decodes a 16 kHz WAV clip into mono `i16` samples.
fn decode_wav(wav: &[u8]) -> anyhow::Result<Vec<i16>> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE {
        anyhow::bail!("expected {SAMPLE_RATE} Hz audio, got {}", spec.sample_rate);
    }
    let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    let channels = usize::from(spec.channels.max(1));
    if channels == 1 {
        return Ok(samples);
    }
    Ok(samples
        .chunks(channels)
        .map(|frame| (frame.iter().map(|&s| i32::from(s)).sum::<i32>() / frame.len() as i32) as i16)
        .collect())
}

#[async_trait]
impl Recognizer for WhisperRecognizer {
    async fn recognize(&self, wav: &[u8], language: &str) -> anyhow::Result<Recognition> {
        let pcm = decode_wav(wav)?;
        let mut audio = vec![0.0f32; pcm.len()];
        whisper_rs::convert_integer_to_float_audio(&pcm, &mut audio)?;
        let lang = primary_subtag(language).to_string();
        let ctx = self.ctx.clone();
        let text = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            let mut state = ctx.create_state()?;
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_language(Some(&lang));
            params.set_print_special(false);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);
            state.full(params, &audio)?;
            let mut text = String::new();
            for i in 0..state.full_n_segments()? {
                text.push_str(&state.full_get_segment_text(i)?);
            }
            Ok(text)
        })
        .await??;
        let text = text.trim();
        trace!(%language, %text, "whisper transcript");
        if text.is_empty() {
            Ok(Recognition::NoMatch)
        } else {
            Ok(Recognition::Text(text.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav(rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buf = Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut buf, spec).unwrap();
            for s in samples {
                w.write_sample(*s).unwrap();
            }
            w.finalize().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn stereo_is_averaged() {
        let pcm = decode_wav(&wav(16_000, 2, &[100, 300, -10, 10])).unwrap();
        assert_eq!(pcm, vec![200, 0]);
    }

    #[test]
    fn wrong_rate_is_rejected() {
        assert!(decode_wav(&wav(44_100, 1, &[0, 0])).is_err());
    }
}
