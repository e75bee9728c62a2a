//! Assembly of the running service from a [`Config`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::assistant::Assistant;
use crate::config::{Config, Device, DetectorConfig, Engine, LlmConfig, Provider, SpeechConfig};
use crate::conversation_log::ConversationLog;
use crate::detector::{EmotionDetector, Start};
use crate::emotion::EmotionStore;
use crate::language::Settings;
use crate::llm::{
    GEMINI_BASE_URL, GeminiClient, MockGenerator, ModelGateway, OllamaClient, RetryPolicy,
    TextGenerator,
};
use crate::memory::ConversationMemory;
use crate::persist::FileSlot;
use crate::report::ReportGenerator;
use crate::server::{self, AppState};
use crate::shutdown::shutdown_signal;
use crate::speech::{
    CoquiSpeaker, Recognizer, SaySpeaker, SilentSpeaker, Speaker, SpeechStream,
    WhisperServerRecognizer,
};
use crate::vision::{BrowserCamera, BrowserVision, Camera, DeepFaceClient, FaceDetector};

const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Builds the text generator named by `cfg.provider`.
pub fn build_generator(cfg: &LlmConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    Ok(match cfg.provider {
        Provider::Gemini => {
            let key = cfg.resolved_api_key().ok_or_else(|| {
                anyhow::anyhow!("no Gemini API key; set llm.api_key or GOOGLE_API_KEY")
            })?;
            let base = cfg.base_url.as_deref().unwrap_or(GEMINI_BASE_URL);
            Arc::new(
                GeminiClient::new(base, key, &cfg.model)
                    .with_sampling(cfg.temperature, cfg.max_output_tokens),
            )
        }
        Provider::Ollama => {
            let base = cfg.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL);
            Arc::new(OllamaClient::from_url(base, &cfg.model)?.with_temperature(cfg.temperature))
        }
        Provider::Mock => Arc::new(MockGenerator::default()),
    })
}

/// Builds the speaker and, for streamed engines, the audio endpoint.
pub fn build_speaker(cfg: &SpeechConfig) -> (Arc<dyn Speaker>, Option<Arc<SpeechStream>>) {
    match cfg.engine {
        Engine::Coqui => {
            let speaker = CoquiSpeaker::new(&cfg.tts_url, &cfg.speaker_id);
            let stream = Arc::new(SpeechStream::new(speaker.sender()));
            (Arc::new(speaker), Some(stream))
        }
        Engine::Say => (Arc::new(SaySpeaker::new(&cfg.say_program)), None),
        Engine::None => (Arc::new(SilentSpeaker), None),
    }
}

pub fn build_recognizer(cfg: &SpeechConfig) -> anyhow::Result<Arc<dyn Recognizer>> {
    if let Some(model) = &cfg.whisper_model {
        #[cfg(feature = "whisper")]
        {
            info!(model = %model.display(), "loading local whisper model");
            return Ok(Arc::new(crate::speech::WhisperRecognizer::new(model)?));
        }
        #[cfg(not(feature = "whisper"))]
        warn!(
            model = %model.display(),
            "built without the whisper feature, using the recognition server instead"
        );
    }
    Ok(Arc::new(WhisperServerRecognizer::new(&cfg.stt_url)))
}

/// Builds the detector and, for browser capture, the WebSocket bridge.
pub fn build_detector(
    cfg: &DetectorConfig,
    store: Arc<EmotionStore>,
) -> anyhow::Result<(Arc<EmotionDetector>, Option<Arc<BrowserVision>>)> {
    let frame_timeout = Duration::from_millis(cfg.frame_timeout_ms);
    let (camera, vision) = match cfg.device {
        Device::Browser => {
            let vision = Arc::new(BrowserVision::default());
            let camera: Arc<dyn Camera> = Arc::new(BrowserCamera::new(vision.clone(), frame_timeout));
            (camera, Some(vision))
        }
        #[cfg(feature = "opencv")]
        Device::Opencv => {
            let camera: Arc<dyn Camera> =
                Arc::new(crate::vision::OpenCvCamera::new(cfg.camera_index));
            (camera, None)
        }
        #[cfg(not(feature = "opencv"))]
        Device::Opencv => anyhow::bail!("device \"opencv\" requires the opencv feature"),
    };
    let analyzer = Arc::new(DeepFaceClient::new(&cfg.analyzer_url));
    let faces: Arc<dyn FaceDetector> = match &cfg.cascade_path {
        #[cfg(feature = "opencv")]
        Some(path) => Arc::new(crate::vision::CascadeFaceDetector::new(
            path.to_string_lossy(),
        )),
        #[cfg(not(feature = "opencv"))]
        Some(path) => {
            warn!(path = %path.display(), "cascade_path ignored without the opencv feature");
            analyzer.clone()
        }
        None => analyzer.clone(),
    };
    let detector = EmotionDetector::new(camera, faces, analyzer, store)
        .with_interval(cfg.interval_secs)
        .with_enabled(cfg.enabled);
    Ok((Arc::new(detector), vision))
}

/// Builds every component and the request state from `cfg`.
pub async fn build_state(cfg: &Config) -> anyhow::Result<AppState> {
    let server = &cfg.server;
    tokio::fs::create_dir_all(&server.data_dir).await?;

    let store = Arc::new(EmotionStore::open(Arc::new(FileSlot::new(server.emotion_file()))).await);
    let memory =
        Arc::new(ConversationMemory::load(Arc::new(FileSlot::new(server.memory_file()))).await);
    let log = Arc::new(ConversationLog::new(server.log_file()));

    let generator = build_generator(&cfg.llm)?;
    let gateway = Arc::new(ModelGateway::new(
        generator,
        RetryPolicy::new(cfg.llm.retries, Duration::from_millis(cfg.llm.retry_delay_ms)),
    ));
    let settings = Arc::new(Settings::new(&cfg.speech.default_language));
    let (speaker, speech) = build_speaker(&cfg.speech);
    let recognizer = build_recognizer(&cfg.speech)?;
    let (detector, vision) = build_detector(&cfg.detector, store.clone())?;
    let reports = Arc::new(ReportGenerator::new(server.reports_dir(), gateway.clone()));

    info!(
        model = gateway.generator_name(),
        memory_entries = memory.len().await,
        language = settings.language().code,
        "components ready"
    );
    let assistant = Arc::new(Assistant::new(
        store, memory, log, gateway, settings, speaker,
    ));
    Ok(AppState {
        assistant,
        detector,
        recognizer,
        reports,
        vision,
        speech,
    })
}

/// Runs the server until `shutdown` resolves, then stops the detector.
pub async fn run_until<F>(cfg: Config, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = build_state(&cfg).await?;
    let detector = state.detector.clone();
    if cfg.detector.autostart && detector.start().await == Start::Disabled {
        warn!("detector.autostart is set but detection is disabled");
    }
    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = TcpListener::bind(&addr).await?;
    let served = server::serve(listener, state, shutdown).await;
    info!("stopping background emotion detection");
    detector.stop().await;
    served
}

/// Runs the server until Ctrl+C or SIGTERM.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    run_until(cfg, shutdown_signal()).await
}
