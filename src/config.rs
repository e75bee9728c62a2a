use clap::Parser;
use daemon_common::LogLevel;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::language::DEFAULT_LANGUAGE;

/// Command line arguments for the confidant binary.
#[derive(Parser, Debug)]
#[command(name = "confidant", version, about = "Emotion-aware wellness assistant server")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, env = "CONFIDANT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind, overriding the config file
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind, overriding the config file
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding the emotion file, memory, log and reports
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,

    /// Run as a background daemon
    #[arg(short = 'd', long)]
    pub daemon: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub detector: DetectorConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ServerConfig {
    pub fn emotion_file(&self) -> PathBuf {
        self.data_dir.join("current_emotion.txt")
    }

    pub fn memory_file(&self) -> PathBuf {
        self.data_dir.join("conversation_memory.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("conversation_log.txt")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Ollama,
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    /// Service root; each provider has its own default.
    pub base_url: Option<String>,
    /// Falls back to `GOOGLE_API_KEY`.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Extra attempts after the first failure.
    pub retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            model: "gemini-2.0-flash-lite".into(),
            base_url: None,
            api_key: None,
            temperature: 0.9,
            max_output_tokens: 512,
            retries: 1,
            retry_delay_ms: 500,
        }
    }
}

impl LlmConfig {
    /// The configured key, else `GOOGLE_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Webcam frames pushed by the browser over a WebSocket.
    Browser,
    /// Local capture device, requires the `opencv` feature.
    Opencv,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub interval_secs: u64,
    /// Whether the background loop may run at startup.
    pub enabled: bool,
    /// Start the loop as soon as the server is up.
    pub autostart: bool,
    pub device: Device,
    pub camera_index: i32,
    /// DeepFace-compatible analysis service.
    pub analyzer_url: String,
    /// Use a local Haar cascade for face regions (`opencv` feature).
    pub cascade_path: Option<PathBuf>,
    pub frame_timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            enabled: false,
            autostart: false,
            device: Device::Browser,
            camera_index: 0,
            analyzer_url: "http://localhost:5005".into(),
            cascade_path: None,
            frame_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Coqui TTS server, audio streamed at `/speech.wav`.
    Coqui,
    /// Local `say`-compatible command.
    Say,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub engine: Engine,
    pub tts_url: String,
    pub speaker_id: String,
    pub say_program: String,
    pub stt_url: String,
    /// Local whisper model (`whisper` feature); replaces `stt_url` when set.
    pub whisper_model: Option<PathBuf>,
    pub default_language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: Engine::Coqui,
            tts_url: "http://localhost:5002".into(),
            speaker_id: "p234".into(),
            say_program: "say".into(),
            stt_url: "http://localhost:8080".into(),
            whisper_model: None,
            default_language: DEFAULT_LANGUAGE.into(),
        }
    }
}

/// Load a [`Config`] from a TOML file.
pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(toml::from_str(&text)?)
}

impl Config {
    /// Loads the file named on the command line, if any, and applies the
    /// command line overrides.
    pub async fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut cfg = match &cli.config {
            Some(path) => load(path).await?,
            None => Config::default(),
        };
        if let Some(host) = &cli.host {
            cfg.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            cfg.server.port = port;
        }
        if let Some(dir) = &cli.data_dir {
            cfg.server.data_dir = dir.clone();
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.llm.provider, Provider::Gemini);
        assert_eq!(cfg.llm.retries, 1);
        assert!(!cfg.detector.enabled);
        assert_eq!(cfg.detector.interval_secs, 5);
        assert_eq!(cfg.speech.engine, Engine::Coqui);
        assert_eq!(cfg.server.memory_file(), Path::new("data/conversation_memory.json"));
    }

    #[test]
    fn sections_override_individual_fields() {
        let cfg: Config = toml::from_str(
            r#"
            [llm]
            provider = "ollama"
            model = "llama3"

            [detector]
            device = "opencv"
            enabled = true

            [speech]
            engine = "none"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.llm.provider, Provider::Ollama);
        assert_eq!(cfg.llm.model, "llama3");
        assert_eq!(cfg.llm.max_output_tokens, 512);
        assert_eq!(cfg.detector.device, Device::Opencv);
        assert!(cfg.detector.enabled);
        assert_eq!(cfg.speech.engine, Engine::None);
        assert_eq!(cfg.speech.tts_url, "http://localhost:5002");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(toml::from_str::<Config>("[llm]\nprovider = \"skynet\"").is_err());
    }

    #[tokio::test]
    async fn cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confidant.toml");
        tokio::fs::write(&path, "[server]\nport = 9000\nhost = \"127.0.0.1\"")
            .await
            .unwrap();
        let cli = Cli::parse_from([
            "confidant",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "9100",
        ]);
        let cfg = Config::from_cli(&cli).await.unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.host, "127.0.0.1");
    }
}
