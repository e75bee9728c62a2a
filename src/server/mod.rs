//! HTTP surface.
//!
//! Every JSON body carries a `success` flag. Recoverable conditions such as
//! "no emotion detected yet" are reported with `success: false` and a 200
//! status rather than an error status.

use axum::{
    Form, Json, Router,
    extract::{FromRequest, rejection::FormRejection},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::assistant::Assistant;
use crate::detector::EmotionDetector;
use crate::error::SettingsError;
use crate::report::ReportGenerator;
use crate::speech::{Recognizer, SpeechStream};
use crate::vision::BrowserVision;

mod chat;
mod detector;
mod history;
mod settings;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    pub detector: Arc<EmotionDetector>,
    pub recognizer: Arc<dyn Recognizer>,
    pub reports: Arc<ReportGenerator>,
    /// Browser webcam bridge, mounted at `/vision-jpeg-in`.
    pub vision: Option<Arc<BrowserVision>>,
    /// Synthesized audio, mounted at `/speech.wav`.
    pub speech: Option<Arc<SpeechStream>>,
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let vision = state.vision.clone();
    let speech = state.speech.clone();
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/send_message", post(chat::send_message))
        .route("/voice_command", post(chat::voice_command))
        .route("/detect_emotion", post(chat::detect_emotion))
        .route("/speak", post(chat::speak))
        .route(
            "/emotion_detector/ai_with_emotion",
            get(chat::ai_with_emotion),
        )
        .route("/language/current", get(settings::current_language))
        .route("/language/list", get(settings::list_languages))
        .route("/language/set", post(settings::set_language))
        .route("/tts/rates", get(settings::rates))
        .route(
            "/tts/rate/:language",
            get(settings::rate).post(settings::set_rate),
        )
        .route("/tts/test_rate", post(settings::test_rate))
        .route("/emotion_detector/status", get(detector::status))
        .route("/emotion_detector/current", get(detector::current))
        .route("/emotion_detector/emotion_file", get(detector::emotion_file))
        .route("/emotion_detector/start", post(detector::start))
        .route("/emotion_detector/stop", post(detector::stop))
        .route("/emotion_detector/enable", post(detector::enable))
        .route("/emotion_detector/disable", post(detector::disable))
        .route("/emotion_detector/set_interval", post(detector::set_interval))
        .route("/memory/status", get(history::memory_status))
        .route("/memory/clear", post(history::clear_memory))
        .route("/memory/download", get(history::download_memory))
        .route("/conversation/download", get(history::download_conversation))
        .route("/generate_report", post(history::generate_report))
        .route("/reports/list", get(history::list_reports))
        .route("/reports/download/:filename", get(history::download_report))
        .with_state(state);
    if let Some(vision) = vision {
        app = app.merge(vision.router());
    }
    if let Some(speech) = speech {
        app = app.merge(speech.router());
    }
    app.layer(CorsLayer::permissive())
}

/// Serves `state` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "serving http");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.assistant.gateway().generator_name(),
        "detector_running": state.detector.is_running().await,
        "success": true,
    }))
}

/// Url-encoded form body.
///
/// A missing or malformed field is answered with a `success: false` JSON
/// body instead of axum's plain-text rejection.
#[derive(FromRequest)]
#[from_request(via(Form), rejection(BadForm))]
struct FormBody<T>(T);

struct BadForm(FormRejection);

impl From<FormRejection> for BadForm {
    fn from(rejection: FormRejection) -> Self {
        Self(rejection)
    }
}

impl IntoResponse for BadForm {
    fn into_response(self) -> Response {
        warn!(error = %self.0, "rejected form body");
        message(false, self.0.body_text()).into_response()
    }
}

/// Parses a numeric form field kept as text so bad input can be reported.
fn whole_number(field: &'static str, raw: &str) -> Result<i64, SettingsError> {
    raw.trim().parse().map_err(|_| SettingsError::NotANumber {
        field,
        value: raw.to_string(),
    })
}

/// `{"message": .., "success": ..}`
fn message(success: bool, message: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": message.into(), "success": success }))
}

/// A downloadable file response.
fn attachment(filename: &str, content_type: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}
