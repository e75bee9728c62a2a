use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{AppState, FormBody, attachment, message, whole_number};
use crate::detector::Start;

#[derive(Deserialize)]
pub(super) struct IntervalForm {
    interval: String,
}

pub(super) async fn status(State(state): State<AppState>) -> Json<Value> {
    let store = state.assistant.store();
    Json(json!({
        "status": state.detector.status().await,
        "current_emotion": store.read(),
        "last_updated": store.last_updated().map(|t| t.to_rfc3339()),
        "success": true,
    }))
}

pub(super) async fn current(State(state): State<AppState>) -> Json<Value> {
    let store = state.assistant.store();
    match store.read() {
        Some(label) => Json(json!({
            "emotion": label,
            "last_updated": store.last_updated().map(|t| t.to_rfc3339()),
            "success": true,
        })),
        None => Json(json!({
            "emotion": null,
            "message": "No emotion detected yet",
            "success": false,
        })),
    }
}

/// The stored label as a plain-text download.
pub(super) async fn emotion_file(State(state): State<AppState>) -> Response {
    match state.assistant.store().read() {
        Some(label) => attachment(
            "current_emotion.txt",
            "text/plain; charset=utf-8",
            format!("{label}\n").into_bytes(),
        ),
        None => message(false, "Emotion file not found").into_response(),
    }
}

pub(super) async fn start(State(state): State<AppState>) -> Json<Value> {
    match state.detector.start().await {
        Start::Started => message(true, "Background emotion detection started"),
        Start::AlreadyRunning => message(true, "Background emotion detection is already running"),
        Start::Disabled => message(
            false,
            "Background emotion detection is disabled. Enable it before starting.",
        ),
    }
}

pub(super) async fn stop(State(state): State<AppState>) -> Json<Value> {
    let was_running = state.detector.stop().await;
    Json(json!({
        "message": "Background emotion detection stopped",
        "was_running": was_running,
        "success": true,
    }))
}

pub(super) async fn enable(State(state): State<AppState>) -> Json<Value> {
    state.detector.set_enabled(true).await;
    message(true, "Background emotion detection enabled")
}

pub(super) async fn disable(State(state): State<AppState>) -> Json<Value> {
    state.detector.set_enabled(false).await;
    message(true, "Background emotion detection disabled")
}

pub(super) async fn set_interval(
    State(state): State<AppState>,
    FormBody(form): FormBody<IntervalForm>,
) -> Json<Value> {
    let secs = whole_number("interval", &form.interval);
    match secs.and_then(|secs| state.detector.try_set_interval(secs)) {
        Ok(secs) => message(true, format!("Detection interval set to {secs} seconds")),
        Err(e) => message(false, e.to_string()),
    }
}
