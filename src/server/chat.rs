use axum::{Json, body::Bytes, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{AppState, FormBody};
use crate::speech::{Recognition, recognize_with_fallback};

const NOT_HEARD: &str =
    "I couldn't hear you clearly. Please try speaking again, a bit louder and clearer.";
const NO_FACE_REPLY: &str =
    "Could not detect emotion. Please ensure your face is visible in the camera and try again.";
const NO_EMOTION_YET: &str = "No emotion detected yet. Please ensure the background emotion detection is running and your face is visible.";

#[derive(Deserialize)]
pub(super) struct MessageForm {
    message: String,
}

#[derive(Deserialize)]
pub(super) struct TextForm {
    text: String,
}

pub(super) async fn send_message(
    State(state): State<AppState>,
    FormBody(form): FormBody<MessageForm>,
) -> Json<Value> {
    let message = form.message.trim();
    if message.is_empty() {
        return Json(json!({
            "response": "Please type a message so I can respond.",
            "success": false,
            "error": "Empty message",
        }));
    }
    info!(%message, "processing message");
    let reply = state.assistant.chat(message).await;
    Json(json!({ "response": reply.text, "success": true }))
}

/// Accepts a WAV clip in the request body.
pub(super) async fn voice_command(State(state): State<AppState>, wav: Bytes) -> Json<Value> {
    let language = state.assistant.settings().language();
    let heard = if wav.is_empty() {
        Recognition::NoMatch
    } else {
        recognize_with_fallback(state.recognizer.as_ref(), &wav, language.code).await
    };
    let command = match heard {
        Recognition::Text(text) if !text.trim().is_empty() => text,
        _ => {
            state.assistant.speak(NOT_HEARD);
            return Json(json!({
                "command": null,
                "response": NOT_HEARD,
                "success": false,
                "error": "No speech detected",
            }));
        }
    };
    let reply = state
        .assistant
        .converse(&command, &format!("[Voice] {command}"))
        .await;
    state.assistant.speak(&reply.text);
    Json(json!({
        "command": command,
        "response": reply.text,
        "success": true,
    }))
}

pub(super) async fn detect_emotion(State(state): State<AppState>) -> Json<Value> {
    let Some(class) = state.detector.detect_once().await else {
        return Json(json!({
            "emotion": null,
            "response": NO_FACE_REPLY,
            "success": false,
            "error": "No emotion detected",
        }));
    };
    let said = format!("I'm feeling {}", class.label);
    let reply = state
        .assistant
        .converse(&said, &format!("[Emotion Detection] {said}"))
        .await;
    Json(json!({
        "emotion": class.label,
        "confidence": class.confidence,
        "response": reply.text,
        "success": true,
    }))
}

pub(super) async fn ai_with_emotion(State(state): State<AppState>) -> Json<Value> {
    let Some(emotion) = state.assistant.store().read_emotion() else {
        return Json(json!({
            "emotion": null,
            "response": NO_EMOTION_YET,
            "success": false,
        }));
    };
    let reply = state
        .assistant
        .respond(&format!(
            "Please respond to me knowing that I'm currently feeling {emotion}"
        ))
        .await;
    state
        .assistant
        .record(
            &format!("[AI with Emotion] Please respond knowing I'm feeling {emotion}"),
            &reply.text,
            Some(emotion.clone()),
        )
        .await;
    Json(json!({
        "emotion": emotion,
        "response": reply.text,
        "success": true,
    }))
}

pub(super) async fn speak(
    State(state): State<AppState>,
    FormBody(form): FormBody<TextForm>,
) -> Json<Value> {
    if form.text.trim().is_empty() {
        return Json(json!({ "success": false, "error": "Nothing to speak" }));
    }
    state.assistant.speak(&form.text);
    Json(json!({ "success": true }))
}
