use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{AppState, FormBody, message, whole_number};
use crate::error::SettingsError;
use crate::language::{LANGUAGES, check_rate, lookup, normalize_language};

#[derive(Deserialize)]
pub(super) struct LanguageForm {
    language: String,
}

#[derive(Deserialize)]
pub(super) struct RateForm {
    rate: String,
}

#[derive(Deserialize)]
pub(super) struct TestRateForm {
    language: String,
    rate: String,
    #[serde(default = "sample_text")]
    text: String,
}

fn sample_text() -> String {
    "Hello, this is a test of the speech rate.".into()
}

pub(super) async fn current_language(State(state): State<AppState>) -> Json<Value> {
    let language = state.assistant.settings().language();
    Json(json!({
        "language": language.code,
        "name": language.name,
        "success": true,
    }))
}

pub(super) async fn list_languages(State(state): State<AppState>) -> Json<Value> {
    let languages: Vec<Value> = LANGUAGES
        .iter()
        .map(|l| json!({ "code": l.code, "name": l.name }))
        .collect();
    Json(json!({
        "languages": languages,
        "current": state.assistant.settings().language().code,
        "success": true,
    }))
}

pub(super) async fn set_language(
    State(state): State<AppState>,
    FormBody(form): FormBody<LanguageForm>,
) -> Json<Value> {
    match state.assistant.settings().set_language(&form.language) {
        Ok(language) => Json(json!({
            "message": format!("Language successfully changed to {}", language.code),
            "language": language.code,
            "success": true,
        })),
        Err(e) => message(false, e.to_string()),
    }
}

pub(super) async fn rates(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "rates": state.assistant.settings().rates(), "success": true }))
}

pub(super) async fn rate(State(state): State<AppState>, Path(language): Path<String>) -> Json<Value> {
    let code = normalize_language(&language);
    Json(json!({
        "language": code,
        "rate": state.assistant.settings().rate(&code),
        "success": true,
    }))
}

pub(super) async fn set_rate(
    State(state): State<AppState>,
    Path(language): Path<String>,
    FormBody(form): FormBody<RateForm>,
) -> Json<Value> {
    let code = normalize_language(&language);
    let settings = state.assistant.settings();
    let rate = whole_number("rate", &form.rate);
    match rate.and_then(|rate| settings.set_rate(&code, rate)) {
        Ok(rate) => Json(json!({
            "language": code,
            "rate": rate,
            "message": format!("Speech rate set to {rate} WPM for {code}"),
            "success": true,
        })),
        Err(e) => Json(json!({
            "language": code,
            "rate": settings.rate(&code),
            "message": e.to_string(),
            "success": false,
        })),
    }
}

/// Speaks sample text at a given rate without changing the stored rate.
pub(super) async fn test_rate(
    State(state): State<AppState>,
    FormBody(form): FormBody<TestRateForm>,
) -> Json<Value> {
    let checked = lookup(&form.language)
        .ok_or_else(|| SettingsError::UnsupportedLanguage(normalize_language(&form.language)))
        .and_then(|language| {
            let rate = check_rate(whole_number("rate", &form.rate)?)?;
            Ok((language, rate))
        });
    match checked {
        Ok((language, rate)) => {
            state.assistant.speak_at(&form.text, language, rate);
            message(
                true,
                format!("Tested speech at {rate} WPM for {}", language.code),
            )
        }
        Err(e) => message(false, e.to_string()),
    }
}
