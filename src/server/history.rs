use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{error, warn};

use super::{AppState, attachment, message};
use crate::error::ReportError;
use crate::memory::CONTEXT_ENTRIES;

pub(super) async fn memory_status(State(state): State<AppState>) -> Json<Value> {
    let memory = state.assistant.memory();
    Json(json!({
        "memory_entries": memory.len().await,
        "capacity": memory.capacity(),
        "recent_conversations": memory.recent(CONTEXT_ENTRIES).await,
        "success": true,
    }))
}

pub(super) async fn clear_memory(State(state): State<AppState>) -> Json<Value> {
    state.assistant.memory().clear().await;
    message(true, "Conversation memory cleared successfully")
}

/// The memory window in its persisted JSON form.
pub(super) async fn download_memory(State(state): State<AppState>) -> Response {
    let entries = state.assistant.memory().all().await;
    match serde_json::to_vec_pretty(&entries) {
        Ok(body) => attachment("conversation_memory.json", "application/json", body),
        Err(e) => {
            error!(error = ?e, "failed to serialize memory");
            message(false, format!("Failed to get memory file: {e}")).into_response()
        }
    }
}

pub(super) async fn download_conversation(State(state): State<AppState>) -> Response {
    match state.assistant.log().contents().await {
        Ok(Some(body)) => attachment("conversation_log.txt", "text/plain; charset=utf-8", body),
        Ok(None) => message(false, "Conversation log file not found").into_response(),
        Err(e) => {
            warn!(error = ?e, "failed to read conversation log");
            message(false, format!("Failed to get conversation file: {e}")).into_response()
        }
    }
}

pub(super) async fn generate_report(State(state): State<AppState>) -> Json<Value> {
    match state.reports.generate(state.assistant.memory()).await {
        Ok(out) => Json(json!({
            "message": "Mental health analysis report generated successfully",
            "report_filename": out.filename,
            "analysis": out.report.analysis,
            "conversation_count": out.report.conversation_count,
            "success": true,
        })),
        Err(e @ ReportError::EmptyMemory) => Json(json!({
            "message": e.to_string(),
            "error": "Empty conversation memory",
            "success": false,
        })),
        Err(e) => {
            error!(error = ?e, "report generation failed");
            Json(json!({
                "message": format!("Failed to generate report: {e}"),
                "error": e.to_string(),
                "success": false,
            }))
        }
    }
}

pub(super) async fn list_reports(State(state): State<AppState>) -> Json<Value> {
    match state.reports.list().await {
        Ok(reports) => Json(json!({
            "count": reports.len(),
            "reports": reports,
            "success": true,
        })),
        Err(e) => {
            warn!(error = ?e, "failed to list reports");
            Json(json!({
                "reports": [],
                "message": format!("Failed to list reports: {e}"),
                "success": false,
            }))
        }
    }
}

pub(super) async fn download_report(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    match state.reports.read(&filename).await {
        Ok(body) => attachment(&filename, "application/json", body),
        Err(e @ (ReportError::NotFound | ReportError::InvalidName(_))) => {
            message(false, e.to_string()).into_response()
        }
        Err(e) => {
            warn!(error = ?e, %filename, "failed to read report");
            message(false, format!("Failed to download report: {e}")).into_response()
        }
    }
}
