use confidant::conversation_log::ConversationLog;
use confidant::language::Settings;
use confidant::llm::{GeminiClient, ModelGateway, RetryPolicy};
use confidant::persist::MemorySlot;
use confidant::speech::SilentSpeaker;
use confidant::{Assistant, ConversationEntry, ConversationMemory, EmotionStore};
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const PATH: &str = "/v1beta/models/gemini-2.0-flash-lite:generateContent";

async fn assistant(base_url: String, dir: &std::path::Path) -> Assistant {
    let store = Arc::new(EmotionStore::open(Arc::new(MemorySlot::new())).await);
    let memory = Arc::new(ConversationMemory::load(Arc::new(MemorySlot::new())).await);
    let log = Arc::new(ConversationLog::new(dir.join("conversation_log.txt")));
    let client = GeminiClient::new(base_url, "test-key", "gemini-2.0-flash-lite");
    let gateway = Arc::new(ModelGateway::new(
        Arc::new(client),
        RetryPolicy::new(1, Duration::from_millis(10)),
    ));
    Assistant::new(
        store,
        memory,
        log,
        gateway,
        Arc::new(Settings::new("en-US")),
        Arc::new(SilentSpeaker),
    )
}

#[tokio::test]
async fn prompt_carries_emotion_and_history() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(PATH)
                .header("x-goog-api-key", "test-key")
                .body_contains("feeling sad")
                .body_contains("User: I lost my job")
                .body_contains("User input: I cannot sleep");
            then.status(200).json_body(json!({
                "candidates": [{"content": {"parts": [{"text": "That sounds exhausting. "}]}}]
            }));
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let assistant = assistant(server.base_url(), dir.path()).await;
    assistant.store().write("sad").await;
    assistant
        .memory()
        .append(ConversationEntry::new("I lost my job", "I am sorry.", None))
        .await;

    let reply = assistant.chat("I cannot sleep").await;

    mock.assert_async().await;
    assert_eq!(reply.text, "That sounds exhausting.");
    assert_eq!(reply.emotion.as_deref(), Some("sad"));
    assert!(!reply.fallback);
    let last = assistant.memory().all().await.pop().unwrap();
    assert_eq!(last.user, "I cannot sleep");
    assert_eq!(last.emotion.as_deref(), Some("sad"));
}

#[tokio::test]
async fn outage_is_retried_then_answered_locally() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(PATH);
            then.status(503);
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let assistant = assistant(server.base_url(), dir.path()).await;

    let reply = assistant.chat("I feel overwhelmed").await;

    mock.assert_hits_async(2).await;
    assert!(reply.fallback);
    assert!(reply.text.starts_with("I feel overwhelmed"));
    assert!(reply.text.split_whitespace().count() <= 30);
    let log = std::fs::read_to_string(dir.path().join("conversation_log.txt")).unwrap();
    assert!(log.contains("User: I feel overwhelmed"));
}

#[tokio::test]
async fn empty_candidates_count_as_failure() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(PATH);
            then.status(200).json_body(json!({"candidates": []}));
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let assistant = assistant(server.base_url(), dir.path()).await;

    let reply = assistant.respond("hello").await;

    mock.assert_hits_async(2).await;
    assert!(reply.fallback);
    assert!(assistant.memory().is_empty().await);
}
