use axum::{
    Router,
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Sender};
use tracing::warn;

/// HTTP streamer for synthesized speech.
///
/// Serves `/speech.wav`; every connected client receives the audio bytes
/// broadcast by the speaker from the moment it connects.
pub struct SpeechStream {
    tx: Sender<Bytes>,
}

impl SpeechStream {
    pub fn new(tx: Sender<Bytes>) -> Self {
        Self { tx }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/speech.wav", get(move || self.clone().stream_audio()))
    }

    async fn stream_audio(self: Arc<Self>) -> Response {
        let mut rx = self.tx.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(bytes) => yield Ok::<Bytes, std::io::Error>(bytes),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "speech listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        match Response::builder()
            .header(header::CONTENT_TYPE, "audio/wav")
            .body(Body::from_stream(stream))
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = ?e, "failed to build speech response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// When bytes are sent on the channel they stream to the client.
    #[tokio::test]
    async fn streams_bytes_to_client() {
        let (tx, _) = broadcast::channel(4);
        let app = Arc::new(SpeechStream::new(tx.clone())).router();

        let req = Request::builder()
            .uri("/speech.wav")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "audio/wav");

        tx.send(Bytes::from_static(b"A")).unwrap();
        tx.send(Bytes::from_static(b"B")).unwrap();
        drop(tx);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"AB");
    }
}
