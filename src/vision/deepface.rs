use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::trace;

use super::{Classification, EmotionClassifier, FaceDetector, Frame, Region};

/// Client for a DeepFace REST service exposing `/analyze`.
///
/// The same call answers both questions the detector asks: where the faces
/// are and which emotion dominates.
#[derive(Clone, Debug)]
pub struct DeepFaceClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    results: Vec<FaceResult>,
}

#[derive(Debug, Deserialize)]
struct FaceResult {
    #[serde(default)]
    dominant_emotion: Option<String>,
    #[serde(default)]
    emotion: HashMap<String, f32>,
    #[serde(default)]
    face_confidence: f32,
    region: Option<RawRegion>,
}

#[derive(Debug, Deserialize)]
struct RawRegion {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl DeepFaceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn analyze(&self, frame: &Frame) -> anyhow::Result<Vec<FaceResult>> {
        let url = format!("{}/analyze", self.base_url.trim_end_matches('/'));
        let body = json!({
            "img": format!("data:image/jpeg;base64,{}", STANDARD.encode(&frame.jpeg)),
            "actions": ["emotion"],
            "detector_backend": "opencv",
            "enforce_detection": false,
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: AnalyzeResponse = resp.json().await?;
        trace!(target: "vision", faces = parsed.results.len(), "deepface analysis");
        // Without enforce_detection the service reports the whole frame
        // with zero confidence when it finds nothing.
        Ok(parsed
            .results
            .into_iter()
            .filter(|r| r.face_confidence > 0.0)
            .collect())
    }
}

#[async_trait]
impl FaceDetector for DeepFaceClient {
    async fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<Region>> {
        Ok(self
            .analyze(frame)
            .await?
            .into_iter()
            .filter_map(|r| r.region)
            .map(|r| Region {
                x: r.x,
                y: r.y,
                w: r.w,
                h: r.h,
            })
            .collect())
    }
}

#[async_trait]
impl EmotionClassifier for DeepFaceClient {
    async fn classify(&self, frame: &Frame) -> anyhow::Result<Option<Classification>> {
        let first = self.analyze(frame).await?.into_iter().next();
        Ok(first.and_then(|face| {
            let label = face.dominant_emotion?;
            let confidence = face.emotion.get(&label).copied().unwrap_or_default() / 100.0;
            Some(Classification { label, confidence })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn frame() -> Frame {
        Frame::new(vec![1, 2, 3])
    }

    #[tokio::test]
    async fn classifies_dominant_emotion() {
        // Arrange
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/analyze")
                    .body_contains("data:image/jpeg;base64,AQID");
                then.status(200).json_body(serde_json::json!({
                    "results": [{
                        "dominant_emotion": "happy",
                        "emotion": {"happy": 91.0, "sad": 2.0},
                        "face_confidence": 0.93,
                        "region": {"x": 10, "y": 20, "w": 30, "h": 40}
                    }]
                }));
            })
            .await;
        let client = DeepFaceClient::new(server.base_url());

        // Act
        let class = client.classify(&frame()).await.unwrap().unwrap();
        let regions = client.detect(&frame()).await.unwrap();

        // Assert
        assert_eq!(class.label, "happy");
        assert!((class.confidence - 0.91).abs() < 1e-4);
        assert_eq!(regions, vec![Region { x: 10, y: 20, w: 30, h: 40 }]);
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn zero_confidence_means_no_face() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze");
                then.status(200).json_body(serde_json::json!({
                    "results": [{
                        "dominant_emotion": "neutral",
                        "face_confidence": 0,
                        "region": {"x": 0, "y": 0, "w": 640, "h": 480}
                    }]
                }));
            })
            .await;
        let client = DeepFaceClient::new(server.base_url());
        assert!(client.detect(&frame()).await.unwrap().is_empty());
        assert!(client.classify(&frame()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn service_errors_propagate() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/analyze");
                then.status(500);
            })
            .await;
        let client = DeepFaceClient::new(server.base_url());
        assert!(client.detect(&frame()).await.is_err());
    }
}
