use async_trait::async_trait;
use axum::{
    Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    routing::get,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, info, warn};

use super::{Camera, CameraHandle, Frame};

/// WebSocket bridge to a webcam running in the user's browser.
///
/// Spawns:
/// - WebSocket session task per client connection
///
/// The server broadcasts "snap" commands to connected pages and receives
/// JPEG bytes in response.
pub struct BrowserVision {
    tx: Sender<Vec<u8>>, // jpeg bytes
    cmd: Sender<String>, // commands like "snap"
}

impl Default for BrowserVision {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(8);
        let (cmd, _) = broadcast::channel(8);
        Self { tx, cmd }
    }
}

impl BrowserVision {
    /// Subscribe to incoming images.
    pub fn subscribe(&self) -> Receiver<Vec<u8>> {
        self.tx.subscribe()
    }

    /// Number of browser pages currently connected.
    pub fn connected(&self) -> usize {
        self.cmd.receiver_count()
    }

    /// Request a snapshot from all connected pages.
    pub fn request_snap(&self) {
        if let Err(e) = self.cmd.send("snap".into()) {
            warn!(target: "vision", error = ?e, "snap command send failed");
        }
    }

    /// Router exposing the `/vision-jpeg-in` endpoint.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route(
            "/vision-jpeg-in",
            get(move |ws: WebSocketUpgrade| {
                let vision = self.clone();
                async move { ws.on_upgrade(move |sock| vision.clone().session(sock)) }
            }),
        )
    }

    async fn session(self: Arc<Self>, mut socket: WebSocket) {
        info!(target: "vision", "browser camera connected");
        let mut cmd_rx = self.cmd.subscribe();
        loop {
            tokio::select! {
                Some(Ok(msg)) = socket.next() => {
                    match msg {
                        Message::Binary(data) => {
                            debug!(target: "vision", bytes = data.len(), "frame received");
                            if let Err(e) = self.tx.send(data) {
                                debug!(target: "vision", error = ?e, "no frame subscribers");
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Ok(cmd) => {
                            if socket.send(Message::Text(cmd)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(count)) => {
                            warn!(target: "vision", %count, "vision command channel lagged");
                        }
                    }
                }
                else => break,
            }
        }
        info!(target: "vision", "browser camera disconnected");
    }
}

/// [`Camera`] that asks a connected browser page for each frame.
pub struct BrowserCamera {
    vision: Arc<BrowserVision>,
    frame_timeout: Duration,
}

impl BrowserCamera {
    pub fn new(vision: Arc<BrowserVision>, frame_timeout: Duration) -> Self {
        Self {
            vision,
            frame_timeout,
        }
    }
}

#[async_trait]
impl Camera for BrowserCamera {
    async fn open(&self) -> anyhow::Result<Box<dyn CameraHandle>> {
        Ok(Box::new(BrowserHandle {
            vision: self.vision.clone(),
            frames: Some(self.vision.subscribe()),
            frame_timeout: self.frame_timeout,
        }))
    }
}

struct BrowserHandle {
    vision: Arc<BrowserVision>,
    frames: Option<Receiver<Vec<u8>>>,
    frame_timeout: Duration,
}

#[async_trait]
impl CameraHandle for BrowserHandle {
    async fn read_frame(&mut self) -> anyhow::Result<Frame> {
        let frames = self
            .frames
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("browser camera released"))?;
        if self.vision.connected() == 0 {
            anyhow::bail!("no browser camera connected");
        }
        // Drop frames that arrived before this request.
        while frames.try_recv().is_ok() {}
        self.vision.request_snap();
        let wait = async {
            loop {
                match frames.recv().await {
                    Ok(jpeg) => return Ok(Frame::new(jpeg)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(anyhow::anyhow!("vision channel closed"));
                    }
                }
            }
        };
        tokio::time::timeout(self.frame_timeout, wait)
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for browser frame"))?
    }

    fn release(&mut self) {
        self.frames = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
    use tracing_test::traced_test;

    async fn start_server(vision: Arc<BrowserVision>) -> std::net::SocketAddr {
        let app = vision.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    #[tokio::test]
    async fn forwards_images_and_commands() {
        let vision = Arc::new(BrowserVision::default());
        let addr = start_server(vision.clone()).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/vision-jpeg-in"))
            .await
            .unwrap();
        let mut rx = vision.subscribe();
        ws.send(WsMessage::Binary(vec![1, 2, 3])).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), vec![1, 2, 3]);
        vision.request_snap();
        let msg = ws.next().await.unwrap().unwrap();
        assert_eq!(msg, WsMessage::Text("snap".into()));
    }

    #[tokio::test]
    async fn camera_answers_snap_with_frame() {
        let vision = Arc::new(BrowserVision::default());
        let addr = start_server(vision.clone()).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/vision-jpeg-in"))
            .await
            .unwrap();
        // Simulated page: answer every snap with a tiny jpeg.
        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws.next().await {
                if msg == WsMessage::Text("snap".into()) {
                    ws.send(WsMessage::Binary(vec![0xFF, 0xD8])).await.unwrap();
                }
            }
        });
        while vision.connected() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let camera = BrowserCamera::new(vision, Duration::from_secs(2));
        let mut handle = camera.open().await.unwrap();
        let frame = handle.read_frame().await.unwrap();
        assert_eq!(frame.jpeg, vec![0xFF, 0xD8]);
        handle.release();
        assert!(handle.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn read_fails_without_connected_page() {
        let camera = BrowserCamera::new(Arc::new(BrowserVision::default()), Duration::from_millis(10));
        let mut handle = camera.open().await.unwrap();
        let err = handle.read_frame().await.unwrap_err();
        assert!(err.to_string().contains("no browser camera"));
    }

    #[traced_test]
    #[tokio::test]
    async fn warns_when_snap_has_no_listeners() {
        BrowserVision::default().request_snap();
        assert!(logs_contain("snap command send failed"));
    }
}
