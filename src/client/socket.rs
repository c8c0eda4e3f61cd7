use rocket::futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectBackoff;
use crate::realtime::WsMessage;

/// Why [`NotificationSocket::run`] stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketExit {
    /// The server refused the token; reconnecting would not help.
    Rejected(String),
    /// Reconnect attempts ran out.
    GaveUp,
    /// The receiving side was dropped.
    Closed,
    /// The SUBSCRIBE frame could not be encoded; no connection was attempted.
    Failed(String),
}

enum Session {
    Dropped,
    Rejected(String),
    Closed,
}

/// `http://host:port` becomes `ws://host:port/ws`, `https` becomes `wss`.
pub fn socket_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let rest = base
        .strip_prefix("https://")
        .map(|rest| format!("wss://{}", rest))
        .or_else(|| base.strip_prefix("http://").map(|rest| format!("ws://{}", rest)))
        .unwrap_or_else(|| base.to_string());
    format!("{}/ws", rest)
}

/// Live notification feed with automatic reconnects.
pub struct NotificationSocket {
    url: String,
    token: String,
    backoff: ReconnectBackoff,
}

impl NotificationSocket {
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            url: socket_url(base_url),
            token: token.into(),
            backoff: ReconnectBackoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The first frame sent on every connection.
    pub fn subscribe_frame(&self) -> Result<String, serde_json::Error> {
        WsMessage::Subscribe {
            token: self.token.clone(),
        }
        .to_json()
    }

    /// Spawns [`run`](Self::run) and hands back the frame receiver.
    pub fn spawn(self) -> (mpsc::Receiver<WsMessage>, tokio::task::JoinHandle<SocketExit>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(self.run(tx));
        (rx, handle)
    }

    pub async fn run(mut self, frames: mpsc::Sender<WsMessage>) -> SocketExit {
        let subscribe = match self.subscribe_frame() {
            Ok(text) => text,
            Err(e) => {
                error!(url = %self.url, error = %e, "Could not encode SUBSCRIBE frame");
                return SocketExit::Failed(e.to_string());
            }
        };

        loop {
            match self.session(&subscribe, &frames).await {
                Ok(Session::Rejected(reason)) => return SocketExit::Rejected(reason),
                Ok(Session::Closed) => return SocketExit::Closed,
                Ok(Session::Dropped) => info!(url = %self.url, "Notification socket dropped"),
                Err(e) => warn!(url = %self.url, error = %e, "Notification socket failed"),
            }

            match self.backoff.next_delay() {
                Some(delay) => {
                    debug!(attempt = self.backoff.attempts(), ?delay, "Reconnecting");
                    sleep(delay).await;
                }
                None => {
                    warn!(url = %self.url, "Giving up on notification socket");
                    return SocketExit::GaveUp;
                }
            }
        }
    }

    async fn session(
        &mut self,
        subscribe: &str,
        frames: &mpsc::Sender<WsMessage>,
    ) -> Result<Session, tokio_tungstenite::tungstenite::Error> {
        let (mut stream, _) = connect_async(self.url.as_str()).await?;
        self.backoff.reset();

        stream.send(Message::Text(subscribe.to_string())).await?;

        while let Some(message) = stream.next().await {
            let text = match message? {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let frame = match WsMessage::from_json(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed socket frame");
                    continue;
                }
            };

            if let WsMessage::Error { message } = &frame {
                let reason = message.clone();
                let _ = frames.send(frame).await;
                return Ok(Session::Rejected(reason));
            }

            if frames.send(frame).await.is_err() {
                let _ = stream.close(None).await;
                return Ok(Session::Closed);
            }
        }

        Ok(Session::Dropped)
    }
}
