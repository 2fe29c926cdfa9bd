//! Transport seam between the connection state machine and the socket.
//!
//! [`Transport::open`] only initiates a connection. Everything after that is
//! reported through a [`TransportListener`] from the transport's own task.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::credentials::Credentials;

/// Close code reported when the socket ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported for a close frame without a status.
pub const NO_STATUS: u16 = 1005;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid websocket request: {0}")]
    InvalidRequest(String),

    #[error("no async runtime available to drive the socket")]
    NoRuntime,

    #[error("send queue is closed")]
    Closed,
}

/// What to open. `bearer` is sent as an `Authorization` header when present.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub url: Url,
    pub bearer: Credentials,
}

/// Lifecycle notifications from a transport, delivered from its own task.
#[async_trait]
pub trait TransportListener: Send + Sync {
    async fn on_open(&self);
    async fn on_text(&self, text: String);
    async fn on_closing(&self, code: u16, reason: String);
    async fn on_failure(&self, message: String);
}

/// An open (or opening) connection.
pub trait TransportHandle: Send + Sync {
    /// Queue a text frame. Never waits on the network.
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Ask for an orderly close.
    fn close(&self, code: u16, reason: &str);
}

pub trait Transport: Send + Sync {
    /// Start opening a connection. Errors here are synchronous failures; once
    /// this returns `Ok`, the outcome arrives through `listener`.
    fn open(
        &self,
        request: OpenRequest,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn TransportHandle>, TransportError>;
}

#[derive(Debug, Clone)]
pub struct WsOptions {
    /// Upper bound on the TCP/TLS/upgrade phase.
    pub connect_timeout: Duration,
    /// Keep-alive Ping period. `None` disables it.
    pub ping_interval: Option<Duration>,
}

impl Default for WsOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            ping_interval: Some(Duration::from_secs(30)),
        }
    }
}

/// WebSocket transport on tokio-tungstenite.
pub struct WsTransport {
    options: WsOptions,
}

impl WsTransport {
    pub fn new(options: WsOptions) -> Self {
        Self { options }
    }
}

impl Transport for WsTransport {
    fn open(
        &self,
        request: OpenRequest,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let mut ws_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        if let Some(token) = request.bearer.token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                TransportError::InvalidRequest("token is not a valid header value".to_string())
            })?;
            ws_request.headers_mut().insert(AUTHORIZATION, value);
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        runtime.spawn(run_socket(ws_request, rx, listener, self.options.clone()));

        Ok(Box::new(WsHandle { tx }))
    }
}

struct WsHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl TransportHandle for WsHandle {
    fn send(&self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(Message::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        let _ = self.tx.send(Message::Close(Some(frame)));
    }
}

/// Owns one socket from open to close. Reports exactly one of
/// `on_closing`/`on_failure` unless every handle is dropped first.
async fn run_socket(
    request: Request,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    listener: Arc<dyn TransportListener>,
    options: WsOptions,
) {
    let uri = request.uri().to_string();
    let connected =
        tokio::time::timeout(options.connect_timeout, tokio_tungstenite::connect_async(request))
            .await;

    let ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            warn!(url = %uri, error = %e, "websocket connect failed");
            listener.on_failure(e.to_string()).await;
            return;
        }
        Err(_) => {
            warn!(url = %uri, timeout = ?options.connect_timeout, "websocket connect timed out");
            listener
                .on_failure(format!("timed out after {:?}", options.connect_timeout))
                .await;
            return;
        }
    };

    info!(url = %uri, "websocket connected");
    listener.on_open().await;

    let (mut sink, mut stream) = ws.split();

    let ping_period = options
        .ping_interval
        .filter(|p| !p.is_zero())
        .unwrap_or(Duration::from_secs(3600));
    let keepalive_enabled = options.ping_interval.is_some_and(|p| !p.is_zero());
    let mut keepalive = tokio::time::interval_at(Instant::now() + ping_period, ping_period);

    loop {
        tokio::select! {
            msg = outgoing.recv() => {
                let Some(msg) = msg else {
                    debug!(url = %uri, "all handles dropped, closing socket");
                    let _ = sink.close().await;
                    return;
                };
                if let Err(e) = sink.send(msg).await {
                    warn!(error = %e, "failed to send message");
                    listener.on_failure(e.to_string()).await;
                    return;
                }
            }

            _ = keepalive.tick(), if keepalive_enabled => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    warn!(error = %e, "failed to send keep-alive ping");
                    listener.on_failure(e.to_string()).await;
                    return;
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(len = text.len(), "received text message");
                        listener.on_text(text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((NO_STATUS, String::new()));
                        info!(code, reason = %reason, "received close frame");
                        let _ = sink.close().await;
                        listener.on_closing(code, reason).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket error");
                        listener.on_failure(e.to_string()).await;
                        return;
                    }
                    None => {
                        info!("websocket stream ended");
                        listener
                            .on_closing(ABNORMAL_CLOSURE, "connection closed".to_string())
                            .await;
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TransportListener for Recorder {
        async fn on_open(&self) {
            self.events.lock().unwrap().push("open".to_string());
        }
        async fn on_text(&self, text: String) {
            self.events.lock().unwrap().push(format!("text:{text}"));
        }
        async fn on_closing(&self, code: u16, reason: String) {
            self.events.lock().unwrap().push(format!("closing:{code}:{reason}"));
        }
        async fn on_failure(&self, message: String) {
            self.events.lock().unwrap().push(format!("failure:{message}"));
        }
    }

    fn request(url: &str) -> OpenRequest {
        OpenRequest {
            url: Url::parse(url).unwrap(),
            bearer: Credentials::none(),
        }
    }

    #[test]
    fn test_open_outside_runtime_is_synchronous_failure() {
        let transport = WsTransport::new(WsOptions::default());
        let result = transport.open(request("ws://127.0.0.1:9"), Arc::new(Recorder::default()));
        assert!(matches!(result, Err(TransportError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_invalid_bearer_is_synchronous_failure() {
        let transport = WsTransport::new(WsOptions::default());
        let mut req = request("ws://127.0.0.1:9");
        req.bearer = Credentials::bearer("bad\ntoken");
        let result = transport.open(req, Arc::new(Recorder::default()));
        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_failure_once() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let recorder = Arc::new(Recorder::default());
        let transport = WsTransport::new(WsOptions {
            connect_timeout: Duration::from_secs(5),
            ping_interval: None,
        });
        let handle = transport
            .open(request(&format!("ws://127.0.0.1:{port}")), recorder.clone())
            .unwrap();

        for _ in 0..100 {
            if !recorder.events.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("failure:"));
        drop(handle);
    }
}
