//! OpenClaw Gateway client.
//!
//! Owns the connection state machine. Caller operations and transport
//! callbacks are serialized through one lock; everything the caller needs to
//! see is pushed onto a single [`OutcomeChannel`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use clawlink_protocol::{self as protocol, ChatSendParams, ConnectParams, Inbound};

use crate::address::GatewayAddress;
use crate::call_id::{idempotency_key, CallIdGenerator};
use crate::config::{ClientIdentity, Config, Dialect, TokenPlacement};
use crate::credentials::Credentials;
use crate::error::GatewayError;
use crate::outcome::{Outcome, OutcomeChannel, OutcomeStream};
use crate::transport::{OpenRequest, Transport, TransportHandle, TransportListener, WsTransport};
use crate::url_policy;

/// Error outcome for sends attempted without a ready connection.
pub const NOT_CONNECTED: &str = "Gateway not connected. Please check settings.";

/// Error outcome for sends the transport refused to queue.
pub const SEND_FAILED: &str = "Failed to send message";

/// Error outcome for a handshake the transport refused to queue.
pub const HANDSHAKE_SEND_FAILED: &str = "Failed to send handshake";

const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Opening,
    TransportOpen,
    AwaitingHandshakeAck,
    Ready,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    /// States in which the transport may still report a close or failure.
    fn is_live(self) -> bool {
        matches!(
            self,
            ConnectionState::Opening
                | ConnectionState::TransportOpen
                | ConnectionState::AwaitingHandshakeAck
                | ConnectionState::Ready
        )
    }
}

/// What a successful `connect` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectProgress {
    /// Already connected; nothing was opened.
    AlreadyReady,
    /// A transport open was initiated. Watch the outcomes for
    /// [`Outcome::Connected`] or an error.
    Opening,
}

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub identity: ClientIdentity,
    pub token_placement: TokenPlacement,
    pub dialect: Dialect,
    /// `None` waits for the handshake acknowledgement indefinitely.
    pub handshake_timeout: Option<Duration>,
}

/// OpenClaw Gateway client
pub struct GatewayClient {
    shared: Arc<Shared>,
}

struct Shared {
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    call_ids: CallIdGenerator,
    outcomes: OutcomeChannel,
    conn: Mutex<Connection>,
}

struct Connection {
    state: ConnectionState,
    /// Bumped on every `connect`; callbacks from older attempts are stale.
    attempt: u64,
    handle: Option<Box<dyn TransportHandle>>,
    credentials: Credentials,
    handshake_id: Option<String>,
}

impl Connection {
    /// Let go of the transport, optionally asking the peer for a clean close.
    fn release(&mut self, close_reason: Option<&str>) {
        if let Some(handle) = self.handle.take() {
            if let Some(reason) = close_reason {
                handle.close(NORMAL_CLOSURE, reason);
            }
        }
        self.handshake_id = None;
    }
}

impl GatewayClient {
    pub fn new(options: ClientOptions, transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                transport,
                call_ids: CallIdGenerator::new(),
                outcomes: OutcomeChannel::new(),
                conn: Mutex::new(Connection {
                    state: ConnectionState::Idle,
                    attempt: 0,
                    handle: None,
                    credentials: Credentials::none(),
                    handshake_id: None,
                }),
            }),
        }
    }

    /// Client on the WebSocket transport, configured from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.client_options(),
            Arc::new(WsTransport::new(config.transport_options())),
        )
    }

    /// Consumer handle for the outcome queue.
    pub fn outcomes(&self) -> OutcomeStream {
        self.shared.outcomes.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.conn.lock().await.state
    }

    pub async fn is_ready(&self) -> bool {
        self.state().await == ConnectionState::Ready
    }

    /// Start connecting to `address` (http:// or https://).
    ///
    /// Returns once the open is initiated; the handshake result arrives on the
    /// outcome queue. Any previous transport is torn down first.
    pub async fn connect(
        &self,
        address: &str,
        credentials: Credentials,
    ) -> Result<ConnectProgress, GatewayError> {
        if self.is_ready().await {
            return Ok(ConnectProgress::AlreadyReady);
        }

        let candidate = address.to_string();
        let secure = tokio::task::spawn_blocking(move || url_policy::is_secure(&candidate))
            .await
            .unwrap_or(false);

        let mut conn = self.shared.conn.lock().await;
        if conn.state == ConnectionState::Ready {
            return Ok(ConnectProgress::AlreadyReady);
        }

        conn.release(Some("Reconnecting"));
        conn.attempt += 1;
        conn.state = ConnectionState::Idle;
        conn.credentials = Credentials::none();

        if !secure {
            warn!(address = %address, "gateway address rejected by security policy");
            return Err(GatewayError::PolicyRejected {
                address: address.to_string(),
            });
        }
        let target = GatewayAddress::parse(address)?;

        let attempt = conn.attempt;
        conn.state = ConnectionState::Opening;
        conn.credentials = credentials;

        let bearer = match self.shared.options.token_placement {
            TokenPlacement::Header => conn.credentials.clone(),
            TokenPlacement::Handshake => Credentials::none(),
        };
        let request = OpenRequest {
            url: target.url().clone(),
            bearer,
        };
        let listener = Arc::new(AttemptListener {
            shared: Arc::downgrade(&self.shared),
            attempt,
        });

        info!(
            url = %target,
            attempt,
            token = %conn.credentials.fingerprint(),
            placement = ?self.shared.options.token_placement,
            "connecting to OpenClaw Gateway"
        );

        match self.shared.transport.open(request, listener) {
            Ok(handle) => {
                conn.handle = Some(handle);
                Ok(ConnectProgress::Opening)
            }
            Err(e) => {
                error!(error = %e, "failed to open transport");
                conn.state = ConnectionState::Idle;
                conn.credentials = Credentials::none();
                Err(GatewayError::TransportOpen(e))
            }
        }
    }

    /// Close the connection with a normal status. Emits no outcome.
    pub async fn disconnect(&self) {
        let mut conn = self.shared.conn.lock().await;
        if conn.handle.is_none() && !conn.state.is_live() {
            return;
        }

        info!(attempt = conn.attempt, "disconnecting from Gateway");
        conn.state = ConnectionState::Closing;
        conn.release(Some("User disconnect"));
        conn.state = ConnectionState::Closed;
    }

    /// Queue a chat message for `session_key`.
    ///
    /// Returns the request's correlation id. When the connection is not ready
    /// or the transport refuses the frame, one error outcome is emitted
    /// instead and `None` is returned; connection state is left alone.
    pub async fn send(&self, message: &str, session_key: &str) -> Option<String> {
        let conn = self.shared.conn.lock().await;
        let handle = match (conn.state, conn.handle.as_ref()) {
            (ConnectionState::Ready, Some(handle)) => handle,
            (state, _) => {
                warn!(state = ?state, "cannot send message: not connected or handshake incomplete");
                self.shared.outcomes.emit(Outcome::Error(NOT_CONNECTED.to_string()));
                return None;
            }
        };

        let id = self.shared.call_ids.next_id();
        let encoded = match self.shared.options.dialect {
            Dialect::Enveloped => {
                let params = ChatSendParams {
                    session_key: session_key.to_string(),
                    message: message.to_string(),
                    idempotency_key: idempotency_key(&self.shared.options.identity.platform, &id),
                };
                protocol::encode_chat_send(&id, &params)
            }
            Dialect::Legacy => protocol::encode_legacy_send(&id, message, session_key),
        };

        let sent = encoded
            .map_err(|e| e.to_string())
            .and_then(|text| handle.send(text).map_err(|e| e.to_string()));
        if let Err(e) = sent {
            error!(id = %id, error = %e, "failed to queue chat message");
            self.shared.outcomes.emit(Outcome::Error(SEND_FAILED.to_string()));
            return None;
        }

        debug!(id = %id, session_key, len = message.len(), "queued chat message");
        Some(id)
    }
}

impl Shared {
    fn send_handshake(self: &Arc<Self>, conn: &mut Connection, attempt: u64) {
        let id = self.call_ids.next_id();
        let identity = &self.options.identity;
        let token = match self.options.token_placement {
            TokenPlacement::Handshake => conn.credentials.token(),
            TokenPlacement::Header => None,
        };
        let params = ConnectParams::operator(
            identity.client_info(),
            identity.min_protocol,
            identity.max_protocol,
            token,
        );

        let sent = match (protocol::encode_connect(&id, &params), conn.handle.as_ref()) {
            (Ok(text), Some(handle)) => handle.send(text).map_err(|e| e.to_string()),
            (Err(e), _) => Err(e.to_string()),
            (_, None) => Err("no transport".to_string()),
        };
        if let Err(e) = sent {
            error!(error = %e, "failed to send handshake");
            conn.state = ConnectionState::Failed;
            conn.release(Some("Handshake failed"));
            self.outcomes.emit(Outcome::Error(HANDSHAKE_SEND_FAILED.to_string()));
            return;
        }

        debug!(
            id = %id,
            min_protocol = identity.min_protocol,
            max_protocol = identity.max_protocol,
            "sent connect handshake"
        );
        conn.handshake_id = Some(id);
        conn.state = ConnectionState::AwaitingHandshakeAck;

        if let Some(limit) = self.options.handshake_timeout {
            self.arm_handshake_timeout(attempt, limit);
        }
    }

    fn arm_handshake_timeout(self: &Arc<Self>, attempt: u64, limit: Duration) {
        let shared = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut conn = shared.conn.lock().await;
            if conn.attempt != attempt || conn.state != ConnectionState::AwaitingHandshakeAck {
                return;
            }
            warn!(attempt, timeout = ?limit, "no handshake acknowledgement from Gateway");
            conn.state = ConnectionState::Failed;
            conn.release(Some("Handshake timeout"));
            shared
                .outcomes
                .emit(Outcome::Error(format!("Handshake timed out after {limit:?}")));
        });
    }

    fn apply_inbound(&self, conn: &mut Connection, inbound: Inbound) {
        match inbound {
            Inbound::HandshakeAck(hello) => {
                if conn.state != ConnectionState::AwaitingHandshakeAck {
                    debug!(state = ?conn.state, "ignoring handshake acknowledgement");
                    return;
                }
                let server = hello.server.unwrap_or_default();
                info!(
                    protocol = ?hello.protocol,
                    server_version = ?server.version,
                    conn_id = ?server.conn_id,
                    "connected to Gateway successfully"
                );
                conn.state = ConnectionState::Ready;
                conn.handshake_id = None;
                self.outcomes.emit(Outcome::Connected);
            }
            Inbound::Message(text) => {
                self.outcomes.emit(Outcome::Response(text));
            }
            Inbound::Failure {
                request_id,
                message,
            } => {
                let rejects_handshake = conn.state == ConnectionState::AwaitingHandshakeAck
                    && request_id.is_some()
                    && request_id == conn.handshake_id;
                if rejects_handshake {
                    error!(message = %message, "Gateway rejected handshake");
                    conn.state = ConnectionState::Failed;
                    conn.release(Some("Handshake rejected"));
                } else {
                    warn!(id = ?request_id, message = %message, "request failed");
                }
                self.outcomes.emit(Outcome::Error(message));
            }
            Inbound::Ignored => {
                debug!("ignoring gateway frame");
            }
        }
    }

    async fn end_attempt(&self, attempt: u64, next: ConnectionState, message: String) {
        let mut conn = self.conn.lock().await;
        if conn.attempt != attempt || !conn.state.is_live() {
            debug!(attempt, state = ?conn.state, "ignoring transport shutdown");
            return;
        }
        conn.state = next;
        conn.release(None);
        self.outcomes.emit(Outcome::Error(message));
    }
}

/// Transport callbacks for one connection attempt.
struct AttemptListener {
    shared: Weak<Shared>,
    attempt: u64,
}

#[async_trait]
impl TransportListener for AttemptListener {
    async fn on_open(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut conn = shared.conn.lock().await;
        if conn.attempt != self.attempt || conn.state != ConnectionState::Opening {
            debug!(attempt = self.attempt, state = ?conn.state, "ignoring stale transport open");
            return;
        }
        info!(attempt = self.attempt, "transport connected, sending handshake");
        conn.state = ConnectionState::TransportOpen;
        shared.send_handshake(&mut conn, self.attempt);
    }

    async fn on_text(&self, text: String) {
        let inbound = match protocol::decode(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed gateway frame");
                return;
            }
        };

        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut conn = shared.conn.lock().await;
        if conn.attempt != self.attempt {
            debug!(attempt = self.attempt, "dropping frame from superseded connection");
            return;
        }
        shared.apply_inbound(&mut conn, inbound);
    }

    async fn on_closing(&self, code: u16, reason: String) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        warn!(attempt = self.attempt, code, reason = %reason, "Gateway connection closing");
        shared
            .end_attempt(
                self.attempt,
                ConnectionState::Closed,
                format!("Disconnected ({code}: {reason})"),
            )
            .await;
    }

    async fn on_failure(&self, message: String) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        error!(attempt = self.attempt, error = %message, "Gateway connection failed");
        shared
            .end_attempt(
                self.attempt,
                ConnectionState::Failed,
                format!("Connection failed: {message}"),
            )
            .await;
    }
}
