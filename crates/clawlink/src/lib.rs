//! Client for the OpenClaw Gateway.
//!
//! [`GatewayClient`] connects to a gateway over WebSocket, performs the
//! operator handshake and sends chat messages. Results, chat text and errors
//! arrive on the client's outcome queue ([`GatewayClient::outcomes`]).
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use clawlink::{Config, Credentials, GatewayClient, Outcome};
//!
//! let client = GatewayClient::from_config(&Config::default());
//! let outcomes = client.outcomes();
//! client
//!     .connect("http://127.0.0.1:18789", Credentials::bearer("token"))
//!     .await?;
//!
//! if let Some(Outcome::Connected) = outcomes.recv().await {
//!     client.send("hello", "main").await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod call_id;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod outcome;
pub mod transport;
pub mod url_policy;

pub use address::GatewayAddress;
pub use client::{ClientOptions, ConnectProgress, ConnectionState, GatewayClient};
pub use config::{ClientIdentity, Config, Dialect, TokenPlacement};
pub use credentials::Credentials;
pub use error::GatewayError;
pub use outcome::{Outcome, OutcomeChannel, OutcomeStream, CONNECTED};
pub use transport::{Transport, TransportError, WsOptions, WsTransport};
pub use url_policy::is_secure;
