use thiserror::Error;

use crate::transport::TransportError;

/// Why a `connect` call failed before any socket traffic.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The address may not carry a bearer token. Retrying will not help
    /// until the address changes.
    #[error("gateway address {address:?} is not allowed: use https, or http on a local network")]
    PolicyRejected { address: String },

    #[error("invalid gateway address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to open transport: {0}")]
    TransportOpen(#[from] TransportError),
}
