//! Error types at each component boundary.
//!
//! Library seams use `thiserror`-derived enums so callers can match on
//! specific failure modes (in particular [`ChainError::CallReverted`], which
//! the slot finder treats specially — see [`crate::finder`]). The binary and
//! the driver's batch loop compose these into `anyhow::Result` at their
//! boundary.

use alloy::primitives::Address;

/// Errors surfaced by the chain client (C1).
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The node rejected a storage write (`evm_setAccountStorageAt` returned
    /// `false`).
    #[error("node rejected storage write to {address} at {key}")]
    SimulatorRejected { address: Address, key: String },

    /// The simulator raised a call-level error (the target contract cannot
    /// service this function at all). Terminal for the slot search at this
    /// target.
    #[error("call error invoking {function} on {address}: {message}")]
    CallReverted {
        address: Address,
        function: String,
        message: String,
    },

    /// A return value could not be decoded as the expected type.
    #[error("undecodable return value from {function} on {address}")]
    Undecodable { address: Address, function: String },

    /// Network/transport-level failure (timeout, connection reset, ...).
    #[error("transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),
}

/// Errors surfaced by the token store / archive (C4).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read archive at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write archive at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse archive JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
