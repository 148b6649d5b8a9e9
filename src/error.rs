//! Fatal session errors.

use thiserror::Error;

use crate::gateway::RpcError;

/// Errors surfaced to `get_snapshot` callers. Recoverable conditions
/// (per-market fetch failures, funds fallback, persistence) never reach
/// this type; they are logged and absorbed.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The login handshake did not complete within the configured timeout.
    #[error("timed out connecting to Futu OpenD")]
    ConnectTimeout,

    /// The gateway rejected the login, or the transport could not be
    /// established.
    #[error("{0}")]
    Login(String),

    /// Account discovery failed: empty account list or an entry without
    /// an id.
    #[error("{0}")]
    Account(String),

    /// Any other gateway call failure, with a best-effort readable message.
    #[error("{0}")]
    Gateway(String),
}

/// Extracts a human-readable message from a gateway failure.
///
/// Priority: the provider's `retMsg`/`errmsg` response fields, then the
/// error's own display text, then a generic fallback.
pub fn gateway_message(err: &anyhow::Error) -> String {
    if let Some(rpc) = err.downcast_ref::<RpcError>() {
        return rpc.message().to_string();
    }
    let text = err.to_string();
    if text.trim().is_empty() {
        "Futu gateway call failed".to_string()
    } else {
        text
    }
}
