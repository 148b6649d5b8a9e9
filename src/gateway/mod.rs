//! Wire adapter seam for the Futu OpenD trade gateway.
//!
//! The session manager only talks to [`TradeGateway`]; the concrete OpenD
//! websocket transport lives in [`opend`]. Tests substitute fakes.

pub mod opend;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// An RPC rejected by the gateway. Carries the provider's own message
/// fields so callers can surface something readable.
#[derive(Debug, Error)]
#[error("{}", self.message())]
pub struct RpcError {
    /// `retMsg` from the response envelope.
    pub ret_msg: Option<String>,
    /// Legacy `errmsg` field some commands use instead.
    pub errmsg: Option<String>,
    /// Fallback description when neither message field is present.
    pub detail: String,
}

impl RpcError {
    /// Best-effort human-readable message: `retMsg`, then `errmsg`,
    /// then the generic detail.
    pub fn message(&self) -> &str {
        self.ret_msg
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| self.errmsg.as_deref().filter(|m| !m.is_empty()))
            .unwrap_or(&self.detail)
    }
}

/// The OpenD capability surface the portfolio session needs.
///
/// Raw records stay as `serde_json::Value`; the normalizer owns all field
/// interpretation.
#[async_trait]
pub trait TradeGateway: Send + Sync {
    /// Opens the transport and completes the login handshake.
    async fn login(&self) -> Result<()>;

    /// Shuts down the transport. Callers treat failures as non-fatal.
    async fn stop(&self) -> Result<()>;

    /// `GetAccList` for the given trade category, including general
    /// security accounts.
    async fn list_accounts(&self, trd_category: i32) -> Result<Vec<Value>>;

    /// `UnlockTrade` with the lowercase MD5 hex digest of the trade
    /// password.
    async fn unlock_trade(&self, pwd_md5: &str) -> Result<()>;

    /// `GetPositionList` for one trade market. Returns the raw position
    /// records.
    async fn position_list(&self, trd_env: i32, acc_id: &str, trd_market: i32)
        -> Result<Vec<Value>>;

    /// `GetFunds` for one trade market. Returns the raw funds record,
    /// `Value::Null` when the gateway sent none.
    async fn funds(&self, trd_env: i32, acc_id: &str, trd_market: i32) -> Result<Value>;
}
