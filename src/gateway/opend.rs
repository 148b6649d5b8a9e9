//! OpenD websocket transport.
//!
//! Speaks the JSON command envelope of the OpenD web bridge: requests are
//! `{"cmd", "id", "c2s"}` frames, responses echo the `id` and carry
//! `retType`, `retMsg` and `s2c`. A background reader task routes responses
//! to their pending callers by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{RpcError, TradeGateway};
use crate::config::GatewayConfig;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Builds the websocket endpoint for an OpenD instance.
fn endpoint(host: &str, port: u16, ssl: bool) -> String {
    let scheme = if ssl { "wss" } else { "ws" };
    format!("{}://{}:{}", scheme, host, port)
}

/// Concrete [`TradeGateway`] over the OpenD websocket bridge.
pub struct OpenDGateway {
    url: String,
    key: String,
    sink: Mutex<Option<WsSink>>,
    pending: PendingMap,
    next_id: AtomicU64,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl OpenDGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            url: endpoint(&config.host, config.port, config.ssl),
            key: config.key.clone().unwrap_or_default(),
            sink: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            reader: Mutex::new(None),
        }
    }

    /// Sends one command frame and waits for the matching response.
    async fn call(&self, cmd: &str, c2s: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = json!({ "cmd": cmd, "id": id, "c2s": c2s });
        {
            let mut guard = self.sink.lock().await;
            let sink = match guard.as_mut() {
                Some(sink) => sink,
                None => {
                    self.pending.lock().await.remove(&id);
                    return Err(anyhow!("gateway is not connected"));
                }
            };
            if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                self.pending.lock().await.remove(&id);
                return Err(anyhow!("failed to send {}: {}", cmd, e));
            }
        }

        let response = rx
            .await
            .map_err(|_| anyhow!("connection closed before {} response", cmd))?;

        let ret_type = response.get("retType").and_then(Value::as_i64).unwrap_or(-1);
        if ret_type != 0 {
            let text_of = |key: &str| {
                response
                    .get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            return Err(RpcError {
                ret_msg: text_of("retMsg"),
                errmsg: text_of("errmsg"),
                detail: format!("{} returned retType {}", cmd, ret_type),
            }
            .into());
        }
        Ok(response.get("s2c").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl TradeGateway for OpenDGateway {
    async fn login(&self) -> Result<()> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| anyhow!("failed to reach OpenD at {}: {}", self.url, e))?;
        let (sink, mut read) = stream.split();
        *self.sink.lock().await = Some(sink);

        let pending = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let value: Value = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        log::debug!("dropping unparseable OpenD frame: {}", e);
                        continue;
                    }
                };
                let Some(id) = value.get("id").and_then(Value::as_u64) else {
                    continue;
                };
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(value);
                }
            }
            // connection gone: fail every caller still waiting
            pending.lock().await.clear();
        });
        *self.reader.lock().await = Some(handle);

        self.call("InitWebSocket", json!({ "websocketKey": self.key }))
            .await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        self.pending.lock().await.clear();
        if let Some(mut sink) = self.sink.lock().await.take() {
            sink.close().await?;
        }
        Ok(())
    }

    async fn list_accounts(&self, trd_category: i32) -> Result<Vec<Value>> {
        let s2c = self
            .call(
                "GetAccList",
                json!({
                    "userID": 0,
                    "trdCategory": trd_category,
                    "needGeneralSecAccount": true,
                }),
            )
            .await?;
        Ok(s2c
            .get("accList")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn unlock_trade(&self, pwd_md5: &str) -> Result<()> {
        self.call(
            "UnlockTrade",
            json!({ "unlock": true, "pwdMD5": pwd_md5, "securityFirm": 1 }),
        )
        .await?;
        Ok(())
    }

    async fn position_list(
        &self,
        trd_env: i32,
        acc_id: &str,
        trd_market: i32,
    ) -> Result<Vec<Value>> {
        let s2c = self
            .call(
                "GetPositionList",
                json!({
                    "header": { "trdEnv": trd_env, "accID": acc_id, "trdMarket": trd_market },
                    "refreshCache": true,
                }),
            )
            .await?;
        Ok(s2c
            .get("positionList")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn funds(&self, trd_env: i32, acc_id: &str, trd_market: i32) -> Result<Value> {
        let s2c = self
            .call(
                "GetFunds",
                json!({
                    "header": { "trdEnv": trd_env, "accID": acc_id, "trdMarket": trd_market },
                    "refreshCache": true,
                }),
            )
            .await?;
        Ok(s2c.get("funds").cloned().unwrap_or(Value::Null))
    }
}
