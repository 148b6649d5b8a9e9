//! Portfolio session manager.
//!
//! Owns the OpenD connection lifecycle: login handshake with timeout,
//! account discovery, trade unlock, per-market data fetch and overview
//! composition. One logical session per instance; concurrent snapshot
//! callers during connection setup share a single in-flight login.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use md5::{Digest, Md5};
use serde_json::Value;
use tokio::sync::{watch, Mutex};

use crate::config::{GatewayConfig, DEFAULT_TRADE_MARKET};
use crate::error::{gateway_message, SessionError};
use crate::gateway::opend::OpenDGateway;
use crate::gateway::TradeGateway;
use crate::history::EquityHistoryStore;
use crate::models::{CashInfo, Overview, Position, Snapshot};
use crate::normalize::{normalize_funds, normalize_position, to_id_string, to_number};

type GatewayFactory = Box<dyn Fn(&GatewayConfig) -> Arc<dyn TradeGateway> + Send + Sync>;
type LoginOutcome = Result<(), LoginFailure>;

#[derive(Clone)]
enum LoginFailure {
    Timeout,
    Rejected(String),
}

/// Connection state. `Connecting` holds the receiver every waiter
/// observes, so a second `get_snapshot` never starts a second login.
enum ConnState {
    Disconnected,
    Connecting(watch::Receiver<Option<LoginOutcome>>),
    Connected,
}

/// Account chosen for this connection lifetime.
#[derive(Clone)]
struct AccountSelection {
    id: String,
    /// Markets the account is authorized to trade, as wire codes.
    markets: Vec<i32>,
}

struct SessionState {
    gateway: Option<Arc<dyn TradeGateway>>,
    conn: ConnState,
    account: Option<AccountSelection>,
    trade_unlocked: bool,
}

impl SessionState {
    fn reset(&mut self) {
        self.gateway = None;
        self.conn = ConnState::Disconnected;
        self.account = None;
        self.trade_unlocked = false;
    }
}

/// Stateful client for one brokerage account's portfolio data.
pub struct PortfolioSession {
    config: GatewayConfig,
    make_gateway: GatewayFactory,
    history: EquityHistoryStore,
    state: Arc<Mutex<SessionState>>,
}

impl PortfolioSession {
    pub fn new(
        config: GatewayConfig,
        make_gateway: GatewayFactory,
        history: EquityHistoryStore,
    ) -> Self {
        Self {
            config,
            make_gateway,
            history,
            state: Arc::new(Mutex::new(SessionState {
                gateway: None,
                conn: ConnState::Disconnected,
                account: None,
                trade_unlocked: false,
            })),
        }
    }

    /// Session against a real OpenD instance, configured from `FUTU_*`
    /// environment variables, with file-backed equity history.
    pub fn from_env() -> Self {
        Self::new(
            GatewayConfig::from_env(),
            Box::new(|config| Arc::new(OpenDGateway::new(config)) as Arc<dyn TradeGateway>),
            EquityHistoryStore::default_location(),
        )
    }

    /// Fetches a complete portfolio snapshot, connecting, selecting an
    /// account and unlocking trading first as needed.
    pub async fn get_snapshot(&self) -> Result<Snapshot, SessionError> {
        self.ensure_connected().await?;
        let account = self.ensure_account().await?;
        self.ensure_unlocked().await?;

        let gateway = self
            .current_gateway()
            .await
            .ok_or_else(|| SessionError::Gateway("gateway is not initialized".to_string()))?;

        let markets = resolve_target_markets(&self.config.markets, &account.markets);
        let (cash, positions) = tokio::join!(
            self.fetch_cash(gateway.as_ref(), &account, &markets),
            self.fetch_positions(gateway.as_ref(), &account.id, &markets),
        );

        let overview = build_overview(&account.id, cash, &positions);
        let equity_curve = self.history.update(&overview);

        Ok(Snapshot {
            overview,
            positions,
            equity_curve,
        })
    }

    /// Tears the session down. Transport stop failures are swallowed;
    /// the next `get_snapshot` performs a full reconnect.
    pub async fn disconnect(&self) {
        let gateway = {
            let mut state = self.state.lock().await;
            let gateway = state.gateway.take();
            state.reset();
            gateway
        };
        if let Some(gateway) = gateway {
            if let Err(e) = gateway.stop().await {
                log::debug!("failed to stop OpenD transport: {}", e);
            }
        }
    }

    async fn current_gateway(&self) -> Option<Arc<dyn TradeGateway>> {
        self.state.lock().await.gateway.clone()
    }

    /// Drives the connection state machine. The first caller spawns the
    /// login attempt; everyone else awaits the shared outcome.
    async fn ensure_connected(&self) -> Result<(), SessionError> {
        let mut rx = {
            let mut state = self.state.lock().await;
            match &state.conn {
                ConnState::Connected => return Ok(()),
                ConnState::Connecting(rx) => rx.clone(),
                ConnState::Disconnected => {
                    let gateway = state
                        .gateway
                        .get_or_insert_with(|| (self.make_gateway)(&self.config))
                        .clone();
                    let (tx, rx) = watch::channel(None);
                    state.conn = ConnState::Connecting(rx.clone());

                    let shared = Arc::clone(&self.state);
                    let timeout = self.config.connect_timeout;
                    tokio::spawn(async move {
                        let outcome = run_login(Arc::clone(&gateway), timeout).await;
                        let superseded = {
                            let mut state = shared.lock().await;
                            // a disconnect (or a newer attempt) may have
                            // replaced this gateway mid-login; only the
                            // current attempt may transition the state
                            let current = state
                                .gateway
                                .as_ref()
                                .is_some_and(|g| Arc::ptr_eq(g, &gateway));
                            if current {
                                match &outcome {
                                    Ok(()) => state.conn = ConnState::Connected,
                                    Err(_) => {
                                        // discard the transport so a retry
                                        // starts from scratch
                                        state.gateway = None;
                                        state.conn = ConnState::Disconnected;
                                    }
                                }
                            }
                            !current
                        };
                        if superseded && outcome.is_ok() {
                            if let Err(e) = gateway.stop().await {
                                log::debug!("failed to stop superseded transport: {}", e);
                            }
                        }
                        let _ = tx.send(Some(outcome));
                    });
                    rx
                }
            }
        };

        loop {
            let settled = rx.borrow_and_update().clone();
            if let Some(outcome) = settled {
                return outcome.map_err(login_error);
            }
            if rx.changed().await.is_err() {
                return Err(SessionError::Login(
                    "connection attempt was aborted".to_string(),
                ));
            }
        }
    }

    /// Resolves the trading account once per connection lifetime.
    ///
    /// Selection order: explicitly configured id, first account matching
    /// the configured trade environment, first account overall.
    async fn ensure_account(&self) -> Result<AccountSelection, SessionError> {
        let mut state = self.state.lock().await;
        if let Some(account) = &state.account {
            return Ok(account.clone());
        }

        let gateway = state
            .gateway
            .clone()
            .ok_or_else(|| SessionError::Gateway("gateway is not initialized".to_string()))?;

        let accounts = gateway
            .list_accounts(self.config.trade_category)
            .await
            .map_err(|e| SessionError::Gateway(gateway_message(&e)))?;
        if accounts.is_empty() {
            return Err(SessionError::Account(
                "no trading accounts available".to_string(),
            ));
        }

        let selected = self
            .config
            .account_id
            .as_ref()
            .and_then(|desired| {
                accounts
                    .iter()
                    .find(|acc| &to_id_string(acc.get("accID")) == desired)
            })
            .or_else(|| {
                accounts
                    .iter()
                    .find(|acc| to_number(acc.get("trdEnv")) as i32 == self.config.trade_env)
            })
            .unwrap_or(&accounts[0]);

        let id = to_id_string(selected.get("accID"));
        if id.is_empty() {
            return Err(SessionError::Account(
                "account entry is missing accID".to_string(),
            ));
        }

        let markets = selected
            .get("trdMarketAuthList")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .map(|entry| to_number(Some(entry)) as i32)
                    .filter(|&code| code > 0)
                    .collect()
            })
            .unwrap_or_default();

        let account = AccountSelection { id, markets };
        state.account = Some(account.clone());
        Ok(account)
    }

    /// Unlocks trading once per connection lifetime. Without a configured
    /// credential the account is treated as already unlocked.
    async fn ensure_unlocked(&self) -> Result<(), SessionError> {
        let Some(trade_pwd) = &self.config.trade_pwd else {
            return Ok(());
        };

        let mut state = self.state.lock().await;
        if state.trade_unlocked {
            return Ok(());
        }
        let gateway = state
            .gateway
            .clone()
            .ok_or_else(|| SessionError::Gateway("gateway is not initialized".to_string()))?;

        let pwd_md5 = hex::encode(Md5::digest(trade_pwd.as_bytes()));
        gateway
            .unlock_trade(&pwd_md5)
            .await
            .map_err(|e| SessionError::Gateway(gateway_message(&e)))?;
        state.trade_unlocked = true;
        Ok(())
    }

    /// Fetches positions for every target market concurrently. A failing
    /// market is logged and its contribution omitted.
    async fn fetch_positions(
        &self,
        gateway: &dyn TradeGateway,
        acc_id: &str,
        markets: &[i32],
    ) -> Vec<Position> {
        let fetches = markets.iter().map(|&market| async move {
            let result = gateway
                .position_list(self.config.trade_env, acc_id, market)
                .await;
            (market, result)
        });

        let mut positions = Vec::new();
        for (market, result) in join_all(fetches).await {
            match result {
                Ok(raw_list) => {
                    positions.extend(raw_list.iter().map(normalize_position));
                }
                Err(e) => {
                    log::warn!(
                        "failed to fetch positions for market {}: {}",
                        market,
                        gateway_message(&e)
                    );
                }
            }
        }

        positions.sort_by(|a, b| {
            b.market_value
                .partial_cmp(&a.market_value)
                .unwrap_or(Ordering::Equal)
        });
        positions
    }

    /// Fetches funds for the primary market, falling back to zeroed USD
    /// cash info on failure.
    async fn fetch_cash(
        &self,
        gateway: &dyn TradeGateway,
        account: &AccountSelection,
        markets: &[i32],
    ) -> CashInfo {
        let first_market = markets
            .first()
            .or_else(|| account.markets.first())
            .or_else(|| self.config.markets.first())
            .copied()
            .unwrap_or(1);

        match gateway
            .funds(self.config.trade_env, &account.id, first_market)
            .await
        {
            Ok(funds) if !funds.is_null() => normalize_funds(&funds),
            Ok(_) => {
                log::warn!("funds response carried no data, using zeroed cash info");
                CashInfo::zero_usd()
            }
            Err(e) => {
                log::warn!("failed to fetch account funds: {}", gateway_message(&e));
                CashInfo::zero_usd()
            }
        }
    }
}

async fn run_login(gateway: Arc<dyn TradeGateway>, timeout: std::time::Duration) -> LoginOutcome {
    match tokio::time::timeout(timeout, gateway.login()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            let message = gateway_message(&e);
            Err(LoginFailure::Rejected(if message.is_empty() {
                "OpenD login failed".to_string()
            } else {
                message
            }))
        }
        Err(_) => {
            if let Err(e) = gateway.stop().await {
                log::debug!("failed to stop transport after timeout: {}", e);
            }
            Err(LoginFailure::Timeout)
        }
    }
}

fn login_error(failure: LoginFailure) -> SessionError {
    match failure {
        LoginFailure::Timeout => SessionError::ConnectTimeout,
        LoginFailure::Rejected(message) => SessionError::Login(message),
    }
}

/// Market resolution policy: intersection of configured and authorized
/// markets, then authorized, then configured, then the US default.
fn resolve_target_markets(configured: &[i32], authorized: &[i32]) -> Vec<i32> {
    if !configured.is_empty() && !authorized.is_empty() {
        let intersection: Vec<i32> = authorized
            .iter()
            .filter(|market| configured.contains(market))
            .copied()
            .collect();
        if !intersection.is_empty() {
            return intersection;
        }
    }
    if !authorized.is_empty() {
        return authorized.to_vec();
    }
    if !configured.is_empty() {
        return configured.to_vec();
    }
    vec![DEFAULT_TRADE_MARKET]
}

/// Aggregates the overview from the normalized position list. Ratios are
/// percentages of total cost; 0 when the cost basis is 0.
fn build_overview(account_id: &str, cash: CashInfo, positions: &[Position]) -> Overview {
    let total_market_value: f64 = positions.iter().map(|p| p.market_value).sum();
    let total_cost_value: f64 = positions.iter().map(|p| p.cost_price * p.quantity).sum();
    let total_pnl: f64 = positions.iter().map(|p| p.pnl).sum();
    let today_pnl: f64 = positions.iter().map(|p| p.today_pnl).sum();

    let ratio = |pnl: f64| {
        if total_cost_value != 0.0 {
            pnl / total_cost_value * 100.0
        } else {
            0.0
        }
    };

    Overview {
        account_id: account_id.to_string(),
        source: "futu".to_string(),
        total_market_value,
        total_cost_value,
        total_pnl,
        total_pnl_ratio: ratio(total_pnl),
        today_pnl,
        today_pnl_ratio: ratio(today_pnl),
        update_time: Utc::now(),
        cash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryStore;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

    /// Scriptable gateway with call counters.
    #[derive(Default)]
    struct FakeGateway {
        login_calls: AtomicUsize,
        acc_list_calls: AtomicUsize,
        unlock_calls: AtomicUsize,
        position_calls: AtomicUsize,
        funds_calls: AtomicUsize,
        fail_login: AtomicBool,
        fail_funds: AtomicBool,
        /// Markets whose position fetch should fail.
        fail_markets: Vec<i32>,
        login_delay_ms: u64,
    }

    #[async_trait]
    impl TradeGateway for FakeGateway {
        async fn login(&self) -> Result<()> {
            self.login_calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.login_delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.login_delay_ms)).await;
            }
            if self.fail_login.load(AtomicOrdering::SeqCst) {
                return Err(anyhow!("OpenD rejected the login"));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn list_accounts(&self, _trd_category: i32) -> Result<Vec<Value>> {
            self.acc_list_calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(vec![
                json!({ "accID": "111", "trdEnv": 0, "trdMarketAuthList": [1] }),
                json!({ "accID": "281756", "trdEnv": 1, "trdMarketAuthList": [1, 2] }),
            ])
        }

        async fn unlock_trade(&self, _pwd_md5: &str) -> Result<()> {
            self.unlock_calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }

        async fn position_list(
            &self,
            _trd_env: i32,
            _acc_id: &str,
            trd_market: i32,
        ) -> Result<Vec<Value>> {
            self.position_calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail_markets.contains(&trd_market) {
                return Err(anyhow!("market {} unavailable", trd_market));
            }
            match trd_market {
                1 => Ok(vec![json!({
                    "code": "HK.00700", "name": "Tencent", "qty": 100,
                    "costPrice": 320, "price": 350, "val": 35000,
                    "plVal": 3000, "currency": 1
                })]),
                2 => Ok(vec![json!({
                    "code": "US.AAPL", "name": "Apple", "qty": 10,
                    "costPrice": 150, "price": 170, "val": 1700,
                    "plVal": 200, "currency": 2
                })]),
                _ => Ok(vec![]),
            }
        }

        async fn funds(&self, _trd_env: i32, _acc_id: &str, _trd_market: i32) -> Result<Value> {
            self.funds_calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail_funds.load(AtomicOrdering::SeqCst) {
                return Err(anyhow!("funds unavailable"));
            }
            Ok(json!({
                "currency": 2, "totalAssets": 40000, "availableFunds": 3300, "power": 6600
            }))
        }
    }

    fn session_with(gateway: Arc<FakeGateway>, config: GatewayConfig) -> PortfolioSession {
        PortfolioSession::new(
            config,
            Box::new(move |_| gateway.clone() as Arc<dyn TradeGateway>),
            EquityHistoryStore::new(Box::<MemoryStore>::default()),
        )
    }

    fn unlockable_config() -> GatewayConfig {
        GatewayConfig {
            trade_pwd: Some("123456".to_string()),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_snapshot_composes_overview_and_positions() {
        let gateway = Arc::new(FakeGateway::default());
        let session = session_with(gateway.clone(), unlockable_config());

        let snapshot = session.get_snapshot().await.unwrap();
        assert_eq!(snapshot.overview.account_id, "281756");
        assert_eq!(snapshot.overview.source, "futu");
        // sorted descending by market value: Tencent (35000) before Apple (1700)
        assert_eq!(snapshot.positions[0].symbol, "HK.00700");
        assert_eq!(snapshot.positions[1].symbol, "US.AAPL");
        assert_eq!(snapshot.overview.total_market_value, 36700.0);
        assert_eq!(snapshot.overview.total_cost_value, 33500.0);
        assert_eq!(snapshot.overview.cash.total_assets, 40000.0);
        assert_eq!(snapshot.equity_curve.len(), 1);
        assert_eq!(snapshot.equity_curve[0].equity, 40000.0);
    }

    #[tokio::test]
    async fn test_account_selection_prefers_configured_id() {
        let gateway = Arc::new(FakeGateway::default());
        let config = GatewayConfig {
            account_id: Some("111".to_string()),
            ..GatewayConfig::default()
        };
        let session = session_with(gateway, config);
        let snapshot = session.get_snapshot().await.unwrap();
        assert_eq!(snapshot.overview.account_id, "111");
    }

    #[tokio::test]
    async fn test_account_selection_falls_back_to_trade_env() {
        let gateway = Arc::new(FakeGateway::default());
        let config = GatewayConfig {
            trade_env: 0, // SIMULATE
            ..GatewayConfig::default()
        };
        let session = session_with(gateway, config);
        let snapshot = session.get_snapshot().await.unwrap();
        assert_eq!(snapshot.overview.account_id, "111");
    }

    #[tokio::test]
    async fn test_session_reuse_skips_account_and_unlock() {
        let gateway = Arc::new(FakeGateway::default());
        let session = session_with(gateway.clone(), unlockable_config());

        session.get_snapshot().await.unwrap();
        session.get_snapshot().await.unwrap();

        assert_eq!(gateway.login_calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(gateway.acc_list_calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(gateway.unlock_calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_resets_session_state() {
        let gateway = Arc::new(FakeGateway::default());
        let session = session_with(gateway.clone(), unlockable_config());

        session.get_snapshot().await.unwrap();
        session.disconnect().await;
        session.get_snapshot().await.unwrap();

        assert_eq!(gateway.login_calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(gateway.acc_list_calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(gateway.unlock_calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disconnect_during_connect_allows_reconnect() {
        let gateway = Arc::new(FakeGateway {
            login_delay_ms: 100,
            ..FakeGateway::default()
        });
        let session = Arc::new(session_with(gateway.clone(), GatewayConfig::default()));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.get_snapshot().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        session.disconnect().await;

        // the caller whose session was torn down mid-login errors out,
        // and the orphaned attempt must not resurrect the old state
        assert!(first.await.unwrap().is_err());

        session.get_snapshot().await.unwrap();
        assert_eq!(gateway.login_calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_credential_skips_unlock() {
        let gateway = Arc::new(FakeGateway::default());
        let session = session_with(gateway.clone(), GatewayConfig::default());
        session.get_snapshot().await.unwrap();
        assert_eq!(gateway.unlock_calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_snapshots_share_one_login() {
        let gateway = Arc::new(FakeGateway {
            login_delay_ms: 50,
            ..FakeGateway::default()
        });
        let session = Arc::new(session_with(gateway.clone(), GatewayConfig::default()));

        let a = {
            let session = session.clone();
            tokio::spawn(async move { session.get_snapshot().await })
        };
        let b = {
            let session = session.clone();
            tokio::spawn(async move { session.get_snapshot().await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(gateway.login_calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_failure_surfaces_and_retry_starts_clean() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.fail_login.store(true, AtomicOrdering::SeqCst);
        let session = session_with(gateway.clone(), GatewayConfig::default());

        let err = session.get_snapshot().await.unwrap_err();
        assert!(matches!(err, SessionError::Login(_)));
        assert!(err.to_string().contains("rejected"));

        gateway.fail_login.store(false, AtomicOrdering::SeqCst);
        session.get_snapshot().await.unwrap();
        assert_eq!(gateway.login_calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_login_timeout() {
        let gateway = Arc::new(FakeGateway {
            login_delay_ms: 200,
            ..FakeGateway::default()
        });
        let config = GatewayConfig {
            connect_timeout: std::time::Duration::from_millis(20),
            ..GatewayConfig::default()
        };
        let session = session_with(gateway, config);

        let err = session.get_snapshot().await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectTimeout));
    }

    #[tokio::test]
    async fn test_market_failure_is_isolated() {
        let gateway = Arc::new(FakeGateway {
            fail_markets: vec![1],
            ..FakeGateway::default()
        });
        let session = session_with(gateway, GatewayConfig::default());

        let snapshot = session.get_snapshot().await.unwrap();
        // HK failed; only the US position remains
        assert_eq!(snapshot.positions.len(), 1);
        assert_eq!(snapshot.positions[0].symbol, "US.AAPL");
    }

    #[tokio::test]
    async fn test_funds_failure_falls_back_to_zero_usd() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.fail_funds.store(true, AtomicOrdering::SeqCst);
        let session = session_with(gateway, GatewayConfig::default());

        let snapshot = session.get_snapshot().await.unwrap();
        assert_eq!(snapshot.overview.cash.currency, "USD");
        assert_eq!(snapshot.overview.cash.total_assets, 0.0);
        assert_eq!(snapshot.overview.cash.buying_power, 0.0);
    }

    #[test]
    fn test_login_error_classification() {
        assert!(matches!(
            login_error(LoginFailure::Timeout),
            SessionError::ConnectTimeout
        ));
        // a rejection that merely reads like a timeout stays a login error
        let failure = LoginFailure::Rejected("timed out connecting to Futu OpenD".to_string());
        assert!(matches!(login_error(failure), SessionError::Login(_)));
    }

    #[test]
    fn test_resolve_target_markets_policy() {
        // intersection wins
        assert_eq!(resolve_target_markets(&[1, 2], &[2, 3]), vec![2]);
        // empty intersection: authorized wins
        assert_eq!(resolve_target_markets(&[5], &[2, 3]), vec![2, 3]);
        // no authorized: configured
        assert_eq!(resolve_target_markets(&[5], &[]), vec![5]);
        // nothing anywhere: US default
        assert_eq!(resolve_target_markets(&[], &[]), vec![DEFAULT_TRADE_MARKET]);
    }

    #[test]
    fn test_build_overview_aggregation() {
        let position = |cost: f64, qty: f64, value: f64, pnl: f64| Position {
            symbol: "X".to_string(),
            name: "X".to_string(),
            market: "US".to_string(),
            quantity: qty,
            cost_price: cost,
            last_price: 0.0,
            market_value: value,
            pnl,
            pnl_ratio: 0.0,
            today_pnl: 0.0,
            today_pnl_ratio: 0.0,
            currency: "USD".to_string(),
            lot_size: None,
        };

        let positions = vec![
            position(100.0, 1.0, 110.0, 10.0),
            position(200.0, 1.0, 180.0, -20.0),
        ];
        let overview = build_overview("a", CashInfo::zero_usd(), &positions);
        assert_eq!(overview.total_cost_value, 300.0);
        assert_eq!(overview.total_pnl, -10.0);
        assert!((overview.total_pnl_ratio - (-10.0 / 300.0 * 100.0)).abs() < 1e-9);

        // zero cost basis: ratios stay 0
        let positions = vec![position(0.0, 0.0, 50.0, 50.0)];
        let overview = build_overview("a", CashInfo::zero_usd(), &positions);
        assert_eq!(overview.total_pnl_ratio, 0.0);
        assert_eq!(overview.today_pnl_ratio, 0.0);
    }
}
