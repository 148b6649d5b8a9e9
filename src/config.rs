//! Gateway configuration sourced from the environment.
//!
//! All `FUTU_*` variables are optional; missing or malformed values fall
//! back to defaults so that a bare environment still produces a usable
//! configuration pointing at a local OpenD instance.

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;

/// Trade environment codes (`trdEnv`).
pub const TRD_ENV_SIMULATE: i32 = 0;
pub const TRD_ENV_REAL: i32 = 1;

/// Trade category codes (`trdCategory`).
pub const TRD_CATEGORY_SECURITY: i32 = 1;
pub const TRD_CATEGORY_FUTURE: i32 = 2;

/// Trade market codes (`trdMarket`) accepted in `FUTU_MARKETS`.
pub static TRADE_MARKET_CODES: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    HashMap::from([
        ("HK", 1),
        ("US", 2),
        ("CN", 3),
        ("HKCC", 4),
        ("FUTURES", 5),
        ("SG", 6),
        ("JP", 15),
        ("AU", 8),
        ("MY", 111),
        ("CA", 112),
    ])
});

/// Default market when neither the account nor the configuration names one.
pub const DEFAULT_TRADE_MARKET: i32 = 2; // US

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 33333;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Connection and session parameters for the OpenD gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    /// OpenD websocket key, if the gateway requires one.
    pub key: Option<String>,
    pub trade_env: i32,
    pub trade_category: i32,
    /// Trade-unlock password. When absent, the unlock handshake is skipped.
    pub trade_pwd: Option<String>,
    /// Preferred account id; overrides environment-based selection.
    pub account_id: Option<String>,
    /// Allowed trade markets, already resolved to numeric codes.
    pub markets: Vec<i32>,
    pub connect_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ssl: false,
            key: None,
            trade_env: TRD_ENV_REAL,
            trade_category: TRD_CATEGORY_SECURITY,
            trade_pwd: None,
            account_id: None,
            markets: Vec::new(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl GatewayConfig {
    /// Builds a configuration from `FUTU_*` environment variables.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            host: var("FUTU_OPEND_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: var("FUTU_OPEND_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_PORT),
            ssl: var("FUTU_OPEND_SSL").map(|v| parse_bool(&v)).unwrap_or(false),
            key: var("FUTU_OPEND_KEY"),
            trade_env: var("FUTU_TRADE_ENV")
                .and_then(|v| trade_env_code(&v))
                .unwrap_or(TRD_ENV_REAL),
            trade_category: var("FUTU_TRADE_CATEGORY")
                .and_then(|v| trade_category_code(&v))
                .unwrap_or(TRD_CATEGORY_SECURITY),
            trade_pwd: var("FUTU_TRADE_PWD"),
            account_id: var("FUTU_ACCOUNT_ID").map(|v| v.trim().to_string()),
            markets: var("FUTU_MARKETS")
                .map(|v| parse_markets(&v))
                .unwrap_or_default(),
            connect_timeout: Duration::from_millis(
                var("FUTU_CONNECT_TIMEOUT_MS")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
        }
    }
}

/// Lenient boolean parsing for flag-style environment values.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// `SIMULATE` | `REAL` to the `trdEnv` wire code.
pub fn trade_env_code(value: &str) -> Option<i32> {
    match value.trim().to_uppercase().as_str() {
        "SIMULATE" => Some(TRD_ENV_SIMULATE),
        "REAL" => Some(TRD_ENV_REAL),
        _ => None,
    }
}

/// `SECURITY` | `FUTURE` to the `trdCategory` wire code.
pub fn trade_category_code(value: &str) -> Option<i32> {
    match value.trim().to_uppercase().as_str() {
        "SECURITY" => Some(TRD_CATEGORY_SECURITY),
        "FUTURE" => Some(TRD_CATEGORY_FUTURE),
        _ => None,
    }
}

/// Resolves a comma-separated market list ("US,HK") to numeric codes.
/// Unknown codes are dropped.
pub fn parse_markets(raw: &str) -> Vec<i32> {
    raw.split(',')
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .filter_map(|code| TRADE_MARKET_CODES.get(code.as_str()).copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markets() {
        assert_eq!(parse_markets("US,HK"), vec![2, 1]);
        assert_eq!(parse_markets(" us , jp "), vec![2, 15]);
        assert_eq!(parse_markets("US,XX,HK"), vec![2, 1]);
        assert!(parse_markets("").is_empty());
        assert!(parse_markets(" , ,").is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" yes "));
        assert!(parse_bool("on"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_trade_env_and_category_codes() {
        assert_eq!(trade_env_code("SIMULATE"), Some(TRD_ENV_SIMULATE));
        assert_eq!(trade_env_code("real"), Some(TRD_ENV_REAL));
        assert_eq!(trade_env_code("staging"), None);
        assert_eq!(trade_category_code("SECURITY"), Some(TRD_CATEGORY_SECURITY));
        assert_eq!(trade_category_code("future"), Some(TRD_CATEGORY_FUTURE));
        assert_eq!(trade_category_code(""), None);
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 33333);
        assert_eq!(config.trade_env, TRD_ENV_REAL);
        assert!(config.markets.is_empty());
        assert_eq!(config.connect_timeout.as_millis(), 15_000);
    }
}
