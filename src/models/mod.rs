//! Output types consumed by the dashboard.
//!
//! Field names serialize as-is (snake_case) because the investment dashboard
//! frontend reads these keys directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single brokerage position, normalized from the OpenD wire shape.
///
/// All numeric fields are guaranteed finite; unknown wire values collapse
/// to 0 during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub name: String,
    /// Market tag, e.g. "US" or "HK"; "--" when unresolvable.
    pub market: String,
    pub quantity: f64,
    pub cost_price: f64,
    pub last_price: f64,
    pub market_value: f64,
    pub pnl: f64,
    pub pnl_ratio: f64,
    pub today_pnl: f64,
    pub today_pnl_ratio: f64,
    pub currency: String,
    pub lot_size: Option<f64>,
}

/// Account cash figures for the primary trade market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashInfo {
    pub currency: String,
    pub total_assets: f64,
    pub available_cash: f64,
    pub buying_power: f64,
}

impl CashInfo {
    /// Fallback used when the funds request fails.
    pub fn zero_usd() -> Self {
        Self {
            currency: "USD".to_string(),
            total_assets: 0.0,
            available_cash: 0.0,
            buying_power: 0.0,
        }
    }
}

/// Aggregated account overview. Totals are recomputed from the position
/// list on every snapshot, never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub account_id: String,
    /// Data source tag, always "futu".
    pub source: String,
    pub total_market_value: f64,
    pub total_cost_value: f64,
    pub total_pnl: f64,
    /// Total P&L as a percentage of total cost (0 when cost is 0).
    pub total_pnl_ratio: f64,
    pub today_pnl: f64,
    pub today_pnl_ratio: f64,
    pub update_time: DateTime<Utc>,
    pub cash: CashInfo,
}

/// One sample of the persisted equity series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub pnl: f64,
}

/// Complete result of one `get_snapshot` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub overview: Overview,
    /// Sorted descending by market value.
    pub positions: Vec<Position>,
    /// Rolling 30-day window, ascending by timestamp.
    pub equity_curve: Vec<EquityPoint>,
}
