//! Field normalization for the loosely-typed OpenD wire format.
//!
//! The gateway mixes plain numbers, numeric strings, and 64-bit "long"
//! objects in the same fields, and uses numeric codes for currencies and
//! markets. Every function here is total: bad input yields a documented
//! fallback, never an error or a NaN.

use serde_json::Value;

use crate::models::{CashInfo, Position};

/// Numeric currency codes used in position and funds records.
fn currency_tag(code: i64) -> Option<&'static str> {
    match code {
        0 => Some("UNKNOWN"),
        1 => Some("HKD"),
        2 => Some("USD"),
        3 => Some("CNH"),
        4 => Some("JPY"),
        5 => Some("SGD"),
        6 => Some("AUD"),
        7 => Some("CAD"),
        8 => Some("MYR"),
        _ => None,
    }
}

/// Numeric `secMarket` codes. Partial table; the rest resolve to "--".
fn sec_market_tag(code: i64) -> Option<&'static str> {
    match code {
        1 => Some("HK"),
        2 => Some("US"),
        31 => Some("CN-SH"),
        32 => Some("CN-SZ"),
        41 => Some("SG"),
        51 => Some("JP"),
        61 => Some("AU"),
        71 => Some("MY"),
        81 => Some("CA"),
        91 => Some("FX"),
        _ => None,
    }
}

/// Coerces a wire value to a finite f64, defaulting to 0.
pub fn to_number(value: Option<&Value>) -> f64 {
    to_number_or(value, 0.0)
}

/// Coerces a wire value to a finite f64 with an explicit fallback.
///
/// Accepts numbers, numeric strings, protobuf long objects
/// (`{"low", "high", "unsigned"}`), and single-field `{"value": ...}`
/// wrappers. Anything else, including non-finite results, yields the
/// fallback.
pub fn to_number_or(value: Option<&Value>, fallback: f64) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Some(v @ Value::Object(_)) => long_to_i64(v).map(|n| n as f64).or_else(|| {
            v.get("value")
                .map(|inner| to_number_or(Some(inner), fallback))
        }),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => v,
        _ => fallback,
    }
}

/// Coerces a wire identifier (string, number, or long object) to a string.
/// Unrepresentable values become the empty string.
pub fn to_id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(v @ Value::Object(_)) => {
            if let Some(id) = long_to_i64(v) {
                id.to_string()
            } else if let Some(inner) = v.get("value") {
                to_id_string(Some(inner))
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}

/// Reassembles a protobuf.js long object into an i64.
fn long_to_i64(value: &Value) -> Option<i64> {
    let low = value.get("low")?.as_i64()?;
    let high = value.get("high").and_then(Value::as_i64).unwrap_or(0);
    Some((high << 32) | (low as u32 as i64))
}

/// Resolves a currency field: numeric codes map through the fixed table,
/// strings are trimmed and upper-cased, everything else defaults to "USD".
pub fn resolve_currency(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(currency_tag)
            .unwrap_or("USD")
            .to_string(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_uppercase(),
        _ => "USD".to_string(),
    }
}

/// Extracts the market prefix from a dotted symbol ("US.AAPL" -> "US").
pub fn market_from_symbol(symbol: &str) -> Option<&str> {
    symbol.split_once('.').map(|(prefix, _)| prefix)
}

/// Resolves a numeric `secMarket` code to a market tag, "--" when unknown.
pub fn resolve_sec_market(raw: Option<&Value>) -> String {
    sec_market_tag(to_number(raw) as i64)
        .unwrap_or("--")
        .to_string()
}

/// First non-null value among the given field aliases.
fn field<'a>(raw: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| raw.get(*key))
        .find(|v| !v.is_null())
}

fn string_field(raw: &Value, aliases: &[&str], fallback: &str) -> String {
    field(raw, aliases)
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

/// Converts one raw position record to the strict [`Position`] shape.
///
/// The gateway spells the same fields differently across markets and API
/// revisions; each field resolves through its known alias chain.
pub fn normalize_position(raw: &Value) -> Position {
    let symbol = string_field(raw, &["code", "symbol"], "--");
    let market = market_from_symbol(&symbol)
        .map(str::to_string)
        .unwrap_or_else(|| resolve_sec_market(raw.get("secMarket")));

    let quantity = to_number(field(raw, &["qty", "quantity"]));
    let cost_price = to_number(field(
        raw,
        &["costPrice", "dilutedCostPrice", "averageCostPrice"],
    ));
    let last_price = to_number(field(raw, &["price", "nominalPrice", "lastPrice"]));
    let market_value = to_number_or(
        field(raw, &["val", "marketVal", "marketValue"]),
        quantity * last_price,
    );

    Position {
        name: string_field(raw, &["name", "stockName"], "--"),
        market,
        quantity,
        cost_price,
        last_price,
        market_value,
        pnl: to_number(field(raw, &["plVal", "unrealizedPL"])),
        pnl_ratio: to_number(field(raw, &["plRatio", "pnlRatio"])),
        today_pnl: to_number(field(raw, &["tdPlVal", "todayPl", "todayPlVal"])),
        today_pnl_ratio: to_number(field(raw, &["tdPlRatio", "todayPlRatio"])),
        currency: resolve_currency(raw.get("currency")),
        lot_size: field(raw, &["lotSize", "qtyLotSize", "qtyStep"])
            .map(|v| to_number(Some(v))),
        symbol,
    }
}

/// Converts one raw funds record to the strict [`CashInfo`] shape.
/// Buying power falls back to available cash when the gateway omits it.
pub fn normalize_funds(raw: &Value) -> CashInfo {
    let available_cash = to_number(field(raw, &["availableFunds", "cash", "availableCash"]));

    CashInfo {
        currency: resolve_currency(raw.get("currency")),
        total_assets: to_number(field(raw, &["totalAssets", "totalAsset"])),
        buying_power: to_number_or(field(raw, &["power", "netCashPower"]), available_cash),
        available_cash,
    }
}
