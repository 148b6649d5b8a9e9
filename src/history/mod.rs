//! Equity history persistence.
//!
//! Maintains a rolling, deduplicated, time-sorted series of equity/P&L
//! samples across snapshots. Storage sits behind the small [`KvStore`]
//! trait; the default file store keeps one JSON file per key under the
//! platform data directory. Without a store the series is simply empty —
//! a snapshot still succeeds.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::models::{EquityPoint, Overview};
use crate::normalize::to_number;

/// Storage key for the equity series.
pub const EQUITY_HISTORY_KEY: &str = "financehub:futu:equity-history";

/// Samples older than this are evicted on every write.
const RETENTION_DAYS: i64 = 30;

/// Minimal key-value persistence capability.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store, used in tests and as a session-lifetime fallback.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("store mutex poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed store: one JSON file per key under a base directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Store under the platform data directory, `None` when the platform
    /// exposes no such directory (headless containers and the like).
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|base| Self::new(base.join("financehub")))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // keys are namespaced with ':'; keep filenames portable
        let file = key.replace(':', "-");
        self.dir.join(format!("{}.json", file))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path_for(key);
        std::fs::write(&path, value).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// Owns the rolling equity series derived from overview snapshots.
pub struct EquityHistoryStore {
    store: Option<Box<dyn KvStore>>,
}

impl EquityHistoryStore {
    pub fn new(store: Box<dyn KvStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A store that never persists and always yields an empty series.
    pub fn disabled() -> Self {
        Self { store: None }
    }

    /// File-backed store when the platform has a data directory,
    /// disabled otherwise.
    pub fn default_location() -> Self {
        match FileStore::default_location() {
            Some(store) => Self::new(Box::new(store)),
            None => Self::disabled(),
        }
    }

    /// Appends a sample derived from `overview` and returns the updated
    /// series: ascending by timestamp, unique timestamps (last write wins),
    /// entries older than 30 days dropped. Persistence failures are logged
    /// and the in-memory result is still returned.
    pub fn update(&self, overview: &Overview) -> Vec<EquityPoint> {
        let Some(store) = &self.store else {
            return Vec::new();
        };

        let mut history = self.load(store.as_ref());

        let cutoff = overview.update_time - Duration::days(RETENTION_DAYS);
        history.retain(|point| point.timestamp >= cutoff);

        history.push(EquityPoint {
            timestamp: overview.update_time,
            equity: equity_of(overview),
            pnl: overview.total_pnl,
        });
        // stable sort: among equal timestamps the newest stays last
        history.sort_by_key(|point| point.timestamp);

        let mut deduped: Vec<EquityPoint> = Vec::with_capacity(history.len());
        for point in history {
            match deduped.last_mut() {
                Some(last) if last.timestamp == point.timestamp => *last = point,
                _ => deduped.push(point),
            }
        }

        match serde_json::to_string(&deduped) {
            Ok(encoded) => {
                if let Err(e) = store.set(EQUITY_HISTORY_KEY, &encoded) {
                    log::debug!("failed to persist equity history: {}", e);
                }
            }
            Err(e) => log::debug!("failed to encode equity history: {}", e),
        }

        deduped
    }

    /// Loads the stored series, tolerating a missing key, non-array JSON
    /// and corrupt entries. An entry with an unparseable timestamp keeps
    /// its values under the current instant rather than being lost.
    fn load(&self, store: &dyn KvStore) -> Vec<EquityPoint> {
        let Some(raw) = store.get(EQUITY_HISTORY_KEY) else {
            return Vec::new();
        };
        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("discarding corrupt equity history: {}", e);
                return Vec::new();
            }
        };
        let Value::Array(entries) = parsed else {
            return Vec::new();
        };

        entries
            .iter()
            .filter(|entry| entry.is_object())
            .map(|entry| EquityPoint {
                timestamp: entry
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                    .map(|ts| ts.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now),
                equity: to_number(entry.get("equity")),
                pnl: to_number(entry.get("pnl")),
            })
            .collect()
    }
}

/// Equity for one sample: total assets when the gateway reports a positive
/// figure, otherwise market value plus available cash.
fn equity_of(overview: &Overview) -> f64 {
    if overview.cash.total_assets > 0.0 {
        overview.cash.total_assets
    } else {
        overview.total_market_value + overview.cash.available_cash
    }
}
