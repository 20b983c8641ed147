//! Configuration structs for the scanner.

use std::collections::BTreeMap;
use std::time::Duration;

use common::Error;
use serde::{Deserialize, Serialize};

/// Per-scan market filter and profit thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Quote currency every pair must be denominated in.
    #[serde(default = "default_quote")]
    pub quote: String,

    /// Trade size in quote currency.
    #[serde(default = "default_notional")]
    pub notional: f64,

    /// Minimum net profit, percent of notional.
    #[serde(default = "default_min_profit_pct")]
    pub min_profit_pct: f64,

    /// Minimum net profit, quote currency.
    #[serde(default = "default_min_profit_abs")]
    pub min_profit_abs: f64,
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.quote.trim().is_empty() {
            return Err(Error::Config("quote currency must not be empty".into()));
        }
        if !(self.notional.is_finite() && self.notional > 0.0) {
            return Err(Error::Config(format!(
                "notional must be positive, got {}",
                self.notional
            )));
        }
        if !self.min_profit_pct.is_finite() || !self.min_profit_abs.is_finite() {
            return Err(Error::Config("profit thresholds must be finite".into()));
        }
        Ok(())
    }
}

/// Scan cadence and per-request limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTimingConfig {
    /// Pause between periodic scans. Clamped to 5..=120.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Extra attempts after a failed read.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 120;

impl ScanTimingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Taker fee table. Keys are exchange names; anything missing uses
/// `fallback_taker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_taker")]
    pub taker: BTreeMap<String, f64>,

    #[serde(default = "default_fallback_taker")]
    pub fallback_taker: f64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_quote() -> String {
    "USDT".into()
}
fn default_notional() -> f64 {
    1000.0
}
fn default_min_profit_pct() -> f64 {
    0.05
}
fn default_min_profit_abs() -> f64 {
    0.5
}
fn default_interval() -> u64 {
    15
}
fn default_request_timeout() -> u64 {
    12
}
fn default_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    250
}
fn default_taker() -> BTreeMap<String, f64> {
    [
        ("binance", 0.001),
        ("okx", 0.001),
        ("kucoin", 0.001),
        ("gate", 0.002),
        ("kraken", 0.0026),
    ]
    .into_iter()
    .map(|(name, rate)| (name.to_string(), rate))
    .collect()
}
fn default_fallback_taker() -> f64 {
    0.002
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            quote: default_quote(),
            notional: default_notional(),
            min_profit_pct: default_min_profit_pct(),
            min_profit_abs: default_min_profit_abs(),
        }
    }
}

impl Default for ScanTimingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            request_timeout_secs: default_request_timeout(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            taker: default_taker(),
            fallback_taker: default_fallback_taker(),
        }
    }
}
