//! Configuration loader: .env, then config.toml, then ARB_* overrides.

use common::{Error, ExchangeId};
use serde::{Deserialize, Serialize};
use std::path::Path;

use arb_strategy::config::{FeeConfig, ScanConfig, ScanTimingConfig};

/// Top-level scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Exchanges to scan, in priority order.
    #[serde(default = "default_exchanges")]
    pub exchanges: Vec<ExchangeId>,

    /// Where the encrypted credential blob lives.
    #[serde(default = "default_vault_path")]
    pub vault_path: String,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub timing: ScanTimingConfig,

    #[serde(default)]
    pub fees: FeeConfig,
}

fn default_exchanges() -> Vec<ExchangeId> {
    ExchangeId::ALL.to_vec()
}

fn default_vault_path() -> String {
    "credentials.vault".into()
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            exchanges: default_exchanges(),
            vault_path: default_vault_path(),
            scan: ScanConfig::default(),
            timing: ScanTimingConfig::default(),
            fees: FeeConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, Error> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{} has an invalid value: '{}'", name, raw)))
}

/// Apply `ARB_*` overrides read through `var`.
fn apply_env_overrides(
    config: &mut ScannerConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(list) = var("ARB_EXCHANGES") {
        config.exchanges = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<ExchangeId>)
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(quote) = var("ARB_QUOTE") {
        config.scan.quote = quote.trim().to_ascii_uppercase();
    }
    if let Some(raw) = var("ARB_NOTIONAL") {
        config.scan.notional = parse_env("ARB_NOTIONAL", &raw)?;
    }
    if let Some(raw) = var("ARB_MIN_PCT") {
        config.scan.min_profit_pct = parse_env("ARB_MIN_PCT", &raw)?;
    }
    if let Some(raw) = var("ARB_MIN_ABS") {
        config.scan.min_profit_abs = parse_env("ARB_MIN_ABS", &raw)?;
    }
    if let Some(raw) = var("ARB_INTERVAL_SECS") {
        config.timing.interval_secs = parse_env("ARB_INTERVAL_SECS", &raw)?;
    }
    if let Some(path) = var("ARB_VAULT_PATH") {
        if !path.trim().is_empty() {
            config.vault_path = path.trim().to_string();
        }
    }
    Ok(())
}

/// Load scanner configuration from environment and optional config file.
pub fn load_config(config_path: &Path) -> Result<ScannerConfig, Error> {
    // .env first so ARB_* values from it count as overrides.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let mut config = ScannerConfig::default();

    // A missing file means defaults.
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
    }

    // Environment wins over the file.
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    config.scan.validate()?;
    if config.exchanges.is_empty() {
        return Err(Error::Config("at least one exchange must be configured".into()));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_toml_sections() {
        let config: ScannerConfig = toml::from_str(
            r#"
            exchanges = ["binance", "kraken"]
            vault_path = "/tmp/arb.vault"

            [scan]
            notional = 250.0
            min_profit_pct = 0.1

            [timing]
            interval_secs = 30

            [fees]
            fallback_taker = 0.0025
            [fees.taker]
            binance = 0.00075
            "#,
        )
        .unwrap();

        assert_eq!(config.exchanges, vec![ExchangeId::Binance, ExchangeId::Kraken]);
        assert_eq!(config.scan.notional, 250.0);
        assert_eq!(config.scan.quote, "USDT");
        assert_eq!(config.scan.min_profit_abs, 0.5);
        assert_eq!(config.timing.interval_secs, 30);
        assert_eq!(config.timing.retries, 2);
        assert_eq!(config.fees.taker.len(), 1);
        assert_eq!(config.fees.fallback_taker, 0.0025);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ScannerConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("ARB_EXCHANGES", "okx, gate.io"),
                ("ARB_QUOTE", "usdc"),
                ("ARB_NOTIONAL", "500"),
                ("ARB_MIN_PCT", "0.2"),
                ("ARB_MIN_ABS", "1.5"),
                ("ARB_INTERVAL_SECS", "60"),
                ("ARB_VAULT_PATH", "/var/lib/arb.vault"),
            ]),
        )
        .unwrap();

        assert_eq!(config.exchanges, vec![ExchangeId::Okx, ExchangeId::Gate]);
        assert_eq!(config.scan.quote, "USDC");
        assert_eq!(config.scan.notional, 500.0);
        assert_eq!(config.scan.min_profit_pct, 0.2);
        assert_eq!(config.scan.min_profit_abs, 1.5);
        assert_eq!(config.timing.interval_secs, 60);
        assert_eq!(config.vault_path, "/var/lib/arb.vault");
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let mut config = ScannerConfig::default();
        assert!(apply_env_overrides(&mut config, env(&[("ARB_NOTIONAL", "lots")])).is_err());
        assert!(apply_env_overrides(&mut config, env(&[("ARB_EXCHANGES", "binance,ftx")])).is_err());
    }
}
