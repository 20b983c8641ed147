//! Normalized domain types shared by adapters, the matcher and the vault.
//!
//! Adapters translate each exchange's wire format into these types; the
//! strategy crate never sees raw exchange JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chain::canonical_chain;
use crate::error::Error;

// ── Exchanges ─────────────────────────────────────────────────────────

/// Supported spot exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
    Okx,
    Kucoin,
    Gate,
    Kraken,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 5] = [
        ExchangeId::Binance,
        ExchangeId::Okx,
        ExchangeId::Kucoin,
        ExchangeId::Gate,
        ExchangeId::Kraken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Okx => "okx",
            ExchangeId::Kucoin => "kucoin",
            ExchangeId::Gate => "gate",
            ExchangeId::Kraken => "kraken",
        }
    }

    /// Credential fields that must be present and non-empty before the
    /// exchange may take part in a scan.
    pub fn required_credentials(&self) -> &'static [CredentialField] {
        const KEY_SECRET: &[CredentialField] =
            &[CredentialField::ApiKey, CredentialField::ApiSecret];
        const KEY_SECRET_PASSPHRASE: &[CredentialField] = &[
            CredentialField::ApiKey,
            CredentialField::ApiSecret,
            CredentialField::Passphrase,
        ];

        match self {
            ExchangeId::Okx | ExchangeId::Kucoin => KEY_SECRET_PASSPHRASE,
            ExchangeId::Binance | ExchangeId::Gate | ExchangeId::Kraken => KEY_SECRET,
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(ExchangeId::Binance),
            "okx" | "okex" => Ok(ExchangeId::Okx),
            "kucoin" => Ok(ExchangeId::Kucoin),
            "gate" | "gateio" | "gate.io" => Ok(ExchangeId::Gate),
            "kraken" => Ok(ExchangeId::Kraken),
            other => Err(Error::Config(format!("Unknown exchange: {other}"))),
        }
    }
}

// ── Market data ───────────────────────────────────────────────────────

/// A traded pair, e.g. `BTC/USDT`. Symbols are stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketPair {
    pub base: String,
    pub quote: String,
}

impl MarketPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.trim().to_ascii_uppercase(),
            quote: quote.trim().to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for MarketPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Top-of-book quote for one pair on one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookQuote {
    pub exchange: ExchangeId,
    pub pair: MarketPair,
    pub ask: f64,
    pub bid: f64,
    /// 24h traded volume denominated in the quote currency.
    pub quote_volume: f64,
}

/// All quotes one exchange returned for a scan, keyed by pair.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    pub exchange: ExchangeId,
    quotes: BTreeMap<MarketPair, OrderBookQuote>,
}

impl QuoteSnapshot {
    pub fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            quotes: BTreeMap::new(),
        }
    }

    /// Record a quote. Later inserts for the same pair replace earlier ones.
    pub fn insert(&mut self, base: &str, quote: &str, ask: f64, bid: f64, quote_volume: f64) {
        let pair = MarketPair::new(base, quote);
        self.quotes.insert(
            pair.clone(),
            OrderBookQuote {
                exchange: self.exchange,
                pair,
                ask,
                bid,
                quote_volume,
            },
        );
    }

    pub fn get(&self, pair: &MarketPair) -> Option<&OrderBookQuote> {
        self.quotes.get(pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &MarketPair> {
        self.quotes.keys()
    }

    pub fn quotes(&self) -> impl Iterator<Item = &OrderBookQuote> {
        self.quotes.values()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

// ── Network metadata ──────────────────────────────────────────────────

/// Withdraw/deposit capability of one asset on one chain at one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkInfo {
    pub exchange: ExchangeId,
    pub asset: String,
    /// Canonical chain name (see [`canonical_chain`]).
    pub chain: String,
    /// Chain label exactly as the exchange reported it.
    pub label: String,
    pub can_withdraw: bool,
    pub can_deposit: bool,
    /// Withdrawal fee in units of the asset.
    pub withdraw_fee: f64,
    pub min_withdraw: f64,
    pub min_deposit: f64,
    pub contract_address: Option<String>,
}

impl NetworkInfo {
    /// Build an entry from a raw exchange label; the canonical chain name
    /// is derived here so adapters cannot bypass normalization.
    pub fn new(exchange: ExchangeId, asset: &str, label: &str) -> Self {
        Self {
            exchange,
            asset: asset.trim().to_ascii_uppercase(),
            chain: canonical_chain(label),
            label: label.to_string(),
            can_withdraw: false,
            can_deposit: false,
            withdraw_fee: 0.0,
            min_withdraw: 0.0,
            min_deposit: 0.0,
            contract_address: None,
        }
    }

    /// Contract address with blank strings treated as absent.
    pub fn contract(&self) -> Option<&str> {
        self.contract_address
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Networks for one asset on one exchange, keyed by canonical chain and
/// kept in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkMap {
    entries: Vec<NetworkInfo>,
}

impl NetworkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map; when two labels normalize to the same chain the first
    /// one reported wins.
    pub fn from_entries(entries: impl IntoIterator<Item = NetworkInfo>) -> Self {
        let mut map = Self::new();
        for entry in entries {
            map.insert(entry);
        }
        map
    }

    /// Insert unless the canonical chain is already present. Returns
    /// whether the entry was kept.
    pub fn insert(&mut self, entry: NetworkInfo) -> bool {
        if entry.chain.is_empty() || self.get(&entry.chain).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn get(&self, chain: &str) -> Option<&NetworkInfo> {
        self.entries.iter().find(|n| n.chain == chain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Opportunities ─────────────────────────────────────────────────────

/// A fee-adjusted cross-exchange trade that clears the scan thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opportunity {
    pub pair: MarketPair,
    pub buy_exchange: ExchangeId,
    pub buy_price: f64,
    pub sell_exchange: ExchangeId,
    pub sell_price: f64,
    /// Canonical chain the base asset moves over.
    pub chain: String,
    /// Net profit in quote currency.
    pub net_profit_abs: f64,
    /// Net profit as a percentage of notional.
    pub net_profit_pct: f64,
    pub fee_description: String,
}

// ── Credentials ───────────────────────────────────────────────────────

/// Named credential fields used by the gating descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    ApiKey,
    ApiSecret,
    Passphrase,
}

impl CredentialField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialField::ApiKey => "apiKey",
            CredentialField::ApiSecret => "apiSecret",
            CredentialField::Passphrase => "passphrase",
        }
    }
}

/// API credentials for one exchange. Zeroed on drop; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CredentialSet {
    #[zeroize(skip)]
    pub exchange: ExchangeId,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

impl CredentialSet {
    pub fn new(exchange: ExchangeId, api_key: &str, api_secret: &str) -> Self {
        Self {
            exchange,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }

    /// Raw value of a field, if set at all.
    pub fn field(&self, field: CredentialField) -> Option<&str> {
        match field {
            CredentialField::ApiKey => Some(self.api_key.as_str()),
            CredentialField::ApiSecret => Some(self.api_secret.as_str()),
            CredentialField::Passphrase => self.passphrase.as_deref(),
        }
    }

    /// Passphrase or an empty string, for signers that always send one.
    pub fn passphrase_or_empty(&self) -> &str {
        self.passphrase.as_deref().unwrap_or("")
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("exchange", &self.exchange)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The full exchange → credentials mapping stored in the vault.
///
/// Serialized as a plain map; on load every set must sit under its own
/// exchange's key.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<ExchangeId, CredentialSet>",
    try_from = "BTreeMap<ExchangeId, CredentialSet>"
)]
pub struct Credentials {
    sets: BTreeMap<ExchangeId, CredentialSet>,
}

impl From<Credentials> for BTreeMap<ExchangeId, CredentialSet> {
    fn from(credentials: Credentials) -> Self {
        credentials.sets
    }
}

impl TryFrom<BTreeMap<ExchangeId, CredentialSet>> for Credentials {
    type Error = String;

    fn try_from(sets: BTreeMap<ExchangeId, CredentialSet>) -> Result<Self, Self::Error> {
        if let Some((key, set)) = sets.iter().find(|(key, set)| **key != set.exchange) {
            return Err(format!(
                "credentials stored under '{}' belong to '{}'",
                key, set.exchange
            ));
        }
        Ok(Self { sets })
    }
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, exchange: ExchangeId) -> Option<&CredentialSet> {
        self.sets.get(&exchange)
    }

    /// Insert or replace the set for its exchange.
    pub fn insert(&mut self, set: CredentialSet) {
        self.sets.insert(set.exchange, set);
    }

    pub fn remove(&mut self, exchange: ExchangeId) -> bool {
        self.sets.remove(&exchange).is_some()
    }

    /// Drop every set; each one zeroes itself on drop.
    pub fn clear(&mut self) {
        self.sets.clear();
    }

    pub fn exchanges(&self) -> impl Iterator<Item = ExchangeId> + '_ {
        self.sets.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.sets.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_id_parse_and_display() {
        assert_eq!("OKX".parse::<ExchangeId>().unwrap(), ExchangeId::Okx);
        assert_eq!("gate.io".parse::<ExchangeId>().unwrap(), ExchangeId::Gate);
        assert_eq!(ExchangeId::Kucoin.to_string(), "kucoin");
        assert!("bitmex".parse::<ExchangeId>().is_err());
    }

    #[test]
    fn test_passphrase_exchanges_declare_three_fields() {
        assert_eq!(ExchangeId::Okx.required_credentials().len(), 3);
        assert_eq!(ExchangeId::Kucoin.required_credentials().len(), 3);
        assert_eq!(ExchangeId::Binance.required_credentials().len(), 2);
    }

    #[test]
    fn test_network_map_keeps_first_synonym() {
        let mut bsc = NetworkInfo::new(ExchangeId::Binance, "usdt", "BSC");
        bsc.withdraw_fee = 0.3;
        let mut bep20 = NetworkInfo::new(ExchangeId::Binance, "usdt", "BEP20");
        bep20.withdraw_fee = 0.8;

        let map = NetworkMap::from_entries(vec![bsc, bep20]);
        assert_eq!(map.len(), 1);
        let entry = map.get("BEP20").unwrap();
        assert_eq!(entry.label, "BSC");
        assert_eq!(entry.asset, "USDT");
        assert!((entry.withdraw_fee - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_blank_contract_is_absent() {
        let mut n = NetworkInfo::new(ExchangeId::Gate, "BTC", "BTC");
        n.contract_address = Some("  ".into());
        assert!(n.contract().is_none());
        n.contract_address = Some("0xAbC".into());
        assert_eq!(n.contract(), Some("0xAbC"));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let set = CredentialSet::new(ExchangeId::Okx, "key-123", "secret-456").with_passphrase("pp");
        let shown = format!("{:?}", set);
        assert!(!shown.contains("key-123"));
        assert!(!shown.contains("secret-456"));
        assert!(!shown.contains("\"pp\""));

        let mut creds = Credentials::new();
        creds.insert(set);
        assert_eq!(format!("{:?}", creds), "{Okx}");
    }

    #[test]
    fn test_credentials_json_shape() {
        let mut creds = Credentials::new();
        creds.insert(CredentialSet::new(ExchangeId::Binance, "k", "s"));
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["binance"]["api_key"], "k");
        assert!(json["binance"].get("passphrase").is_none());

        let back: Credentials = serde_json::from_value(json).unwrap();
        assert_eq!(back, creds);
    }

    #[test]
    fn test_credentials_key_must_match_exchange() {
        let err = serde_json::from_str::<Credentials>(
            r#"{"okx":{"exchange":"binance","api_key":"k","api_secret":"s"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("stored under 'okx'"));
    }

    #[test]
    fn test_snapshot_uppercases_pairs() {
        let mut snap = QuoteSnapshot::new(ExchangeId::Kraken);
        snap.insert("btc", "usdt", 101.0, 100.0, 5.0);
        let pair = MarketPair::new("BTC", "USDT");
        assert_eq!(snap.get(&pair).unwrap().ask, 101.0);
        assert_eq!(pair.to_string(), "BTC/USDT");
    }
}
