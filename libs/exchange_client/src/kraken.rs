//! Kraken spot adapter.
//!
//! Kraken names some assets differently (`XBT` for BTC, `XDG` for DOGE) and
//! reports withdraw and deposit methods from two separate private calls,
//! which are merged here by canonical chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use common::{
    canonical_chain, is_canonical_chain, CredentialSet, Error, ExchangeId, NetworkInfo, NetworkMap, QuoteSnapshot,
};

use crate::adapter::{ExchangeAdapter, MarketDataAdapter, NetworkMetadataAdapter};
use crate::auth::sign_kraken;
use crate::http::{insert_header, resolve_base_url, HttpClient, Num};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://api.kraken.com";

const ASSET_ALIASES: &[(&str, &str)] = &[("XBT", "BTC"), ("XDG", "DOGE")];

/// Kraken asset code → common ticker.
pub(crate) fn from_kraken_asset(code: &str) -> String {
    let upper = code.trim().to_ascii_uppercase();
    ASSET_ALIASES
        .iter()
        .find(|(kraken, _)| *kraken == upper)
        .map(|(_, common)| (*common).to_string())
        .unwrap_or(upper)
}

/// Common ticker → Kraken asset code.
pub(crate) fn to_kraken_asset(asset: &str) -> String {
    let upper = asset.trim().to_ascii_uppercase();
    ASSET_ALIASES
        .iter()
        .find(|(_, common)| *common == upper)
        .map(|(kraken, _)| (*kraken).to_string())
        .unwrap_or(upper)
}

/// `{"error":[...],"result":...}`; a non-empty error list is an API error.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, Error> {
        if !self.error.is_empty() {
            return Err(Error::ExchangeApi {
                exchange: ExchangeId::Kraken,
                status: 200,
                message: self.error.join("; "),
            });
        }
        self.result
            .ok_or_else(|| Error::Malformed("kraken: response without result".into()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssetPair {
    #[serde(default)]
    wsname: Option<String>,
}

/// Ticker arrays: `a`/`b` = [price, whole lot volume, lot volume],
/// `v`/`p` = [today, last 24 hours].
#[derive(Debug, Deserialize)]
pub(crate) struct Ticker {
    #[serde(default)]
    a: Vec<Num>,
    #[serde(default)]
    b: Vec<Num>,
    #[serde(default)]
    v: Vec<Num>,
    #[serde(default)]
    p: Vec<Num>,
}

impl Ticker {
    fn at(values: &[Num], i: usize) -> Num {
        values.get(i).copied().unwrap_or_default()
    }

    fn quote_volume(&self) -> f64 {
        Self::at(&self.v, 1).or_zero() * Self::at(&self.p, 1).or_zero()
    }
}

/// Older responses send `fee` as a string, newer ones as an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WithdrawFee {
    Detailed {
        #[serde(default)]
        fee: Num,
    },
    Flat(Num),
}

impl WithdrawFee {
    fn amount(&self) -> f64 {
        match self {
            WithdrawFee::Detailed { fee } => fee.or_zero(),
            WithdrawFee::Flat(fee) => fee.or_zero(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WithdrawMethod {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    minimum: Num,
    #[serde(default)]
    fee: Option<WithdrawFee>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DepositMethod {
    method: String,
    #[serde(default)]
    minimum: Num,
}

pub(crate) fn parse_tickers(
    pairs: HashMap<String, AssetPair>,
    tickers: HashMap<String, Ticker>,
    quote: &str,
) -> QuoteSnapshot {
    let quote = quote.to_ascii_uppercase();
    let mut snapshot = QuoteSnapshot::new(ExchangeId::Kraken);

    for (key, ticker) in tickers {
        let Some(wsname) = pairs.get(&key).and_then(|p| p.wsname.as_deref()) else {
            continue;
        };
        let Some((base, q)) = wsname.split_once('/') else {
            continue;
        };
        if from_kraken_asset(q) != quote || base.is_empty() {
            continue;
        }
        let ask = Ticker::at(&ticker.a, 0).positive();
        let bid = Ticker::at(&ticker.b, 0).positive();
        if let (Some(ask), Some(bid)) = (ask, bid) {
            snapshot.insert(&from_kraken_asset(base), &quote, ask, bid, ticker.quote_volume());
        }
    }

    snapshot
}

/// Deposit method names sometimes carry an address format rather than a
/// chain in brackets ("Ether (Hex)"); those fall back to the name itself.
pub(crate) fn deposit_chain(method: &str) -> String {
    let chain = canonical_chain(method);
    if is_canonical_chain(&chain) {
        return chain;
    }
    match method.split_once('(') {
        Some((name, _)) if !name.trim().is_empty() => canonical_chain(name),
        _ => chain,
    }
}

pub(crate) fn parse_networks(
    withdrawals: Vec<WithdrawMethod>,
    deposits: Vec<DepositMethod>,
    asset: &str,
) -> NetworkMap {
    let mut entries: Vec<NetworkInfo> = Vec::new();

    for w in withdrawals {
        let Some(label) = w.network.as_deref().or(w.method.as_deref()) else {
            continue;
        };
        let mut info = NetworkInfo::new(ExchangeId::Kraken, asset, label);
        if entries.iter().any(|e| e.chain == info.chain) {
            continue;
        }
        info.can_withdraw = true;
        info.withdraw_fee = w.fee.as_ref().map(WithdrawFee::amount).unwrap_or(0.0);
        info.min_withdraw = w.minimum.or_zero();
        entries.push(info);
    }

    for d in deposits {
        let chain = deposit_chain(&d.method);
        match entries.iter_mut().find(|e| e.chain == chain) {
            Some(existing) => {
                if !existing.can_deposit {
                    existing.can_deposit = true;
                    existing.min_deposit = d.minimum.or_zero();
                }
            }
            None => {
                let mut info = NetworkInfo::new(ExchangeId::Kraken, asset, &d.method);
                info.chain = chain;
                info.can_deposit = true;
                info.min_deposit = d.minimum.or_zero();
                entries.push(info);
            }
        }
    }

    NetworkMap::from_entries(entries)
}

#[derive(Debug, Clone)]
pub struct KrakenAdapter {
    http: HttpClient,
    base_url: String,
    limiter: RateLimiter,
    last_nonce: Arc<AtomicU64>,
}

impl KrakenAdapter {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            http: HttpClient::new(ExchangeId::Kraken, timeout)?,
            base_url: resolve_base_url("KRAKEN_API_BASE_URL", BASE_URL),
            limiter: RateLimiter::for_exchange(ExchangeId::Kraken),
            last_nonce: Arc::new(AtomicU64::new(0)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Strictly increasing millisecond nonce, even for calls in the same ms.
    fn next_nonce(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut prev = self.last_nonce.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_nonce.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    async fn public<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.limiter.wait_public().await;
        let envelope: Envelope<T> = self.http.send_json(self.http.get(&self.url(path)), path).await?;
        envelope.into_result()
    }

    async fn private<T: DeserializeOwned>(
        &self,
        path: &str,
        kraken_asset: &str,
        credentials: &CredentialSet,
    ) -> Result<T, Error> {
        self.limiter.wait_private().await;

        let nonce = self.next_nonce();
        let body = format!("nonce={}&asset={}", nonce, kraken_asset);
        let signature = sign_kraken(&credentials.api_secret, path, nonce, &body)?;

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "api-key", &credentials.api_key)?;
        insert_header(&mut headers, "api-sign", &signature)?;
        headers.insert(
            CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let req = self.http.post(&self.url(path)).headers(headers).body(body);
        let envelope: Envelope<T> = self.http.send_json(req, path).await?;
        envelope.into_result()
    }
}

#[async_trait]
impl MarketDataAdapter for KrakenAdapter {
    async fn order_book(&self, quote: &str) -> Result<QuoteSnapshot, Error> {
        let (pairs, tickers) = tokio::try_join!(
            self.public::<HashMap<String, AssetPair>>("/0/public/AssetPairs"),
            self.public::<HashMap<String, Ticker>>("/0/public/Ticker"),
        )?;
        let snapshot = parse_tickers(pairs, tickers, quote);

        debug!("kraken: {} {} pairs", snapshot.len(), quote);
        Ok(snapshot)
    }
}

#[async_trait]
impl NetworkMetadataAdapter for KrakenAdapter {
    async fn networks(
        &self,
        asset: &str,
        credentials: &CredentialSet,
    ) -> Result<NetworkMap, Error> {
        let kraken_asset = to_kraken_asset(asset);
        let withdrawals: Vec<WithdrawMethod> = self
            .private("/0/private/WithdrawMethods", &kraken_asset, credentials)
            .await?;
        let deposits: Vec<DepositMethod> = self
            .private("/0/private/DepositMethods", &kraken_asset, credentials)
            .await?;

        Ok(parse_networks(withdrawals, deposits, asset))
    }
}

impl ExchangeAdapter for KrakenAdapter {
    fn id(&self) -> ExchangeId {
        ExchangeId::Kraken
    }
}
