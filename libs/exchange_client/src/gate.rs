//! Gate spot adapter.
//!
//! Chain capabilities come from the public `currency_chains` listing; fees
//! and minimums from the signed `withdraw_status` endpoint. Both are keyed
//! by Gate's own chain code and merged on it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::debug;

use common::{CredentialSet, Error, ExchangeId, NetworkInfo, NetworkMap, QuoteSnapshot};

use crate::adapter::{ExchangeAdapter, MarketDataAdapter, NetworkMetadataAdapter};
use crate::auth::sign_gate;
use crate::http::{insert_header, resolve_base_url, HttpClient, Num};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://api.gateio.ws";

#[derive(Debug, Deserialize)]
pub(crate) struct Ticker {
    currency_pair: String,
    #[serde(default)]
    lowest_ask: Num,
    #[serde(default)]
    highest_bid: Num,
    #[serde(default)]
    quote_volume: Num,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrencyChain {
    chain: String,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    is_disabled: Num,
    #[serde(default)]
    is_deposit_disabled: Num,
    #[serde(default)]
    is_withdraw_disabled: Num,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WithdrawStatus {
    currency: String,
    #[serde(default)]
    withdraw_fix: Num,
    #[serde(default)]
    withdraw_amount_mini: Num,
    #[serde(default)]
    withdraw_fix_on_chains: HashMap<String, Num>,
}

fn flag(n: Num) -> bool {
    n.or_zero() != 0.0
}

pub(crate) fn parse_tickers(rows: Vec<Ticker>, quote: &str) -> QuoteSnapshot {
    let mut snapshot = QuoteSnapshot::new(ExchangeId::Gate);

    for row in rows {
        let Some((base, q)) = row.currency_pair.split_once('_') else {
            continue;
        };
        if !q.eq_ignore_ascii_case(quote) || base.is_empty() {
            continue;
        }
        if let (Some(ask), Some(bid)) = (row.lowest_ask.positive(), row.highest_bid.positive()) {
            snapshot.insert(base, q, ask, bid, row.quote_volume.or_zero());
        }
    }

    snapshot
}

pub(crate) fn parse_networks(
    chains: Vec<CurrencyChain>,
    statuses: Vec<WithdrawStatus>,
    asset: &str,
) -> NetworkMap {
    let status = statuses
        .into_iter()
        .find(|s| s.currency.eq_ignore_ascii_case(asset));

    NetworkMap::from_entries(chains.into_iter().map(|c| {
        let mut info = NetworkInfo::new(ExchangeId::Gate, asset, &c.chain);
        let disabled = flag(c.is_disabled);
        info.can_withdraw = !disabled && !flag(c.is_withdraw_disabled);
        info.can_deposit = !disabled && !flag(c.is_deposit_disabled);

        if let Some(status) = &status {
            info.withdraw_fee = status
                .withdraw_fix_on_chains
                .get(&c.chain)
                .and_then(|fee| fee.get())
                .or(status.withdraw_fix.get())
                .unwrap_or(0.0);
            info.min_withdraw = status.withdraw_amount_mini.or_zero();
        }
        info.contract_address = c.contract_address;
        info
    }))
}

#[derive(Debug, Clone)]
pub struct GateAdapter {
    http: HttpClient,
    base_url: String,
    limiter: RateLimiter,
}

impl GateAdapter {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            http: HttpClient::new(ExchangeId::Gate, timeout)?,
            base_url: resolve_base_url("GATE_API_BASE_URL", BASE_URL),
            limiter: RateLimiter::for_exchange(ExchangeId::Gate),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn currency_chains(&self, asset: &str) -> Result<Vec<CurrencyChain>, Error> {
        self.limiter.wait_public().await;
        let url = format!("{}?currency={}", self.url("/api/v4/wallet/currency_chains"), asset);
        self.http.send_json(self.http.get(&url), "wallet/currency_chains").await
    }

    async fn withdraw_status(
        &self,
        asset: &str,
        credentials: &CredentialSet,
    ) -> Result<Vec<WithdrawStatus>, Error> {
        self.limiter.wait_private().await;

        let path = "/api/v4/wallet/withdraw_status";
        let query = format!("currency={}", asset);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_gate(&credentials.api_secret, "GET", path, &query, "", &timestamp)?;

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "key", &credentials.api_key)?;
        insert_header(&mut headers, "timestamp", &timestamp)?;
        insert_header(&mut headers, "sign", &signature)?;

        let url = format!("{}?{}", self.url(path), query);
        let req = self.http.get(&url).headers(headers);
        self.http.send_json(req, "wallet/withdraw_status").await
    }
}

#[async_trait]
impl MarketDataAdapter for GateAdapter {
    async fn order_book(&self, quote: &str) -> Result<QuoteSnapshot, Error> {
        self.limiter.wait_public().await;

        let req = self.http.get(&self.url("/api/v4/spot/tickers"));
        let rows: Vec<Ticker> = self.http.send_json(req, "spot/tickers").await?;
        let snapshot = parse_tickers(rows, quote);

        debug!("gate: {} {} pairs", snapshot.len(), quote);
        Ok(snapshot)
    }
}

#[async_trait]
impl NetworkMetadataAdapter for GateAdapter {
    async fn networks(
        &self,
        asset: &str,
        credentials: &CredentialSet,
    ) -> Result<NetworkMap, Error> {
        let asset = asset.to_ascii_uppercase();
        let (chains, statuses) = tokio::try_join!(
            self.currency_chains(&asset),
            self.withdraw_status(&asset, credentials)
        )?;
        Ok(parse_networks(chains, statuses, &asset))
    }
}

impl ExchangeAdapter for GateAdapter {
    fn id(&self) -> ExchangeId {
        ExchangeId::Gate
    }
}
