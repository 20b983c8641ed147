//! Binance spot adapter.
//!
//! Quotes come from the public 24h ticker; networks from the signed
//! `capital/config/getall` wallet endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::debug;

use common::{CredentialSet, Error, ExchangeId, NetworkInfo, NetworkMap, QuoteSnapshot};

use crate::adapter::{ExchangeAdapter, MarketDataAdapter, NetworkMetadataAdapter};
use crate::auth::sign_binance;
use crate::http::{insert_header, resolve_base_url, HttpClient, Num};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://api.binance.com";
const RECV_WINDOW_MS: u64 = 5000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Ticker {
    symbol: String,
    #[serde(default)]
    bid_price: Num,
    #[serde(default)]
    ask_price: Num,
    #[serde(default)]
    quote_volume: Num,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CoinConfig {
    coin: String,
    #[serde(default)]
    network_list: Vec<CoinNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CoinNetwork {
    network: String,
    #[serde(default)]
    withdraw_enable: bool,
    #[serde(default)]
    deposit_enable: bool,
    #[serde(default)]
    withdraw_fee: Num,
    #[serde(default)]
    withdraw_min: Num,
    #[serde(default, alias = "depositDust")]
    deposit_min: Num,
    #[serde(default)]
    contract_address: Option<String>,
}

/// Binance symbols carry no separator; the quote is matched as a suffix.
pub(crate) fn parse_tickers(rows: Vec<Ticker>, quote: &str) -> QuoteSnapshot {
    let quote = quote.to_ascii_uppercase();
    let mut snapshot = QuoteSnapshot::new(ExchangeId::Binance);

    for row in rows {
        let Some(base) = row.symbol.strip_suffix(quote.as_str()) else {
            continue;
        };
        if base.is_empty() {
            continue;
        }
        if let (Some(ask), Some(bid)) = (row.ask_price.positive(), row.bid_price.positive()) {
            snapshot.insert(base, &quote, ask, bid, row.quote_volume.or_zero());
        }
    }

    snapshot
}

pub(crate) fn parse_networks(coins: Vec<CoinConfig>, asset: &str) -> NetworkMap {
    let Some(coin) = coins
        .into_iter()
        .find(|c| c.coin.eq_ignore_ascii_case(asset))
    else {
        return NetworkMap::new();
    };

    NetworkMap::from_entries(coin.network_list.into_iter().map(|n| {
        let mut info = NetworkInfo::new(ExchangeId::Binance, asset, &n.network);
        info.can_withdraw = n.withdraw_enable;
        info.can_deposit = n.deposit_enable;
        info.withdraw_fee = n.withdraw_fee.or_zero();
        info.min_withdraw = n.withdraw_min.or_zero();
        info.min_deposit = n.deposit_min.or_zero();
        info.contract_address = n.contract_address;
        info
    }))
}

#[derive(Debug, Clone)]
pub struct BinanceAdapter {
    http: HttpClient,
    base_url: String,
    limiter: RateLimiter,
}

impl BinanceAdapter {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            http: HttpClient::new(ExchangeId::Binance, timeout)?,
            base_url: resolve_base_url("BINANCE_API_BASE_URL", BASE_URL),
            limiter: RateLimiter::for_exchange(ExchangeId::Binance),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl MarketDataAdapter for BinanceAdapter {
    async fn order_book(&self, quote: &str) -> Result<QuoteSnapshot, Error> {
        self.limiter.wait_public().await;

        let req = self.http.get(&self.url("/api/v3/ticker/24hr"));
        let rows: Vec<Ticker> = self.http.send_json(req, "ticker/24hr").await?;
        let snapshot = parse_tickers(rows, quote);

        debug!("binance: {} {} pairs", snapshot.len(), quote);
        Ok(snapshot)
    }
}

#[async_trait]
impl NetworkMetadataAdapter for BinanceAdapter {
    async fn networks(
        &self,
        asset: &str,
        credentials: &CredentialSet,
    ) -> Result<NetworkMap, Error> {
        self.limiter.wait_private().await;

        let path = "/sapi/v1/capital/config/getall";
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = format!("timestamp={}&recvWindow={}", timestamp, RECV_WINDOW_MS);
        let signature = sign_binance(&credentials.api_secret, &query)?;

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "x-mbx-apikey", &credentials.api_key)?;

        let url = format!("{}?{}&signature={}", self.url(path), query, signature);
        let req = self.http.get(&url).headers(headers);
        let coins: Vec<CoinConfig> = self.http.send_json(req, "capital/config/getall").await?;

        Ok(parse_networks(coins, asset))
    }
}

impl ExchangeAdapter for BinanceAdapter {
    fn id(&self) -> ExchangeId {
        ExchangeId::Binance
    }
}
