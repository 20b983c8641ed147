//! KuCoin spot adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::debug;

use common::{CredentialSet, Error, ExchangeId, NetworkInfo, NetworkMap, QuoteSnapshot};

use crate::adapter::{ExchangeAdapter, MarketDataAdapter, NetworkMetadataAdapter};
use crate::auth::{sign_kucoin_passphrase, sign_prehash_b64};
use crate::http::{insert_header, resolve_base_url, HttpClient, Num};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://api.kucoin.com";
const SUCCESS: &str = "200000";

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<Option<T>, Error> {
        if self.code != SUCCESS {
            return Err(Error::ExchangeApi {
                exchange: ExchangeId::Kucoin,
                status: 200,
                message: format!("code {}: {}", self.code, self.msg.unwrap_or_default()),
            });
        }
        Ok(self.data)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AllTickers {
    #[serde(default)]
    ticker: Vec<Ticker>,
}

/// `buy` is the best bid and `sell` the best ask.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Ticker {
    symbol: String,
    #[serde(default)]
    buy: Num,
    #[serde(default)]
    sell: Num,
    #[serde(default)]
    vol_value: Num,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrencyDetail {
    currency: String,
    #[serde(default)]
    chains: Option<Vec<Chain>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Chain {
    chain_name: String,
    #[serde(default)]
    withdrawal_min_size: Num,
    #[serde(default)]
    withdrawal_min_fee: Num,
    #[serde(default)]
    is_withdraw_enabled: bool,
    #[serde(default)]
    is_deposit_enabled: bool,
    #[serde(default)]
    deposit_min_size: Num,
    #[serde(default)]
    contract_address: Option<String>,
}

pub(crate) fn parse_tickers(tickers: AllTickers, quote: &str) -> QuoteSnapshot {
    let mut snapshot = QuoteSnapshot::new(ExchangeId::Kucoin);

    for row in tickers.ticker {
        let Some((base, q)) = row.symbol.split_once('-') else {
            continue;
        };
        if !q.eq_ignore_ascii_case(quote) || base.is_empty() {
            continue;
        }
        if let (Some(ask), Some(bid)) = (row.sell.positive(), row.buy.positive()) {
            snapshot.insert(base, q, ask, bid, row.vol_value.or_zero());
        }
    }

    snapshot
}

pub(crate) fn parse_networks(detail: Option<CurrencyDetail>, asset: &str) -> NetworkMap {
    let Some(detail) = detail.filter(|d| d.currency.eq_ignore_ascii_case(asset)) else {
        return NetworkMap::new();
    };

    NetworkMap::from_entries(detail.chains.unwrap_or_default().into_iter().map(|c| {
        let mut info = NetworkInfo::new(ExchangeId::Kucoin, asset, &c.chain_name);
        info.can_withdraw = c.is_withdraw_enabled;
        info.can_deposit = c.is_deposit_enabled;
        info.withdraw_fee = c.withdrawal_min_fee.or_zero();
        info.min_withdraw = c.withdrawal_min_size.or_zero();
        info.min_deposit = c.deposit_min_size.or_zero();
        info.contract_address = c.contract_address;
        info
    }))
}

#[derive(Debug, Clone)]
pub struct KucoinAdapter {
    http: HttpClient,
    base_url: String,
    limiter: RateLimiter,
}

impl KucoinAdapter {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            http: HttpClient::new(ExchangeId::Kucoin, timeout)?,
            base_url: resolve_base_url("KUCOIN_API_BASE_URL", BASE_URL),
            limiter: RateLimiter::for_exchange(ExchangeId::Kucoin),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn signed_headers(&self, credentials: &CredentialSet, path: &str) -> Result<HeaderMap, Error> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = sign_prehash_b64(&credentials.api_secret, &timestamp, "GET", path, "")?;
        let passphrase =
            sign_kucoin_passphrase(&credentials.api_secret, credentials.passphrase_or_empty())?;

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "kc-api-key", &credentials.api_key)?;
        insert_header(&mut headers, "kc-api-sign", &signature)?;
        insert_header(&mut headers, "kc-api-timestamp", &timestamp)?;
        insert_header(&mut headers, "kc-api-passphrase", &passphrase)?;
        insert_header(&mut headers, "kc-api-key-version", "2")?;
        Ok(headers)
    }
}

#[async_trait]
impl MarketDataAdapter for KucoinAdapter {
    async fn order_book(&self, quote: &str) -> Result<QuoteSnapshot, Error> {
        self.limiter.wait_public().await;

        let req = self.http.get(&self.url("/api/v1/market/allTickers"));
        let envelope: Envelope<AllTickers> = self.http.send_json(req, "market/allTickers").await?;
        let tickers = envelope
            .into_data()?
            .ok_or_else(|| Error::Malformed("kucoin allTickers: missing data".into()))?;
        let snapshot = parse_tickers(tickers, quote);

        debug!("kucoin: {} {} pairs", snapshot.len(), quote);
        Ok(snapshot)
    }
}

#[async_trait]
impl NetworkMetadataAdapter for KucoinAdapter {
    async fn networks(
        &self,
        asset: &str,
        credentials: &CredentialSet,
    ) -> Result<NetworkMap, Error> {
        self.limiter.wait_private().await;

        let path = format!("/api/v3/currencies/{}", asset.to_ascii_uppercase());
        let headers = self.signed_headers(credentials, &path)?;
        let req = self.http.get(&self.url(&path)).headers(headers);
        let envelope: Envelope<CurrencyDetail> = self.http.send_json(req, "currencies").await?;

        Ok(parse_networks(envelope.into_data()?, asset))
    }
}

impl ExchangeAdapter for KucoinAdapter {
    fn id(&self) -> ExchangeId {
        ExchangeId::Kucoin
    }
}
