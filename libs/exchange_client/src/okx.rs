//! OKX spot adapter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::debug;

use common::{CredentialSet, Error, ExchangeId, NetworkInfo, NetworkMap, QuoteSnapshot};

use crate::adapter::{ExchangeAdapter, MarketDataAdapter, NetworkMetadataAdapter};
use crate::auth::sign_prehash_b64;
use crate::http::{insert_header, resolve_base_url, HttpClient, Num};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://www.okx.com";

/// `{"code":"0","msg":"","data":[...]}`; any other code is an API error.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<Vec<T>, Error> {
        if self.code != "0" {
            return Err(Error::ExchangeApi {
                exchange: ExchangeId::Okx,
                status: 200,
                message: format!("code {}: {}", self.code, self.msg),
            });
        }
        Ok(self.data)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Ticker {
    inst_id: String,
    #[serde(default)]
    ask_px: Num,
    #[serde(default)]
    bid_px: Num,
    /// Quote-currency volume for spot instruments.
    #[serde(default)]
    vol_ccy24h: Num,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Currency {
    ccy: String,
    chain: String,
    #[serde(default)]
    can_dep: bool,
    #[serde(default)]
    can_wd: bool,
    #[serde(default)]
    fee: Num,
    #[serde(default)]
    min_fee: Num,
    #[serde(default)]
    min_wd: Num,
    #[serde(default)]
    min_dep: Num,
    #[serde(default)]
    ct_addr: Option<String>,
}

pub(crate) fn parse_tickers(rows: Vec<Ticker>, quote: &str) -> QuoteSnapshot {
    let mut snapshot = QuoteSnapshot::new(ExchangeId::Okx);

    for row in rows {
        let Some((base, q)) = row.inst_id.split_once('-') else {
            continue;
        };
        if !q.eq_ignore_ascii_case(quote) || base.is_empty() {
            continue;
        }
        if let (Some(ask), Some(bid)) = (row.ask_px.positive(), row.bid_px.positive()) {
            snapshot.insert(base, q, ask, bid, row.vol_ccy24h.or_zero());
        }
    }

    snapshot
}

/// OKX chain names are `"{CCY}-{network}"`, e.g. `USDT-TRC20`.
fn chain_label<'a>(ccy: &str, chain: &'a str) -> &'a str {
    match chain.split_once('-') {
        Some((prefix, rest)) if prefix.eq_ignore_ascii_case(ccy) && !rest.is_empty() => rest,
        _ => chain,
    }
}

pub(crate) fn parse_networks(rows: Vec<Currency>, asset: &str) -> NetworkMap {
    NetworkMap::from_entries(
        rows.into_iter()
            .filter(|c| c.ccy.eq_ignore_ascii_case(asset))
            .map(|c| {
                let mut info = NetworkInfo::new(ExchangeId::Okx, asset, chain_label(&c.ccy, &c.chain));
                info.can_withdraw = c.can_wd;
                info.can_deposit = c.can_dep;
                info.withdraw_fee = c.fee.get().or(c.min_fee.get()).unwrap_or(0.0);
                info.min_withdraw = c.min_wd.or_zero();
                info.min_deposit = c.min_dep.or_zero();
                info.contract_address = c.ct_addr;
                info
            }),
    )
}

#[derive(Debug, Clone)]
pub struct OkxAdapter {
    http: HttpClient,
    base_url: String,
    limiter: RateLimiter,
}

impl OkxAdapter {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            http: HttpClient::new(ExchangeId::Okx, timeout)?,
            base_url: resolve_base_url("OKX_API_BASE_URL", BASE_URL),
            limiter: RateLimiter::for_exchange(ExchangeId::Okx),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn signed_headers(&self, credentials: &CredentialSet, path: &str) -> Result<HeaderMap, Error> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let signature = sign_prehash_b64(&credentials.api_secret, &timestamp, "GET", path, "")?;

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "ok-access-key", &credentials.api_key)?;
        insert_header(&mut headers, "ok-access-sign", &signature)?;
        insert_header(&mut headers, "ok-access-timestamp", &timestamp)?;
        insert_header(&mut headers, "ok-access-passphrase", credentials.passphrase_or_empty())?;
        Ok(headers)
    }
}

#[async_trait]
impl MarketDataAdapter for OkxAdapter {
    async fn order_book(&self, quote: &str) -> Result<QuoteSnapshot, Error> {
        self.limiter.wait_public().await;

        let req = self.http.get(&self.url("/api/v5/market/tickers?instType=SPOT"));
        let envelope: Envelope<Ticker> = self.http.send_json(req, "market/tickers").await?;
        let snapshot = parse_tickers(envelope.into_data()?, quote);

        debug!("okx: {} {} pairs", snapshot.len(), quote);
        Ok(snapshot)
    }
}

#[async_trait]
impl NetworkMetadataAdapter for OkxAdapter {
    async fn networks(
        &self,
        asset: &str,
        credentials: &CredentialSet,
    ) -> Result<NetworkMap, Error> {
        self.limiter.wait_private().await;

        let path = format!("/api/v5/asset/currencies?ccy={}", asset.to_ascii_uppercase());
        let headers = self.signed_headers(credentials, &path)?;
        let req = self.http.get(&self.url(&path)).headers(headers);
        let envelope: Envelope<Currency> = self.http.send_json(req, "asset/currencies").await?;

        Ok(parse_networks(envelope.into_data()?, asset))
    }
}

impl ExchangeAdapter for OkxAdapter {
    fn id(&self) -> ExchangeId {
        ExchangeId::Okx
    }
}
