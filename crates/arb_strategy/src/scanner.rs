//! Scan orchestration.
//!
//! One scan at a time: a request arriving while a scan holds the state
//! lock is dropped, not queued. Credential changes take the same lock, so
//! they land strictly between scans and purge the affected cache entries
//! before the next scan reads them.
//!
//! Within a scan every exchange call runs concurrently under a timeout
//! with a fixed retry budget. A call that still fails contributes empty
//! data for that exchange only.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::{CredentialSet, Credentials, Error, ExchangeId, NetworkMap, Opportunity, QuoteSnapshot};
use exchange_client::ExchangeAdapter;

use crate::arb::ArbMatcher;
use crate::cache::NetworkCache;
use crate::config::{ScanConfig, ScanTimingConfig};
use crate::fees::FeeModel;
use crate::gating::gated_exchanges;

/// Timeout and retry budget for each exchange read.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_timing(timing: &ScanTimingConfig) -> Self {
        Self {
            timeout: timing.request_timeout(),
            retries: timing.retries,
            backoff: timing.retry_backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_timing(&ScanTimingConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Exchanges to consider, in priority order.
    pub exchanges: Vec<ExchangeId>,
    pub config: ScanConfig,
}

/// Outcome of one completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub opportunities: Vec<Opportunity>,
    /// Exchanges whose credentials passed gating.
    pub gated: Vec<ExchangeId>,
    /// Gated exchanges that returned a non-empty snapshot.
    pub exchanges_with_data: Vec<ExchangeId>,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn opportunity_count(&self) -> usize {
        self.opportunities.len()
    }

    /// `Last update: HH:MM:SS | exchanges: a, b | N rows | T s`
    pub fn status_line(&self) -> String {
        let exchanges = if self.exchanges_with_data.is_empty() {
            "none".to_string()
        } else {
            self.exchanges_with_data
                .iter()
                .map(ExchangeId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "Last update: {} | exchanges: {} | {} rows | {:.1} s",
            self.finished_at.format("%H:%M:%S"),
            exchanges,
            self.opportunity_count(),
            self.elapsed.as_secs_f64()
        )
    }
}

struct ScanState {
    credentials: Credentials,
}

pub struct ArbScanner {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    cache: NetworkCache,
    fees: FeeModel,
    policy: RetryPolicy,
    state: Mutex<ScanState>,
}

impl ArbScanner {
    pub fn new(adapters: Vec<Arc<dyn ExchangeAdapter>>, fees: FeeModel, policy: RetryPolicy) -> Self {
        Self {
            adapters,
            cache: NetworkCache::new(),
            fees,
            policy,
            state: Mutex::new(ScanState {
                credentials: Credentials::new(),
            }),
        }
    }

    pub fn cache(&self) -> &NetworkCache {
        &self.cache
    }

    fn adapter(&self, id: ExchangeId) -> Option<&Arc<dyn ExchangeAdapter>> {
        self.adapters.iter().find(|a| a.id() == id)
    }

    // ── Credentials ───────────────────────────────────────────────────

    /// Replace the whole mapping (e.g. after unlocking the vault).
    pub async fn load_credentials(&self, credentials: Credentials) {
        let mut state = self.state.lock().await;
        state.credentials = credentials;
        self.cache.clear();
        info!("Credentials loaded for {} exchange(s)", state.credentials.len());
    }

    pub async fn set_credentials(&self, set: CredentialSet) {
        let mut state = self.state.lock().await;
        let exchange = set.exchange;
        state.credentials.insert(set);
        self.cache.invalidate(exchange);
        info!("Credentials updated for {}", exchange);
    }

    pub async fn remove_credentials(&self, exchange: ExchangeId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.credentials.remove(exchange);
        self.cache.invalidate(exchange);
        removed
    }

    pub async fn clear_credentials(&self) {
        let mut state = self.state.lock().await;
        state.credentials.clear();
        self.cache.clear();
        info!("Credentials cleared");
    }

    pub async fn gated(&self, exchanges: &[ExchangeId]) -> Vec<ExchangeId> {
        let state = self.state.lock().await;
        gated_exchanges(exchanges, &state.credentials)
    }

    // ── Scanning ──────────────────────────────────────────────────────

    /// Run one scan. Returns `None` when another scan is already running.
    pub async fn scan(&self, request: &ScanRequest) -> Option<ScanReport> {
        let Ok(state) = self.state.try_lock() else {
            warn!("Scan already in progress; request dropped");
            return None;
        };
        let started = Instant::now();

        let gated: Vec<ExchangeId> = gated_exchanges(&request.exchanges, &state.credentials)
            .into_iter()
            .filter(|id| {
                let known = self.adapter(*id).is_some();
                if !known {
                    warn!("{}: no adapter configured, skipping", id);
                }
                known
            })
            .collect();

        if gated.len() < 2 {
            info!(
                "Need at least 2 exchanges with credentials, have {}; skipping scan",
                gated.len()
            );
            return Some(ScanReport {
                opportunities: Vec::new(),
                gated,
                exchanges_with_data: Vec::new(),
                elapsed: started.elapsed(),
                finished_at: Utc::now(),
            });
        }

        // 1. Snapshots, all exchanges at once.
        let quote = request.config.quote.to_ascii_uppercase();
        let snapshots: Vec<QuoteSnapshot> = join_all(
            gated
                .iter()
                .filter_map(|id| self.adapter(*id))
                .map(|adapter| self.fetch_snapshot(adapter.as_ref(), &quote)),
        )
        .await;

        let exchanges_with_data: Vec<ExchangeId> = snapshots
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.exchange)
            .collect();

        // 2. Directions worth checking, then the network maps they need.
        let matcher = ArbMatcher::new(&self.fees, &request.config);
        let candidates = matcher.candidates(&snapshots);
        let missing: Vec<(ExchangeId, String)> = ArbMatcher::network_requests(&candidates)
            .into_iter()
            .filter(|(id, asset)| !self.cache.contains(*id, asset))
            .collect();

        let fetched = join_all(missing.into_iter().filter_map(|(id, asset)| {
            let adapter = self.adapter(id)?;
            let credentials = state.credentials.get(id)?;
            Some(async move {
                let result = self.fetch_networks(adapter.as_ref(), &asset, credentials).await;
                (id, asset, result)
            })
        }))
        .await;

        // 3. Populate the cache only after every fetch has settled.
        for (id, asset, result) in fetched {
            if let Some(networks) = result {
                self.cache.insert(id, &asset, networks);
            }
        }

        // 4. Match over read-only data.
        let opportunities = matcher.rank(&candidates, &self.cache);

        let report = ScanReport {
            opportunities,
            gated,
            exchanges_with_data,
            elapsed: started.elapsed(),
            finished_at: Utc::now(),
        };
        info!(
            "Scan done: {} candidates, {} opportunities in {:.2}s",
            candidates.len(),
            report.opportunity_count(),
            report.elapsed.as_secs_f64()
        );
        Some(report)
    }

    async fn fetch_snapshot(&self, adapter: &dyn ExchangeAdapter, quote: &str) -> QuoteSnapshot {
        let id = adapter.id();
        match self.with_retry(id, "order book", || adapter.order_book(quote)).await {
            Ok(snapshot) => {
                debug!("{}: {} markets", id, snapshot.len());
                snapshot
            }
            Err(e) => {
                warn!("{}: order book unavailable, continuing without it: {}", id, e);
                QuoteSnapshot::new(id)
            }
        }
    }

    /// `None` means the fetch failed; the asset is treated as having no
    /// networks for this scan and is retried next scan.
    async fn fetch_networks(
        &self,
        adapter: &dyn ExchangeAdapter,
        asset: &str,
        credentials: &CredentialSet,
    ) -> Option<NetworkMap> {
        let id = adapter.id();
        match self
            .with_retry(id, "networks", || adapter.networks(asset, credentials))
            .await
        {
            Ok(networks) => Some(networks),
            Err(e) => {
                warn!("{}: networks for {} unavailable: {}", id, asset, e);
                None
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, exchange: ExchangeId, what: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let attempts = self.policy.retries + 1;
        let mut last_err = Error::Other(format!("{} {}: no attempt made", exchange, what));

        for attempt in 1..=attempts {
            last_err = match tokio::time::timeout(self.policy.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => Error::Timeout(format!(
                    "{} {} after {:?}",
                    exchange, what, self.policy.timeout
                )),
            };

            if attempt < attempts {
                debug!("{}: {} attempt {}/{} failed: {}", exchange, what, attempt, attempts, last_err);
                let pause = match &last_err {
                    Error::RateLimited { retry_after_ms } => Duration::from_millis(*retry_after_ms),
                    _ => self.policy.backoff,
                };
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::NetworkInfo;
    use exchange_client::{MarketDataAdapter, NetworkMetadataAdapter};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct MockAdapter {
        id: ExchangeId,
        snapshot: QuoteSnapshot,
        networks: HashMap<String, NetworkMap>,
        book_calls: AtomicUsize,
        network_calls: AtomicUsize,
        /// Number of leading order-book calls that fail.
        book_failures: usize,
        /// When set, failures are rate-limit rejections with this pause.
        rate_limit_ms: Option<u64>,
        /// Number of leading network calls that fail.
        network_failures: usize,
        book_delay: Option<Duration>,
        /// (entered, release) pair to hold an order-book call open.
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl MockAdapter {
        fn new(id: ExchangeId, rows: &[(&str, f64, f64)]) -> Self {
            let mut snapshot = QuoteSnapshot::new(id);
            for (base, ask, bid) in rows {
                snapshot.insert(base, "USDT", *ask, *bid, 1.0);
            }
            Self {
                id,
                snapshot,
                networks: HashMap::new(),
                book_calls: AtomicUsize::new(0),
                network_calls: AtomicUsize::new(0),
                book_failures: 0,
                rate_limit_ms: None,
                network_failures: 0,
                book_delay: None,
                gate: None,
            }
        }

        fn with_network(mut self, asset: &str, label: &str, fee: f64) -> Self {
            let mut info = NetworkInfo::new(self.id, asset, label);
            info.can_withdraw = true;
            info.can_deposit = true;
            info.withdraw_fee = fee;
            self.networks
                .insert(asset.to_string(), NetworkMap::from_entries(vec![info]));
            self
        }
    }

    #[async_trait]
    impl MarketDataAdapter for MockAdapter {
        async fn order_book(&self, _quote: &str) -> Result<QuoteSnapshot, Error> {
            let call = self.book_calls.fetch_add(1, Ordering::SeqCst);
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            if let Some(delay) = self.book_delay {
                tokio::time::sleep(delay).await;
            }
            if call < self.book_failures {
                return Err(match self.rate_limit_ms {
                    Some(retry_after_ms) => Error::RateLimited { retry_after_ms },
                    None => Error::Http("connection reset".into()),
                });
            }
            Ok(self.snapshot.clone())
        }
    }

    #[async_trait]
    impl NetworkMetadataAdapter for MockAdapter {
        async fn networks(&self, asset: &str, _credentials: &CredentialSet) -> Result<NetworkMap, Error> {
            let call = self.network_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.network_failures {
                return Err(Error::Http("connection reset".into()));
            }
            Ok(self.networks.get(asset).cloned().unwrap_or_default())
        }
    }

    impl ExchangeAdapter for MockAdapter {
        fn id(&self) -> ExchangeId {
            self.id
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            retries: 2,
            backoff: Duration::ZERO,
        }
    }

    fn binance() -> MockAdapter {
        MockAdapter::new(ExchangeId::Binance, &[("BTC", 100.0, 99.9)]).with_network("BTC", "BTC", 0.0002)
    }

    fn okx() -> MockAdapter {
        MockAdapter::new(ExchangeId::Okx, &[("BTC", 102.0, 101.0)]).with_network("BTC", "Bitcoin", 0.0001)
    }

    fn creds(ids: &[ExchangeId]) -> Credentials {
        let mut c = Credentials::new();
        for id in ids {
            c.insert(CredentialSet::new(*id, "key", "secret").with_passphrase("pass"));
        }
        c
    }

    fn request() -> ScanRequest {
        ScanRequest {
            exchanges: vec![ExchangeId::Binance, ExchangeId::Okx],
            config: ScanConfig::default(),
        }
    }

    async fn scanner_with(adapters: Vec<Arc<MockAdapter>>, ids: &[ExchangeId]) -> ArbScanner {
        let dyn_adapters: Vec<Arc<dyn ExchangeAdapter>> = adapters
            .into_iter()
            .map(|a| a as Arc<dyn ExchangeAdapter>)
            .collect();
        let scanner = ArbScanner::new(dyn_adapters, FeeModel::default(), fast_policy());
        scanner.load_credentials(creds(ids)).await;
        scanner
    }

    #[tokio::test]
    async fn test_end_to_end_scan() {
        let (a, b) = (Arc::new(binance()), Arc::new(okx()));
        let scanner = scanner_with(vec![a.clone(), b.clone()], &[ExchangeId::Binance, ExchangeId::Okx]).await;

        let report = scanner.scan(&request()).await.unwrap();
        assert_eq!(report.gated, vec![ExchangeId::Binance, ExchangeId::Okx]);
        assert_eq!(report.exchanges_with_data, report.gated);
        assert_eq!(report.opportunity_count(), 1);

        let o = &report.opportunities[0];
        assert_eq!(o.chain, "BTC");
        assert!((o.net_profit_abs - 7.97).abs() < 1e-9);
        assert!(report.status_line().contains("| exchanges: binance, okx | 1 rows |"));
    }

    #[tokio::test]
    async fn test_single_gated_exchange_makes_no_calls() {
        let (a, b) = (Arc::new(binance()), Arc::new(okx()));
        let scanner = scanner_with(vec![a.clone(), b.clone()], &[ExchangeId::Binance]).await;

        let report = scanner.scan(&request()).await.unwrap();
        assert!(report.opportunities.is_empty());
        assert_eq!(report.gated, vec![ExchangeId::Binance]);
        assert_eq!(a.book_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.book_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_passphrase_excludes_okx() {
        let (a, b) = (Arc::new(binance()), Arc::new(okx()));
        let scanner = scanner_with(vec![a.clone(), b.clone()], &[ExchangeId::Binance]).await;
        scanner
            .set_credentials(CredentialSet::new(ExchangeId::Okx, "key", "secret"))
            .await;

        let report = scanner.scan(&request()).await.unwrap();
        assert_eq!(report.gated, vec![ExchangeId::Binance]);
        assert_eq!(b.book_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_maps_cached_between_scans() {
        let (a, b) = (Arc::new(binance()), Arc::new(okx()));
        let scanner = scanner_with(vec![a.clone(), b.clone()], &[ExchangeId::Binance, ExchangeId::Okx]).await;

        scanner.scan(&request()).await.unwrap();
        scanner.scan(&request()).await.unwrap();
        assert_eq!(a.book_calls.load(Ordering::SeqCst), 2);
        assert_eq!(a.network_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.network_calls.load(Ordering::SeqCst), 1);
        assert_eq!(scanner.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_credential_update_purges_that_exchange() {
        let (a, b) = (Arc::new(binance()), Arc::new(okx()));
        let scanner = scanner_with(vec![a.clone(), b.clone()], &[ExchangeId::Binance, ExchangeId::Okx]).await;

        scanner.scan(&request()).await.unwrap();
        scanner
            .set_credentials(CredentialSet::new(ExchangeId::Binance, "new-key", "new-secret"))
            .await;
        assert!(!scanner.cache().contains(ExchangeId::Binance, "BTC"));
        assert!(scanner.cache().contains(ExchangeId::Okx, "BTC"));

        scanner.scan(&request()).await.unwrap();
        assert_eq!(a.network_calls.load(Ordering::SeqCst), 2);
        assert_eq!(b.network_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_adapter_retried_then_degraded() {
        let mut broken = okx();
        broken.book_failures = usize::MAX;
        let (a, b) = (Arc::new(binance()), Arc::new(broken));
        let scanner = scanner_with(vec![a.clone(), b.clone()], &[ExchangeId::Binance, ExchangeId::Okx]).await;

        let report = scanner.scan(&request()).await.unwrap();
        assert_eq!(b.book_calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.exchanges_with_data, vec![ExchangeId::Binance]);
        assert!(report.opportunities.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let mut flaky = okx();
        flaky.book_failures = 1;
        let (a, b) = (Arc::new(binance()), Arc::new(flaky));
        let scanner = scanner_with(vec![a.clone(), b.clone()], &[ExchangeId::Binance, ExchangeId::Okx]).await;

        let report = scanner.scan(&request()).await.unwrap();
        assert_eq!(b.book_calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.opportunity_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_call_waits_before_retry() {
        let mut limited = okx();
        limited.book_failures = 1;
        limited.rate_limit_ms = Some(60);
        let (a, b) = (Arc::new(binance()), Arc::new(limited));
        let scanner = scanner_with(vec![a, b.clone()], &[ExchangeId::Binance, ExchangeId::Okx]).await;

        let started = Instant::now();
        let report = scanner.scan(&request()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(b.book_calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.opportunity_count(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_degrades_then_recovers() {
        let mut broken = binance();
        broken.network_failures = 3;
        let (a, b) = (Arc::new(broken), Arc::new(okx()));
        let scanner = scanner_with(vec![a.clone(), b.clone()], &[ExchangeId::Binance, ExchangeId::Okx]).await;

        let first = scanner.scan(&request()).await.unwrap();
        assert!(first.opportunities.is_empty());
        assert_eq!(first.exchanges_with_data, vec![ExchangeId::Binance, ExchangeId::Okx]);
        assert_eq!(a.network_calls.load(Ordering::SeqCst), 3);
        assert!(!scanner.cache().contains(ExchangeId::Binance, "BTC"));
        assert!(scanner.cache().contains(ExchangeId::Okx, "BTC"));

        let second = scanner.scan(&request()).await.unwrap();
        assert_eq!(second.opportunity_count(), 1);
        assert_eq!(a.network_calls.load(Ordering::SeqCst), 4);
        assert_eq!(b.network_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_degrades_exchange() {
        let mut slow = okx();
        slow.book_delay = Some(Duration::from_secs(2));
        let (a, b) = (Arc::new(binance()), Arc::new(slow));
        let dyn_adapters: Vec<Arc<dyn ExchangeAdapter>> = vec![a, b.clone()];
        let scanner = ArbScanner::new(
            dyn_adapters,
            FeeModel::default(),
            RetryPolicy {
                timeout: Duration::from_millis(20),
                retries: 0,
                backoff: Duration::ZERO,
            },
        );
        scanner
            .load_credentials(creds(&[ExchangeId::Binance, ExchangeId::Okx]))
            .await;

        let report = scanner.scan(&request()).await.unwrap();
        assert_eq!(b.book_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.exchanges_with_data, vec![ExchangeId::Binance]);
    }

    #[tokio::test]
    async fn test_concurrent_scan_is_dropped() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut held = binance();
        held.gate = Some((entered.clone(), release.clone()));

        let (a, b) = (Arc::new(held), Arc::new(okx()));
        let scanner = Arc::new(
            scanner_with(vec![a.clone(), b.clone()], &[ExchangeId::Binance, ExchangeId::Okx]).await,
        );

        let background = {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.scan(&request()).await })
        };
        entered.notified().await;

        assert!(scanner.scan(&request()).await.is_none());

        release.notify_one();
        let first = background.await.unwrap();
        assert_eq!(first.unwrap().opportunity_count(), 1);
        assert_eq!(a.book_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_scans_are_identical() {
        let (a, b) = (Arc::new(binance()), Arc::new(okx()));
        let scanner = scanner_with(vec![a, b], &[ExchangeId::Binance, ExchangeId::Okx]).await;

        let first = scanner.scan(&request()).await.unwrap().opportunities;
        let second = scanner.scan(&request()).await.unwrap().opportunities;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_clear_credentials_empties_cache() {
        let (a, b) = (Arc::new(binance()), Arc::new(okx()));
        let scanner = scanner_with(vec![a, b], &[ExchangeId::Binance, ExchangeId::Okx]).await;
        scanner.scan(&request()).await.unwrap();
        assert!(!scanner.cache().is_empty());

        scanner.clear_credentials().await;
        assert!(scanner.cache().is_empty());
        assert!(scanner.gated(&ExchangeId::ALL).await.is_empty());
    }
}
