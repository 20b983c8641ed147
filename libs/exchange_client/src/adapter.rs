//! Adapter traits consumed by the scanner.

use async_trait::async_trait;
use common::{CredentialSet, Error, ExchangeId, NetworkMap, QuoteSnapshot};

/// Per-exchange top-of-book provider.
#[async_trait]
pub trait MarketDataAdapter: Send + Sync {
    /// Best bid/ask for every spot pair quoted in `quote` (e.g. `USDT`).
    async fn order_book(&self, quote: &str) -> Result<QuoteSnapshot, Error>;
}

/// Per-exchange withdraw/deposit capability provider.
#[async_trait]
pub trait NetworkMetadataAdapter: Send + Sync {
    /// Networks available for `asset`, keyed by canonical chain. An asset
    /// the exchange does not list yields an empty map.
    async fn networks(&self, asset: &str, credentials: &CredentialSet)
        -> Result<NetworkMap, Error>;
}

/// A full exchange integration.
pub trait ExchangeAdapter: MarketDataAdapter + NetworkMetadataAdapter {
    fn id(&self) -> ExchangeId;
}
