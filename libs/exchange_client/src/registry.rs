//! Adapter construction by exchange id.

use std::sync::Arc;
use std::time::Duration;

use common::{Error, ExchangeId};

use crate::adapter::ExchangeAdapter;
use crate::binance::BinanceAdapter;
use crate::gate::GateAdapter;
use crate::kraken::KrakenAdapter;
use crate::kucoin::KucoinAdapter;
use crate::okx::OkxAdapter;

/// Build the live adapter for `id` with a per-request HTTP timeout.
pub fn build_adapter(id: ExchangeId, timeout: Duration) -> Result<Arc<dyn ExchangeAdapter>, Error> {
    let adapter: Arc<dyn ExchangeAdapter> = match id {
        ExchangeId::Binance => Arc::new(BinanceAdapter::new(timeout)?),
        ExchangeId::Okx => Arc::new(OkxAdapter::new(timeout)?),
        ExchangeId::Kucoin => Arc::new(KucoinAdapter::new(timeout)?),
        ExchangeId::Gate => Arc::new(GateAdapter::new(timeout)?),
        ExchangeId::Kraken => Arc::new(KrakenAdapter::new(timeout)?),
    };
    Ok(adapter)
}
