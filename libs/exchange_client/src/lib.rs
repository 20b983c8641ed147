//! Spot exchange adapters.
//!
//! Each adapter turns one exchange's public ticker feed into a
//! [`QuoteSnapshot`](common::QuoteSnapshot) and its (usually signed) wallet
//! endpoints into a [`NetworkMap`](common::NetworkMap). Wire formats,
//! field-name fallbacks and request signing stay inside this crate.

pub mod adapter;
pub mod auth;
pub mod binance;
pub mod gate;
pub mod http;
pub mod kraken;
pub mod kucoin;
pub mod okx;
pub mod rate_limit;
pub mod registry;

pub use adapter::{ExchangeAdapter, MarketDataAdapter, NetworkMetadataAdapter};
pub use rate_limit::RateLimiter;
pub use registry::build_adapter;
