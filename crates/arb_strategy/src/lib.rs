//! Arb strategy crate.
//!
//! Finds fee-adjusted cross-exchange spot arbitrage: credential gating,
//! chain compatibility, the fee model, the network cache, the matcher and
//! the scan orchestrator.

pub mod arb;
pub mod cache;
pub mod config;
pub mod fees;
pub mod gating;
pub mod resolver;
pub mod scanner;

pub use arb::{ArbMatcher, Candidate, NetworkLookup};
pub use cache::NetworkCache;
pub use config::{FeeConfig, ScanConfig, ScanTimingConfig};
pub use fees::{net_profit, FeeBreakdown, FeeModel};
pub use gating::{gated_exchanges, is_gated, missing_fields};
pub use resolver::{compatible_chains, ChainRoute};
pub use scanner::{ArbScanner, RetryPolicy, ScanReport, ScanRequest};
