//! Shared types, chain naming, and error definitions for the arbitrage scanner.

pub mod chain;
pub mod error;
pub mod types;

pub use chain::{canonical_chain, is_canonical_chain};
pub use error::Error;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
