//! Transfer-chain compatibility between a withdrawing and a depositing
//! exchange.
//!
//! A chain qualifies when it is listed by both sides (by canonical name),
//! the source can withdraw on it, the destination can accept deposits on
//! it, and the contract addresses are both absent or equal ignoring case.
//! A contract on one side only does not qualify: the token identity cannot
//! be confirmed.

use common::{NetworkInfo, NetworkMap};
use tracing::trace;

/// One usable chain with both sides' metadata.
#[derive(Debug, Clone, Copy)]
pub struct ChainRoute<'a> {
    pub withdraw: &'a NetworkInfo,
    pub deposit: &'a NetworkInfo,
}

impl<'a> ChainRoute<'a> {
    pub fn chain(&self) -> &'a str {
        &self.withdraw.chain
    }
}

fn contracts_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Feasible chains for `asset`, in the source map's order.
pub fn compatible_chains<'a>(
    asset: &str,
    withdraw: &'a NetworkMap,
    deposit: &'a NetworkMap,
) -> Vec<ChainRoute<'a>> {
    withdraw
        .iter()
        .filter_map(|w| {
            let d = deposit.get(&w.chain)?;
            if !w.can_withdraw || !d.can_deposit {
                return None;
            }
            if !contracts_match(w.contract(), d.contract()) {
                trace!(
                    "{} on {}: contract mismatch {}:{:?} vs {}:{:?}",
                    asset,
                    w.chain,
                    w.exchange,
                    w.contract(),
                    d.exchange,
                    d.contract()
                );
                return None;
            }
            Some(ChainRoute {
                withdraw: w,
                deposit: d,
            })
        })
        .collect()
}
