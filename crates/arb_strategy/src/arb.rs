//! Arb matcher: turns per-exchange quote snapshots and network metadata
//! into a ranked list of fee-adjusted opportunities.
//!
//! Matching is synchronous and performs no I/O. The scanner first calls
//! [`ArbMatcher::candidates`] to learn which (exchange, asset) network maps
//! it needs, fetches them, and then calls [`ArbMatcher::rank`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use common::{ExchangeId, MarketPair, NetworkMap, Opportunity, QuoteSnapshot};
use tracing::debug;

use crate::config::ScanConfig;
use crate::fees::{net_profit, FeeModel};
use crate::resolver::compatible_chains;

/// Read-only source of network maps during matching.
pub trait NetworkLookup {
    fn networks(&self, exchange: ExchangeId, asset: &str) -> Option<Arc<NetworkMap>>;
}

impl NetworkLookup for HashMap<(ExchangeId, String), Arc<NetworkMap>> {
    fn networks(&self, exchange: ExchangeId, asset: &str) -> Option<Arc<NetworkMap>> {
        self.get(&(exchange, asset.to_string())).cloned()
    }
}

/// One trade direction that survived price checks and pruning.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub pair: MarketPair,
    pub buy_exchange: ExchangeId,
    pub buy_price: f64,
    pub sell_exchange: ExchangeId,
    pub sell_price: f64,
}

impl Candidate {
    pub fn asset(&self) -> &str {
        &self.pair.base
    }
}

pub struct ArbMatcher<'a> {
    fees: &'a FeeModel,
    config: &'a ScanConfig,
}

impl<'a> ArbMatcher<'a> {
    pub fn new(fees: &'a FeeModel, config: &'a ScanConfig) -> Self {
        Self { fees, config }
    }

    fn meets_thresholds(&self, net_abs: f64, net_pct: f64) -> bool {
        net_abs >= self.config.min_profit_abs && net_pct >= self.config.min_profit_pct
    }

    /// Every (buy, sell) direction across exchange pairs sharing a market.
    ///
    /// Directions with a non-positive ask or bid are rejected, as are
    /// directions that miss the thresholds even with a free withdrawal.
    pub fn candidates(&self, snapshots: &[QuoteSnapshot]) -> Vec<Candidate> {
        let markets: BTreeSet<&MarketPair> = snapshots
            .iter()
            .flat_map(|s| s.pairs())
            .filter(|p| p.quote.eq_ignore_ascii_case(&self.config.quote))
            .collect();

        let mut out = Vec::new();
        for pair in markets {
            for i in 0..snapshots.len() {
                for j in (i + 1)..snapshots.len() {
                    let (a, b) = (&snapshots[i], &snapshots[j]);
                    if a.exchange == b.exchange {
                        continue;
                    }
                    let (Some(qa), Some(qb)) = (a.get(pair), b.get(pair)) else {
                        continue;
                    };
                    for (buy, sell) in [(qa, qb), (qb, qa)] {
                        if buy.ask <= 0.0 || sell.bid <= 0.0 {
                            continue;
                        }
                        let upper = self.fees.evaluate(
                            buy.exchange,
                            buy.ask,
                            sell.exchange,
                            sell.bid,
                            self.config.notional,
                            0.0,
                        );
                        if !self.meets_thresholds(upper.net_profit_quote, upper.net_profit_pct) {
                            continue;
                        }
                        out.push(Candidate {
                            pair: pair.clone(),
                            buy_exchange: buy.exchange,
                            buy_price: buy.ask,
                            sell_exchange: sell.exchange,
                            sell_price: sell.bid,
                        });
                    }
                }
            }
        }
        out
    }

    /// Network maps needed to evaluate `candidates`: the asset on the buy
    /// side (withdraw) and on the sell side (deposit).
    pub fn network_requests(candidates: &[Candidate]) -> BTreeSet<(ExchangeId, String)> {
        candidates
            .iter()
            .flat_map(|c| {
                [
                    (c.buy_exchange, c.asset().to_string()),
                    (c.sell_exchange, c.asset().to_string()),
                ]
            })
            .collect()
    }

    /// Best feasible chain for one direction, if it clears the thresholds.
    ///
    /// Missing network maps count as empty. Chains whose minimum
    /// withdrawal exceeds the traded units are skipped; among the rest the
    /// highest net profit wins and ties keep the first chain seen.
    pub fn evaluate(&self, candidate: &Candidate, lookup: &dyn NetworkLookup) -> Option<Opportunity> {
        let asset = candidate.asset();
        let withdraw = lookup.networks(candidate.buy_exchange, asset)?;
        let deposit = lookup.networks(candidate.sell_exchange, asset)?;

        let routes = compatible_chains(asset, &withdraw, &deposit);
        if routes.is_empty() {
            debug!(
                "{} {}→{}: no compatible chain",
                candidate.pair, candidate.buy_exchange, candidate.sell_exchange
            );
            return None;
        }

        let units = self.config.notional / candidate.buy_price;
        let mut best = None;
        for route in routes {
            if units < route.withdraw.min_withdraw {
                continue;
            }
            let withdraw_fee = route.withdraw.withdraw_fee.max(0.0);
            let breakdown = net_profit(
                candidate.buy_price,
                candidate.sell_price,
                self.config.notional,
                self.fees.taker_rate(candidate.buy_exchange),
                self.fees.taker_rate(candidate.sell_exchange),
                withdraw_fee,
            );
            let better = match &best {
                Some((_, current, _)) => breakdown.net_profit_quote > *current,
                None => true,
            };
            if better {
                best = Some((route.chain().to_string(), breakdown.net_profit_quote, (breakdown, withdraw_fee)));
            }
        }

        let (chain, _, (breakdown, withdraw_fee)) = best?;
        if !self.meets_thresholds(breakdown.net_profit_quote, breakdown.net_profit_pct) {
            return None;
        }

        Some(Opportunity {
            pair: candidate.pair.clone(),
            buy_exchange: candidate.buy_exchange,
            buy_price: candidate.buy_price,
            sell_exchange: candidate.sell_exchange,
            sell_price: candidate.sell_price,
            chain,
            net_profit_abs: breakdown.net_profit_quote,
            net_profit_pct: breakdown.net_profit_pct,
            fee_description: self.fees.describe(
                candidate.buy_exchange,
                candidate.sell_exchange,
                withdraw_fee,
                asset,
            ),
        })
    }

    /// Evaluate `candidates` and sort by (net $ desc, net % desc). The sort
    /// is stable, so equal rows keep candidate order.
    pub fn rank(&self, candidates: &[Candidate], lookup: &dyn NetworkLookup) -> Vec<Opportunity> {
        let mut out: Vec<Opportunity> = candidates
            .iter()
            .filter_map(|c| self.evaluate(c, lookup))
            .collect();
        out.sort_by(|a, b| {
            b.net_profit_abs
                .total_cmp(&a.net_profit_abs)
                .then(b.net_profit_pct.total_cmp(&a.net_profit_pct))
        });
        out
    }

    /// Candidates and ranking in one pass, for callers that already hold
    /// every network map.
    pub fn find(&self, snapshots: &[QuoteSnapshot], lookup: &dyn NetworkLookup) -> Vec<Opportunity> {
        let candidates = self.candidates(snapshots);
        self.rank(&candidates, lookup)
    }
}
