//! Fee model: taker fees on both legs plus the withdrawal fee of the chain
//! the base asset travels over.

use std::collections::BTreeMap;

use common::ExchangeId;
use tracing::warn;

use crate::config::FeeConfig;

/// Every intermediate of one fee-adjusted trade, in quote currency unless
/// noted. No rounding is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeBreakdown {
    /// Base-asset units bought with the notional.
    pub units: f64,
    pub gross_sell_quote: f64,
    pub net_sell_quote: f64,
    pub net_buy_quote: f64,
    pub withdraw_cost_quote: f64,
    pub net_profit_quote: f64,
    /// Net profit as a percentage of notional.
    pub net_profit_pct: f64,
}

/// Net profit of buying `notional` worth at `buy_price`, moving it, and
/// selling at `sell_price`.
///
/// `withdraw_fee` is in base-asset units and is valued at the buy price.
pub fn net_profit(
    buy_price: f64,
    sell_price: f64,
    notional: f64,
    buy_taker: f64,
    sell_taker: f64,
    withdraw_fee: f64,
) -> FeeBreakdown {
    let units = notional / buy_price;
    let gross_sell_quote = units * sell_price;
    let net_sell_quote = gross_sell_quote * (1.0 - sell_taker);
    let net_buy_quote = notional * (1.0 + buy_taker);
    let withdraw_cost_quote = withdraw_fee * buy_price;
    let net_profit_quote = net_sell_quote - net_buy_quote - withdraw_cost_quote;

    FeeBreakdown {
        units,
        gross_sell_quote,
        net_sell_quote,
        net_buy_quote,
        withdraw_cost_quote,
        net_profit_quote,
        net_profit_pct: net_profit_quote / notional * 100.0,
    }
}

/// Static per-exchange taker rates with a fallback.
#[derive(Debug, Clone)]
pub struct FeeModel {
    taker: BTreeMap<ExchangeId, f64>,
    fallback_taker: f64,
}

impl FeeModel {
    pub fn new(config: &FeeConfig) -> Self {
        let mut taker = BTreeMap::new();
        for (name, rate) in &config.taker {
            match name.parse::<ExchangeId>() {
                Ok(id) => {
                    taker.insert(id, *rate);
                }
                Err(_) => warn!("Ignoring taker fee for unknown exchange '{}'", name),
            }
        }
        Self {
            taker,
            fallback_taker: config.fallback_taker,
        }
    }

    pub fn taker_rate(&self, exchange: ExchangeId) -> f64 {
        self.taker
            .get(&exchange)
            .copied()
            .unwrap_or(self.fallback_taker)
    }

    /// [`net_profit`] with both legs' taker rates looked up.
    pub fn evaluate(
        &self,
        buy_exchange: ExchangeId,
        buy_price: f64,
        sell_exchange: ExchangeId,
        sell_price: f64,
        notional: f64,
        withdraw_fee: f64,
    ) -> FeeBreakdown {
        net_profit(
            buy_price,
            sell_price,
            notional,
            self.taker_rate(buy_exchange),
            self.taker_rate(sell_exchange),
            withdraw_fee,
        )
    }

    /// Short summary, e.g. `taker 0.10%/0.20% + wd 0.0002 BTC`.
    pub fn describe(
        &self,
        buy_exchange: ExchangeId,
        sell_exchange: ExchangeId,
        withdraw_fee: f64,
        asset: &str,
    ) -> String {
        format!(
            "taker {:.2}%/{:.2}% + wd {} {}",
            self.taker_rate(buy_exchange) * 100.0,
            self.taker_rate(sell_exchange) * 100.0,
            withdraw_fee,
            asset
        )
    }
}

impl Default for FeeModel {
    fn default() -> Self {
        Self::new(&FeeConfig::default())
    }
}
