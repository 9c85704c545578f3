// Decision engine: one state machine per strategy variant
pub mod band_reversion;
pub mod ema_crossover;
pub mod momentum;

pub use band_reversion::{BandReversion, BandReversionConfig, BandSnapshot, LimitAnchor};
pub use ema_crossover::{CrossoverSnapshot, EmaCrossover, EmaCrossoverConfig};
pub use momentum::{SlopeMetric, SlopeMomentum, SlopeMomentumConfig, SlopeSnapshot};

use crate::models::{OrderType, PriceSeries, Side};
use crate::persistence::PositionRecord;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A proposed order, before it is sent to the gateway
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderIntent {
    pub side: Side,
    pub order_type: OrderType,
    pub size: f64,
    pub price: Option<f64>,
}

impl OrderIntent {
    pub fn market(side: Side, size: f64) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            size,
            price: None,
        }
    }

    pub fn limit(side: Side, size: f64, price: f64) -> Self {
        Self {
            side,
            order_type: OrderType::Limit,
            size,
            price: Some(price),
        }
    }
}

/// Opening a position: the primary order decides whether the position
/// exists; the companion (a resting limit) rides along with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub record: PositionRecord,
    pub primary: OrderIntent,
    pub companion: Option<OrderIntent>,
}

/// Outcome of evaluating one market in one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No signal, or not enough history to have one
    Hold,
    Enter(Entry),
    /// Close the position. `order` is None when a resting limit placed at
    /// entry is expected to close it.
    Exit { order: Option<OrderIntent> },
    /// A signal fired but a guard rejected it; retried next cycle
    Skip { reason: String },
}

impl Decision {
    pub fn intents(&self) -> Vec<OrderIntent> {
        match self {
            Decision::Enter(entry) => std::iter::once(entry.primary)
                .chain(entry.companion)
                .collect(),
            Decision::Exit { order } => order.iter().copied().collect(),
            Decision::Hold | Decision::Skip { .. } => Vec::new(),
        }
    }
}

/// Base trait for all strategy variants
pub trait Strategy: Send + Sync {
    /// Name used to partition the response log
    fn name(&self) -> &str;

    /// Observations needed before the latest indicator value is defined
    fn min_history(&self) -> usize;

    /// Decide what to do for one market given its closes (oldest first)
    /// and its open position, if any. Only called with enough history.
    fn evaluate(&self, market: &str, closes: &[f64], position: Option<&PositionRecord>)
        -> Decision;

    /// Evaluate a series, treating short history as "no signal"
    fn generate_decision(
        &self,
        series: &PriceSeries,
        position: Option<&PositionRecord>,
    ) -> Decision {
        if series.len() < self.min_history() || series.latest_price().is_none() {
            tracing::debug!(
                market = %series.market,
                have = series.len(),
                need = self.min_history(),
                "Insufficient history, no signal"
            );
            return Decision::Hold;
        }

        self.evaluate(&series.market, &series.closes, position)
    }
}

/// Strategy variant as configured for a partition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyVariant {
    BandReversion(BandReversionConfig),
    NormalizedMomentum(SlopeMomentumConfig),
    PercentageMomentum(SlopeMomentumConfig),
    EmaCrossover(EmaCrossoverConfig),
}

impl StrategyVariant {
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyVariant::BandReversion(config) => Box::new(BandReversion::new(config.clone())),
            StrategyVariant::NormalizedMomentum(config) => {
                Box::new(SlopeMomentum::new(SlopeMetric::Normalized, config.clone()))
            }
            StrategyVariant::PercentageMomentum(config) => {
                Box::new(SlopeMomentum::new(SlopeMetric::Percentage, config.clone()))
            }
            StrategyVariant::EmaCrossover(config) => Box::new(EmaCrossover::new(config.clone())),
        }
    }
}

/// Units of the asset bought by `notional` at `price`, rounded to 2 decimals.
///
/// None when the result is not a positive quantity.
pub fn position_size(notional: f64, price: f64) -> Option<f64> {
    let units = Decimal::from_f64(notional / price)?.round_dp(2);
    units.to_f64().filter(|size| *size > 0.0)
}
