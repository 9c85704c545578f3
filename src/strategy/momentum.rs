use super::{position_size, Decision, Entry, OrderIntent, Strategy};
use crate::indicators::{latest, normalized_slope, percentage_slope};
use crate::models::{PositionType, Side};
use crate::persistence::PositionRecord;
use serde::{Deserialize, Serialize};

/// Which moving-average slope drives the strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeMetric {
    /// MA slope min-max scaled into [-1, 1]
    Normalized,
    /// One-step percent change of the MA
    Percentage,
}

/// Slope momentum strategy
///
/// Follows the trend of a moving average:
/// - enter long when slope >= entry threshold, short when slope <= -entry
/// - exit long when slope <= exit threshold, short when slope >= -exit
///
/// Entry and exit thresholds are independent so the gap between them acts
/// as a hysteresis band against flip-flopping.
#[derive(Debug, Clone)]
pub struct SlopeMomentum {
    metric: SlopeMetric,
    config: SlopeMomentumConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeMomentumConfig {
    /// Quote-currency amount per entry
    pub notional: f64,

    /// Moving average window
    pub window: usize,

    pub entry_threshold: f64,
    pub exit_threshold: f64,
}

impl Default for SlopeMomentumConfig {
    fn default() -> Self {
        Self {
            notional: 100.0,
            window: 20,
            entry_threshold: 0.8,
            exit_threshold: 0.2,
        }
    }
}

/// Latest slope reading for one market
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeSnapshot {
    pub price: f64,
    pub slope: f64,
}

impl SlopeMomentum {
    pub fn new(metric: SlopeMetric, config: SlopeMomentumConfig) -> Self {
        Self { metric, config }
    }

    pub fn snapshot(&self, closes: &[f64]) -> Option<SlopeSnapshot> {
        let slope = match self.metric {
            SlopeMetric::Normalized => normalized_slope(closes, self.config.window),
            SlopeMetric::Percentage => percentage_slope(closes, self.config.window),
        };

        Some(SlopeSnapshot {
            price: latest(closes)?,
            slope: latest(&slope)?,
        })
    }

    pub fn decide(
        &self,
        market: &str,
        snap: &SlopeSnapshot,
        position: Option<&PositionRecord>,
    ) -> Decision {
        let entry = self.config.entry_threshold;
        let exit = self.config.exit_threshold;

        let Some(position) = position else {
            let (side, position_type) = if snap.slope >= entry {
                (Side::OpenLong, PositionType::Long)
            } else if snap.slope <= -entry {
                (Side::OpenShort, PositionType::Short)
            } else {
                return Decision::Hold;
            };

            let Some(size) = position_size(self.config.notional, snap.price) else {
                return Decision::Skip {
                    reason: format!(
                        "notional {} buys no units at {}",
                        self.config.notional, snap.price
                    ),
                };
            };

            tracing::info!(
                market,
                slope = snap.slope,
                "Opening {} momentum trade using {} slope",
                position_type,
                self.slope_label()
            );

            return Decision::Enter(Entry {
                record: PositionRecord {
                    position_type,
                    base_position_size: size,
                },
                primary: OrderIntent::market(side, size),
                companion: None,
            });
        };

        let close_side = match position.position_type {
            PositionType::Long if snap.slope <= exit => Side::CloseLong,
            PositionType::Short if snap.slope >= -exit => Side::CloseShort,
            PositionType::Long | PositionType::Short => return Decision::Hold,
            other => {
                tracing::warn!(market, position = %other, "Unexpected position type for momentum");
                return Decision::Hold;
            }
        };

        tracing::info!(
            market,
            slope = snap.slope,
            "Closing {} momentum trade using {} slope",
            position.position_type,
            self.slope_label()
        );

        Decision::Exit {
            order: Some(OrderIntent::market(close_side, position.base_position_size)),
        }
    }

    fn slope_label(&self) -> &'static str {
        match self.metric {
            SlopeMetric::Normalized => "normalized",
            SlopeMetric::Percentage => "percentage",
        }
    }
}

impl Strategy for SlopeMomentum {
    fn name(&self) -> &str {
        match self.metric {
            SlopeMetric::Normalized => "normalized_slope_momentum",
            SlopeMetric::Percentage => "percentage_slope_momentum",
        }
    }

    fn min_history(&self) -> usize {
        let window = self.config.window.max(1);
        match self.metric {
            // MA[t - window] must itself be defined
            SlopeMetric::Normalized => 2 * window,
            SlopeMetric::Percentage => window + 1,
        }
    }

    fn evaluate(
        &self,
        market: &str,
        closes: &[f64],
        position: Option<&PositionRecord>,
    ) -> Decision {
        match self.snapshot(closes) {
            Some(snap) => {
                tracing::debug!(market, slope = snap.slope, "{} slope", self.slope_label());
                self.decide(market, &snap, position)
            }
            None => Decision::Hold,
        }
    }
}
