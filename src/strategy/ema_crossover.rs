use super::{position_size, Decision, Entry, OrderIntent, Strategy};
use crate::indicators::{ema, ema_slope, latest, rolling_mean};
use crate::models::{PositionType, Side};
use crate::persistence::PositionRecord;
use serde::{Deserialize, Serialize};

/// EMA/SMA crossover momentum strategy
///
/// Trend direction comes from the EMA's position relative to the SMA, trend
/// strength from the EMA's own percentage slope. Entries place a take-profit
/// limit `limit_pct` away from the entry price; exits are pure crossovers.
#[derive(Debug, Clone)]
pub struct EmaCrossover {
    config: EmaCrossoverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmaCrossoverConfig {
    /// Quote-currency amount per entry
    pub notional: f64,

    pub ema_span: usize,
    pub sma_window: usize,

    /// Minimum |EMA slope| in percent to enter
    pub entry_threshold: f64,

    /// Take-profit distance for this cadence (0.05 = 5%)
    pub limit_pct: f64,
}

impl Default for EmaCrossoverConfig {
    fn default() -> Self {
        Self {
            notional: 100.0,
            ema_span: 20,
            sma_window: 50,
            entry_threshold: 0.05,
            limit_pct: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossoverSnapshot {
    pub price: f64,
    pub ema: f64,
    pub sma: f64,
    /// Percent change of the EMA over the last step
    pub ema_slope: f64,
}

impl EmaCrossover {
    pub fn new(config: EmaCrossoverConfig) -> Self {
        Self { config }
    }

    pub fn snapshot(&self, closes: &[f64]) -> Option<CrossoverSnapshot> {
        Some(CrossoverSnapshot {
            price: latest(closes)?,
            ema: latest(&ema(closes, self.config.ema_span))?,
            sma: latest(&rolling_mean(closes, self.config.sma_window))?,
            ema_slope: latest(&ema_slope(closes, self.config.ema_span))?,
        })
    }

    pub fn decide(
        &self,
        market: &str,
        snap: &CrossoverSnapshot,
        position: Option<&PositionRecord>,
    ) -> Decision {
        if let Some(position) = position {
            let close_side = match position.position_type {
                PositionType::Long if snap.ema <= snap.sma => Side::CloseLong,
                PositionType::Short if snap.ema >= snap.sma => Side::CloseShort,
                PositionType::Long | PositionType::Short => return Decision::Hold,
                other => {
                    tracing::warn!(
                        market,
                        position = %other,
                        "Unexpected position type for EMA crossover"
                    );
                    return Decision::Hold;
                }
            };

            tracing::info!(
                market,
                ema = snap.ema,
                sma = snap.sma,
                "EMA crossed SMA, closing {} position",
                position.position_type
            );
            return Decision::Exit {
                order: Some(OrderIntent::market(close_side, position.base_position_size)),
            };
        }

        let threshold = self.config.entry_threshold;
        let (open_side, close_side, position_type, take_profit) =
            if snap.ema > snap.sma && snap.ema_slope >= threshold {
                (
                    Side::OpenLong,
                    Side::CloseLong,
                    PositionType::Long,
                    snap.price * (1.0 + self.config.limit_pct),
                )
            } else if snap.ema < snap.sma && snap.ema_slope <= -threshold {
                (
                    Side::OpenShort,
                    Side::CloseShort,
                    PositionType::Short,
                    snap.price * (1.0 - self.config.limit_pct),
                )
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
            ema = snap.ema,
            sma = snap.sma,
            slope = snap.ema_slope,
            take_profit,
            "Opening {} crossover trade",
            position_type
        );

        Decision::Enter(Entry {
            record: PositionRecord {
                position_type,
                base_position_size: size,
            },
            primary: OrderIntent::market(open_side, size),
            companion: Some(OrderIntent::limit(close_side, size, take_profit)),
        })
    }
}

impl Default for EmaCrossover {
    fn default() -> Self {
        Self::new(EmaCrossoverConfig::default())
    }
}

impl Strategy for EmaCrossover {
    fn name(&self) -> &str {
        "ema_crossover_momentum"
    }

    fn min_history(&self) -> usize {
        self.config.sma_window.max(2)
    }

    fn evaluate(
        &self,
        market: &str,
        closes: &[f64],
        position: Option<&PositionRecord>,
    ) -> Decision {
        match self.snapshot(closes) {
            Some(snap) => {
                tracing::debug!(
                    market,
                    ema = snap.ema,
                    sma = snap.sma,
                    slope = snap.ema_slope,
                    "Crossover snapshot"
                );
                self.decide(market, &snap, position)
            }
            None => Decision::Hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn high_cadence() -> EmaCrossover {
        EmaCrossover::new(EmaCrossoverConfig {
            entry_threshold: 1.0,
            limit_pct: 0.05,
            ..Default::default()
        })
    }

    fn snap(ema: f64, sma: f64, ema_slope: f64) -> CrossoverSnapshot {
        CrossoverSnapshot {
            price: 100.0,
            ema,
            sma,
            ema_slope,
        }
    }

    #[test]
    fn test_long_entry_with_take_profit() {
        let decision = high_cadence().decide("SOLUSDT", &snap(105.0, 100.0, 2.0), None);

        let Decision::Enter(entry) = decision else {
            panic!("expected entry, got {:?}", decision);
        };
        assert_eq!(entry.record.position_type, PositionType::Long);
        assert_eq!(entry.primary, OrderIntent::market(Side::OpenLong, 1.0));

        let take_profit = entry.companion.unwrap();
        assert_eq!(take_profit.side, Side::CloseLong);
        assert!((take_profit.price.unwrap() - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_entry_with_take_profit() {
        let strategy = EmaCrossover::new(EmaCrossoverConfig {
            entry_threshold: 1.0,
            limit_pct: 0.03,
            ..Default::default()
        });
        let decision = strategy.decide("SOLUSDT", &snap(95.0, 100.0, -1.5), None);

        let Decision::Enter(entry) = decision else {
            panic!("expected entry");
        };
        assert_eq!(entry.primary.side, Side::OpenShort);
        let take_profit = entry.companion.unwrap();
        assert_eq!(take_profit.side, Side::CloseShort);
        assert!((take_profit.price.unwrap() - 97.0).abs() < 1e-9);
    }

    #[test]
    fn test_weak_slope_holds() {
        let decision = high_cadence().decide("SOLUSDT", &snap(105.0, 100.0, 0.5), None);
        assert_eq!(decision, Decision::Hold);
    }

    #[test]
    fn test_slope_against_direction_holds() {
        // EMA above SMA but falling fast: neither branch matches
        let decision = high_cadence().decide("SOLUSDT", &snap(105.0, 100.0, -2.0), None);
        assert_eq!(decision, Decision::Hold);
    }

    #[test]
    fn test_exit_is_pure_crossover() {
        let strategy = high_cadence();
        let long = PositionRecord {
            position_type: PositionType::Long,
            base_position_size: 1.5,
        };

        // Slope collapsed but EMA still above SMA
        let hold = strategy.decide("SOLUSDT", &snap(101.0, 100.0, -5.0), Some(&long));
        assert_eq!(hold, Decision::Hold);

        let exit = strategy.decide("SOLUSDT", &snap(100.0, 100.0, 3.0), Some(&long));
        assert_eq!(
            exit,
            Decision::Exit {
                order: Some(OrderIntent::market(Side::CloseLong, 1.5))
            }
        );

        let short = PositionRecord {
            position_type: PositionType::Short,
            base_position_size: 1.5,
        };
        let exit = strategy.decide("SOLUSDT", &snap(100.5, 100.0, 0.0), Some(&short));
        assert_eq!(
            exit,
            Decision::Exit {
                order: Some(OrderIntent::market(Side::CloseShort, 1.5))
            }
        );
    }

    #[test]
    fn test_evaluate_uptrend() {
        let strategy = EmaCrossover::new(EmaCrossoverConfig {
            ema_span: 5,
            sma_window: 10,
            entry_threshold: 0.5,
            ..Default::default()
        });

        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 1.02_f64.powi(i)).collect();
        let snap = strategy.snapshot(&closes).unwrap();
        assert!(snap.ema > snap.sma);
        assert!(snap.ema_slope > 0.5);

        let decision = strategy.evaluate("SOLUSDT", &closes, None);
        assert!(matches!(decision, Decision::Enter(_)));
    }
}
