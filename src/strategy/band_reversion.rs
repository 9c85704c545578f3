use super::{position_size, Decision, Entry, OrderIntent, Strategy};
use crate::indicators::{bollinger, latest};
use crate::models::{PositionType, Side, StrategyPreference};
use crate::persistence::PositionRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bollinger Band reversion strategy
///
/// Trades against price extremes and expects a return to the middle band.
///
/// Entry (from flat):
/// - Price at or below the lower band: market `close_short` (the long leg)
///   plus a resting `open_short` limit above the market
/// - Price at or above the upper band: market `open_short` plus a resting
///   `close_short` limit below the market
///
/// Exit (record removed, the resting limit does the closing):
/// - `open_short` once price is back at or below the middle band
/// - `close_short` once price is back at or above the middle band
#[derive(Debug, Clone)]
pub struct BandReversion {
    config: BandReversionConfig,
}

/// Where the resting limit is placed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LimitAnchor {
    /// On the middle band
    Middle,
    /// Halfway between the middle band and the opposite band
    #[default]
    Midpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandReversionConfig {
    /// Quote-currency amount per entry
    pub notional: f64,

    /// Rolling window for the bands
    pub window: usize,

    /// Band width in standard deviations
    pub num_std: f64,

    pub limit_anchor: LimitAnchor,

    /// Minimum |limit - price| / price for an entry to go ahead (e.g. 0.03).
    /// None disables the guard.
    pub min_limit_gap: Option<f64>,

    /// Per-market entry direction; markets not listed trade both ways
    pub preferences: HashMap<String, StrategyPreference>,
}

impl Default for BandReversionConfig {
    fn default() -> Self {
        let preferences = [
            ("ETHUSDT", StrategyPreference::Long),
            ("SOLUSDT", StrategyPreference::Both),
            ("INJUSDT", StrategyPreference::Short),
            ("NEARUSDT", StrategyPreference::Short),
            ("AAVEUSDT", StrategyPreference::Both),
            ("LTCUSDT", StrategyPreference::Short),
        ]
        .into_iter()
        .map(|(market, pref)| (market.to_string(), pref))
        .collect();

        Self {
            notional: 200.0,
            window: 200,
            num_std: 2.0,
            limit_anchor: LimitAnchor::Midpoint,
            min_limit_gap: Some(0.03),
            preferences,
        }
    }
}

/// Latest band values for one market
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSnapshot {
    pub price: f64,
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BandReversion {
    pub fn new(config: BandReversionConfig) -> Self {
        Self { config }
    }

    /// Configured direction for `market`. Keys match case-insensitively since
    /// layered config sources may lowercase map keys.
    pub fn preference(&self, market: &str) -> StrategyPreference {
        self.config
            .preferences
            .get(market)
            .or_else(|| {
                self.config
                    .preferences
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(market))
                    .map(|(_, pref)| pref)
            })
            .copied()
            .unwrap_or_default()
    }

    pub fn snapshot(&self, closes: &[f64]) -> Option<BandSnapshot> {
        let bands = bollinger(closes, self.config.window, self.config.num_std);

        Some(BandSnapshot {
            price: latest(closes)?,
            upper: latest(&bands.upper)?,
            middle: latest(&bands.middle)?,
            lower: latest(&bands.lower)?,
        })
    }

    pub fn decide(
        &self,
        market: &str,
        snap: &BandSnapshot,
        position: Option<&PositionRecord>,
    ) -> Decision {
        let Some(position) = position else {
            return self.decide_entry(market, snap);
        };

        let exit = match position.position_type {
            PositionType::OpenShort => snap.price <= snap.middle,
            PositionType::CloseShort => snap.price >= snap.middle || snap.price >= snap.upper,
            other => {
                tracing::warn!(
                    market,
                    position = %other,
                    "Unexpected position type for band reversion"
                );
                return Decision::Hold;
            }
        };

        if exit {
            tracing::info!(
                market,
                position = %position.position_type,
                price = snap.price,
                middle = snap.middle,
                "Price back at the middle band, releasing position"
            );
            Decision::Exit { order: None }
        } else {
            Decision::Hold
        }
    }

    fn decide_entry(&self, market: &str, snap: &BandSnapshot) -> Decision {
        let preference = self.preference(market);

        if preference.allows_long() && snap.price <= snap.lower {
            let limit = match self.config.limit_anchor {
                LimitAnchor::Middle => snap.middle,
                LimitAnchor::Midpoint => (snap.middle + snap.upper) / 2.0,
            };
            return self.paired_entry(market, snap.price, limit, Side::CloseShort, Side::OpenShort);
        }

        if preference.allows_short() && snap.price >= snap.upper {
            let limit = match self.config.limit_anchor {
                LimitAnchor::Middle => snap.middle,
                LimitAnchor::Midpoint => (snap.lower + snap.middle) / 2.0,
            };
            return self.paired_entry(market, snap.price, limit, Side::OpenShort, Side::CloseShort);
        }

        Decision::Hold
    }

    /// Market order now, resting limit on the other side
    fn paired_entry(
        &self,
        market: &str,
        price: f64,
        limit: f64,
        market_side: Side,
        limit_side: Side,
    ) -> Decision {
        if let Some(min_gap) = self.config.min_limit_gap {
            let gap = (limit - price).abs() / price;
            if gap < min_gap {
                tracing::info!(
                    market,
                    price,
                    limit,
                    "Limit gap {:.2}% below minimum {:.2}%, skipping entry",
                    gap * 100.0,
                    min_gap * 100.0
                );
                return Decision::Skip {
                    reason: format!(
                        "limit gap {:.2}% below minimum {:.2}%",
                        gap * 100.0,
                        min_gap * 100.0
                    ),
                };
            }
        }

        let Some(size) = position_size(self.config.notional, price) else {
            return Decision::Skip {
                reason: format!("notional {} buys no units at {}", self.config.notional, price),
            };
        };

        let position_type = match market_side {
            Side::CloseShort => PositionType::CloseShort,
            _ => PositionType::OpenShort,
        };

        Decision::Enter(Entry {
            record: PositionRecord {
                position_type,
                base_position_size: size,
            },
            primary: OrderIntent::market(market_side, size),
            companion: Some(OrderIntent::limit(limit_side, size, limit)),
        })
    }
}

impl Default for BandReversion {
    fn default() -> Self {
        Self::new(BandReversionConfig::default())
    }
}

impl Strategy for BandReversion {
    fn name(&self) -> &str {
        "band_reversion"
    }

    fn min_history(&self) -> usize {
        self.config.window.max(2)
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
                    price = snap.price,
                    upper = snap.upper,
                    middle = snap.middle,
                    lower = snap.lower,
                    "Band snapshot"
                );
                self.decide(market, &snap, position)
            }
            None => Decision::Hold,
        }
    }
}
