use super::gateway::{ExecutionGateway, OrderAck, OrderRequest, OrderRouting};
use crate::error::{CycleError, ExecutionError};
use crate::models::{PositionType, PriceSeries};
use crate::persistence::{PositionBook, PositionStore, ResponseLog};
use crate::strategy::{Decision, Entry, OrderIntent, Strategy};
use std::collections::HashMap;
use std::sync::Arc;

/// What happened to one market during a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum MarketOutcome {
    NoSignal,
    Entered {
        position_type: PositionType,
        /// Set when the resting limit placed with the entry was rejected
        companion_error: Option<String>,
    },
    Exited(PositionType),
    Skipped(String),
    Failed(String),
}

/// Per-market results of one cycle, in processing order
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub partition: String,
    pub outcomes: Vec<(String, MarketOutcome)>,
    pub orders_placed: usize,
}

impl CycleReport {
    fn new(partition: &str) -> Self {
        Self {
            partition: partition.to_string(),
            outcomes: Vec::new(),
            orders_placed: 0,
        }
    }

    pub fn outcome(&self, market: &str) -> Option<&MarketOutcome> {
        self.outcomes
            .iter()
            .find(|(m, _)| m == market)
            .map(|(_, outcome)| outcome)
    }

    pub fn entered(&self) -> Vec<&str> {
        self.markets_where(|o| matches!(o, MarketOutcome::Entered { .. }))
    }

    pub fn exited(&self) -> Vec<&str> {
        self.markets_where(|o| matches!(o, MarketOutcome::Exited(_)))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.markets_where(|o| matches!(o, MarketOutcome::Skipped(_)))
    }

    pub fn no_signal(&self) -> Vec<&str> {
        self.markets_where(|o| matches!(o, MarketOutcome::NoSignal))
    }

    /// Markets whose intent was abandoned, with the reason
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(market, outcome)| match outcome {
                MarketOutcome::Failed(reason) => Some((market.as_str(), reason.as_str())),
                _ => None,
            })
            .collect()
    }

    fn markets_where(&self, pred: impl Fn(&MarketOutcome) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| pred(outcome))
            .map(|(market, _)| market.as_str())
            .collect()
    }
}

/// Runs decision cycles for one partition at a time.
///
/// The position book is loaded once, mutated in memory as orders are
/// acknowledged, and saved once at the end. Order failures stay with the
/// market that issued them; a failed save fails the whole cycle.
pub struct Executor {
    gateway: Arc<dyn ExecutionGateway>,
    store: Arc<dyn PositionStore>,
    responses: Arc<dyn ResponseLog>,
    routing: OrderRouting,
}

impl Executor {
    pub fn new(
        gateway: Arc<dyn ExecutionGateway>,
        store: Arc<dyn PositionStore>,
        responses: Arc<dyn ResponseLog>,
    ) -> Self {
        Self {
            gateway,
            store,
            responses,
            routing: OrderRouting::default(),
        }
    }

    pub fn with_routing(mut self, routing: OrderRouting) -> Self {
        self.routing = routing;
        self
    }

    pub async fn run_cycle(
        &self,
        partition: &str,
        strategy: &dyn Strategy,
        markets: &[String],
        prices: &HashMap<String, PriceSeries>,
    ) -> Result<CycleReport, CycleError> {
        let mut book = self.store.load(partition);
        let mut report = CycleReport::new(partition);

        tracing::info!(
            partition,
            strategy = strategy.name(),
            markets = markets.len(),
            open_positions = book.len(),
            "Starting cycle"
        );

        for market in markets {
            let outcome = match prices.get(market) {
                Some(series) => {
                    let decision = strategy.generate_decision(series, book.get(market));
                    self.apply(strategy.name(), market, decision, &mut book, &mut report)
                        .await
                }
                None => {
                    tracing::warn!(partition, market = %market, "No price data, skipping market");
                    MarketOutcome::Failed("no price data".to_string())
                }
            };
            report.outcomes.push((market.clone(), outcome));
        }

        if let Err(source) = self.store.save(partition, &book) {
            tracing::error!(partition, "Failed to save positions: {}", source);
            return Err(CycleError::Persistence {
                key: partition.to_string(),
                source,
            });
        }

        tracing::info!(
            partition,
            entered = report.entered().len(),
            exited = report.exited().len(),
            skipped = report.skipped().len(),
            failures = report.failures().len(),
            orders = report.orders_placed,
            open_positions = book.len(),
            "Cycle complete"
        );

        Ok(report)
    }

    async fn apply(
        &self,
        strategy: &str,
        market: &str,
        decision: Decision,
        book: &mut PositionBook,
        report: &mut CycleReport,
    ) -> MarketOutcome {
        match decision {
            Decision::Hold => MarketOutcome::NoSignal,
            Decision::Skip { reason } => {
                tracing::info!(market, "Skipping entry: {}", reason);
                MarketOutcome::Skipped(reason)
            }
            Decision::Enter(entry) => self.enter(strategy, market, entry, book, report).await,
            Decision::Exit { order } => self.exit(strategy, market, order, book, report).await,
        }
    }

    async fn enter(
        &self,
        strategy: &str,
        market: &str,
        entry: Entry,
        book: &mut PositionBook,
        report: &mut CycleReport,
    ) -> MarketOutcome {
        // Strategies only enter flat markets; guard against a stale decision
        if book.has_open_position(market) {
            return MarketOutcome::Skipped("position already open".to_string());
        }

        if let Err(e) = self.submit(strategy, market, &entry.primary).await {
            return MarketOutcome::Failed(e.to_string());
        }
        report.orders_placed += 1;
        book.open(market, entry.record);

        let companion_error = match entry.companion {
            Some(intent) => match self.submit(strategy, market, &intent).await {
                Ok(_) => {
                    report.orders_placed += 1;
                    None
                }
                Err(e) => {
                    tracing::warn!(market, "Companion order failed, position kept: {}", e);
                    Some(e.to_string())
                }
            },
            None => None,
        };

        MarketOutcome::Entered {
            position_type: entry.record.position_type,
            companion_error,
        }
    }

    async fn exit(
        &self,
        strategy: &str,
        market: &str,
        order: Option<OrderIntent>,
        book: &mut PositionBook,
        report: &mut CycleReport,
    ) -> MarketOutcome {
        let Some(record) = book.get(market).copied() else {
            return MarketOutcome::NoSignal;
        };

        if let Some(intent) = order {
            match self.submit(strategy, market, &intent).await {
                Ok(_) => report.orders_placed += 1,
                Err(e) if self.routing.is_flat_position(&e) => {
                    tracing::warn!(
                        market,
                        position = %record.position_type,
                        "Exchange has no position to close, clearing record: {}",
                        e
                    );
                }
                Err(e) => return MarketOutcome::Failed(e.to_string()),
            }
        }

        book.close(market);
        tracing::info!(market, position = %record.position_type, "Position closed");
        MarketOutcome::Exited(record.position_type)
    }

    /// Place one order and append its response to the strategy's log
    async fn submit(
        &self,
        strategy: &str,
        market: &str,
        intent: &OrderIntent,
    ) -> Result<OrderAck, ExecutionError> {
        let request = OrderRequest::from_intent(market, intent, &self.routing);

        let ack = match self.gateway.place_order(&request).await {
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!(
                    market,
                    side = %request.side,
                    size = request.size,
                    "Order placement failed: {}",
                    e
                );
                return Err(e);
            }
        };

        tracing::info!(
            market,
            order_id = %ack.order_id,
            side = %request.side,
            size = request.size,
            price = ?request.price,
            "Order placed"
        );

        if let Err(e) = self.responses.append(strategy, &ack.raw) {
            tracing::warn!(market, "Failed to log order response: {}", e);
        }

        Ok(ack)
    }
}
