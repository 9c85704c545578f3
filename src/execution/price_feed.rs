use crate::error::MarketDataError;
use crate::models::{Candle, Granularity, PriceSeries};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Candles per request, the exchange's page size
pub const CANDLES_PER_PAGE: usize = 200;

type FeedRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Source of historical candles
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Up to `limit` candles of `granularity` ending at `end_time`
    async fn history_candles(
        &self,
        market: &str,
        granularity: Granularity,
        end_time: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError>;
}

/// Compiles paged candle history into price series, one request at a time
/// and no faster than the configured interval.
pub struct PriceFeed {
    source: Arc<dyn MarketDataSource>,
    pages: usize,
    /// None when no spacing is required
    rate_limiter: Option<FeedRateLimiter>,
}

impl PriceFeed {
    /// # Arguments
    /// * `pages` - Number of 200-candle pages to fetch per market
    /// * `min_interval` - Minimum spacing between requests; zero disables it
    pub fn new(source: Arc<dyn MarketDataSource>, pages: usize, min_interval: Duration) -> Self {
        Self {
            source,
            pages: pages.max(1),
            rate_limiter: Quota::with_period(min_interval).map(RateLimiter::direct),
        }
    }

    /// End times of each page, newest first, aligned to the granularity
    pub fn page_end_times(
        &self,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let latest = granularity.floor(now);
        let page_span =
            chrono::Duration::seconds(granularity.seconds() * CANDLES_PER_PAGE as i64);

        (0..self.pages)
            .map(|i| latest - page_span * i as i32)
            .collect()
    }

    /// Full series for one market, oldest first
    pub async fn fetch_series(
        &self,
        market: &str,
        granularity: Granularity,
    ) -> Result<PriceSeries, MarketDataError> {
        let mut candles = Vec::with_capacity(self.pages * CANDLES_PER_PAGE);

        for end_time in self.page_end_times(granularity, Utc::now()) {
            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }
            let page = self
                .source
                .history_candles(market, granularity, end_time, CANDLES_PER_PAGE)
                .await?;
            candles.extend(page);
        }

        let series = PriceSeries::from_candles(market, candles);
        let gaps = series.gap_count(granularity.seconds());
        if gaps > 0 {
            tracing::warn!(market, gaps, "Price series has gaps");
        }

        tracing::debug!(market, candles = series.len(), "Fetched price series");
        Ok(series)
    }

    /// Series for every market that could be fetched. Failures are logged and
    /// the market is left out.
    pub async fn fetch_all(
        &self,
        markets: &[String],
        granularity: Granularity,
    ) -> HashMap<String, PriceSeries> {
        let mut out = HashMap::new();

        for market in markets {
            match self.fetch_series(market, granularity).await {
                Ok(series) => {
                    out.insert(market.clone(), series);
                }
                Err(e) => {
                    tracing::warn!(market = %market, "Failed to fetch market data: {}", e);
                }
            }
        }

        tracing::info!(
            fetched = out.len(),
            requested = markets.len(),
            granularity = %granularity,
            "Market data fetched"
        );
        out
    }
}
