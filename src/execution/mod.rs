// Order execution and data collection module
pub mod executor;
pub mod gateway;
pub mod price_feed;

pub use executor::{CycleReport, Executor, MarketOutcome};
pub use gateway::{ExecutionGateway, OrderAck, OrderRequest, OrderRouting, PaperGateway};
pub use price_feed::{MarketDataSource, PriceFeed};
