use crate::api::bitget::BITGET_API_BASE;
use crate::execution::OrderRouting;
use crate::models::Granularity;
use crate::persistence::file_key;
use crate::strategy::{
    BandReversionConfig, EmaCrossoverConfig, SlopeMomentumConfig, StrategyVariant,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `CYCLEBOT__DATA_DIR=/var/lib/cyclebot`
pub const ENV_PREFIX: &str = "CYCLEBOT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Position files and order response logs live here
    pub data_dir: PathBuf,
    pub bitget: BitgetSettings,
    pub routing: OrderRouting,
    pub market_data: MarketDataSettings,
    pub partitions: Vec<PartitionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BitgetSettings {
    pub base_url: String,
    pub product_type: String,
}

impl Default for BitgetSettings {
    fn default() -> Self {
        Self {
            base_url: BITGET_API_BASE.to_string(),
            product_type: "USDT-FUTURES".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataSettings {
    /// 200-candle pages fetched per market
    pub pages: usize,
    /// Minimum spacing between candle requests
    pub min_interval_ms: u64,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            pages: 2,
            min_interval_ms: 200,
        }
    }
}

/// One strategy + cadence, owning one position file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub name: String,
    pub granularity: Granularity,
    pub markets: Vec<String>,
    pub strategy: StrategyVariant,
}

const DEFAULT_MARKETS: [&str; 6] = [
    "ETHUSDT", "SOLUSDT", "INJUSDT", "NEARUSDT", "AAVEUSDT", "LTCUSDT",
];

impl Default for AppConfig {
    fn default() -> Self {
        let markets: Vec<String> = DEFAULT_MARKETS.iter().map(|m| m.to_string()).collect();
        let partition = |name: &str, granularity, strategy| PartitionConfig {
            name: name.to_string(),
            granularity,
            markets: markets.clone(),
            strategy,
        };

        let partitions = vec![
            partition(
                "band",
                Granularity::FifteenMinutes,
                StrategyVariant::BandReversion(BandReversionConfig::default()),
            ),
            partition(
                "normalized-momentum-15m",
                Granularity::FifteenMinutes,
                StrategyVariant::NormalizedMomentum(SlopeMomentumConfig::default()),
            ),
            partition(
                "percentage-momentum-15m",
                Granularity::FifteenMinutes,
                StrategyVariant::PercentageMomentum(SlopeMomentumConfig {
                    entry_threshold: 0.1,
                    exit_threshold: 0.02,
                    ..Default::default()
                }),
            ),
            partition(
                "ema-momentum-high",
                Granularity::FifteenMinutes,
                StrategyVariant::EmaCrossover(EmaCrossoverConfig {
                    limit_pct: 0.05,
                    ..Default::default()
                }),
            ),
            partition(
                "ema-momentum-medium",
                Granularity::OneHour,
                StrategyVariant::EmaCrossover(EmaCrossoverConfig {
                    limit_pct: 0.03,
                    ..Default::default()
                }),
            ),
        ];

        Self {
            data_dir: PathBuf::from("./state"),
            bitget: BitgetSettings::default(),
            routing: OrderRouting::default(),
            market_data: MarketDataSettings::default(),
            partitions,
        }
    }
}

impl AppConfig {
    pub fn partition(&self, name: &str) -> Option<&PartitionConfig> {
        self.partitions.iter().find(|p| p.name == name)
    }

    pub fn partition_names(&self) -> Vec<&str> {
        self.partitions.iter().map(|p| p.name.as_str()).collect()
    }

    /// Partition names must map to distinct position files
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for partition in &self.partitions {
            if let Some(other) = seen.insert(file_key(&partition.name), &partition.name) {
                if other == partition.name {
                    anyhow::bail!("Duplicate partition name: {}", partition.name);
                }
                anyhow::bail!(
                    "Partitions {} and {} would share a position file",
                    other,
                    partition.name
                );
            }
            if partition.markets.is_empty() {
                anyhow::bail!("Partition {} has no markets", partition.name);
            }
        }
        if self.market_data.pages == 0 {
            anyhow::bail!("market_data.pages must be at least 1");
        }
        if self.market_data.min_interval_ms == 0 {
            anyhow::bail!("market_data.min_interval_ms must be at least 1");
        }
        Ok(())
    }
}

/// Load configuration: built-in defaults, then `path` if it exists, then
/// `CYCLEBOT__*` environment variables.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    let app: AppConfig = settings
        .try_deserialize()
        .context("Failed to parse configuration")?;
    app.validate()?;

    tracing::debug!(
        data_dir = %app.data_dir.display(),
        partitions = app.partitions.len(),
        "Configuration loaded"
    );
    Ok(app)
}
