use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cyclebot::api::{BitgetClient, Credentials};
use cyclebot::config::{load_config, AppConfig, PartitionConfig};
use cyclebot::execution::{
    CycleReport, ExecutionGateway, Executor, MarketOutcome, PaperGateway, PriceFeed,
};
use cyclebot::persistence::{
    JsonFileStore, JsonResponseLog, MemoryResponseLog, MemoryStore, PositionStore, ResponseLog,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "cyclebot",
    about = "Runs one signal and position cycle per invocation against Bitget USDT futures"
)]
struct Cli {
    /// Configuration file; missing is fine, defaults apply
    #[arg(long, global = true, default_value = "cyclebot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch prices and run one decision cycle for a partition.
    Run {
        /// Partition name, e.g. band or ema-momentum-high
        partition: String,

        /// Acknowledge orders locally instead of sending them; stored
        /// positions are read but not modified
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Show open positions recorded for a partition.
    Positions { partition: String },
    /// List configured partitions.
    Partitions,
    /// Print all logged order responses as JSON and clear the logs.
    DrainResponses,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run { partition, dry_run } => {
            let partition = find_partition(&config, &partition)?;
            run_partition(&config, partition, dry_run).await
        }
        Commands::Positions { partition } => {
            let partition = find_partition(&config, &partition)?;
            show_positions(&config, partition);
            Ok(())
        }
        Commands::Partitions => {
            for p in &config.partitions {
                println!(
                    "{:<28} {:>4}  {}",
                    p.name,
                    p.granularity.as_str(),
                    p.markets.join(",")
                );
            }
            Ok(())
        }
        Commands::DrainResponses => {
            let log = JsonResponseLog::new(&config.data_dir);
            let entries = log.drain().context("Failed to drain order responses")?;
            tracing::info!(count = entries.len(), "Drained order responses");
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cyclebot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn find_partition<'a>(config: &'a AppConfig, name: &str) -> Result<&'a PartitionConfig> {
    config.partition(name).with_context(|| {
        format!(
            "Unknown partition {} (configured: {})",
            name,
            config.partition_names().join(", ")
        )
    })
}

async fn run_partition(
    config: &AppConfig,
    partition: &PartitionConfig,
    dry_run: bool,
) -> Result<()> {
    let strategy = partition.strategy.build();
    tracing::info!(
        partition = %partition.name,
        strategy = strategy.name(),
        granularity = %partition.granularity,
        dry_run,
        "Running cycle"
    );

    let credentials = Credentials::from_env();
    if credentials.is_none() && !dry_run {
        anyhow::bail!(
            "BITGET_API_KEY, BITGET_SECRET_KEY and BITGET_PASSPHRASE must be set for live runs"
        );
    }

    let bitget = Arc::new(
        BitgetClient::new(credentials)?
            .with_base_url(&config.bitget.base_url)
            .with_product_type(&config.bitget.product_type),
    );

    let feed = PriceFeed::new(
        bitget.clone(),
        config.market_data.pages,
        Duration::from_millis(config.market_data.min_interval_ms),
    );
    let prices = feed
        .fetch_all(&partition.markets, partition.granularity)
        .await;

    let disk_store = JsonFileStore::new(&config.data_dir);
    let gateway: Arc<dyn ExecutionGateway>;
    let store: Arc<dyn PositionStore>;
    let responses: Arc<dyn ResponseLog>;
    if dry_run {
        // Start from the real book so decisions match a live run
        let memory = MemoryStore::new();
        memory.save(&partition.name, &disk_store.load(&partition.name))?;
        gateway = Arc::new(PaperGateway::new());
        store = Arc::new(memory);
        responses = Arc::new(MemoryResponseLog::new());
    } else {
        gateway = bitget;
        store = Arc::new(disk_store);
        responses = Arc::new(JsonResponseLog::new(&config.data_dir));
    }

    let executor = Executor::new(gateway, store, responses).with_routing(config.routing.clone());
    let report = executor
        .run_cycle(&partition.name, strategy.as_ref(), &partition.markets, &prices)
        .await?;

    print_report(&report);

    if !report.failures().is_empty() {
        tracing::warn!(
            partition = %partition.name,
            failures = report.failures().len(),
            "Cycle finished with failed markets"
        );
    }
    Ok(())
}

fn show_positions(config: &AppConfig, partition: &PartitionConfig) {
    let store = JsonFileStore::new(&config.data_dir);
    let book = store.load(&partition.name);

    if book.is_empty() {
        println!("No open positions for {}", partition.name);
        return;
    }

    for (market, record) in book.iter() {
        println!(
            "{:<12} {:<12} {}",
            market, record.position_type, record.base_position_size
        );
    }
}

fn print_report(report: &CycleReport) {
    println!("Cycle report for {}", report.partition);
    for (market, outcome) in &report.outcomes {
        let line = match outcome {
            MarketOutcome::NoSignal => "no signal".to_string(),
            MarketOutcome::Entered {
                position_type,
                companion_error: None,
            } => format!("entered {}", position_type),
            MarketOutcome::Entered {
                position_type,
                companion_error: Some(err),
            } => format!("entered {} (limit order failed: {})", position_type, err),
            MarketOutcome::Exited(position_type) => format!("exited {}", position_type),
            MarketOutcome::Skipped(reason) => format!("skipped: {}", reason),
            MarketOutcome::Failed(reason) => format!("FAILED: {}", reason),
        };
        println!("  {:<12} {}", market, line);
    }
    println!("  orders placed: {}", report.orders_placed);
}
