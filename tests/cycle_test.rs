use chrono::Utc;
use cyclebot::api::{BitgetClient, Credentials};
use cyclebot::execution::{Executor, MarketOutcome, PaperGateway, PriceFeed};
use cyclebot::persistence::{
    JsonFileStore, JsonResponseLog, MemoryResponseLog, MemoryStore, PositionStore,
};
use cyclebot::strategy::{
    EmaCrossover, EmaCrossoverConfig, SlopeMetric, SlopeMomentum, SlopeMomentumConfig,
};
use cyclebot::{Granularity, PositionType, PriceSeries, Side};
use mockito::Matcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Bitget candle rows for a steady 2% uptrend ending at the current interval
fn uptrend_candles(count: i64) -> serde_json::Value {
    let latest = Granularity::FifteenMinutes.floor(Utc::now());
    let rows: Vec<Vec<String>> = (0..count)
        .map(|i| {
            let ts = latest - chrono::Duration::minutes(15 * (count - 1 - i));
            let close = 100.0 * 1.02_f64.powi(i as i32);
            vec![
                ts.timestamp_millis().to_string(),
                close.to_string(),
                close.to_string(),
                close.to_string(),
                close.to_string(),
                "1000".to_string(),
                "100000".to_string(),
            ]
        })
        .collect();

    serde_json::json!({"code": "00000", "msg": "success", "data": rows})
}

#[tokio::test]
async fn test_ema_partition_against_exchange_api() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut server = mockito::Server::new_async().await;
    let candles = server
        .mock("GET", "/api/v2/mix/market/history-candles")
        .match_query(Matcher::UrlEncoded("symbol".into(), "SOLUSDT".into()))
        .with_status(200)
        .with_body(uptrend_candles(30).to_string())
        .expect(2)
        .create_async()
        .await;
    let orders = server
        .mock("POST", "/api/mix/v1/order/placeOrder")
        .with_status(200)
        .with_body(r#"{"code":"00000","msg":"success","data":{"orderId":"42","clientOid":"c"}}"#)
        .expect(2)
        .create_async()
        .await;

    let client = Arc::new(
        BitgetClient::new(Some(Credentials::new("key", "secret", "phrase")))
            .unwrap()
            .with_base_url(server.url()),
    );
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let responses = Arc::new(JsonResponseLog::new(dir.path()));
    let executor = Executor::new(client.clone(), store.clone(), responses.clone());
    let feed = PriceFeed::new(client, 1, Duration::from_millis(1));

    let strategy = EmaCrossover::new(EmaCrossoverConfig {
        ema_span: 5,
        sma_window: 10,
        entry_threshold: 0.5,
        limit_pct: 0.05,
        ..Default::default()
    });
    let markets = vec!["SOLUSDT".to_string()];

    // First cycle enters: market open plus take-profit limit
    let prices = feed.fetch_all(&markets, Granularity::FifteenMinutes).await;
    assert_eq!(prices["SOLUSDT"].len(), 30);
    let report = executor
        .run_cycle("ema-momentum-high", &strategy, &markets, &prices)
        .await
        .unwrap();
    assert_eq!(report.entered(), vec!["SOLUSDT"]);
    assert_eq!(report.orders_placed, 2);

    let book = store.load("ema-momentum-high");
    let record = book.get("SOLUSDT").unwrap();
    assert_eq!(record.position_type, PositionType::Long);
    assert!(store.path_for("ema-momentum-high").exists());
    assert_eq!(responses.entries("ema_crossover_momentum").len(), 2);

    // Same data again: the stored position suppresses a second entry
    let prices = feed.fetch_all(&markets, Granularity::FifteenMinutes).await;
    let report = executor
        .run_cycle("ema-momentum-high", &strategy, &markets, &prices)
        .await
        .unwrap();
    assert_eq!(report.orders_placed, 0);
    assert_eq!(report.outcome("SOLUSDT"), Some(&MarketOutcome::NoSignal));

    candles.assert_async().await;
    orders.assert_async().await;

    let drained = responses.drain().unwrap();
    assert_eq!(drained.len(), 2);
    assert!(drained.iter().all(|e| e.strategy == "ema_crossover_momentum"));
    assert!(responses.drain().unwrap().is_empty());
}

#[tokio::test]
async fn test_momentum_position_lifecycle() {
    let gateway = Arc::new(PaperGateway::new());
    let store = Arc::new(MemoryStore::new());
    let responses = Arc::new(MemoryResponseLog::new());
    let executor = Executor::new(gateway.clone(), store.clone(), responses.clone());

    let strategy = SlopeMomentum::new(
        SlopeMetric::Normalized,
        SlopeMomentumConfig {
            window: 3,
            ..Default::default()
        },
    );
    let markets = vec!["SOLUSDT".to_string()];
    let prices = |closes: Vec<f64>| {
        HashMap::from([(
            "SOLUSDT".to_string(),
            PriceSeries::from_closes("SOLUSDT", closes),
        )])
    };

    // Breakout: normalized slope at +1 opens a long
    let mut closes = vec![10.0; 8];
    closes.push(12.0);
    let report = executor
        .run_cycle(
            "normalized-momentum-15m",
            &strategy,
            &markets,
            &prices(closes.clone()),
        )
        .await
        .unwrap();
    assert_eq!(
        report.outcome("SOLUSDT"),
        Some(&MarketOutcome::Entered {
            position_type: PositionType::Long,
            companion_error: None,
        })
    );

    // Trend stalls: slope falls through the exit threshold
    closes.extend([12.0, 12.0, 12.0]);
    let report = executor
        .run_cycle("normalized-momentum-15m", &strategy, &markets, &prices(closes))
        .await
        .unwrap();
    assert_eq!(report.exited(), vec!["SOLUSDT"]);
    assert!(store.load("normalized-momentum-15m").is_empty());

    let placed = gateway.placed();
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[0].side, Side::OpenLong);
    assert_eq!(placed[1].side, Side::CloseLong);
    // Exit closes exactly what the entry opened
    assert_eq!(placed[0].size, 8.33);
    assert_eq!(placed[1].size, placed[0].size);
    assert_eq!(responses.entries().len(), 2);
}

#[tokio::test]
async fn test_partitions_do_not_share_positions() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let executor = Executor::new(
        Arc::new(PaperGateway::new()),
        store.clone(),
        Arc::new(MemoryResponseLog::new()),
    );
    let strategy = SlopeMomentum::new(
        SlopeMetric::Normalized,
        SlopeMomentumConfig {
            window: 3,
            ..Default::default()
        },
    );
    let markets = vec!["SOLUSDT".to_string()];
    let mut closes = vec![10.0; 8];
    closes.push(12.0);
    let prices = HashMap::from([(
        "SOLUSDT".to_string(),
        PriceSeries::from_closes("SOLUSDT", closes),
    )]);

    executor
        .run_cycle("normalized-momentum-15m", &strategy, &markets, &prices)
        .await
        .unwrap();
    executor
        .run_cycle("normalized-momentum-1h", &strategy, &markets, &prices)
        .await
        .unwrap();

    // Each partition opened its own position in its own file
    assert!(store.load("normalized-momentum-15m").has_open_position("SOLUSDT"));
    assert!(store.load("normalized-momentum-1h").has_open_position("SOLUSDT"));
    assert_ne!(
        store.path_for("normalized-momentum-15m"),
        store.path_for("normalized-momentum-1h")
    );
}
