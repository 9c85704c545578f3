use crate::error::{ExecutionError, MarketDataError};
use crate::execution::{ExecutionGateway, MarketDataSource, OrderAck, OrderRequest};
use crate::models::{Candle, Granularity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::fmt;

pub const BITGET_API_BASE: &str = "https://api.bitget.com";
const HISTORY_CANDLES_PATH: &str = "/api/v2/mix/market/history-candles";
const PLACE_ORDER_PATH: &str = "/api/mix/v1/order/placeOrder";
const PRODUCT_TYPE: &str = "USDT-FUTURES";
const SUCCESS_CODE: &str = "00000";

/// Decimal places sent for limit prices
const PRICE_DECIMALS: u32 = 4;

type HmacSha256 = Hmac<Sha256>;

/// API key triple for signed endpoints
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Read `BITGET_API_KEY`, `BITGET_SECRET_KEY` and `BITGET_PASSPHRASE`.
    /// None unless all three are set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("BITGET_API_KEY").ok()?;
        let secret_key = std::env::var("BITGET_SECRET_KEY").ok()?;
        let passphrase = std::env::var("BITGET_PASSPHRASE").ok()?;
        Some(Self::new(api_key, secret_key, passphrase))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Bitget USDT-margined futures client
///
/// Public market data needs no credentials; order placement does.
#[derive(Debug, Clone)]
pub struct BitgetClient {
    client: Client,
    base_url: String,
    product_type: String,
    credentials: Option<Credentials>,
}

/// Common response envelope: `{"code": "00000", "msg": "success", "data": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderData {
    order_id: String,
}

impl BitgetClient {
    pub fn new(credentials: Option<Credentials>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: BITGET_API_BASE.to_string(),
            product_type: PRODUCT_TYPE.to_string(),
            credentials,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_product_type(mut self, product_type: impl Into<String>) -> Self {
        self.product_type = product_type.into();
        self
    }

    /// JSON body for the place-order endpoint
    fn order_body(order: &OrderRequest) -> Result<Value, ExecutionError> {
        let size = format_decimal(order.size, 2)
            .ok_or_else(|| ExecutionError::Decode(format!("invalid size {}", order.size)))?;

        let mut body = json!({
            "symbol": order.symbol,
            "marginCoin": order.margin_coin,
            "size": size,
            "side": order.side.as_str(),
            "orderType": match order.order_type {
                crate::models::OrderType::Market => "market",
                crate::models::OrderType::Limit => "limit",
            },
            "timeInForceValue": order.time_in_force.as_str(),
            "clientOid": order.client_oid,
        });

        if let Some(price) = order.price {
            let price = format_decimal(price, PRICE_DECIMALS)
                .ok_or_else(|| ExecutionError::Decode(format!("invalid price {}", price)))?;
            body["price"] = Value::String(price);
        }

        Ok(body)
    }
}

/// base64(HMAC-SHA256(secret, timestamp + METHOD + path + body))
pub fn sign(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, ExecutionError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExecutionError::Signing(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.to_uppercase().as_bytes());
    mac.update(request_path.as_bytes());
    mac.update(body.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn format_decimal(value: f64, dp: u32) -> Option<String> {
    let d = Decimal::from_f64(value)?.round_dp(dp).normalize();
    Some(d.to_string())
}

/// Candle fields arrive as strings, occasionally as numbers
fn field_f64(row: &[Value], idx: usize) -> Result<f64, MarketDataError> {
    let value = row
        .get(idx)
        .ok_or_else(|| MarketDataError::Malformed(format!("missing field {}", idx)))?;

    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| MarketDataError::Malformed(format!("field {} = {:?}: {}", idx, s, e))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| MarketDataError::Malformed(format!("field {} out of range", idx))),
        other => Err(MarketDataError::Malformed(format!(
            "field {} has unexpected type: {}",
            idx, other
        ))),
    }
}

fn parse_candle(market: &str, row: &[Value]) -> Result<Candle, MarketDataError> {
    let ts_ms = field_f64(row, 0)? as i64;
    let timestamp = DateTime::from_timestamp_millis(ts_ms)
        .ok_or_else(|| MarketDataError::Malformed(format!("bad timestamp {}", ts_ms)))?;

    Ok(Candle {
        market: market.to_string(),
        timestamp,
        open: field_f64(row, 1)?,
        high: field_f64(row, 2)?,
        low: field_f64(row, 3)?,
        close: field_f64(row, 4)?,
        volume: field_f64(row, 5)?,
    })
}

#[async_trait]
impl MarketDataSource for BitgetClient {
    async fn history_candles(
        &self,
        market: &str,
        granularity: Granularity,
        end_time: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let url = format!("{}{}", self.base_url, HISTORY_CANDLES_PATH);
        let end_ms = end_time.timestamp_millis().to_string();
        let limit = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", market),
                ("productType", self.product_type.as_str()),
                ("granularity", granularity.as_str()),
                ("endTime", end_ms.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarketDataError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MarketDataError::Transport(e.to_string()))?;

        let envelope: Envelope<Vec<Vec<Value>>> = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                MarketDataError::Malformed(e.to_string())
            } else {
                MarketDataError::Transport(format!("HTTP {}: {}", status, text))
            }
        })?;

        if envelope.code != SUCCESS_CODE {
            return Err(MarketDataError::Rejected {
                code: envelope.code,
                msg: envelope.msg,
            });
        }

        let rows = envelope.data.unwrap_or_default();
        let candles = rows
            .iter()
            .map(|row| parse_candle(market, row))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(market, count = candles.len(), end = %end_time, "Fetched candles");
        Ok(candles)
    }
}

#[async_trait]
impl ExecutionGateway for BitgetClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExecutionError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ExecutionError::Transport("no API credentials configured".to_string())
        })?;

        let body = Self::order_body(order)?.to_string();
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign(
            &credentials.secret_key,
            &timestamp,
            "POST",
            PLACE_ORDER_PATH,
            &body,
        )?;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, PLACE_ORDER_PATH))
            .header("ACCESS-KEY", &credentials.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", &timestamp)
            .header("ACCESS-PASSPHRASE", &credentials.passphrase)
            .header("Content-Type", "application/json")
            .header("locale", "en-US")
            .body(body)
            .send()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                ExecutionError::Decode(e.to_string())
            } else {
                ExecutionError::Transport(format!("HTTP {}: {}", status, text))
            }
        })?;

        // The envelope code is authoritative, whatever the HTTP status
        let envelope: Envelope<PlaceOrderData> = serde_json::from_value(raw.clone())
            .map_err(|e| ExecutionError::Decode(e.to_string()))?;

        if envelope.code != SUCCESS_CODE {
            return Err(ExecutionError::Rejected {
                code: envelope.code,
                msg: envelope.msg,
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| ExecutionError::Decode("success response without data".to_string()))?;

        Ok(OrderAck {
            order_id: data.order_id,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::OrderRouting;
    use crate::models::Side;
    use crate::strategy::OrderIntent;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> BitgetClient {
        BitgetClient::new(Some(Credentials::new("key", "secret", "phrase")))
            .unwrap()
            .with_base_url(server.url())
    }

    fn request(intent: OrderIntent) -> OrderRequest {
        OrderRequest::from_intent("SOLUSDT", &intent, &OrderRouting::default())
    }

    #[test]
    fn test_sign_is_deterministic_base64() {
        let a = sign("secret", "1700000000000", "post", PLACE_ORDER_PATH, "{}").unwrap();
        let b = sign("secret", "1700000000000", "POST", PLACE_ORDER_PATH, "{}").unwrap();
        assert_eq!(a, b);
        // 32-byte digest -> 44 base64 characters
        assert_eq!(a.len(), 44);
        assert_ne!(
            a,
            sign("other", "1700000000000", "POST", PLACE_ORDER_PATH, "{}").unwrap()
        );
    }

    #[test]
    fn test_sign_never_yields_empty_signature() {
        // Empty and oversized keys are both valid HMAC keys
        let long = "k".repeat(1024);
        for secret in ["", long.as_str()] {
            let signature = sign(secret, "1700000000000", "POST", PLACE_ORDER_PATH, "{}")
                .unwrap();
            assert_eq!(signature.len(), 44);
        }
    }

    #[test]
    fn test_order_body() {
        let body = BitgetClient::order_body(&request(OrderIntent::limit(
            Side::CloseShort,
            1.33,
            101.123456,
        )))
        .unwrap();

        assert_eq!(body["symbol"], "SOLUSDT_UMCBL");
        assert_eq!(body["marginCoin"], "USDT");
        assert_eq!(body["size"], "1.33");
        assert_eq!(body["price"], "101.1235");
        assert_eq!(body["side"], "close_short");
        assert_eq!(body["orderType"], "limit");
        assert_eq!(body["timeInForceValue"], "normal");

        let market = BitgetClient::order_body(&request(OrderIntent::market(Side::OpenLong, 2.0)))
            .unwrap();
        assert_eq!(market["size"], "2");
        assert!(market.get("price").is_none());
    }

    #[tokio::test]
    async fn test_history_candles() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", HISTORY_CANDLES_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "SOLUSDT".into()),
                Matcher::UrlEncoded("productType".into(), "USDT-FUTURES".into()),
                Matcher::UrlEncoded("granularity".into(), "15m".into()),
                Matcher::UrlEncoded("endTime".into(), "1700001000000".into()),
                Matcher::UrlEncoded("limit".into(), "200".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"code":"00000","msg":"success","data":[
                    ["1700000100000","100.5","101","99.5","100.8","1234.5","124000"],
                    ["1700001000000","100.8","102","100.1","101.9","980","99000"]
                ]}"#,
            )
            .create_async()
            .await;

        let end = DateTime::from_timestamp_millis(1_700_001_000_000).unwrap();
        let candles = client(&server)
            .history_candles("SOLUSDT", Granularity::FifteenMinutes, end, 200)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].market, "SOLUSDT");
        assert_eq!(candles[0].close, 100.8);
        assert_eq!(candles[1].timestamp, end);
        assert_eq!(candles[1].volume, 980.0);
    }

    #[tokio::test]
    async fn test_history_candles_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", HISTORY_CANDLES_PATH)
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":"40034","msg":"Parameter does not exist","data":null}"#)
            .create_async()
            .await;

        let result = client(&server)
            .history_candles("NOPEUSDT", Granularity::FifteenMinutes, Utc::now(), 200)
            .await;

        match result {
            Err(MarketDataError::Rejected { code, .. }) => assert_eq!(code, "40034"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_place_order_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PLACE_ORDER_PATH)
            .match_header("ACCESS-KEY", "key")
            .match_header("ACCESS-PASSPHRASE", "phrase")
            .match_header("ACCESS-SIGN", Matcher::Any)
            .match_header("ACCESS-TIMESTAMP", Matcher::Regex(r"^\d{13}$".to_string()))
            .match_body(Matcher::PartialJson(json!({
                "symbol": "SOLUSDT_UMCBL",
                "side": "open_long",
                "orderType": "market",
                "size": "1.5"
            })))
            .with_status(200)
            .with_body(r#"{"code":"00000","msg":"success","data":{"orderId":"1098394857","clientOid":"x"}}"#)
            .create_async()
            .await;

        let ack = client(&server)
            .place_order(&request(OrderIntent::market(Side::OpenLong, 1.5)))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(ack.order_id, "1098394857");
        assert_eq!(ack.raw["code"], "00000");
    }

    #[tokio::test]
    async fn test_place_order_rejected_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PLACE_ORDER_PATH)
            .with_status(200)
            .with_body(r#"{"code":"40762","msg":"The order amount exceeds the balance","data":null}"#)
            .create_async()
            .await;

        let err = client(&server)
            .place_order(&request(OrderIntent::market(Side::OpenShort, 100.0)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ExecutionError::Rejected {
                code: "40762".to_string(),
                msg: "The order amount exceeds the balance".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_place_order_without_credentials() {
        let server = mockito::Server::new_async().await;
        let client = BitgetClient::new(None).unwrap().with_base_url(server.url());

        let err = client
            .place_order(&request(OrderIntent::market(Side::OpenLong, 1.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Transport(_)));
    }
}
