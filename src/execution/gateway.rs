use crate::error::ExecutionError;
use crate::models::{OrderType, Side, TimeInForce};
use crate::strategy::OrderIntent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Order as submitted to the exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub margin_coin: String,
    pub side: Side,
    pub order_type: OrderType,
    pub size: f64,
    pub price: Option<f64>,
    pub time_in_force: TimeInForce,
    pub client_oid: String,
}

impl OrderRequest {
    pub fn from_intent(market: &str, intent: &OrderIntent, routing: &OrderRouting) -> Self {
        Self {
            symbol: routing.symbol(market),
            margin_coin: routing.margin_coin.clone(),
            side: intent.side,
            order_type: intent.order_type,
            size: intent.size,
            price: intent.price,
            time_in_force: TimeInForce::Normal,
            client_oid: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

/// How markets map onto exchange contracts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrderRouting {
    /// Appended to the market to form the contract symbol
    pub symbol_suffix: String,
    pub margin_coin: String,
    /// Reject codes meaning there is no position left to close, e.g. after
    /// a take-profit limit filled. An exit rejected with one of these
    /// counts as done.
    pub flat_position_codes: Vec<String>,
}

impl Default for OrderRouting {
    fn default() -> Self {
        Self {
            symbol_suffix: "_UMCBL".to_string(),
            margin_coin: "USDT".to_string(),
            flat_position_codes: vec!["22002".to_string(), "40757".to_string()],
        }
    }
}

impl OrderRouting {
    pub fn symbol(&self, market: &str) -> String {
        format!("{}{}", market, self.symbol_suffix)
    }

    pub fn is_flat_position(&self, err: &ExecutionError) -> bool {
        match err {
            ExecutionError::Rejected { code, .. } => {
                self.flat_position_codes.iter().any(|c| c == code)
            }
            _ => false,
        }
    }
}

/// Successful placement. `raw` is the full gateway response, kept for the
/// response log.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub raw: Value,
}

/// Where orders go
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExecutionError>;
}

/// Acknowledges every order without sending it anywhere.
///
/// Used for dry runs. Tests can script the next placements with
/// `succeed_next` and `fail_next`; unscripted placements succeed.
#[derive(Debug, Default)]
pub struct PaperGateway {
    placed: Mutex<Vec<OrderRequest>>,
    script: Mutex<VecDeque<Option<ExecutionError>>>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure with `error`
    pub fn fail_next(&self, error: ExecutionError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Some(error));
        }
    }

    /// Queue a success, for scripting failures further down the line
    pub fn succeed_next(&self) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(None);
        }
    }

    /// Orders acknowledged so far
    pub fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExecutionError> {
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        if let Some(Some(error)) = scripted {
            return Err(error);
        }

        let mut placed = self
            .placed
            .lock()
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;
        placed.push(order.clone());

        let order_id = format!("paper-{}", placed.len());
        tracing::info!(
            symbol = %order.symbol,
            side = %order.side,
            size = order.size,
            "Paper order acknowledged"
        );

        Ok(OrderAck {
            raw: serde_json::json!({
                "code": "00000",
                "msg": "success",
                "data": {"orderId": order_id, "clientOid": order.client_oid}
            }),
            order_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_intent() {
        let intent = OrderIntent::limit(Side::OpenShort, 1.33, 104.0);
        let request = OrderRequest::from_intent("SOLUSDT", &intent, &OrderRouting::default());

        assert_eq!(request.symbol, "SOLUSDT_UMCBL");
        assert_eq!(request.margin_coin, "USDT");
        assert_eq!(request.side, Side::OpenShort);
        assert_eq!(request.order_type, OrderType::Limit);
        assert_eq!(request.price, Some(104.0));
        assert_eq!(request.time_in_force, TimeInForce::Normal);
        assert_eq!(request.client_oid.len(), 32);
    }

    #[tokio::test]
    async fn test_paper_gateway_acks_and_records() {
        let gateway = PaperGateway::new();
        let request = OrderRequest::from_intent(
            "ETHUSDT",
            &OrderIntent::market(Side::OpenLong, 0.05),
            &OrderRouting::default(),
        );

        let ack = gateway.place_order(&request).await.unwrap();
        assert_eq!(ack.order_id, "paper-1");
        assert_eq!(ack.raw["code"], "00000");
        assert_eq!(gateway.placed(), vec![request]);
    }

    #[tokio::test]
    async fn test_paper_gateway_queued_failure() {
        let gateway = PaperGateway::new();
        gateway.fail_next(ExecutionError::Transport("timeout".to_string()));
        let request = OrderRequest::from_intent(
            "ETHUSDT",
            &OrderIntent::market(Side::OpenLong, 0.05),
            &OrderRouting::default(),
        );

        assert!(gateway.place_order(&request).await.is_err());
        assert!(gateway.place_order(&request).await.is_ok());
        assert_eq!(gateway.placed().len(), 1);
    }

    #[tokio::test]
    async fn test_paper_gateway_scripted_sequence() {
        let gateway = PaperGateway::new();
        gateway.succeed_next();
        gateway.fail_next(ExecutionError::Decode("missing orderId".to_string()));
        let request = OrderRequest::from_intent(
            "ETHUSDT",
            &OrderIntent::market(Side::OpenLong, 0.05),
            &OrderRouting::default(),
        );

        assert!(gateway.place_order(&request).await.is_ok());
        assert!(gateway.place_order(&request).await.is_err());
        assert!(gateway.place_order(&request).await.is_ok());
        assert_eq!(gateway.placed().len(), 2);
    }
}
