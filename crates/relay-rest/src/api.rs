//! Concrete exchange call surface on top of the executor.
//!
//! Public lookups (server time, symbols, tickers, klines) go out unsigned;
//! trading and account calls are signed.

use crate::error::{RestError, RestResult};
use crate::executor::SignedRequestExecutor;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Order placement request. Quantities and prices travel as strings, the
/// way the exchange quotes them; this layer does no numeric interpretation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    /// "LIMIT" or "MARKET".
    #[serde(rename = "type")]
    pub order_type: String,
    pub quantity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

impl SignedRequestExecutor {
    /// Exchange server time in epoch milliseconds. Unauthenticated.
    pub async fn server_time(&self) -> RestResult<i64> {
        let value = self
            .execute(Method::GET, "/api/v1/time", None, false)
            .await?;
        value
            .get("serverTime")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| RestError::Decode("serverTime missing from response".to_string()))
    }

    /// 24h ticker for one symbol. Unauthenticated.
    pub async fn ticker(&self, symbol: &str) -> RestResult<serde_json::Value> {
        let path = format!("/api/v1/ticker?symbol={symbol}");
        self.execute(Method::GET, &path, None, false).await
    }

    /// Kline history for one symbol. Unauthenticated.
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> RestResult<serde_json::Value> {
        let path = format!("/api/v1/klines?symbol={symbol}&interval={interval}&limit={limit}");
        self.execute(Method::GET, &path, None, false).await
    }

    /// Place an order. Signed. Not deduplicated here: a caller that retries
    /// around this method places again.
    pub async fn place_order(&self, order: &OrderRequest) -> RestResult<serde_json::Value> {
        let body = serde_json::to_value(order)?;
        self.execute(Method::POST, "/api/v1/order", Some(&body), true)
            .await
    }

    /// Cancel an order by exchange id. Signed.
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> RestResult<serde_json::Value> {
        let body = json!({ "symbol": symbol, "orderId": order_id });
        self.execute(Method::DELETE, "/api/v1/order", Some(&body), true)
            .await
    }

    /// Account balances and permissions. Signed.
    pub async fn account(&self) -> RestResult<serde_json::Value> {
        self.execute(Method::GET, "/api/v1/account", None, true)
            .await
    }
}
