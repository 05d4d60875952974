// Resale ("used reservation") trade client.
//
// Every operation is a single HTTP call. The trade's authoritative state
// lives on the backend; nothing is cached here and nothing is deduplicated,
// so calling `TradeApi::create_trade` twice issues two requests.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{ApiError, ClientError};
use crate::transport::{reject_business_failure, HttpTransport};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsedItemIdx(String);

/// Backend trade key. Accepts either a JSON string or number on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UsedTradeIdx(String);

impl UsedItemIdx {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl UsedTradeIdx {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UsedItemIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UsedTradeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UsedTradeIdx {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawIdx {
            Text(String),
            Number(i64),
        }

        Ok(match RawIdx::deserialize(deserializer)? {
            RawIdx::Text(s) => UsedTradeIdx(s),
            RawIdx::Number(n) => UsedTradeIdx(n.to_string()),
        })
    }
}

/// Trade status as the backend encodes it: a bare integer.
///
/// Only 0 and 1 are known; any other code is preserved as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum TradeStatus {
    InProgress,
    Completed,
    Other(i64),
}

impl From<i64> for TradeStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => TradeStatus::InProgress,
            1 => TradeStatus::Completed,
            other => TradeStatus::Other(other),
        }
    }
}

impl From<TradeStatus> for i64 {
    fn from(status: TradeStatus) -> Self {
        status.code()
    }
}

impl TradeStatus {
    pub fn code(self) -> i64 {
        match self {
            TradeStatus::InProgress => 0,
            TradeStatus::Completed => 1,
            TradeStatus::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub used_trade_idx: UsedTradeIdx,
    pub status: TradeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTradeRequest {
    pub used_item_idx: UsedItemIdx,
    pub buyer_idx: i64,
    pub seller_idx: i64,
    pub price: i64,
    pub reserv_idx: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStatusUpdate {
    pub status: TradeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSummary {
    pub used_trade_idx: UsedTradeIdx,
    pub used_item_idx: UsedItemIdx,
    pub status: TradeStatus,
    pub price: i64,
    #[serde(default)]
    pub buyer_idx: Option<i64>,
    #[serde(default)]
    pub seller_idx: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePayment {
    pub payment_key: String,
    pub order_id: String,
    pub amount: i64,
    pub method: String,
}

#[async_trait]
pub trait TradeApi: Send + Sync + 'static {
    async fn check_availability(&self, item: &UsedItemIdx) -> Result<Availability, ApiError>;

    async fn create_trade(&self, request: &CreateTradeRequest) -> Result<Trade, ApiError>;

    async fn confirm_trade(&self, trade: &UsedTradeIdx) -> Result<TradeStatusUpdate, ApiError>;

    async fn cancel_trade(
        &self,
        trade: &UsedTradeIdx,
        reason: &str,
    ) -> Result<TradeStatusUpdate, ApiError>;

    async fn delete_trade(
        &self,
        trade: &UsedTradeIdx,
        reason: &str,
    ) -> Result<TradeStatusUpdate, ApiError>;

    async fn trade_status(&self, trade: &UsedTradeIdx) -> Result<Trade, ApiError>;

    async fn trades_for_buyer(&self, buyer_idx: i64) -> Result<Vec<TradeSummary>, ApiError>;

    async fn trades_for_seller(&self, seller_idx: i64) -> Result<Vec<TradeSummary>, ApiError>;

    async fn record_payment(
        &self,
        trade: &UsedTradeIdx,
        payment: &TradePayment,
    ) -> Result<TradeStatusUpdate, ApiError>;

    // Page-presence locks held while the buyer sits on the payment page
    async fn lock_trade_page(
        &self,
        trade: &UsedTradeIdx,
        buyer_idx: i64,
    ) -> Result<Value, ApiError>;

    async fn unlock_trade_page(
        &self,
        trade: &UsedTradeIdx,
        buyer_idx: i64,
    ) -> Result<Value, ApiError>;
}

#[derive(Debug, Clone)]
pub struct TradeClient {
    transport: HttpTransport,
}

impl TradeClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::with_transport(HttpTransport::new(config)?))
    }

    pub fn with_transport(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub(crate) fn trade_path(trade: &UsedTradeIdx, action: &str) -> String {
        format!("/used/trade/{}/{}", encode_segment(trade.as_str()), action)
    }

    // POST whose 200 body may still report `success: false`
    async fn post_checked<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let raw: Value = self.transport.post_json(path, body).await?;
        reject_business_failure(&raw)?;
        serde_json::from_value(raw).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

pub(crate) fn encode_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}

#[async_trait]
impl TradeApi for TradeClient {
    #[instrument(skip_all, fields(item = %item))]
    async fn check_availability(&self, item: &UsedItemIdx) -> Result<Availability, ApiError> {
        let path = format!("/used/{}/availability", encode_segment(item.as_str()));
        let availability: Availability = self.transport.get_json(&path, &[]).await?;
        debug!(available = availability.available, "availability checked");
        Ok(availability)
    }

    #[instrument(skip_all, fields(item = %request.used_item_idx, buyer = request.buyer_idx))]
    async fn create_trade(&self, request: &CreateTradeRequest) -> Result<Trade, ApiError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.post_checked("/used/trade", Some(&body)).await
    }

    #[instrument(skip_all, fields(trade = %trade))]
    async fn confirm_trade(&self, trade: &UsedTradeIdx) -> Result<TradeStatusUpdate, ApiError> {
        self.post_checked(&Self::trade_path(trade, "confirm"), None)
            .await
    }

    #[instrument(skip_all, fields(trade = %trade))]
    async fn cancel_trade(
        &self,
        trade: &UsedTradeIdx,
        reason: &str,
    ) -> Result<TradeStatusUpdate, ApiError> {
        let body = json!({ "reason": reason });
        self.post_checked(&Self::trade_path(trade, "cancel"), Some(&body))
            .await
    }

    #[instrument(skip_all, fields(trade = %trade))]
    async fn delete_trade(
        &self,
        trade: &UsedTradeIdx,
        reason: &str,
    ) -> Result<TradeStatusUpdate, ApiError> {
        let body = json!({ "reason": reason, "timestamp": Utc::now().to_rfc3339() });
        self.post_checked(&Self::trade_path(trade, "delete"), Some(&body))
            .await
    }

    #[instrument(skip_all, fields(trade = %trade))]
    async fn trade_status(&self, trade: &UsedTradeIdx) -> Result<Trade, ApiError> {
        self.transport
            .get_json(&Self::trade_path(trade, "status"), &[])
            .await
    }

    #[instrument(skip(self))]
    async fn trades_for_buyer(&self, buyer_idx: i64) -> Result<Vec<TradeSummary>, ApiError> {
        self.transport
            .get_json(&format!("/used/trade/buyer/{}", buyer_idx), &[])
            .await
    }

    #[instrument(skip(self))]
    async fn trades_for_seller(&self, seller_idx: i64) -> Result<Vec<TradeSummary>, ApiError> {
        self.transport
            .get_json(&format!("/used/trade/seller/{}", seller_idx), &[])
            .await
    }

    #[instrument(skip_all, fields(trade = %trade, amount = payment.amount))]
    async fn record_payment(
        &self,
        trade: &UsedTradeIdx,
        payment: &TradePayment,
    ) -> Result<TradeStatusUpdate, ApiError> {
        let body = serde_json::to_value(payment)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.post_checked(&Self::trade_path(trade, "payment"), Some(&body))
            .await
    }

    #[instrument(skip_all, fields(trade = %trade))]
    async fn lock_trade_page(
        &self,
        trade: &UsedTradeIdx,
        buyer_idx: i64,
    ) -> Result<Value, ApiError> {
        let body = json!({ "buyerIdx": buyer_idx });
        self.post_checked(&Self::trade_path(trade, "lock"), Some(&body))
            .await
    }

    #[instrument(skip_all, fields(trade = %trade))]
    async fn unlock_trade_page(
        &self,
        trade: &UsedTradeIdx,
        buyer_idx: i64,
    ) -> Result<Value, ApiError> {
        let body = json!({ "buyerIdx": buyer_idx });
        self.post_checked(&Self::trade_path(trade, "unlock"), Some(&body))
            .await
    }
}
