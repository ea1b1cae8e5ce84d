//! Amazon storefront adapter.
//!
//! The Amazon purchasing API identifies purchases by request id and reports
//! outcomes as string statuses on an observer. Products are registered under
//! SKUs qualified with the application package name; the adapter strips the
//! qualifier so the host sees the same short ids it asked for.

use crate::config::BillingConfig;
use crate::events::{BillingEvent, EventSink, PurchaseResult};
use crate::metrics::BillingMetrics;
use crate::response_code::ResponseCode;
use crate::{reason, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Purchasing entry point of the Amazon SDK.
#[async_trait]
pub trait AmazonPurchasing: Send + Sync {
    /// Start a purchase for a fully qualified SKU and return its request id.
    async fn initiate_purchase_request(&self, sku: &str) -> Result<String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmazonPurchaseStatus {
    Successful,
    AlreadyEntitled,
    InvalidSku,
    #[serde(other)]
    Failed,
}

impl AmazonPurchaseStatus {
    /// Parse an SDK status string. Unrecognized statuses count as failures.
    pub fn from_status(status: &str) -> Self {
        match status {
            "SUCCESSFUL" => Self::Successful,
            "ALREADY_ENTITLED" => Self::AlreadyEntitled,
            "INVALID_SKU" => Self::InvalidSku,
            _ => Self::Failed,
        }
    }

    /// Failure reason for a non-successful status.
    pub fn failure_reason(&self) -> Option<&'static str> {
        match self {
            Self::Successful => None,
            Self::AlreadyEntitled => Some(ResponseCode::AlreadyOwned.as_reason()),
            Self::InvalidSku => Some(ResponseCode::ItemUnavailable.as_reason()),
            Self::Failed => Some(reason::FAILED),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmazonReceipt {
    /// Fully qualified SKU.
    pub sku: String,
    pub purchase_token: String,
}

/// Observer callback payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmazonPurchaseResponse {
    pub request_id: String,
    pub status: AmazonPurchaseStatus,
    #[serde(default)]
    pub receipt: Option<AmazonReceipt>,
}

/// Text after the last `.` of a qualified SKU.
pub fn short_sku(qualified: &str) -> &str {
    match qualified.rfind('.') {
        Some(i) => &qualified[i + 1..],
        None => qualified,
    }
}

pub struct AmazonController {
    config: Arc<BillingConfig>,
    purchasing: Arc<dyn AmazonPurchasing>,
    events: Arc<dyn EventSink>,
    metrics: Arc<BillingMetrics>,
    pending: Mutex<PendingRequests>,
}

/// Bound on responses remembered for request ids not yet registered.
const EARLY_RESPONSE_LIMIT: usize = 32;

#[derive(Default)]
struct PendingRequests {
    /// request id -> short sku
    by_id: HashMap<String, String>,
    /// Request ids answered before `initiate_purchase_request` returned.
    answered: VecDeque<String>,
}

impl PendingRequests {
    fn register(&mut self, request_id: String, sku: String) {
        if let Some(i) = self.answered.iter().position(|id| *id == request_id) {
            self.answered.remove(i);
            return;
        }
        self.by_id.insert(request_id, sku);
    }

    fn resolve(&mut self, request_id: &str) -> Option<String> {
        let sku = self.by_id.remove(request_id);
        if sku.is_none() {
            if self.answered.len() == EARLY_RESPONSE_LIMIT {
                self.answered.pop_front();
            }
            self.answered.push_back(request_id.to_string());
        }
        sku
    }
}

impl AmazonController {
    pub fn new(
        config: Arc<BillingConfig>,
        purchasing: Arc<dyn AmazonPurchasing>,
        events: Arc<dyn EventSink>,
        metrics: Arc<BillingMetrics>,
    ) -> Self {
        Self {
            config,
            purchasing,
            events,
            metrics,
            pending: Mutex::new(PendingRequests::default()),
        }
    }

    pub fn qualify(&self, sku: &str) -> String {
        format!("{}.{}", self.config.package_name, sku)
    }

    /// Start a purchase and return the SDK request id.
    pub async fn purchase(&self, sku: &str) -> Result<String> {
        self.metrics.record_purchase_started();
        let qualified = self.qualify(sku);

        match self.purchasing.initiate_purchase_request(&qualified).await {
            Ok(request_id) => {
                info!(sku, request_id = %request_id, "amazon purchase requested");
                self.pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .register(request_id.clone(), sku.to_string());
                Ok(request_id)
            }
            Err(e) => {
                warn!(sku, error = %e, "amazon purchase request failed");
                self.metrics.record_purchase_failed();
                self.events.emit(BillingEvent::Purchase(PurchaseResult::failure(
                    Some(sku.to_string()),
                    reason::FAILED,
                )));
                Err(e)
            }
        }
    }

    /// Translate an observer response into a purchase event.
    pub fn on_purchase_response(&self, response: AmazonPurchaseResponse) -> PurchaseResult {
        let requested = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(&response.request_id);

        let result = match (response.status, response.receipt) {
            (AmazonPurchaseStatus::Successful, Some(receipt)) => PurchaseResult::success(
                short_sku(&receipt.sku),
                receipt.purchase_token,
                None,
                None,
            ),
            (AmazonPurchaseStatus::Successful, None) => {
                warn!(request_id = %response.request_id, "successful purchase without receipt");
                PurchaseResult::failure(requested, reason::FAILED)
            }
            (status, receipt) => {
                let sku = requested.or_else(|| receipt.map(|r| short_sku(&r.sku).to_string()));
                warn!(?status, sku = ?sku, "amazon purchase not completed");
                PurchaseResult::failure(sku, status.failure_reason().unwrap_or(reason::FAILED))
            }
        };

        if result.is_success() {
            self.metrics.record_purchase_succeeded();
        } else {
            self.metrics.record_purchase_failed();
        }
        self.events.emit(BillingEvent::Purchase(result.clone()));
        result
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_id
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_sku() {
        assert_eq!(short_sku("com.example.game.gems"), "gems");
        assert_eq!(short_sku("gems"), "gems");
        assert_eq!(short_sku("trailing."), "");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            AmazonPurchaseStatus::from_status("SUCCESSFUL"),
            AmazonPurchaseStatus::Successful
        );
        assert_eq!(
            AmazonPurchaseStatus::from_status("ALREADY_ENTITLED"),
            AmazonPurchaseStatus::AlreadyEntitled
        );
        assert_eq!(
            AmazonPurchaseStatus::from_status("INVALID_SKU"),
            AmazonPurchaseStatus::InvalidSku
        );
        assert_eq!(
            AmazonPurchaseStatus::from_status("NOT_SUPPORTED"),
            AmazonPurchaseStatus::Failed
        );
    }

    #[test]
    fn test_failure_reasons() {
        assert_eq!(AmazonPurchaseStatus::Successful.failure_reason(), None);
        assert_eq!(
            AmazonPurchaseStatus::AlreadyEntitled.failure_reason(),
            Some("already owned")
        );
        assert_eq!(
            AmazonPurchaseStatus::InvalidSku.failure_reason(),
            Some("item unavailable")
        );
        assert_eq!(AmazonPurchaseStatus::Failed.failure_reason(), Some("failed"));
    }

    #[test]
    fn test_response_wire_format() {
        let response: AmazonPurchaseResponse = serde_json::from_str(
            r#"{"requestId":"r1","status":"ALREADY_ENTITLED"}"#,
        )
        .unwrap();
        assert_eq!(response.status, AmazonPurchaseStatus::AlreadyEntitled);
        assert!(response.receipt.is_none());
    }

    #[test]
    fn test_unlisted_status_decodes_as_failed() {
        let response: AmazonPurchaseResponse = serde_json::from_str(
            r#"{"requestId":"r1","status":"NOT_SUPPORTED"}"#,
        )
        .unwrap();
        assert_eq!(response.status, AmazonPurchaseStatus::Failed);
    }

    struct FixedRequestId(&'static str);

    #[async_trait]
    impl AmazonPurchasing for FixedRequestId {
        async fn initiate_purchase_request(&self, _sku: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn controller(request_id: &'static str) -> AmazonController {
        let (sink, _events) = crate::events::ChannelSink::new();
        AmazonController::new(
            Arc::new(BillingConfig::new("com.example.game")),
            Arc::new(FixedRequestId(request_id)),
            Arc::new(sink),
            Arc::new(BillingMetrics::new()),
        )
    }

    #[tokio::test]
    async fn test_response_before_request_id_returns() {
        let amazon = controller("r1");

        let result = amazon.on_purchase_response(AmazonPurchaseResponse {
            request_id: "r1".into(),
            status: AmazonPurchaseStatus::Failed,
            receipt: None,
        });
        assert_eq!(result.failure.as_deref(), Some("failed"));

        assert_eq!(amazon.purchase("gems").await.unwrap(), "r1");
        assert_eq!(amazon.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_response_after_request_id_returns() {
        let amazon = controller("r2");
        amazon.purchase("gems").await.unwrap();
        assert_eq!(amazon.pending_count(), 1);

        let result = amazon.on_purchase_response(AmazonPurchaseResponse {
            request_id: "r2".into(),
            status: AmazonPurchaseStatus::InvalidSku,
            receipt: None,
        });
        assert_eq!(result.sku.as_deref(), Some("gems"));
        assert_eq!(result.failure.as_deref(), Some("item unavailable"));
        assert_eq!(amazon.pending_count(), 0);
    }
}
