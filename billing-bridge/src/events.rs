//! Outward event vocabulary and delivery.
//!
//! Every operation of the session terminates in exactly one event. Events are
//! flat records; the `name` tag matches what the host script listens for.

use crate::catalog::CatalogEntry;
use crate::owned::OwnedItem;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of a purchase flow.
///
/// Exactly one of `token` or `failure` is present.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Raw purchase data as echoed by the vendor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PurchaseResult {
    pub fn success(
        sku: impl Into<String>,
        token: impl Into<String>,
        signature: Option<String>,
        receipt: Option<String>,
    ) -> Self {
        Self {
            sku: Some(sku.into()),
            token: Some(token.into()),
            signature,
            receipt,
            failure: None,
        }
    }

    pub fn failure(sku: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            sku,
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.token.is_some()
    }
}

/// Result of a consume call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeResult {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ConsumeResult {
    pub fn success(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            failure: None,
        }
    }

    pub fn failure(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            failure: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Entitlements owned by the caller, as parallel sequences paired by index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedItemsResult {
    pub skus: Vec<String>,
    pub tokens: Vec<String>,
    pub signatures: Vec<String>,
    pub receipts: Vec<String>,
    /// Set when the vendor has more pages to hand out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl OwnedItemsResult {
    /// An empty result carrying only a failure reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn push(&mut self, item: OwnedItem) {
        self.skus.push(item.sku);
        self.tokens.push(item.token);
        self.signatures.push(item.signature);
        self.receipts.push(item.receipt);
    }

    pub fn len(&self) -> usize {
        self.skus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skus.is_empty()
    }
}

/// Localized catalog metadata as five parallel sequences.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedPurchases {
    pub skus: Vec<String>,
    pub titles: Vec<String>,
    pub descriptions: Vec<String>,
    pub prices: Vec<String>,
    pub currency_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl LocalizedPurchases {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn push(&mut self, entry: CatalogEntry) {
        self.skus.push(entry.sku);
        self.titles.push(entry.title);
        self.descriptions.push(entry.description);
        self.prices.push(entry.price);
        self.currency_codes.push(entry.currency_code);
    }

    pub fn len(&self) -> usize {
        self.skus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skus.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Events delivered to the host application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum BillingEvent {
    #[serde(rename = "billingConnected")]
    ConnectionChanged { connected: bool },
    #[serde(rename = "billingPurchase")]
    Purchase(PurchaseResult),
    #[serde(rename = "billingConsume")]
    Consume(ConsumeResult),
    #[serde(rename = "billingOwned")]
    OwnedItems(OwnedItemsResult),
    #[serde(rename = "billingLocalizedPurchases")]
    PurchasesLocalized(LocalizedPurchases),
    #[serde(rename = "billingRestore")]
    Restore(RestoreResult),
}

impl BillingEvent {
    /// Event name as seen by the host script.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionChanged { .. } => "billingConnected",
            Self::Purchase(_) => "billingPurchase",
            Self::Consume(_) => "billingConsume",
            Self::OwnedItems(_) => "billingOwned",
            Self::PurchasesLocalized(_) => "billingLocalizedPurchases",
            Self::Restore(_) => "billingRestore",
        }
    }

    /// Failure reason carried by the event, if any.
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::ConnectionChanged { .. } => None,
            Self::Purchase(r) => r.failure.as_deref(),
            Self::Consume(r) => r.failure.as_deref(),
            Self::OwnedItems(r) => r.failure.as_deref(),
            Self::PurchasesLocalized(r) => r.failure.as_deref(),
            Self::Restore(r) => r.failure.as_deref(),
        }
    }
}

/// Outward delivery boundary.
///
/// Implemented by the host; ordering is emission order per sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BillingEvent);
}

/// Sink backed by an unbounded tokio channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<BillingEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BillingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: BillingEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(event = e.0.name(), "event receiver dropped");
        }
    }
}

/// Callback for delivered events.
pub type EventCallback = Arc<dyn Fn(&BillingEvent) + Send + Sync>;

/// Sink that forwards every event to a closure.
pub struct CallbackSink {
    callback: EventCallback,
}

impl CallbackSink {
    pub fn new(callback: EventCallback) -> Self {
        Self { callback }
    }
}

impl EventSink for CallbackSink {
    fn emit(&self, event: BillingEvent) {
        (self.callback)(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_purchase_result_shapes() {
        let ok = PurchaseResult::success("gems", "tok", Some("sig".into()), None);
        assert!(ok.is_success());

        let failed = PurchaseResult::failure(Some("gems".into()), "service");
        assert!(!failed.is_success());
        assert!(failed.token.is_none());
        assert_eq!(failed.sku.as_deref(), Some("gems"));
    }

    #[test]
    fn test_event_wire_format() {
        let event = BillingEvent::Purchase(PurchaseResult::failure(Some("gems".into()), "failed"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"name": "billingPurchase", "sku": "gems", "failure": "failed"})
        );

        let connected = serde_json::to_value(BillingEvent::ConnectionChanged { connected: true })
            .unwrap();
        assert_eq!(connected, json!({"name": "billingConnected", "connected": true}));
    }

    #[test]
    fn test_owned_items_wire_format() {
        let mut owned = OwnedItemsResult::default();
        owned.push(OwnedItem {
            sku: "a".into(),
            token: "t1".into(),
            signature: "s1".into(),
            receipt: "{}".into(),
        });
        owned.continuation_token = Some("next".into());

        let value = serde_json::to_value(BillingEvent::OwnedItems(owned)).unwrap();
        assert_eq!(value["name"], "billingOwned");
        assert_eq!(value["skus"], json!(["a"]));
        assert_eq!(value["continuationToken"], "next");
        assert!(value.get("failure").is_none());
    }

    #[test]
    fn test_event_parse_back() {
        let raw = r#"{"name":"billingConsume","token":"t1","failure":"cancel"}"#;
        let event: BillingEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(
            event,
            BillingEvent::Consume(ConsumeResult::failure("t1", "cancel"))
        );
        assert_eq!(event.failure(), Some("cancel"));
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(BillingEvent::Restore(RestoreResult {
            failure: Some("not implemented".into()),
        }));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "billingRestore");
    }

    #[test]
    fn test_callback_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink = CallbackSink::new(Arc::new(move |event: &BillingEvent| {
            seen_clone.lock().unwrap().push(event.name());
        }));

        sink.emit(BillingEvent::ConnectionChanged { connected: false });
        assert_eq!(*seen.lock().unwrap(), vec!["billingConnected"]);
    }
}
