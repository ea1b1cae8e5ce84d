//! Owned-items query.

use crate::config::BillingConfig;
use crate::connection::ConnectionManager;
use crate::events::{BillingEvent, EventSink, OwnedItemsResult};
use crate::metrics::BillingMetrics;
use crate::response_code::ResponseCode;
use crate::service::{OwnedItemsResponse, PurchaseData, PurchasesQuery};
use crate::reason;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// One entitlement with every field present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedItem {
    pub sku: String,
    pub token: String,
    pub signature: String,
    /// The purchase-data blob the token was read from.
    pub receipt: String,
}

/// Pair up the vendor's parallel lists.
///
/// An entry is kept only when its sku, token and signature are all present.
/// Order is preserved. The token is read from the purchase-data blob; a blob
/// that does not parse counts as a missing token.
pub fn collect_owned_items(response: &OwnedItemsResponse) -> Vec<OwnedItem> {
    let mut items = Vec::new();

    for (i, sku) in response.item_list.iter().enumerate() {
        let Some(sku) = sku else { continue };
        let Some(blob) = response.purchase_data_list.get(i).cloned().flatten() else {
            continue;
        };
        let Some(signature) = response.signature_list.get(i).cloned().flatten() else {
            debug!(sku = %sku, "owned item without signature dropped");
            continue;
        };
        let token = match PurchaseData::parse(&blob) {
            Ok(data) => data.purchase_token,
            Err(e) => {
                warn!(sku = %sku, error = %e, "unreadable purchase data");
                None
            }
        };
        let Some(token) = token else { continue };

        items.push(OwnedItem {
            sku: sku.clone(),
            token,
            signature,
            receipt: blob,
        });
    }

    items
}

pub struct OwnedItemsQuery {
    config: Arc<BillingConfig>,
    connection: Arc<ConnectionManager>,
    events: Arc<dyn EventSink>,
    metrics: Arc<BillingMetrics>,
}

impl OwnedItemsQuery {
    pub fn new(
        config: Arc<BillingConfig>,
        connection: Arc<ConnectionManager>,
        events: Arc<dyn EventSink>,
        metrics: Arc<BillingMetrics>,
    ) -> Self {
        Self {
            config,
            connection,
            events,
            metrics,
        }
    }

    /// Fetch one page of owned items and emit it.
    ///
    /// Pass the previous result's `continuation_token` to get the next page.
    pub async fn get_purchases(&self, continuation_token: Option<String>) -> OwnedItemsResult {
        let result = self.query(continuation_token).await;
        self.events.emit(BillingEvent::OwnedItems(result.clone()));
        result
    }

    async fn query(&self, continuation_token: Option<String>) -> OwnedItemsResult {
        self.metrics.record_owned_query();

        let Some(handle) = self.connection.current_handle() else {
            self.metrics.record_service_unavailable();
            return OwnedItemsResult::failed(reason::SERVICE);
        };

        let response = match handle
            .purchases(PurchasesQuery {
                api_version: self.config.api_version,
                package_name: self.config.package_name.clone(),
                item_type: self.config.item_type.clone(),
                continuation_token,
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "owned items query failed");
                return OwnedItemsResult::failed(reason::FAILED);
            }
        };

        let code = ResponseCode::from_code(response.response_code);
        if !code.is_ok() {
            warn!(%code, "owned items query rejected");
            return OwnedItemsResult::failed(reason::FAILED);
        }

        let mut result = OwnedItemsResult::default();
        for item in collect_owned_items(&response) {
            result.push(item);
        }
        result.continuation_token = response.continuation_token;
        debug!(
            count = result.len(),
            more = result.continuation_token.is_some(),
            "owned items collected"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(token: &str) -> Option<String> {
        Some(format!(r#"{{"productId":"x","purchaseToken":"{}"}}"#, token))
    }

    #[test]
    fn test_drops_missing_signature() {
        let response = OwnedItemsResponse {
            response_code: Some(0),
            item_list: vec![Some("a".into()), Some("b".into())],
            purchase_data_list: vec![blob("t1"), blob("t2")],
            signature_list: vec![Some("s1".into()), None],
            continuation_token: None,
        };

        let items = collect_owned_items(&response);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku, "a");
        assert_eq!(items[0].token, "t1");
        assert_eq!(items[0].signature, "s1");
    }

    #[test]
    fn test_unparseable_blob_drops_entry() {
        let response = OwnedItemsResponse {
            response_code: Some(0),
            item_list: vec![Some("a".into()), Some("b".into()), None],
            purchase_data_list: vec![Some("garbage".into()), blob("t2"), blob("t3")],
            signature_list: vec![Some("s1".into()), Some("s2".into()), Some("s3".into())],
            continuation_token: None,
        };

        let items = collect_owned_items(&response);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku, "b");
    }

    #[test]
    fn test_uneven_lists() {
        let response = OwnedItemsResponse {
            response_code: Some(0),
            item_list: vec![Some("a".into()), Some("b".into())],
            purchase_data_list: vec![blob("t1")],
            signature_list: vec![Some("s1".into()), Some("s2".into())],
            continuation_token: None,
        };

        let items = collect_owned_items(&response);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].receipt, blob("t1").unwrap());
    }
}
