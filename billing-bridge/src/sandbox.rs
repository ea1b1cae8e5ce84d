//! In-process simulated storefront.
//!
//! [`SandboxStore`] plays the bound billing service and honours the static
//! test product ids:
//!
//! - `android.test.purchased`: purchase always succeeds
//! - `android.test.canceled`: the user backs out of the purchase UI
//! - `android.test.refunded`: purchase completes but is never owned
//! - `android.test.item_unavailable`: the product cannot be bought
//!
//! Any product added with [`SandboxStore::add_product`] behaves like
//! `android.test.purchased`. The launcher and Amazon stand-in hand their
//! results back over channels so the host decides when to deliver them.

use crate::amazon::{
    short_sku, AmazonPurchaseResponse, AmazonPurchaseStatus, AmazonPurchasing, AmazonReceipt,
};
use crate::catalog::{CatalogEntry, SKU_BATCH_LIMIT};
use crate::connection::ConnectionManager;
use crate::response_code::ResponseCode;
use crate::service::{
    ActivityResult, ActivityResultCode, BillingService, BuyIntentRequest, BuyIntentResponse,
    OwnedItemsResponse, PendingIntent, PurchaseIntentData, PurchaseLauncher, PurchasesQuery,
    ServiceBinder, SkuDetailsQuery, SkuDetailsResponse,
};
use crate::{BillingError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::mpsc;
use tracing::debug;

pub const TEST_PURCHASED: &str = "android.test.purchased";
pub const TEST_CANCELED: &str = "android.test.canceled";
pub const TEST_REFUNDED: &str = "android.test.refunded";
pub const TEST_ITEM_UNAVAILABLE: &str = "android.test.item_unavailable";

/// Older spelling still used by some host scripts.
const TEST_UNAVAILABLE_ALIAS: &str = "android.test.unavailable";

/// Owned items returned per page.
const DEFAULT_PAGE_SIZE: usize = 20;

fn is_unavailable(sku: &str) -> bool {
    sku == TEST_ITEM_UNAVAILABLE || sku == TEST_UNAVAILABLE_ALIAS
}

#[derive(Clone, Debug)]
struct OwnedPurchase {
    sku: String,
    token: String,
    purchase_data: String,
    signature: String,
}

/// Simulated billing service.
pub struct SandboxStore {
    package_name: String,
    catalog: RwLock<HashMap<String, CatalogEntry>>,
    owned: RwLock<Vec<OwnedPurchase>>,
    intents: Mutex<HashMap<String, String>>,
    next_id: AtomicU64,
    available: AtomicBool,
    page_size: usize,
}

impl SandboxStore {
    pub fn new(package_name: impl Into<String>) -> Arc<Self> {
        Self::with_page_size(package_name, DEFAULT_PAGE_SIZE)
    }

    /// Create a store that pages owned items `page_size` at a time.
    pub fn with_page_size(package_name: impl Into<String>, page_size: usize) -> Arc<Self> {
        let store = Self {
            package_name: package_name.into(),
            catalog: RwLock::new(HashMap::new()),
            owned: RwLock::new(Vec::new()),
            intents: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
            page_size: page_size.max(1),
        };
        for sku in [TEST_PURCHASED, TEST_CANCELED, TEST_REFUNDED] {
            store.add_product(CatalogEntry {
                sku: sku.to_string(),
                title: format!("Sample title for {}", sku),
                description: format!("Sample description for {}", sku),
                price: "$0.99".to_string(),
                currency_code: "USD".to_string(),
            });
        }
        Arc::new(store)
    }

    pub fn add_product(&self, entry: CatalogEntry) {
        self.catalog
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry.sku.clone(), entry);
    }

    /// Make every vendor call fail as if the binder died.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Skus currently owned, in purchase order.
    pub fn owned_skus(&self) -> Vec<String> {
        self.owned
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|p| p.sku.clone())
            .collect()
    }

    /// Record an owned purchase directly and return its token.
    pub fn grant(&self, sku: &str) -> String {
        let purchase = self.new_purchase(sku);
        let token = purchase.token.clone();
        self.owned
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(purchase);
        token
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BillingError::Transport("sandbox service unavailable".into()))
        }
    }

    fn is_owned(&self, sku: &str) -> bool {
        self.owned
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|p| p.sku == sku)
    }

    fn is_known(&self, sku: &str) -> bool {
        self.catalog
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(sku)
    }

    fn new_purchase(&self, sku: &str) -> OwnedPurchase {
        let id = self.next_id();
        let token = format!("sandbox-token-{}", id);
        let purchase_data = json!({
            "orderId": format!("sandbox-order-{}", id),
            "packageName": self.package_name,
            "productId": sku,
            "purchaseState": 0,
            "purchaseToken": token,
        })
        .to_string();
        OwnedPurchase {
            sku: sku.to_string(),
            token,
            purchase_data,
            signature: format!("sandbox-signature-{}", id),
        }
    }

    /// Play out the purchase UI for an intent.
    pub fn complete_intent(&self, intent: &PendingIntent, request_tag: i32) -> Result<ActivityResult> {
        let sku = self
            .intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&intent.0)
            .ok_or_else(|| BillingError::MalformedResponse(format!("unknown intent {}", intent.0)))?;

        let (result_code, data) = if sku == TEST_CANCELED {
            (
                ActivityResultCode::Canceled,
                PurchaseIntentData {
                    response_code: ResponseCode::UserCanceled.code(),
                    ..Default::default()
                },
            )
        } else {
            let purchase = self.new_purchase(&sku);
            let data = PurchaseIntentData {
                response_code: ResponseCode::Ok.code(),
                purchase_data: Some(purchase.purchase_data.clone()),
                signature: Some(purchase.signature.clone()),
            };
            if sku != TEST_REFUNDED {
                self.owned
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(purchase);
            }
            (ActivityResultCode::Ok, data)
        };

        debug!(sku = %sku, request_tag, ?result_code, "sandbox purchase completed");
        Ok(ActivityResult {
            request_tag,
            result_code,
            data: Some(data),
        })
    }
}

#[async_trait]
impl BillingService for SandboxStore {
    async fn buy_intent(&self, request: BuyIntentRequest) -> Result<BuyIntentResponse> {
        self.check_available()?;

        let code = if is_unavailable(&request.sku) || !self.is_known(&request.sku) {
            ResponseCode::ItemUnavailable
        } else if self.is_owned(&request.sku) {
            ResponseCode::AlreadyOwned
        } else {
            ResponseCode::Ok
        };

        if !code.is_ok() {
            return Ok(BuyIntentResponse {
                response_code: code.code(),
                buy_intent: None,
            });
        }

        let intent = format!("sandbox-intent-{}", self.next_id());
        self.intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(intent.clone(), request.sku);

        Ok(BuyIntentResponse {
            response_code: code.code(),
            buy_intent: Some(PendingIntent(intent)),
        })
    }

    async fn consume_purchase(
        &self,
        _api_version: u32,
        _package_name: &str,
        purchase_token: &str,
    ) -> Result<i64> {
        self.check_available()?;

        let mut owned = self.owned.write().unwrap_or_else(|e| e.into_inner());
        let code = match owned.iter().position(|p| p.token == purchase_token) {
            Some(i) => {
                owned.remove(i);
                ResponseCode::Ok
            }
            None => ResponseCode::ItemNotOwned,
        };
        Ok(code.code().unwrap_or_default())
    }

    async fn purchases(&self, query: PurchasesQuery) -> Result<OwnedItemsResponse> {
        self.check_available()?;

        let start = match query.continuation_token.as_deref() {
            None => 0,
            Some(token) => match token.parse::<usize>() {
                Ok(offset) => offset,
                Err(_) => {
                    return Ok(OwnedItemsResponse {
                        response_code: ResponseCode::InvalidArguments.code(),
                        ..Default::default()
                    })
                }
            },
        };

        let owned = self.owned.read().unwrap_or_else(|e| e.into_inner());
        let page: Vec<_> = owned.iter().skip(start).take(self.page_size).collect();
        let next = start + page.len();

        Ok(OwnedItemsResponse {
            response_code: ResponseCode::Ok.code(),
            item_list: page.iter().map(|p| Some(p.sku.clone())).collect(),
            purchase_data_list: page.iter().map(|p| Some(p.purchase_data.clone())).collect(),
            signature_list: page.iter().map(|p| Some(p.signature.clone())).collect(),
            continuation_token: (next < owned.len()).then(|| next.to_string()),
        })
    }

    async fn sku_details(&self, query: SkuDetailsQuery) -> Result<SkuDetailsResponse> {
        self.check_available()?;

        if query.skus.len() > SKU_BATCH_LIMIT {
            return Ok(SkuDetailsResponse {
                response_code: ResponseCode::InvalidArguments.code(),
                details_list: Vec::new(),
            });
        }

        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        let details_list = query
            .skus
            .iter()
            .filter_map(|sku| catalog.get(sku))
            .map(|entry| {
                json!({
                    "productId": entry.sku,
                    "type": query.item_type,
                    "price": entry.price,
                    "price_currency_code": entry.currency_code,
                    "title": entry.title,
                    "description": entry.description,
                })
                .to_string()
            })
            .collect();

        Ok(SkuDetailsResponse {
            response_code: ResponseCode::Ok.code(),
            details_list,
        })
    }
}

/// Binder that connects straight to a [`SandboxStore`].
///
/// Attach the session's connection manager before calling `connect`.
pub struct SandboxBinder {
    store: Arc<SandboxStore>,
    connection: Mutex<Weak<ConnectionManager>>,
}

impl SandboxBinder {
    pub fn new(store: Arc<SandboxStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            connection: Mutex::new(Weak::new()),
        })
    }

    pub fn attach(&self, connection: &Arc<ConnectionManager>) {
        *self.connection.lock().unwrap_or_else(|e| e.into_inner()) = Arc::downgrade(connection);
    }

    /// Drop the connection as if the service process died.
    pub fn simulate_disconnect(&self) {
        if let Some(connection) = self.upgrade() {
            connection.on_service_disconnected();
        }
    }

    fn upgrade(&self) -> Option<Arc<ConnectionManager>> {
        self.connection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .upgrade()
    }
}

impl ServiceBinder for SandboxBinder {
    fn bind(&self) -> Result<()> {
        let connection = self
            .upgrade()
            .ok_or_else(|| BillingError::Transport("sandbox binder not attached".into()))?;
        connection.on_service_connected(self.store.clone());
        Ok(())
    }

    fn unbind(&self) {
        debug!("sandbox binding released");
    }
}

/// Launcher that completes every purchase UI immediately.
///
/// Activity results are queued on the channel returned by [`SandboxLauncher::new`]
/// and must be fed back through `on_activity_result`.
pub struct SandboxLauncher {
    store: Arc<SandboxStore>,
    results: mpsc::UnboundedSender<ActivityResult>,
}

impl SandboxLauncher {
    pub fn new(store: Arc<SandboxStore>) -> (Arc<Self>, mpsc::UnboundedReceiver<ActivityResult>) {
        let (results, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { store, results }), rx)
    }
}

impl PurchaseLauncher for SandboxLauncher {
    fn launch(&self, intent: &PendingIntent, request_tag: i32) -> Result<()> {
        let result = self.store.complete_intent(intent, request_tag)?;
        self.results
            .send(result)
            .map_err(|_| BillingError::Transport("activity result receiver dropped".into()))
    }
}

/// Amazon purchasing stand-in backed by the same store.
pub struct SandboxAmazon {
    store: Arc<SandboxStore>,
    responses: mpsc::UnboundedSender<AmazonPurchaseResponse>,
}

impl SandboxAmazon {
    pub fn new(
        store: Arc<SandboxStore>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<AmazonPurchaseResponse>) {
        let (responses, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { store, responses }), rx)
    }
}

#[async_trait]
impl AmazonPurchasing for SandboxAmazon {
    async fn initiate_purchase_request(&self, sku: &str) -> Result<String> {
        self.store.check_available()?;

        let request_id = format!("sandbox-request-{}", self.store.next_id());
        let short = short_sku(sku);

        let response = if short == "unavailable" || short == "item_unavailable" {
            AmazonPurchaseResponse {
                request_id: request_id.clone(),
                status: AmazonPurchaseStatus::InvalidSku,
                receipt: None,
            }
        } else if self.store.is_owned(sku) {
            AmazonPurchaseResponse {
                request_id: request_id.clone(),
                status: AmazonPurchaseStatus::AlreadyEntitled,
                receipt: None,
            }
        } else {
            let token = self.store.grant(sku);
            AmazonPurchaseResponse {
                request_id: request_id.clone(),
                status: AmazonPurchaseStatus::Successful,
                receipt: Some(AmazonReceipt {
                    sku: sku.to_string(),
                    purchase_token: token,
                }),
            }
        };

        self.responses
            .send(response)
            .map_err(|_| BillingError::Transport("purchase response receiver dropped".into()))?;
        Ok(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(sku: &str) -> BuyIntentRequest {
        BuyIntentRequest {
            api_version: 3,
            package_name: "com.example".into(),
            sku: sku.into(),
            item_type: "inapp".into(),
            developer_payload: "1".into(),
        }
    }

    #[tokio::test]
    async fn test_static_skus() {
        let store = SandboxStore::new("com.example");

        let unavailable = store.buy_intent(request(TEST_ITEM_UNAVAILABLE)).await.unwrap();
        assert_eq!(unavailable.response_code, Some(4));
        assert!(unavailable.buy_intent.is_none());

        let canceled = store.buy_intent(request(TEST_CANCELED)).await.unwrap();
        let result = store
            .complete_intent(&canceled.buy_intent.unwrap(), 123450)
            .unwrap();
        assert_eq!(result.result_code, ActivityResultCode::Canceled);

        let purchased = store.buy_intent(request(TEST_PURCHASED)).await.unwrap();
        let result = store
            .complete_intent(&purchased.buy_intent.unwrap(), 123451)
            .unwrap();
        assert_eq!(result.result_code, ActivityResultCode::Ok);
        assert_eq!(result.request_tag, 123451);
        assert_eq!(store.owned_skus(), vec![TEST_PURCHASED.to_string()]);

        let again = store.buy_intent(request(TEST_PURCHASED)).await.unwrap();
        assert_eq!(again.response_code, Some(7));
    }

    #[tokio::test]
    async fn test_refunded_is_not_owned() {
        let store = SandboxStore::new("com.example");
        let intent = store
            .buy_intent(request(TEST_REFUNDED))
            .await
            .unwrap()
            .buy_intent
            .unwrap();
        let result = store.complete_intent(&intent, 1).unwrap();
        assert_eq!(result.result_code, ActivityResultCode::Ok);
        assert!(store.owned_skus().is_empty());
    }

    #[tokio::test]
    async fn test_paging_and_consume() {
        let store = SandboxStore::with_page_size("com.example", 2);
        let tokens: Vec<String> = ["a", "b", "c"].iter().map(|s| store.grant(s)).collect();

        let query = PurchasesQuery {
            api_version: 3,
            package_name: "com.example".into(),
            item_type: "inapp".into(),
            continuation_token: None,
        };
        let first = store.purchases(query.clone()).await.unwrap();
        assert_eq!(first.item_list.len(), 2);
        assert_eq!(first.continuation_token.as_deref(), Some("2"));

        let second = store
            .purchases(PurchasesQuery {
                continuation_token: first.continuation_token,
                ..query
            })
            .await
            .unwrap();
        assert_eq!(second.item_list, vec![Some("c".to_string())]);
        assert!(second.continuation_token.is_none());

        assert_eq!(store.consume_purchase(3, "com.example", &tokens[0]).await.unwrap(), 0);
        assert_eq!(store.consume_purchase(3, "com.example", &tokens[0]).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = SandboxStore::new("com.example");
        store.set_available(false);
        assert!(matches!(
            store.buy_intent(request(TEST_PURCHASED)).await,
            Err(BillingError::Transport(_))
        ));
    }
}
