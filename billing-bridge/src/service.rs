//! Vendor-facing boundary.
//!
//! The bound billing service, the binder that produces it, and the launcher
//! that shows the vendor purchase UI are all supplied by the host platform.

use crate::{BillingError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque launchable purchase flow returned by the vendor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIntent(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuyIntentRequest {
    pub api_version: u32,
    pub package_name: String,
    pub sku: String,
    pub item_type: String,
    pub developer_payload: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuyIntentResponse {
    pub response_code: Option<i64>,
    pub buy_intent: Option<PendingIntent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchasesQuery {
    pub api_version: u32,
    pub package_name: String,
    pub item_type: String,
    pub continuation_token: Option<String>,
}

/// One page of owned items as three parallel lists.
///
/// Entries may be missing at any index; the lists are not guaranteed to have
/// equal length.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnedItemsResponse {
    pub response_code: Option<i64>,
    pub item_list: Vec<Option<String>>,
    pub purchase_data_list: Vec<Option<String>>,
    pub signature_list: Vec<Option<String>>,
    pub continuation_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkuDetailsQuery {
    pub api_version: u32,
    pub package_name: String,
    pub item_type: String,
    pub skus: Vec<String>,
}

/// Detail records are JSON text, one per product.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SkuDetailsResponse {
    pub response_code: Option<i64>,
    pub details_list: Vec<String>,
}

/// Platform activity result code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityResultCode {
    Ok,
    Canceled,
    Other(i32),
}

impl ActivityResultCode {
    pub const RESULT_OK: i32 = -1;
    pub const RESULT_CANCELED: i32 = 0;

    pub fn from_raw(raw: i32) -> Self {
        match raw {
            Self::RESULT_OK => Self::Ok,
            Self::RESULT_CANCELED => Self::Canceled,
            other => Self::Other(other),
        }
    }
}

/// Extras attached to a finished purchase flow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PurchaseIntentData {
    pub response_code: Option<i64>,
    pub purchase_data: Option<String>,
    pub signature: Option<String>,
}

/// Result delivered by the host once the vendor purchase UI closes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityResult {
    pub request_tag: i32,
    pub result_code: ActivityResultCode,
    pub data: Option<PurchaseIntentData>,
}

/// The subset of the purchase-data JSON the bridge reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseData {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub purchase_token: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl PurchaseData {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| BillingError::MalformedResponse(e.to_string()))
    }
}

/// Connection handle to the bound billing service.
///
/// A handle may go away mid-call; implementations surface that as an error.
#[async_trait]
pub trait BillingService: Send + Sync {
    async fn buy_intent(&self, request: BuyIntentRequest) -> Result<BuyIntentResponse>;

    /// Returns the raw vendor response code.
    async fn consume_purchase(
        &self,
        api_version: u32,
        package_name: &str,
        purchase_token: &str,
    ) -> Result<i64>;

    async fn purchases(&self, query: PurchasesQuery) -> Result<OwnedItemsResponse>;

    async fn sku_details(&self, query: SkuDetailsQuery) -> Result<SkuDetailsResponse>;
}

/// Starts and stops the platform service binding.
///
/// The platform answers with `on_service_connected`/`on_service_disconnected`
/// on the connection manager, possibly from another thread.
pub trait ServiceBinder: Send + Sync {
    fn bind(&self) -> Result<()>;
    fn unbind(&self);
}

/// Shows the vendor purchase UI for an intent.
pub trait PurchaseLauncher: Send + Sync {
    fn launch(&self, intent: &PendingIntent, request_tag: i32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_result_codes() {
        assert_eq!(ActivityResultCode::from_raw(-1), ActivityResultCode::Ok);
        assert_eq!(ActivityResultCode::from_raw(0), ActivityResultCode::Canceled);
        assert_eq!(ActivityResultCode::from_raw(7), ActivityResultCode::Other(7));
    }

    #[test]
    fn test_purchase_data_parse() {
        let data = PurchaseData::parse(
            r#"{"orderId":"o1","productId":"gems","purchaseToken":"tok","purchaseState":0}"#,
        )
        .unwrap();
        assert_eq!(data.product_id.as_deref(), Some("gems"));
        assert_eq!(data.purchase_token.as_deref(), Some("tok"));

        let partial = PurchaseData::parse(r#"{"productId":"gems"}"#).unwrap();
        assert!(partial.purchase_token.is_none());

        assert!(matches!(
            PurchaseData::parse("not json"),
            Err(BillingError::MalformedResponse(_))
        ));
    }
}
