//! Catalog localization.
//!
//! Product ids are looked up in consecutive batches. The operation is
//! all-or-nothing: one failed batch discards everything collected so far and
//! a single empty failure event is emitted.

use crate::config::BillingConfig;
use crate::connection::ConnectionManager;
use crate::events::{BillingEvent, EventSink, LocalizedPurchases};
use crate::metrics::BillingMetrics;
use crate::response_code::ResponseCode;
use crate::service::{BillingService, SkuDetailsQuery};
use crate::{reason, BillingError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Most product ids the vendor accepts per lookup.
pub const SKU_BATCH_LIMIT: usize = 20;

/// Display metadata for one product.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "productId")]
    pub sku: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Formatted price, already localized by the vendor.
    #[serde(default)]
    pub price: String,
    #[serde(default, rename = "price_currency_code")]
    pub currency_code: String,
}

impl CatalogEntry {
    /// Decode one vendor detail record.
    pub fn from_detail(detail: &str) -> Result<Self> {
        serde_json::from_str(detail).map_err(|e| BillingError::MalformedResponse(e.to_string()))
    }
}

pub struct CatalogQuery {
    config: Arc<BillingConfig>,
    connection: Arc<ConnectionManager>,
    events: Arc<dyn EventSink>,
    metrics: Arc<BillingMetrics>,
}

impl CatalogQuery {
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

    /// Look up display metadata for `skus` and emit one event.
    pub async fn localize(&self, skus: &[String]) -> LocalizedPurchases {
        let result = match self.collect(skus).await {
            Ok(localized) => localized,
            Err(e) => {
                warn!(error = %e, requested = skus.len(), "catalog localization aborted");
                self.metrics.record_catalog_failure();
                LocalizedPurchases::failed(reason::FAILED)
            }
        };
        self.events
            .emit(BillingEvent::PurchasesLocalized(result.clone()));
        result
    }

    async fn collect(&self, skus: &[String]) -> Result<LocalizedPurchases> {
        let Some(handle) = self.connection.current_handle() else {
            self.metrics.record_service_unavailable();
            return Err(BillingError::ServiceUnavailable);
        };

        let mut localized = LocalizedPurchases::default();
        for batch in skus.chunks(self.config.effective_batch_size()) {
            self.metrics.record_catalog_batch();
            for entry in self.lookup(handle.as_ref(), batch).await? {
                localized.push(entry);
            }
        }

        debug!(
            requested = skus.len(),
            localized = localized.len(),
            "catalog localized"
        );
        Ok(localized)
    }

    async fn lookup(&self, handle: &dyn BillingService, batch: &[String]) -> Result<Vec<CatalogEntry>> {
        let response = handle
            .sku_details(SkuDetailsQuery {
                api_version: self.config.api_version,
                package_name: self.config.package_name.clone(),
                item_type: self.config.item_type.clone(),
                skus: batch.to_vec(),
            })
            .await?;

        let code = ResponseCode::from_code(response.response_code);
        if !code.is_ok() {
            return Err(BillingError::Rejected(code));
        }

        let mut entries = Vec::with_capacity(response.details_list.len());
        for detail in &response.details_list {
            match CatalogEntry::from_detail(detail) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "skipping malformed detail record"),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_detail() {
        let entry = CatalogEntry::from_detail(
            r#"{"productId":"gems","type":"inapp","price":"$0.99","price_amount_micros":990000,
                "price_currency_code":"USD","title":"Gems","description":"A pile of gems"}"#,
        )
        .unwrap();
        assert_eq!(entry.sku, "gems");
        assert_eq!(entry.price, "$0.99");
        assert_eq!(entry.currency_code, "USD");
        assert_eq!(entry.title, "Gems");
    }

    #[test]
    fn test_decode_requires_product_id() {
        assert!(CatalogEntry::from_detail(r#"{"title":"Gems"}"#).is_err());
        assert!(CatalogEntry::from_detail("[").is_err());

        let sparse = CatalogEntry::from_detail(r#"{"productId":"gems"}"#).unwrap();
        assert_eq!(sparse.title, "");
    }
}
