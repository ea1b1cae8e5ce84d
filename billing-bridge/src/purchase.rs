//! Purchase flow.
//!
//! A purchase is accepted into a pending table under a generated correlation
//! tag, the vendor UI is launched with that tag, and the flow completes when
//! the host delivers the matching activity result.

use crate::config::BillingConfig;
use crate::connection::ConnectionManager;
use crate::events::{BillingEvent, EventSink, PurchaseResult};
use crate::metrics::BillingMetrics;
use crate::response_code::ResponseCode;
use crate::service::{
    ActivityResult, ActivityResultCode, BillingService, BuyIntentRequest, PurchaseData,
    PurchaseLauncher,
};
use crate::{reason, BillingError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Tags are drawn from this many consecutive values above the base.
const TAG_SPAN: u32 = 1024;

/// A purchase waiting for its activity result.
#[derive(Clone, Debug)]
pub struct PendingPurchase {
    pub sku: String,
    pub request_tag: i32,
    pub started_at: Instant,
}

#[derive(Default)]
struct PendingTable {
    entries: HashMap<i32, PendingPurchase>,
    next_seq: u32,
}

pub struct PurchaseController {
    config: Arc<BillingConfig>,
    connection: Arc<ConnectionManager>,
    launcher: Arc<dyn PurchaseLauncher>,
    events: Arc<dyn EventSink>,
    metrics: Arc<BillingMetrics>,
    pending: Mutex<PendingTable>,
}

impl PurchaseController {
    pub fn new(
        config: Arc<BillingConfig>,
        connection: Arc<ConnectionManager>,
        launcher: Arc<dyn PurchaseLauncher>,
        events: Arc<dyn EventSink>,
        metrics: Arc<BillingMetrics>,
    ) -> Self {
        Self {
            config,
            connection,
            launcher,
            events,
            metrics,
            pending: Mutex::new(PendingTable::default()),
        }
    }

    /// Start a purchase for `sku`.
    ///
    /// Returns the correlation tag once the vendor UI is launched. On error
    /// the failure event has already been emitted.
    pub async fn purchase(&self, sku: &str) -> Result<i32> {
        let Some(handle) = self.connection.current_handle() else {
            self.metrics.record_service_unavailable();
            self.emit(PurchaseResult::failure(Some(sku.to_string()), reason::SERVICE));
            return Err(BillingError::ServiceUnavailable);
        };

        let tag = match self.reserve(sku) {
            Ok(tag) => tag,
            Err(e) => {
                warn!(sku, error = %e, "purchase rejected");
                self.metrics.record_purchase_rejected_busy();
                self.emit(PurchaseResult::failure(Some(sku.to_string()), e.failure_reason()));
                return Err(e);
            }
        };

        self.metrics.record_purchase_started();
        debug!(sku, tag, "purchase reserved");

        match self.launch(handle.as_ref(), sku, tag).await {
            Ok(()) => {
                info!(sku, tag, "purchase flow launched");
                Ok(tag)
            }
            Err(e) => {
                warn!(sku, tag, error = %e, "purchase flow could not be launched");
                self.release(tag);
                self.metrics.record_purchase_failed();
                self.emit(PurchaseResult::failure(Some(sku.to_string()), reason::FAILED));
                Err(e)
            }
        }
    }

    async fn launch(&self, handle: &dyn BillingService, sku: &str, tag: i32) -> Result<()> {
        let response = handle
            .buy_intent(BuyIntentRequest {
                api_version: self.config.api_version,
                package_name: self.config.package_name.clone(),
                sku: sku.to_string(),
                item_type: self.config.item_type.clone(),
                developer_payload: self.config.developer_payload.clone(),
            })
            .await?;

        let code = ResponseCode::from_code(response.response_code);
        if !code.is_ok() {
            return Err(BillingError::Rejected(code));
        }

        let intent = response
            .buy_intent
            .ok_or_else(|| BillingError::MalformedResponse("no buy intent".into()))?;

        self.launcher.launch(&intent, tag)
    }

    /// Correlate a deferred activity result with its pending purchase.
    ///
    /// Returns `false` without emitting when the tag is not ours.
    pub fn on_activity_result(&self, result: ActivityResult) -> bool {
        let Some(pending) = self.release(result.request_tag) else {
            debug!(tag = result.request_tag, "ignoring foreign activity result");
            self.metrics.record_activity_result_ignored();
            return false;
        };

        let outcome = Self::resolve(pending, result);
        if outcome.is_success() {
            self.metrics.record_purchase_succeeded();
        } else {
            self.metrics.record_purchase_failed();
        }
        self.emit(outcome);
        true
    }

    fn resolve(pending: PendingPurchase, result: ActivityResult) -> PurchaseResult {
        let Some(data) = result.data else {
            return PurchaseResult::failure(
                Some(pending.sku),
                reason_or(ResponseCode::from_code(None), reason::FAILED),
            );
        };

        let code = ResponseCode::from_code(data.response_code);
        let Some(raw) = data.purchase_data else {
            return PurchaseResult::failure(Some(pending.sku), reason_or(code, reason::FAILED));
        };

        let (product_id, token) = match PurchaseData::parse(&raw) {
            Ok(PurchaseData {
                product_id: Some(id),
                purchase_token,
                ..
            }) => (id, purchase_token),
            Ok(_) => {
                warn!(sku = %pending.sku, "purchase data without productId");
                return PurchaseResult::failure(Some(pending.sku), reason::FAILED);
            }
            Err(e) => {
                warn!(sku = %pending.sku, error = %e, "unreadable purchase data");
                return PurchaseResult::failure(Some(pending.sku), reason::FAILED);
            }
        };

        match result.result_code {
            ActivityResultCode::Ok => match token {
                Some(token) => PurchaseResult::success(product_id, token, data.signature, Some(raw)),
                None => PurchaseResult::failure(Some(product_id), reason::FAILED),
            },
            ActivityResultCode::Canceled => {
                PurchaseResult::failure(Some(product_id), reason_or(code, reason::CANCEL))
            }
            ActivityResultCode::Other(raw_code) => {
                debug!(raw_code, "unexpected activity result code");
                PurchaseResult::failure(Some(product_id), reason_or(code, reason::FAILED))
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn pending(&self) -> Vec<PendingPurchase> {
        let table = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut pending: Vec<_> = table.entries.values().cloned().collect();
        pending.sort_by_key(|p| p.started_at);
        pending
    }

    fn reserve(&self, sku: &str) -> Result<i32> {
        let limit = self.config.max_pending_purchases;
        let mut table = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if table.entries.len() >= limit {
            return Err(BillingError::PurchaseInProgress { limit });
        }

        for _ in 0..TAG_SPAN {
            let seq = table.next_seq;
            table.next_seq = seq.wrapping_add(1);
            let tag = self
                .config
                .purchase_tag_base
                .wrapping_add((seq % TAG_SPAN) as i32);
            if table.entries.contains_key(&tag) {
                continue;
            }
            table.entries.insert(
                tag,
                PendingPurchase {
                    sku: sku.to_string(),
                    request_tag: tag,
                    started_at: Instant::now(),
                },
            );
            return Ok(tag);
        }

        Err(BillingError::PurchaseInProgress { limit })
    }

    fn release(&self, tag: i32) -> Option<PendingPurchase> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .remove(&tag)
    }

    fn emit(&self, result: PurchaseResult) {
        self.events.emit(BillingEvent::Purchase(result));
    }
}

/// A translated code, unless it reads as success.
fn reason_or(code: ResponseCode, fallback: &'static str) -> &'static str {
    if code.is_ok() {
        fallback
    } else {
        code.as_reason()
    }
}
