//! Billing session.
//!
//! Owns the connection and every flow controller, and routes inbound
//! commands and vendor callbacks to them.

use crate::amazon::{AmazonController, AmazonPurchaseResponse, AmazonPurchasing};
use crate::catalog::CatalogQuery;
use crate::command::BillingCommand;
use crate::config::{BillingConfig, Storefront};
use crate::connection::ConnectionManager;
use crate::consume::{ConsumeController, ConsumeTicket};
use crate::events::{
    BillingEvent, EventSink, LocalizedPurchases, OwnedItemsResult, PurchaseResult, RestoreResult,
};
use crate::metrics::BillingMetrics;
use crate::owned::OwnedItemsQuery;
use crate::purchase::{PendingPurchase, PurchaseController};
use crate::service::{ActivityResult, PurchaseLauncher, ServiceBinder};
use crate::{reason, BillingError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct BillingSession {
    config: Arc<BillingConfig>,
    events: Arc<dyn EventSink>,
    metrics: Arc<BillingMetrics>,
    connection: Arc<ConnectionManager>,
    purchases: PurchaseController,
    consumes: ConsumeController,
    owned: OwnedItemsQuery,
    catalog: CatalogQuery,
    amazon: Option<AmazonController>,
}

impl BillingSession {
    /// Create a session. The consume worker is spawned on the current tokio
    /// runtime; outside one this returns [`BillingError::Config`].
    pub fn new(
        config: BillingConfig,
        binder: Arc<dyn ServiceBinder>,
        launcher: Arc<dyn PurchaseLauncher>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let metrics = Arc::new(BillingMetrics::new());
        let connection = Arc::new(ConnectionManager::new(
            binder,
            events.clone(),
            metrics.clone(),
        ));

        info!(
            package = %config.package_name,
            storefront = config.storefront.as_str(),
            "billing session created"
        );

        Ok(Self {
            purchases: PurchaseController::new(
                config.clone(),
                connection.clone(),
                launcher,
                events.clone(),
                metrics.clone(),
            ),
            consumes: ConsumeController::new(
                config.clone(),
                connection.clone(),
                events.clone(),
                metrics.clone(),
            )?,
            owned: OwnedItemsQuery::new(
                config.clone(),
                connection.clone(),
                events.clone(),
                metrics.clone(),
            ),
            catalog: CatalogQuery::new(
                config.clone(),
                connection.clone(),
                events.clone(),
                metrics.clone(),
            ),
            amazon: None,
            config,
            events,
            metrics,
            connection,
        })
    }

    /// Attach the Amazon purchasing SDK used on the Amazon storefront.
    pub fn with_amazon(mut self, purchasing: Arc<dyn AmazonPurchasing>) -> Self {
        self.amazon = Some(AmazonController::new(
            self.config.clone(),
            purchasing,
            self.events.clone(),
            self.metrics.clone(),
        ));
        self
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn metrics(&self) -> &BillingMetrics {
        &self.metrics
    }

    /// The connection manager, which also receives the platform's bind
    /// notifications.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn connect(&self) {
        self.connection.connect();
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Report the current connection state as an event.
    pub fn is_connected(&self) -> bool {
        let connected = self.connection.is_connected();
        self.events
            .emit(BillingEvent::ConnectionChanged { connected });
        connected
    }

    /// Start a purchase on the configured storefront.
    pub async fn purchase(&self, sku: &str) -> Result<()> {
        match self.config.storefront {
            Storefront::GooglePlay => self.purchases.purchase(sku).await.map(|_| ()),
            Storefront::Amazon => match &self.amazon {
                Some(amazon) => amazon.purchase(sku).await.map(|_| ()),
                None => {
                    warn!(sku, "no amazon purchasing adapter attached");
                    self.events.emit(BillingEvent::Purchase(PurchaseResult::failure(
                        Some(sku.to_string()),
                        reason::FAILED,
                    )));
                    Err(BillingError::Config(
                        "amazon storefront without purchasing adapter".into(),
                    ))
                }
            },
        }
    }

    pub fn consume(&self, token: &str) -> ConsumeTicket {
        self.consumes.consume(token)
    }

    pub async fn get_purchases(&self, continuation_token: Option<String>) -> OwnedItemsResult {
        self.owned.get_purchases(continuation_token).await
    }

    pub async fn localize_purchases(&self, skus: &[String]) -> LocalizedPurchases {
        self.catalog.localize(skus).await
    }

    /// Purchases are restored through `get_purchases`; there is no separate
    /// restore step.
    pub fn restore_completed(&self) {
        self.events.emit(BillingEvent::Restore(RestoreResult {
            failure: Some(reason::NOT_IMPLEMENTED.to_string()),
        }));
    }

    /// Deliver an activity result from the host.
    ///
    /// Returns `false` if the result did not belong to a pending purchase.
    pub fn on_activity_result(&self, result: ActivityResult) -> bool {
        self.purchases.on_activity_result(result)
    }

    /// Deliver an Amazon purchasing observer response.
    pub fn on_amazon_purchase_response(
        &self,
        response: AmazonPurchaseResponse,
    ) -> Option<PurchaseResult> {
        match &self.amazon {
            Some(amazon) => Some(amazon.on_purchase_response(response)),
            None => {
                warn!(request_id = %response.request_id, "amazon response without adapter");
                None
            }
        }
    }

    pub fn pending_purchases(&self) -> Vec<PendingPurchase> {
        self.purchases.pending()
    }

    /// Route one inbound command. Every outcome is reported as an event.
    pub async fn handle(&self, command: BillingCommand) {
        debug!(method = command.method(), "handling command");
        match command {
            BillingCommand::IsConnected => {
                self.is_connected();
            }
            BillingCommand::Purchase { sku } => {
                if let Err(e) = self.purchase(&sku).await {
                    debug!(sku = %sku, error = %e, "purchase did not start");
                }
            }
            BillingCommand::Consume { token } => {
                // Result arrives as an event
                let _ = self.consume(&token);
            }
            BillingCommand::GetPurchases { continuation_token } => {
                self.get_purchases(continuation_token).await;
            }
            BillingCommand::LocalizePurchases { items } => {
                self.localize_purchases(&items).await;
            }
            BillingCommand::RestoreCompleted => self.restore_completed(),
        }
    }

    /// Parse and route a JSON command.
    pub async fn handle_json(&self, json: &str) -> Result<()> {
        let command = BillingCommand::from_json(json)?;
        self.handle(command).await;
        Ok(())
    }
}

impl Drop for BillingSession {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}
