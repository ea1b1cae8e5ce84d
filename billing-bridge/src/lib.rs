//! Billing Bridge
//!
//! This crate implements the billing session state machine that sits between
//! an application's scripted purchase flow and a platform in-app purchase
//! service reached through a service binding.
//!
//! Two differently shaped vendor APIs are normalized into one event protocol:
//! the bound billing service (buy intents, activity results, bundles with
//! integer response codes) and the Amazon-style purchasing observer (request
//! ids, string statuses, receipts).
//!
//! # Example
//!
//! ```ignore
//! use billing_bridge::{BillingConfig, BillingSession, ChannelSink};
//!
//! let (sink, mut events) = ChannelSink::new();
//! let session = BillingSession::new(
//!     BillingConfig::new("com.example.game"),
//!     binder,
//!     launcher,
//!     std::sync::Arc::new(sink),
//! )?;
//!
//! session.connect();
//! session.purchase("gems_100").await?;
//!
//! // Later, once the purchase UI closes:
//! session.on_activity_result(result);
//! ```

pub mod amazon;
pub mod catalog;
pub mod command;
pub mod config;
pub mod connection;
pub mod consume;
pub mod events;
pub mod metrics;
pub mod owned;
pub mod purchase;
pub mod response_code;
#[cfg(feature = "sandbox")]
pub mod sandbox;
pub mod service;
pub mod session;

pub use amazon::{
    AmazonPurchaseResponse, AmazonPurchaseStatus, AmazonPurchasing, AmazonReceipt,
};
pub use catalog::CatalogEntry;
pub use command::BillingCommand;
pub use config::{BillingConfig, Storefront};
pub use connection::{ConnectionManager, ConnectionStatus};
pub use consume::ConsumeTicket;
pub use events::{
    BillingEvent, CallbackSink, ChannelSink, ConsumeResult, EventSink, LocalizedPurchases,
    OwnedItemsResult, PurchaseResult, RestoreResult,
};
pub use metrics::{BillingMetrics, MetricsSnapshot};
pub use owned::OwnedItem;
pub use purchase::PendingPurchase;
pub use response_code::ResponseCode;
pub use service::{
    ActivityResult, ActivityResultCode, BillingService, BuyIntentRequest, BuyIntentResponse,
    OwnedItemsResponse, PendingIntent, PurchaseData, PurchaseIntentData, PurchaseLauncher,
    PurchasesQuery, ServiceBinder, SkuDetailsQuery, SkuDetailsResponse,
};
pub use session::BillingSession;

/// Sentinel failure reasons carried on outward events.
///
/// Vendor rejections carry the translated [`ResponseCode`] string instead.
pub mod reason {
    /// No connection handle at call time.
    pub const SERVICE: &str = "service";
    /// Malformed response or a vendor call that raised.
    pub const FAILED: &str = "failed";
    /// The vendor declined to consume.
    pub const CANCEL: &str = "cancel";
    /// A purchase was rejected because the pending table is full.
    pub const BUSY: &str = "busy";
    /// The platform has no separate restore step.
    pub const NOT_IMPLEMENTED: &str = "not implemented";
}

/// Result type for billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    #[error("billing service is not connected")]
    ServiceUnavailable,
    #[error("vendor rejected the call: {0}")]
    Rejected(ResponseCode),
    #[error("malformed vendor response: {0}")]
    MalformedResponse(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("purchase already in progress ({limit} pending allowed)")]
    PurchaseInProgress { limit: usize },
    #[error("consume queue is unavailable")]
    QueueUnavailable,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl BillingError {
    /// Collapse this error into the outward failure reason.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable => reason::SERVICE,
            Self::Rejected(code) => code.as_reason(),
            Self::PurchaseInProgress { .. } => reason::BUSY,
            Self::MalformedResponse(_)
            | Self::Transport(_)
            | Self::QueueUnavailable
            | Self::UnknownCommand(_)
            | Self::Config(_)
            | Self::Serialization(_) => reason::FAILED,
        }
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(e: serde_json::Error) -> Self {
        BillingError::Serialization(e.to_string())
    }
}
