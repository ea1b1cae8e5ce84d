//! Session configuration.

use crate::{BillingError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Installer package of the Amazon appstore.
pub const AMAZON_INSTALLER: &str = "com.amazon.venezia";
/// Installer package of Google Play.
pub const GOOGLE_PLAY_INSTALLER: &str = "com.android.vending";

/// Which vendor purchasing API the session talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Storefront {
    /// Bound billing service with buy intents and activity results.
    #[default]
    GooglePlay,
    /// Purchasing observer with request ids and receipts.
    Amazon,
}

impl Storefront {
    /// Pick the storefront from the package that installed the app.
    ///
    /// Unknown or missing installers fall back to Google Play.
    pub fn from_installer(installer: Option<&str>) -> Self {
        match installer {
            Some(AMAZON_INSTALLER) => Self::Amazon,
            _ => Self::GooglePlay,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GooglePlay => "google_play",
            Self::Amazon => "amazon",
        }
    }
}

impl FromStr for Storefront {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "google_play" | "googleplay" | "google" | "play" => Ok(Self::GooglePlay),
            "amazon" | "kindle" => Ok(Self::Amazon),
            other => Err(BillingError::Config(format!("unknown storefront: {}", other))),
        }
    }
}

/// Configuration for a [`BillingSession`](crate::BillingSession).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Package name of the calling application.
    pub package_name: String,

    #[serde(default)]
    pub storefront: Storefront,

    /// Billing API version passed on every vendor call.
    #[serde(default = "default_api_version")]
    pub api_version: u32,

    #[serde(default = "default_item_type")]
    pub item_type: String,

    #[serde(default = "default_developer_payload")]
    pub developer_payload: String,

    /// First correlation tag handed to the purchase launcher.
    #[serde(default = "default_purchase_tag_base")]
    pub purchase_tag_base: i32,

    /// Purchases allowed in flight at once.
    #[serde(default = "default_max_pending_purchases")]
    pub max_pending_purchases: usize,

    /// Product ids per catalog lookup. Capped at 20 by the vendor.
    #[serde(default = "default_sku_batch_size")]
    pub sku_batch_size: usize,

    #[serde(default = "default_consume_queue_capacity")]
    pub consume_queue_capacity: usize,
}

fn default_api_version() -> u32 {
    3
}

fn default_item_type() -> String {
    "inapp".to_string()
}

fn default_developer_payload() -> String {
    "1".to_string()
}

fn default_purchase_tag_base() -> i32 {
    123450
}

fn default_max_pending_purchases() -> usize {
    1
}

fn default_sku_batch_size() -> usize {
    crate::catalog::SKU_BATCH_LIMIT
}

fn default_consume_queue_capacity() -> usize {
    64
}

impl BillingConfig {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            storefront: Storefront::default(),
            api_version: default_api_version(),
            item_type: default_item_type(),
            developer_payload: default_developer_payload(),
            purchase_tag_base: default_purchase_tag_base(),
            max_pending_purchases: default_max_pending_purchases(),
            sku_batch_size: default_sku_batch_size(),
            consume_queue_capacity: default_consume_queue_capacity(),
        }
    }

    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_storefront(mut self, storefront: Storefront) -> Self {
        self.storefront = storefront;
        self
    }

    pub fn with_api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }

    pub fn with_developer_payload(mut self, payload: impl Into<String>) -> Self {
        self.developer_payload = payload.into();
        self
    }

    pub fn with_purchase_tag_base(mut self, base: i32) -> Self {
        self.purchase_tag_base = base;
        self
    }

    pub fn with_max_pending_purchases(mut self, max: usize) -> Self {
        self.max_pending_purchases = max;
        self
    }

    pub fn with_sku_batch_size(mut self, size: usize) -> Self {
        self.sku_batch_size = size;
        self
    }

    pub fn with_consume_queue_capacity(mut self, capacity: usize) -> Self {
        self.consume_queue_capacity = capacity;
        self
    }

    /// Batch size actually used for catalog lookups.
    pub fn effective_batch_size(&self) -> usize {
        self.sku_batch_size.clamp(1, crate::catalog::SKU_BATCH_LIMIT)
    }

    pub fn validate(&self) -> Result<()> {
        if self.package_name.trim().is_empty() {
            return Err(BillingError::Config("package_name is empty".into()));
        }
        if self.max_pending_purchases == 0 {
            return Err(BillingError::Config(
                "max_pending_purchases must be at least 1".into(),
            ));
        }
        if self.sku_batch_size == 0 || self.sku_batch_size > crate::catalog::SKU_BATCH_LIMIT {
            return Err(BillingError::Config(format!(
                "sku_batch_size must be between 1 and {}",
                crate::catalog::SKU_BATCH_LIMIT
            )));
        }
        if self.consume_queue_capacity == 0 {
            return Err(BillingError::Config(
                "consume_queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BillingConfig::new("com.example.game");
        assert_eq!(config.api_version, 3);
        assert_eq!(config.item_type, "inapp");
        assert_eq!(config.developer_payload, "1");
        assert_eq!(config.purchase_tag_base, 123450);
        assert_eq!(config.max_pending_purchases, 1);
        assert_eq!(config.sku_batch_size, 20);
        assert_eq!(config.storefront, Storefront::GooglePlay);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config =
            BillingConfig::from_json(r#"{"package_name":"com.example","storefront":"amazon"}"#)
                .unwrap();
        assert_eq!(config.storefront, Storefront::Amazon);
        assert_eq!(config.consume_queue_capacity, 64);
    }

    #[test]
    fn test_validation() {
        assert!(BillingConfig::new("").validate().is_err());
        assert!(BillingConfig::new("a")
            .with_sku_batch_size(21)
            .validate()
            .is_err());
        assert!(BillingConfig::new("a")
            .with_max_pending_purchases(0)
            .validate()
            .is_err());
        assert!(BillingConfig::from_json(r#"{"package_name":"a","sku_batch_size":0}"#).is_err());
        assert_eq!(
            BillingConfig::new("a").with_sku_batch_size(0).effective_batch_size(),
            1
        );
    }

    #[test]
    fn test_storefront_selection() {
        assert_eq!(
            Storefront::from_installer(Some("com.amazon.venezia")),
            Storefront::Amazon
        );
        assert_eq!(
            Storefront::from_installer(Some("com.android.vending")),
            Storefront::GooglePlay
        );
        assert_eq!(Storefront::from_installer(None), Storefront::GooglePlay);
        assert_eq!("Amazon".parse::<Storefront>().unwrap(), Storefront::Amazon);
        assert!("itunes".parse::<Storefront>().is_err());
    }
}
