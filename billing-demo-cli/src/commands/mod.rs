//! CLI command implementations

pub mod config;
pub mod demo;
pub mod run;

use anyhow::{Context, Result};
use billing_bridge::sandbox::{SandboxAmazon, SandboxBinder, SandboxLauncher, SandboxStore};
use billing_bridge::{
    ActivityResult, AmazonPurchaseResponse, BillingConfig, BillingSession, EventSink, Storefront,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Package name used when neither the config file nor the flags set one.
pub const DEFAULT_PACKAGE: &str = "com.example.game";

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub package: Option<String>,
    pub storefront: Option<String>,
    pub installer: Option<String>,
}

/// Load the session configuration.
///
/// `--storefront` wins over `--installer`; both win over the file.
pub fn load_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<BillingConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            BillingConfig::from_json(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => BillingConfig::new(DEFAULT_PACKAGE),
    };

    if let Some(package) = overrides.package {
        config.package_name = package;
    }
    if let Some(installer) = overrides.installer.as_deref() {
        config.storefront = Storefront::from_installer(Some(installer));
    }
    if let Some(storefront) = overrides.storefront.as_deref() {
        config.storefront = storefront.parse()?;
    }

    config.validate()?;
    Ok(config)
}

/// A session wired to the sandbox store, playing the host platform.
pub struct SandboxHost {
    pub session: BillingSession,
    pub store: Arc<SandboxStore>,
    activity_results: UnboundedReceiver<ActivityResult>,
    amazon_responses: UnboundedReceiver<AmazonPurchaseResponse>,
}

impl SandboxHost {
    pub fn new(config: BillingConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        let store = SandboxStore::new(config.package_name.clone());
        let binder = SandboxBinder::new(store.clone());
        let (launcher, activity_results) = SandboxLauncher::new(store.clone());
        let (amazon, amazon_responses) = SandboxAmazon::new(store.clone());

        let session = BillingSession::new(config, binder.clone(), launcher, events)?
            .with_amazon(amazon);
        binder.attach(session.connection());

        Ok(Self {
            session,
            store,
            activity_results,
            amazon_responses,
        })
    }

    /// Hand every finished purchase UI back to the session.
    pub fn deliver_callbacks(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(result) = self.activity_results.try_recv() {
            self.session.on_activity_result(result);
            delivered += 1;
        }
        while let Ok(response) = self.amazon_responses.try_recv() {
            self.session.on_amazon_purchase_response(response);
            delivered += 1;
        }
        delivered
    }
}
