//! Demo command - scripted walk through every billing operation

use anyhow::Result;
use billing_bridge::sandbox::{
    TEST_CANCELED, TEST_ITEM_UNAVAILABLE, TEST_PURCHASED, TEST_REFUNDED,
};
use billing_bridge::{BillingConfig, BillingEvent, CallbackSink, Storefront};
use std::sync::Arc;

use super::SandboxHost;
use crate::ui;

pub async fn run(config: BillingConfig, verbose: bool) -> Result<()> {
    ui::header("Billing Sandbox Demo");
    ui::key_value("Package", &config.package_name);
    ui::key_value("Storefront", config.storefront.as_str());
    let storefront = config.storefront;

    let sink = CallbackSink::new(Arc::new(|event: &BillingEvent| ui::event(event)));
    let mut host = SandboxHost::new(config, Arc::new(sink))?;

    ui::separator();
    ui::info("Connecting to the billing service");
    host.session.connect();

    let catalog: Vec<String> = [TEST_PURCHASED, TEST_CANCELED, TEST_REFUNDED]
        .iter()
        .map(|s| s.to_string())
        .collect();

    ui::separator();
    ui::info("Localizing the catalog");
    host.session.localize_purchases(&catalog).await;

    ui::separator();
    let purchases = match storefront {
        Storefront::GooglePlay => vec![
            TEST_PURCHASED,
            TEST_CANCELED,
            TEST_ITEM_UNAVAILABLE,
            TEST_PURCHASED,
        ],
        Storefront::Amazon => vec!["gems", "item_unavailable", "gems"],
    };
    for sku in purchases {
        ui::info(&format!("Purchasing {}", sku));
        if host.session.purchase(sku).await.is_ok() {
            host.deliver_callbacks();
        }
    }

    ui::separator();
    ui::info("Querying owned items");
    let owned = host.session.get_purchases(None).await;

    ui::separator();
    for token in &owned.tokens {
        ui::info("Consuming purchase");
        host.session.consume(token).wait().await;
    }

    ui::separator();
    host.session.restore_completed();

    if verbose {
        ui::header("Metrics");
        let snapshot = host.session.metrics().snapshot();
        ui::json(&serde_json::to_value(&snapshot)?);
    }

    ui::separator();
    ui::success(&format!(
        "Demo finished, {} item(s) still owned",
        host.store.owned_skus().len()
    ));
    Ok(())
}
