//! Config command - print the effective session configuration

use anyhow::Result;
use billing_bridge::BillingConfig;

use crate::ui;

pub fn run(config: &BillingConfig, verbose: bool) -> Result<()> {
    if verbose {
        ui::header("Effective configuration");
        ui::key_value("Batch size", &config.effective_batch_size().to_string());
    }
    ui::json(&serde_json::to_value(config)?);
    Ok(())
}
