//! Terminal UI utilities
//!
//! Everything here writes to stderr except [`json`], so stdout stays clean
//! for event output.

use billing_bridge::BillingEvent;
use colored::Colorize;

/// Print a success message
pub fn success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print a section header
pub fn header(text: &str) {
    eprintln!("\n{}", text.bold().underline());
}

/// Print a key-value pair
pub fn key_value(key: &str, value: &str) {
    eprintln!("  {}: {}", key.cyan(), value);
}

/// Print a separator line
pub fn separator() {
    eprintln!("{}", "─".repeat(60).dimmed());
}

/// Print JSON prettily to stdout
pub fn json(value: &serde_json::Value) {
    if let Ok(pretty) = serde_json::to_string_pretty(value) {
        println!("{}", pretty);
    }
}

/// Summarize one billing event
pub fn event(event: &BillingEvent) {
    let name = event.name();
    match event.failure() {
        Some(reason) => warning(&format!("{} failed: {}", name, reason)),
        None => success(name),
    }

    match event {
        BillingEvent::ConnectionChanged { connected } => {
            key_value("connected", &connected.to_string());
        }
        BillingEvent::Purchase(result) => {
            if let Some(sku) = &result.sku {
                key_value("sku", sku);
            }
            if let Some(token) = &result.token {
                key_value("token", token);
            }
        }
        BillingEvent::Consume(result) => key_value("token", &result.token),
        BillingEvent::OwnedItems(result) => {
            for (sku, token) in result.skus.iter().zip(&result.tokens) {
                key_value(sku, token);
            }
            if let Some(next) = &result.continuation_token {
                key_value("continuation", next);
            }
        }
        BillingEvent::PurchasesLocalized(result) => {
            for i in 0..result.len() {
                key_value(
                    &result.skus[i],
                    &format!(
                        "{} ({} {})",
                        result.titles[i], result.prices[i], result.currency_codes[i]
                    ),
                );
            }
        }
        BillingEvent::Restore(_) => {}
    }
}
