//! Smoke tests for billing-demo-cli
//!
//! These run the built binary against the in-process sandbox store.

use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_billing-demo"))
}

/// Run `billing-demo run` with the given stdin and parse stdout events.
fn run_session(args: &[&str], input: &str) -> Vec<Value> {
    let mut child = cli()
        .args(args)
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start billing-demo");

    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("Failed to write commands");

    let output = child.wait_with_output().expect("Failed to wait for billing-demo");
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        eprintln!("stdout: {}", stdout);
        eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    assert!(output.status.success(), "run should exit cleanly");

    stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("every stdout line is an event"))
        .collect()
}

fn names(events: &[Value]) -> Vec<&str> {
    events
        .iter()
        .map(|e| e["name"].as_str().unwrap_or_default())
        .collect()
}

/// Test that the CLI can show help
#[test]
fn test_cli_help() {
    let output = cli().arg("--help").output().expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("run"), "Help should mention 'run' command");
    assert!(stdout.contains("demo"), "Help should mention 'demo' command");
}

/// Test that the effective config honours the installer
#[test]
fn test_config_installer() {
    let output = cli()
        .args(["--installer", "com.amazon.venezia", "config"])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let config: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["storefront"], "amazon");
    assert_eq!(config["package_name"], "com.example.game");
    assert_eq!(config["purchase_tag_base"], 123450);
}

/// Test that a config file is loaded
#[test]
fn test_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"package_name":"com.file.app","max_pending_purchases":2}}"#).unwrap();

    let output = cli()
        .arg("--config")
        .arg(file.path())
        .arg("config")
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let config: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["package_name"], "com.file.app");
    assert_eq!(config["max_pending_purchases"], 2);
}

/// Test a full purchase session over stdin
#[test]
fn test_run_purchase_session() {
    let events = run_session(
        &[],
        r#"{"method":"isConnected"}
{"method":"purchase","params":{"sku":"android.test.purchased"}}
not a command
{"method":"getPurchases"}
{"method":"restoreCompleted"}
"#,
    );

    assert_eq!(
        names(&events),
        vec![
            "billingConnected",
            "billingConnected",
            "billingPurchase",
            "billingOwned",
            "billingRestore",
            "billingConnected",
        ]
    );
    assert_eq!(events[1]["connected"], true);
    assert_eq!(events[2]["sku"], "android.test.purchased");
    assert!(events[2]["token"].is_string());
    assert_eq!(events[3]["skus"][0], "android.test.purchased");
    assert_eq!(events[4]["failure"], "not implemented");
    assert_eq!(events[5]["connected"], false);
}

/// Test that failures surface as events
#[test]
fn test_run_failures() {
    let events = run_session(
        &[],
        r#"{"method":"purchase","params":{"sku":"android.test.canceled"}}
{"method":"purchase","params":{"sku":"android.test.item_unavailable"}}
{"method":"consume","params":{"token":"never-issued"}}
"#,
    );

    let failures: Vec<&str> = events
        .iter()
        .filter_map(|e| e["failure"].as_str())
        .collect();
    assert_eq!(failures, vec!["cancel", "failed", "cancel"]);
}

/// Test that the Amazon storefront is driven through the same commands
#[test]
fn test_run_amazon() {
    let events = run_session(
        &["--storefront", "amazon"],
        r#"{"method":"purchase","params":{"sku":"gems"}}
{"method":"consume","params":{"token":"anything"}}
"#,
    );

    let purchase = events
        .iter()
        .find(|e| e["name"] == "billingPurchase")
        .expect("purchase event");
    assert_eq!(purchase["sku"], "gems");
    assert!(purchase.get("failure").is_none());

    let consume = events
        .iter()
        .find(|e| e["name"] == "billingConsume")
        .expect("consume event");
    assert!(consume.get("failure").is_none());
}

/// Test that the scripted demo completes
#[test]
fn test_demo() {
    let output = cli().arg("demo").output().expect("Failed to execute command");
    if !output.status.success() {
        eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    assert!(output.status.success());
}
