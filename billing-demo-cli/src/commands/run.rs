//! Run command - drive a session from JSON-line commands
//!
//! Each stdin line is one command, e.g.
//! `{"method":"purchase","params":{"sku":"android.test.purchased"}}`.
//! Every emitted event is written to stdout as one JSON line.

use anyhow::Result;
use billing_bridge::{BillingCommand, BillingConfig, ChannelSink, ConsumeTicket};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::SandboxHost;
use crate::ui;

pub async fn run(config: BillingConfig, verbose: bool) -> Result<()> {
    let (sink, mut events) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "failed to encode event"),
            }
        }
    });

    let mut host = SandboxHost::new(config, Arc::new(sink))?;
    host.session.connect();

    let mut tickets: Vec<ConsumeTicket> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut handled = 0usize;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let command = match BillingCommand::from_json(line) {
            Ok(command) => command,
            Err(e) => {
                ui::error(&format!("Ignoring command: {}", e));
                continue;
            }
        };

        match command {
            // Keep the ticket so queued consumes finish before exit
            BillingCommand::Consume { token } => tickets.push(host.session.consume(&token)),
            command => host.session.handle(command).await,
        }
        host.deliver_callbacks();
        handled += 1;
    }

    for ticket in tickets {
        ticket.wait().await;
    }

    if verbose {
        ui::info(&format!("Handled {} commands", handled));
        ui::info(&host.session.metrics().snapshot().to_json());
    }

    // Dropping the session closes the event channel
    drop(host);
    printer.await?;
    Ok(())
}
