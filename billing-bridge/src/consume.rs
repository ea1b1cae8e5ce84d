//! Consume flow.
//!
//! Consume calls block on the vendor side, so they run on one dedicated
//! worker task fed by a bounded queue. Every call produces exactly one
//! `ConsumeResult` event, plus a [`ConsumeTicket`] the caller may await.

use crate::config::{BillingConfig, Storefront};
use crate::connection::ConnectionManager;
use crate::events::{BillingEvent, ConsumeResult, EventSink};
use crate::metrics::BillingMetrics;
use crate::response_code::ResponseCode;
use crate::{reason, BillingError, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

struct ConsumeJob {
    token: String,
    reply: oneshot::Sender<ConsumeResult>,
}

enum TicketState {
    Ready(ConsumeResult),
    Queued(oneshot::Receiver<ConsumeResult>),
}

/// Handle to the outcome of one consume call.
///
/// The event is emitted regardless of whether the ticket is awaited.
pub struct ConsumeTicket {
    token: String,
    state: TicketState,
}

impl ConsumeTicket {
    fn ready(result: ConsumeResult) -> Self {
        Self {
            token: result.token.clone(),
            state: TicketState::Ready(result),
        }
    }

    /// Whether the call went through the worker.
    pub fn was_queued(&self) -> bool {
        matches!(self.state, TicketState::Queued(_))
    }

    pub async fn wait(self) -> ConsumeResult {
        match self.state {
            TicketState::Ready(result) => result,
            TicketState::Queued(rx) => rx
                .await
                .unwrap_or_else(|_| ConsumeResult::failure(self.token, reason::FAILED)),
        }
    }
}

pub struct ConsumeController {
    config: Arc<BillingConfig>,
    connection: Arc<ConnectionManager>,
    events: Arc<dyn EventSink>,
    metrics: Arc<BillingMetrics>,
    queue: mpsc::Sender<ConsumeJob>,
}

impl ConsumeController {
    /// Create the controller and spawn its worker on the current runtime.
    ///
    /// Fails with [`BillingError::Config`] outside a tokio runtime.
    pub fn new(
        config: Arc<BillingConfig>,
        connection: Arc<ConnectionManager>,
        events: Arc<dyn EventSink>,
        metrics: Arc<BillingMetrics>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| BillingError::Config("no tokio runtime".into()))?;
        let (queue, rx) = mpsc::channel(config.consume_queue_capacity.max(1));

        runtime.spawn(run_worker(
            rx,
            config.clone(),
            connection.clone(),
            events.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            connection,
            events,
            metrics,
            queue,
        })
    }

    /// Consume a purchase token.
    pub fn consume(&self, token: &str) -> ConsumeTicket {
        self.metrics.record_consume_requested();

        // Amazon consumables are fulfilled on delivery.
        if self.config.storefront == Storefront::Amazon {
            return self.finish_now(ConsumeResult::success(token));
        }

        if self.connection.current_handle().is_none() {
            self.metrics.record_service_unavailable();
            return self.finish_now(ConsumeResult::failure(token, reason::SERVICE));
        }

        let (reply, rx) = oneshot::channel();
        let job = ConsumeJob {
            token: token.to_string(),
            reply,
        };

        match self.queue.try_send(job) {
            Ok(()) => {
                debug!(token, "consume queued");
                ConsumeTicket {
                    token: token.to_string(),
                    state: TicketState::Queued(rx),
                }
            }
            Err(e) => {
                warn!(token, error = %e, "consume queue unavailable");
                self.finish_now(ConsumeResult::failure(token, reason::FAILED))
            }
        }
    }

    fn finish_now(&self, result: ConsumeResult) -> ConsumeTicket {
        record(&self.metrics, &result);
        self.events.emit(BillingEvent::Consume(result.clone()));
        ConsumeTicket::ready(result)
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<ConsumeJob>,
    config: Arc<BillingConfig>,
    connection: Arc<ConnectionManager>,
    events: Arc<dyn EventSink>,
    metrics: Arc<BillingMetrics>,
) {
    while let Some(job) = rx.recv().await {
        let result = consume_once(&config, &connection, &metrics, &job.token).await;
        record(&metrics, &result);
        events.emit(BillingEvent::Consume(result.clone()));
        // Ticket may have been dropped
        let _ = job.reply.send(result);
    }
    debug!("consume worker stopped");
}

async fn consume_once(
    config: &BillingConfig,
    connection: &ConnectionManager,
    metrics: &BillingMetrics,
    token: &str,
) -> ConsumeResult {
    let Some(handle) = connection.current_handle() else {
        metrics.record_service_unavailable();
        return ConsumeResult::failure(token, reason::SERVICE);
    };

    match handle
        .consume_purchase(config.api_version, &config.package_name, token)
        .await
    {
        Ok(code) => {
            let code = ResponseCode::from(code);
            if code.is_ok() {
                ConsumeResult::success(token)
            } else {
                debug!(token, %code, "consume declined");
                ConsumeResult::failure(token, reason::CANCEL)
            }
        }
        Err(e) => {
            warn!(token, error = %e, "consume call failed");
            ConsumeResult::failure(token, reason::FAILED)
        }
    }
}

fn record(metrics: &BillingMetrics, result: &ConsumeResult) {
    if result.is_success() {
        metrics.record_consume_succeeded();
    } else {
        metrics.record_consume_failed();
    }
}
