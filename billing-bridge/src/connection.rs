//! Connection lifecycle of the bound billing service.
//!
//! The manager is the only owner of the service handle. Controllers read it
//! through [`ConnectionManager::current_handle`], exactly once per operation,
//! and never hold the guard across a vendor call.

use crate::events::{BillingEvent, EventSink};
use crate::metrics::BillingMetrics;
use crate::service::{BillingService, ServiceBinder};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Pending,
    Connected,
}

enum ConnectionState {
    Disconnected,
    Pending,
    Connected(Arc<dyn BillingService>),
}

impl ConnectionState {
    fn status(&self) -> ConnectionStatus {
        match self {
            Self::Disconnected => ConnectionStatus::Disconnected,
            Self::Pending => ConnectionStatus::Pending,
            Self::Connected(_) => ConnectionStatus::Connected,
        }
    }
}

pub struct ConnectionManager {
    state: Mutex<ConnectionState>,
    binder: Arc<dyn ServiceBinder>,
    events: Arc<dyn EventSink>,
    metrics: Arc<BillingMetrics>,
}

impl ConnectionManager {
    pub fn new(
        binder: Arc<dyn ServiceBinder>,
        events: Arc<dyn EventSink>,
        metrics: Arc<BillingMetrics>,
    ) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            binder,
            events,
            metrics,
        }
    }

    /// Request a binding to the service.
    ///
    /// No-op while pending or connected. A binder error returns the state to
    /// disconnected.
    pub fn connect(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !matches!(*state, ConnectionState::Disconnected) {
                debug!(status = ?state.status(), "connect ignored");
                return;
            }
            *state = ConnectionState::Pending;
        }

        // The binder may report the connection before returning.
        if let Err(e) = self.binder.bind() {
            warn!(error = %e, "service bind failed");
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(*state, ConnectionState::Pending) {
                *state = ConnectionState::Disconnected;
            }
        }
    }

    /// Release the binding if one exists.
    pub fn disconnect(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };

        match previous {
            ConnectionState::Disconnected => {}
            ConnectionState::Pending => self.binder.unbind(),
            ConnectionState::Connected(_) => {
                self.binder.unbind();
                self.notify(false);
            }
        }
    }

    /// Binding notification from the platform.
    pub fn on_service_connected(&self, handle: Arc<dyn BillingService>) {
        let was_connected = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let was = matches!(*state, ConnectionState::Connected(_));
            *state = ConnectionState::Connected(handle);
            was
        };

        if was_connected {
            debug!("service handle replaced");
        } else {
            info!("billing service connected");
            self.notify(true);
        }
    }

    /// Unbinding notification from the platform. May arrive at any time.
    pub fn on_service_disconnected(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };

        if let ConnectionState::Connected(_) = previous {
            info!("billing service disconnected");
            self.notify(false);
        }
    }

    /// The live handle, or `None` if not connected.
    pub fn current_handle(&self) -> Option<Arc<dyn BillingService>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &*state {
            ConnectionState::Connected(handle) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .status()
    }

    fn notify(&self, connected: bool) {
        self.metrics.record_connection_change();
        self.events
            .emit(BillingEvent::ConnectionChanged { connected });
    }
}
