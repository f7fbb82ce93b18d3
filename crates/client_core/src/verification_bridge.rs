//! Scoped subscription to the verification service's lifecycle events.

use std::sync::Arc;

use shared::verification::{PendingVerificationRequest, VerificationEvent, VerificationTransaction};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{ListenerId, VerificationService};

/// Detaches the listener when dropped, including during unwinding.
pub struct ListenerRegistration {
    service: Arc<dyn VerificationService>,
    id: ListenerId,
}

impl ListenerRegistration {
    pub fn register(
        service: Arc<dyn VerificationService>,
    ) -> (Self, mpsc::UnboundedReceiver<VerificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = service.add_listener(tx);
        debug!(listener = id.0, "verification: listener attached");
        (Self { service, id }, rx)
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.service.remove_listener(self.id);
        debug!(listener = self.id.0, "verification: listener detached");
    }
}

/// What a screen needs to know; creation and update of a transaction look the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeSignal {
    Transaction(VerificationTransaction),
    Request(PendingVerificationRequest),
}

impl From<VerificationEvent> for BridgeSignal {
    fn from(event: VerificationEvent) -> Self {
        match event {
            VerificationEvent::TransactionCreated(tx) | VerificationEvent::TransactionUpdated(tx) => {
                Self::Transaction(tx)
            }
            VerificationEvent::RequestUpdated(request) => Self::Request(request),
        }
    }
}

pub struct VerificationBridge {
    events: mpsc::UnboundedReceiver<VerificationEvent>,
    registration: ListenerRegistration,
}

impl VerificationBridge {
    pub fn attach(service: Arc<dyn VerificationService>) -> Self {
        let (registration, events) = ListenerRegistration::register(service);
        Self {
            events,
            registration,
        }
    }

    /// `None` once the service dropped its side of the listener.
    pub async fn next(&mut self) -> Option<BridgeSignal> {
        self.events.recv().await.map(BridgeSignal::from)
    }

    pub fn listener_id(&self) -> ListenerId {
        self.registration.id()
    }
}

#[cfg(test)]
#[path = "tests/verification_bridge_tests.rs"]
mod tests;
