//! Which verification methods the user can pick for an ongoing request.
//!
//! Capability flags follow request updates; the QR payload follows
//! transaction updates. The two arrive on separate signals and are kept apart.

use std::sync::Arc;

use shared::{
    domain::{TransactionId, UserId},
    verification::{PendingVerificationRequest, VerificationMethod, VerificationTransaction},
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::debug;

use crate::{
    verification_bridge::{BridgeSignal, VerificationBridge},
    VerificationService,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationChooseMethodState {
    pub other_user_id: UserId,
    pub transaction_id: TransactionId,
    pub other_can_show_qr_code: bool,
    pub other_can_scan_qr_code: bool,
    pub sas_mode_available: bool,
    pub qr_code_text: Option<String>,
}

impl VerificationChooseMethodState {
    pub fn new(other_user_id: UserId, transaction_id: TransactionId) -> Self {
        Self {
            other_user_id,
            transaction_id,
            other_can_show_qr_code: false,
            other_can_scan_qr_code: false,
            sas_mode_available: false,
            qr_code_text: None,
        }
    }

    /// Snapshot of what the service currently knows about the transaction.
    pub fn initial(
        service: &dyn VerificationService,
        other_user_id: UserId,
        transaction_id: TransactionId,
    ) -> Self {
        let request = service.existing_verification_request(&other_user_id, &transaction_id);
        let qr_code_text = service
            .existing_transaction(&other_user_id, &transaction_id)
            .and_then(|tx| tx.qr_text().map(str::to_owned));

        Self {
            qr_code_text,
            ..Self::new(other_user_id, transaction_id).with_capabilities(request.as_ref())
        }
    }

    fn with_capabilities(self, request: Option<&PendingVerificationRequest>) -> Self {
        let offers = |method| request.is_some_and(|request| request.offers(method));
        Self {
            other_can_show_qr_code: offers(VerificationMethod::QrCodeShow),
            other_can_scan_qr_code: offers(VerificationMethod::QrCodeScan),
            sas_mode_available: offers(VerificationMethod::Sas),
            ..self
        }
    }

    pub fn on_request_updated(self, request: &PendingVerificationRequest) -> Self {
        if request.transaction_id != self.transaction_id
            || request.other_user_id != self.other_user_id
        {
            return self;
        }
        self.with_capabilities(Some(request))
    }

    pub fn on_transaction_updated(self, tx: &VerificationTransaction) -> Self {
        if tx.transaction_id != self.transaction_id
            || tx.other_user_id != self.other_user_id
            || !tx.is_qr_code()
        {
            return self;
        }
        Self {
            qr_code_text: tx.qr_text().map(str::to_owned),
            ..self
        }
    }

    pub fn reduce(self, signal: &BridgeSignal) -> Self {
        match signal {
            BridgeSignal::Transaction(tx) => self.on_transaction_updated(tx),
            BridgeSignal::Request(request) => self.on_request_updated(request),
        }
    }
}

/// Keeps a [`VerificationChooseMethodState`] current for as long as it lives.
pub struct ChooseMethodViewModel {
    state: watch::Receiver<VerificationChooseMethodState>,
    task: JoinHandle<()>,
}

impl ChooseMethodViewModel {
    pub fn spawn(
        service: Arc<dyn VerificationService>,
        other_user_id: UserId,
        transaction_id: TransactionId,
    ) -> Self {
        // Attach before reading the snapshot so no update slips in between.
        let mut bridge = VerificationBridge::attach(Arc::clone(&service));
        let initial =
            VerificationChooseMethodState::initial(service.as_ref(), other_user_id, transaction_id);
        let (state_tx, state_rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            while let Some(signal) = bridge.next().await {
                state_tx.send_if_modified(|state| {
                    let next = state.clone().reduce(&signal);
                    if next == *state {
                        return false;
                    }
                    *state = next;
                    true
                });
                if let BridgeSignal::Transaction(tx) = &signal {
                    let tracked = state_tx.borrow();
                    if tx.transaction_id == tracked.transaction_id
                        && tx.other_user_id == tracked.other_user_id
                        && tx.state.is_terminal()
                    {
                        debug!(transaction_id = %tx.transaction_id, "verification: transaction over, releasing listener");
                        break;
                    }
                }
            }
            debug!("verification: choose-method listener closed");
        });

        Self {
            state: state_rx,
            task,
        }
    }

    pub fn state(&self) -> VerificationChooseMethodState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<VerificationChooseMethodState> {
        self.state.clone()
    }
}

impl Drop for ChooseMethodViewModel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/choose_method_tests.rs"]
mod tests;
