use serde::{Deserialize, Serialize};

use crate::domain::{DeviceId, TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Sas,
    QrCodeShow,
    QrCodeScan,
    Reciprocate,
}

/// Snapshot of a key-verification request as the verification service sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingVerificationRequest {
    pub transaction_id: TransactionId,
    pub other_user_id: UserId,
    pub other_device_id: Option<DeviceId>,
    pub is_incoming: bool,
    /// Methods the other side advertised when it accepted the request.
    pub other_methods: Vec<VerificationMethod>,
    pub is_ready: bool,
    pub is_finished: bool,
}

impl PendingVerificationRequest {
    pub fn offers(&self, method: VerificationMethod) -> bool {
        self.other_methods.contains(&method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    User,
    Timeout,
    MismatchedKeys,
    MismatchedSas,
    UnexpectedMessage,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionState {
    Started,
    Ready,
    KeysExchanged,
    WaitingForConfirmation,
    Verified,
    Cancelled { reason: CancelReason, by_me: bool },
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Cancelled { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionKind {
    Sas,
    QrCode { qr_text: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTransaction {
    pub transaction_id: TransactionId,
    pub other_user_id: UserId,
    pub other_device_id: Option<DeviceId>,
    pub is_incoming: bool,
    pub state: TransactionState,
    pub kind: TransactionKind,
}

impl VerificationTransaction {
    /// `Some` only for QR-capable transactions that already produced a payload.
    pub fn qr_text(&self) -> Option<&str> {
        match &self.kind {
            TransactionKind::QrCode { qr_text } => qr_text.as_deref(),
            TransactionKind::Sas => None,
        }
    }

    pub fn is_qr_code(&self) -> bool {
        matches!(self.kind, TransactionKind::QrCode { .. })
    }
}

/// Everything the verification service reports to its listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent {
    TransactionCreated(VerificationTransaction),
    TransactionUpdated(VerificationTransaction),
    RequestUpdated(PendingVerificationRequest),
}
