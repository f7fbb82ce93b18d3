//! Intents accepted by the device list controller and the one-shot events it emits.

use shared::domain::{CryptoDeviceInfo, DeviceId, DeviceInfo, SessionInfo, TransactionId, UserId};
use zeroize::Zeroizing;

use crate::errors::UiError;

pub enum DevicesAction {
    Refresh,
    Retry,
    Delete(DeviceId),
    /// Answers a previous [`DevicesViewEvent::RequestPassword`].
    Password(Zeroizing<String>),
    Rename {
        device_id: DeviceId,
        new_name: String,
    },
    PromptRename(DeviceId),
    VerifyMyDevice(DeviceId),
    VerifyMyDeviceManually(DeviceId),
    MarkAsManuallyVerified(CryptoDeviceInfo),
    CompleteSecurity,
}

impl DevicesAction {
    pub fn name(&self) -> &'static str {
        match self {
            DevicesAction::Refresh => "refresh",
            DevicesAction::Retry => "retry",
            DevicesAction::Delete(_) => "delete",
            DevicesAction::Password(_) => "password",
            DevicesAction::Rename { .. } => "rename",
            DevicesAction::PromptRename(_) => "prompt_rename",
            DevicesAction::VerifyMyDevice(_) => "verify_my_device",
            DevicesAction::VerifyMyDeviceManually(_) => "verify_my_device_manually",
            DevicesAction::MarkAsManuallyVerified(_) => "mark_as_manually_verified",
            DevicesAction::CompleteSecurity => "complete_security",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicesViewEvent {
    Loading(Option<String>),
    Failure(UiError),
    RequestPassword,
    PromptRenameDevice(DeviceInfo),
    ShowVerifyDevice {
        user_id: UserId,
        transaction_id: TransactionId,
    },
    SelfVerification(SessionInfo),
    ShowManuallyVerify(CryptoDeviceInfo),
}
