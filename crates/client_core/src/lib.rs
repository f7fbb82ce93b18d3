use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{CryptoDeviceInfo, DeviceId, DeviceInfo, TransactionId, TrustLevel, UserId},
    verification::{
        PendingVerificationRequest, VerificationEvent, VerificationMethod,
        VerificationTransaction,
    },
};
use tokio::sync::mpsc;

mod async_state;
pub mod choose_method;
pub mod devices;
pub mod errors;
pub mod session_facade;
pub mod verification_bridge;
pub mod view_events;

pub use async_state::Async;
pub use choose_method::{ChooseMethodViewModel, VerificationChooseMethodState};
pub use devices::{
    DeviceListState, DevicesAction, DevicesConfig, DevicesController, DevicesViewEvent,
    PendingAuthContext,
};
pub use errors::{UiError, UiErrorCategory, UiErrorContext};
pub use session_facade::{MissingSessionSource, ReactiveSession, SessionSource, SessionUpdate};
pub use verification_bridge::{BridgeSignal, ListenerRegistration, VerificationBridge};
pub use view_events::{ViewEventStream, ViewEvents};

/// Handle returned by [`VerificationService::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Device and key management offered by the SDK's crypto module.
#[async_trait]
pub trait CryptoService: Send + Sync {
    /// Locally cached devices of `user_id`; never touches the network.
    fn user_devices(&self, user_id: &UserId) -> Vec<CryptoDeviceInfo>;
    /// Authoritative device list of the signed-in account.
    async fn devices_list(&self) -> Result<Vec<DeviceInfo>>;
    async fn download_keys(&self, user_ids: &[UserId], force_refresh: bool) -> Result<()>;
    async fn set_device_name(&self, device_id: &DeviceId, name: &str) -> Result<()>;
    async fn delete_device(&self, device_id: &DeviceId) -> Result<()>;
    async fn delete_device_with_user_password(
        &self,
        device_id: &DeviceId,
        auth_session: &str,
        password: &str,
    ) -> Result<()>;
    async fn set_device_trust(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        trust: TrustLevel,
    ) -> Result<()>;
}

/// The SDK's key-verification state machine, seen from the outside.
#[async_trait]
pub trait VerificationService: Send + Sync {
    fn add_listener(&self, listener: mpsc::UnboundedSender<VerificationEvent>) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
    async fn request_key_verification(
        &self,
        methods: &[VerificationMethod],
        user_id: &UserId,
        device_ids: &[DeviceId],
    ) -> Result<TransactionId>;
    fn existing_verification_request(
        &self,
        user_id: &UserId,
        transaction_id: &TransactionId,
    ) -> Option<PendingVerificationRequest>;
    fn existing_transaction(
        &self,
        user_id: &UserId,
        transaction_id: &TransactionId,
    ) -> Option<VerificationTransaction>;
}

pub struct MissingCryptoService;

#[async_trait]
impl CryptoService for MissingCryptoService {
    fn user_devices(&self, _user_id: &UserId) -> Vec<CryptoDeviceInfo> {
        Vec::new()
    }

    async fn devices_list(&self) -> Result<Vec<DeviceInfo>> {
        Err(anyhow!("crypto backend is unavailable"))
    }

    async fn download_keys(&self, _user_ids: &[UserId], _force_refresh: bool) -> Result<()> {
        Err(anyhow!("crypto backend is unavailable"))
    }

    async fn set_device_name(&self, device_id: &DeviceId, _name: &str) -> Result<()> {
        Err(anyhow!("crypto backend unavailable for device {device_id}"))
    }

    async fn delete_device(&self, device_id: &DeviceId) -> Result<()> {
        Err(anyhow!("crypto backend unavailable for device {device_id}"))
    }

    async fn delete_device_with_user_password(
        &self,
        device_id: &DeviceId,
        _auth_session: &str,
        _password: &str,
    ) -> Result<()> {
        Err(anyhow!("crypto backend unavailable for device {device_id}"))
    }

    async fn set_device_trust(
        &self,
        _user_id: &UserId,
        device_id: &DeviceId,
        _trust: TrustLevel,
    ) -> Result<()> {
        Err(anyhow!("crypto backend unavailable for device {device_id}"))
    }
}

/// Accepts listeners but never reports anything; every request fails.
pub struct MissingVerificationService;

#[async_trait]
impl VerificationService for MissingVerificationService {
    fn add_listener(&self, _listener: mpsc::UnboundedSender<VerificationEvent>) -> ListenerId {
        ListenerId(0)
    }

    fn remove_listener(&self, _id: ListenerId) {}

    async fn request_key_verification(
        &self,
        _methods: &[VerificationMethod],
        user_id: &UserId,
        _device_ids: &[DeviceId],
    ) -> Result<TransactionId> {
        Err(anyhow!("verification service is unavailable for {user_id}"))
    }

    fn existing_verification_request(
        &self,
        _user_id: &UserId,
        _transaction_id: &TransactionId,
    ) -> Option<PendingVerificationRequest> {
        None
    }

    fn existing_transaction(
        &self,
        _user_id: &UserId,
        _transaction_id: &TransactionId,
    ) -> Option<VerificationTransaction> {
        None
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
