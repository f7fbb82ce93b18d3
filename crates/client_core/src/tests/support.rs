use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{CryptoDeviceInfo, DeviceId, DeviceInfo, TransactionId, TrustLevel, UserId},
    error::{AuthFlow, InteractiveAuthRequired, LOGIN_STAGE_PASSWORD},
    verification::{
        PendingVerificationRequest, TransactionKind, TransactionState, VerificationEvent,
        VerificationMethod, VerificationTransaction,
    },
};
use tokio::sync::{mpsc, Semaphore};

use crate::{CryptoService, ListenerId, VerificationService};

pub(crate) const ALICE: &str = "@alice:example.org";
pub(crate) const MY_DEVICE: &str = "ALICEPHONE";

/// Scripted result of a single SDK call.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Ok,
    Fail(String),
    NeedsAuth { session: String, password: bool },
    Panic,
}

impl Outcome {
    fn into_result(self) -> Result<()> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::Fail(message) => Err(anyhow!(message)),
            Outcome::Panic => panic!("sdk blew up"),
            Outcome::NeedsAuth { session, password } => {
                let stages = if password {
                    vec![LOGIN_STAGE_PASSWORD]
                } else {
                    vec!["m.login.sso"]
                };
                Err(InteractiveAuthRequired {
                    session,
                    flows: vec![AuthFlow::new(stages)],
                }
                .into())
            }
        }
    }
}

pub(crate) fn crypto_device(id: &str, trust: TrustLevel) -> CryptoDeviceInfo {
    CryptoDeviceInfo {
        device_id: DeviceId::new(id),
        user_id: UserId::new(ALICE),
        display_name: Some(format!("{id} (cached)")),
        trust,
        keys: vec![(format!("ed25519:{id}"), format!("key-{id}"))],
    }
}

pub(crate) fn server_device(id: &str, name: &str) -> DeviceInfo {
    DeviceInfo {
        device_id: DeviceId::new(id),
        user_id: UserId::new(ALICE),
        display_name: Some(name.to_string()),
        last_seen_ip: Some("10.0.0.1".into()),
        last_seen_at: None,
    }
}

pub(crate) fn transaction(
    id: &str,
    state: TransactionState,
    kind: TransactionKind,
) -> VerificationTransaction {
    VerificationTransaction {
        transaction_id: TransactionId::new(id),
        other_user_id: UserId::new(ALICE),
        other_device_id: Some(DeviceId::new("ALICELAPTOP")),
        is_incoming: false,
        state,
        kind,
    }
}

pub(crate) fn request(id: &str, methods: &[VerificationMethod]) -> PendingVerificationRequest {
    PendingVerificationRequest {
        transaction_id: TransactionId::new(id),
        other_user_id: UserId::new(ALICE),
        other_device_id: Some(DeviceId::new("ALICELAPTOP")),
        is_incoming: false,
        other_methods: methods.to_vec(),
        is_ready: true,
        is_finished: false,
    }
}

pub(crate) struct FakeSdk {
    pub local_devices: Mutex<Vec<CryptoDeviceInfo>>,
    /// Replaces `local_devices` once keys were downloaded.
    pub local_devices_after_download: Mutex<Option<Vec<CryptoDeviceInfo>>>,
    pub server_devices: Mutex<Vec<DeviceInfo>>,
    pub devices_list_fail_with: Mutex<Option<String>>,
    pub download_keys_fail_with: Mutex<Option<String>>,
    pub delete_outcomes: Mutex<VecDeque<Outcome>>,
    pub password_outcomes: Mutex<VecDeque<Outcome>>,
    pub rename_outcomes: Mutex<VecDeque<Outcome>>,
    pub trust_outcomes: Mutex<VecDeque<Outcome>>,
    pub devices_gate: Option<Arc<Semaphore>>,
    /// Number of upcoming `devices_list` calls that panic.
    pub devices_list_panics: AtomicUsize,
    pub devices_list_calls: AtomicUsize,
    pub download_keys_calls: AtomicUsize,
    pub deletes: Mutex<Vec<DeviceId>>,
    pub password_deletes: Mutex<Vec<(DeviceId, String, String)>>,
    pub renames: Mutex<Vec<(DeviceId, String)>>,
    pub trust_updates: Mutex<Vec<(DeviceId, TrustLevel)>>,
    pub verification_requests: Mutex<Vec<(Vec<VerificationMethod>, UserId, Vec<DeviceId>)>>,
    pub verification_fail_with: Mutex<Option<String>>,
    pub requests: Mutex<HashMap<TransactionId, PendingVerificationRequest>>,
    pub transactions: Mutex<HashMap<TransactionId, VerificationTransaction>>,
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<VerificationEvent>>>,
    next_listener: AtomicU64,
}

impl FakeSdk {
    pub fn new() -> Self {
        Self {
            local_devices: Mutex::new(vec![
                crypto_device(MY_DEVICE, TrustLevel::Verified),
                crypto_device("ALICELAPTOP", TrustLevel::Unverified),
            ]),
            local_devices_after_download: Mutex::new(None),
            server_devices: Mutex::new(vec![
                server_device(MY_DEVICE, "Phone"),
                server_device("ALICELAPTOP", "Laptop"),
            ]),
            devices_list_fail_with: Mutex::new(None),
            download_keys_fail_with: Mutex::new(None),
            delete_outcomes: Mutex::new(VecDeque::new()),
            password_outcomes: Mutex::new(VecDeque::new()),
            rename_outcomes: Mutex::new(VecDeque::new()),
            trust_outcomes: Mutex::new(VecDeque::new()),
            devices_gate: None,
            devices_list_panics: AtomicUsize::new(0),
            devices_list_calls: AtomicUsize::new(0),
            download_keys_calls: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
            password_deletes: Mutex::new(Vec::new()),
            renames: Mutex::new(Vec::new()),
            trust_updates: Mutex::new(Vec::new()),
            verification_requests: Mutex::new(Vec::new()),
            verification_fail_with: Mutex::new(None),
            requests: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// `devices_list` waits for a permit on the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut sdk = Self::new();
        sdk.devices_gate = Some(Arc::clone(&gate));
        (sdk, gate)
    }

    pub fn script_delete(&self, outcome: Outcome) {
        self.delete_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn script_password(&self, outcome: Outcome) {
        self.password_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn script_rename(&self, outcome: Outcome) {
        self.rename_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn script_trust(&self, outcome: Outcome) {
        self.trust_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn devices_list_calls(&self) -> usize {
        self.devices_list_calls.load(Ordering::SeqCst)
    }

    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.lock().unwrap().contains_key(&id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn emit(&self, event: VerificationEvent) {
        for listener in self.listeners.lock().unwrap().values() {
            let _ = listener.send(event.clone());
        }
    }

    fn next_outcome(queue: &Mutex<VecDeque<Outcome>>) -> Outcome {
        queue.lock().unwrap().pop_front().unwrap_or(Outcome::Ok)
    }
}

#[async_trait]
impl CryptoService for FakeSdk {
    fn user_devices(&self, _user_id: &UserId) -> Vec<CryptoDeviceInfo> {
        self.local_devices.lock().unwrap().clone()
    }

    async fn devices_list(&self) -> Result<Vec<DeviceInfo>> {
        self.devices_list_calls.fetch_add(1, Ordering::SeqCst);
        let panics = self
            .devices_list_panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if panics.is_ok() {
            panic!("device list call blew up");
        }
        if let Some(gate) = &self.devices_gate {
            gate.acquire().await.expect("gate open").forget();
        }
        if let Some(err) = self.devices_list_fail_with.lock().unwrap().clone() {
            return Err(anyhow!(err));
        }
        Ok(self.server_devices.lock().unwrap().clone())
    }

    async fn download_keys(&self, _user_ids: &[UserId], _force_refresh: bool) -> Result<()> {
        self.download_keys_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(updated) = self.local_devices_after_download.lock().unwrap().take() {
            *self.local_devices.lock().unwrap() = updated;
        }
        if let Some(err) = self.download_keys_fail_with.lock().unwrap().clone() {
            return Err(anyhow!(err));
        }
        Ok(())
    }

    async fn set_device_name(&self, device_id: &DeviceId, name: &str) -> Result<()> {
        self.renames
            .lock()
            .unwrap()
            .push((device_id.clone(), name.to_string()));
        Self::next_outcome(&self.rename_outcomes).into_result()?;
        for device in self.server_devices.lock().unwrap().iter_mut() {
            if &device.device_id == device_id {
                device.display_name = Some(name.to_string());
            }
        }
        Ok(())
    }

    async fn delete_device(&self, device_id: &DeviceId) -> Result<()> {
        self.deletes.lock().unwrap().push(device_id.clone());
        Self::next_outcome(&self.delete_outcomes).into_result()
    }

    async fn delete_device_with_user_password(
        &self,
        device_id: &DeviceId,
        auth_session: &str,
        password: &str,
    ) -> Result<()> {
        self.password_deletes.lock().unwrap().push((
            device_id.clone(),
            auth_session.to_string(),
            password.to_string(),
        ));
        Self::next_outcome(&self.password_outcomes).into_result()?;
        self.server_devices
            .lock()
            .unwrap()
            .retain(|device| &device.device_id != device_id);
        Ok(())
    }

    async fn set_device_trust(
        &self,
        _user_id: &UserId,
        device_id: &DeviceId,
        trust: TrustLevel,
    ) -> Result<()> {
        self.trust_updates
            .lock()
            .unwrap()
            .push((device_id.clone(), trust));
        Self::next_outcome(&self.trust_outcomes).into_result()?;
        for device in self.local_devices.lock().unwrap().iter_mut() {
            if &device.device_id == device_id {
                device.trust = trust;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VerificationService for FakeSdk {
    fn add_listener(&self, listener: mpsc::UnboundedSender<VerificationEvent>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().unwrap().insert(id, listener);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().unwrap().remove(&id);
    }

    async fn request_key_verification(
        &self,
        methods: &[VerificationMethod],
        user_id: &UserId,
        device_ids: &[DeviceId],
    ) -> Result<TransactionId> {
        self.verification_requests.lock().unwrap().push((
            methods.to_vec(),
            user_id.clone(),
            device_ids.to_vec(),
        ));
        if let Some(err) = self.verification_fail_with.lock().unwrap().clone() {
            return Err(anyhow!(err));
        }
        let count = self.verification_requests.lock().unwrap().len();
        Ok(TransactionId::new(format!("txn-{count}")))
    }

    fn existing_verification_request(
        &self,
        _user_id: &UserId,
        transaction_id: &TransactionId,
    ) -> Option<PendingVerificationRequest> {
        self.requests.lock().unwrap().get(transaction_id).cloned()
    }

    fn existing_transaction(
        &self,
        _user_id: &UserId,
        transaction_id: &TransactionId,
    ) -> Option<VerificationTransaction> {
        self.transactions.lock().unwrap().get(transaction_id).cloned()
    }
}

pub(crate) fn qr_transaction(id: &str, state: TransactionState, qr: Option<&str>) -> VerificationTransaction {
    transaction(
        id,
        state,
        TransactionKind::QrCode {
            qr_text: qr.map(str::to_string),
        },
    )
}
