//! In-process homeserver used to drive the controller from the command line.
//!
//! Deleting a device always demands password re-authentication, and every
//! verification request completes on its own after a short delay.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use client_core::{CryptoService, ListenerId, VerificationService};
use shared::{
    domain::{CryptoDeviceInfo, DeviceId, DeviceInfo, TransactionId, TrustLevel, UserId},
    error::{ApiException, AuthFlow, ErrorCode, InteractiveAuthRequired, LOGIN_STAGE_PASSWORD},
    verification::{
        PendingVerificationRequest, TransactionKind, TransactionState, VerificationEvent,
        VerificationMethod, VerificationTransaction,
    },
};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Settings;

const SIMULATED_LATENCY: Duration = Duration::from_millis(25);

struct ServerState {
    devices: Vec<DeviceInfo>,
    trust: HashMap<DeviceId, TrustLevel>,
    auth_sessions: HashSet<String>,
    requests: HashMap<TransactionId, PendingVerificationRequest>,
    transactions: HashMap<TransactionId, VerificationTransaction>,
}

pub struct SimulatedHomeserver {
    me: Weak<Self>,
    user_id: UserId,
    password: String,
    verification_delay: Duration,
    state: Mutex<ServerState>,
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<VerificationEvent>>>,
    next_listener: AtomicU64,
}

impl SimulatedHomeserver {
    pub fn new(settings: &Settings) -> Arc<Self> {
        let user_id = UserId::new(settings.user_id.clone());
        let now = Utc::now();
        let mut devices = vec![
            DeviceInfo {
                device_id: DeviceId::new("PHONE01"),
                user_id: user_id.clone(),
                display_name: Some("Android phone".into()),
                last_seen_ip: Some("192.0.2.10".into()),
                last_seen_at: Some(now - chrono::Duration::hours(3)),
            },
            DeviceInfo {
                device_id: DeviceId::new("WEB0042"),
                user_id: user_id.clone(),
                display_name: Some("Web browser".into()),
                last_seen_ip: Some("198.51.100.7".into()),
                last_seen_at: Some(now - chrono::Duration::days(12)),
            },
        ];
        let mut trust = HashMap::new();
        if let Some(own) = &settings.device_id {
            let own = DeviceId::new(own.clone());
            trust.insert(own.clone(), TrustLevel::Verified);
            devices.insert(
                0,
                DeviceInfo {
                    device_id: own,
                    user_id: user_id.clone(),
                    display_name: Some("This device".into()),
                    last_seen_ip: Some("127.0.0.1".into()),
                    last_seen_at: Some(now),
                },
            );
        }

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            user_id,
            password: settings.account_password.clone(),
            verification_delay: settings.verification_delay(),
            state: Mutex::new(ServerState {
                devices,
                trust,
                auth_sessions: HashSet::new(),
                requests: HashMap::new(),
                transactions: HashMap::new(),
            }),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        })
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(&self, event: VerificationEvent) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.values() {
            let _ = listener.send(event.clone());
        }
    }

    fn not_found(device_id: &DeviceId) -> anyhow::Error {
        ApiException::new(ErrorCode::NotFound, format!("unknown device {device_id}")).into()
    }

    async fn complete_verification(self: Arc<Self>, transaction_id: TransactionId) {
        tokio::time::sleep(self.verification_delay).await;

        let (request, ready, verified, devices) = {
            let mut state = self.state();
            let Some(request) = state.requests.get_mut(&transaction_id) else {
                return;
            };
            request.is_ready = true;
            let request = request.clone();
            let Some(tx) = state.transactions.get_mut(&transaction_id) else {
                return;
            };
            tx.state = TransactionState::KeysExchanged;
            let ready = tx.clone();
            tx.state = TransactionState::Verified;
            let verified = tx.clone();
            let devices: Vec<DeviceId> = verified.other_device_id.iter().cloned().collect();
            for device_id in &devices {
                state.trust.insert(device_id.clone(), TrustLevel::Verified);
            }
            (request, ready, verified, devices)
        };

        self.broadcast(VerificationEvent::RequestUpdated(request));
        self.broadcast(VerificationEvent::TransactionUpdated(ready));
        info!(transaction_id = %transaction_id, ?devices, "simulated: verification completed");
        self.broadcast(VerificationEvent::TransactionUpdated(verified));
    }
}

#[async_trait]
impl CryptoService for SimulatedHomeserver {
    fn user_devices(&self, user_id: &UserId) -> Vec<CryptoDeviceInfo> {
        let state = self.state();
        state
            .devices
            .iter()
            .filter(|device| &device.user_id == user_id)
            .map(|device| CryptoDeviceInfo {
                device_id: device.device_id.clone(),
                user_id: device.user_id.clone(),
                display_name: device.display_name.clone(),
                trust: state
                    .trust
                    .get(&device.device_id)
                    .copied()
                    .unwrap_or(TrustLevel::Unverified),
                keys: vec![(
                    format!("ed25519:{}", device.device_id),
                    format!("simulated-key-{}", device.device_id),
                )],
            })
            .collect()
    }

    async fn devices_list(&self) -> Result<Vec<DeviceInfo>> {
        tokio::time::sleep(SIMULATED_LATENCY).await;
        Ok(self.state().devices.clone())
    }

    async fn download_keys(&self, user_ids: &[UserId], force_refresh: bool) -> Result<()> {
        tokio::time::sleep(SIMULATED_LATENCY).await;
        debug!(?user_ids, force_refresh, "simulated: keys downloaded");
        Ok(())
    }

    async fn set_device_name(&self, device_id: &DeviceId, name: &str) -> Result<()> {
        tokio::time::sleep(SIMULATED_LATENCY).await;
        let mut state = self.state();
        let device = state
            .devices
            .iter_mut()
            .find(|device| &device.device_id == device_id)
            .ok_or_else(|| Self::not_found(device_id))?;
        device.display_name = Some(name.to_string()).filter(|name| !name.is_empty());
        Ok(())
    }

    async fn delete_device(&self, device_id: &DeviceId) -> Result<()> {
        tokio::time::sleep(SIMULATED_LATENCY).await;
        let mut state = self.state();
        if !state.devices.iter().any(|device| &device.device_id == device_id) {
            return Err(Self::not_found(device_id));
        }
        let session = Uuid::new_v4().to_string();
        state.auth_sessions.insert(session.clone());
        Err(InteractiveAuthRequired {
            session,
            flows: vec![AuthFlow::new([LOGIN_STAGE_PASSWORD])],
        }
        .into())
    }

    async fn delete_device_with_user_password(
        &self,
        device_id: &DeviceId,
        auth_session: &str,
        password: &str,
    ) -> Result<()> {
        tokio::time::sleep(SIMULATED_LATENCY).await;
        let mut state = self.state();
        if !state.auth_sessions.remove(auth_session) {
            return Err(ApiException::new(ErrorCode::Unauthorized, "unknown auth session").into());
        }
        if password != self.password {
            return Err(ApiException::new(ErrorCode::Forbidden, "invalid password").into());
        }
        let before = state.devices.len();
        state.devices.retain(|device| &device.device_id != device_id);
        if state.devices.len() == before {
            return Err(Self::not_found(device_id));
        }
        state.trust.remove(device_id);
        Ok(())
    }

    async fn set_device_trust(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        trust: TrustLevel,
    ) -> Result<()> {
        if user_id != &self.user_id {
            return Err(anyhow!("cannot change trust of {user_id}: not our account"));
        }
        self.state().trust.insert(device_id.clone(), trust);
        Ok(())
    }
}

#[async_trait]
impl VerificationService for SimulatedHomeserver {
    fn add_listener(&self, listener: mpsc::UnboundedSender<VerificationEvent>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    async fn request_key_verification(
        &self,
        methods: &[VerificationMethod],
        user_id: &UserId,
        device_ids: &[DeviceId],
    ) -> Result<TransactionId> {
        let transaction_id = TransactionId::new(Uuid::new_v4().to_string());
        let other_device_id = device_ids.first().cloned();
        let request = PendingVerificationRequest {
            transaction_id: transaction_id.clone(),
            other_user_id: user_id.clone(),
            other_device_id: other_device_id.clone(),
            is_incoming: false,
            other_methods: methods.to_vec(),
            is_ready: false,
            is_finished: false,
        };
        let tx = VerificationTransaction {
            transaction_id: transaction_id.clone(),
            other_user_id: user_id.clone(),
            other_device_id,
            is_incoming: false,
            state: TransactionState::Started,
            kind: TransactionKind::Sas,
        };
        {
            let mut state = self.state();
            state.requests.insert(transaction_id.clone(), request);
            state.transactions.insert(transaction_id.clone(), tx.clone());
        }
        self.broadcast(VerificationEvent::TransactionCreated(tx));

        if let Some(server) = self.me.upgrade() {
            tokio::spawn(server.complete_verification(transaction_id.clone()));
        }
        Ok(transaction_id)
    }

    fn existing_verification_request(
        &self,
        _user_id: &UserId,
        transaction_id: &TransactionId,
    ) -> Option<PendingVerificationRequest> {
        self.state().requests.get(transaction_id).cloned()
    }

    fn existing_transaction(
        &self,
        _user_id: &UserId,
        transaction_id: &TransactionId,
    ) -> Option<VerificationTransaction> {
        self.state().transactions.get(transaction_id).cloned()
    }
}
