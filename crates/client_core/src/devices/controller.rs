use std::{collections::VecDeque, panic::AssertUnwindSafe, sync::Arc};

use anyhow::{anyhow, Context, Result};
use futures::FutureExt;
use shared::{
    domain::{CryptoDeviceInfo, DeviceId, DeviceInfo, SessionInfo, TransactionId, TrustLevel},
    error::InteractiveAuthRequired,
    verification::{TransactionState, VerificationMethod},
};
use tokio::{
    sync::{mpsc, watch},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::{
    events::{DevicesAction, DevicesViewEvent},
    state::{reduce, DeviceListState, PendingAuthContext, StateChange},
};
use crate::{
    errors::{UiError, UiErrorContext},
    verification_bridge::{BridgeSignal, VerificationBridge},
    view_events::{ViewEventStream, ViewEvents},
    CryptoService, VerificationService,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicesConfig {
    /// Methods advertised when this device starts a verification request.
    pub supported_methods: Vec<VerificationMethod>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            supported_methods: vec![
                VerificationMethod::Sas,
                VerificationMethod::QrCodeShow,
                VerificationMethod::QrCodeScan,
                VerificationMethod::Reciprocate,
            ],
        }
    }
}

/// Owner of the device list screen state.
///
/// All mutation happens on one task. SDK calls run on child tasks and report
/// back through a channel, so dropping the controller detaches the
/// verification listener and discards any result still in flight.
pub struct DevicesController {
    actions: mpsc::UnboundedSender<DevicesAction>,
    state: watch::Receiver<DeviceListState>,
    events: Arc<ViewEvents<DevicesViewEvent>>,
    task: JoinHandle<()>,
}

impl DevicesController {
    pub fn spawn(
        session: SessionInfo,
        crypto: Arc<dyn CryptoService>,
        verification: Arc<dyn VerificationService>,
        config: DevicesConfig,
    ) -> Self {
        let initial = DeviceListState::new(session.device_id.clone());
        let (state_tx, state_rx) = watch::channel(initial.clone());
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let events = Arc::new(ViewEvents::new());
        let bridge = VerificationBridge::attach(Arc::clone(&verification));

        let actor = DevicesActor {
            session,
            crypto,
            verification,
            config,
            state: initial,
            state_tx,
            events: Arc::clone(&events),
            pending_auth: None,
            refresh: RefreshTracker::default(),
            refreshed_transactions: RecentTransactions::new(RecentTransactions::CAPACITY),
            completions: completions_tx,
            tasks: JoinSet::new(),
        };
        let task = tokio::spawn(actor.run(actions_rx, completions_rx, bridge));

        Self {
            actions: actions_tx,
            state: state_rx,
            events,
            task,
        }
    }

    pub fn handle(&self, action: DevicesAction) {
        let name = action.name();
        if self.actions.send(action).is_err() {
            warn!(action = name, "devices: controller stopped, dropping action");
        }
    }

    pub fn state(&self) -> DeviceListState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DeviceListState> {
        self.state.clone()
    }

    pub fn subscribe_events(&self) -> ViewEventStream<DevicesViewEvent> {
        self.events.subscribe()
    }
}

impl Drop for DevicesController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Completion {
    DevicesFetched(Result<Vec<DeviceInfo>>),
    KeysDownloaded(Result<()>),
    Deleted {
        device_id: DeviceId,
        result: Result<()>,
    },
    DeletedWithPassword(Result<()>),
    Renamed(Result<()>),
    VerificationRequested(Result<TransactionId>),
    TrustUpdated(Result<()>),
}

#[derive(Default)]
struct RefreshTracker {
    in_flight: Option<RefreshCycle>,
    /// At most one follow-up cycle is queued however many refreshes were asked for.
    queued: bool,
}

/// Verified transactions that already triggered a refresh, oldest first.
struct RecentTransactions {
    ids: VecDeque<TransactionId>,
    capacity: usize,
}

impl RecentTransactions {
    const CAPACITY: usize = 64;

    fn new(capacity: usize) -> Self {
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns `false` if `id` is already remembered.
    fn insert(&mut self, id: &TransactionId) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.ids.len() == self.capacity {
            self.ids.pop_front();
        }
        self.ids.push_back(id.clone());
        true
    }
}

#[derive(Default)]
struct RefreshCycle {
    devices_done: bool,
    keys_done: bool,
    failure: Option<UiError>,
}

struct DevicesActor {
    session: SessionInfo,
    crypto: Arc<dyn CryptoService>,
    verification: Arc<dyn VerificationService>,
    config: DevicesConfig,
    state: DeviceListState,
    state_tx: watch::Sender<DeviceListState>,
    events: Arc<ViewEvents<DevicesViewEvent>>,
    pending_auth: Option<PendingAuthContext>,
    refresh: RefreshTracker,
    refreshed_transactions: RecentTransactions,
    completions: mpsc::UnboundedSender<Completion>,
    tasks: JoinSet<()>,
}

impl DevicesActor {
    async fn run(
        mut self,
        mut actions: mpsc::UnboundedReceiver<DevicesAction>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        mut bridge: VerificationBridge,
    ) {
        debug!(listener = ?bridge.listener_id(), "devices: verification listener attached");
        self.refresh_devices();
        let mut bridge_open = true;

        loop {
            tokio::select! {
                action = actions.recv() => match action {
                    Some(action) => self.on_action(action),
                    None => break,
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
                signal = bridge.next(), if bridge_open => match signal {
                    Some(signal) => self.on_verification_signal(signal),
                    None => {
                        debug!("devices: verification service closed listener");
                        bridge_open = false;
                    }
                },
                Some(joined) = self.tasks.join_next() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            warn!("devices: sdk task ended abnormally: {err}");
                        }
                    }
                }
            }
        }
        debug!("devices: controller loop finished");
    }

    fn on_action(&mut self, action: DevicesAction) {
        debug!(action = action.name(), "devices: handling action");
        match action {
            DevicesAction::Refresh | DevicesAction::Retry => self.refresh_devices(),
            DevicesAction::Delete(device_id) => self.delete_device(device_id),
            DevicesAction::Password(password) => self.submit_password(password),
            DevicesAction::Rename {
                device_id,
                new_name,
            } => self.rename_device(device_id, new_name),
            DevicesAction::PromptRename(device_id) => {
                if let Some(device) = self.state.device(&device_id).cloned() {
                    self.post(DevicesViewEvent::PromptRenameDevice(device));
                }
            }
            DevicesAction::VerifyMyDevice(device_id) => self.verify_device(device_id),
            DevicesAction::VerifyMyDeviceManually(device_id) => {
                if let Some(device) = self.state.crypto_device(&device_id).cloned() {
                    self.post(DevicesViewEvent::ShowManuallyVerify(device));
                }
            }
            DevicesAction::MarkAsManuallyVerified(device) => self.mark_as_verified(device),
            DevicesAction::CompleteSecurity => {
                self.post(DevicesViewEvent::SelfVerification(self.session.clone()));
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::DevicesFetched(Ok(devices)) => {
                info!(count = devices.len(), "devices: fetched device list");
                self.apply(StateChange::DevicesFetched(devices));
                self.finish_refresh_step(|cycle| cycle.devices_done = true);
            }
            Completion::DevicesFetched(Err(err)) => {
                warn!("devices: failed to fetch device list: {err:#}");
                let failure = UiError::from_error(UiErrorContext::Refresh, &err);
                self.apply(StateChange::DevicesFetchFailed(failure.clone()));
                self.finish_refresh_step(|cycle| {
                    cycle.devices_done = true;
                    cycle.failure = Some(failure);
                });
            }
            Completion::KeysDownloaded(result) => {
                if let Err(err) = result {
                    warn!("devices: key download failed, keeping cached keys: {err:#}");
                }
                self.publish_crypto_devices();
                self.finish_refresh_step(|cycle| cycle.keys_done = true);
            }
            Completion::Deleted { device_id, result } => match result {
                Ok(()) => {
                    info!(device_id = %device_id, "devices: device deleted");
                    self.apply(StateChange::RequestSucceeded);
                    self.refresh_devices();
                }
                Err(err) => self.on_delete_failed(device_id, err),
            },
            Completion::DeletedWithPassword(result) => match result {
                Ok(()) => {
                    info!("devices: device deleted after re-authentication");
                    self.apply(StateChange::RequestSucceeded);
                    self.refresh_devices();
                }
                Err(err) => self.fail_request(UiErrorContext::Password, err),
            },
            Completion::Renamed(result) => match result {
                Ok(()) => {
                    self.apply(StateChange::RequestSucceeded);
                    self.refresh_devices();
                }
                Err(err) => self.fail_request(UiErrorContext::Rename, err),
            },
            Completion::VerificationRequested(result) => match result {
                Ok(transaction_id) => {
                    info!(transaction_id = %transaction_id, "devices: verification requested");
                    self.post(DevicesViewEvent::ShowVerifyDevice {
                        user_id: self.session.user_id.clone(),
                        transaction_id,
                    });
                }
                Err(err) => {
                    warn!("devices: verification request failed: {err:#}");
                    self.post(DevicesViewEvent::Failure(UiError::from_error(
                        UiErrorContext::Verify,
                        &err,
                    )));
                }
            },
            Completion::TrustUpdated(result) => match result {
                Ok(()) => self.publish_crypto_devices(),
                Err(err) => {
                    warn!("devices: failed to mark device as verified: {err:#}");
                    self.post(DevicesViewEvent::Failure(UiError::from_error(
                        UiErrorContext::ManualVerify,
                        &err,
                    )));
                }
            },
        }
    }

    fn on_verification_signal(&mut self, signal: BridgeSignal) {
        let BridgeSignal::Transaction(tx) = signal else {
            return;
        };
        if tx.state != TransactionState::Verified {
            return;
        }
        if !self.refreshed_transactions.insert(&tx.transaction_id) {
            debug!(transaction_id = %tx.transaction_id, "devices: verified transaction already handled");
            return;
        }
        info!(transaction_id = %tx.transaction_id, "devices: verification completed, refreshing");
        self.refresh_devices();
    }

    fn refresh_devices(&mut self) {
        if self.session.device_id.is_none() {
            debug!("devices: session has no device id, skipping refresh");
            return;
        }
        if self.refresh.in_flight.is_some() {
            debug!("devices: refresh in flight, coalescing");
            self.refresh.queued = true;
            return;
        }
        self.refresh.in_flight = Some(RefreshCycle::default());
        self.apply(StateChange::RefreshStarted);

        let cached = self.crypto.user_devices(&self.session.user_id);
        let snapshot = cached.iter().map(CryptoDeviceInfo::to_device_info).collect();
        self.apply(StateChange::LocalSnapshot(snapshot));
        self.apply(StateChange::CryptoDevices(cached));

        let crypto = Arc::clone(&self.crypto);
        self.spawn_call(
            async move {
                Completion::DevicesFetched(
                    crypto
                        .devices_list()
                        .await
                        .context("failed to fetch device list"),
                )
            },
            |err| Completion::DevicesFetched(Err(err)),
        );

        let crypto = Arc::clone(&self.crypto);
        let user_id = self.session.user_id.clone();
        self.spawn_call(
            async move { Completion::KeysDownloaded(crypto.download_keys(&[user_id], true).await) },
            |err| Completion::KeysDownloaded(Err(err)),
        );
    }

    fn finish_refresh_step(&mut self, step: impl FnOnce(&mut RefreshCycle)) {
        let Some(cycle) = self.refresh.in_flight.as_mut() else {
            return;
        };
        step(cycle);
        if !(cycle.devices_done && cycle.keys_done) {
            return;
        }
        let failure = self.refresh.in_flight.take().and_then(|cycle| cycle.failure);
        self.apply(StateChange::RefreshFinished(failure));
        if std::mem::take(&mut self.refresh.queued) {
            self.refresh_devices();
        }
    }

    fn publish_crypto_devices(&mut self) {
        let cached = self.crypto.user_devices(&self.session.user_id);
        self.apply(StateChange::CryptoDevices(cached));
    }

    fn delete_device(&mut self, device_id: DeviceId) {
        if self.pending_auth.take().is_some() {
            debug!("devices: new delete supersedes pending re-authentication");
        }
        self.post(DevicesViewEvent::Loading(None));
        self.apply(StateChange::RequestStarted);

        let crypto = Arc::clone(&self.crypto);
        let target = device_id.clone();
        self.spawn_call(
            async move {
                let result = crypto.delete_device(&device_id).await;
                Completion::Deleted { device_id, result }
            },
            move |err| Completion::Deleted {
                device_id: target,
                result: Err(err),
            },
        );
    }

    fn on_delete_failed(&mut self, device_id: DeviceId, err: anyhow::Error) {
        let password_auth = err
            .downcast_ref::<InteractiveAuthRequired>()
            .filter(|auth| auth.supports_password());
        match password_auth {
            Some(auth) => {
                info!(device_id = %device_id, "devices: delete needs password re-authentication");
                self.pending_auth = Some(PendingAuthContext {
                    device_id,
                    auth_session: auth.session.clone(),
                });
                self.apply(StateChange::RequestSucceeded);
                self.post(DevicesViewEvent::RequestPassword);
            }
            None => self.fail_request(UiErrorContext::Delete, err),
        }
    }

    fn submit_password(&mut self, password: Zeroizing<String>) {
        let Some(pending) = self.pending_auth.take() else {
            debug!("devices: password submitted without pending re-authentication");
            return;
        };
        self.apply(StateChange::RequestStarted);

        let crypto = Arc::clone(&self.crypto);
        self.spawn_call(
            async move {
                let result = crypto
                    .delete_device_with_user_password(
                        &pending.device_id,
                        &pending.auth_session,
                        password.as_str(),
                    )
                    .await;
                drop(password);
                Completion::DeletedWithPassword(result)
            },
            |err| Completion::DeletedWithPassword(Err(err)),
        );
    }

    fn rename_device(&mut self, device_id: DeviceId, new_name: String) {
        self.post(DevicesViewEvent::Loading(None));
        self.apply(StateChange::RequestStarted);

        let crypto = Arc::clone(&self.crypto);
        self.spawn_call(
            async move { Completion::Renamed(crypto.set_device_name(&device_id, &new_name).await) },
            |err| Completion::Renamed(Err(err)),
        );
    }

    fn verify_device(&mut self, device_id: DeviceId) {
        let verification = Arc::clone(&self.verification);
        let methods = self.config.supported_methods.clone();
        let user_id = self.session.user_id.clone();
        self.spawn_call(
            async move {
                Completion::VerificationRequested(
                    verification
                        .request_key_verification(&methods, &user_id, &[device_id])
                        .await,
                )
            },
            |err| Completion::VerificationRequested(Err(err)),
        );
    }

    fn mark_as_verified(&mut self, device: CryptoDeviceInfo) {
        let crypto = Arc::clone(&self.crypto);
        self.spawn_call(
            async move {
                Completion::TrustUpdated(
                    crypto
                        .set_device_trust(&device.user_id, &device.device_id, TrustLevel::Verified)
                        .await,
                )
            },
            |err| Completion::TrustUpdated(Err(err)),
        );
    }

    fn fail_request(&mut self, context: UiErrorContext, err: anyhow::Error) {
        warn!(?context, "devices: request failed: {err:#}");
        let failure = UiError::from_error(context, &err);
        self.apply(StateChange::RequestFailed(failure.clone()));
        self.post(DevicesViewEvent::Failure(failure));
    }

    /// Runs an SDK call off the actor. A panicking call still completes, through `on_panic`.
    fn spawn_call<F, P>(&mut self, call: F, on_panic: P)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
        P: FnOnce(anyhow::Error) -> Completion + Send + 'static,
    {
        let completions = self.completions.clone();
        self.tasks.spawn(async move {
            let completion = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(completion) => completion,
                Err(_) => {
                    warn!("devices: sdk call panicked");
                    on_panic(anyhow!("sdk call panicked"))
                }
            };
            let _ = completions.send(completion);
        });
    }

    fn apply(&mut self, change: StateChange) {
        self.state = reduce(std::mem::take(&mut self.state), change);
        self.state_tx.send_replace(self.state.clone());
    }

    fn post(&self, event: DevicesViewEvent) {
        self.events.post(event);
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
