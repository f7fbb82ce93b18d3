//! Device list view state and its pure transition function.

use shared::domain::{CryptoDeviceInfo, DeviceId, DeviceInfo};

use crate::{async_state::Async, errors::UiError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceListState {
    pub my_device_id: Option<DeviceId>,
    pub devices: Async<Vec<DeviceInfo>>,
    pub crypto_devices: Async<Vec<CryptoDeviceInfo>>,
    /// Outcome of the latest rename/delete/password request.
    pub pending_request: Async<()>,
    /// Progress of the latest refresh cycle; `devices` keeps its last success meanwhile.
    pub refresh: Async<()>,
    /// Number of refresh cycles that ran to completion, successful or not.
    pub completed_refreshes: u64,
}

impl DeviceListState {
    pub fn new(my_device_id: Option<DeviceId>) -> Self {
        Self {
            my_device_id,
            ..Self::default()
        }
    }

    pub fn device(&self, device_id: &DeviceId) -> Option<&DeviceInfo> {
        self.devices
            .value()?
            .iter()
            .find(|device| &device.device_id == device_id)
    }

    pub fn crypto_device(&self, device_id: &DeviceId) -> Option<&CryptoDeviceInfo> {
        self.crypto_devices
            .value()?
            .iter()
            .find(|device| &device.device_id == device_id)
    }
}

/// Interactive-auth session kept while a delete waits for the user's password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthContext {
    pub device_id: DeviceId,
    pub auth_session: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    RefreshStarted,
    /// Cached metadata shown while the server list is on its way.
    LocalSnapshot(Vec<DeviceInfo>),
    DevicesFetched(Vec<DeviceInfo>),
    DevicesFetchFailed(UiError),
    CryptoDevices(Vec<CryptoDeviceInfo>),
    RefreshFinished(Option<UiError>),
    RequestStarted,
    RequestSucceeded,
    RequestFailed(UiError),
}

pub fn reduce(state: DeviceListState, change: StateChange) -> DeviceListState {
    match change {
        StateChange::RefreshStarted => DeviceListState {
            devices: if state.devices.is_success() {
                state.devices
            } else {
                Async::Loading
            },
            refresh: Async::Loading,
            ..state
        },
        StateChange::LocalSnapshot(snapshot) => {
            if state.devices.is_success() || snapshot.is_empty() {
                state
            } else {
                DeviceListState {
                    devices: Async::Success(snapshot),
                    ..state
                }
            }
        }
        StateChange::DevicesFetched(devices) => DeviceListState {
            devices: Async::Success(devices),
            ..state
        },
        StateChange::DevicesFetchFailed(err) => {
            if state.devices.is_success() {
                state
            } else {
                DeviceListState {
                    devices: Async::Fail(err),
                    ..state
                }
            }
        }
        StateChange::CryptoDevices(devices) => DeviceListState {
            crypto_devices: Async::Success(devices),
            ..state
        },
        StateChange::RefreshFinished(failure) => DeviceListState {
            refresh: match failure {
                Some(err) => Async::Fail(err),
                None => Async::Success(()),
            },
            completed_refreshes: state.completed_refreshes + 1,
            ..state
        },
        StateChange::RequestStarted => DeviceListState {
            pending_request: Async::Loading,
            ..state
        },
        StateChange::RequestSucceeded => DeviceListState {
            pending_request: Async::Success(()),
            ..state
        },
        StateChange::RequestFailed(err) => DeviceListState {
            pending_request: Async::Fail(err),
            ..state
        },
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
