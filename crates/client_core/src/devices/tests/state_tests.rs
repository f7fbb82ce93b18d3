use shared::domain::UserId;

use super::*;
use crate::errors::UiErrorContext;

fn device(id: &str) -> DeviceInfo {
    DeviceInfo {
        device_id: DeviceId::new(id),
        user_id: UserId::new("@alice:example.org"),
        display_name: None,
        last_seen_ip: None,
        last_seen_at: None,
    }
}

fn failure() -> UiError {
    UiError::from_message(UiErrorContext::Refresh, "connection refused")
}

#[test]
fn first_refresh_goes_through_loading_before_snapshot() {
    let state = reduce(DeviceListState::new(None), StateChange::RefreshStarted);
    assert!(state.devices.is_loading());
    assert!(state.refresh.is_loading());

    let state = reduce(state, StateChange::LocalSnapshot(vec![device("A")]));
    assert_eq!(state.devices, Async::Success(vec![device("A")]));
}

#[test]
fn empty_local_snapshot_keeps_loading() {
    let state = reduce(DeviceListState::default(), StateChange::RefreshStarted);
    let state = reduce(state, StateChange::LocalSnapshot(Vec::new()));
    assert!(state.devices.is_loading());
}

#[test]
fn later_refreshes_never_regress_visible_devices() {
    let mut state = reduce(DeviceListState::default(), StateChange::RefreshStarted);
    state = reduce(state, StateChange::DevicesFetched(vec![device("A"), device("B")]));
    state = reduce(state, StateChange::RefreshFinished(None));

    state = reduce(state, StateChange::RefreshStarted);
    assert_eq!(state.devices.value().map(Vec::len), Some(2));
    assert!(state.refresh.is_loading());

    state = reduce(state, StateChange::LocalSnapshot(vec![device("A")]));
    assert_eq!(state.devices.value().map(Vec::len), Some(2));

    state = reduce(state, StateChange::DevicesFetchFailed(failure()));
    assert_eq!(state.devices.value().map(Vec::len), Some(2));

    state = reduce(state, StateChange::RefreshFinished(Some(failure())));
    assert!(state.refresh.is_fail());
    assert!(state.devices.is_success());
    assert_eq!(state.completed_refreshes, 2);
}

#[test]
fn fetch_failure_without_prior_success_is_visible() {
    let state = reduce(DeviceListState::default(), StateChange::RefreshStarted);
    let state = reduce(state, StateChange::DevicesFetchFailed(failure()));
    assert_eq!(state.devices.error().map(UiError::message), Some("connection refused"));
}

#[test]
fn request_transitions_only_touch_pending_request() {
    let before = reduce(
        DeviceListState::default(),
        StateChange::DevicesFetched(vec![device("A")]),
    );
    let loading = reduce(before.clone(), StateChange::RequestStarted);
    assert!(loading.pending_request.is_loading());
    assert_eq!(loading.devices, before.devices);

    let failed = reduce(loading, StateChange::RequestFailed(failure()));
    assert!(failed.pending_request.is_fail());

    let succeeded = reduce(failed, StateChange::RequestSucceeded);
    assert_eq!(succeeded.pending_request, Async::Success(()));
}

#[test]
fn lookups_find_devices_by_id() {
    let state = reduce(
        DeviceListState::default(),
        StateChange::DevicesFetched(vec![device("A"), device("B")]),
    );
    assert!(state.device(&DeviceId::new("B")).is_some());
    assert!(state.device(&DeviceId::new("C")).is_none());
    assert!(state.crypto_device(&DeviceId::new("A")).is_none());
}
