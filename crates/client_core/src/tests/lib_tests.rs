use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use shared::domain::{Presence, SessionInfo};
use tokio::time::timeout;

use super::*;

fn session() -> SessionInfo {
    SessionInfo {
        user_id: UserId::new("@alice:example.org"),
        device_id: Some(DeviceId::new("ALICEPHONE")),
    }
}

#[tokio::test]
async fn controller_over_missing_backends_reports_refresh_failure() {
    let controller = DevicesController::spawn(
        session(),
        Arc::new(MissingCryptoService),
        Arc::new(MissingVerificationService),
        DevicesConfig::default(),
    );
    let mut state = controller.subscribe_state();

    let settled = timeout(
        Duration::from_secs(2),
        state.wait_for(|s| s.completed_refreshes == 1),
    )
    .await
    .expect("refresh finished in time")
    .expect("controller alive")
    .clone();

    assert_eq!(
        settled.devices.error().map(UiError::context),
        Some(UiErrorContext::Refresh)
    );
    assert!(settled.refresh.is_fail());
    assert_eq!(settled.crypto_devices, Async::Success(Vec::new()));
}

#[tokio::test]
async fn verification_against_missing_service_is_a_failure_event() {
    let controller = DevicesController::spawn(
        session(),
        Arc::new(MissingCryptoService),
        Arc::new(MissingVerificationService),
        DevicesConfig::default(),
    );
    let mut events = controller.subscribe_events();

    controller.handle(DevicesAction::VerifyMyDevice(DeviceId::new("ALICELAPTOP")));
    let event = timeout(Duration::from_secs(2), events.next())
        .await
        .expect("event in time")
        .expect("stream open");

    match event {
        DevicesViewEvent::Failure(err) => assert_eq!(err.context(), UiErrorContext::Verify),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn missing_session_still_serves_user_placeholders() {
    let session = ReactiveSession::spawn(&MissingSessionSource);
    let alice = UserId::new("@alice:example.org");

    let mut user = session.observe_user(&alice);
    let first = timeout(Duration::from_secs(2), user.next())
        .await
        .expect("placeholder in time")
        .expect("stream open");
    assert_eq!(first.user_id, alice);
    assert_eq!(first.presence, Presence::Offline);

    let mut rooms = session.live_room_summaries();
    assert!(timeout(Duration::from_millis(50), rooms.next())
        .await
        .is_err());
}
