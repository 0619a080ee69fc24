mod support;

use obscura_sync::{
    ClientFactory, ConfigStore, PhaseSignal, SessionController, SessionState, UploadError,
    VaultSignal, VaultState,
};
use std::sync::Arc;
use std::time::Duration;
use support::{test_config, FakeFactory, FakeObjectStore};

fn controller_with(
    store: Arc<FakeObjectStore>,
    configured: bool,
) -> (Arc<SessionController>, Arc<FakeFactory>, Arc<ConfigStore>) {
    let factory = FakeFactory::new(store);
    let config_store = Arc::new(ConfigStore::in_memory());
    if configured {
        config_store.save(test_config()).unwrap();
    }
    let controller = SessionController::new(
        factory.clone() as Arc<dyn ClientFactory>,
        config_store.clone(),
    );
    (controller, factory, config_store)
}

/// Polls until the controller reaches a state accepted by `pred`.
async fn wait_for_state(
    controller: &SessionController,
    pred: impl Fn(&SessionState) -> bool,
) -> SessionState {
    for _ in 0..200 {
        let state = controller.state();
        if pred(&state) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for session state, last = {:?}", controller.state());
}

#[tokio::test]
async fn starts_disconnected_with_no_client() {
    let (controller, _, _) = controller_with(FakeObjectStore::new(), true);
    assert_eq!(controller.state(), SessionState::Disconnected);
    assert!(controller.client().is_none());
    assert!(controller.config().is_none());
}

#[tokio::test]
async fn connect_without_config_stays_disconnected() {
    let (controller, factory, _) = controller_with(FakeObjectStore::new(), false);

    let state = controller.connect().await;
    assert_eq!(state, SessionState::Disconnected);
    assert_eq!(factory.builds(), 0);
    assert!(controller.client().is_none());
}

#[tokio::test]
async fn connect_reaches_connected_after_reachability_check() {
    let (controller, _, _) = controller_with(FakeObjectStore::new(), true);

    let state = controller.connect().await;
    match state {
        SessionState::Connected { endpoint, bucket, .. } => {
            assert_eq!(endpoint, "https://s3.example.net");
            assert_eq!(bucket, "vault");
        }
        other => panic!("expected Connected, got {other:?}"),
    }
    assert!(controller.client().is_some());
    assert_eq!(controller.config(), Some(test_config()));
}

#[tokio::test]
async fn missing_bucket_lands_in_error_never_connected() {
    let store = FakeObjectStore::new();
    store.set_bucket_exists(Ok(false));
    let (controller, _, _) = controller_with(store, true);

    let state = controller.connect().await;
    assert!(matches!(state, SessionState::Error { .. }));
    assert!(controller.client().is_none());
}

#[tokio::test]
async fn reachability_failure_lands_in_error() {
    let store = FakeObjectStore::new();
    store.set_bucket_exists(Err(UploadError::Network("host unreachable".into())));
    let (controller, _, _) = controller_with(store, true);

    let state = controller.connect().await;
    match state {
        SessionState::Error { message } => assert!(message.contains("unreachable")),
        other => panic!("expected Error, got {other:?}"),
    }
    assert!(controller.client().is_none());
}

#[tokio::test]
async fn client_build_failure_lands_in_error() {
    let store = FakeObjectStore::new();
    let (controller, factory, _) = controller_with(store, true);
    factory.fail_builds_with(UploadError::Tls("handshake failed".into()));

    let state = controller.connect().await;
    assert!(matches!(state, SessionState::Error { .. }));
    assert!(controller.client().is_none());
}

#[tokio::test]
async fn vault_lock_discards_client_and_config_immediately() {
    let (controller, _, _) = controller_with(FakeObjectStore::new(), true);
    controller.connect().await;
    assert!(controller.client().is_some());

    controller.handle_vault_lock();

    // Synchronous and observable right away — this is a security
    // boundary, not a cache eviction.
    assert_eq!(controller.state(), SessionState::Disconnected);
    assert!(controller.client().is_none());
    assert!(controller.config().is_none());
}

#[tokio::test]
async fn run_loop_connects_on_unlock_and_tears_down_on_lock() {
    let (controller, _, _) = controller_with(FakeObjectStore::new(), true);
    let vault = VaultSignal::new(VaultState::Locked);
    let phase = PhaseSignal::default();

    let loop_handle = tokio::spawn(controller.clone().run(vault.subscribe(), phase.subscribe()));

    vault.unlock();
    wait_for_state(&controller, SessionState::is_connected).await;
    assert!(controller.client().is_some());

    vault.lock();
    wait_for_state(&controller, |s| *s == SessionState::Disconnected).await;
    assert!(controller.client().is_none());

    drop(vault);
    drop(phase);
    let _ = loop_handle.await;
}

#[tokio::test]
async fn backgrounding_does_not_touch_the_session() {
    let (controller, factory, _) = controller_with(FakeObjectStore::new(), true);
    let vault = VaultSignal::new(VaultState::Locked);
    let phase = PhaseSignal::default();

    let loop_handle = tokio::spawn(controller.clone().run(vault.subscribe(), phase.subscribe()));

    vault.unlock();
    wait_for_state(&controller, SessionState::is_connected).await;
    let builds_before = factory.builds();

    phase.background();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Still connected, no re-probe: only a vault lock tears down.
    assert!(controller.state().is_connected());
    assert!(controller.client().is_some());
    assert_eq!(factory.builds(), builds_before);

    drop(vault);
    drop(phase);
    let _ = loop_handle.await;
}

#[tokio::test]
async fn foreground_reprobes_only_when_vault_is_unlocked() {
    let (controller, factory, _) = controller_with(FakeObjectStore::new(), true);
    let vault = VaultSignal::new(VaultState::Locked);
    let phase = PhaseSignal::new(obscura_sync::AppPhase::Background);

    let loop_handle = tokio::spawn(controller.clone().run(vault.subscribe(), phase.subscribe()));

    // Foreground with the vault locked: no probe.
    phase.foreground();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.builds(), 0);
    assert_eq!(controller.state(), SessionState::Disconnected);

    // Unlock, then foreground again: probes.
    vault.unlock();
    wait_for_state(&controller, SessionState::is_connected).await;

    phase.background();
    phase.foreground();
    for _ in 0..200 {
        if factory.builds() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(factory.builds() >= 2, "foreground should have re-probed");
    assert!(controller.state().is_connected());

    drop(vault);
    drop(phase);
    let _ = loop_handle.await;
}

#[tokio::test]
async fn reprobe_never_exposes_the_old_client_while_connecting() {
    let (controller, factory, _) = controller_with(FakeObjectStore::new(), true);
    controller.connect().await;
    assert!(controller.client().is_some());

    // Second probe blocks inside the factory, holding the controller in
    // Connecting.
    let gate = factory.gate_builds();
    let reprobe = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.connect().await })
    };
    wait_for_state(&controller, |s| *s == SessionState::Connecting).await;

    // The settings the old client was built from may be stale by now;
    // until the probe lands, callers must see no client at all.
    assert!(controller.client().is_none());
    assert!(controller.config().is_none());

    gate.notify_one();
    let state = reprobe.await.unwrap();
    assert!(state.is_connected());
    assert!(controller.client().is_some());
    assert_eq!(controller.config(), Some(test_config()));
}

#[tokio::test]
async fn removing_config_disconnects_on_next_probe() {
    let (controller, _, config_store) = controller_with(FakeObjectStore::new(), true);
    controller.connect().await;
    assert!(controller.state().is_connected());

    config_store.clear().unwrap();
    let state = controller.connect().await;
    assert_eq!(state, SessionState::Disconnected);
    assert!(controller.client().is_none());
}
