mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tandem_storage::DEFAULT_DB_FILE;
use tandem_sync::{
    BackendAdapter, BackendKind, BackendOptions, CoordinatorConfig, CoordinatorSlot,
    LocalBackend, MemoryCloudStore, ReplicatedAdapter, StorageCoordinator, SyncError,
    SyncSettings,
};
use tempfile::TempDir;

type TestAdapter = Arc<ReplicatedAdapter<TestBackend>>;

fn wire(adapters: &[TestAdapter], preferred: usize) -> StorageCoordinator {
    let dyn_adapters: Vec<Arc<dyn BackendAdapter>> = adapters
        .iter()
        .map(|a| a.clone() as Arc<dyn BackendAdapter>)
        .collect();
    StorageCoordinator::with_adapters(dyn_adapters, preferred, factory()).unwrap()
}

fn three_adapters() -> Vec<TestAdapter> {
    vec![
        adapter(TestBackend::of_kind(BackendKind::Local)),
        adapter(TestBackend::of_kind(BackendKind::Remote)),
        adapter(TestBackend::of_kind(BackendKind::Companion)),
    ]
}

fn in_memory_config(backends: Vec<BackendKind>) -> CoordinatorConfig {
    CoordinatorConfig::new(SyncSettings::new(backends).with_options(BackendOptions::in_memory()))
        .with_record_factory(factory())
}

// ── Routing and fan-out ──────────────────────────────────────────

#[tokio::test]
async fn add_reaches_both_configured_backends() {
    init_tracing();
    let coordinator = StorageCoordinator::new(in_memory_config(vec![
        BackendKind::Local,
        BackendKind::Local,
    ]))
    .await
    .unwrap();

    assert!(coordinator.add(test_object("T1")).await.unwrap());

    for adapter in coordinator.adapters() {
        assert_eq!(keys(&adapter.enumerate_all().await.unwrap()), vec!["TestObject:T1"]);
    }
    assert_eq!(keys(&coordinator.get().await.unwrap()), vec!["TestObject:T1"]);
}

#[tokio::test]
async fn fan_out_skips_the_source_adapter() {
    let adapters = three_adapters();
    let coordinator = wire(&adapters, 0);
    let source_observer = RecordingObserver::new();
    adapters[0].register_observer(&as_observer(&source_observer));

    coordinator.add(test_object("Key")).await.unwrap();

    for adapter in &adapters {
        assert_eq!(adapter.backend().persist_count(), 1);
        assert_eq!(adapter.backend().stored_keys(), vec!["TestObject:Key"]);
    }
    // Echoes from the other adapters do not commit again at the source.
    assert_eq!(source_observer.count(), 1);
}

#[tokio::test]
async fn delete_fans_out() {
    let adapters = three_adapters();
    let coordinator = wire(&adapters, 0);
    coordinator.add(test_object("Key")).await.unwrap();

    assert!(coordinator.delete(&test_object("Key")).await.unwrap());
    assert!(!coordinator.delete(&test_object("Key")).await.unwrap());

    for adapter in &adapters {
        assert!(adapter.backend().stored_keys().is_empty());
        assert_eq!(adapter.backend().remove_count(), 1);
    }
}

#[tokio::test]
async fn change_from_secondary_reaches_preferred_and_app() {
    let adapters = three_adapters();
    let coordinator = wire(&adapters, 0);
    let app = RecordingObserver::new();
    coordinator.subscribe(&as_observer(&app));

    adapters[2].add_record(test_object("FromWatch")).await.unwrap();

    assert_eq!(keys(&coordinator.get().await.unwrap()), vec!["TestObject:FromWatch"]);
    assert_eq!(adapters[1].backend().stored_keys(), vec!["TestObject:FromWatch"]);

    let events = app.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, adapters[0].id());
}

#[tokio::test]
async fn app_observers_hear_only_preferred_commits() {
    let adapters = three_adapters();
    let coordinator = wire(&adapters, 1);
    let app = RecordingObserver::new();
    coordinator.subscribe(&as_observer(&app));

    coordinator.add(test_object("Key")).await.unwrap();

    assert_eq!(app.count(), 1);
    assert!(app.events().iter().all(|(source, _)| *source == adapters[1].id()));
}

#[tokio::test]
async fn failing_secondary_does_not_fail_the_add() {
    let adapters = three_adapters();
    adapters[1].backend().set_fail_commits(true);
    let coordinator = wire(&adapters, 0);

    assert!(coordinator.add(test_object("Key")).await.unwrap());
    assert!(adapters[1].backend().stored_keys().is_empty());
    assert_eq!(adapters[2].backend().stored_keys(), vec!["TestObject:Key"]);
}

#[tokio::test]
async fn reconcile_through_coordinator_fans_out() {
    let adapters = three_adapters();
    let coordinator = wire(&adapters, 0);
    coordinator.add(test_object("A")).await.unwrap();
    coordinator.add(test_object("B")).await.unwrap();

    let applied = coordinator
        .reconcile(vec![test_object("A"), test_object("C")])
        .await
        .unwrap();

    assert_eq!(keys(&applied.adds), vec!["TestObject:C"]);
    assert_eq!(keys(&applied.deletes), vec!["TestObject:B"]);
    for adapter in &adapters {
        assert_eq!(adapter.backend().stored_keys(), vec!["TestObject:A", "TestObject:C"]);
    }
}

#[tokio::test]
async fn prime_shares_preexisting_records() {
    let adapters = vec![
        adapter(TestBackend::new()),
        adapter(TestBackend::seeded([test_object("Old"), another_object("Older")])),
    ];
    let coordinator = wire(&adapters, 0);

    coordinator.prime().await;

    assert_eq!(
        keys(&coordinator.get().await.unwrap()),
        vec!["AnotherTestObject:Older", "TestObject:Old"]
    );
}

// ── Subscriptions and shutdown ───────────────────────────────────

#[tokio::test]
async fn subscribe_is_idempotent_and_unsubscribe_stops_delivery() {
    let coordinator = wire(&three_adapters(), 0);
    let app = RecordingObserver::new();

    let first = coordinator.subscribe(&as_observer(&app));
    let second = coordinator.subscribe(&as_observer(&app));
    assert_eq!(first, second);

    coordinator.add(test_object("A")).await.unwrap();
    assert_eq!(app.count(), 1);

    assert!(coordinator.unsubscribe(first));
    coordinator.add(test_object("B")).await.unwrap();
    assert_eq!(app.count(), 1);
}

#[tokio::test]
async fn configured_app_observer_is_kept_alive() {
    let app = RecordingObserver::new();
    let config = in_memory_config(vec![BackendKind::Local]).with_app_observer(app.clone());
    let coordinator = StorageCoordinator::new(config).await.unwrap();

    coordinator.add(test_object("Key")).await.unwrap();
    assert_eq!(app.added_keys(), vec!["TestObject:Key"]);
}

#[tokio::test]
async fn shutdown_detaches_fan_out() {
    let adapters = three_adapters();
    let coordinator = wire(&adapters, 0);
    coordinator.shutdown();
    coordinator.shutdown();
    assert!(coordinator.is_shut_down());

    adapters[0].add_record(test_object("Lonely")).await.unwrap();
    assert!(adapters[1].backend().stored_keys().is_empty());
    assert_eq!(adapters[0].observer_count(), 0);
}

#[tokio::test]
async fn dropping_coordinator_detaches_fan_out() {
    let adapters = three_adapters();
    drop(wire(&adapters, 0));

    adapters[0].add_record(test_object("Lonely")).await.unwrap();
    assert!(adapters[2].backend().stored_keys().is_empty());
}

// ── Timeouts ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn slow_preferred_backend_times_out() {
    let adapters = three_adapters();
    adapters[0].backend().set_commit_delay(Duration::from_secs(10));
    let coordinator = wire(&adapters, 0).with_operation_timeout(Some(Duration::from_millis(50)));

    let err = coordinator.add(test_object("Slow")).await.unwrap_err();
    assert!(matches!(err, SyncError::Timeout));

    // The commit keeps going after the caller stops waiting.
    assert_eq!(
        keys(&adapters[0].enumerate_all().await.unwrap()),
        vec!["TestObject:Slow"]
    );
    adapters[0].backend().set_commit_delay(Duration::ZERO);
    assert!(coordinator.delete(&test_object("Slow")).await.unwrap());
    assert!(adapters[0].backend().stored_keys().is_empty());
}

#[tokio::test]
async fn timed_out_local_save_still_reaches_the_cache() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(DEFAULT_DB_FILE);
    let local = Arc::new(ReplicatedAdapter::new(
        LocalBackend::open(&path).await.unwrap(),
        factory(),
    ));
    let adapters: Vec<Arc<dyn BackendAdapter>> = vec![local.clone()];
    let coordinator = StorageCoordinator::with_adapters(adapters, 0, factory())
        .unwrap()
        .with_operation_timeout(Some(Duration::from_millis(200)));

    // A second connection holds the write lock, so the save waits on it.
    let blocker = rusqlite::Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
    let err = coordinator.add(test_object("Late")).await.unwrap_err();
    assert!(matches!(err, SyncError::Timeout));
    blocker.execute_batch("COMMIT").unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while local.cached_keys().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("save did not finish");

    assert!(coordinator.delete(&test_object("Late")).await.unwrap());
    assert_eq!(local.backend().store().count().unwrap(), 0);
}

// ── Configuration errors ─────────────────────────────────────────

#[tokio::test]
async fn backends_without_factory_are_rejected() {
    let config = CoordinatorConfig::new(SyncSettings::new([BackendKind::Local]));
    let err = StorageCoordinator::new(config).await.unwrap_err();
    assert!(matches!(err, SyncError::MissingObjectFactory));
}

#[tokio::test]
async fn no_backends_means_no_preferred_backend() {
    let config = CoordinatorConfig::new(SyncSettings::default()).with_record_factory(factory());
    let err = StorageCoordinator::new(config).await.unwrap_err();
    assert!(matches!(err, SyncError::MissingPreferredBackend));
}

#[tokio::test]
async fn preference_outside_backend_list_is_rejected() {
    let settings = SyncSettings::new([BackendKind::Local])
        .with_preferred(BackendKind::Remote)
        .with_options(BackendOptions::in_memory());
    let config = CoordinatorConfig::new(settings).with_record_factory(factory());
    let err = StorageCoordinator::new(config).await.unwrap_err();
    assert!(matches!(err, SyncError::MissingPreferredBackend));
}

#[test]
fn with_adapters_rejects_out_of_range_preference() {
    let result = StorageCoordinator::with_adapters(Vec::new(), 0, factory());
    assert!(matches!(result, Err(SyncError::MissingPreferredBackend)));
}

#[tokio::test]
async fn remote_backend_needs_a_store() {
    let config = CoordinatorConfig::new(SyncSettings::new([BackendKind::Remote]))
        .with_record_factory(factory());
    let err = StorageCoordinator::new(config).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidConfig(_)));
}

#[tokio::test]
async fn explicit_preference_selects_adapter() {
    let store = Arc::new(MemoryCloudStore::new());
    let settings = SyncSettings::new([BackendKind::Local, BackendKind::Remote, BackendKind::Companion])
        .with_preferred(BackendKind::Remote)
        .with_options(BackendOptions {
            local_in_memory: true,
            ..BackendOptions::default()
        });
    let config = CoordinatorConfig::new(settings)
        .with_record_factory(factory())
        .with_cloud_store(store.clone());
    let coordinator = StorageCoordinator::new(config).await.unwrap();

    assert_eq!(coordinator.preferred().kind(), BackendKind::Remote);
    coordinator.add(test_object("Key")).await.unwrap();
    assert!(store.contains("TestObject", &"TestObject:Key".into()).await);

    let local = coordinator.adapter(BackendKind::Local).unwrap();
    assert_eq!(keys(&local.enumerate_all().await.unwrap()), vec!["TestObject:Key"]);
}

// ── Slot lifecycle ───────────────────────────────────────────────

#[tokio::test]
async fn slot_configures_once_until_reset() {
    let slot = CoordinatorSlot::new();
    assert!(!slot.is_configured().await);

    let first = slot.configure(in_memory_config(vec![BackendKind::Local])).await.unwrap();
    let err = slot
        .configure(in_memory_config(vec![BackendKind::Local]))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AlreadyInitialized));
    assert!(Arc::ptr_eq(&first, &slot.get().await.unwrap()));

    assert!(slot.reset().await);
    assert!(first.is_shut_down());
    assert!(!slot.reset().await);

    slot.configure(in_memory_config(vec![BackendKind::Local])).await.unwrap();
    assert!(slot.is_configured().await);
}

#[tokio::test]
async fn failed_configure_leaves_slot_empty() {
    let slot = CoordinatorSlot::new();
    let config = CoordinatorConfig::new(SyncSettings::new([BackendKind::Local]));
    assert!(slot.configure(config).await.is_err());
    assert!(!slot.is_configured().await);
}

#[tokio::test]
async fn install_respects_occupied_slot() {
    let slot = CoordinatorSlot::new();
    slot.install(wire(&three_adapters(), 0)).await.unwrap();
    let err = slot.install(wire(&three_adapters(), 0)).await.unwrap_err();
    assert!(matches!(err, SyncError::AlreadyInitialized));
}

#[tokio::test]
async fn global_slot_round_trip() {
    let slot = CoordinatorSlot::global();
    slot.reset().await;
    slot.configure(in_memory_config(vec![BackendKind::Local])).await.unwrap();
    assert!(CoordinatorSlot::global().is_configured().await);
    assert!(slot.reset().await);
}
