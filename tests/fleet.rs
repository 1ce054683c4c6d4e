// tests/fleet.rs
mod common;

use async_trait::async_trait;
use common::{registry, test_config, FakeRuntime};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use std::sync::atomic::{AtomicUsize, Ordering};
use tunnel_pool::registry::{HealthChecker, ProxyRegistry};
use tunnel_pool::store::{MemoryStore, ProxyState, ProxyStore, StateStore, StoreError};
use tunnel_pool::tunnel::{RegistrationHandler, TunnelManager};

const BASE: u16 = 41001;

fn manager(config: &tunnel_pool::config::Config, runtime: Arc<FakeRuntime>) -> TunnelManager {
    TunnelManager::new(config.slots(), config.tunnel(), config.retry(), runtime)
}

#[tokio::test]
async fn test_single_slot_registers_healthy_record() {
    let config = test_config(1, BASE);
    let runtime = FakeRuntime::new();
    runtime.answer(BASE, "1.2.3.4");
    let registry = registry(&config);

    let mut manager = manager(&config, runtime.clone());
    manager.subscribe(registry.clone());
    manager.provision_all().await;

    let all = registry.list_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, 1);
    assert!(all[0].healthy);
    assert_eq!(all[0].public_ip, "1.2.3.4");
    assert_eq!(all[0].port, BASE);
    assert_eq!(*runtime.started.lock().unwrap(), vec![("warp-1".to_string(), BASE)]);
}

#[tokio::test]
async fn test_duplicate_ip_retried_until_unique() {
    let config = test_config(2, BASE);
    let runtime = FakeRuntime::new();
    runtime.answer(BASE, "9.9.9.9");
    runtime.answer(BASE + 1, "9.9.9.9");
    runtime.answer(BASE + 1, "8.8.8.8");
    let registry = registry(&config);

    let mut manager = manager(&config, runtime);
    manager.subscribe(registry.clone());
    manager.provision_all().await;

    let slot2 = registry.get(2).await.unwrap().unwrap();
    assert_eq!(slot2.public_ip, "8.8.8.8");
    let used: HashSet<&str> = manager.used_ips().iter().map(String::as_str).collect();
    assert_eq!(used, HashSet::from(["9.9.9.9", "8.8.8.8"]));
}

#[tokio::test]
async fn test_registered_ips_have_no_duplicates() {
    for n in 1..=5u32 {
        let config = test_config(n, BASE);
        let runtime = FakeRuntime::new();
        // Every slot first sees the previous slot's address.
        for id in 1..=n {
            let port = BASE + id as u16 - 1;
            if id > 1 {
                runtime.answer(port, &format!("10.0.0.{}", id - 1));
            }
            runtime.answer(port, &format!("10.0.0.{}", id));
        }
        let registry = registry(&config);

        let mut manager = manager(&config, runtime);
        manager.subscribe(registry.clone());
        manager.provision_all().await;

        let ips: Vec<String> = registry.list_all().await.into_iter().map(|s| s.public_ip).collect();
        let unique: HashSet<&String> = ips.iter().collect();
        assert_eq!(ips.len(), n as usize);
        assert_eq!(unique.len(), ips.len());
    }
}

#[tokio::test]
async fn test_failed_slot_never_becomes_visible() {
    let config = test_config(2, BASE);
    let runtime = FakeRuntime::new();
    // Slot 1 exhausts its three attempts; slot 2 comes up.
    runtime.answer(BASE + 1, "2.2.2.2");
    let registry = registry(&config);

    let mut manager = manager(&config, runtime);
    manager.subscribe(registry.clone());
    assert_eq!(manager.provision_all().await, 1);

    let ids: Vec<u32> = registry.list_healthy().await.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![2]);
    assert!(registry.get(1).await.unwrap().is_none());
}

/// Captures how much of the fleet was visible when each event fired.
struct Observer {
    registry: Arc<ProxyRegistry>,
    seen: Mutex<Vec<(u32, usize)>>,
}

#[async_trait]
impl RegistrationHandler for Observer {
    async fn on_ready(&self, id: u32, _ip: &str) {
        let visible = self.registry.list_healthy().await.len();
        self.seen.lock().unwrap().push((id, visible));
    }
}

#[tokio::test]
async fn test_slots_visible_before_fleet_completes() {
    let config = test_config(3, BASE);
    let runtime = FakeRuntime::new();
    runtime.answer(BASE, "1.1.1.1");
    runtime.answer(BASE + 1, "2.2.2.2");
    runtime.answer(BASE + 2, "3.3.3.3");
    let registry = registry(&config);
    let observer = Arc::new(Observer {
        registry: registry.clone(),
        seen: Mutex::new(Vec::new()),
    });

    let mut manager = manager(&config, runtime);
    manager.subscribe(registry.clone());
    manager.subscribe(observer.clone());
    manager.provision_all().await;

    assert_eq!(*observer.seen.lock().unwrap(), vec![(1, 1), (2, 2), (3, 3)]);
}

async fn provisioned_fleet(n: u32) -> (Arc<FakeRuntime>, Arc<ProxyRegistry>, HealthChecker) {
    let config = test_config(n, BASE);
    let runtime = FakeRuntime::new();
    for id in 1..=n {
        runtime.answer(BASE + id as u16 - 1, &format!("10.0.0.{}", id));
    }
    let registry = registry(&config);

    let mut manager = manager(&config, runtime.clone());
    manager.subscribe(registry.clone());
    manager.provision_all().await;

    let checker = HealthChecker::new(registry.clone(), runtime.clone(), Duration::from_millis(20));
    (runtime, registry, checker)
}

#[tokio::test]
async fn test_probe_timeout_flips_slot_and_recovers() {
    let (runtime, registry, checker) = provisioned_fleet(3).await;
    let slot3 = BASE + 2;

    runtime.answer(BASE, "10.0.0.1");
    runtime.answer(BASE + 1, "10.0.0.2");
    runtime.time_out(slot3);
    checker.check_all().await;

    let state = registry.get(3).await.unwrap().unwrap();
    assert!(!state.healthy);
    assert_eq!(state.public_ip, "");
    assert_eq!(registry.list_healthy().await.len(), 2);

    runtime.answer(BASE, "10.0.0.1");
    runtime.answer(BASE + 1, "10.0.0.2");
    runtime.answer(slot3, "10.0.0.33");
    checker.check_all().await;

    let state = registry.get(3).await.unwrap().unwrap();
    assert!(state.healthy);
    assert_eq!(state.public_ip, "10.0.0.33");
}

#[tokio::test]
async fn test_health_check_skips_unregistered_slots() {
    let config = test_config(3, BASE);
    let runtime = FakeRuntime::new();
    runtime.answer(BASE, "1.1.1.1");
    let registry = registry(&config);

    let mut manager = manager(&config, runtime.clone());
    manager.subscribe(registry.clone());
    manager.provision_all().await;

    runtime.answer(BASE, "1.1.1.1");
    let checker = HealthChecker::new(registry.clone(), runtime, Duration::from_secs(30));
    let results = checker.check_all().await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].slot, 1);
    assert!(results[0].healthy);
    assert_eq!(registry.list_all().await.len(), 1);
}

#[tokio::test]
async fn test_uniqueness_only_checked_at_provisioning() {
    let (runtime, registry, checker) = provisioned_fleet(2).await;

    // The egress network hands slot 2 the address slot 1 already holds.
    runtime.answer(BASE, "10.0.0.1");
    runtime.answer(BASE + 1, "10.0.0.1");
    checker.check_all().await;

    let healthy = registry.list_healthy().await;
    assert_eq!(healthy.len(), 2);
    assert!(healthy.iter().all(|s| s.public_ip == "10.0.0.1"));
}

#[tokio::test]
async fn test_health_loop_runs_and_stops_on_shutdown() {
    let (_runtime, registry, checker) = provisioned_fleet(1).await;
    // No scripted answers left: every periodic probe times out.
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(Arc::new(checker).start(rx));

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if registry.list_healthy().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("health loop never marked the slot down");

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("health loop did not stop")
        .unwrap();
}

/// Memory store whose `nth` read fails once.
struct OneBadRead {
    inner: MemoryStore,
    reads: AtomicUsize,
    nth: usize,
}

#[async_trait]
impl StateStore for OneBadRead {
    async fn set(&self, key: &str, state: &ProxyState) -> Result<(), StoreError> {
        self.inner.set(key, state).await
    }

    async fn get(&self, key: &str) -> Result<Option<ProxyState>, StoreError> {
        if self.reads.fetch_add(1, Ordering::SeqCst) + 1 == self.nth {
            let err = serde_json::from_str::<ProxyState>("{").unwrap_err();
            return Err(StoreError::Codec(err));
        }
        self.inner.get(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_store_read_error_during_health_check_keeps_record() {
    let config = test_config(1, BASE);
    let store = OneBadRead {
        inner: MemoryStore::new(),
        reads: AtomicUsize::new(0),
        nth: 2,
    };
    let registry = Arc::new(ProxyRegistry::new(
        ProxyStore::new(Arc::new(store)),
        config.slots(),
        config.proxy_kind.clone(),
    ));
    registry.register(1, "1.2.3.4").await.unwrap();

    let runtime = FakeRuntime::new();
    runtime.answer(BASE, "1.2.3.4");
    runtime.answer(BASE, "1.2.3.4");
    let checker = HealthChecker::new(registry.clone(), runtime, Duration::from_secs(30));

    // Read 1 lists the slot; read 2, inside the health write, fails.
    checker.check_all().await;
    let state = registry.get(1).await.unwrap().unwrap();
    assert_eq!(state.port, BASE);
    assert_eq!(state.kind, "warp");
    assert!(state.healthy);
    assert_eq!(state.public_ip, "1.2.3.4");

    let results = checker.check_all().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].healthy);
    let state = registry.get(1).await.unwrap().unwrap();
    assert_eq!(state.port, BASE);
    assert!(state.healthy);
}
