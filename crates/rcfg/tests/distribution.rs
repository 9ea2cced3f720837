//! End-to-end tests of the distribution service against a scripted backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rcfg::backend::memory::StaticBackend;
use rcfg::store::{MemoryStore, SqliteStore};
use rcfg::uptane::UptaneError;
use rcfg::{
    BackendError, Client, ClientGetConfigsRequest, DistributionService, Product, RetryPolicy,
    ServiceConfig, ServiceError, SubscriberId,
};
use rcfg_testkit::Scenario;

const ORG: u64 = 2;

fn config() -> ServiceConfig {
    ServiceConfig {
        org_id: ORG,
        datacenter: "us1".into(),
        retry: RetryPolicy::none(),
        ..Default::default()
    }
}

async fn service(
    backend: Arc<StaticBackend>,
) -> DistributionService<Arc<MemoryStore>, Arc<StaticBackend>> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    DistributionService::new(config(), Arc::new(MemoryStore::new()), backend)
        .await
        .unwrap()
}

fn request(products: &[&str], acknowledged_root_version: u64) -> ClientGetConfigsRequest {
    ClientGetConfigsRequest {
        client: Client::new("tracer-1", products.iter().copied()),
        acknowledged_root_version,
    }
}

#[tokio::test]
async fn test_refresh_then_serve_client() {
    let backend = Arc::new(StaticBackend::new());
    let service = service(backend.clone()).await;
    let mut scenario = Scenario::new(ORG);
    backend.push_bundle(scenario.publish(&[
        ("2/APM_SAMPLING/cfg-1/rules", "rate: 0.5"),
        ("2/ASM_DD/cfg-2/rules", "block: []"),
    ]));

    service.seen(
        Client::new("tracer-1", ["APM_SAMPLING"]),
        rcfg::core::now_millis(),
    );
    service.refresh().await.unwrap();

    let sent = backend.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].director_targets_version, 0);
    assert_eq!(sent[0].active_clients.len(), 1);
    assert!(sent[0].new_products.contains(&Product::new("APM_SAMPLING")));
    assert!(service.products().contains(&Product::new("APM_SAMPLING")));
    assert!(service.new_products().is_empty());

    let response = service
        .get_configs_for(&request(&["APM_SAMPLING"], 0))
        .await
        .unwrap();
    assert_eq!(response.roots.len(), 1);
    assert_eq!(response.roots[0].version, 1);
    assert_eq!(response.targets.version, 1);
    assert_eq!(response.config_files.len(), 1);
    assert_eq!(response.config_files[0].path, "2/APM_SAMPLING/cfg-1/rules");
    assert_eq!(&response.config_files[0].raw[..], b"rate: 0.5");
}

#[tokio::test]
async fn test_refresh_expires_clients_by_wall_clock() {
    let backend = Arc::new(StaticBackend::new());
    let service = service(backend.clone()).await;
    backend.push_bundle(Scenario::new(ORG).publish(&[]));

    let now = rcfg::core::now_millis();
    service.seen(Client::new("current", ["P"]), now);
    service.seen(Client::new("stale", ["Q"]), now - 60_000);
    service.refresh().await.unwrap();

    let sent = backend.requests();
    let ids: Vec<&str> = sent[0].active_clients.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["current"]);
    assert!(service.products().contains(&Product::new("P")));
    assert!(!service.products().contains(&Product::new("Q")));
}

#[tokio::test]
async fn test_get_configs_for_returns_unacknowledged_roots() {
    let backend = Arc::new(StaticBackend::new());
    let service = service(backend.clone()).await;
    let mut scenario = Scenario::new(ORG);

    backend.push_bundle(scenario.publish(&[("2/P/c/a", "one")]));
    service.refresh().await.unwrap();

    scenario.director.rotate_root(31);
    scenario.director.rotate_root(32);
    backend.push_bundle(scenario.publish(&[("2/P/c/a", "two")]));
    service.refresh().await.unwrap();

    let response = service.get_configs_for(&request(&["P"], 1)).await.unwrap();
    let versions: Vec<u64> = response.roots.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![2, 3]);
    assert_eq!(response.targets.version, 2);
    assert_eq!(&response.config_files[0].raw[..], b"two");

    // Fully acknowledged clients get no roots.
    let response = service.get_configs_for(&request(&["P"], 3)).await.unwrap();
    assert!(response.roots.is_empty());

    // Polling counts as being seen.
    assert_eq!(service.active_clients(rcfg::core::now_millis()).len(), 1);
}

#[tokio::test]
async fn test_failed_refresh_changes_nothing() {
    let backend = Arc::new(StaticBackend::new());
    let service = service(backend.clone()).await;
    let mut scenario = Scenario::new(ORG);

    backend.push_bundle(scenario.publish(&[("2/P/c/a", "v1")]));
    service.refresh().await.unwrap();
    let before = service.uptane().state().await;

    // Transport failure: staged products stay staged.
    service.register_subscriber([Product::new("NEW")], |_| Ok(()));
    backend.push_error(BackendError::Transport("connection refused".into()));
    let err = service.refresh().await.unwrap_err();
    assert!(matches!(err, ServiceError::Backend(BackendError::Transport(_))));
    assert!(service.new_products().contains(&Product::new("NEW")));

    // Verification failure: director changes a file the config repo did not.
    backend.push_bundle(scenario.publish_split(&[("2/P/c/a", "v1")], &[("2/P/c/a", "v2")]));
    let err = service.refresh().await.unwrap_err();
    assert!(matches!(err, ServiceError::Uptane(UptaneError::Verification(_))));

    assert_eq!(service.uptane().state().await, before);
    assert!(service.new_products().contains(&Product::new("NEW")));
    let response = service.get_configs_for(&request(&["P"], 0)).await.unwrap();
    assert_eq!(&response.config_files[0].raw[..], b"v1");
}

#[tokio::test]
async fn test_first_refresh_requests_full_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rcfg.db");
    let mut scenario = Scenario::new(ORG);
    let bundle = scenario.publish(&[("2/P/c/a", "persisted")]);

    {
        let backend = Arc::new(StaticBackend::new());
        backend.push_bundle(bundle.clone());
        let service = DistributionService::new(config(), SqliteStore::open(&path).unwrap(), backend)
            .await
            .unwrap();
        service.refresh().await.unwrap();
    }

    let backend = Arc::new(StaticBackend::new());
    backend.push_bundle(bundle.clone());
    backend.push_bundle(bundle);
    let service = DistributionService::new(config(), SqliteStore::open(&path).unwrap(), backend.clone())
        .await
        .unwrap();

    // Persisted state is served before any refresh.
    let response = service.get_configs_for(&request(&["P"], 0)).await.unwrap();
    assert_eq!(&response.config_files[0].raw[..], b"persisted");

    service.refresh().await.unwrap();
    service.refresh().await.unwrap();
    let sent = backend.requests();
    assert_eq!(sent[0].director_targets_version, 0);
    assert_eq!(sent[1].director_targets_version, 1);
}

#[tokio::test]
async fn test_invalid_target_path_is_reported() {
    let backend = Arc::new(StaticBackend::new());
    let service = service(backend.clone()).await;
    let mut scenario = Scenario::new(ORG);
    backend.push_bundle(scenario.publish(&[("2/not-a-config-path", "x")]));
    service.refresh().await.unwrap();

    let err = service.get_configs_for(&request(&["P"], 0)).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidConfigPath(_)));
}

#[tokio::test]
async fn test_fetch_timeout() {
    let backend = Arc::new(StaticBackend::new());
    backend.set_delay(Some(Duration::from_millis(500)));
    backend.push_bundle(Scenario::new(ORG).publish(&[]));

    let config = ServiceConfig {
        fetch_timeout: Duration::from_millis(20),
        ..config()
    };
    let service = DistributionService::new(config, Arc::new(MemoryStore::new()), backend)
        .await
        .unwrap();

    let err = service.refresh().await.unwrap_err();
    assert!(matches!(err, ServiceError::Backend(BackendError::Timeout(_))));
    assert!(service.uptane().state().await.is_empty());
}

#[tokio::test]
async fn test_subscribers_are_isolated_and_acknowledged() {
    let backend = Arc::new(StaticBackend::new());
    let service = service(backend.clone()).await;
    let mut scenario = Scenario::new(ORG);

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let good = service.register_subscriber([Product::new("APM")], move |update| {
        let paths: Vec<String> = update.config_files.iter().map(|f| f.path.clone()).collect();
        sink.lock().unwrap().push((update.targets_version, paths));
        Ok(())
    });

    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    let bad = service.register_subscriber([Product::new("ASM")], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("subscriber is broken")
    });

    let bundle = scenario.publish(&[("2/APM/a/x", "apm"), ("2/ASM/b/y", "asm")]);
    backend.push_bundle(bundle.clone());
    service.refresh().await.unwrap();

    assert_eq!(
        *received.lock().unwrap(),
        vec![(1, vec!["2/APM/a/x".to_string()])]
    );
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    let records = service.subscriptions();
    let cursor = |id: SubscriberId| {
        records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.last_acknowledged_version)
    };
    assert_eq!(cursor(good), Some(1));
    assert_eq!(cursor(bad), Some(0));

    // Same version again: only the failed subscriber is retried.
    backend.push_bundle(bundle);
    service.refresh().await.unwrap();
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 2);

    assert!(service.unregister_subscriber(bad));
    assert_eq!(service.subscriptions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_loop_runs_until_shutdown() {
    let backend = Arc::new(StaticBackend::new());
    let mut scenario = Scenario::new(ORG);
    let bundle = scenario.publish(&[("2/P/c/a", "x")]);
    backend.push_bundle(bundle.clone());
    backend.push_bundle(bundle);

    let config = ServiceConfig {
        refresh_interval: Duration::from_secs(1),
        ..config()
    };
    let service = Arc::new(
        DistributionService::new(config, Arc::new(MemoryStore::new()), backend.clone())
            .await
            .unwrap(),
    );
    assert_eq!(service.config().refresh_interval, Duration::from_secs(5));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = service.start(shutdown_rx);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(backend.requests().len(), 2);
    assert_eq!(service.uptane().state().await.director_targets_version, 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
