//! Watch driver tests: informer events flowing into the reconciler.

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sbomsync_cluster::WatchEvent;
use sbomsync_daemon::watch::WatchDriver;

use common::{FakeCatalog, FakeCluster, FakeScanner, fixture, pod, wait_until};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn initial_sync_runs_full_pass_then_follows_events() {
    let f = fixture(
        FakeCluster::default(),
        FakeScanner::default(),
        FakeCatalog::default().with_asset("ns1", "registry.io/stale"),
    );
    let tx = f.cluster.watch_channel();
    let cancel = CancellationToken::new();
    let driver = WatchDriver::new(f.cluster.clone(), f.reconciler.clone(), None, WAIT);
    let run = tokio::spawn(driver.run(cancel.clone()));

    let a = pod("ns1", "a", &[("app", "registry.io/app:1.0")]);
    tx.send(Ok(WatchEvent::Init)).unwrap();
    tx.send(Ok(WatchEvent::InitApply(a.clone()))).unwrap();
    tx.send(Ok(WatchEvent::InitDone)).unwrap();

    assert!(wait_until(WAIT, || f.catalog.has_asset("ns1", "registry.io/app")).await);
    assert!(wait_until(WAIT, || !f.catalog.has_asset("ns1", "registry.io/stale")).await);

    let b = pod("ns2", "b", &[("web", "registry.io/web:2")]);
    tx.send(Ok(WatchEvent::Apply(b))).unwrap();
    assert!(wait_until(WAIT, || f.catalog.has_asset("ns2", "registry.io/web")).await);

    tx.send(Ok(WatchEvent::Delete(a))).unwrap();
    assert!(wait_until(WAIT, || !f.catalog.has_asset("ns1", "registry.io/app")).await);

    cancel.cancel();
    let summary = run.await.unwrap();
    assert!(!summary.timed_out);
    // synced, added, deleted
    assert_eq!(summary.events, 3);
    assert_eq!(f.scanner.calls().len(), 2);
    let mut marked = f.cluster.marked();
    marked.sort();
    assert_eq!(marked, vec!["ns1/a", "ns2/b"]);
}

#[tokio::test]
async fn events_for_one_pod_are_handled_in_arrival_order() {
    let f = fixture(
        FakeCluster::default(),
        FakeScanner::with_delay(Duration::from_millis(50)),
        FakeCatalog::default(),
    );
    let tx = f.cluster.watch_channel();
    let cancel = CancellationToken::new();
    let driver = WatchDriver::new(f.cluster.clone(), f.reconciler.clone(), None, WAIT);
    let run = tokio::spawn(driver.run(cancel.clone()));

    tx.send(Ok(WatchEvent::Init)).unwrap();
    tx.send(Ok(WatchEvent::InitDone)).unwrap();
    assert!(wait_until(WAIT, || f.reconciler.stats().full_passes == 1).await);

    tx.send(Ok(WatchEvent::Apply(pod("ns1", "p", &[("app", "registry.io/app:1.0")]))))
        .unwrap();
    tx.send(Ok(WatchEvent::Apply(pod("ns1", "p", &[("app", "registry.io/app:2.0")]))))
        .unwrap();

    assert!(wait_until(WAIT, || f.catalog.log().len() == 3).await);
    assert_eq!(
        f.catalog.log(),
        vec![
            "upload ns1/registry.io/app:1.0",
            "remove ns1/registry.io/app",
            "upload ns1/registry.io/app:2.0",
        ]
    );

    cancel.cancel();
    run.await.unwrap();
}

#[tokio::test]
async fn watch_errors_do_not_stop_the_driver() {
    let f = fixture(FakeCluster::default(), FakeScanner::default(), FakeCatalog::default());
    let tx = f.cluster.watch_channel();
    let cancel = CancellationToken::new();
    let driver = WatchDriver::new(f.cluster.clone(), f.reconciler.clone(), None, WAIT);
    let run = tokio::spawn(driver.run(cancel.clone()));

    tx.send(Err(sbomsync_core::error::ClusterError::Watch("410 Gone".to_owned())))
        .unwrap();
    tx.send(Ok(WatchEvent::Init)).unwrap();
    tx.send(Ok(WatchEvent::InitApply(pod("ns1", "p", &[("app", "registry.io/app:1.0")]))))
        .unwrap();
    tx.send(Ok(WatchEvent::InitDone)).unwrap();

    assert!(wait_until(WAIT, || f.catalog.has_asset("ns1", "registry.io/app")).await);
    cancel.cancel();
    run.await.unwrap();
}

#[tokio::test]
async fn closed_stream_ends_the_run() {
    let f = fixture(FakeCluster::default(), FakeScanner::default(), FakeCatalog::default());
    let tx = f.cluster.watch_channel();
    let driver = WatchDriver::new(f.cluster.clone(), f.reconciler.clone(), None, WAIT);
    drop(tx);

    let summary = tokio::time::timeout(WAIT, driver.run(CancellationToken::new()))
        .await
        .unwrap();
    assert_eq!(summary.events, 0);
}

#[tokio::test]
async fn shutdown_reports_handlers_past_the_deadline() {
    let f = fixture(
        FakeCluster::default(),
        FakeScanner::with_delay(Duration::from_secs(30)),
        FakeCatalog::default(),
    );
    let tx = f.cluster.watch_channel();
    let cancel = CancellationToken::new();
    let driver = WatchDriver::new(
        f.cluster.clone(),
        f.reconciler.clone(),
        None,
        Duration::from_millis(50),
    );
    let run = tokio::spawn(driver.run(cancel.clone()));

    tx.send(Ok(WatchEvent::Init)).unwrap();
    tx.send(Ok(WatchEvent::InitDone)).unwrap();
    tx.send(Ok(WatchEvent::Apply(pod("ns1", "p", &[("app", "registry.io/app:1.0")]))))
        .unwrap();
    assert!(wait_until(WAIT, || !f.scanner.calls().is_empty()).await);

    cancel.cancel();
    let summary = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
    assert!(summary.timed_out);
}
