//! Reconciliation and scheduler tests

mod common;

use std::time::Duration;

use common::{admin, alice, setup, TRASH};
use filedex_core::domain::ActorId;
use filedex_sync::{ChangeEvent, ReconcileReason, ReconcileScheduler};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SyncReconciler
// ============================================================================

#[tokio::test]
async fn test_reconcile_indexes_unknown_objects_once() {
    let engine = setup().await;
    std::fs::create_dir_all(engine.root.join("Photos/2024")).unwrap();
    std::fs::write(engine.root.join("Photos/2024/beach.jpg"), b"jpeg").unwrap();
    std::fs::write(engine.root.join("notes.md"), b"# notes").unwrap();

    let first = engine.ops.reconcile(&admin()).await.unwrap();
    assert_eq!(first.created_count, 4);
    assert!(first.missing.is_empty());
    assert!(first.skipped.is_empty());

    let photos = engine.ops.index().child_named(None, "Photos").await.unwrap().unwrap();
    assert_eq!(photos.owner_id(), &ActorId::system());
    let year = engine.ops.index().child_named(Some(photos.id()), "2024").await.unwrap().unwrap();
    let beach = engine.ops.index().child_named(Some(year.id()), "beach.jpg").await.unwrap().unwrap();
    assert_eq!(beach.size(), 4);
    assert_eq!(beach.path(), engine.root.join("Photos/2024/beach.jpg"));

    let second = engine.ops.reconcile(&admin()).await.unwrap();
    assert!(second.is_clean(), "{second:?}");
    assert_eq!(engine.ops.index().all().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_reconcile_reports_missing_without_deleting() {
    let engine = setup().await;
    let work = engine.ops.create_folder(&alice(), "Work", None).await.unwrap();
    let plan = engine.ops.create_file(&alice(), "plan.txt", Some(work.id())).await.unwrap();
    std::fs::remove_file(engine.root.join("Work/plan.txt")).unwrap();

    let report = engine.ops.reconcile(&admin()).await.unwrap();
    assert_eq!(report.missing, vec![engine.root.join("Work/plan.txt")]);
    assert_eq!(report.created_count, 0);
    assert!(engine.ops.index().find(plan.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reconcile_skips_kind_mismatch_and_case_clash() {
    let engine = setup().await;
    engine.ops.create_file(&alice(), "thing", None).await.unwrap();
    std::fs::remove_file(engine.root.join("thing")).unwrap();
    std::fs::create_dir(engine.root.join("thing")).unwrap();

    let work = engine.ops.create_folder(&alice(), "Work", None).await.unwrap();
    std::fs::write(engine.root.join("Work/README"), b"a").unwrap();
    std::fs::write(engine.root.join("Work/readme"), b"b").unwrap();

    let report = engine.ops.reconcile(&admin()).await.unwrap();
    let skipped: Vec<_> = report.skipped.iter().map(|s| s.path.clone()).collect();
    assert!(skipped.contains(&engine.root.join("thing")));
    assert_eq!(report.created_count, 1);
    assert_eq!(skipped.len(), 2);

    // exactly one of the two case variants got indexed
    assert_eq!(engine.ops.list_children(Some(work.id())).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reconcile_ignores_trash_containers() {
    let engine = setup().await;
    let file = engine.ops.create_file(&alice(), "a.txt", None).await.unwrap();
    engine.ops.soft_delete(&alice(), file.id()).await.unwrap();
    std::fs::write(engine.root.join(TRASH).join("stray.txt"), b"x").unwrap();

    let report = engine.ops.reconcile(&admin()).await.unwrap();
    assert!(report.is_clean(), "{report:?}");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_reconcile_reports_non_utf8_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let engine = setup().await;
    let bad = engine.root.join(OsStr::from_bytes(b"bad\xffname"));
    std::fs::write(&bad, b"x").unwrap();
    std::fs::write(engine.root.join("good.txt"), b"y").unwrap();

    let report = engine.ops.reconcile(&admin()).await.unwrap();
    assert_eq!(report.created_count, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, bad);
    assert!(report.skipped[0].reason.contains("UTF-8"));

    // still reported on the next pass
    let again = engine.ops.reconcile(&admin()).await.unwrap();
    assert_eq!(again.created_count, 0);
    assert_eq!(again.skipped.len(), 1);
}

// ============================================================================
// ReconcileScheduler
// ============================================================================

#[tokio::test]
async fn test_scheduler_runs_pass_on_request() {
    let engine = setup().await;
    std::fs::write(engine.root.join("late.txt"), b"x").unwrap();

    let (mut scheduler, handle) = ReconcileScheduler::new(
        engine.ops.reconciler(),
        None,
        Duration::from_millis(10),
        Duration::from_secs(3600),
        TRASH,
    );
    assert!(handle.request(ReconcileReason::Requested));
    drop(handle);

    // the request channel closes once the handle is gone, ending the loop
    tokio::time::timeout(Duration::from_secs(5), scheduler.run(CancellationToken::new()))
        .await
        .expect("scheduler did not stop");
    assert_eq!(scheduler.runs(), 1);
    assert!(engine.ops.index().child_named(None, "late.txt").await.unwrap().is_some());
}

#[tokio::test]
async fn test_scheduler_flushes_debounced_changes_and_filters_trash() {
    let engine = setup().await;
    std::fs::write(engine.root.join("seen.txt"), b"x").unwrap();
    let (change_tx, change_rx) = mpsc::channel(8);

    let (mut scheduler, handle) = ReconcileScheduler::new(
        engine.ops.reconciler(),
        Some(change_rx),
        Duration::from_secs(3600),
        Duration::from_secs(3600),
        TRASH,
    );
    drop(handle);
    change_tx
        .send(ChangeEvent::Created(engine.root.join(TRASH).join("x")))
        .await
        .unwrap();
    drop(change_tx);

    tokio::time::timeout(Duration::from_secs(5), scheduler.run(CancellationToken::new()))
        .await
        .expect("scheduler did not stop");
    // the only change was inside a trash container
    assert_eq!(scheduler.runs(), 0);

    let (change_tx, change_rx) = mpsc::channel(8);
    let (mut scheduler, handle) = ReconcileScheduler::new(
        engine.ops.reconciler(),
        Some(change_rx),
        Duration::from_secs(3600),
        Duration::from_secs(3600),
        TRASH,
    );
    drop(handle);
    change_tx
        .send(ChangeEvent::Created(engine.root.join("seen.txt")))
        .await
        .unwrap();
    drop(change_tx);

    tokio::time::timeout(Duration::from_secs(5), scheduler.run(CancellationToken::new()))
        .await
        .expect("scheduler did not stop");
    assert_eq!(scheduler.runs(), 1);
    assert!(engine.ops.index().child_named(None, "seen.txt").await.unwrap().is_some());
}

#[tokio::test]
async fn test_scheduler_stops_on_shutdown() {
    let engine = setup().await;
    let (mut scheduler, handle) = ReconcileScheduler::new(
        engine.ops.reconciler(),
        None,
        Duration::from_millis(10),
        Duration::from_secs(3600),
        TRASH,
    );
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(5), scheduler.run(shutdown))
        .await
        .expect("scheduler did not stop");
    assert_eq!(scheduler.runs(), 0);

    drop(scheduler);
    assert!(!handle.request(ReconcileReason::Requested));
}
