//! Races between tree operations

mod common;

use std::sync::Arc;

use common::{alice, setup, setup_with_workers};
use filedex_core::CoreError;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_same_name_one_wins() {
    let engine = setup().await;

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let ops = Arc::clone(&engine.ops);
        tasks.push(tokio::spawn(async move {
            ops.create_folder(&alice(), "X", None).await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(CoreError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!((created, conflicts), (1, 1));
    assert_eq!(engine.ops.list_children(None).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_subtrees_proceed_in_parallel() {
    let engine = setup_with_workers(8).await;
    let a = engine.ops.create_folder(&alice(), "A", None).await.unwrap();
    let b = engine.ops.create_folder(&alice(), "B", None).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let ops = Arc::clone(&engine.ops);
        let parent = if i % 2 == 0 { a.id() } else { b.id() };
        tasks.push(tokio::spawn(async move {
            ops.create_file(&alice(), &format!("file-{i}.txt"), Some(parent)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(engine.ops.list_children(Some(a.id())).await.unwrap().len(), 10);
    assert_eq!(engine.ops.list_children(Some(b.id())).await.unwrap().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_move_races_with_create_inside() {
    let engine = setup().await;
    let work = engine.ops.create_folder(&alice(), "Work", None).await.unwrap();
    let dest = engine.ops.create_folder(&alice(), "Dest", None).await.unwrap();
    let work_id = work.id();

    let mover = {
        let ops = Arc::clone(&engine.ops);
        tokio::spawn(async move { ops.move_entries(&alice(), &[work_id], Some(dest.id())).await })
    };
    let creator = {
        let ops = Arc::clone(&engine.ops);
        tokio::spawn(async move { ops.create_file(&alice(), "plan.txt", Some(work_id)).await })
    };

    let moved = mover.await.unwrap();
    assert!(moved[0].is_ok());
    let plan = creator.await.unwrap().unwrap();

    // whichever ran first, the file ends up below the moved folder
    let plan = engine.ops.get(plan.id()).await.unwrap();
    assert_eq!(plan.path(), engine.root.join("Dest/Work/plan.txt"));
    assert!(plan.path().is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reconcile_during_operations_sees_consistent_tree() {
    let engine = setup().await;
    let work = engine.ops.create_folder(&alice(), "Work", None).await.unwrap();

    let work_id = work.id();
    let mut tasks = Vec::new();
    for i in 0..10 {
        let ops = Arc::clone(&engine.ops);
        tasks.push(tokio::spawn(async move {
            ops.create_file(&alice(), &format!("{i}.txt"), Some(work_id)).await.map(|_| ())
        }));
    }
    let ops = Arc::clone(&engine.ops);
    let reconcile = tokio::spawn(async move { ops.reconcile(&alice()).await });

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    let report = reconcile.await.unwrap().unwrap();
    // operations index before they return, so the pass never adopts their objects
    assert_eq!(report.created_count, 0);
    assert!(report.missing.is_empty());
}
