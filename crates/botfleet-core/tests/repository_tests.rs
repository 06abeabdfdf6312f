//! Tests for serialized snapshot access

use botfleet_core::storage::{MemorySnapshotStore, Snapshot};
use botfleet_core::{InstanceId, InstanceRecord, InstanceRepository, InstanceStatus, NewInstance};
use std::sync::Arc;

fn record(name: &str, port: u16) -> InstanceRecord {
    InstanceRecord::new(
        InstanceId::new(),
        NewInstance {
            name: name.to_string(),
            phone_number: "1555000".to_string(),
            owner_id: None,
        },
        port,
    )
}

#[tokio::test]
async fn test_update_missing_record_does_not_write() {
    let backend = MemorySnapshotStore::new();
    let repo = InstanceRepository::new(Arc::new(backend.clone()));

    let result = repo
        .update(InstanceId::new(), |r| r.set_status(InstanceStatus::Running))
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(backend.save_count(), 0);
}

#[tokio::test]
async fn test_update_bumps_updated_at() {
    let repo = InstanceRepository::new(Arc::new(MemorySnapshotStore::new()));
    let r = record("alpha", 4001);
    let created = r.updated_at;
    repo.insert(r.clone()).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let updated = repo
        .update(r.id, |rec| rec.pid = Some(77))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.pid, Some(77));
    assert!(updated.updated_at > created);
    assert_eq!(repo.get(r.id).await.unwrap().pid, Some(77));
}

#[tokio::test]
async fn test_concurrent_updates_to_different_records_are_kept() {
    let repo = Arc::new(InstanceRepository::new(Arc::new(MemorySnapshotStore::new())));

    let mut ids = Vec::new();
    for i in 0..20 {
        let r = record(&format!("bot-{i}"), 4001 + i);
        ids.push(r.id);
        repo.insert(r).await.unwrap();
    }

    let mut handles = Vec::new();
    for (i, id) in ids.iter().copied().enumerate() {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.update(id, |r| r.pid = Some(1000 + i as u32))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(repo.get(*id).await.unwrap().pid, Some(1000 + i as u32));
    }
}

#[tokio::test]
async fn test_reconcile_demotes_running_records() {
    let mut running = record("running", 4001);
    running.set_status(InstanceStatus::Running);
    running.pid = Some(999);
    let mut stopped = record("stopped", 4002);
    stopped.set_status(InstanceStatus::Stopped);
    let mut failed = record("failed", 4003);
    failed.fail("boom");

    let mut snapshot = Snapshot::new();
    for r in [&running, &stopped, &failed] {
        snapshot.insert(r.id, r.clone());
    }
    let repo = InstanceRepository::new(Arc::new(MemorySnapshotStore::with_snapshot(snapshot)));

    assert_eq!(repo.reconcile_on_boot().await.unwrap(), 1);

    let after = repo.get(running.id).await.unwrap();
    assert_eq!(after.status, InstanceStatus::Stopped);
    assert_eq!(after.pid, Some(999));
    assert_eq!(repo.get(stopped.id).await.unwrap().status, InstanceStatus::Stopped);
    assert_eq!(repo.get(failed.id).await.unwrap().status, InstanceStatus::Error);

    // Idempotent
    assert_eq!(repo.reconcile_on_boot().await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_is_oldest_first_and_max_port() {
    let repo = InstanceRepository::new(Arc::new(MemorySnapshotStore::new()));
    assert!(repo.max_port().await.is_none());

    let first = record("first", 4005);
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = record("second", 4003);
    repo.insert(second.clone()).await.unwrap();
    repo.insert(first.clone()).await.unwrap();

    let names: Vec<_> = repo.list().await.into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(repo.max_port().await, Some(4005));

    assert!(repo.remove(first.id).await.unwrap().is_some());
    assert!(repo.remove(first.id).await.unwrap().is_none());
    assert_eq!(repo.list().await.len(), 1);
}
