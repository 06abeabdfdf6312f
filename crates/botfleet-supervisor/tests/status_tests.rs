//! Status aggregation against stub workers on localhost

mod common;

use botfleet_core::storage::Snapshot;
use botfleet_core::{InstanceId, InstanceRecord, InstanceStatus, MemorySnapshotStore, SnapshotStore};
use common::{closed_port, garbage_stub, harness_with, new_instance, slow_stub, worker_stub};
use serde_json::json;
use std::time::{Duration, Instant};

fn paired_worker() -> serde_json::Value {
    json!({
        "status": "running",
        "pairingCode": "K7QX-2M4P",
        "pairingCodeValid": true,
        "pairingCodeRemainingSeconds": 120,
        "pairingCodeExpiresAt": "2026-10-16T12:02:00Z",
        "user": null
    })
}

#[tokio::test]
async fn test_full_instance_lifecycle() {
    let port = worker_stub(paired_worker()).await;
    let h = harness_with(MemorySnapshotStore::new(), |mut c| {
        c.base_port = port - 1;
        c
    })
    .await;

    let record = h.supervisor.create(new_instance("support", "1555000")).await.unwrap();
    assert_eq!(record.status, InstanceStatus::Starting);
    assert_eq!(record.port, Some(port));

    // Worker answers: live status replaces the durable one
    let view = h.supervisor.get(record.id).await.unwrap();
    assert_eq!(view.status, "running");
    assert_eq!(view.pairing_code.as_deref(), Some("K7QX-2M4P"));

    let pairing = h.supervisor.get_pairing_code(record.id).await.unwrap();
    assert!(pairing.pairing_code_valid);
    assert_eq!(pairing.pairing_code_remaining_seconds, 120);
    assert_eq!(pairing.pairing_code_expires_at, Some(json!("2026-10-16T12:02:00Z")));

    // Reads never write the polled status back
    assert_eq!(
        h.store.load().await[&record.id].status,
        InstanceStatus::Starting
    );

    h.supervisor.stop(record.id).await.unwrap();
    let pairing = h.supervisor.get_pairing_code(record.id).await.unwrap();
    assert_eq!(pairing.status, "stopped");
    assert!(pairing.pairing_code.is_none());

    h.supervisor.delete(record.id).await.unwrap();
    assert!(h.supervisor.list().await.iter().all(|v| v.id != record.id));
}

#[tokio::test]
async fn test_unreachable_running_worker_reads_offline() {
    let port = closed_port().await;
    let h = harness_with(MemorySnapshotStore::new(), |mut c| {
        c.base_port = port - 1;
        c
    })
    .await;

    let record = h.supervisor.create(new_instance("quiet", "1555000")).await.unwrap();
    h.supervisor.stop(record.id).await.unwrap();
    h.supervisor.start(record.id).await.unwrap();

    let view = h.supervisor.get(record.id).await.unwrap();
    assert_eq!(view.status, "offline");
    assert!(view.pairing_code.is_none());
    assert!(view.connected_user.is_none());

    let pairing = h.supervisor.get_pairing_code(record.id).await.unwrap();
    assert_eq!(pairing.status, "offline");
    assert!(pairing.pairing_code.is_none());
}

#[tokio::test]
async fn test_malformed_status_reads_offline() {
    let port = garbage_stub().await;
    let h = harness_with(MemorySnapshotStore::new(), |mut c| {
        c.base_port = port - 1;
        c
    })
    .await;

    let record = h.supervisor.create(new_instance("garbled", "1555000")).await.unwrap();
    h.supervisor.restart(record.id).await.unwrap();

    let live = h.supervisor.query_status(record.id).await.unwrap();
    assert!(live.is_offline());
}

#[tokio::test]
async fn test_slow_worker_times_out_to_offline() {
    let port = slow_stub(Duration::from_secs(3)).await;
    let h = harness_with(MemorySnapshotStore::new(), |mut c| {
        c.base_port = port - 1;
        c.status_timeout = Duration::from_millis(200);
        c
    })
    .await;

    let record = h.supervisor.create(new_instance("slow", "1555000")).await.unwrap();
    h.supervisor.restart(record.id).await.unwrap();

    let started = Instant::now();
    let view = h.supervisor.get(record.id).await.unwrap();
    assert_eq!(view.status, "offline");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_orphan_pid_is_polled_after_boot() {
    let port = worker_stub(json!({ "status": "connected", "user": { "id": "1555000@s.whatsapp.net" } })).await;

    let mut orphan = InstanceRecord::new(InstanceId::new(), new_instance("orphan", "1555000"), port);
    orphan.set_status(InstanceStatus::Running);
    orphan.pid = Some(77_777);
    let mut gone = InstanceRecord::new(InstanceId::new(), new_instance("gone", "1555001"), port);
    gone.set_status(InstanceStatus::Running);
    gone.pid = Some(77_778);

    let mut snapshot = Snapshot::new();
    snapshot.insert(orphan.id, orphan.clone());
    snapshot.insert(gone.id, gone.clone());
    let h = harness_with(MemorySnapshotStore::with_snapshot(snapshot), |c| c).await;
    h.launcher.mark_alive(77_777);

    // Something still holds the orphan's pid, so its endpoint is consulted
    let view = h.supervisor.get(orphan.id).await.unwrap();
    assert_eq!(view.status, "connected");
    assert_eq!(view.connected_user, Some(json!({ "id": "1555000@s.whatsapp.net" })));

    // Nothing holds this pid: durable status, no poll
    let view = h.supervisor.get(gone.id).await.unwrap();
    assert_eq!(view.status, "stopped");
    assert!(view.connected_user.is_none());

    // Not owned by this run, so it cannot be stopped here
    assert!(h.supervisor.stop(orphan.id).await.is_err());
}
