//! Shared fixtures for supervisor tests

#![allow(dead_code)]

use axum::routing::get;
use axum::{Json, Router};
use botfleet_core::{MemorySnapshotStore, NewInstance};
use botfleet_supervisor::testing::FakeLauncher;
use botfleet_supervisor::{Supervisor, SupervisorConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Fast timings so lifecycle tests do not sit in sleeps
pub fn test_config(worker_dir: &Path) -> SupervisorConfig {
    SupervisorConfig {
        status_host: "127.0.0.1".to_string(),
        status_timeout: Duration::from_millis(300),
        stop_timeout: Duration::from_millis(50),
        restart_delay: Duration::from_millis(10),
        spawn_grace: Duration::from_millis(10),
        ..SupervisorConfig::default()
    }
    .with_worker_dir(worker_dir)
}

pub struct Harness {
    pub supervisor: Arc<Supervisor>,
    pub launcher: FakeLauncher,
    pub store: MemorySnapshotStore,
    pub dir: tempfile::TempDir,
}

pub async fn harness() -> Harness {
    harness_with(MemorySnapshotStore::new(), |c| c).await
}

pub async fn harness_with(
    store: MemorySnapshotStore,
    tweak: impl FnOnce(SupervisorConfig) -> SupervisorConfig,
) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    let config = tweak(test_config(dir.path()));
    let supervisor = Supervisor::boot(config, Arc::new(store.clone()), Arc::new(launcher.clone()))
        .await
        .unwrap();

    Harness {
        supervisor: Arc::new(supervisor),
        launcher,
        store,
        dir,
    }
}

pub fn new_instance(name: &str, phone: &str) -> NewInstance {
    NewInstance {
        name: name.to_string(),
        phone_number: phone.to_string(),
        owner_id: None,
    }
}

/// Serve a fixed `/status` body on an ephemeral localhost port
pub async fn worker_stub(body: serde_json::Value) -> u16 {
    let app = Router::new().route(
        "/status",
        get(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    );
    serve(app).await
}

/// Serve a raw, non-JSON `/status` body
pub async fn garbage_stub() -> u16 {
    let app = Router::new().route("/status", get(|| async { "definitely not json" }));
    serve(app).await
}

/// Serve a `/status` that answers only after `delay`
pub async fn slow_stub(delay: Duration) -> u16 {
    let app = Router::new().route(
        "/status",
        get(move || async move {
            tokio::time::sleep(delay).await;
            Json(serde_json::json!({ "status": "running" }))
        }),
    );
    serve(app).await
}

/// A localhost port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn serve(app: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}
