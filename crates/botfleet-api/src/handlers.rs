//! Request handlers

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::Json;
use botfleet_core::{InstanceId, InstanceRecord, NewInstance};
use botfleet_supervisor::{InstanceView, PairingInfo, StartOutcome};
use chrono::Utc;
use serde_json::{json, Value};

const SERVICE: &str = "botfleet";

fn parse_id(raw: &str) -> ApiResult<InstanceId> {
    raw.parse().map_err(|_| ApiError::UnknownId(raw.to_string()))
}

fn start_ack(id: InstanceId, outcome: StartOutcome) -> Json<Value> {
    match outcome {
        StartOutcome::AlreadyRunning => Json(json!({
            "message": "Instance already running",
            "instance_id": id,
        })),
        StartOutcome::Started { port, pid } => Json(json!({
            "message": "Instance started",
            "instance_id": id,
            "port": port,
            "pid": pid,
        })),
    }
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Botfleet API is running" }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

pub async fn create_instance(
    State(supervisor): State<AppState>,
    Json(request): Json<NewInstance>,
) -> ApiResult<Json<InstanceRecord>> {
    Ok(Json(supervisor.create(request).await?))
}

pub async fn list_instances(State(supervisor): State<AppState>) -> Json<Value> {
    let instances = supervisor.list().await;
    let total = instances.len();
    Json(json!({ "instances": instances, "total": total }))
}

pub async fn get_instance(
    State(supervisor): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<InstanceView>> {
    let id = parse_id(&id)?;
    Ok(Json(supervisor.get(id).await?))
}

pub async fn get_pairing_code(
    State(supervisor): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PairingInfo>> {
    let id = parse_id(&id)?;
    Ok(Json(supervisor.get_pairing_code(id).await?))
}

pub async fn start_instance(
    State(supervisor): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let outcome = supervisor.start(id).await?;
    Ok(start_ack(id, outcome))
}

pub async fn stop_instance(
    State(supervisor): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    supervisor.stop(id).await?;
    Ok(Json(json!({ "message": "Instance stopped", "instance_id": id })))
}

pub async fn restart_instance(
    State(supervisor): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let outcome = supervisor.restart(id).await?;
    Ok(start_ack(id, outcome))
}

pub async fn delete_instance(
    State(supervisor): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    supervisor.delete(id).await?;
    Ok(Json(json!({ "message": "Instance deleted", "instance_id": id })))
}
