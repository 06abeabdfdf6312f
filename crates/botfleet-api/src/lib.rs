//! Botfleet HTTP API Server
//!
//! Thin REST layer over the supervisor:
//! - Create, list, inspect and delete bot instances
//! - Start, stop and restart their workers
//! - Read live pairing codes

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;

use axum::Router;
use botfleet_supervisor::Supervisor;
use std::sync::Arc;

pub fn create_app(supervisor: Arc<Supervisor>) -> Router {
    routes::create_router(supervisor)
}
