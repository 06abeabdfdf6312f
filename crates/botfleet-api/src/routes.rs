//! Route table

use crate::handlers;
use axum::routing::{get, post};
use axum::Router;
use botfleet_supervisor::Supervisor;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub type AppState = Arc<Supervisor>;

pub fn create_router(supervisor: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route(
            "/api/instances",
            get(handlers::list_instances).post(handlers::create_instance),
        )
        .route(
            "/api/instances/{id}",
            get(handlers::get_instance).delete(handlers::delete_instance),
        )
        .route(
            "/api/instances/{id}/pairing-code",
            get(handlers::get_pairing_code),
        )
        .route("/api/instances/{id}/start", post(handlers::start_instance))
        .route("/api/instances/{id}/stop", post(handlers::stop_instance))
        .route("/api/instances/{id}/restart", post(handlers::restart_instance))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(supervisor)
}
