use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Json, Router, routing::get};

use super::admin::admin_router;
use super::response::ApiResponse;
use super::tenant::tenant_router;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OK"))
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", tenant_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
