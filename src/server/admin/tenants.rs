use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::extract::{ApiJson, ApiPath, ApiQuery};
use crate::server::dto::{CreateTenantRequest, PaginationParams};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_tenant_name;
use crate::types::Tenant;

pub async fn create_tenant(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateTenantRequest>,
) -> impl IntoResponse {
    let name = validate_tenant_name(&req.name)?;

    let now = Utc::now();
    let tenant = Tenant {
        id: Uuid::new_v4().to_string(),
        name,
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .create_tenant(&tenant)
        .api_err("Failed to create tenant")?;

    tracing::info!(tenant = %tenant.id, "created tenant");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(tenant))))
}

pub async fn list_tenants(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let tenants = state
        .store
        .list_tenants(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list tenants")?;

    let (tenants, next_cursor, has_more) =
        paginate(tenants, DEFAULT_PAGE_SIZE as usize, |t| t.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(tenants, next_cursor, has_more)))
}

pub async fn get_tenant(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> impl IntoResponse {
    let tenant = state
        .store
        .get_tenant(&id)
        .api_err("Failed to get tenant")?
        .or_not_found("Tenant not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(tenant)))
}

/// Deleting a tenant removes every row it owns.
pub async fn delete_tenant(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> impl IntoResponse {
    let deleted = state
        .store
        .delete_tenant(&id)
        .api_err("Failed to delete tenant")?;

    if !deleted {
        return Err(ApiError::not_found("Tenant not found"));
    }

    tracing::info!(tenant = %id, "deleted tenant");

    Ok(StatusCode::NO_CONTENT)
}
