use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::extract::{ApiJson, ApiPath};
use crate::server::dto::MembershipRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::parse_roles;
use crate::types::Membership;

pub async fn list_members(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> impl IntoResponse {
    let tenant = state
        .store
        .get_tenant(&id)
        .api_err("Failed to get tenant")?
        .or_not_found("Tenant not found")?;

    let members = state
        .store
        .list_tenant_memberships(&tenant.id)
        .api_err("Failed to list members")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(members)))
}

pub async fn get_member(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath((id, user_id)): ApiPath<(String, String)>,
) -> impl IntoResponse {
    let membership = state
        .store
        .get_membership(&id, &user_id)
        .api_err("Failed to get membership")?
        .or_not_found("Membership not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(membership)))
}

/// Sets the user's roles in the tenant, creating the membership if needed.
pub async fn put_member(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath((id, user_id)): ApiPath<(String, String)>,
    ApiJson(req): ApiJson<MembershipRequest>,
) -> impl IntoResponse {
    let roles = parse_roles(&req.roles)?;

    state
        .store
        .get_tenant(&id)
        .api_err("Failed to get tenant")?
        .or_not_found("Tenant not found")?;
    state
        .store
        .get_user(&user_id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let existing = state
        .store
        .get_membership(&id, &user_id)
        .api_err("Failed to get membership")?;

    let now = Utc::now();
    let membership = Membership {
        tenant_id: id,
        user_id,
        roles,
        created_at: existing.as_ref().map_or(now, |m| m.created_at),
        updated_at: now,
    };

    state
        .store
        .upsert_membership(&membership)
        .api_err("Failed to save membership")?;

    let status = if existing.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok::<_, ApiError>((status, Json(ApiResponse::success(membership))))
}

pub async fn delete_member(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath((id, user_id)): ApiPath<(String, String)>,
) -> impl IntoResponse {
    let deleted = state
        .store
        .delete_membership(&id, &user_id)
        .api_err("Failed to delete membership")?;

    if !deleted {
        return Err(ApiError::not_found("Membership not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
