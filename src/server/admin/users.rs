use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{RequireAdmin, issue_token};
use crate::server::AppState;
use crate::server::extract::{ApiJson, ApiPath, ApiQuery};
use crate::server::dto::{
    CreateTokenResponse, CreateUserRequest, CreateUserTokenRequest, PaginationParams, TokenResponse,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_email;
use crate::types::User;

pub async fn create_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> impl IntoResponse {
    let email = validate_email(&req.email).map_err(ApiError::bad_request)?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        full_name: req
            .full_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        created_at: now,
        updated_at: now,
    };

    match state.store.create_user(&user) {
        Ok(()) => {}
        Err(crate::error::Error::AlreadyExists) => {
            return Err(ApiError::conflict("A user with this email already exists"));
        }
        Err(e) => return Err(ApiError::from(e)),
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let users = state
        .store
        .list_users(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list users")?;

    let (users, next_cursor, has_more) =
        paginate(users, DEFAULT_PAGE_SIZE as usize, |u| u.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(users, next_cursor, has_more)))
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

/// Removes the user with their tokens and memberships.
pub async fn delete_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> impl IntoResponse {
    let deleted = state
        .store
        .delete_user(&id)
        .api_err("Failed to delete user")?;

    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_user_tokens(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let tokens = state
        .store
        .list_user_tokens(&user.id)
        .api_err("Failed to list user tokens")?;

    let responses: Vec<TokenResponse> = tokens.into_iter().map(TokenResponse::from).collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(responses)))
}

pub async fn create_user_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<CreateUserTokenRequest>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    if req.expires_in_seconds.is_some_and(|s| s < 0) {
        return Err(ApiError::bad_request(
            "expires_in_seconds cannot be negative",
        ));
    }

    let expires_at = req
        .expires_in_seconds
        .map(|s| Utc::now() + Duration::seconds(s));

    let (raw_token, token) = issue_token(state.store.as_ref(), Some(user.id.as_str()), false, expires_at)
        .api_err("Failed to create token")?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreateTokenResponse {
            token: raw_token,
            metadata: TokenResponse::from(token),
        })),
    ))
}
