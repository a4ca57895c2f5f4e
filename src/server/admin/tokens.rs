use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::extract::{ApiPath, ApiQuery};
use crate::server::dto::{PaginationParams, TokenResponse};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};

pub async fn list_tokens(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let tokens = state
        .store
        .list_tokens(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list tokens")?;

    let (tokens, next_cursor, has_more) =
        paginate(tokens, DEFAULT_PAGE_SIZE as usize, |t| t.id.clone());

    let responses: Vec<TokenResponse> = tokens.into_iter().map(TokenResponse::from).collect();

    Ok::<_, ApiError>(Json(PaginatedResponse::new(
        responses,
        next_cursor,
        has_more,
    )))
}

pub async fn get_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> impl IntoResponse {
    let token = state
        .store
        .get_token_by_id(&id)
        .api_err("Failed to get token")?
        .or_not_found("Token not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(TokenResponse::from(token))))
}

pub async fn delete_token(
    RequireAdmin(current): RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> impl IntoResponse {
    if current.id == id {
        return Err(ApiError::bad_request("Cannot delete the token in use"));
    }

    let deleted = state
        .store
        .delete_token(&id)
        .api_err("Failed to delete token")?;

    if !deleted {
        return Err(ApiError::not_found("Token not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
