use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use super::access::{Authorized, Create, Destroy, Edit, Import, Read, require};
use crate::error::Error;
use crate::schema;
use crate::server::AppState;
use crate::server::extract::{ApiJson, ApiPath, ApiQuery};
use crate::server::dto::{
    AutocompleteParams, DestroyAllParams, DestroyResponse, FindParams, ImportRequest,
    RecordListResponse, RecordPath, RecordRequest, RelationPath,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::service::EntityService;
use crate::store::RecordQuery;
use crate::types::Action;

pub async fn list(
    auth: Authorized<Read>,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<HashMap<String, String>>,
) -> impl IntoResponse {
    let query = RecordQuery::from_params(auth.def, &params)?;
    let service = EntityService::new(state.store.as_ref(), auth.def, &auth.ctx);

    let (rows, count) = service.find_and_count_all(&query)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(RecordListResponse { rows, count })))
}

pub async fn create(
    auth: Authorized<Create>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RecordRequest>,
) -> impl IntoResponse {
    let service = EntityService::new(state.store.as_ref(), auth.def, &auth.ctx);

    let record = service.create(&req.data)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

pub async fn import(
    auth: Authorized<Import>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ImportRequest>,
) -> impl IntoResponse {
    let service = EntityService::new(state.store.as_ref(), auth.def, &auth.ctx);

    let record = service.import(&req.data, &req.import_hash)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

pub async fn autocomplete(
    auth: Authorized<Read>,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<AutocompleteParams>,
) -> impl IntoResponse {
    let service = EntityService::new(state.store.as_ref(), auth.def, &auth.ctx);

    let items = service.autocomplete(params.query.as_deref(), params.limit)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(items)))
}

/// Soft-deleted rows are only visible to roles that may destroy them.
pub async fn find(
    auth: Authorized<Read>,
    State(state): State<Arc<AppState>>,
    ApiPath(path): ApiPath<RecordPath>,
    ApiQuery(params): ApiQuery<FindParams>,
) -> impl IntoResponse {
    let service = EntityService::new(state.store.as_ref(), auth.def, &auth.ctx);

    let record = if params.include_deleted {
        require(&auth.ctx, auth.def, Action::Destroy)?;
        service.find_by_id_with_deleted(&path.id)?
    } else {
        service.find_by_id(&path.id)?
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(record)))
}

pub async fn update(
    auth: Authorized<Edit>,
    State(state): State<Arc<AppState>>,
    ApiPath(path): ApiPath<RecordPath>,
    ApiJson(req): ApiJson<RecordRequest>,
) -> impl IntoResponse {
    let service = EntityService::new(state.store.as_ref(), auth.def, &auth.ctx);

    let record = service.update(&path.id, &req.data)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(record)))
}

pub async fn destroy(
    auth: Authorized<Destroy>,
    State(state): State<Arc<AppState>>,
    ApiPath(path): ApiPath<RecordPath>,
) -> impl IntoResponse {
    let service = EntityService::new(state.store.as_ref(), auth.def, &auth.ctx);

    service.destroy(&path.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(DestroyResponse { count: 1 })))
}

pub async fn destroy_all(
    auth: Authorized<Destroy>,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<DestroyAllParams>,
) -> impl IntoResponse {
    let ids: Vec<String> = params.ids.split(',').map(str::to_string).collect();
    let service = EntityService::new(state.store.as_ref(), auth.def, &auth.ctx);

    let count = service.destroy_all(&ids)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(DestroyResponse { count })))
}

/// Lists has-many children; the caller must also be able to read the child
/// entity.
pub async fn children(
    auth: Authorized<Read>,
    State(state): State<Arc<AppState>>,
    ApiPath(path): ApiPath<RelationPath>,
    ApiQuery(params): ApiQuery<HashMap<String, String>>,
) -> impl IntoResponse {
    let child = auth
        .def
        .has_many(&path.relation)
        .and_then(|(target, _)| schema::lookup(target))
        .ok_or(Error::NotFound)?;
    require(&auth.ctx, child, Action::Read)?;

    let query = RecordQuery::from_params(child, &params)?;
    let service = EntityService::new(state.store.as_ref(), auth.def, &auth.ctx);

    let (_, rows, count) = service.children(&path.id, &path.relation, query)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(RecordListResponse { rows, count })))
}
