use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::IntoResponse,
};

use super::is_expired;
use crate::repository::decorate;
use crate::schema::{self, entities::SHARE_LINK};
use crate::server::AppState;
use crate::server::extract::ApiPath;
use crate::server::dto::SharedRecordResponse;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};

/// Public read of the record a share link points at. Expired links and
/// deleted targets look the same as unknown tokens.
pub async fn resolve_share_link(
    State(state): State<Arc<AppState>>,
    ApiPath(token): ApiPath<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let link = store
        .get_record_by_unique(&SHARE_LINK, "token", &token)
        .api_err("Failed to get share link")?
        .filter(|link| !is_expired(link))
        .or_not_found("Share link not found")?;

    let def = link
        .get_str("entity_type")
        .and_then(schema::lookup)
        .or_not_found("Share link not found")?;
    let id = link.get_str("entity_id").unwrap_or_default();

    let mut record = store
        .get_record(def, &link.tenant_id, id, false)
        .api_err("Failed to get shared record")?
        .or_not_found("Share link not found")?;
    decorate(def, &mut record);

    Ok::<_, ApiError>(Json(ApiResponse::success(SharedRecordResponse {
        entity: def.name,
        record,
    })))
}
