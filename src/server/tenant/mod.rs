mod access;
mod invitations;
mod records;
mod share;

use std::sync::Arc;

use axum::{
    Json,
    Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

pub use access::{Authorized, RequiredAction, TenantMember, resolve_member};

use crate::auth::RequireUser;
use crate::schema::validate::parse_datetime;
use crate::server::AppState;
use crate::server::dto::{PermissionsResponse, TenantMembershipResponse};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::types::Record;

pub fn tenant_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tenants", get(list_my_tenants))
        .route("/tenants/{tenant_id}/permissions", get(my_permissions))
        .route(
            "/tenants/{tenant_id}/{entity}",
            get(records::list)
                .post(records::create)
                .delete(records::destroy_all),
        )
        .route("/tenants/{tenant_id}/{entity}/import", post(records::import))
        .route(
            "/tenants/{tenant_id}/{entity}/autocomplete",
            get(records::autocomplete),
        )
        .route(
            "/tenants/{tenant_id}/{entity}/{id}",
            get(records::find)
                .put(records::update)
                .delete(records::destroy),
        )
        .route(
            "/tenants/{tenant_id}/{entity}/{id}/{relation}",
            get(records::children),
        )
        .route(
            "/invitations/{token}/accept",
            post(invitations::accept_invitation),
        )
        .route("/share/{token}", get(share::resolve_share_link))
}

/// Tenants the calling user belongs to, with their roles in each.
async fn list_my_tenants(
    RequireUser { user, .. }: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let memberships = state
        .store
        .list_user_memberships(&user.id)
        .api_err("Failed to list memberships")?;

    let mut tenants = Vec::with_capacity(memberships.len());
    for membership in memberships {
        let tenant = state
            .store
            .get_tenant(&membership.tenant_id)
            .api_err("Failed to get tenant")?;
        if let Some(tenant) = tenant {
            tenants.push(TenantMembershipResponse {
                tenant,
                roles: membership.roles,
            });
        }
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(tenants)))
}

async fn my_permissions(TenantMember(ctx): TenantMember) -> impl IntoResponse {
    let capabilities = ctx.capabilities();
    Json(ApiResponse::success(PermissionsResponse {
        tenant_id: ctx.tenant_id,
        roles: ctx.roles,
        capabilities,
    }))
}

/// True when the record's `expires_at` lies in the past.
fn is_expired(record: &Record) -> bool {
    record
        .get_str("expires_at")
        .and_then(parse_datetime)
        .is_some_and(|expires_at| expires_at <= Utc::now())
}
