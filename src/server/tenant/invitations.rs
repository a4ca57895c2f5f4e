use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::IntoResponse,
};
use chrono::Utc;

use super::is_expired;
use crate::auth::RequireUser;
use crate::error::Error;
use crate::schema::entities::INVITATION;
use crate::server::AppState;
use crate::server::extract::ApiPath;
use crate::server::dto::AcceptInvitationResponse;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::{Membership, Role};

/// Joins the invitation's tenant with the invited role. The invitation is
/// consumed.
pub async fn accept_invitation(
    RequireUser { user, .. }: RequireUser,
    State(state): State<Arc<AppState>>,
    ApiPath(token): ApiPath<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let invitation = store
        .get_record_by_unique(&INVITATION, "token", &token)
        .api_err("Failed to get invitation")?
        .or_not_found("Invitation not found")?;

    if is_expired(&invitation) {
        return Err(ApiError::bad_request("Invitation has expired"));
    }

    let invited = invitation.get_str("email").unwrap_or_default();
    if !invited.eq_ignore_ascii_case(&user.email) {
        return Err(ApiError::forbidden(
            "Invitation was issued to a different email",
        ));
    }

    let role_name = invitation.get_str("role").unwrap_or_default();
    let role = Role::parse(role_name).ok_or_else(|| Error::InvalidRole(role_name.to_string()))?;

    let existing = store
        .get_membership(&invitation.tenant_id, &user.id)
        .api_err("Failed to get membership")?;

    let now = Utc::now();
    let membership = match existing {
        Some(mut membership) => {
            if !membership.roles.contains(&role) {
                membership.roles.push(role);
            }
            membership.updated_at = now;
            membership
        }
        None => Membership {
            tenant_id: invitation.tenant_id.clone(),
            user_id: user.id.clone(),
            roles: vec![role],
            created_at: now,
            updated_at: now,
        },
    };

    store
        .upsert_membership(&membership)
        .api_err("Failed to save membership")?;
    store
        .hard_delete_records(&INVITATION, &invitation.tenant_id, &[invitation.id.clone()])
        .api_err("Failed to consume invitation")?;

    tracing::info!(
        tenant = %membership.tenant_id,
        user = %user.id,
        role = %role,
        "accepted invitation"
    );

    Ok(Json(ApiResponse::success(AcceptInvitationResponse {
        membership,
    })))
}
