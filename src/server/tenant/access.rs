//! Tenant membership and per-entity capability checks.
//!
//! Handlers declare the capability they need in their signature:
//!
//! ```rust,ignore
//! async fn create(auth: Authorized<Create>, ...) -> impl IntoResponse
//! ```
//!
//! The extractor authenticates the token, resolves the caller's roles in the
//! `{tenant_id}` of the path, looks up the `{entity}` descriptor and rejects
//! the request before the handler body runs when the roles lack the action.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::auth::RequireAuth;
use crate::error::Error;
use crate::repository::RequestContext;
use crate::schema::{self, EntityDef};
use crate::server::AppState;
use crate::server::extract::ApiPath;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::store::Store;
use crate::types::{Action, Role};

/// Resolves the roles an authenticated caller holds in `tenant_id`.
/// Admin tokens act as tenant admins everywhere.
pub fn resolve_member(
    store: &dyn Store,
    auth: &RequireAuth,
    tenant_id: &str,
) -> Result<RequestContext, ApiError> {
    let tenant = store
        .get_tenant(tenant_id)
        .api_err("Failed to get tenant")?
        .or_not_found("Tenant not found")?;

    if auth.token.is_admin {
        return Ok(RequestContext::new(tenant.id, None, vec![Role::Admin]));
    }

    let user = auth
        .user
        .as_ref()
        .ok_or_else(|| ApiError::forbidden("User token required for this operation"))?;

    let membership = store
        .get_membership(&tenant.id, &user.id)
        .api_err("Failed to get membership")?
        .ok_or_else(|| ApiError::forbidden("Not a member of this tenant"))?;

    Ok(RequestContext::new(
        tenant.id,
        Some(user.id.clone()),
        membership.roles,
    ))
}

/// Fails with 403 naming the missing capability.
pub fn require(ctx: &RequestContext, def: &EntityDef, action: Action) -> Result<(), ApiError> {
    if ctx.can(def, action) {
        Ok(())
    } else {
        Err(Error::Forbidden(def.capability(action).to_string()).into())
    }
}

async fn path_params(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<HashMap<String, String>, Response> {
    ApiPath::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .map(|ApiPath(params)| params)
        .map_err(IntoResponse::into_response)
}

/// Extractor for any member of the `{tenant_id}` in the path.
pub struct TenantMember(pub RequestContext);

impl FromRequestParts<Arc<AppState>> for TenantMember {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth = RequireAuth::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        let params = path_params(parts, state).await?;
        let tenant_id = params
            .get("tenant_id")
            .ok_or_else(|| ApiError::not_found("Tenant not found").into_response())?;

        resolve_member(state.store.as_ref(), &auth, tenant_id)
            .map(TenantMember)
            .map_err(IntoResponse::into_response)
    }
}

/// The action a route requires, as a type.
pub trait RequiredAction: Send + Sync + 'static {
    const ACTION: Action;
}

macro_rules! required_action {
    ($($name:ident => $action:expr),* $(,)?) => {
        $(
            pub struct $name;

            impl RequiredAction for $name {
                const ACTION: Action = $action;
            }
        )*
    };
}

required_action! {
    Read => Action::Read,
    Create => Action::Create,
    Edit => Action::Edit,
    Destroy => Action::Destroy,
    Import => Action::Import,
}

/// Extractor that checks the caller may perform `A` on the `{entity}` in the
/// path.
pub struct Authorized<A: RequiredAction> {
    pub ctx: RequestContext,
    pub def: &'static EntityDef,
    _action: PhantomData<A>,
}

impl<A: RequiredAction> FromRequestParts<Arc<AppState>> for Authorized<A> {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TenantMember(ctx) = TenantMember::from_request_parts(parts, state).await?;

        let params = path_params(parts, state).await?;
        let def = params
            .get("entity")
            .and_then(|path| schema::lookup_by_path(path))
            .ok_or_else(|| ApiError::not_found("Unknown entity").into_response())?;

        require(&ctx, def, A::ACTION).map_err(IntoResponse::into_response)?;

        Ok(Self {
            ctx,
            def,
            _action: PhantomData,
        })
    }
}
