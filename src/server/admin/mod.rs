mod members;
mod tenants;
mod tokens;
mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // Tenant routes
        .route(
            "/tenants",
            post(tenants::create_tenant).get(tenants::list_tenants),
        )
        .route(
            "/tenants/{id}",
            get(tenants::get_tenant).delete(tenants::delete_tenant),
        )
        // Membership routes
        .route("/tenants/{id}/members", get(members::list_members))
        .route(
            "/tenants/{id}/members/{user_id}",
            get(members::get_member)
                .put(members::put_member)
                .delete(members::delete_member),
        )
        // User routes
        .route("/users", post(users::create_user).get(users::list_users))
        .route("/users/{id}", get(users::get_user).delete(users::delete_user))
        .route(
            "/users/{id}/tokens",
            get(users::list_user_tokens).post(users::create_user_token),
        )
        // Token routes
        .route("/tokens", get(tokens::list_tokens))
        .route(
            "/tokens/{id}",
            get(tokens::get_token).delete(tokens::delete_token),
        )
}
