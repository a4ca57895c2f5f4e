use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use chrono::Utc;
use guardpost::auth::issue_token;
use guardpost::server::{AppState, create_router};
use guardpost::store::{SqliteStore, Store};
use guardpost::types::{Membership, Role, Tenant, User};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// An in-memory server with an admin token and one tenant.
pub struct TestApp {
    pub store: Arc<SqliteStore>,
    pub admin_token: String,
    pub tenant_id: String,
    state: Arc<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        store.initialize().expect("initialize store");

        let (admin_token, _) = issue_token(store.as_ref(), None, true, None).expect("admin token");

        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            name: "Acme Security".to_string(),
            created_at: now,
            updated_at: now,
        };
        store.create_tenant(&tenant).expect("create tenant");

        let state = Arc::new(AppState::new(store.clone()));

        Self {
            store,
            admin_token,
            tenant_id: tenant.id,
            state,
        }
    }

    /// Creates a user holding `roles` in the test tenant and returns
    /// `(user_id, token)`.
    pub fn member(&self, email: &str, roles: &[Role]) -> (String, String) {
        let user_id = self.user(email);
        let now = Utc::now();
        self.store
            .upsert_membership(&Membership {
                tenant_id: self.tenant_id.clone(),
                user_id: user_id.clone(),
                roles: roles.to_vec(),
                created_at: now,
                updated_at: now,
            })
            .expect("create membership");
        let token = self.user_token(&user_id);
        (user_id, token)
    }

    pub fn user(&self, email: &str) -> String {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            full_name: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user).expect("create user");
        user.id
    }

    pub fn user_token(&self, user_id: &str) -> String {
        issue_token(self.store.as_ref(), Some(user_id), false, None)
            .expect("user token")
            .0
    }

    pub fn tenant_path(&self, rest: &str) -> String {
        format!("/api/v1/tenants/{}/{rest}", self.tenant_id)
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let body = body.map(|json| json.to_string());
        self.request_raw(method, uri, token, body.as_deref()).await
    }

    /// Sends `body` verbatim as `application/json`.
    pub async fn request_raw(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(raw) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(raw.to_string())
            }
            None => Body::empty(),
        };
        let req = builder.body(body).expect("build request");

        let resp = create_router(self.state.clone())
            .oneshot(req)
            .await
            .expect("send request");

        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON body")
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request("GET", uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request("POST", uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request("PUT", uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.request("DELETE", uri, Some(token), None).await
    }

    /// Creates a record as the admin and returns its id.
    pub async fn create(&self, entity_path: &str, data: Value) -> String {
        let resp = self
            .post(
                &self.tenant_path(entity_path),
                &self.admin_token,
                serde_json::json!({ "data": data }),
            )
            .await;
        assert_eq!(
            resp.status,
            StatusCode::CREATED,
            "create {entity_path}: {}",
            resp.body
        );
        resp.body["data"]["id"]
            .as_str()
            .expect("record id")
            .to_string()
    }
}
