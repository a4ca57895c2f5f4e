mod common;

use axum::http::{StatusCode, header};
use guardpost::schema::ENTITIES;
use guardpost::types::Role;
use serde_json::{Value, json};

use common::TestApp;

fn incident(title: &str) -> Value {
    json!({
        "title": title,
        "severity": "high",
        "occurred_at": "2026-03-01T22:15:00Z",
    })
}

async fn count(app: &TestApp, entity_path: &str) -> i64 {
    let resp = app.get(&app.tenant_path(entity_path), &app.admin_token).await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.body);
    resp.body["data"]["count"].as_i64().expect("count")
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let resp = app.request("GET", "/api/v1/health", None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, json!({ "data": "OK", "error": null }));
}

#[tokio::test]
async fn test_missing_token_is_challenged() {
    let app = TestApp::new();
    let resp = app
        .request("GET", &app.tenant_path("incidents"), None, None)
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers[header::WWW_AUTHENTICATE],
        "Bearer realm=\"guardpost\""
    );
    assert!(resp.body["data"].is_null());
    assert_eq!(resp.body["error"], "Authentication required");

    let resp = app
        .get(&app.tenant_path("incidents"), "guardpost_notreal0_0000")
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_reject_user_tokens() {
    let app = TestApp::new();
    let (_, token) = app.member("ana@example.com", &[Role::Admin]);
    let resp = app.get("/api/v1/admin/tenants", &token).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.body["error"], "Admin access required");
}

#[tokio::test]
async fn test_admin_manages_tenants_users_and_members() {
    let app = TestApp::new();
    let admin = app.admin_token.as_str();

    let resp = app
        .post("/api/v1/admin/tenants", admin, json!({ "name": "  Northside " }))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["data"]["name"], "Northside");
    let tenant_id = resp.body["data"]["id"].as_str().unwrap().to_string();

    let resp = app
        .post(
            "/api/v1/admin/users",
            admin,
            json!({ "email": "Sam@Example.com", "full_name": "Sam Reyes" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["data"]["email"], "sam@example.com");
    let user_id = resp.body["data"]["id"].as_str().unwrap().to_string();

    let resp = app
        .post(
            "/api/v1/admin/users",
            admin,
            json!({ "email": "sam@example.com" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    let member_uri = format!("/api/v1/admin/tenants/{tenant_id}/members/{user_id}");
    let resp = app
        .put(&member_uri, admin, json!({ "roles": ["supervisor"] }))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let resp = app
        .put(&member_uri, admin, json!({ "roles": ["guard", "supervisor"] }))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["roles"], json!(["guard", "supervisor"]));

    let resp = app
        .put(&member_uri, admin, json!({ "roles": ["owner"] }))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .post(&format!("/api/v1/admin/users/{user_id}/tokens"), admin, json!({}))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let user_token = resp.body["data"]["token"].as_str().unwrap().to_string();
    assert!(user_token.starts_with("guardpost_"));

    let resp = app.get("/api/v1/tenants", &user_token).await;
    assert_eq!(resp.status, StatusCode::OK);
    let tenants = resp.body["data"].as_array().unwrap();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0]["tenant"]["id"], tenant_id.as_str());

    let resp = app.delete(&member_uri, admin).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    let resp = app.delete(&member_uri, admin).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app.get("/api/v1/admin/tenants", admin).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"].as_array().unwrap().len(), 2);
    assert_eq!(resp.body["has_more"], false);
}

#[tokio::test]
async fn test_customer_cannot_mutate_any_entity() {
    let app = TestApp::new();
    let (_, customer) = app.member("client@example.com", &[Role::Customer]);
    let incident_id = app.create("incidents", incident("Broken gate")).await;

    let mut before = Vec::new();
    for def in ENTITIES {
        before.push(count(&app, def.path).await);
    }

    for def in ENTITIES {
        let collection = app.tenant_path(def.path);
        let id = if def.path == "incidents" {
            incident_id.clone()
        } else {
            "00000000-0000-0000-0000-000000000000".to_string()
        };
        let member = format!("{collection}/{id}");

        let attempts = [
            app.post(&collection, &customer, json!({ "data": { "title": "x" } }))
                .await,
            app.post(
                &format!("{collection}/import"),
                &customer,
                json!({ "data": { "title": "x" }, "import_hash": "row-1" }),
            )
            .await,
            app.put(&member, &customer, json!({ "data": { "title": "x" } }))
                .await,
            app.delete(&member, &customer).await,
            app.delete(&format!("{collection}?ids={id}"), &customer).await,
        ];

        for resp in attempts {
            assert_eq!(resp.status, StatusCode::FORBIDDEN, "{}: {}", def.name, resp.body);
            assert!(resp.body["data"].is_null());
            let error = resp.body["error"].as_str().unwrap();
            assert!(error.starts_with("Missing permission"), "{error}");
            assert!(error.contains(def.name), "{error}");
        }
    }

    for (def, expected) in ENTITIES.iter().zip(before) {
        assert_eq!(count(&app, def.path).await, expected, "{}", def.name);
    }

    let resp = app
        .get(
            &app.tenant_path(&format!("incidents/{incident_id}")),
            &app.admin_token,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["title"], "Broken gate");
    assert!(resp.body["data"].get("deleted_at").is_none());
}

#[tokio::test]
async fn test_customer_permissions() {
    let app = TestApp::new();
    let (_, customer) = app.member("client@example.com", &[Role::Customer]);

    let resp = app.get(&app.tenant_path("permissions"), &customer).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["roles"], json!(["customer"]));
    let caps: Vec<&str> = resp.body["data"]["capabilities"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(caps.contains(&"incident:read"));
    assert!(caps.contains(&"site:read"));
    assert!(!caps.contains(&"guard:read"));
    assert!(caps.iter().all(|c| c.ends_with(":read")));

    let resp = app.get(&app.tenant_path("guards"), &customer).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.body["error"], "Missing permission guard:read");
}

#[tokio::test]
async fn test_non_member_and_unknown_entity() {
    let app = TestApp::new();
    let outsider = app.user("outsider@example.com");
    let token = app.user_token(&outsider);

    let resp = app.get(&app.tenant_path("incidents"), &token).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .get("/api/v1/tenants/no-such-tenant/incidents", &app.admin_token)
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app.get(&app.tenant_path("spaceships"), &app.admin_token).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.body["error"], "Unknown entity");
}

#[tokio::test]
async fn test_record_lifecycle() {
    let app = TestApp::new();
    let (guard_id, guard) = app.member("guard@example.com", &[Role::Guard]);
    let (_, manager) = app.member("manager@example.com", &[Role::Manager]);
    let incidents = app.tenant_path("incidents");

    let resp = app
        .post(&incidents, &guard, json!({ "data": incident("Broken gate") }))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert!(resp.body["error"].is_null());
    let record = &resp.body["data"];
    assert_eq!(record["status"], "open");
    assert_eq!(record["created_by_id"], guard_id.as_str());
    assert_eq!(record["occurred_at_label"], "2026-03-01 22:15");
    let id = record["id"].as_str().unwrap().to_string();
    let uri = format!("{incidents}/{id}");

    let resp = app
        .put(&uri, &guard, json!({ "data": { "status": "investigating" } }))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["status"], "investigating");
    assert_eq!(resp.body["data"]["title"], "Broken gate");

    let resp = app.delete(&uri, &guard).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.delete(&uri, &manager).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["count"], 1);

    let resp = app.delete(&uri, &manager).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app.get(&uri, &manager).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app
        .get(&format!("{uri}?include_deleted=true"), &guard)
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .get(&format!("{uri}?include_deleted=true"), &manager)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body["data"]["deleted_at"].is_string());

    let resp = app.get(&incidents, &guard).await;
    assert_eq!(resp.body["data"]["count"], 0);
}

#[tokio::test]
async fn test_validation_errors() {
    let app = TestApp::new();
    let incidents = app.tenant_path("incidents");

    let resp = app
        .post(
            &incidents,
            &app.admin_token,
            json!({ "data": { "severity": "high", "occurred_at": "2026-03-01T22:15:00Z" } }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(resp.body["error"].as_str().unwrap().contains("title"));

    let mut data = incident("Broken gate");
    data["severity"] = json!("apocalyptic");
    let resp = app
        .post(&incidents, &app.admin_token, json!({ "data": data }))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .get(&format!("{incidents}?order_by=nonsense"), &app.admin_token)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .post(
            &app.tenant_path("sites"),
            &app.admin_token,
            json!({ "data": { "client_account_id": "missing", "name": "HQ" } }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(
        resp.body["error"]
            .as_str()
            .unwrap()
            .contains("client_account_id")
    );
}

#[tokio::test]
async fn test_malformed_requests_use_envelope() {
    let app = TestApp::new();
    let admin = Some(app.admin_token.as_str());
    let incidents = app.tenant_path("incidents");

    let responses = [
        app.request_raw("POST", &incidents, admin, Some("{not json"))
            .await,
        app.request_raw("POST", &incidents, admin, Some(r#"{"title":"x"}"#))
            .await,
        app.request_raw(
            "POST",
            &app.tenant_path("incidents/import"),
            admin,
            Some(r#"{"data":{}}"#),
        )
        .await,
        app.request("GET", &app.tenant_path("incidents/autocomplete?limit=abc"), admin, None)
            .await,
        app.request("GET", &format!("{incidents}/x?include_deleted=yes"), admin, None)
            .await,
        app.request("DELETE", &incidents, admin, None).await,
        app.request_raw("POST", "/api/v1/admin/tenants", admin, Some("[]"))
            .await,
    ];

    for resp in responses {
        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "{}", resp.body);
        assert!(resp.body["data"].is_null());
        assert!(resp.body["error"].is_string(), "{}", resp.body);
    }

    assert_eq!(count(&app, "incidents").await, 0);
}

#[tokio::test]
async fn test_import_rejects_duplicate_hash() {
    let app = TestApp::new();
    let uri = app.tenant_path("incidents/import");
    let body = json!({ "data": incident("Imported"), "import_hash": "legacy-17" });

    let resp = app.post(&uri, &app.admin_token, body.clone()).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["data"]["import_hash"], "legacy-17");

    let first_id = resp.body["data"]["id"].as_str().unwrap().to_string();

    let resp = app.post(&uri, &app.admin_token, body.clone()).await;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    let resp = app
        .delete(
            &app.tenant_path(&format!("incidents/{first_id}")),
            &app.admin_token,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app.post(&uri, &app.admin_token, body).await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let resp = app
        .post(
            &app.tenant_path("invitations/import"),
            &app.admin_token,
            json!({ "data": { "email": "a@example.com", "role": "guard" }, "import_hash": "x" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_listing_autocomplete_and_destroy_all() {
    let app = TestApp::new();
    let mut ids = Vec::new();
    for title in ["Alarm at dock", "Broken gate", "Alarm at lobby"] {
        ids.push(app.create("incidents", incident(title)).await);
    }
    let incidents = app.tenant_path("incidents");

    let resp = app
        .get(
            &format!("{incidents}?title=Alarm&order_by=title_desc&limit=1"),
            &app.admin_token,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["count"], 2);
    let rows = resp.body["data"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "Alarm at lobby");

    let resp = app
        .get(
            &app.tenant_path("incidents/autocomplete?query=gate"),
            &app.admin_token,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.body["data"],
        json!([{ "id": ids[1], "label": "Broken gate" }])
    );

    let resp = app
        .delete(
            &format!("{incidents}?ids={},{},{}", ids[0], ids[2], ids[0]),
            &app.admin_token,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["count"], 2);

    let resp = app
        .delete(&format!("{incidents}?ids={}", ids[0]), &app.admin_token)
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    assert_eq!(count(&app, "incidents").await, 1);
}

#[tokio::test]
async fn test_children_listing() {
    let app = TestApp::new();
    let (_, customer) = app.member("client@example.com", &[Role::Customer]);
    let account = app
        .create("client-accounts", json!({ "name": "Harbor Logistics" }))
        .await;
    for name in ["North gate", "Warehouse"] {
        app.create(
            "sites",
            json!({ "client_account_id": account, "name": name }),
        )
        .await;
    }

    let uri = app.tenant_path(&format!("client-accounts/{account}/sites"));
    let resp = app.get(&uri, &customer).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["count"], 2);

    let resp = app
        .get(
            &app.tenant_path(&format!("client-accounts/{account}/invoices")),
            &customer,
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invitation_accept() {
    let app = TestApp::new();
    let resp = app
        .post(
            &app.tenant_path("invitations"),
            &app.admin_token,
            json!({ "data": { "email": "new.guard@example.com", "role": "guard" } }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let token = resp.body["data"]["token"].as_str().unwrap().to_string();
    let accept_uri = format!("/api/v1/invitations/{token}/accept");

    let other = app.user("someone.else@example.com");
    let other_token = app.user_token(&other);
    let resp = app.post(&accept_uri, &other_token, json!({})).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let invited = app.user("new.guard@example.com");
    let invited_token = app.user_token(&invited);
    let resp = app.post(&accept_uri, &invited_token, json!({})).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["membership"]["roles"], json!(["guard"]));
    assert_eq!(
        resp.body["data"]["membership"]["tenant_id"],
        app.tenant_id.as_str()
    );

    let resp = app.post(&accept_uri, &invited_token, json!({})).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app.get(&app.tenant_path("incidents"), &invited_token).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_invitation() {
    let app = TestApp::new();
    let resp = app
        .post(
            &app.tenant_path("invitations"),
            &app.admin_token,
            json!({ "data": {
                "email": "late@example.com",
                "role": "guard",
                "expires_at": "2020-01-01T00:00:00Z",
            } }),
        )
        .await;
    let token = resp.body["data"]["token"].as_str().unwrap().to_string();

    let user = app.user("late@example.com");
    let user_token = app.user_token(&user);
    let resp = app
        .post(&format!("/api/v1/invitations/{token}/accept"), &user_token, json!({}))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_share_link_resolves_without_auth() {
    let app = TestApp::new();
    let incident_id = app.create("incidents", incident("Broken gate")).await;

    let resp = app
        .post(
            &app.tenant_path("share-links"),
            &app.admin_token,
            json!({ "data": { "entity_type": "incident", "entity_id": incident_id } }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let token = resp.body["data"]["token"].as_str().unwrap().to_string();
    let share_uri = format!("/api/v1/share/{token}");

    let resp = app.request("GET", &share_uri, None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["entity"], "incident");
    assert_eq!(resp.body["data"]["record"]["title"], "Broken gate");
    assert_eq!(
        resp.body["data"]["record"]["occurred_at_label"],
        "2026-03-01 22:15"
    );

    let resp = app
        .delete(
            &app.tenant_path(&format!("incidents/{incident_id}")),
            &app.admin_token,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app.request("GET", &share_uri, None, None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app
        .request("GET", "/api/v1/share/does-not-exist", None, None)
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_share_link() {
    let app = TestApp::new();
    let incident_id = app.create("incidents", incident("Broken gate")).await;

    let resp = app
        .post(
            &app.tenant_path("share-links"),
            &app.admin_token,
            json!({ "data": {
                "entity_type": "incident",
                "entity_id": incident_id,
                "expires_at": "2020-01-01T00:00:00Z",
            } }),
        )
        .await;
    let token = resp.body["data"]["token"].as_str().unwrap().to_string();

    let resp = app
        .request("GET", &format!("/api/v1/share/{token}"), None, None)
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}
