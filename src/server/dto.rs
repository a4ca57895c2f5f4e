use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Capability, Membership, Record, Role, Tenant, Token};

// Admin

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MembershipRequest {
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            id: token.id,
            is_admin: token.is_admin,
            user_id: token.user_id,
            created_at: token.created_at,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: TokenResponse,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub cursor: Option<String>,
}

// Tenant records

#[derive(Debug, Deserialize)]
pub struct RecordRequest {
    pub data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub data: Map<String, Value>,
    pub import_hash: String,
}

#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub rows: Vec<Record>,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DestroyResponse {
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct DestroyAllParams {
    /// Comma separated record ids.
    pub ids: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AutocompleteParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FindParams {
    #[serde(default)]
    pub include_deleted: bool,
}

/// `{id}` of `/tenants/{tenant_id}/{entity}/{id}`; the other segments are
/// consumed by the access extractors.
#[derive(Debug, Deserialize)]
pub struct RecordPath {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct RelationPath {
    pub id: String,
    pub relation: String,
}

// Tenancy

#[derive(Debug, Serialize)]
pub struct TenantMembershipResponse {
    pub tenant: Tenant,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub tenant_id: String,
    pub roles: Vec<Role>,
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Serialize)]
pub struct AcceptInvitationResponse {
    pub membership: Membership,
}

#[derive(Debug, Serialize)]
pub struct SharedRecordResponse {
    pub entity: &'static str,
    pub record: Record,
}
