pub mod migrations;
pub mod query;
mod sqlite;

pub use query::{Filter, RecordQuery};
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::schema::{EntityDef, Relation};
use crate::types::*;

/// Replacement id lists for many-to-many relations.
pub type Links<'a> = &'a [(&'static Relation, Vec<String>)];

/// Store defines the database interface.
pub trait Store: Send + Sync {
    /// Applies every pending migration.
    fn initialize(&self) -> Result<()>;

    // Migrations
    fn migrate_up(&self, target: Option<i64>) -> Result<Vec<i64>>;
    fn migrate_down(&self, steps: usize) -> Result<Vec<i64>>;
    fn applied_migrations(&self) -> Result<Vec<AppliedMigration>>;

    // Tenant operations
    fn create_tenant(&self, tenant: &Tenant) -> Result<()>;
    fn get_tenant(&self, id: &str) -> Result<Option<Tenant>>;
    fn list_tenants(&self, cursor: &str, limit: i32) -> Result<Vec<Tenant>>;
    fn delete_tenant(&self, id: &str) -> Result<bool>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>>;
    fn delete_user(&self, id: &str) -> Result<bool>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Membership operations
    fn upsert_membership(&self, membership: &Membership) -> Result<()>;
    fn get_membership(&self, tenant_id: &str, user_id: &str) -> Result<Option<Membership>>;
    fn list_tenant_memberships(&self, tenant_id: &str) -> Result<Vec<Membership>>;
    fn list_user_memberships(&self, user_id: &str) -> Result<Vec<Membership>>;
    fn delete_membership(&self, tenant_id: &str, user_id: &str) -> Result<bool>;

    // Record operations, driven by entity descriptors
    fn insert_record(&self, def: &EntityDef, record: &Record, links: Links<'_>) -> Result<()>;
    fn update_record(&self, def: &EntityDef, record: &Record, links: Links<'_>) -> Result<bool>;
    fn get_record(
        &self,
        def: &EntityDef,
        tenant_id: &str,
        id: &str,
        include_deleted: bool,
    ) -> Result<Option<Record>>;
    /// Finds a live record by a globally unique column, across tenants.
    fn get_record_by_unique(&self, def: &EntityDef, field: &str, value: &str)
    -> Result<Option<Record>>;
    /// Returns one page of matching rows and the total match count.
    fn find_records(
        &self,
        def: &EntityDef,
        tenant_id: &str,
        query: &RecordQuery,
    ) -> Result<(Vec<Record>, i64)>;
    /// Sets `deleted_at` on live rows; returns how many were affected.
    fn soft_delete_records(
        &self,
        def: &EntityDef,
        tenant_id: &str,
        ids: &[String],
        user_id: Option<&str>,
    ) -> Result<usize>;
    /// Removes rows; returns how many were affected.
    fn hard_delete_records(&self, def: &EntityDef, tenant_id: &str, ids: &[String])
    -> Result<usize>;

    // Admin token check
    fn has_admin_token(&self) -> Result<bool>;
}
