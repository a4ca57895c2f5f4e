//! Versioned schema migrations.
//!
//! Applied in order and recorded in `schema_migrations`. Each migration runs
//! in its own transaction; `down` undoes exactly what `up` created.

use chrono::Utc;
use rusqlite::{Connection, params};

use super::sqlite::parse_datetime;
use crate::error::{Error, Result};
use crate::types::AppliedMigration;

const BOOKKEEPING: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
";

const CORE_UP: &str = r#"
-- Tenants are the isolation boundary for every entity row
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    full_name TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Tokens are auth credentials; non-admin tokens must belong to a user
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- first 8 chars of a uuid for fast lookup
    is_admin INTEGER NOT NULL DEFAULT 0,
    user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT,
    last_used_at TEXT
);

-- Roles a user holds inside a tenant, comma separated
CREATE TABLE IF NOT EXISTS memberships (
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    roles TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, user_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_memberships_user ON memberships(user_id);
"#;

const CORE_DOWN: &str = "
DROP TABLE IF EXISTS memberships;
DROP TABLE IF EXISTS tokens;
DROP TABLE IF EXISTS users;
DROP TABLE IF EXISTS tenants;
";

// Frozen copy of the entity tables as first shipped. Descriptor changes need
// a new migration; `test_entity_tables_match_descriptors` fails until then.
const ENTITIES_UP: &str = "
CREATE TABLE IF NOT EXISTS client_accounts (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    contact_email TEXT,
    phone TEXT,
    address TEXT,
    status TEXT NOT NULL,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_client_accounts_tenant ON client_accounts(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_client_accounts_import_hash ON client_accounts(tenant_id, import_hash) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS sites (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    client_account_id TEXT NOT NULL,
    name TEXT NOT NULL,
    address TEXT,
    latitude TEXT,
    longitude TEXT,
    active INTEGER,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_sites_tenant ON sites(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_sites_import_hash ON sites(tenant_id, import_hash) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS guards (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    full_name TEXT NOT NULL,
    license_number TEXT,
    phone TEXT,
    status TEXT NOT NULL,
    hired_on TEXT,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_guards_tenant ON guards(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_guards_import_hash ON guards(tenant_id, import_hash) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_guards_license_number ON guards(tenant_id, license_number) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS shifts (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    guard_id TEXT NOT NULL,
    site_id TEXT NOT NULL,
    starts_at TEXT NOT NULL,
    ends_at TEXT NOT NULL,
    status TEXT NOT NULL,
    notes TEXT,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_shifts_tenant ON shifts(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_shifts_import_hash ON shifts(tenant_id, import_hash) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS checkpoints (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    site_id TEXT NOT NULL,
    name TEXT NOT NULL,
    code TEXT NOT NULL,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_checkpoints_tenant ON checkpoints(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_checkpoints_import_hash ON checkpoints(tenant_id, import_hash) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_checkpoints_code ON checkpoints(tenant_id, code) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS patrols (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    shift_id TEXT,
    guard_id TEXT,
    started_at TEXT,
    completed_at TEXT,
    status TEXT NOT NULL,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_patrols_tenant ON patrols(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_patrols_import_hash ON patrols(tenant_id, import_hash) WHERE deleted_at IS NULL;
CREATE TABLE IF NOT EXISTS patrol_checkpoints (
    tenant_id TEXT NOT NULL,
    patrol_id TEXT NOT NULL REFERENCES patrols(id) ON DELETE CASCADE,
    checkpoint_id TEXT NOT NULL,
    PRIMARY KEY (patrol_id, checkpoint_id)
);

CREATE TABLE IF NOT EXISTS incidents (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    site_id TEXT,
    reported_by_guard_id TEXT,
    title TEXT NOT NULL,
    description TEXT,
    severity TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    status TEXT NOT NULL,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_incidents_tenant ON incidents(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_incidents_import_hash ON incidents(tenant_id, import_hash) WHERE deleted_at IS NULL;
CREATE TABLE IF NOT EXISTS incident_guards (
    tenant_id TEXT NOT NULL,
    incident_id TEXT NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
    guard_id TEXT NOT NULL,
    PRIMARY KEY (incident_id, guard_id)
);

CREATE TABLE IF NOT EXISTS tutorials (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    slug TEXT NOT NULL,
    body TEXT,
    video_url TEXT,
    audience TEXT NOT NULL,
    published INTEGER,
    position INTEGER,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_tutorials_tenant ON tutorials(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_tutorials_import_hash ON tutorials(tenant_id, import_hash) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ux_tutorials_slug ON tutorials(tenant_id, slug) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    recipient_user_id TEXT,
    title TEXT NOT NULL,
    body TEXT,
    read INTEGER,
    entity_type TEXT,
    entity_id TEXT,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_notifications_tenant ON notifications(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_notifications_import_hash ON notifications(tenant_id, import_hash) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    body TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_notes_tenant ON notes(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_notes_import_hash ON notes(tenant_id, import_hash) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    mime_type TEXT,
    size_in_bytes INTEGER,
    storage_key TEXT NOT NULL,
    entity_type TEXT,
    entity_id TEXT,
    import_hash TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_files_tenant ON files(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_files_import_hash ON files(tenant_id, import_hash) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS invitations (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    email TEXT NOT NULL,
    role TEXT NOT NULL,
    token TEXT,
    expires_at TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_invitations_tenant ON invitations(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_invitations_token ON invitations(token);

CREATE TABLE IF NOT EXISTS share_links (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    token TEXT,
    expires_at TEXT,
    created_by_id TEXT,
    updated_by_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_share_links_tenant ON share_links(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS ux_share_links_token ON share_links(token);
";

const ENTITIES_DOWN: &str = "
DROP TABLE IF EXISTS share_links;
DROP TABLE IF EXISTS invitations;
DROP TABLE IF EXISTS files;
DROP TABLE IF EXISTS notes;
DROP TABLE IF EXISTS notifications;
DROP TABLE IF EXISTS tutorials;
DROP TABLE IF EXISTS incident_guards;
DROP TABLE IF EXISTS incidents;
DROP TABLE IF EXISTS patrol_checkpoints;
DROP TABLE IF EXISTS patrols;
DROP TABLE IF EXISTS checkpoints;
DROP TABLE IF EXISTS shifts;
DROP TABLE IF EXISTS guards;
DROP TABLE IF EXISTS sites;
DROP TABLE IF EXISTS client_accounts;
";

const ATTACHMENT_INDEXES_UP: &str = "
CREATE INDEX IF NOT EXISTS ix_notes_entity ON notes(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS ix_notifications_entity ON notifications(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS ix_notifications_recipient ON notifications(recipient_user_id);
CREATE INDEX IF NOT EXISTS ix_files_entity ON files(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS ix_share_links_entity ON share_links(entity_type, entity_id);
";

const ATTACHMENT_INDEXES_DOWN: &str = "
DROP INDEX IF EXISTS ix_share_links_entity;
DROP INDEX IF EXISTS ix_files_entity;
DROP INDEX IF EXISTS ix_notifications_recipient;
DROP INDEX IF EXISTS ix_notifications_entity;
DROP INDEX IF EXISTS ix_notes_entity;
";

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "tenants, users, tokens and memberships",
        up: CORE_UP,
        down: CORE_DOWN,
    },
    Migration {
        version: 2,
        description: "entity tables",
        up: ENTITIES_UP,
        down: ENTITIES_DOWN,
    },
    Migration {
        version: 3,
        description: "attachment lookup indexes",
        up: ATTACHMENT_INDEXES_UP,
        down: ATTACHMENT_INDEXES_DOWN,
    },
];

#[must_use]
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

pub fn applied(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    conn.execute_batch(BOOKKEEPING)?;
    let mut stmt = conn.prepare(
        "SELECT version, description, applied_at FROM schema_migrations ORDER BY version",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(AppliedMigration {
            version: row.get(0)?,
            description: row.get(1)?,
            applied_at: parse_datetime(&row.get::<_, String>(2)?),
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn current_version(conn: &Connection) -> Result<i64> {
    Ok(applied(conn)?.last().map_or(0, |m| m.version))
}

/// Applies pending migrations up to `target` (all when `None`). Returns the
/// versions applied.
pub fn migrate_up(conn: &Connection, target: Option<i64>) -> Result<Vec<i64>> {
    let current = current_version(conn)?;
    let target = target.unwrap_or_else(latest_version);
    if target > latest_version() {
        return Err(Error::Migration(format!("unknown version {target}")));
    }

    let mut done = Vec::new();
    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > current && m.version <= target)
    {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up).map_err(|e| {
            Error::Migration(format!("{} failed: {e}", migration.version))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            params![
                migration.version,
                migration.description,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        tracing::info!("Applied migration {} ({})", migration.version, migration.description);
        done.push(migration.version);
    }
    Ok(done)
}

/// Reverts the `steps` most recent migrations. Returns the versions reverted.
pub fn migrate_down(conn: &Connection, steps: usize) -> Result<Vec<i64>> {
    let applied = applied(conn)?;
    let mut done = Vec::new();

    for record in applied.iter().rev().take(steps) {
        let migration = MIGRATIONS
            .iter()
            .find(|m| m.version == record.version)
            .ok_or_else(|| Error::Migration(format!("unknown version {}", record.version)))?;

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.down).map_err(|e| {
            Error::Migration(format!("{} revert failed: {e}", migration.version))
        })?;
        tx.execute(
            "DELETE FROM schema_migrations WHERE version = ?1",
            params![migration.version],
        )?;
        tx.commit()?;
        tracing::info!("Reverted migration {} ({})", migration.version, migration.description);
        done.push(migration.version);
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_versions_are_strictly_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }

    #[test]
    fn test_up_then_down_round_trips() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();

        assert_eq!(migrate_up(&conn, None).unwrap(), vec![1, 2, 3]);
        assert!(migrate_up(&conn, None).unwrap().is_empty());

        let tables = table_names(&conn);
        assert!(tables.contains(&"incidents".to_string()));
        assert!(tables.contains(&"patrol_checkpoints".to_string()));

        assert_eq!(migrate_down(&conn, 2).unwrap(), vec![3, 2]);
        let tables = table_names(&conn);
        assert!(!tables.contains(&"incidents".to_string()));
        assert!(tables.contains(&"tenants".to_string()));

        assert_eq!(migrate_up(&conn, Some(2)).unwrap(), vec![2]);
        assert_eq!(applied(&conn).unwrap().len(), 2);
    }

    fn strings(conn: &Connection, sql: &str, columns: &[usize]) -> Vec<String> {
        let mut stmt = conn.prepare(sql).unwrap();
        stmt.query_map([], |row| {
            let mut parts = Vec::new();
            for &i in columns {
                let value: rusqlite::types::Value = row.get(i)?;
                parts.push(format!("{value:?}"));
            }
            Ok(parts.join(" "))
        })
        .unwrap()
        .collect::<std::result::Result<Vec<_>, _>>()
        .unwrap()
    }

    /// Columns, foreign keys and indexes of every table, one line each.
    fn describe(conn: &Connection) -> Vec<String> {
        let mut lines = Vec::new();
        for table in table_names(conn) {
            for col in strings(conn, &format!("PRAGMA table_info({table})"), &[1, 2, 3, 5]) {
                lines.push(format!("{table} column {col}"));
            }
            for fk in strings(conn, &format!("PRAGMA foreign_key_list({table})"), &[2, 3, 4, 6]) {
                lines.push(format!("{table} fk {fk}"));
            }
            let mut stmt = conn.prepare(&format!("PRAGMA index_list({table})")).unwrap();
            let indexes = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(4)?,
                    ))
                })
                .unwrap()
                .collect::<std::result::Result<Vec<_>, _>>()
                .unwrap();
            for (name, unique, partial) in indexes {
                let columns = strings(conn, &format!("PRAGMA index_info({name})"), &[2]);
                lines.push(format!(
                    "{table} index {name} unique={unique} partial={partial} on {}",
                    columns.join(",")
                ));
            }
        }
        lines.sort();
        lines
    }

    #[test]
    fn test_entity_tables_match_descriptors() {
        let frozen = Connection::open_in_memory().unwrap();
        migrate_up(&frozen, Some(2)).unwrap();
        frozen.execute_batch("DROP TABLE schema_migrations").unwrap();

        let generated = Connection::open_in_memory().unwrap();
        generated.execute_batch(CORE_UP).unwrap();
        generated
            .execute_batch(&crate::schema::ddl::create_all())
            .unwrap();

        let frozen = describe(&frozen);
        let generated = describe(&generated);
        let missing: Vec<_> = generated.iter().filter(|l| !frozen.contains(l)).collect();
        let extra: Vec<_> = frozen.iter().filter(|l| !generated.contains(l)).collect();
        assert!(
            missing.is_empty() && extra.is_empty(),
            "entity schema drifted from descriptors; add a migration\nmissing: {missing:#?}\nextra: {extra:#?}"
        );
    }

    #[test]
    fn test_entity_down_drops_every_entity_table() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_up(&conn, Some(2)).unwrap();
        migrate_down(&conn, 1).unwrap();
        for def in crate::schema::ENTITIES {
            assert!(!table_names(&conn).contains(&def.table.to_string()), "{}", def.table);
        }
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            migrate_up(&conn, Some(99)),
            Err(Error::Migration(_))
        ));
    }
}
