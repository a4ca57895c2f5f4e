use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde_json::{Map, Value};

use super::migrations;
use super::query::{Filter, RecordQuery};
use super::{Links, Store};
use crate::error::{Error, Result};
use crate::schema::validate::format_datetime;
use crate::schema::{EntityDef, FieldKind, Relation};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn parse_roles(s: &str) -> Vec<Role> {
    Role::parse_list(s).unwrap_or_else(|| {
        tracing::error!("Invalid role list in database: '{}'", s);
        Vec::new()
    })
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .unwrap_or_else(|| SqlValue::Real(n.as_f64().unwrap_or_default())),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn opt_text(value: Option<&str>) -> SqlValue {
    value.map_or(SqlValue::Null, |s| SqlValue::Text(s.to_string()))
}

/// Maps unique-index violations to a conflict naming the offending columns.
fn map_write_error(def: &EntityDef, e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(err, Some(msg))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            let columns = msg
                .strip_prefix("UNIQUE constraint failed: ")
                .unwrap_or_default()
                .split(", ")
                .filter_map(|c| c.split('.').nth(1))
                .filter(|c| *c != "tenant_id")
                .collect::<Vec<_>>()
                .join(", ");
            Error::Conflict(format!("{} with this {columns} already exists", def.name))
        }
        other => Error::from(other),
    }
}

fn select_columns(def: &EntityDef) -> String {
    let mut columns = vec!["id", "tenant_id"];
    columns.extend(def.fields.iter().map(|f| f.name));
    if def.is_importable() {
        columns.push("import_hash");
    }
    columns.extend(["created_by_id", "updated_by_id", "created_at", "updated_at"]);
    if def.is_soft_delete() {
        columns.push("deleted_at");
    }
    columns.join(", ")
}

fn row_to_record(def: &EntityDef, row: &Row<'_>) -> rusqlite::Result<Record> {
    let mut fields = Map::new();
    let mut idx = 2;
    for field in def.fields {
        let value = match field.kind {
            FieldKind::Boolean => row
                .get::<_, Option<i64>>(idx)?
                .map_or(Value::Null, |n| Value::Bool(n != 0)),
            FieldKind::Integer { .. } => row
                .get::<_, Option<i64>>(idx)?
                .map_or(Value::Null, Value::from),
            _ => row
                .get::<_, Option<String>>(idx)?
                .map_or(Value::Null, Value::String),
        };
        fields.insert(field.name.to_string(), value);
        idx += 1;
    }

    let import_hash = if def.is_importable() {
        idx += 1;
        row.get(idx - 1)?
    } else {
        None
    };

    let record = Record {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        fields,
        import_hash,
        created_by_id: row.get(idx)?,
        updated_by_id: row.get(idx + 1)?,
        created_at: parse_datetime(&row.get::<_, String>(idx + 2)?),
        updated_at: parse_datetime(&row.get::<_, String>(idx + 3)?),
        deleted_at: if def.is_soft_delete() {
            row.get::<_, Option<String>>(idx + 4)?
                .map(|s| parse_datetime(&s))
        } else {
            None
        },
    };
    Ok(record)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Renders the WHERE clause for a listing. The tenant is always the first
/// bound parameter.
fn where_clause(def: &EntityDef, tenant_id: &str, query: &RecordQuery) -> (String, Vec<SqlValue>) {
    let mut clauses = vec!["tenant_id = ?".to_string()];
    let mut values = vec![SqlValue::Text(tenant_id.to_string())];

    if def.is_soft_delete() {
        clauses.push("deleted_at IS NULL".to_string());
    }

    for filter in &query.filters {
        match filter {
            Filter::Eq(column, value) if value.is_null() => {
                clauses.push(format!("{column} IS NULL"));
            }
            Filter::Eq(column, value) => {
                clauses.push(format!("{column} = ?"));
                values.push(to_sql(value));
            }
            Filter::Contains(column, needle) => {
                clauses.push(format!("{column} LIKE ? ESCAPE '\\'"));
                values.push(SqlValue::Text(format!("%{}%", escape_like(needle))));
            }
            Filter::AtLeast {
                column,
                value,
                numeric,
            } => {
                clauses.push(range_clause(column, ">=", *numeric));
                values.push(to_sql(value));
            }
            Filter::AtMost {
                column,
                value,
                numeric,
            } => {
                clauses.push(range_clause(column, "<=", *numeric));
                values.push(to_sql(value));
            }
        }
    }

    (clauses.join(" AND "), values)
}

fn range_clause(column: &str, op: &str, numeric: bool) -> String {
    if numeric {
        format!("CAST({column} AS REAL) {op} ?")
    } else {
        format!("{column} {op} ?")
    }
}

fn load_links(conn: &Connection, def: &EntityDef, record: &mut Record) -> Result<()> {
    for relation in def.many_to_many() {
        if let Relation::ManyToMany {
            name,
            through,
            source_key,
            target_key,
            ..
        } = *relation
        {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {target_key} FROM {through} WHERE {source_key} = ?1 ORDER BY {target_key}"
            ))?;
            let ids = stmt
                .query_map(params![record.id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            record.fields.insert(
                name.to_string(),
                Value::Array(ids.into_iter().map(Value::String).collect()),
            );
        }
    }
    Ok(())
}

fn write_links(conn: &Connection, record: &Record, links: Links<'_>) -> Result<()> {
    for (relation, ids) in links {
        if let Relation::ManyToMany {
            through,
            source_key,
            target_key,
            ..
        } = **relation
        {
            conn.execute(
                &format!("DELETE FROM {through} WHERE {source_key} = ?1"),
                params![record.id],
            )?;
            let mut stmt = conn.prepare_cached(&format!(
                "INSERT INTO {through} (tenant_id, {source_key}, {target_key}) VALUES (?1, ?2, ?3)"
            ))?;
            for id in ids {
                stmt.execute(params![record.tenant_id, record.id, id])?;
            }
        }
    }
    Ok(())
}

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        is_admin: row.get(3)?,
        user_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn row_to_tenant(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
        updated_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn row_to_membership(row: &Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        tenant_id: row.get(0)?,
        user_id: row.get(1)?,
        roles: parse_roles(&row.get::<_, String>(2)?),
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

const TOKEN_COLUMNS: &str =
    "id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at";
const MEMBERSHIP_COLUMNS: &str = "tenant_id, user_id, roles, created_at, updated_at";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.migrate_up(None).map(|_| ())
    }

    // Migrations

    fn migrate_up(&self, target: Option<i64>) -> Result<Vec<i64>> {
        migrations::migrate_up(&self.conn(), target)
    }

    fn migrate_down(&self, steps: usize) -> Result<Vec<i64>> {
        migrations::migrate_down(&self.conn(), steps)
    }

    fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        migrations::applied(&self.conn())
    }

    // Tenant operations

    fn create_tenant(&self, tenant: &Tenant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO tenants (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                tenant.id,
                tenant.name,
                format_datetime(&tenant.created_at),
                format_datetime(&tenant.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, created_at, updated_at FROM tenants WHERE id = ?1",
            params![id],
            row_to_tenant,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tenants(&self, cursor: &str, limit: i32) -> Result<Vec<Tenant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at, updated_at
             FROM tenants WHERE id > ?1 ORDER BY id LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], row_to_tenant)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_tenant(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tenants WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, email, full_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.email,
                user.full_name,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::AlreadyExists)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, full_name, created_at, updated_at FROM users WHERE id = ?1",
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, full_name, created_at, updated_at FROM users WHERE email = ?1",
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, email, full_name, created_at, updated_at
             FROM users WHERE id > ?1 ORDER BY id LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], row_to_user)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_admin,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE id = ?1"),
            params![id],
            row_to_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_lookup = ?1"),
            params![lookup],
            row_to_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE id > ?1 ORDER BY id LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![cursor, limit], row_to_token)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(params![user_id], row_to_token)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Membership operations

    fn upsert_membership(&self, membership: &Membership) -> Result<()> {
        self.conn().execute(
            "INSERT INTO memberships (tenant_id, user_id, roles, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(tenant_id, user_id) DO UPDATE SET
                roles = excluded.roles,
                updated_at = excluded.updated_at",
            params![
                membership.tenant_id,
                membership.user_id,
                Role::join(&membership.roles),
                format_datetime(&membership.created_at),
                format_datetime(&membership.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_membership(&self, tenant_id: &str, user_id: &str) -> Result<Option<Membership>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE tenant_id = ?1 AND user_id = ?2"
            ),
            params![tenant_id, user_id],
            row_to_membership,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tenant_memberships(&self, tenant_id: &str) -> Result<Vec<Membership>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE tenant_id = ?1 ORDER BY created_at"
        ))?;

        let rows = stmt.query_map(params![tenant_id], row_to_membership)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_memberships(&self, user_id: &str) -> Result<Vec<Membership>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = ?1 ORDER BY created_at"
        ))?;

        let rows = stmt.query_map(params![user_id], row_to_membership)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_membership(&self, tenant_id: &str, user_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM memberships WHERE tenant_id = ?1 AND user_id = ?2",
            params![tenant_id, user_id],
        )?;
        Ok(rows > 0)
    }

    // Record operations

    fn insert_record(&self, def: &EntityDef, record: &Record, links: Links<'_>) -> Result<()> {
        let mut columns = vec!["id", "tenant_id"];
        let mut values = vec![
            SqlValue::Text(record.id.clone()),
            SqlValue::Text(record.tenant_id.clone()),
        ];

        for field in def.fields {
            columns.push(field.name);
            values.push(record.fields.get(field.name).map_or(SqlValue::Null, to_sql));
        }
        if def.is_importable() {
            columns.push("import_hash");
            values.push(opt_text(record.import_hash.as_deref()));
        }
        columns.extend(["created_by_id", "updated_by_id", "created_at", "updated_at"]);
        values.extend([
            opt_text(record.created_by_id.as_deref()),
            opt_text(record.updated_by_id.as_deref()),
            SqlValue::Text(format_datetime(&record.created_at)),
            SqlValue::Text(format_datetime(&record.updated_at)),
        ]);

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            def.table,
            columns.join(", "),
            placeholders(values.len())
        );

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(&sql, params_from_iter(values))
            .map_err(|e| map_write_error(def, e))?;
        write_links(&tx, record, links)?;
        tx.commit()?;
        Ok(())
    }

    fn update_record(&self, def: &EntityDef, record: &Record, links: Links<'_>) -> Result<bool> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();

        for field in def.fields {
            assignments.push(format!("{} = ?", field.name));
            values.push(record.fields.get(field.name).map_or(SqlValue::Null, to_sql));
        }
        if def.is_importable() {
            assignments.push("import_hash = ?".to_string());
            values.push(opt_text(record.import_hash.as_deref()));
        }
        assignments.push("updated_by_id = ?".to_string());
        values.push(opt_text(record.updated_by_id.as_deref()));
        assignments.push("updated_at = ?".to_string());
        values.push(SqlValue::Text(format_datetime(&record.updated_at)));

        values.push(SqlValue::Text(record.id.clone()));
        values.push(SqlValue::Text(record.tenant_id.clone()));

        let live = if def.is_soft_delete() {
            " AND deleted_at IS NULL"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? AND tenant_id = ?{live}",
            def.table,
            assignments.join(", ")
        );

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let rows = tx
            .execute(&sql, params_from_iter(values))
            .map_err(|e| map_write_error(def, e))?;
        if rows == 0 {
            return Ok(false);
        }
        write_links(&tx, record, links)?;
        tx.commit()?;
        Ok(true)
    }

    fn get_record(
        &self,
        def: &EntityDef,
        tenant_id: &str,
        id: &str,
        include_deleted: bool,
    ) -> Result<Option<Record>> {
        let live = if def.is_soft_delete() && !include_deleted {
            " AND deleted_at IS NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1 AND tenant_id = ?2{live}",
            select_columns(def),
            def.table
        );

        let conn = self.conn();
        let record = conn
            .query_row(&sql, params![id, tenant_id], |row| row_to_record(def, row))
            .optional()?;

        match record {
            Some(mut record) => {
                load_links(&conn, def, &mut record)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn get_record_by_unique(
        &self,
        def: &EntityDef,
        field: &str,
        value: &str,
    ) -> Result<Option<Record>> {
        let field = def
            .field(field)
            .ok_or_else(|| Error::Validation(format!("{field} is not a field of {}", def.name)))?;
        let live = if def.is_soft_delete() {
            " AND deleted_at IS NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1{live}",
            select_columns(def),
            def.table,
            field.name
        );

        let conn = self.conn();
        let record = conn
            .query_row(&sql, params![value], |row| row_to_record(def, row))
            .optional()?;

        match record {
            Some(mut record) => {
                load_links(&conn, def, &mut record)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn find_records(
        &self,
        def: &EntityDef,
        tenant_id: &str,
        query: &RecordQuery,
    ) -> Result<(Vec<Record>, i64)> {
        let (clause, mut values) = where_clause(def, tenant_id, query);
        let conn = self.conn();

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {clause}", def.table),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let direction = if query.descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {} FROM {} WHERE {clause} ORDER BY {} {direction}, id {direction} LIMIT ? OFFSET ?",
            select_columns(def),
            def.table,
            query.order_by
        );
        values.push(SqlValue::Integer(query.limit));
        values.push(SqlValue::Integer(query.offset));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| row_to_record(def, row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for mut record in rows {
            load_links(&conn, def, &mut record)?;
            records.push(record);
        }
        Ok((records, count))
    }

    fn soft_delete_records(
        &self,
        def: &EntityDef,
        tenant_id: &str,
        ids: &[String],
        user_id: Option<&str>,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = SqlValue::Text(format_datetime(&Utc::now()));
        let mut values = vec![
            now.clone(),
            now,
            opt_text(user_id),
            SqlValue::Text(tenant_id.to_string()),
        ];
        values.extend(ids.iter().map(|id| SqlValue::Text(id.clone())));

        let sql = format!(
            "UPDATE {} SET deleted_at = ?, updated_at = ?, updated_by_id = COALESCE(?, updated_by_id)
             WHERE tenant_id = ? AND deleted_at IS NULL AND id IN ({})",
            def.table,
            placeholders(ids.len())
        );
        let rows = self.conn().execute(&sql, params_from_iter(values))?;
        Ok(rows)
    }

    fn hard_delete_records(
        &self,
        def: &EntityDef,
        tenant_id: &str,
        ids: &[String],
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut values = vec![SqlValue::Text(tenant_id.to_string())];
        values.extend(ids.iter().map(|id| SqlValue::Text(id.clone())));

        let sql = format!(
            "DELETE FROM {} WHERE tenant_id = ? AND id IN ({})",
            def.table,
            placeholders(ids.len())
        );
        let rows = self.conn().execute(&sql, params_from_iter(values))?;
        Ok(rows)
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
