//! Tenant-scoped record access.
//!
//! A [`Repository`] binds an [`EntityDef`] to a [`RequestContext`] and turns
//! untyped JSON input into stored [`Record`]s: validation, reference checks,
//! token generation, audit stamping and soft or hard deletion all happen here
//! so every entity behaves the same way.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::generate_opaque_token;
use crate::error::{Error, Result};
use crate::schema::validate::{Mode, Validated, parse_datetime, validate};
use crate::schema::{self, EntityDef, Relation};
use crate::store::query::MAX_LIMIT;
use crate::store::{Filter, Links, RecordQuery, Store};
use crate::types::{Action, Capability, Record, Role};

pub const AUTOCOMPLETE_LIMIT: i64 = 10;
const MAX_IMPORT_HASH_LEN: usize = 255;

/// Who is acting, and inside which tenant.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: String,
    /// `None` for admin tokens acting on a tenant.
    pub user_id: Option<String>,
    pub roles: Vec<Role>,
}

impl RequestContext {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, user_id: Option<String>, roles: Vec<Role>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id,
            roles,
        }
    }

    #[must_use]
    pub fn can(&self, def: &EntityDef, action: Action) -> bool {
        def.access.permits(&self.roles, action)
    }

    /// Every capability the context's roles grant, across all entities.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        schema::ENTITIES
            .iter()
            .flat_map(|def| {
                Action::ALL
                    .iter()
                    .filter(|action| self.can(def, **action))
                    .map(|action| def.capability(*action))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutocompleteItem {
    pub id: String,
    pub label: String,
}

pub struct Repository<'a> {
    store: &'a dyn Store,
    def: &'static EntityDef,
    ctx: &'a RequestContext,
}

impl<'a> Repository<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store, def: &'static EntityDef, ctx: &'a RequestContext) -> Self {
        Self { store, def, ctx }
    }

    #[must_use]
    pub fn def(&self) -> &'static EntityDef {
        self.def
    }

    pub fn create(&self, data: &Map<String, Value>) -> Result<Record> {
        self.insert(data, None)
    }

    /// Creates a record carrying a dedupe token. A live record with the same
    /// token in this tenant makes the import fail with a conflict.
    pub fn import(&self, data: &Map<String, Value>, import_hash: &str) -> Result<Record> {
        if !self.def.is_importable() {
            return Err(Error::Validation(format!(
                "{} does not support import",
                self.def.name
            )));
        }
        let import_hash = import_hash.trim();
        if import_hash.is_empty() || import_hash.len() > MAX_IMPORT_HASH_LEN {
            return Err(Error::Validation(format!(
                "import_hash must be between 1 and {MAX_IMPORT_HASH_LEN} characters"
            )));
        }
        self.insert(data, Some(import_hash.to_string()))
    }

    fn insert(&self, data: &Map<String, Value>, import_hash: Option<String>) -> Result<Record> {
        let Validated { mut fields, links } = validate(self.def, data, Mode::Create)?;

        if let Some(token) = self.def.token_field() {
            if fields.get(token.name).is_none_or(Value::is_null) {
                fields.insert(token.name.to_string(), Value::String(generate_opaque_token()));
            }
        }

        self.check_references(&fields, &fields)?;
        self.check_links(&links)?;

        let now = Utc::now();
        let record = Record {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: self.ctx.tenant_id.clone(),
            fields,
            import_hash,
            created_by_id: self.ctx.user_id.clone(),
            updated_by_id: self.ctx.user_id.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.store.insert_record(self.def, &record, &links)?;
        tracing::debug!(entity = self.def.name, id = %record.id, tenant = %record.tenant_id, "created record");

        self.reload(&record.id)
    }

    /// Merges the supplied fields into the stored record. Omitted fields keep
    /// their value; many-to-many lists are replaced only when supplied.
    pub fn update(&self, id: &str, data: &Map<String, Value>) -> Result<Record> {
        let mut record = self
            .store
            .get_record(self.def, &self.ctx.tenant_id, id, false)?
            .ok_or(Error::NotFound)?;

        let Validated { fields, links } = validate(self.def, data, Mode::Update)?;

        let mut merged = record.fields.clone();
        for (key, value) in &fields {
            merged.insert(key.clone(), value.clone());
        }
        if let Some(token) = self.def.token_field() {
            if merged.get(token.name).is_none_or(Value::is_null) {
                merged.insert(token.name.to_string(), Value::String(generate_opaque_token()));
            }
        }

        self.check_references(&fields, &merged)?;
        self.check_links(&links)?;

        record.fields = merged;
        record.updated_by_id = self.ctx.user_id.clone().or(record.updated_by_id);
        record.updated_at = Utc::now();

        if !self.store.update_record(self.def, &record, &links)? {
            return Err(Error::NotFound);
        }
        tracing::debug!(entity = self.def.name, id, tenant = %self.ctx.tenant_id, "updated record");

        self.reload(id)
    }

    /// Deletes one record; a record that is already gone is not found.
    pub fn destroy(&self, id: &str) -> Result<()> {
        self.destroy_all(&[id.to_string()]).map(|_| ())
    }

    /// Deletes every listed record that is still live and returns how many
    /// were removed. Fails with not-found when none were.
    pub fn destroy_all(&self, ids: &[String]) -> Result<usize> {
        let mut unique: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.trim();
            if !id.is_empty() && !unique.iter().any(|u| u == id) {
                unique.push(id.to_string());
            }
        }
        if unique.is_empty() {
            return Err(Error::Validation("ids must not be empty".into()));
        }

        let removed = if self.def.is_soft_delete() {
            self.store.soft_delete_records(
                self.def,
                &self.ctx.tenant_id,
                &unique,
                self.ctx.user_id.as_deref(),
            )?
        } else {
            self.store
                .hard_delete_records(self.def, &self.ctx.tenant_id, &unique)?
        };

        if removed == 0 {
            return Err(Error::NotFound);
        }
        tracing::debug!(entity = self.def.name, removed, tenant = %self.ctx.tenant_id, "destroyed records");
        Ok(removed)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        Ok(self
            .store
            .get_record(self.def, &self.ctx.tenant_id, id, false)?
            .map(|r| self.decorate(r)))
    }

    /// Looks a record up even if it has been soft-deleted.
    pub fn find_by_id_with_deleted(&self, id: &str) -> Result<Option<Record>> {
        Ok(self
            .store
            .get_record(self.def, &self.ctx.tenant_id, id, true)?
            .map(|r| self.decorate(r)))
    }

    pub fn find_and_count_all(&self, query: &RecordQuery) -> Result<(Vec<Record>, i64)> {
        let (rows, count) = self
            .store
            .find_records(self.def, &self.ctx.tenant_id, query)?;
        Ok((rows.into_iter().map(|r| self.decorate(r)).collect(), count))
    }

    /// Matches `query` as a substring of the entity's label field.
    pub fn autocomplete(&self, query: Option<&str>, limit: Option<i64>) -> Result<Vec<AutocompleteItem>> {
        let label = self.def.label_field;
        let mut find = RecordQuery {
            order_by: label,
            descending: false,
            limit: limit.unwrap_or(AUTOCOMPLETE_LIMIT).clamp(1, MAX_LIMIT),
            ..RecordQuery::default()
        };
        if let Some(needle) = query.map(str::trim).filter(|q| !q.is_empty()) {
            find = find.filter(Filter::Contains(label, needle.to_string()));
        }

        let (rows, _) = self
            .store
            .find_records(self.def, &self.ctx.tenant_id, &find)?;

        Ok(rows
            .into_iter()
            .map(|record| {
                let label = match record.fields.get(label) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                AutocompleteItem {
                    id: record.id,
                    label,
                }
            })
            .collect())
    }

    /// Lists the live children of `id` through the has-many relation
    /// `relation`.
    pub fn children(
        &self,
        id: &str,
        relation: &str,
        query: RecordQuery,
    ) -> Result<(&'static EntityDef, Vec<Record>, i64)> {
        let (target, foreign_key) = self.def.has_many(relation).ok_or(Error::NotFound)?;
        let child = schema::lookup(target).ok_or(Error::NotFound)?;

        if self.find_by_id(id)?.is_none() {
            return Err(Error::NotFound);
        }

        let query = query.filter(Filter::Eq(foreign_key, Value::String(id.to_string())));
        let (rows, count) = Repository::new(self.store, child, self.ctx).find_and_count_all(&query)?;
        Ok((child, rows, count))
    }

    fn reload(&self, id: &str) -> Result<Record> {
        self.find_by_id(id)?.ok_or(Error::NotFound)
    }

    /// Checks enforced references and polymorphic links touched by `supplied`
    /// against the merged field values.
    fn check_references(&self, supplied: &Map<String, Value>, merged: &Map<String, Value>) -> Result<()> {
        let mut problems = Vec::new();

        for (field, target, enforced) in self.def.belongs_to() {
            if !enforced || !supplied.contains_key(field) {
                continue;
            }
            let Some(id) = merged.get(field).and_then(Value::as_str) else {
                continue;
            };
            if !self.exists(target, id)? {
                problems.push(format!("{field} does not reference an existing {target}"));
            }
        }

        if let Some((type_field, id_field, _)) = self.def.polymorphic() {
            if supplied.contains_key(type_field) || supplied.contains_key(id_field) {
                let kind = merged.get(type_field).and_then(Value::as_str);
                let id = merged.get(id_field).and_then(Value::as_str);
                match (kind, id) {
                    (Some(kind), Some(id)) => {
                        if !self.exists(kind, id)? {
                            problems.push(format!("{id_field} does not reference an existing {kind}"));
                        }
                    }
                    (None, None) => {}
                    _ => problems.push(format!("{type_field} and {id_field} must be set together")),
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems.join("; ")))
        }
    }

    /// Every many-to-many id must be a live row of the target in this tenant.
    fn check_links(&self, links: Links<'_>) -> Result<()> {
        let mut problems = Vec::new();

        for (relation, ids) in links {
            let Relation::ManyToMany { name, target, .. } = **relation else {
                continue;
            };
            for id in ids {
                if !self.exists(target, id)? {
                    problems.push(format!("{name} does not reference an existing {target}: {id}"));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems.join("; ")))
        }
    }

    fn exists(&self, entity: &str, id: &str) -> Result<bool> {
        let Some(def) = schema::lookup(entity) else {
            return Ok(false);
        };
        Ok(self
            .store
            .get_record(def, &self.ctx.tenant_id, id, false)?
            .is_some())
    }

    fn decorate(&self, mut record: Record) -> Record {
        decorate(self.def, &mut record);
        record
    }
}

/// Adds the entity's computed labels to a stored record.
pub fn decorate(def: &EntityDef, record: &mut Record) {
    for computed in def.computed {
        let value = record
            .get_str(computed.source)
            .and_then(parse_datetime)
            .map_or(Value::Null, |dt: DateTime<Utc>| {
                Value::String(dt.format(computed.format).to_string())
            });
        record.fields.insert(computed.name.to_string(), value);
    }
}
