//! Entity services.
//!
//! One generic service per request, delegating straight to the tenant-scoped
//! repository. The only thing it adds is turning a missing lookup into
//! [`Error::NotFound`].

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::repository::{AutocompleteItem, Repository, RequestContext};
use crate::schema::EntityDef;
use crate::store::{RecordQuery, Store};
use crate::types::Record;

pub struct EntityService<'a> {
    repo: Repository<'a>,
}

impl<'a> EntityService<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store, def: &'static EntityDef, ctx: &'a RequestContext) -> Self {
        Self {
            repo: Repository::new(store, def, ctx),
        }
    }

    pub fn create(&self, data: &Map<String, Value>) -> Result<Record> {
        self.repo.create(data)
    }

    pub fn import(&self, data: &Map<String, Value>, import_hash: &str) -> Result<Record> {
        self.repo.import(data, import_hash)
    }

    pub fn update(&self, id: &str, data: &Map<String, Value>) -> Result<Record> {
        self.repo.update(id, data)
    }

    pub fn destroy(&self, id: &str) -> Result<()> {
        self.repo.destroy(id)
    }

    pub fn destroy_all(&self, ids: &[String]) -> Result<usize> {
        self.repo.destroy_all(ids)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Record> {
        self.repo.find_by_id(id)?.ok_or(Error::NotFound)
    }

    pub fn find_by_id_with_deleted(&self, id: &str) -> Result<Record> {
        self.repo.find_by_id_with_deleted(id)?.ok_or(Error::NotFound)
    }

    pub fn find_and_count_all(&self, query: &RecordQuery) -> Result<(Vec<Record>, i64)> {
        self.repo.find_and_count_all(query)
    }

    pub fn autocomplete(&self, query: Option<&str>, limit: Option<i64>) -> Result<Vec<AutocompleteItem>> {
        self.repo.autocomplete(query, limit)
    }

    pub fn children(
        &self,
        id: &str,
        relation: &str,
        query: RecordQuery,
    ) -> Result<(&'static EntityDef, Vec<Record>, i64)> {
        self.repo.children(id, relation, query)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::schema::entities::TUTORIAL;
    use crate::store::SqliteStore;
    use crate::types::{Role, Tenant};

    #[test]
    fn test_missing_lookup_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        store
            .create_tenant(&Tenant {
                id: "t1".to_string(),
                name: "t1".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
        let ctx = RequestContext::new("t1", None, vec![Role::Admin]);
        let service = EntityService::new(&store, &TUTORIAL, &ctx);

        assert!(matches!(service.find_by_id("nope"), Err(Error::NotFound)));

        let data = json!({"title": "Radio", "slug": "radio"});
        let created = service.create(data.as_object().unwrap()).unwrap();
        assert_eq!(service.find_by_id(&created.id).unwrap().id, created.id);
    }
}
