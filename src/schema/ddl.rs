//! Table definitions generated from entity descriptors.

use std::fmt::Write as _;

use super::{ENTITIES, EntityDef, FieldKind, Relation, UniqueScope};

fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Boolean | FieldKind::Integer { .. } => "INTEGER",
        _ => "TEXT",
    }
}

/// `CREATE` statements for one entity: its table, its join tables and its
/// indexes.
#[must_use]
pub fn create_entity(def: &EntityDef) -> String {
    let mut sql = String::new();
    let table = def.table;

    let _ = writeln!(sql, "CREATE TABLE IF NOT EXISTS {table} (");
    let _ = writeln!(sql, "    id TEXT PRIMARY KEY,");
    let _ = writeln!(
        sql,
        "    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,"
    );
    for field in def.fields {
        let not_null = if field.required { " NOT NULL" } else { "" };
        let _ = writeln!(
            sql,
            "    {} {}{not_null},",
            field.name,
            column_type(field.kind)
        );
    }
    if def.is_importable() {
        let _ = writeln!(sql, "    import_hash TEXT,");
    }
    let _ = writeln!(sql, "    created_by_id TEXT,");
    let _ = writeln!(sql, "    updated_by_id TEXT,");
    let _ = writeln!(sql, "    created_at TEXT NOT NULL,");
    if def.is_soft_delete() {
        let _ = writeln!(sql, "    updated_at TEXT NOT NULL,");
        let _ = writeln!(sql, "    deleted_at TEXT");
    } else {
        let _ = writeln!(sql, "    updated_at TEXT NOT NULL");
    }
    let _ = writeln!(sql, ");");

    let _ = writeln!(
        sql,
        "CREATE INDEX IF NOT EXISTS ix_{table}_tenant ON {table}(tenant_id);"
    );

    for index in def.unique {
        let name = format!("ux_{table}_{}", index.fields.join("_"));
        let columns = index.fields.join(", ");
        let (columns, filter) = match index.scope {
            UniqueScope::Tenant if def.is_soft_delete() => {
                (format!("tenant_id, {columns}"), " WHERE deleted_at IS NULL")
            }
            UniqueScope::Tenant => (format!("tenant_id, {columns}"), ""),
            UniqueScope::Global => (columns, ""),
        };
        let _ = writeln!(
            sql,
            "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON {table}({columns}){filter};"
        );
    }

    for relation in def.many_to_many() {
        if let Relation::ManyToMany {
            through,
            source_key,
            target_key,
            ..
        } = *relation
        {
            let _ = writeln!(sql, "CREATE TABLE IF NOT EXISTS {through} (");
            let _ = writeln!(sql, "    tenant_id TEXT NOT NULL,");
            let _ = writeln!(
                sql,
                "    {source_key} TEXT NOT NULL REFERENCES {table}(id) ON DELETE CASCADE,"
            );
            let _ = writeln!(sql, "    {target_key} TEXT NOT NULL,");
            let _ = writeln!(sql, "    PRIMARY KEY ({source_key}, {target_key})");
            let _ = writeln!(sql, ");");
        }
    }

    sql
}

#[must_use]
pub fn drop_entity(def: &EntityDef) -> String {
    let mut sql = String::new();
    for relation in def.many_to_many() {
        if let Relation::ManyToMany { through, .. } = *relation {
            let _ = writeln!(sql, "DROP TABLE IF EXISTS {through};");
        }
    }
    let _ = writeln!(sql, "DROP TABLE IF EXISTS {};", def.table);
    sql
}

/// Creates every registered entity.
#[must_use]
pub fn create_all() -> String {
    ENTITIES.iter().map(|def| create_entity(def)).collect()
}

/// Drops every registered entity, dependents first.
#[must_use]
pub fn drop_all() -> String {
    ENTITIES.iter().rev().map(|def| drop_entity(def)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entities::{INCIDENT, SHARE_LINK};

    #[test]
    fn test_soft_delete_unique_indexes_are_partial() {
        let sql = create_entity(&INCIDENT);
        assert!(sql.contains("deleted_at TEXT"));
        assert!(sql.contains(
            "ux_incidents_import_hash ON incidents(tenant_id, import_hash) WHERE deleted_at IS NULL"
        ));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS incident_guards"));
        assert!(sql.contains("title TEXT NOT NULL"));
    }

    #[test]
    fn test_hard_delete_tables_have_no_soft_delete_columns() {
        let sql = create_entity(&SHARE_LINK);
        assert!(!sql.contains("deleted_at"));
        assert!(!sql.contains("import_hash"));
        assert!(sql.contains("ux_share_links_token ON share_links(token);"));
    }
}
