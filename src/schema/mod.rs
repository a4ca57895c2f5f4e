//! Entity descriptors.
//!
//! Every tenant-scoped entity is described by one [`EntityDef`]: a table of
//! field constraints, a table of relations, its unique indexes, how it is
//! deleted, and which roles may do what with it. The repository, the DDL
//! generator and the HTTP layer are all driven from these tables, so adding an
//! entity means adding data to [`entities`], not code.
//!
//! The columns every entity shares (`id`, `tenant_id`, `import_hash`,
//! `created_by_id`, `updated_by_id`, `created_at`, `updated_at`,
//! `deleted_at`) are appended by the machinery and never declared.

pub mod ddl;
pub mod entities;
pub mod validate;

pub use entities::{ENTITIES, lookup, lookup_by_path};

use crate::types::{Access, Action, Capability};

/// Columns managed by the descriptor machinery itself.
pub const RESERVED_COLUMNS: &[&str] = &[
    "id",
    "tenant_id",
    "import_hash",
    "created_by_id",
    "updated_by_id",
    "created_at",
    "updated_at",
    "deleted_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Single-line string, length counted in chars.
    String { min: usize, max: usize },
    Text { max: usize },
    Enum(&'static [&'static str]),
    Boolean,
    Integer { min: Option<i64>, max: Option<i64> },
    Decimal { precision: u32, scale: u32 },
    /// `YYYY-MM-DD`
    Date,
    /// RFC 3339
    DateTime,
    /// Id of another entity of the same tenant.
    Reference { target: &'static str },
    /// Opaque token generated on create when not supplied.
    Token,
}

impl FieldKind {
    /// Strings and text are matched by substring when filtering.
    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self, FieldKind::String { .. } | FieldKind::Text { .. })
    }

    #[must_use]
    pub const fn is_rangeable(self) -> bool {
        matches!(
            self,
            FieldKind::Integer { .. }
                | FieldKind::Decimal { .. }
                | FieldKind::Date
                | FieldKind::DateTime
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Bool(bool),
    Str(&'static str),
    Int(i64),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
}

impl FieldDef {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
        }
    }

    pub const fn string(name: &'static str, min: usize, max: usize) -> Self {
        Self::new(name, FieldKind::String { min, max })
    }

    pub const fn text(name: &'static str, max: usize) -> Self {
        Self::new(name, FieldKind::Text { max })
    }

    pub const fn enumeration(name: &'static str, values: &'static [&'static str]) -> Self {
        Self::new(name, FieldKind::Enum(values))
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub const fn integer(name: &'static str, min: Option<i64>, max: Option<i64>) -> Self {
        Self::new(name, FieldKind::Integer { min, max })
    }

    pub const fn decimal(name: &'static str, precision: u32, scale: u32) -> Self {
        Self::new(name, FieldKind::Decimal { precision, scale })
    }

    pub const fn date(name: &'static str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub const fn datetime(name: &'static str) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub const fn reference(name: &'static str, target: &'static str) -> Self {
        Self::new(name, FieldKind::Reference { target })
    }

    pub const fn token(name: &'static str) -> Self {
        Self::new(name, FieldKind::Token)
    }

    #[must_use]
    pub const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    #[must_use]
    pub const fn default_bool(self, value: bool) -> Self {
        Self {
            default: Some(DefaultValue::Bool(value)),
            ..self
        }
    }

    #[must_use]
    pub const fn default_str(self, value: &'static str) -> Self {
        Self {
            default: Some(DefaultValue::Str(value)),
            ..self
        }
    }

    #[must_use]
    pub const fn default_int(self, value: i64) -> Self {
        Self {
            default: Some(DefaultValue::Int(value)),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Relation {
    /// `field` holds the id of a `target` row. When `enforced` is false the
    /// reference is a convention only and dangling ids are accepted.
    BelongsTo {
        field: &'static str,
        target: &'static str,
        enforced: bool,
    },
    /// Rows of `target` whose `foreign_key` points at this entity.
    HasMany {
        name: &'static str,
        target: &'static str,
        foreign_key: &'static str,
    },
    /// Linked through a join table; exposed as an id array named `name`.
    ManyToMany {
        name: &'static str,
        target: &'static str,
        through: &'static str,
        source_key: &'static str,
        target_key: &'static str,
    },
    /// "Belongs to one of several kinds": `type_field` names the entity,
    /// `id_field` holds its id.
    Polymorphic {
        type_field: &'static str,
        id_field: &'static str,
        targets: &'static [&'static str],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueScope {
    /// Unique per tenant among non-deleted rows.
    Tenant,
    /// Unique across the whole database.
    Global,
}

#[derive(Debug, Clone, Copy)]
pub struct UniqueIndex {
    pub fields: &'static [&'static str],
    pub scope: UniqueScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// `deleted_at` is set and the row is excluded from default queries.
    Soft,
    /// The row is removed.
    Hard,
}

/// Read-only value derived from a datetime field.
#[derive(Debug, Clone, Copy)]
pub struct Computed {
    pub name: &'static str,
    pub source: &'static str,
    pub format: &'static str,
}

#[derive(Debug)]
pub struct EntityDef {
    pub name: &'static str,
    pub table: &'static str,
    /// URL segment under `/tenants/{tenant_id}/`.
    pub path: &'static str,
    /// Field shown by autocomplete.
    pub label_field: &'static str,
    pub fields: &'static [FieldDef],
    pub relations: &'static [Relation],
    pub unique: &'static [UniqueIndex],
    pub computed: &'static [Computed],
    pub deletion: Deletion,
    pub access: Access,
}

impl EntityDef {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn is_soft_delete(&self) -> bool {
        self.deletion == Deletion::Soft
    }

    /// Only soft-deleted entities carry a dedupe token.
    #[must_use]
    pub fn is_importable(&self) -> bool {
        self.is_soft_delete()
    }

    #[must_use]
    pub fn capability(&self, action: Action) -> Capability {
        Capability::new(self.name, action)
    }

    pub fn token_field(&self) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.kind == FieldKind::Token)
    }

    pub fn belongs_to(&self) -> impl Iterator<Item = (&'static str, &'static str, bool)> + '_ {
        self.relations.iter().filter_map(|r| match *r {
            Relation::BelongsTo {
                field,
                target,
                enforced,
            } => Some((field, target, enforced)),
            _ => None,
        })
    }

    pub fn many_to_many(&self) -> impl Iterator<Item = &'static Relation> + '_ {
        self.relations
            .iter()
            .filter(|r| matches!(r, Relation::ManyToMany { .. }))
    }

    #[must_use]
    pub fn many_to_many_named(&self, name: &str) -> Option<&'static Relation> {
        self.many_to_many().find(|r| match r {
            Relation::ManyToMany { name: n, .. } => *n == name,
            _ => false,
        })
    }

    /// Returns `(target, foreign_key)` for a has-many relation.
    #[must_use]
    pub fn has_many(&self, name: &str) -> Option<(&'static str, &'static str)> {
        self.relations.iter().find_map(|r| match *r {
            Relation::HasMany {
                name: n,
                target,
                foreign_key,
            } if n == name => Some((target, foreign_key)),
            _ => None,
        })
    }

    #[must_use]
    pub fn polymorphic(&self) -> Option<(&'static str, &'static str, &'static [&'static str])> {
        self.relations.iter().find_map(|r| match *r {
            Relation::Polymorphic {
                type_field,
                id_field,
                targets,
            } => Some((type_field, id_field, targets)),
            _ => None,
        })
    }
}
