use super::{
    Computed, Deletion, EntityDef, FieldDef, Relation, UniqueIndex, UniqueScope,
};
use crate::types::{Access, Role};

const ALL_ROLES: &[Role] = &[
    Role::Admin,
    Role::Manager,
    Role::Supervisor,
    Role::Guard,
    Role::Customer,
];
const MANAGEMENT: &[Role] = &[Role::Admin, Role::Manager];
const SUPERVISION: &[Role] = &[Role::Admin, Role::Manager, Role::Supervisor];
const FIELD_STAFF: &[Role] = &[Role::Admin, Role::Manager, Role::Supervisor, Role::Guard];
const CLIENT_FACING: &[Role] = &[
    Role::Admin,
    Role::Manager,
    Role::Supervisor,
    Role::Customer,
];
const ADMIN: &[Role] = &[Role::Admin];

/// Entities notes, notifications, files and share links can point at.
const ATTACHABLE: &[&str] = &[
    "client_account",
    "site",
    "guard",
    "shift",
    "checkpoint",
    "patrol",
    "incident",
];

const DEDUPE: UniqueIndex = UniqueIndex {
    fields: &["import_hash"],
    scope: UniqueScope::Tenant,
};

const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M";

pub static CLIENT_ACCOUNT: EntityDef = EntityDef {
    name: "client_account",
    table: "client_accounts",
    path: "client-accounts",
    label_field: "name",
    fields: &[
        FieldDef::string("name", 1, 255).required(),
        FieldDef::string("contact_email", 3, 255),
        FieldDef::string("phone", 1, 32),
        FieldDef::text("address", 1000),
        FieldDef::enumeration("status", &["active", "suspended", "closed"])
            .required()
            .default_str("active"),
    ],
    relations: &[Relation::HasMany {
        name: "sites",
        target: "site",
        foreign_key: "client_account_id",
    }],
    unique: &[DEDUPE],
    computed: &[],
    deletion: Deletion::Soft,
    access: Access::new(CLIENT_FACING, MANAGEMENT, MANAGEMENT, MANAGEMENT),
};

pub static SITE: EntityDef = EntityDef {
    name: "site",
    table: "sites",
    path: "sites",
    label_field: "name",
    fields: &[
        FieldDef::reference("client_account_id", "client_account").required(),
        FieldDef::string("name", 1, 255).required(),
        FieldDef::text("address", 1000),
        FieldDef::decimal("latitude", 9, 6),
        FieldDef::decimal("longitude", 9, 6),
        FieldDef::boolean("active").default_bool(true),
    ],
    relations: &[
        Relation::BelongsTo {
            field: "client_account_id",
            target: "client_account",
            enforced: true,
        },
        Relation::HasMany {
            name: "checkpoints",
            target: "checkpoint",
            foreign_key: "site_id",
        },
        Relation::HasMany {
            name: "shifts",
            target: "shift",
            foreign_key: "site_id",
        },
    ],
    unique: &[DEDUPE],
    computed: &[],
    deletion: Deletion::Soft,
    access: Access::new(CLIENT_FACING, MANAGEMENT, MANAGEMENT, MANAGEMENT),
};

pub static GUARD: EntityDef = EntityDef {
    name: "guard",
    table: "guards",
    path: "guards",
    label_field: "full_name",
    fields: &[
        FieldDef::string("full_name", 1, 255).required(),
        FieldDef::string("license_number", 1, 64),
        FieldDef::string("phone", 1, 32),
        FieldDef::enumeration("status", &["active", "on_leave", "terminated"])
            .required()
            .default_str("active"),
        FieldDef::date("hired_on"),
    ],
    relations: &[Relation::HasMany {
        name: "shifts",
        target: "shift",
        foreign_key: "guard_id",
    }],
    unique: &[
        DEDUPE,
        UniqueIndex {
            fields: &["license_number"],
            scope: UniqueScope::Tenant,
        },
    ],
    computed: &[],
    deletion: Deletion::Soft,
    access: Access::new(SUPERVISION, MANAGEMENT, MANAGEMENT, MANAGEMENT),
};

pub static SHIFT: EntityDef = EntityDef {
    name: "shift",
    table: "shifts",
    path: "shifts",
    label_field: "starts_at",
    fields: &[
        FieldDef::reference("guard_id", "guard").required(),
        FieldDef::reference("site_id", "site").required(),
        FieldDef::datetime("starts_at").required(),
        FieldDef::datetime("ends_at").required(),
        FieldDef::enumeration("status", &["scheduled", "in_progress", "completed", "missed"])
            .required()
            .default_str("scheduled"),
        FieldDef::text("notes", 5000),
    ],
    relations: &[
        Relation::BelongsTo {
            field: "guard_id",
            target: "guard",
            enforced: true,
        },
        Relation::BelongsTo {
            field: "site_id",
            target: "site",
            enforced: true,
        },
        Relation::HasMany {
            name: "patrols",
            target: "patrol",
            foreign_key: "shift_id",
        },
    ],
    unique: &[DEDUPE],
    computed: &[Computed {
        name: "starts_at_label",
        source: "starts_at",
        format: LABEL_FORMAT,
    }],
    deletion: Deletion::Soft,
    access: Access::new(FIELD_STAFF, SUPERVISION, SUPERVISION, MANAGEMENT),
};

pub static CHECKPOINT: EntityDef = EntityDef {
    name: "checkpoint",
    table: "checkpoints",
    path: "checkpoints",
    label_field: "name",
    fields: &[
        FieldDef::reference("site_id", "site").required(),
        FieldDef::string("name", 1, 255).required(),
        FieldDef::string("code", 1, 64).required(),
    ],
    relations: &[Relation::BelongsTo {
        field: "site_id",
        target: "site",
        enforced: true,
    }],
    unique: &[
        DEDUPE,
        UniqueIndex {
            fields: &["code"],
            scope: UniqueScope::Tenant,
        },
    ],
    computed: &[],
    deletion: Deletion::Soft,
    access: Access::new(FIELD_STAFF, MANAGEMENT, MANAGEMENT, MANAGEMENT),
};

pub static PATROL: EntityDef = EntityDef {
    name: "patrol",
    table: "patrols",
    path: "patrols",
    label_field: "started_at",
    fields: &[
        FieldDef::reference("shift_id", "shift"),
        FieldDef::reference("guard_id", "guard"),
        FieldDef::datetime("started_at"),
        FieldDef::datetime("completed_at"),
        FieldDef::enumeration("status", &["planned", "active", "completed", "aborted"])
            .required()
            .default_str("planned"),
    ],
    relations: &[
        Relation::BelongsTo {
            field: "shift_id",
            target: "shift",
            enforced: false,
        },
        Relation::BelongsTo {
            field: "guard_id",
            target: "guard",
            enforced: false,
        },
        Relation::ManyToMany {
            name: "checkpoints",
            target: "checkpoint",
            through: "patrol_checkpoints",
            source_key: "patrol_id",
            target_key: "checkpoint_id",
        },
    ],
    unique: &[DEDUPE],
    computed: &[],
    deletion: Deletion::Soft,
    access: Access::new(FIELD_STAFF, FIELD_STAFF, FIELD_STAFF, MANAGEMENT).with_import(MANAGEMENT),
};

pub static INCIDENT: EntityDef = EntityDef {
    name: "incident",
    table: "incidents",
    path: "incidents",
    label_field: "title",
    fields: &[
        FieldDef::reference("site_id", "site"),
        FieldDef::reference("reported_by_guard_id", "guard"),
        FieldDef::string("title", 1, 255).required(),
        FieldDef::text("description", 10_000),
        FieldDef::enumeration("severity", &["low", "medium", "high", "critical"]).required(),
        FieldDef::datetime("occurred_at").required(),
        FieldDef::enumeration("status", &["open", "investigating", "resolved", "closed"])
            .required()
            .default_str("open"),
    ],
    relations: &[
        Relation::BelongsTo {
            field: "site_id",
            target: "site",
            enforced: false,
        },
        Relation::BelongsTo {
            field: "reported_by_guard_id",
            target: "guard",
            enforced: false,
        },
        Relation::ManyToMany {
            name: "involved_guards",
            target: "guard",
            through: "incident_guards",
            source_key: "incident_id",
            target_key: "guard_id",
        },
    ],
    unique: &[DEDUPE],
    computed: &[Computed {
        name: "occurred_at_label",
        source: "occurred_at",
        format: LABEL_FORMAT,
    }],
    deletion: Deletion::Soft,
    access: Access::new(ALL_ROLES, FIELD_STAFF, FIELD_STAFF, MANAGEMENT),
};

pub static TUTORIAL: EntityDef = EntityDef {
    name: "tutorial",
    table: "tutorials",
    path: "tutorials",
    label_field: "title",
    fields: &[
        FieldDef::string("title", 1, 255).required(),
        FieldDef::string("slug", 1, 128).required(),
        FieldDef::text("body", 50_000),
        FieldDef::string("video_url", 1, 2048),
        FieldDef::enumeration("audience", &["all", "guards", "supervisors", "customers"])
            .required()
            .default_str("all"),
        FieldDef::boolean("published").default_bool(false),
        FieldDef::integer("position", Some(0), None).default_int(0),
    ],
    relations: &[],
    unique: &[
        DEDUPE,
        UniqueIndex {
            fields: &["slug"],
            scope: UniqueScope::Tenant,
        },
    ],
    computed: &[],
    deletion: Deletion::Soft,
    access: Access::new(ALL_ROLES, MANAGEMENT, MANAGEMENT, MANAGEMENT),
};

pub static NOTIFICATION: EntityDef = EntityDef {
    name: "notification",
    table: "notifications",
    path: "notifications",
    label_field: "title",
    fields: &[
        FieldDef::string("recipient_user_id", 1, 64),
        FieldDef::string("title", 1, 255).required(),
        FieldDef::text("body", 5000),
        FieldDef::boolean("read").default_bool(false),
        FieldDef::enumeration("entity_type", ATTACHABLE),
        FieldDef::string("entity_id", 1, 64),
    ],
    relations: &[Relation::Polymorphic {
        type_field: "entity_type",
        id_field: "entity_id",
        targets: ATTACHABLE,
    }],
    unique: &[DEDUPE],
    computed: &[],
    deletion: Deletion::Soft,
    access: Access::new(ALL_ROLES, SUPERVISION, FIELD_STAFF, MANAGEMENT),
};

pub static NOTE: EntityDef = EntityDef {
    name: "note",
    table: "notes",
    path: "notes",
    label_field: "body",
    fields: &[
        FieldDef::text("body", 10_000).required(),
        FieldDef::enumeration("entity_type", ATTACHABLE).required(),
        FieldDef::string("entity_id", 1, 64).required(),
    ],
    relations: &[Relation::Polymorphic {
        type_field: "entity_type",
        id_field: "entity_id",
        targets: ATTACHABLE,
    }],
    unique: &[DEDUPE],
    computed: &[],
    deletion: Deletion::Soft,
    access: Access::new(FIELD_STAFF, FIELD_STAFF, FIELD_STAFF, MANAGEMENT),
};

pub static FILE: EntityDef = EntityDef {
    name: "file",
    table: "files",
    path: "files",
    label_field: "name",
    fields: &[
        FieldDef::string("name", 1, 255).required(),
        FieldDef::string("mime_type", 1, 255),
        FieldDef::integer("size_in_bytes", Some(0), None),
        FieldDef::string("storage_key", 1, 1024).required(),
        FieldDef::enumeration("entity_type", ATTACHABLE),
        FieldDef::string("entity_id", 1, 64),
    ],
    relations: &[Relation::Polymorphic {
        type_field: "entity_type",
        id_field: "entity_id",
        targets: ATTACHABLE,
    }],
    unique: &[DEDUPE],
    computed: &[],
    deletion: Deletion::Soft,
    access: Access::new(FIELD_STAFF, FIELD_STAFF, FIELD_STAFF, MANAGEMENT),
};

pub static INVITATION: EntityDef = EntityDef {
    name: "invitation",
    table: "invitations",
    path: "invitations",
    label_field: "email",
    fields: &[
        FieldDef::string("email", 3, 255).required(),
        FieldDef::enumeration("role", Role::NAMES).required(),
        FieldDef::token("token"),
        FieldDef::datetime("expires_at"),
    ],
    relations: &[],
    unique: &[UniqueIndex {
        fields: &["token"],
        scope: UniqueScope::Global,
    }],
    computed: &[],
    deletion: Deletion::Hard,
    access: Access::new(MANAGEMENT, ADMIN, ADMIN, ADMIN),
};

pub static SHARE_LINK: EntityDef = EntityDef {
    name: "share_link",
    table: "share_links",
    path: "share-links",
    label_field: "entity_type",
    fields: &[
        FieldDef::enumeration("entity_type", ATTACHABLE).required(),
        FieldDef::string("entity_id", 1, 64).required(),
        FieldDef::token("token"),
        FieldDef::datetime("expires_at"),
    ],
    relations: &[Relation::Polymorphic {
        type_field: "entity_type",
        id_field: "entity_id",
        targets: ATTACHABLE,
    }],
    unique: &[UniqueIndex {
        fields: &["token"],
        scope: UniqueScope::Global,
    }],
    computed: &[],
    deletion: Deletion::Hard,
    access: Access::new(SUPERVISION, MANAGEMENT, MANAGEMENT, MANAGEMENT),
};

/// Every registered entity, in dependency order.
pub static ENTITIES: &[&EntityDef] = &[
    &CLIENT_ACCOUNT,
    &SITE,
    &GUARD,
    &SHIFT,
    &CHECKPOINT,
    &PATROL,
    &INCIDENT,
    &TUTORIAL,
    &NOTIFICATION,
    &NOTE,
    &FILE,
    &INVITATION,
    &SHARE_LINK,
];

#[must_use]
pub fn lookup(name: &str) -> Option<&'static EntityDef> {
    ENTITIES.iter().copied().find(|e| e.name == name)
}

#[must_use]
pub fn lookup_by_path(path: &str) -> Option<&'static EntityDef> {
    ENTITIES.iter().copied().find(|e| e.path == path)
}
