use std::fmt;

use serde::{Deserialize, Serialize};

/// Role a user holds inside one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Supervisor,
    Guard,
    Customer,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Manager,
        Role::Supervisor,
        Role::Guard,
        Role::Customer,
    ];

    /// Role names as stored in the database and accepted by the API.
    pub const NAMES: &'static [&'static str] =
        &["admin", "manager", "supervisor", "guard", "customer"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Supervisor => "supervisor",
            Role::Guard => "guard",
            Role::Customer => "customer",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }

    /// Parses a comma separated role list, as stored in `memberships.roles`.
    pub fn parse_list(s: &str) -> Option<Vec<Role>> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Role::parse)
            .collect()
    }

    #[must_use]
    pub fn join(roles: &[Role]) -> String {
        roles
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a request wants to do with an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Edit,
    Destroy,
    Import,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Read,
        Action::Create,
        Action::Edit,
        Action::Destroy,
        Action::Import,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Destroy => "destroy",
            Action::Import => "import",
        }
    }
}

/// Roles allowed to perform each action on one entity.
#[derive(Debug, Clone, Copy)]
pub struct Access {
    pub read: &'static [Role],
    pub create: &'static [Role],
    pub edit: &'static [Role],
    pub destroy: &'static [Role],
    pub import: &'static [Role],
}

impl Access {
    /// Import follows create unless overridden.
    #[must_use]
    pub const fn new(
        read: &'static [Role],
        create: &'static [Role],
        edit: &'static [Role],
        destroy: &'static [Role],
    ) -> Self {
        Self {
            read,
            create,
            edit,
            destroy,
            import: create,
        }
    }

    #[must_use]
    pub const fn with_import(self, import: &'static [Role]) -> Self {
        Self { import, ..self }
    }

    #[must_use]
    pub fn allowed_roles(&self, action: Action) -> &'static [Role] {
        match action {
            Action::Read => self.read,
            Action::Create => self.create,
            Action::Edit => self.edit,
            Action::Destroy => self.destroy,
            Action::Import => self.import,
        }
    }

    /// Returns true if any of the given roles may perform the action.
    #[must_use]
    pub fn permits(&self, roles: &[Role], action: Action) -> bool {
        let allowed = self.allowed_roles(action);
        roles.iter().any(|r| allowed.contains(r))
    }
}

/// A named capability, rendered as `entity:action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    pub entity: &'static str,
    pub action: Action,
}

impl Capability {
    #[must_use]
    pub const fn new(entity: &'static str, action: Action) -> Self {
        Self { entity, action }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity, self.action.as_str())
    }
}

impl Serialize for Capability {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAFF: &[Role] = &[Role::Admin, Role::Manager];
    const EVERYONE: &[Role] = &[
        Role::Admin,
        Role::Manager,
        Role::Supervisor,
        Role::Guard,
        Role::Customer,
    ];

    #[test]
    fn test_access_permits_union_of_roles() {
        let access = Access::new(EVERYONE, STAFF, STAFF, &[Role::Admin]);
        assert!(access.permits(&[Role::Customer], Action::Read));
        assert!(!access.permits(&[Role::Customer], Action::Create));
        assert!(access.permits(&[Role::Customer, Role::Manager], Action::Create));
        assert!(!access.permits(&[Role::Manager], Action::Destroy));
    }

    #[test]
    fn test_import_defaults_to_create() {
        let access = Access::new(EVERYONE, STAFF, STAFF, STAFF);
        assert!(access.permits(&[Role::Manager], Action::Import));

        let narrowed = access.with_import(&[Role::Admin]);
        assert!(!narrowed.permits(&[Role::Manager], Action::Import));
    }

    #[test]
    fn test_parse_role_list() {
        assert_eq!(
            Role::parse_list("admin, guard"),
            Some(vec![Role::Admin, Role::Guard])
        );
        assert_eq!(Role::parse_list("admin,janitor"), None);
        assert_eq!(Role::join(&[Role::Manager, Role::Customer]), "manager,customer");
    }

    #[test]
    fn test_capability_display() {
        let cap = Capability::new("incident", Action::Create);
        assert_eq!(cap.to_string(), "incident:create");
    }
}
