use crate::server::response::ApiError;
use crate::types::Role;

const MAX_TENANT_NAME_LEN: usize = 255;
const MAX_EMAIL_LEN: usize = 255;

pub fn validate_tenant_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Tenant name cannot be empty"));
    }
    if name.chars().count() > MAX_TENANT_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Tenant name cannot exceed {MAX_TENANT_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Normalizes an email address to lowercase after a structural check.
pub fn validate_email(email: &str) -> Result<String, String> {
    let email = email.trim();
    if email.len() > MAX_EMAIL_LEN {
        return Err(format!("Email cannot exceed {MAX_EMAIL_LEN} characters"));
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(format!("Invalid email address: {email}"));
    }
    Ok(email.to_lowercase())
}

/// Parses role names, dropping duplicates. At least one role is required.
pub fn parse_roles(names: &[String]) -> Result<Vec<Role>, ApiError> {
    let mut roles = Vec::new();
    for name in names {
        let role = Role::parse(name.trim())
            .ok_or_else(|| ApiError::bad_request(format!("Invalid role: {name}")))?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    if roles.is_empty() {
        return Err(ApiError::bad_request("At least one role is required"));
    }
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" Ana@Example.com ").unwrap(), "ana@example.com");
        assert!(validate_email("ana").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ana@localhost").is_err());
        assert!(validate_email("ana @example.com").is_err());
    }

    #[test]
    fn test_validate_tenant_name() {
        assert_eq!(validate_tenant_name("  Acme Security ").unwrap(), "Acme Security");
        assert!(validate_tenant_name("   ").is_err());
        assert!(validate_tenant_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_parse_roles() {
        let roles = parse_roles(&["guard".into(), "supervisor".into(), "guard".into()]).unwrap();
        assert_eq!(roles, vec![Role::Guard, Role::Supervisor]);
        assert!(parse_roles(&[]).is_err());
        assert!(parse_roles(&["owner".into()]).is_err());
    }
}
