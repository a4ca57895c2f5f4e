use chrono::{DateTime, Utc};

use super::{TokenGenerator, parse_token};
use crate::error::{Error, Result as StoreResult};
use crate::store::Store;
use crate::types::{Token, User};

#[derive(Debug, PartialEq, Eq)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    /// Set for user tokens; admin tokens carry no user.
    pub user: Option<User>,
}

/// Extracts a token string from a Basic auth header.
/// Expects format: Basic base64(x-token:actual_token)
fn extract_basic_auth_token(header: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;

    if username != "x-token" {
        return None;
    }

    Some(password.to_string())
}

/// Validates a raw token string against the store and records its use.
pub fn validate_token(
    store: &dyn Store,
    raw_token: &str,
) -> Result<ValidatedToken, TokenValidationError> {
    let (lookup, _secret) = parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = store
        .get_token_by_lookup(&lookup)
        .map_err(|e| {
            tracing::error!("Token lookup failed: {e}");
            TokenValidationError::InternalError
        })?
        .ok_or(TokenValidationError::InvalidToken)?;

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if token.expires_at.is_some_and(|expires_at| expires_at < Utc::now()) {
        return Err(TokenValidationError::TokenExpired);
    }

    let user = match &token.user_id {
        Some(user_id) => Some(
            store
                .get_user(user_id)
                .map_err(|_| TokenValidationError::InternalError)?
                .ok_or(TokenValidationError::InvalidToken)?,
        ),
        None => None,
    };

    if let Err(e) = store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}

const MAX_ISSUE_RETRIES: u32 = 3;

/// Mints and stores a new token, retrying on lookup collisions. Returns the
/// raw token alongside the stored metadata.
pub fn issue_token(
    store: &dyn Store,
    user_id: Option<&str>,
    is_admin: bool,
    expires_at: Option<DateTime<Utc>>,
) -> StoreResult<(String, Token)> {
    let generator = TokenGenerator::new();

    for _ in 0..MAX_ISSUE_RETRIES {
        let issued = generator.generate()?;
        let token = Token {
            id: uuid::Uuid::new_v4().to_string(),
            token_hash: issued.hash,
            token_lookup: issued.lookup,
            is_admin,
            user_id: user_id.map(str::to_string),
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };

        match store.create_token(&token) {
            Ok(()) => return Ok((issued.raw, token)),
            Err(Error::TokenLookupCollision) => {
                tracing::warn!("Token lookup collision, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::TokenLookupCollision)
}

/// Extracts token from Authorization header (Bearer or Basic).
/// Returns None if no auth header is present.
/// Returns Err if the auth scheme is unsupported.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> Result<Option<String>, TokenValidationError> {
    match auth_header {
        Some(header) => {
            if let Some(token) = header.strip_prefix("Bearer ") {
                Ok(Some(token.trim().to_string()))
            } else if header.starts_with("Basic ") {
                extract_basic_auth_token(header)
                    .ok_or(TokenValidationError::InvalidToken)
                    .map(Some)
            } else {
                Err(TokenValidationError::InvalidScheme)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use super::*;
    use crate::store::SqliteStore;

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(None), Ok(None));
        assert_eq!(
            extract_token_from_header(Some("Bearer abc")),
            Ok(Some("abc".to_string()))
        );

        let basic = format!("Basic {}", STANDARD.encode("x-token:abc"));
        assert_eq!(
            extract_token_from_header(Some(&basic)),
            Ok(Some("abc".to_string()))
        );

        let wrong_user = format!("Basic {}", STANDARD.encode("someone:abc"));
        assert_eq!(
            extract_token_from_header(Some(&wrong_user)),
            Err(TokenValidationError::InvalidToken)
        );
        assert_eq!(
            extract_token_from_header(Some("Digest abc")),
            Err(TokenValidationError::InvalidScheme)
        );
    }

    #[test]
    fn test_validate_token() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let (raw, token) = issue_token(&store, None, true, None).unwrap();

        let validated = validate_token(&store, &raw).unwrap();
        assert!(validated.token.is_admin);
        assert!(validated.user.is_none());

        let last_used = store.get_token_by_id(&token.id).unwrap().unwrap().last_used_at;
        assert!(last_used.is_some());

        let forged = format!(
            "guardpost_{}_{}",
            token.token_lookup,
            "0".repeat(crate::auth::token::SECRET_LENGTH)
        );
        assert!(parse_token(&forged).is_ok());
        assert!(matches!(
            validate_token(&store, &forged),
            Err(TokenValidationError::InvalidToken)
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let expired = Utc::now() - chrono::Duration::seconds(5);
        let (raw, _) = issue_token(&store, None, true, Some(expired)).unwrap();
        assert!(matches!(
            validate_token(&store, &raw),
            Err(TokenValidationError::TokenExpired)
        ));
    }
}
