mod helpers;
mod middleware;
mod token;

pub use helpers::{
    TokenValidationError, ValidatedToken, extract_token_from_header, issue_token, validate_token,
};
pub use middleware::{AuthError, RequireAdmin, RequireAuth, RequireUser};
pub use token::{IssuedToken, TokenGenerator, generate_opaque_token, parse_token};
