//! Bearer-token authentication as seen by the connection endpoint.
//!
//! Credential issuance, password hashing, and token signing are out of
//! scope for this crate — they belong to a sibling service. What the
//! connection endpoint needs is a single narrow contract: given the token
//! presented on the websocket upgrade, resolve it to a user id or reject it.
//!
//! [`StaticAuthPort`] is a deterministic test double suitable for unit and
//! integration tests; a production deployment supplies its own [`AuthPort`]
//! implementation backed by JWT verification.
use std::collections::HashMap;
use std::fmt;

/// Authenticated user identifier, matching the wire protocol's integer
/// `user_id` field.
pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing bearer token"),
            AuthError::InvalidToken => write!(f, "invalid bearer token"),
        }
    }
}

impl std::error::Error for AuthError {}

/// The entire surface the connection endpoint depends on for authentication.
#[async_trait::async_trait]
pub trait AuthPort: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Fixed token -> user mapping. Used in tests and in deployments that hand
/// out long-lived tokens out of band.
#[derive(Debug, Default)]
pub struct StaticAuthPort {
    tokens: HashMap<String, UserId>,
}

impl StaticAuthPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user: UserId) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }
}

#[async_trait::async_trait]
impl AuthPort for StaticAuthPort {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens
            .get(token)
            .copied()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_resolves_to_its_user() {
        let port = StaticAuthPort::new().with_token("tok-a", 7);
        assert_eq!(port.authenticate("tok-a").await, Ok(7));
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let port = StaticAuthPort::new().with_token("tok-a", 7);
        assert_eq!(port.authenticate("tok-b").await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn empty_token_is_rejected_as_missing() {
        let port = StaticAuthPort::new();
        assert_eq!(port.authenticate("").await, Err(AuthError::MissingToken));
    }
}
