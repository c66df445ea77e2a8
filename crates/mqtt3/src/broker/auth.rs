//! Authentication hook. The broker core only ever sees the decision; what
//! backs it (a password table here, anything else elsewhere) is opaque.

use async_trait::async_trait;
use std::collections::HashMap;

/// Outcome of a CONNECT authentication attempt, mapped onto the CONNACK
/// return codes 0x00, 0x04 and 0x05.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Accept,
    BadUserOrPass,
    NotAuthorized,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(
        &self,
        client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
    ) -> AuthDecision;
}

/// Accepts every connection. Useful for tests and closed networks.
#[derive(Debug, Default)]
pub struct AllowAllAuthProvider;

#[async_trait]
impl AuthProvider for AllowAllAuthProvider {
    async fn authenticate(
        &self,
        _client_id: &str,
        _username: Option<&str>,
        _password: Option<&[u8]>,
    ) -> AuthDecision {
        AuthDecision::Accept
    }
}

/// In-memory username/password table with an anonymous-access switch.
#[derive(Debug, Default)]
pub struct PasswordAuthProvider {
    users: HashMap<String, Vec<u8>>,
    allow_anonymous: bool,
}

impl PasswordAuthProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    #[must_use]
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<Vec<u8>>) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }
}

#[async_trait]
impl AuthProvider for PasswordAuthProvider {
    async fn authenticate(
        &self,
        _client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
    ) -> AuthDecision {
        let Some(username) = username else {
            return if self.allow_anonymous {
                AuthDecision::Accept
            } else {
                AuthDecision::NotAuthorized
            };
        };
        match self.users.get(username) {
            Some(expected) if password == Some(expected.as_slice()) => AuthDecision::Accept,
            _ => AuthDecision::BadUserOrPass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_all() {
        let provider = AllowAllAuthProvider;
        assert_eq!(
            provider.authenticate("c1", None, None).await,
            AuthDecision::Accept
        );
    }

    #[tokio::test]
    async fn test_anonymous_switch() {
        let open = PasswordAuthProvider::new().with_anonymous(true);
        assert_eq!(open.authenticate("c1", None, None).await, AuthDecision::Accept);

        let closed = PasswordAuthProvider::new().with_anonymous(false);
        assert_eq!(
            closed.authenticate("c1", None, None).await,
            AuthDecision::NotAuthorized
        );
    }

    #[tokio::test]
    async fn test_password_table() {
        let provider = PasswordAuthProvider::new().with_user("alice", &b"secret"[..]);
        assert_eq!(
            provider
                .authenticate("c1", Some("alice"), Some(b"secret"))
                .await,
            AuthDecision::Accept
        );
        assert_eq!(
            provider
                .authenticate("c1", Some("alice"), Some(b"wrong"))
                .await,
            AuthDecision::BadUserOrPass
        );
        assert_eq!(
            provider.authenticate("c1", Some("mallory"), None).await,
            AuthDecision::BadUserOrPass
        );
    }
}
