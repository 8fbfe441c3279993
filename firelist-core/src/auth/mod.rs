//! Identity resolution.
//!
//! The mediator needs a user id before it can subscribe. An
//! [`AuthProvider`] produces a [`Session`] holding that id plus whatever
//! tokens the store needs.

mod firebase;
mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use firebase::{FirebaseAuth, FirebaseAuthConfig};
pub use session::SessionStore;

/// A resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
}

impl Session {
    /// A session with no tokens, for stores that don't check credentials.
    pub fn local(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            id_token: None,
            refresh_token: None,
            anonymous: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Sign-in rejected: {0}")]
    Rejected(String),

    #[error("Malformed auth response: {0}")]
    Decode(String),

    #[error("Session file '{path}': {message}")]
    SessionFile { path: String, message: String },
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Http(e.to_string())
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolves the current identity, signing in if needed.
    async fn sign_in(&self) -> Result<Session, AuthError>;

    /// Exchanges a session whose id token was rejected for a fresh one
    /// belonging to the same user.
    async fn renew(&self, _expired: &Session) -> Result<Session, AuthError> {
        Err(AuthError::NotConfigured(
            "this provider cannot renew sessions".to_string(),
        ))
    }
}

/// Always resolves to the same user id.
#[derive(Debug, Clone)]
pub struct StaticAuth {
    user_id: String,
}

impl StaticAuth {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn sign_in(&self) -> Result<Session, AuthError> {
        if self.user_id.trim().is_empty() {
            return Err(AuthError::NotConfigured("empty user id".to_string()));
        }
        Ok(Session::local(self.user_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_auth() {
        let session = StaticAuth::new("local-user").sign_in().await.unwrap();
        assert_eq!(session.user_id, "local-user");
        assert!(session.id_token.is_none());

        assert!(StaticAuth::new("  ").sign_in().await.is_err());

        let err = StaticAuth::new("u").renew(&session).await.unwrap_err();
        assert!(matches!(err, AuthError::NotConfigured(_)));
    }

    #[test]
    fn test_session_json_omits_missing_tokens() {
        let json = serde_json::to_string(&Session::local("u")).unwrap();
        assert!(!json.contains("id_token"));
        let parsed: Session = serde_json::from_str(r#"{"user_id":"u"}"#).unwrap();
        assert_eq!(parsed, Session::local("u"));
    }
}
