//! Firebase Authentication over the Identity Toolkit REST API.
//!
//! Resolution order:
//! 1. A saved session whose refresh token still works.
//! 2. A configured custom token (`accounts:signInWithCustomToken`).
//! 3. A fresh anonymous account (`accounts:signUp`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use super::{AuthError, AuthProvider, Session, SessionStore};

pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com";
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct FirebaseAuthConfig {
    /// Web API key of the Firebase project.
    pub api_key: String,
    pub custom_token: Option<String>,
    pub identity_url: String,
    pub token_url: String,
}

impl FirebaseAuthConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            custom_token: None,
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    pub fn with_custom_token(mut self, token: Option<String>) -> Self {
        self.custom_token = token.filter(|t| !t.is_empty());
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: Option<String>,
    local_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
}

// The secure token endpoint answers in snake_case
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct FirebaseAuth {
    client: Client,
    config: FirebaseAuthConfig,
    sessions: Option<SessionStore>,
}

impl FirebaseAuth {
    pub fn new(config: FirebaseAuthConfig) -> Result<Self, AuthError> {
        if config.api_key.is_empty() {
            return Err(AuthError::NotConfigured("missing Firebase API key".to_string()));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            config,
            sessions: None,
        })
    }

    /// Reuses and updates the session saved in `store`.
    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        self.sessions = Some(store);
        self
    }

    fn identity_endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1/accounts:{}?key={}",
            self.config.identity_url.trim_end_matches('/'),
            method,
            self.config.api_key
        )
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/v1/token?key={}",
            self.config.token_url.trim_end_matches('/'),
            self.config.api_key
        )
    }

    async fn sign_in_anonymously(&self) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(self.identity_endpoint("signUp"))
            .json(&json!({ "returnSecureToken": true }))
            .send()
            .await?;
        let body: SignInResponse = decode(response).await?;

        let user_id = body
            .local_id
            .ok_or_else(|| AuthError::Decode("signUp response has no localId".to_string()))?;
        tracing::info!(%user_id, "signed in anonymously");
        Ok(Session {
            user_id,
            id_token: Some(body.id_token),
            refresh_token: body.refresh_token,
            anonymous: true,
        })
    }

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(self.identity_endpoint("signInWithCustomToken"))
            .json(&json!({ "token": token, "returnSecureToken": true }))
            .send()
            .await?;
        let body: SignInResponse = decode(response).await?;

        let user_id = match body.local_id {
            Some(id) => id,
            None => self.lookup_user_id(&body.id_token).await?,
        };
        tracing::info!(%user_id, "signed in with custom token");
        Ok(Session {
            user_id,
            id_token: Some(body.id_token),
            refresh_token: body.refresh_token,
            anonymous: false,
        })
    }

    async fn lookup_user_id(&self, id_token: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .post(self.identity_endpoint("lookup"))
            .json(&json!({ "idToken": id_token }))
            .send()
            .await?;
        let body: LookupResponse = decode(response).await?;
        body.users
            .into_iter()
            .next()
            .map(|u| u.local_id)
            .ok_or_else(|| AuthError::Decode("lookup returned no users".to_string()))
    }

    async fn refresh(&self, saved: &Session) -> Result<Session, AuthError> {
        let refresh_token = saved
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::NotConfigured("saved session has no refresh token".into()))?;

        let response = self
            .client
            .post(self.token_endpoint())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        let body: RefreshResponse = decode(response).await?;

        Ok(Session {
            user_id: body.user_id,
            id_token: Some(body.id_token),
            refresh_token: Some(body.refresh_token),
            anonymous: saved.anonymous,
        })
    }

    fn persist(&self, session: &Session) -> Result<(), AuthError> {
        match &self.sessions {
            Some(store) => store.save(session),
            None => Ok(()),
        }
    }

    async fn resume(&self) -> Option<Session> {
        let saved = match self.sessions.as_ref()?.load() {
            Ok(saved) => saved?,
            Err(e) => {
                tracing::warn!("ignoring saved session: {}", e);
                return None;
            }
        };
        match self.refresh(&saved).await {
            Ok(session) => {
                tracing::debug!(user_id = %session.user_id, "resumed saved session");
                Some(session)
            }
            Err(e) => {
                tracing::warn!("saved session could not be refreshed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    async fn sign_in(&self) -> Result<Session, AuthError> {
        let session = match self.resume().await {
            Some(session) => session,
            None => match &self.config.custom_token {
                Some(token) => self.sign_in_with_custom_token(token).await?,
                None => self.sign_in_anonymously().await?,
            },
        };

        self.persist(&session)?;
        Ok(session)
    }

    async fn renew(&self, expired: &Session) -> Result<Session, AuthError> {
        let session = self.refresh(expired).await?;
        if session.user_id != expired.user_id {
            return Err(AuthError::Rejected(format!(
                "token refresh switched user from {} to {}",
                expired.user_id, session.user_id
            )));
        }
        tracing::debug!(user_id = %session.user_id, "renewed id token");
        self.persist(&session)?;
        Ok(session)
    }
}

/// Decodes a success body, or maps the error envelope to [`AuthError::Rejected`].
async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, AuthError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("status {}", status));
        return Err(AuthError::Rejected(message));
    }
    response
        .json()
        .await
        .map_err(|e| AuthError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{error, ok, Recorded, Reply, TestServer};
    use axum::http::StatusCode;
    use tempfile::tempdir;

    fn auth() -> FirebaseAuth {
        FirebaseAuth::new(FirebaseAuthConfig::new("web-key")).unwrap()
    }

    #[test]
    fn test_endpoints() {
        let auth = auth();
        assert_eq!(
            auth.identity_endpoint("signUp"),
            "https://identitytoolkit.googleapis.com/v1/accounts:signUp?key=web-key"
        );
        assert_eq!(
            auth.token_endpoint(),
            "https://securetoken.googleapis.com/v1/token?key=web-key"
        );
    }

    #[test]
    fn test_emulator_endpoints() {
        let mut config = FirebaseAuthConfig::new("k");
        config.identity_url = "http://localhost:9099/identitytoolkit.googleapis.com/".into();
        let auth = FirebaseAuth::new(config).unwrap();
        assert_eq!(
            auth.identity_endpoint("lookup"),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/accounts:lookup?key=k"
        );
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            FirebaseAuth::new(FirebaseAuthConfig::new("")),
            Err(AuthError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_empty_custom_token_is_ignored() {
        let config = FirebaseAuthConfig::new("k").with_custom_token(Some(String::new()));
        assert!(config.custom_token.is_none());
    }

    #[test]
    fn test_response_shapes() {
        let sign_in: SignInResponse = serde_json::from_str(
            r#"{"idToken":"i","refreshToken":"r","localId":"uid","expiresIn":"3600"}"#,
        )
        .unwrap();
        assert_eq!(sign_in.local_id.as_deref(), Some("uid"));

        let refresh: RefreshResponse = serde_json::from_str(
            r#"{"id_token":"i2","refresh_token":"r2","user_id":"uid","expires_in":"3600","token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(refresh.user_id, "uid");

        let err: ErrorEnvelope = serde_json::from_str(
            r#"{"error":{"code":400,"message":"INVALID_CUSTOM_TOKEN","errors":[]}}"#,
        )
        .unwrap();
        assert_eq!(err.error.message, "INVALID_CUSTOM_TOKEN");
    }

    /// Stands in for both the Identity Toolkit and the secure token host.
    fn identity(req: &Recorded) -> Reply {
        match req.path.as_str() {
            "/v1/accounts:signUp" => ok(json!({
                "idToken": "anon-id",
                "refreshToken": "anon-refresh",
                "localId": "anon-uid",
                "expiresIn": "3600"
            })),
            // No localId, so the uid has to be looked up
            "/v1/accounts:signInWithCustomToken" => ok(json!({
                "idToken": "custom-id",
                "refreshToken": "custom-refresh",
                "expiresIn": "3600"
            })),
            "/v1/accounts:lookup" => ok(json!({ "users": [{ "localId": "custom-uid" }] })),
            "/v1/token" => ok(json!({
                "id_token": "refreshed-id",
                "refresh_token": "refreshed-refresh",
                "user_id": "saved-uid",
                "expires_in": "3600",
                "token_type": "Bearer"
            })),
            _ => error(StatusCode::NOT_FOUND, "NOT_FOUND", "unknown endpoint"),
        }
    }

    fn against(
        server: &TestServer,
        custom_token: Option<&str>,
        sessions: &SessionStore,
    ) -> FirebaseAuth {
        let mut config =
            FirebaseAuthConfig::new("web-key").with_custom_token(custom_token.map(str::to_string));
        config.identity_url = server.url.clone();
        config.token_url = server.url.clone();
        FirebaseAuth::new(config)
            .unwrap()
            .with_session_store(sessions.clone())
    }

    fn saved_session() -> Session {
        Session {
            user_id: "saved-uid".to_string(),
            id_token: Some("old-id".to_string()),
            refresh_token: Some("saved-refresh".to_string()),
            anonymous: true,
        }
    }

    #[tokio::test]
    async fn test_sign_in_anonymously_and_save() {
        let server = TestServer::start(identity).await;
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path().join("session.json"));

        let session = against(&server, None, &sessions).sign_in().await.unwrap();
        assert_eq!(session.user_id, "anon-uid");
        assert_eq!(session.id_token.as_deref(), Some("anon-id"));
        assert!(session.anonymous);

        assert_eq!(server.calls(), vec!["POST /v1/accounts:signUp"]);
        assert!(server.requests()[0].query.contains("key=web-key"));
        assert_eq!(sessions.load().unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_custom_token_before_anonymous() {
        let server = TestServer::start(identity).await;
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path().join("session.json"));

        let session = against(&server, Some("signed-token"), &sessions)
            .sign_in()
            .await
            .unwrap();
        assert_eq!(session.user_id, "custom-uid");
        assert!(!session.anonymous);

        assert_eq!(
            server.calls(),
            vec![
                "POST /v1/accounts:signInWithCustomToken",
                "POST /v1/accounts:lookup"
            ]
        );
        let requests = server.requests();
        assert!(requests[0].body.contains("signed-token"));
        assert!(requests[1].body.contains("custom-id"));
        assert_eq!(sessions.load().unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_saved_session_is_resumed_first() {
        let server = TestServer::start(identity).await;
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path().join("session.json"));
        sessions.save(&saved_session()).unwrap();

        let session = against(&server, Some("signed-token"), &sessions)
            .sign_in()
            .await
            .unwrap();
        assert_eq!(session.user_id, "saved-uid");
        assert_eq!(session.id_token.as_deref(), Some("refreshed-id"));
        assert_eq!(session.refresh_token.as_deref(), Some("refreshed-refresh"));
        assert!(session.anonymous);

        assert_eq!(server.calls(), vec!["POST /v1/token"]);
        let body = &server.requests()[0].body;
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("refresh_token=saved-refresh"));
        assert_eq!(sessions.load().unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_rejected_refresh_falls_back_to_sign_up() {
        let server = TestServer::start(|req| match req.path.as_str() {
            "/v1/token" => error(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", "TOKEN_EXPIRED"),
            _ => identity(req),
        })
        .await;
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path().join("session.json"));
        sessions.save(&saved_session()).unwrap();

        let session = against(&server, None, &sessions).sign_in().await.unwrap();
        assert_eq!(session.user_id, "anon-uid");
        assert_eq!(server.calls(), vec!["POST /v1/token", "POST /v1/accounts:signUp"]);
        assert_eq!(sessions.load().unwrap().unwrap().user_id, "anon-uid");
    }

    #[tokio::test]
    async fn test_rejected_sign_up_saves_nothing() {
        let server = TestServer::start(|_| {
            error(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", "ADMIN_ONLY_OPERATION")
        })
        .await;
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path().join("session.json"));

        let err = against(&server, None, &sessions).sign_in().await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(ref m) if m == "ADMIN_ONLY_OPERATION"));
        assert!(sessions.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_renew_keeps_user_and_persists() {
        let server = TestServer::start(identity).await;
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path().join("session.json"));
        let auth = against(&server, None, &sessions);

        let renewed = auth.renew(&saved_session()).await.unwrap();
        assert_eq!(renewed.id_token.as_deref(), Some("refreshed-id"));
        assert_eq!(sessions.load().unwrap(), Some(renewed));

        let other = Session {
            user_id: "someone-else".to_string(),
            ..saved_session()
        };
        assert!(matches!(
            auth.renew(&other).await,
            Err(AuthError::Rejected(_))
        ));
    }
}
