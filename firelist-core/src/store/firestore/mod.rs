//! Firestore REST v1 client.
//!
//! CRUD maps directly onto `documents.createDocument`, `patch`, `delete` and
//! `list`. The REST surface has no streaming listen call, so a subscription
//! is a background task that lists the scoped collection every
//! `poll_interval` and emits a snapshot whenever the listing differs from
//! the last one it sent.
//!
//! A store built with [`FirestoreStore::with_session`] renews its id token
//! through the [`AuthProvider`] when a request comes back `401`, then retries
//! that request once.

pub mod value;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::sync::{mpsc, Mutex};

use super::{RemoteStore, SnapshotStream, StoreError};
use crate::auth::{AuthProvider, Session};
use crate::models::{NewTodo, Scope, Snapshot, TodoPatch};
use value::{Document, ErrorResponse, ListResponse};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const PAGE_SIZE: u32 = 300;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for a Firestore project.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Scheme and host, e.g. `https://firestore.googleapis.com` or an
    /// emulator at `http://localhost:8080`.
    pub base_url: String,
    pub poll_interval: Duration,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Bearer token shared by every clone of a store, plus what is needed to
/// renew it.
#[derive(Default)]
struct Credentials {
    id_token: RwLock<Option<String>>,
    renewal: Option<Renewal>,
}

struct Renewal {
    auth: Arc<dyn AuthProvider>,
    session: Mutex<Session>,
}

impl Credentials {
    fn id_token(&self) -> Option<String> {
        self.id_token.read().ok().and_then(|t| t.clone())
    }

    /// Renews the token that `stale` requests were sent with. Returns false
    /// if there is nothing to retry with.
    async fn renew(&self, stale: Option<&str>) -> bool {
        let Some(renewal) = &self.renewal else {
            return false;
        };
        let mut session = renewal.session.lock().await;
        if session.id_token.as_deref() != stale {
            // Another request renewed it while this one waited
            return true;
        }

        match renewal.auth.renew(&session).await {
            Ok(fresh) => {
                if let Ok(mut token) = self.id_token.write() {
                    *token = fresh.id_token.clone();
                }
                *session = fresh;
                true
            }
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, "id token renewal failed: {}", e);
                false
            }
        }
    }
}

#[derive(Clone)]
pub struct FirestoreStore {
    client: Client,
    config: FirestoreConfig,
    credentials: Arc<Credentials>,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            config,
            credentials: Arc::default(),
        })
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.credentials = Arc::new(Credentials {
            id_token: RwLock::new(Some(token.into())),
            renewal: None,
        });
        self
    }

    /// Sends the session's id token and renews it through `auth` when the
    /// server rejects it.
    pub fn with_session(mut self, session: Session, auth: Arc<dyn AuthProvider>) -> Self {
        self.credentials = Arc::new(Credentials {
            id_token: RwLock::new(session.id_token.clone()),
            renewal: Some(Renewal {
                auth,
                session: Mutex::new(session),
            }),
        });
        self
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    /// Builds the URL for a path below the database's document root.
    fn documents_url(&self, path: &str) -> String {
        let base = if !self.config.base_url.starts_with("http://")
            && !self.config.base_url.starts_with("https://")
        {
            format!("http://{}", self.config.base_url)
        } else {
            self.config.base_url.clone()
        };

        format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            base.trim_end_matches('/'),
            self.config.project_id,
            path
        )
    }

    /// Sends the request built by `build`, retrying once with a renewed
    /// token if the first attempt is unauthorized.
    async fn send<F>(&self, build: F) -> Result<Response, StoreError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.credentials.id_token();
        let response = authorize(build(&self.client), token.as_deref()).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED
            || !self.credentials.renew(token.as_deref()).await
        {
            return Ok(response);
        }

        let token = self.credentials.id_token();
        Ok(authorize(build(&self.client), token.as_deref()).send().await?)
    }

    /// Fetches every page of the scoped collection.
    pub async fn list(&self, scope: &Scope) -> Result<Snapshot, StoreError> {
        let url = self.documents_url(&scope.collection_path());
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self.send(|client| client.get(&url).query(&query)).await?;
            let page: ListResponse = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()))?;

            records.extend(page.documents.iter().map(Document::to_record));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(Snapshot::new(records))
    }
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Turns a non-2xx response into a [`StoreError`], keeping the server's
/// message when the body carries one.
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (message, code) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body, String::new()),
    };

    if status == reqwest::StatusCode::NOT_FOUND || code == "NOT_FOUND" {
        return Err(StoreError::NotFound(message));
    }
    Err(StoreError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemoteStore for FirestoreStore {
    async fn create(&self, scope: &Scope, todo: NewTodo) -> Result<String, StoreError> {
        let url = self.documents_url(&scope.collection_path());
        let body = value::encode_new_todo(&todo);
        let response = self.send(|client| client.post(&url).json(&body)).await?;
        let document: Document = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let id = document.id().to_string();
        if id.is_empty() {
            return Err(StoreError::Decode(format!(
                "create returned unnamed document '{}'",
                document.name
            )));
        }
        tracing::debug!(%scope, %id, "created document");
        Ok(id)
    }

    async fn update(&self, scope: &Scope, id: &str, patch: TodoPatch) -> Result<(), StoreError> {
        let url = self.documents_url(&scope.document_path(id));
        let mut query: Vec<(&str, String)> = patch
            .field_paths()
            .into_iter()
            .map(|path| ("updateMask.fieldPaths", path.to_string()))
            .collect();
        query.push(("currentDocument.exists", "true".to_string()));
        let body = value::encode_patch(&patch);

        let response = self
            .send(|client| client.patch(&url).query(&query).json(&body))
            .await?;
        check_status(response).await?;
        tracing::debug!(%scope, %id, "updated document");
        Ok(())
    }

    async fn delete(&self, scope: &Scope, id: &str) -> Result<(), StoreError> {
        let url = self.documents_url(&scope.document_path(id));
        let response = self.send(|client| client.delete(&url)).await?;
        check_status(response).await?;
        tracing::debug!(%scope, %id, "deleted document");
        Ok(())
    }

    async fn subscribe(&self, scope: &Scope) -> Result<SnapshotStream, StoreError> {
        // The first listing happens here so setup failures reach the caller.
        let initial = self.list(scope).await?;

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(poll_collection(
            self.clone(),
            scope.clone(),
            initial,
            tx,
        ));

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

/// Poll loop behind a subscription. Exits when the receiving stream is
/// dropped or after forwarding the first listing error.
async fn poll_collection(
    store: FirestoreStore,
    scope: Scope,
    initial: Snapshot,
    tx: mpsc::Sender<Result<Snapshot, StoreError>>,
) {
    let interval = store.config.poll_interval;
    let mut last = initial.clone();
    if tx.send(Ok(initial)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        match store.list(&scope).await {
            Ok(snapshot) if snapshot == last => {}
            Ok(snapshot) => {
                last = snapshot.clone();
                if tx.send(Ok(snapshot)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(%scope, "listing failed, ending subscription: {}", e);
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
    tracing::debug!(%scope, "poller stopped");
}
