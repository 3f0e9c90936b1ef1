//! `RequestTable` over the board's HTTP API, plus a `ChangeFeed` read from
//! the server's `/ws` socket.
//!
//! Used by the CLI. A store built on `HttpBackend` alone is loaded with
//! `RequestStore::load` and re-loaded to refresh; with a `RemoteFeed` it is
//! activated like any other store and follows the server's writes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::backend::{ChangeFeed, RequestTable, TimeSource};
use super::feed::ChangeEvent;
use super::models::*;
use super::roles::{Role, RoleAssignment, RoleStore};
use crate::errors::BoardError;

#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BoardError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rmw-board/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `ws://` (or `wss://`) address of the change feed socket.
    pub fn feed_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/ws", base)
    }

    /// Open the change feed socket and relay its events to local subscribers.
    pub async fn connect_feed(&self, capacity: usize) -> Result<RemoteFeed, BoardError> {
        let url = self.feed_url();
        let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::info!(%url, "change feed connected");

        let (tx, _) = broadcast::channel(capacity.max(1));
        let relay = tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = socket.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ChangeEvent>(&text) {
                        Ok(event) => {
                            let _ = relay.send(event);
                        }
                        Err(e) => tracing::warn!(error = %e, "undecodable change event"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "change feed socket failed");
                        break;
                    }
                }
            }
            tracing::info!("change feed disconnected");
        });
        Ok(RemoteFeed { tx, reader })
    }

    async fn json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BoardError> {
        let resp = Self::check(resp).await?;
        Ok(resp.json::<T>().await?)
    }

    /// Turn a non-2xx response into `BoardError::Remote`, keeping the
    /// server's `{"error": ...}` message when there is one.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, BoardError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or(text);
        Err(BoardError::Remote {
            status: status.as_u16(),
            message,
        })
    }
}

/// Change events streamed from a board server.
///
/// Subscribers stay open after the socket drops; check `is_connected` and
/// fall back to re-fetching once it returns false.
pub struct RemoteFeed {
    tx: broadcast::Sender<ChangeEvent>,
    reader: JoinHandle<()>,
}

impl RemoteFeed {
    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished()
    }
}

impl ChangeFeed for RemoteFeed {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Drop for RemoteFeed {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Recover typed errors for a single-record call.
fn for_record(id: RequestId, err: BoardError) -> BoardError {
    match err {
        BoardError::Remote { status: 404, .. } => BoardError::RequestNotFound { id },
        BoardError::Remote { status: 409, .. } => BoardError::AlreadyCompleted { id },
        other => other,
    }
}

#[async_trait]
impl RequestTable for HttpBackend {
    async fn fetch_all(&self) -> Result<Vec<Request>, BoardError> {
        let resp = self.client.get(self.url("/api/requests")).send().await?;
        Self::json(resp).await
    }

    async fn insert(&self, draft: RequestDraft) -> Result<Request, BoardError> {
        let resp = self
            .client
            .post(self.url("/api/requests"))
            .json(&draft)
            .send()
            .await?;
        Self::json(resp).await
    }

    async fn update(&self, id: RequestId, patch: RequestPatch) -> Result<Request, BoardError> {
        let resp = self
            .client
            .patch(self.url(&format!("/api/requests/{}", id)))
            .json(&patch)
            .send()
            .await?;
        Self::json(resp).await.map_err(|e| for_record(id, e))
    }

    async fn delete(&self, id: RequestId) -> Result<(), BoardError> {
        let resp = self
            .client
            .delete(self.url(&format!("/api/requests/{}", id)))
            .send()
            .await?;
        Self::check(resp).await.map_err(|e| for_record(id, e))?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), BoardError> {
        let resp = self.client.delete(self.url("/api/requests")).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn list_departments(&self) -> Result<Vec<Department>, BoardError> {
        let resp = self.client.get(self.url("/api/departments")).send().await?;
        Self::json(resp).await
    }

    async fn ensure_department(&self, name: &str) -> Result<Department, BoardError> {
        let resp = self
            .client
            .post(self.url("/api/departments"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Self::json(resp).await
    }

    async fn department_downtime(&self) -> Result<Vec<DepartmentDowntime>, BoardError> {
        let resp = self
            .client
            .get(self.url("/api/analytics/departments"))
            .send()
            .await?;
        Self::json(resp).await
    }
}

#[async_trait]
impl TimeSource for HttpBackend {
    async fn server_now(&self) -> Result<DateTime<Utc>, BoardError> {
        let resp = self.client.get(self.url("/api/time")).send().await?;
        let time: ServerTime = Self::json(resp).await?;
        Ok(time.now)
    }
}

#[async_trait]
impl RoleStore for HttpBackend {
    async fn role_for(&self, user_id: &str) -> Result<Option<Role>, BoardError> {
        let resp = self
            .client
            .get(self.url(&format!("/api/users/{}/role", user_id)))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let assignment: RoleAssignment = Self::json(resp).await?;
        Ok(Some(assignment.role))
    }

    async fn assign_role(&self, user_id: &str, role: Role) -> Result<(), BoardError> {
        let resp = self
            .client
            .put(self.url(&format!("/api/users/{}/role", user_id)))
            .json(&serde_json::json!({ "role": role }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
