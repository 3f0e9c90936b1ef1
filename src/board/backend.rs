//! Seams between the request store and whatever holds the rows.
//!
//! Three capabilities, each its own trait so a client can implement only
//! what it can reach:
//!
//! | Trait          | Capability                                         |
//! |----------------|----------------------------------------------------|
//! | `RequestTable` | fetch / insert / update / delete rows              |
//! | `ChangeFeed`   | row-level change events for the `requests` table   |
//! | `TimeSource`   | the server's current time, for clock sync          |
//!
//! `LocalBackend` implements all three over SQLite and a broadcast channel;
//! `HttpBackend` (see `http.rs`) implements the table and time probe over the
//! board's HTTP API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::db::DbHandle;
use super::feed::{ChangeEvent, publish};
use super::models::*;
use super::roles::{Role, RoleStore};
use crate::errors::BoardError;

#[async_trait]
pub trait RequestTable: Send + Sync {
    /// Every request, ordered by `created_at` descending.
    async fn fetch_all(&self) -> Result<Vec<Request>, BoardError>;
    async fn insert(&self, draft: RequestDraft) -> Result<Request, BoardError>;
    async fn update(&self, id: RequestId, patch: RequestPatch) -> Result<Request, BoardError>;
    async fn delete(&self, id: RequestId) -> Result<(), BoardError>;
    /// Remove every request and every department.
    async fn delete_all(&self) -> Result<(), BoardError>;
    async fn list_departments(&self) -> Result<Vec<Department>, BoardError>;
    async fn ensure_department(&self, name: &str) -> Result<Department, BoardError>;
    async fn department_downtime(&self) -> Result<Vec<DepartmentDowntime>, BoardError>;
}

pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn server_now(&self) -> Result<DateTime<Utc>, BoardError>;
}

/// Validate a submission, make sure its department exists, then insert it.
///
/// Malformed input fails before the table is touched.
pub async fn submit_request(
    table: &dyn RequestTable,
    form: NewRequest,
) -> Result<Request, BoardError> {
    let draft = form.into_draft()?;
    table.ensure_department(&draft.department).await?;
    let request = table.insert(draft).await?;
    tracing::info!(id = %request.id, line = %request.line_id, "request submitted");
    Ok(request)
}

// ── In-process backend ───────────────────────────────────────────────

/// SQLite-backed table that publishes every committed write on a
/// broadcast channel. The HTTP server wraps one of these.
///
/// Events are sent while the database lock is still held, so the feed
/// carries writes in commit order.
#[derive(Clone)]
pub struct LocalBackend {
    db: DbHandle,
    feed: broadcast::Sender<ChangeEvent>,
}

impl LocalBackend {
    pub fn new(db: DbHandle, feed_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity);
        Self { db, feed }
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    pub fn sender(&self) -> broadcast::Sender<ChangeEvent> {
        self.feed.clone()
    }

    pub async fn get(&self, id: RequestId) -> Result<Option<Request>, BoardError> {
        self.db
            .call(move |db| db.get_request(id))
            .await
            .map_err(BoardError::from_storage)
    }
}

#[async_trait]
impl RequestTable for LocalBackend {
    async fn fetch_all(&self) -> Result<Vec<Request>, BoardError> {
        self.db
            .call(|db| db.list_requests())
            .await
            .map_err(BoardError::from_storage)
    }

    async fn insert(&self, draft: RequestDraft) -> Result<Request, BoardError> {
        let feed = self.feed.clone();
        self.db
            .call(move |db| {
                let record = db.insert_request(&draft, Utc::now())?;
                publish(&feed, ChangeEvent::Insert { record: record.clone() });
                Ok(record)
            })
            .await
            .map_err(BoardError::from_storage)
    }

    async fn update(&self, id: RequestId, patch: RequestPatch) -> Result<Request, BoardError> {
        let feed = self.feed.clone();
        self.db
            .call(move |db| {
                let record = db.update_request(id, &patch)?;
                publish(&feed, ChangeEvent::Update { record: record.clone() });
                Ok(record)
            })
            .await
            .map_err(BoardError::from_storage)
    }

    async fn delete(&self, id: RequestId) -> Result<(), BoardError> {
        let feed = self.feed.clone();
        let deleted = self
            .db
            .call(move |db| {
                let deleted = db.delete_request(id)?;
                if deleted {
                    publish(&feed, ChangeEvent::Delete { id });
                }
                Ok(deleted)
            })
            .await
            .map_err(BoardError::from_storage)?;
        if !deleted {
            return Err(BoardError::RequestNotFound { id });
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), BoardError> {
        let feed = self.feed.clone();
        let count = self
            .db
            .call(move |db| {
                let removed = db.reset()?;
                for id in &removed {
                    publish(&feed, ChangeEvent::Delete { id: *id });
                }
                Ok(removed.len())
            })
            .await
            .map_err(BoardError::from_storage)?;
        tracing::warn!(count, "board reset");
        Ok(())
    }

    async fn list_departments(&self) -> Result<Vec<Department>, BoardError> {
        self.db
            .call(|db| db.list_departments())
            .await
            .map_err(BoardError::from_storage)
    }

    async fn ensure_department(&self, name: &str) -> Result<Department, BoardError> {
        let name = name.to_string();
        let (department, created) = self
            .db
            .call(move |db| db.ensure_department(&name, Utc::now()))
            .await
            .map_err(BoardError::from_storage)?;
        if created {
            tracing::info!(name = %department.name, "department created");
        }
        Ok(department)
    }

    async fn department_downtime(&self) -> Result<Vec<DepartmentDowntime>, BoardError> {
        self.db
            .call(|db| db.department_downtime())
            .await
            .map_err(BoardError::from_storage)
    }
}

impl ChangeFeed for LocalBackend {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}

#[async_trait]
impl TimeSource for LocalBackend {
    async fn server_now(&self) -> Result<DateTime<Utc>, BoardError> {
        Ok(Utc::now())
    }
}

#[async_trait]
impl RoleStore for LocalBackend {
    async fn role_for(&self, user_id: &str) -> Result<Option<Role>, BoardError> {
        let user_id = user_id.to_string();
        self.db
            .call(move |db| db.get_role(&user_id))
            .await
            .map_err(BoardError::from_storage)
    }

    async fn assign_role(&self, user_id: &str, role: Role) -> Result<(), BoardError> {
        let user_id = user_id.to_string();
        self.db
            .call(move |db| db.set_role(&user_id, role, Utc::now()))
            .await
            .map_err(BoardError::from_storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::db::BoardDb;

    fn backend() -> LocalBackend {
        LocalBackend::new(DbHandle::new(BoardDb::new_in_memory().unwrap()), 16)
    }

    fn form(po: &str) -> NewRequest {
        NewRequest {
            line_id: "12".into(),
            po_numbers: po.into(),
            required_time: "14:00".into(),
            requested_by: "Line Operator".into(),
            department: "Sewing".into(),
        }
    }

    #[tokio::test]
    async fn test_submit_creates_department_and_pending_request() {
        let backend = backend();
        let mut rx = backend.subscribe();

        let req = submit_request(&backend, form("A1, A2, A3")).await.unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.po_tokens().len(), 3);

        let departments = backend.list_departments().await.unwrap();
        assert_eq!(departments.len(), 1);
        assert_eq!(departments[0].name, "Sewing");

        assert_eq!(rx.recv().await.unwrap(), ChangeEvent::Insert { record: req });
    }

    #[tokio::test]
    async fn test_submit_rejects_before_touching_table() {
        let backend = backend();
        let err = submit_request(&backend, form(" ,, ")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(backend.fetch_all().await.unwrap().is_empty());
        assert!(backend.list_departments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_publishes_full_record() {
        let backend = backend();
        let req = submit_request(&backend, form("A1")).await.unwrap();
        let mut rx = backend.subscribe();

        let updated = backend
            .update(req.id, RequestPatch::status(RequestStatus::InProgress))
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            ChangeEvent::Update { record } => {
                assert_eq!(record, updated);
                assert_eq!(record.status, RequestStatus::InProgress);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_update_publishes_nothing() {
        let backend = backend();
        let mut rx = backend.subscribe();
        let err = backend
            .update(uuid::Uuid::new_v4(), RequestPatch::status(RequestStatus::InProgress))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::RequestNotFound { .. }));
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_delete_all_publishes_one_delete_per_row() {
        let backend = backend();
        let a = submit_request(&backend, form("A1")).await.unwrap();
        let b = submit_request(&backend, form("B1")).await.unwrap();
        let mut rx = backend.subscribe();

        backend.delete_all().await.unwrap();

        let mut deleted = vec![rx.recv().await.unwrap().id(), rx.recv().await.unwrap().id()];
        deleted.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(deleted, expected);
        assert!(backend.fetch_all().await.unwrap().is_empty());
        assert!(backend.list_departments().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_updates_publish_in_commit_order() {
        let backend = LocalBackend::new(DbHandle::new(BoardDb::new_in_memory().unwrap()), 1024);
        for round in 0..25 {
            let req = submit_request(&backend, form("A1")).await.unwrap();
            let mut rx = backend.subscribe();

            let writers: Vec<_> = (0..16)
                .map(|i| {
                    let backend = backend.clone();
                    tokio::spawn(async move {
                        backend
                            .update(req.id, RequestPatch::po_numbers(format!("P{}", i)))
                            .await
                            .unwrap();
                    })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap();
            }

            let mut last = None;
            while let Ok(event) = rx.try_recv() {
                if let ChangeEvent::Update { record } = event {
                    last = Some(record);
                }
            }
            let committed = backend.get(req.id).await.unwrap().unwrap();
            assert_eq!(last, Some(committed), "round {}", round);
        }
    }

    #[tokio::test]
    async fn test_insert_then_delete_leaves_delete_last() {
        let backend = backend();
        let mut rx = backend.subscribe();
        let req = submit_request(&backend, form("A1")).await.unwrap();
        backend.delete(req.id).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().kind(), "insert");
        assert_eq!(rx.recv().await.unwrap(), ChangeEvent::Delete { id: req.id });
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let backend = backend();
        assert!(matches!(
            backend.delete(uuid::Uuid::new_v4()).await.unwrap_err(),
            BoardError::RequestNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_role_store() {
        let backend = backend();
        assert_eq!(backend.role_for("u-9").await.unwrap(), None);
        backend.assign_role("u-9", Role::Workstation).await.unwrap();
        assert_eq!(
            backend.role_for("u-9").await.unwrap(),
            Some(Role::Workstation)
        );
    }
}
