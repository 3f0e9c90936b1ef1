//! In-memory mirror of the `requests` table.
//!
//! The store subscribes to the change feed before its initial fetch, so no
//! write can fall between the snapshot and the first applied event. Events
//! already contained in the snapshot are re-applied idempotently.
//!
//! Mutations never touch the cache. Every visible change arrives through the
//! feed echo; a failed remote write is logged and returned, and there is
//! nothing to roll back.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::backend::{ChangeFeed, RequestTable, submit_request};
use super::clock::Clock;
use super::feed::ChangeEvent;
use super::models::*;
use super::po::Fulfillment;
use crate::errors::BoardError;

/// Keyed cache plus display order (newest first).
#[derive(Debug, Default)]
pub struct RequestCache {
    records: HashMap<RequestId, Request>,
    order: VecDeque<RequestId>,
    loaded: bool,
    applied: u64,
}

impl RequestCache {
    /// Install a full snapshot, already ordered newest first.
    pub fn replace_all(&mut self, snapshot: Vec<Request>) {
        self.records.clear();
        self.order.clear();
        for record in snapshot {
            if self.records.contains_key(&record.id) {
                continue;
            }
            self.order.push_back(record.id);
            self.records.insert(record.id, record);
        }
        self.loaded = true;
    }

    /// Apply one feed event. Returns whether the cache changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        self.applied += 1;
        match event {
            ChangeEvent::Insert { record } => {
                if self.records.insert(record.id, record.clone()).is_none() {
                    self.order.push_front(record.id);
                }
                true
            }
            ChangeEvent::Update { record } => match self.records.get_mut(&record.id) {
                Some(slot) => {
                    *slot = record.clone();
                    true
                }
                None => false,
            },
            ChangeEvent::Delete { id } => {
                if self.records.remove(id).is_none() {
                    return false;
                }
                self.order.retain(|k| k != id);
                true
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Number of feed events applied since creation.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RequestId) -> Option<&Request> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }
}

/// What a completion produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Full(Request),
    /// A new completed record plus the shrunk original.
    Split {
        completed: Request,
        remaining: Request,
    },
}

#[derive(Clone)]
pub struct RequestStore {
    table: Arc<dyn RequestTable>,
    clock: Arc<dyn Clock>,
    cache: Arc<Mutex<RequestCache>>,
    revision: Arc<watch::Sender<u64>>,
}

impl RequestStore {
    /// A store with an empty, still-loading cache.
    pub fn new(table: Arc<dyn RequestTable>, clock: Arc<dyn Clock>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            table,
            clock,
            cache: Arc::new(Mutex::new(RequestCache::default())),
            revision: Arc::new(revision),
        }
    }

    /// Subscribe, fetch the snapshot, then start applying feed events.
    pub async fn activate(
        table: Arc<dyn RequestTable>,
        feed: &dyn ChangeFeed,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, JoinHandle<()>), BoardError> {
        let rx = feed.subscribe();
        let store = Self::new(table, clock);
        store.load().await?;
        let applier = store.attach(rx);
        Ok((store, applier))
    }

    /// Replace the cache with a fresh snapshot from the table.
    pub async fn load(&self) -> Result<(), BoardError> {
        let snapshot = self.table.fetch_all().await.inspect_err(|e| {
            tracing::error!(error = %e, "failed to fetch requests");
        })?;
        let count = snapshot.len();
        self.lock()?.replace_all(snapshot);
        self.bump();
        tracing::info!(count, "request snapshot loaded");
        Ok(())
    }

    /// Spawn the task that applies feed events in arrival order.
    /// The task ends when the feed closes.
    pub fn attach(&self, mut rx: broadcast::Receiver<ChangeEvent>) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => store.apply(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "change feed lagged, re-fetching snapshot");
                        if let Err(e) = store.load().await {
                            tracing::error!(error = %e, "resync after lag failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("change feed closed");
                        break;
                    }
                }
            }
        })
    }

    /// Apply one event to the cache and bump the revision if it changed.
    pub fn apply(&self, event: &ChangeEvent) {
        let changed = match self.cache.lock() {
            Ok(mut cache) => cache.apply(event),
            Err(_) => {
                tracing::error!("request cache lock poisoned, dropping event");
                return;
            }
        };
        tracing::debug!(kind = event.kind(), id = %event.id(), changed, "applied change");
        if changed {
            self.bump();
        }
    }

    /// Revision counter, bumped on every snapshot and every effective change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.cache.lock().map(|c| !c.is_loaded()).unwrap_or(true)
    }

    // ── Derived views ────────────────────────────────────────────────

    pub fn all(&self) -> Result<Vec<Request>, BoardError> {
        self.read(|c| c.iter().cloned().collect())
    }

    pub fn active(&self) -> Result<Vec<Request>, BoardError> {
        self.read(|c| c.iter().filter(|r| !r.is_completed()).cloned().collect())
    }

    pub fn completed(&self) -> Result<Vec<Request>, BoardError> {
        self.read(|c| c.iter().filter(|r| r.is_completed()).cloned().collect())
    }

    pub fn active_for_line(&self, line_id: &str) -> Result<Vec<Request>, BoardError> {
        self.read(|c| {
            c.iter()
                .filter(|r| !r.is_completed() && r.line_id == line_id)
                .cloned()
                .collect()
        })
    }

    pub fn pending_count(&self) -> Result<usize, BoardError> {
        self.read(|c| {
            c.iter()
                .filter(|r| r.status == RequestStatus::Pending)
                .count()
        })
    }

    pub fn get(&self, id: RequestId) -> Result<Option<Request>, BoardError> {
        self.read(|c| c.get(&id).cloned())
    }

    // ── Mutations ────────────────────────────────────────────────────

    pub async fn submit(&self, form: NewRequest) -> Result<Request, BoardError> {
        let res = submit_request(self.table.as_ref(), form).await;
        logged("submit", None, res)
    }

    /// Set a record's status. `completed` is stamped like `complete_full`.
    pub async fn set_status(
        &self,
        id: RequestId,
        status: RequestStatus,
    ) -> Result<Request, BoardError> {
        if status == RequestStatus::Completed {
            return self.complete_full(id).await;
        }
        if let Some(cached) = self.get(id)? {
            if cached.status.is_terminal() {
                return Err(BoardError::AlreadyCompleted { id });
            }
        }
        let res = self.table.update(id, RequestPatch::status(status)).await;
        logged("set_status", Some(id), res)
    }

    pub async fn complete_full(&self, id: RequestId) -> Result<Request, BoardError> {
        let record = self.open_record(id)?;
        let patch = RequestPatch::completion(record.created_at, self.clock.now());
        let res = self.table.update(id, patch).await;
        logged("complete_full", Some(id), res)
    }

    /// Complete some of a record's PO tokens.
    ///
    /// A proper subset is split off into a new completed record first; the
    /// original is shrunk only after that insert succeeds. Between the two
    /// writes the selected tokens appear on both records.
    pub async fn complete_partial<S: AsRef<str>>(
        &self,
        id: RequestId,
        selected: &[S],
    ) -> Result<Completion, BoardError> {
        let record = self.open_record(id)?;
        let (selected, remaining) = match record.po_tokens().fulfill(selected)? {
            Fulfillment::Full => return self.complete_full(id).await.map(Completion::Full),
            Fulfillment::Partial {
                selected,
                remaining,
            } => (selected, remaining),
        };

        let now = self.clock.now();
        let draft = RequestDraft {
            line_id: record.line_id.clone(),
            po_numbers: selected.join(),
            required_time: record.required_time.clone(),
            status: RequestStatus::Completed,
            requested_by: record.requested_by.clone(),
            department: record.department.clone(),
            created_at: Some(record.created_at),
            completed_at: Some(now),
            duration_seconds: Some(duration_between(record.created_at, now)),
        };
        let completed = logged("complete_partial", Some(id), self.table.insert(draft).await)?;

        let res = self
            .table
            .update(id, RequestPatch::po_numbers(remaining.join()))
            .await;
        let remaining = logged("complete_partial", Some(id), res)?;
        Ok(Completion::Split {
            completed,
            remaining,
        })
    }

    /// Fully complete every id concurrently. One failure does not stop the
    /// others; results come back in input order.
    pub async fn batch_complete(
        &self,
        ids: &[RequestId],
    ) -> Vec<(RequestId, Result<Request, BoardError>)> {
        let results = join_all(ids.iter().map(|id| self.complete_full(*id))).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(failed, total = ids.len(), "batch completion had failures");
        }
        ids.iter().copied().zip(results).collect()
    }

    pub async fn delete(&self, id: RequestId) -> Result<(), BoardError> {
        let res = self.table.delete(id).await;
        logged("delete", Some(id), res)
    }

    /// Delete every request and every department.
    pub async fn reset_all(&self) -> Result<(), BoardError> {
        let res = self.table.delete_all().await;
        logged("reset_all", None, res)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RequestCache>, BoardError> {
        self.cache.lock().map_err(|_| BoardError::LockPoisoned)
    }

    fn read<T>(&self, f: impl FnOnce(&RequestCache) -> T) -> Result<T, BoardError> {
        let cache = self.lock()?;
        if !cache.is_loaded() {
            return Err(BoardError::Loading);
        }
        Ok(f(&cache))
    }

    /// A cached record that is still open for mutation.
    fn open_record(&self, id: RequestId) -> Result<Request, BoardError> {
        let record = self.get(id)?.ok_or(BoardError::RequestNotFound { id })?;
        if record.status.is_terminal() {
            return Err(BoardError::AlreadyCompleted { id });
        }
        Ok(record)
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

fn logged<T>(
    op: &'static str,
    id: Option<RequestId>,
    res: Result<T, BoardError>,
) -> Result<T, BoardError> {
    if let Err(e) = &res {
        match id {
            Some(id) => tracing::error!(op, %id, error = %e, "request mutation failed"),
            None => tracing::error!(op, error = %e, "request mutation failed"),
        }
    }
    res
}
