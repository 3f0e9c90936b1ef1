use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::models::*;
use super::po::PoTokens;
use super::roles::Role;
use crate::errors::BoardError;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct BoardDb {
    conn: Connection,
}

const REQUEST_COLUMNS: &str = "id, line_id, po_numbers, required_time, status, requested_by, department, created_at, completed_at, duration_seconds";

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS requests (
                    id TEXT PRIMARY KEY,
                    line_id TEXT NOT NULL,
                    po_numbers TEXT NOT NULL,
                    required_time TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'pending',
                    requested_by TEXT NOT NULL DEFAULT '',
                    department TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    completed_at TEXT,
                    duration_seconds INTEGER
                );

                CREATE TABLE IF NOT EXISTS departments (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_roles (
                    user_id TEXT PRIMARY KEY,
                    role TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_requests_created ON requests(created_at);
                CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status);
                CREATE INDEX IF NOT EXISTS idx_requests_department ON requests(department);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Requests ──────────────────────────────────────────────────────

    /// All requests, newest first.
    pub fn list_requests(&self) -> Result<Vec<Request>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM requests ORDER BY created_at DESC, rowid DESC",
                REQUEST_COLUMNS
            ))
            .context("Failed to prepare list_requests")?;
        let rows = stmt
            .query_map([], RequestRow::from_row)
            .context("Failed to query requests")?;
        let mut requests = Vec::new();
        for row in rows {
            let r = row.context("Failed to read request row")?;
            requests.push(r.into_request()?);
        }
        Ok(requests)
    }

    pub fn get_request(&self, id: RequestId) -> Result<Option<Request>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM requests WHERE id = ?1", REQUEST_COLUMNS),
                params![id.to_string()],
                RequestRow::from_row,
            )
            .optional()
            .context("Failed to query request")?;
        row.map(RequestRow::into_request).transpose()
    }

    /// Insert a draft, stamping `created_at` with `now` unless the draft
    /// carries its own. Completed drafts get completion columns filled in.
    pub fn insert_request(&self, draft: &RequestDraft, now: DateTime<Utc>) -> Result<Request> {
        if draft.line_id.trim().is_empty() {
            return Err(BoardError::MissingField("line_id").into());
        }
        if PoTokens::parse(&draft.po_numbers).is_empty() {
            return Err(BoardError::EmptyPoList.into());
        }

        let id = Uuid::new_v4();
        let created_at = draft.created_at.unwrap_or(now);
        let (completed_at, duration_seconds) = if draft.status.is_terminal() {
            let completed_at = draft.completed_at.unwrap_or(now);
            let duration = draft
                .duration_seconds
                .map(|d| d.max(0))
                .unwrap_or_else(|| duration_between(created_at, completed_at));
            (Some(completed_at), Some(duration))
        } else {
            (None, None)
        };

        self.conn
            .execute(
                &format!(
                    "INSERT INTO requests ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    REQUEST_COLUMNS
                ),
                params![
                    id.to_string(),
                    draft.line_id,
                    draft.po_numbers,
                    draft.required_time,
                    draft.status.as_str(),
                    draft.requested_by,
                    draft.department,
                    ts(&created_at),
                    completed_at.as_ref().map(ts),
                    duration_seconds,
                ],
            )
            .context("Failed to insert request")?;
        self.get_request(id)?
            .context("Request not found after insert")
    }

    /// Apply a patch atomically. Completed records reject every patch.
    pub fn update_request(&self, id: RequestId, patch: &RequestPatch) -> Result<Request> {
        let current = self
            .get_request(id)?
            .ok_or(BoardError::RequestNotFound { id })?;
        if current.status.is_terminal() {
            return Err(BoardError::AlreadyCompleted { id }.into());
        }
        if let Some(po) = &patch.po_numbers {
            if PoTokens::parse(po).is_empty() {
                return Err(BoardError::EmptyPoList.into());
            }
        }

        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let key = id.to_string();

        if let Some(status) = patch.status {
            tx.execute(
                "UPDATE requests SET status = ?1 WHERE id = ?2",
                params![status.as_str(), key],
            )
            .context("Failed to update request status")?;
        }
        if let Some(po) = &patch.po_numbers {
            tx.execute(
                "UPDATE requests SET po_numbers = ?1 WHERE id = ?2",
                params![po, key],
            )
            .context("Failed to update request po_numbers")?;
        }
        if let Some(completed_at) = &patch.completed_at {
            tx.execute(
                "UPDATE requests SET completed_at = ?1 WHERE id = ?2",
                params![ts(completed_at), key],
            )
            .context("Failed to update request completed_at")?;
        }
        if let Some(duration) = patch.duration_seconds {
            tx.execute(
                "UPDATE requests SET duration_seconds = ?1 WHERE id = ?2",
                params![duration.max(0), key],
            )
            .context("Failed to update request duration")?;
        }

        tx.commit().context("Failed to commit request update")?;
        self.get_request(id)?
            .context("Request not found after update")
    }

    pub fn delete_request(&self, id: RequestId) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM requests WHERE id = ?1", params![id.to_string()])
            .context("Failed to delete request")?;
        Ok(count > 0)
    }

    /// Delete every request and department. Returns the removed request ids.
    pub fn reset(&self) -> Result<Vec<RequestId>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let ids = {
            let mut stmt = tx
                .prepare("SELECT id FROM requests")
                .context("Failed to prepare reset")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .context("Failed to query request ids")?;
            let mut ids = Vec::new();
            for row in rows {
                let raw = row.context("Failed to read request id")?;
                ids.push(Uuid::parse_str(&raw).context("Invalid request id")?);
            }
            ids
        };
        tx.execute("DELETE FROM requests", [])
            .context("Failed to delete requests")?;
        tx.execute("DELETE FROM departments", [])
            .context("Failed to delete departments")?;
        tx.commit().context("Failed to commit reset")?;
        Ok(ids)
    }

    // ── Departments ───────────────────────────────────────────────────

    pub fn list_departments(&self) -> Result<Vec<Department>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM departments ORDER BY name")
            .context("Failed to prepare list_departments")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("Failed to query departments")?;
        let mut departments = Vec::new();
        for row in rows {
            let (id, name, created_at) = row.context("Failed to read department row")?;
            departments.push(Department {
                id: Uuid::parse_str(&id).context("Invalid department id")?,
                name,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(departments)
    }

    /// Look a department up by name, creating it when missing.
    /// The flag is `true` when a row was created.
    pub fn ensure_department(&self, name: &str, now: DateTime<Utc>) -> Result<(Department, bool)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BoardError::MissingField("department").into());
        }
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO departments (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![Uuid::new_v4().to_string(), name, ts(&now)],
            )
            .context("Failed to insert department")?;
        let (id, created_at): (String, String) = self
            .conn
            .query_row(
                "SELECT id, created_at FROM departments WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("Department not found after insert")?;
        Ok((
            Department {
                id: Uuid::parse_str(&id).context("Invalid department id")?,
                name: name.to_string(),
                created_at: parse_ts(&created_at)?,
            },
            inserted > 0,
        ))
    }

    /// Cumulative downtime of completed requests, per known department.
    pub fn department_downtime(&self) -> Result<Vec<DepartmentDowntime>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT d.name, COALESCE(SUM(r.duration_seconds), 0), COUNT(r.id)
                 FROM departments d
                 LEFT JOIN requests r ON r.department = d.name AND r.status = 'completed'
                 GROUP BY d.id
                 ORDER BY d.name",
            )
            .context("Failed to prepare department_downtime")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DepartmentDowntime {
                    name: row.get(0)?,
                    cumulative_downtime_seconds: row.get(1)?,
                    completed_count: row.get(2)?,
                })
            })
            .context("Failed to query department downtime")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read downtime row")?);
        }
        Ok(out)
    }

    // ── Roles ─────────────────────────────────────────────────────────

    pub fn get_role(&self, user_id: &str) -> Result<Option<Role>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT role FROM user_roles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query user role")?;
        raw.map(|r| Role::from_str(&r).map_err(anyhow::Error::new))
            .transpose()
    }

    pub fn set_role(&self, user_id: &str, role: Role, now: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO user_roles (user_id, role, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at",
                params![user_id, role.as_str(), ts(&now)],
            )
            .context("Failed to upsert user role")?;
        Ok(())
    }
}

// ── Row conversion ────────────────────────────────────────────────────

struct RequestRow {
    id: String,
    line_id: String,
    po_numbers: String,
    required_time: String,
    status: String,
    requested_by: String,
    department: String,
    created_at: String,
    completed_at: Option<String>,
    duration_seconds: Option<i64>,
}

impl RequestRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            line_id: row.get(1)?,
            po_numbers: row.get(2)?,
            required_time: row.get(3)?,
            status: row.get(4)?,
            requested_by: row.get(5)?,
            department: row.get(6)?,
            created_at: row.get(7)?,
            completed_at: row.get(8)?,
            duration_seconds: row.get(9)?,
        })
    }

    fn into_request(self) -> Result<Request> {
        let status = RequestStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse request status")?;
        Ok(Request {
            id: Uuid::parse_str(&self.id).context("Invalid request id")?,
            line_id: self.line_id,
            po_numbers: self.po_numbers,
            required_time: self.required_time,
            status,
            requested_by: self.requested_by,
            department: self.department,
            created_at: parse_ts(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
            duration_seconds: self.duration_seconds,
        })
    }
}
