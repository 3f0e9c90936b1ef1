//! Request board client commands: `submit`, `list`, `status`, `complete`,
//! `batch-complete`, `delete`, `reset`, `report`.
//!
//! Every command talks to a running board server through `HttpBackend` and
//! goes through a `RequestStore`, so client-side validation and completion
//! stamping match what any other client does.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;

use rmw_board::board::clock::{SyncedClock, SystemClock, format_duration, format_hms, synchronize};
use rmw_board::board::http::HttpBackend;
use rmw_board::board::models::{
    DepartmentDowntime, NewRequest, Request, RequestId, RequestStatus, downtime_chart,
};
use rmw_board::board::backend::RequestTable;
use rmw_board::board::roles::Role;
use rmw_board::board::store::{Completion, RequestStore};
use rmw_board::config::BoardConfig;
use rmw_board::errors::BoardError;

use super::client;
use super::roles::authorize;

const CHART_WIDTH: i64 = 40;

/// Build a submission form, filling omitted fields from `[defaults]`.
pub fn submission(
    config: &BoardConfig,
    line: &str,
    po: &str,
    required_time: &str,
    requested_by: Option<&str>,
    department: Option<&str>,
) -> NewRequest {
    NewRequest {
        line_id: line.to_string(),
        po_numbers: po.to_string(),
        required_time: required_time.to_string(),
        requested_by: requested_by
            .unwrap_or(&config.defaults.requested_by)
            .to_string(),
        department: department.unwrap_or(&config.defaults.department).to_string(),
    }
}

/// A store over the configured server, loaded with the current snapshot.
async fn loaded_store(backend: Arc<HttpBackend>) -> Result<RequestStore> {
    let store = RequestStore::new(backend, Arc::new(SystemClock));
    store.load().await.context("Failed to load requests")?;
    Ok(store)
}

pub async fn cmd_submit(config: &BoardConfig, form: NewRequest) -> Result<()> {
    // Reject malformed input before opening a connection.
    form.clone().into_draft()?;

    let backend = client(config)?;
    let store = RequestStore::new(backend, Arc::new(SystemClock));
    let request = store.submit(form).await.context("Failed to submit request")?;

    println!(
        "Submitted request {} (line {}, PO {})",
        request.id, request.line_id, request.po_numbers
    );
    Ok(())
}

pub async fn cmd_list(
    config: &BoardConfig,
    completed: bool,
    line: Option<&str>,
    watch: bool,
) -> Result<()> {
    let backend = client(config)?;
    let clock = synchronize(backend.as_ref(), Arc::new(SystemClock))
        .await
        .context("Failed to synchronize clock with server")?;
    if !watch {
        let store = RequestStore::new(backend, Arc::new(clock.clone()));
        store.load().await.context("Failed to load requests")?;
        print!("{}", render_view(&store, completed, line, &clock)?);
        return Ok(());
    }

    // Follow the server's change feed; poll only if it cannot be reached.
    let feed = match backend.connect_feed(config.server.feed_capacity).await {
        Ok(feed) => Some(feed),
        Err(e) => {
            tracing::warn!(error = %e, "change feed unavailable, polling instead");
            None
        }
    };
    let (store, _applier) = match &feed {
        Some(feed) => {
            let (store, applier) =
                RequestStore::activate(backend, feed, Arc::new(clock.clone()))
                    .await
                    .context("Failed to load requests")?;
            (store, Some(applier))
        }
        None => (RequestStore::new(backend, Arc::new(clock.clone())), None),
    };
    let mut changes = store.changes();

    let term = console::Term::stdout();
    // Timers advance every second even when nothing is written.
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !feed.as_ref().is_some_and(|f| f.is_connected()) {
                    if let Err(e) = store.load().await {
                        tracing::warn!(error = %e, "refresh failed, showing last snapshot");
                    }
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
        let screen = match render_view(&store, completed, line, &clock) {
            Ok(screen) => screen,
            Err(BoardError::Loading) => "Loading requests...\n".to_string(),
            Err(e) => return Err(e.into()),
        };
        term.clear_screen()?;
        print!("{}", screen);
    }
    Ok(())
}

fn render_view(
    store: &RequestStore,
    completed: bool,
    line: Option<&str>,
    clock: &SyncedClock,
) -> Result<String, BoardError> {
    if completed {
        let rows: Vec<Request> = store
            .completed()?
            .into_iter()
            .filter(|r| line.is_none_or(|l| r.line_id == l))
            .collect();
        return Ok(render_completed(&rows));
    }
    let rows = match line {
        Some(line) => store.active_for_line(line)?,
        None => store.active()?,
    };
    Ok(render_active(&rows, |r| clock.elapsed_since(r.created_at)))
}

fn status_cell(status: RequestStatus) -> String {
    let cell = format!("{:<12}", status.as_str());
    match status {
        RequestStatus::Pending => style(cell).yellow().to_string(),
        RequestStatus::InProgress => style(cell).cyan().to_string(),
        RequestStatus::Completed => style(cell).green().to_string(),
    }
}

pub fn render_active(rows: &[Request], elapsed: impl Fn(&Request) -> i64) -> String {
    if rows.is_empty() {
        return "No active requests\n".to_string();
    }
    let mut out = format!(
        "{:<36}  {:<6}  {:<24}  {:<8}  {:<12}  {}\n",
        "ID", "LINE", "PO NUMBERS", "REQUIRED", "STATUS", "ELAPSED"
    );
    for r in rows {
        out.push_str(&format!(
            "{:<36}  {:<6}  {:<24}  {:<8}  {}  {}\n",
            r.id,
            r.line_id,
            r.po_numbers,
            r.required_time,
            status_cell(r.status),
            format_hms(elapsed(r)),
        ));
    }
    let pending = rows
        .iter()
        .filter(|r| r.status == RequestStatus::Pending)
        .count();
    out.push_str(&format!("\n{} active, {} pending\n", rows.len(), pending));
    out
}

pub fn render_completed(rows: &[Request]) -> String {
    if rows.is_empty() {
        return "No completed requests\n".to_string();
    }
    let mut out = format!(
        "{:<36}  {:<6}  {:<24}  {:<12}  {:<16}  {}\n",
        "ID", "LINE", "PO NUMBERS", "DEPARTMENT", "COMPLETED", "DURATION"
    );
    for r in rows {
        let completed_at = r
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<36}  {:<6}  {:<24}  {:<12}  {:<16}  {}\n",
            r.id,
            r.line_id,
            r.po_numbers,
            r.department,
            completed_at,
            format_duration(r.duration_seconds),
        ));
    }
    out.push_str(&format!("\n{} completed\n", rows.len()));
    out
}

pub async fn cmd_status(
    config: &BoardConfig,
    user: Option<&str>,
    id: RequestId,
    status: RequestStatus,
) -> Result<()> {
    let backend = client(config)?;
    authorize(backend.as_ref(), user, Role::can_fulfill, "change request status").await?;
    let store = loaded_store(backend).await?;
    let request = store.set_status(id, status).await?;
    println!("Request {} is now {}", request.id, request.status);
    Ok(())
}

pub async fn cmd_complete(
    config: &BoardConfig,
    user: Option<&str>,
    id: RequestId,
    po: &[String],
) -> Result<()> {
    let backend = client(config)?;
    authorize(backend.as_ref(), user, Role::can_fulfill, "complete requests").await?;
    let store = loaded_store(backend).await?;

    let outcome = if po.is_empty() {
        Completion::Full(store.complete_full(id).await?)
    } else {
        store.complete_partial(id, po).await?
    };

    match outcome {
        Completion::Full(done) => println!(
            "Completed request {} ({}) in {}",
            done.id,
            done.po_numbers,
            format_duration(done.duration_seconds)
        ),
        Completion::Split {
            completed,
            remaining,
        } => {
            println!(
                "Completed PO {} as request {} in {}",
                completed.po_numbers,
                completed.id,
                format_duration(completed.duration_seconds)
            );
            println!(
                "Request {} still open for PO {}",
                remaining.id, remaining.po_numbers
            );
        }
    }
    Ok(())
}

pub async fn cmd_batch_complete(
    config: &BoardConfig,
    user: Option<&str>,
    ids: &[RequestId],
) -> Result<()> {
    let backend = client(config)?;
    authorize(backend.as_ref(), user, Role::can_fulfill, "complete requests").await?;
    let store = loaded_store(backend).await?;

    let results = store.batch_complete(ids).await;
    let mut failed = 0;
    for (id, result) in &results {
        match result {
            Ok(done) => println!(
                "  {} {} ({})",
                style("✓").green(),
                id,
                format_duration(done.duration_seconds)
            ),
            Err(e) => {
                failed += 1;
                println!("  {} {}: {}", style("✗").red(), id, e);
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} requests failed to complete", failed, results.len());
    }
    println!("Completed {} requests", results.len());
    Ok(())
}

pub async fn cmd_delete(config: &BoardConfig, user: Option<&str>, id: RequestId) -> Result<()> {
    let backend = client(config)?;
    authorize(backend.as_ref(), user, Role::can_administer, "delete requests").await?;
    let store = RequestStore::new(backend, Arc::new(SystemClock));
    store.delete(id).await?;
    println!("Deleted request {}", id);
    Ok(())
}

pub async fn cmd_reset(config: &BoardConfig, user: Option<&str>, yes: bool) -> Result<()> {
    use dialoguer::Confirm;

    let backend = client(config)?;
    authorize(backend.as_ref(), user, Role::can_administer, "reset the board").await?;

    if !yes {
        let confirm = Confirm::new()
            .with_prompt("This will delete every request and department. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let store = RequestStore::new(backend, Arc::new(SystemClock));
    store.reset_all().await?;
    println!("Reset complete");
    Ok(())
}

pub async fn cmd_report(config: &BoardConfig) -> Result<()> {
    let backend = client(config)?;
    let rows = backend
        .department_downtime()
        .await
        .context("Failed to load department downtime")?;
    print!("{}", render_report(&rows));
    Ok(())
}

pub fn render_report(rows: &[DepartmentDowntime]) -> String {
    if rows.is_empty() {
        return "No departments yet\n".to_string();
    }
    let mut out = format!("{:<20}  {:>9}  {:>8}\n", "DEPARTMENT", "COMPLETED", "MINUTES");
    for d in rows {
        out.push_str(&format!(
            "{:<20}  {:>9}  {:>8}\n",
            d.name,
            d.completed_count,
            d.minutes()
        ));
    }

    let chart = downtime_chart(rows);
    let max = chart.iter().map(|d| d.minutes()).max().unwrap_or(0);
    if max > 0 {
        out.push('\n');
        for d in chart {
            let width = (d.minutes() * CHART_WIDTH / max).max(1) as usize;
            out.push_str(&format!(
                "{:<20}  {} {}m\n",
                d.name,
                "█".repeat(width),
                d.minutes()
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    fn request(line: &str, po: &str, status: RequestStatus) -> Request {
        let created_at = Utc::now();
        let completed = status == RequestStatus::Completed;
        Request {
            id: Uuid::new_v4(),
            line_id: line.into(),
            po_numbers: po.into(),
            required_time: "14:00".into(),
            status,
            requested_by: "Line Operator".into(),
            department: "RMW".into(),
            created_at,
            completed_at: completed.then(|| created_at + ChronoDuration::seconds(125)),
            duration_seconds: completed.then_some(125),
        }
    }

    #[test]
    fn test_submission_uses_defaults() {
        let config = BoardConfig::default();
        let form = submission(&config, "12", "A1 A2", "14:00", None, Some("Cutting"));
        assert_eq!(form.requested_by, "Line Operator");
        assert_eq!(form.department, "Cutting");
    }

    #[test]
    fn test_render_active_shows_elapsed_and_counts() {
        let rows = vec![
            request("12", "A1, A2", RequestStatus::Pending),
            request("7", "C1", RequestStatus::InProgress),
        ];
        let out = render_active(&rows, |_| 3_725);
        assert!(out.contains("01:02:05"));
        assert!(out.contains("A1, A2"));
        assert!(out.contains("2 active, 1 pending"));
    }

    #[test]
    fn test_render_empty_views() {
        assert_eq!(render_active(&[], |_| 0), "No active requests\n");
        assert_eq!(render_completed(&[]), "No completed requests\n");
        assert_eq!(render_report(&[]), "No departments yet\n");
    }

    #[test]
    fn test_render_completed_shows_duration() {
        let rows = vec![request("12", "A1", RequestStatus::Completed)];
        let out = render_completed(&rows);
        assert!(out.contains("2m 5s"));
        assert!(out.contains("1 completed"));
    }

    #[test]
    fn test_report_charts_only_departments_with_minutes() {
        let rows = vec![
            DepartmentDowntime {
                name: "Cutting".into(),
                cumulative_downtime_seconds: 30,
                completed_count: 1,
            },
            DepartmentDowntime {
                name: "Sewing".into(),
                cumulative_downtime_seconds: 600,
                completed_count: 3,
            },
        ];
        let out = render_report(&rows);
        assert!(out.contains("Sewing"));
        assert!(out.contains("10m"));
        let chart_lines: Vec<&str> = out.lines().filter(|l| l.contains('█')).collect();
        assert_eq!(chart_lines.len(), 1);
        assert!(chart_lines[0].starts_with("Sewing"));
    }
}
