//! Client/server clock offset estimation.
//!
//! `created_at` is stamped by the server, so an elapsed-time widget driven
//! by a skewed local clock would drift from other clients. One round trip to
//! the server time probe gives a point estimate of the offset:
//!
//! ```text
//! latency = (t1 - t0) / 2
//! offset  = (server + latency) - t1
//! elapsed = max(0, (local_now + offset) - created_at)
//! ```
//!
//! The estimate is taken once per activation and never re-synced.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::backend::TimeSource;
use crate::errors::BoardError;

/// Source of "now" for stamping and rendering.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A local clock corrected by an estimated server offset.
#[derive(Clone)]
pub struct SyncedClock {
    local: Arc<dyn Clock>,
    offset: Duration,
}

impl SyncedClock {
    pub fn new(local: Arc<dyn Clock>, offset: Duration) -> Self {
        Self { local, offset }
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// Seconds elapsed since `created_at` on the corrected clock.
    pub fn elapsed_since(&self, created_at: DateTime<Utc>) -> i64 {
        elapsed_seconds(created_at, self.local.now(), self.offset)
    }
}

impl Clock for SyncedClock {
    fn now(&self) -> DateTime<Utc> {
        self.local.now() + self.offset
    }
}

impl std::fmt::Debug for SyncedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedClock")
            .field("offset_ms", &self.offset.num_milliseconds())
            .finish()
    }
}

/// Single-sample NTP-style offset estimate.
pub fn estimate_offset(t0: DateTime<Utc>, server: DateTime<Utc>, t1: DateTime<Utc>) -> Duration {
    let latency = (t1 - t0) / 2;
    (server + latency) - t1
}

/// Whole seconds between `created_at` and the corrected local time.
/// A `created_at` in the corrected future yields 0.
pub fn elapsed_seconds(created_at: DateTime<Utc>, local_now: DateTime<Utc>, offset: Duration) -> i64 {
    ((local_now + offset) - created_at).num_seconds().max(0)
}

/// Probe the server once and build a corrected clock.
pub async fn synchronize(
    source: &dyn TimeSource,
    local: Arc<dyn Clock>,
) -> Result<SyncedClock, BoardError> {
    let t0 = local.now();
    let server = source.server_now().await?;
    let t1 = local.now();
    let offset = estimate_offset(t0, server, t1);
    tracing::info!(
        offset_ms = offset.num_milliseconds(),
        round_trip_ms = (t1 - t0).num_milliseconds(),
        "clock synchronized"
    );
    Ok(SyncedClock::new(local, offset))
}

/// `HH:MM:SS` for live timers. Negative input renders as zero.
pub fn format_hms(total_seconds: i64) -> String {
    let secs = total_seconds.max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// `Xm Ys` for recorded durations, `--:--` when nothing was recorded.
pub fn format_duration(seconds: Option<i64>) -> String {
    match seconds {
        Some(s) if s > 0 => format!("{}m {}s", s / 60, s % 60),
        _ => "--:--".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// A clock that only moves when told to.
    pub struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub fn at(now: DateTime<Utc>) -> Self {
            Self(Mutex::new(now))
        }

        pub fn set(&self, now: DateTime<Utc>) {
            *self.0.lock().unwrap() = now;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
