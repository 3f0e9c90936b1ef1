use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::po::PoTokens;
use crate::errors::BoardError;

pub type RequestId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Completed records are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// A downtime/fulfillment request raised by a production line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub line_id: String,
    pub po_numbers: String,
    pub required_time: String,
    pub status: RequestStatus,
    pub requested_by: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl Request {
    pub fn po_tokens(&self) -> PoTokens {
        PoTokens::parse(&self.po_numbers)
    }

    pub fn is_completed(&self) -> bool {
        self.status == RequestStatus::Completed
    }
}

/// Whole seconds between creation and completion, never negative.
pub fn duration_between(created_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> i64 {
    (completed_at - created_at).num_seconds().max(0)
}

/// Submission form as filled in by a line tablet, workstation or admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequest {
    pub line_id: String,
    pub po_numbers: String,
    pub required_time: String,
    pub requested_by: String,
    pub department: String,
}

impl NewRequest {
    /// Validate the form and turn it into a `pending` row draft.
    ///
    /// The PO list is normalized to its canonical `", "`-joined form.
    pub fn into_draft(self) -> Result<RequestDraft, BoardError> {
        let line_id = self.line_id.trim().to_string();
        if line_id.is_empty() {
            return Err(BoardError::MissingField("line_id"));
        }
        let tokens = PoTokens::parse(&self.po_numbers);
        if tokens.is_empty() {
            return Err(BoardError::EmptyPoList);
        }
        let required_time = self.required_time.trim().to_string();
        if required_time.is_empty() {
            return Err(BoardError::MissingField("required_time"));
        }
        let department = self.department.trim().to_string();
        if department.is_empty() {
            return Err(BoardError::MissingField("department"));
        }

        Ok(RequestDraft {
            line_id,
            po_numbers: tokens.join(),
            required_time,
            status: RequestStatus::Pending,
            requested_by: self.requested_by.trim().to_string(),
            department,
            created_at: None,
            completed_at: None,
            duration_seconds: None,
        })
    }
}

/// A row to insert into the `requests` table.
///
/// `created_at` is stamped by the table when absent; split records from a
/// partial completion carry the original's timestamp instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestDraft {
    pub line_id: String,
    pub po_numbers: String,
    pub required_time: String,
    pub status: RequestStatus,
    pub requested_by: String,
    pub department: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

/// Column updates for an existing request. `None` leaves the column alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_numbers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

impl RequestPatch {
    pub fn status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn completion(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(RequestStatus::Completed),
            completed_at: Some(now),
            duration_seconds: Some(duration_between(created_at, now)),
            ..Self::default()
        }
    }

    pub fn po_numbers(po_numbers: String) -> Self {
        Self {
            po_numbers: Some(po_numbers),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.po_numbers.is_none()
            && self.completed_at.is_none()
            && self.duration_seconds.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Cumulative downtime of completed requests for one department.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepartmentDowntime {
    pub name: String,
    pub cumulative_downtime_seconds: i64,
    pub completed_count: i64,
}

impl DepartmentDowntime {
    pub fn minutes(&self) -> i64 {
        self.cumulative_downtime_seconds / 60
    }
}

/// Departments worth charting: at least one whole minute of downtime.
pub fn downtime_chart(rows: &[DepartmentDowntime]) -> Vec<&DepartmentDowntime> {
    rows.iter().filter(|d| d.minutes() > 0).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTime {
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn form(po: &str) -> NewRequest {
        NewRequest {
            line_id: "12".into(),
            po_numbers: po.into(),
            required_time: "14:00".into(),
            requested_by: "Line Operator".into(),
            department: "RMW".into(),
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for s in &["pending", "in_progress", "completed"] {
            let parsed: RequestStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("done".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_status_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::from_str::<RequestStatus>("\"completed\"").unwrap(),
            RequestStatus::Completed
        );
    }

    #[test]
    fn test_only_completed_is_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::InProgress.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
    }

    #[test]
    fn test_into_draft_normalizes_po_list() {
        let draft = form("A1 A2,,A3").into_draft().unwrap();
        assert_eq!(draft.po_numbers, "A1, A2, A3");
        assert_eq!(draft.status, RequestStatus::Pending);
        assert!(draft.created_at.is_none());
    }

    #[test]
    fn test_into_draft_rejects_empty_po_list() {
        let err = form(" , ").into_draft().unwrap_err();
        assert!(matches!(err, BoardError::EmptyPoList));
    }

    #[test]
    fn test_into_draft_rejects_blank_line() {
        let mut f = form("A1");
        f.line_id = "  ".into();
        assert!(matches!(
            f.into_draft().unwrap_err(),
            BoardError::MissingField("line_id")
        ));
    }

    #[test]
    fn test_duration_is_clamped() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 10).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 40).unwrap();
        assert_eq!(duration_between(created, later), 90);
        assert_eq!(duration_between(created, earlier), 0);
    }

    #[test]
    fn test_completion_patch_stamps_duration() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 2, 5).unwrap();
        let patch = RequestPatch::completion(created, now);
        assert_eq!(patch.status, Some(RequestStatus::Completed));
        assert_eq!(patch.completed_at, Some(now));
        assert_eq!(patch.duration_seconds, Some(125));
        assert!(patch.po_numbers.is_none());
    }

    #[test]
    fn test_patch_serialization_skips_unset_columns() {
        let json = serde_json::to_string(&RequestPatch::status(RequestStatus::InProgress)).unwrap();
        assert_eq!(json, r#"{"status":"in_progress"}"#);
        assert!(RequestPatch::default().is_empty());
    }

    #[test]
    fn test_department_downtime_minutes() {
        let d = DepartmentDowntime {
            name: "Sewing".into(),
            cumulative_downtime_seconds: 179,
            completed_count: 2,
        };
        assert_eq!(d.minutes(), 2);
    }

    #[test]
    fn test_chart_omits_departments_under_a_minute() {
        let row = |name: &str, secs| DepartmentDowntime {
            name: name.into(),
            cumulative_downtime_seconds: secs,
            completed_count: 1,
        };
        let rows = vec![row("Cutting", 59), row("Sewing", 60), row("RMW", 0)];
        let chart = downtime_chart(&rows);
        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0].name, "Sewing");
    }
}
