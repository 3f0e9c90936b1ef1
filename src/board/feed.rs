use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::models::{Request, RequestId};

/// Row-level change on the `requests` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ChangeEvent {
    Insert { record: Request },
    Update { record: Request },
    Delete { id: RequestId },
}

impl ChangeEvent {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Insert { record } | Self::Update { record } => record.id,
            Self::Delete { id } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Publish a change to every subscriber.
/// Returns silently even if nobody is listening.
pub fn publish(tx: &broadcast::Sender<ChangeEvent>, event: ChangeEvent) {
    tracing::debug!(kind = event.kind(), id = %event.id(), "publishing change");
    let _ = tx.send(event);
}
