//! Typed error hierarchy for the RMW board.
//!
//! `BoardError` covers the request store, the table backends and the clock
//! synchronizer. Storage code returns `anyhow::Result` with context; when a
//! storage routine needs a typed outcome (unknown id, terminal record) it
//! wraps a `BoardError` in the `anyhow::Error` so callers can `downcast_ref`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Request {id} not found")]
    RequestNotFound { id: Uuid },

    #[error("Request {id} is already completed")]
    AlreadyCompleted { id: Uuid },

    #[error("PO number list is empty")]
    EmptyPoList,

    #[error("No PO numbers selected")]
    EmptySelection,

    #[error("PO numbers not on the request: {}", tokens.join(", "))]
    UnknownTokens { tokens: Vec<String> },

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Request store is still loading")]
    Loading,

    #[error("Request cache lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Remote returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Change feed error: {0}")]
    Feed(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BoardError {
    /// Malformed input, rejected before any remote call is issued.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyPoList
                | Self::EmptySelection
                | Self::UnknownTokens { .. }
                | Self::MissingField(_)
                | Self::InvalidStatus(_)
                | Self::InvalidRole(_)
        )
    }

    /// Lift a storage error, keeping a typed `BoardError` if one is inside.
    pub fn from_storage(err: anyhow::Error) -> Self {
        match err.downcast::<BoardError>() {
            Ok(typed) => typed,
            Err(other) => Self::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_not_found_carries_id() {
        let id = Uuid::new_v4();
        let err = BoardError::RequestNotFound { id };
        match &err {
            BoardError::RequestNotFound { id: got } => assert_eq!(*got, id),
            _ => panic!("Expected RequestNotFound"),
        }
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn unknown_tokens_lists_every_token() {
        let err = BoardError::UnknownTokens {
            tokens: vec!["X1".into(), "X2".into()],
        };
        assert_eq!(err.to_string(), "PO numbers not on the request: X1, X2");
    }

    #[test]
    fn validation_errors_are_classified() {
        assert!(BoardError::EmptyPoList.is_validation());
        assert!(BoardError::EmptySelection.is_validation());
        assert!(BoardError::MissingField("line_id").is_validation());
        assert!(!BoardError::Loading.is_validation());
        assert!(
            !BoardError::Remote {
                status: 500,
                message: "boom".into()
            }
            .is_validation()
        );
    }

    #[test]
    fn from_storage_recovers_typed_error() {
        let id = Uuid::new_v4();
        let wrapped = anyhow::Error::new(BoardError::AlreadyCompleted { id });
        assert!(matches!(
            BoardError::from_storage(wrapped),
            BoardError::AlreadyCompleted { id: got } if got == id
        ));

        let plain = anyhow::anyhow!("disk full");
        assert!(matches!(
            BoardError::from_storage(plain),
            BoardError::Database(_)
        ));
    }

    #[test]
    fn board_error_implements_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&BoardError::LockPoisoned);
    }
}
