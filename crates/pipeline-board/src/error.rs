//! Error types for the pipeline board
//!
//! Provides the error taxonomy for:
//! - Persistence service failures
//! - Board load failures
//! - Failed cross-column moves and their rollback outcome
//! - Stale move operations (local bug guard)

use crate::state_machine::MoveState;
use crate::stage::StageKey;
use crate::types::{BoardVersion, ProspectId};
use std::time::Duration;

/// Message shown when a board load fails
pub const LOAD_FAILURE_MESSAGE: &str = "Failed to fetch prospects. Please try again later.";

/// Message shown when a stage move could not be persisted
pub const PERSISTENCE_FAILURE_MESSAGE: &str = "Failed to update prospect status. Please try again.";

/// Main board error type
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// `fetch_prospects` failed; the board was left empty
    #[error("load failed: {0}")]
    LoadFailure(#[source] ServiceError),

    /// `update_prospect_stage` failed during a cross-column move
    #[error("failed to move {prospect_id} to {stage} ({rollback}): {source}")]
    PersistenceFailure {
        /// Prospect being moved
        prospect_id: ProspectId,
        /// Destination stage that could not be persisted
        stage: StageKey,
        /// What happened to the optimistic board change
        rollback: Rollback,
        /// The underlying service error
        #[source]
        source: ServiceError,
    },

    /// Move references a prospect or index not on the current board
    #[error("stale move: {0}")]
    StaleMove(#[from] StaleMoveError),

    /// Board was torn down
    #[error("board is closed")]
    BoardClosed,

    /// Move state machine misuse
    #[error("illegal move transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// State the move was in
        from: MoveState,
        /// Requested state
        to: MoveState,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl BoardError {
    /// Check if the user can retry the failed action
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LoadFailure(_) | Self::PersistenceFailure { .. }
        )
    }

    /// Check if this error points at a local bug rather than the environment
    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::StaleMove(_) | Self::IllegalTransition { .. })
    }

    /// Check if the board may no longer match the remote store.
    ///
    /// True when a failed move could not be rolled back because a later
    /// change had already replaced the board. A reload resolves it.
    #[inline]
    #[must_use]
    pub fn requires_reload(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure {
                rollback: Rollback::Superseded { .. },
                ..
            }
        )
    }

    /// Rollback outcome, for persistence failures
    #[inline]
    #[must_use]
    pub fn rollback(&self) -> Option<Rollback> {
        match self {
            Self::PersistenceFailure { rollback, .. } => Some(*rollback),
            _ => None,
        }
    }

    /// Message suitable for display next to the board
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::LoadFailure(_) => LOAD_FAILURE_MESSAGE.to_string(),
            Self::PersistenceFailure { .. } => PERSISTENCE_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// What happened to the optimistic board change after a failed persist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    /// Board restored to its pre-move snapshot
    Restored {
        /// Version of the restored board
        version: BoardVersion,
    },
    /// A later change replaced the board; restoring would discard it
    Superseded {
        /// Version this move published
        applied: BoardVersion,
        /// Version on the board when the failure arrived
        current: BoardVersion,
    },
    /// Board was closed before the failure arrived
    Abandoned,
}

impl std::fmt::Display for Rollback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rollback::Restored { version } => write!(f, "rolled back at {version}"),
            Rollback::Superseded { applied, current } => {
                write!(f, "rollback skipped: {applied} superseded by {current}")
            }
            Rollback::Abandoned => f.write_str("board closed"),
        }
    }
}

/// A move referenced data that is not on the current board
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StaleMoveError {
    /// Source index past the end of the source bucket
    #[error("no prospect at {stage}[{index}] (bucket has {len})")]
    SourceOutOfRange {
        /// Source stage
        stage: StageKey,
        /// Requested index
        index: usize,
        /// Bucket length
        len: usize,
    },

    /// Source index holds a different prospect
    #[error("expected {expected} at {stage}[{index}], found {found}")]
    ProspectMismatch {
        /// Source stage
        stage: StageKey,
        /// Requested index
        index: usize,
        /// Prospect named by the move
        expected: ProspectId,
        /// Prospect actually at that index
        found: ProspectId,
    },

    /// Destination index past the insertion range
    #[error("cannot insert at {stage}[{index}] (max {max})")]
    DestinationOutOfRange {
        /// Destination stage
        stage: StageKey,
        /// Requested index
        index: usize,
        /// Largest valid insertion index
        max: usize,
    },

    /// Board was replaced while the move was being computed
    #[error("board changed from {expected} to {current}")]
    BoardChanged {
        /// Version the move was computed against
        expected: BoardVersion,
        /// Version found when applying
        current: BoardVersion,
    },
}

/// Errors reported by a persistence service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Network or transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote store answered with an error status
    #[error("remote returned {status}: {message}")]
    Status {
        /// HTTP-like status code
        status: u16,
        /// Response message
        message: String,
    },

    /// Unknown prospect
    #[error("prospect not found: {0}")]
    NotFound(ProspectId),

    /// Call did not settle in time
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl ServiceError {
    /// Create transport error
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persistence_failure(rollback: Rollback) -> BoardError {
        BoardError::PersistenceFailure {
            prospect_id: ProspectId::new("A-id"),
            stage: StageKey::Qualified,
            rollback,
            source: ServiceError::transport("connection reset"),
        }
    }

    #[test]
    fn board_error_display() {
        let err = persistence_failure(Rollback::Restored {
            version: BoardVersion(3),
        });
        let text = err.to_string();
        assert!(text.contains("A-id"));
        assert!(text.contains("qualified"));
        assert!(text.contains("rolled back at v3"));
    }

    #[test]
    fn board_error_is_retryable() {
        assert!(BoardError::LoadFailure(ServiceError::transport("x")).is_retryable());
        assert!(persistence_failure(Rollback::Abandoned).is_retryable());
        assert!(!BoardError::BoardClosed.is_retryable());
    }

    #[test]
    fn stale_move_is_internal() {
        let err: BoardError = StaleMoveError::SourceOutOfRange {
            stage: StageKey::Lost,
            index: 4,
            len: 1,
        }
        .into();
        assert!(err.is_internal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn superseded_rollback_requires_reload() {
        let err = persistence_failure(Rollback::Superseded {
            applied: BoardVersion(2),
            current: BoardVersion(3),
        });
        assert!(err.requires_reload());
        assert!(!persistence_failure(Rollback::Abandoned).requires_reload());
    }

    #[test]
    fn user_messages() {
        assert_eq!(
            BoardError::LoadFailure(ServiceError::transport("x")).user_message(),
            LOAD_FAILURE_MESSAGE
        );
        assert_eq!(
            persistence_failure(Rollback::Abandoned).user_message(),
            PERSISTENCE_FAILURE_MESSAGE
        );
    }
}
