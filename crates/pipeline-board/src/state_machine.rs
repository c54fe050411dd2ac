//! Move operation state machine
//!
//! Every drag gesture produces one [`MoveOperation`](crate::MoveOperation)
//! whose lifecycle is tracked here:
//!
//! ```text
//! Idle ──► Applied ──► Confirmed
//!   │         ├──────► RolledBack
//!   │         └──────► Abandoned
//!   └────────────────► Confirmed   (intra-column reorder)
//! ```

use crate::error::BoardError;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveState {
    /// Nothing applied yet (and, for a no-op, never will be)
    #[default]
    Idle,
    /// Optimistic board change is visible; persistence in flight
    Applied,
    /// Move is final
    Confirmed,
    /// Persistence failed; pre-move board restored or restore skipped
    RolledBack,
    /// Board was torn down before persistence settled
    Abandoned,
}

impl MoveState {
    /// Check if no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: MoveState) -> Vec<MoveState> {
    match from {
        MoveState::Idle => vec![MoveState::Applied, MoveState::Confirmed],
        MoveState::Applied => vec![
            MoveState::Confirmed,
            MoveState::RolledBack,
            MoveState::Abandoned,
        ],
        MoveState::Confirmed | MoveState::RolledBack | MoveState::Abandoned => vec![],
    }
}

/// Validates a state transition.
///
/// # Errors
/// - `BoardError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: MoveState, to: MoveState) -> Result<(), BoardError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(BoardError::IllegalTransition { from, to })
    }
}

/// Current state of one move, advanced only along legal transitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MoveTracker {
    state: MoveState,
}

impl MoveTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(self) -> MoveState {
        self.state
    }

    pub(crate) fn advance(&mut self, to: MoveState) -> Result<(), BoardError> {
        validate_transition(self.state, to)?;
        tracing::trace!(from = ?self.state, to = ?to, "Move transition");
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_transitions() {
        assert!(validate_transition(MoveState::Idle, MoveState::Applied).is_ok());
        assert!(validate_transition(MoveState::Idle, MoveState::Confirmed).is_ok());

        assert!(validate_transition(MoveState::Idle, MoveState::RolledBack).is_err());
        assert!(validate_transition(MoveState::Idle, MoveState::Abandoned).is_err());
    }

    #[test]
    fn applied_transitions() {
        for to in [MoveState::Confirmed, MoveState::RolledBack, MoveState::Abandoned] {
            assert!(validate_transition(MoveState::Applied, to).is_ok());
        }
        assert!(validate_transition(MoveState::Applied, MoveState::Idle).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(MoveState::Confirmed.is_terminal());
        assert!(MoveState::RolledBack.is_terminal());
        assert!(MoveState::Abandoned.is_terminal());
        assert!(!MoveState::Applied.is_terminal());
        assert!(!MoveState::Idle.is_terminal());
    }

    #[test]
    fn tracker_rejects_illegal_advance() {
        let mut tracker = MoveTracker::new();
        tracker.advance(MoveState::Applied).unwrap();
        tracker.advance(MoveState::RolledBack).unwrap();

        let err = tracker.advance(MoveState::Confirmed).unwrap_err();
        assert!(matches!(
            err,
            BoardError::IllegalTransition {
                from: MoveState::RolledBack,
                to: MoveState::Confirmed
            }
        ));
        assert_eq!(tracker.state(), MoveState::RolledBack);
    }
}
