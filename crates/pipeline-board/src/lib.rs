//! Pipeline Board - optimistic sales-pipeline board engine
//!
//! Partitions prospects into nine ordered stage buckets and moves them
//! between stages with immediate local feedback:
//! - Classifies free-text status labels into canonical stages
//! - Builds and replaces an immutable board value
//! - Applies moves optimistically and reconciles them with an async
//!   persistence service, rolling back on failure
//!
//! # Example
//!
//! ```rust,ignore
//! use pipeline_board::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(service: Arc<dyn ProspectService>) -> Result<(), BoardError> {
//! let store = Arc::new(BoardStore::new());
//! let coordinator = MoveCoordinator::new(store.clone(), service);
//!
//! coordinator.load(&ProspectFilter::all()).await?;
//!
//! let op = MoveOperation::new("A-id", (StageKey::NewLead, 0), (StageKey::Qualified, 0));
//! let outcome = coordinator.execute(op).await?;
//! assert_eq!(outcome.state, MoveState::Confirmed);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod board;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod service;
pub mod stage;
pub mod state_machine;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use board::{Board, Bucket, PipelineStats};
pub use config::BoardConfig;
pub use coordinator::{
    DragResult, DropLocation, MoveCoordinator, MoveKind, MoveOperation, MoveOutcome, PendingMove,
};
pub use error::{
    BoardError, Rollback, ServiceError, StaleMoveError, LOAD_FAILURE_MESSAGE,
    PERSISTENCE_FAILURE_MESSAGE,
};
pub use service::{InMemoryProspectService, ProspectService};
pub use stage::{canonicalize, classify, title_of, Classification, StageKey, STAGE_COUNT};
pub use state_machine::MoveState;
pub use store::{BoardSnapshot, BoardStore, LoadState, Replace};
pub use types::{BoardVersion, Prospect, ProspectFilter, ProspectId};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the pipeline board
    pub use crate::{
        Board, BoardConfig, BoardError, BoardStore, MoveCoordinator, MoveOperation, MoveOutcome,
        MoveState, Prospect, ProspectFilter, ProspectId, ProspectService, StageKey,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn load_move_reload_flow() {
        let service = Arc::new(InMemoryProspectService::new(vec![
            Prospect::new("A-id", "New Lead"),
            Prospect::new("B-id", "Proposal"),
        ]));
        let store = Arc::new(BoardStore::new());
        let coordinator = MoveCoordinator::new(store.clone(), service.clone());

        coordinator.load(&ProspectFilter::all()).await.unwrap();

        let op = MoveOperation::new("A-id", (StageKey::NewLead, 0), (StageKey::Proposal, 1));
        let outcome = coordinator.execute(op).await.unwrap();
        assert_eq!(outcome.state, MoveState::Confirmed);

        // The remote store now agrees, so a reload keeps A in proposal.
        coordinator.load(&ProspectFilter::all()).await.unwrap();
        assert_eq!(store.board().position_of(&ProspectId::new("A-id")).unwrap().0, StageKey::Proposal);
    }

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
