//! Move coordinator
//!
//! Executes drag-and-drop moves against the board:
//! - No-op drops change nothing
//! - Reorders within a stage are applied locally and are final immediately
//! - Cross-stage moves are applied optimistically, persisted through the
//!   [`ProspectService`], and rolled back if persistence fails
//!
//! The optimistic change happens in [`MoveCoordinator::begin`], which is
//! synchronous, so the board never lags behind a gesture. The persistence
//! call happens in [`PendingMove::settle`].
//!
//! Rollback is guarded by the board version: the pre-move board is restored
//! only if nothing else was published after this move's optimistic apply.
//! Otherwise restoring would discard the later change, so the rollback is
//! skipped and the failure is only reported.

use crate::board::{Board, Bucket};
use crate::error::{BoardError, Rollback, ServiceError, StaleMoveError};
use crate::service::ProspectService;
use crate::stage::{canonicalize, StageKey};
use crate::state_machine::{MoveState, MoveTracker};
use crate::store::{BoardStore, Replace};
use crate::types::{BoardVersion, Prospect, ProspectFilter, ProspectId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One drag gesture, resolved to board coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveOperation {
    /// Prospect being dragged
    pub prospect_id: ProspectId,
    /// Stage the drag started in
    pub source_stage: StageKey,
    /// Index within the source bucket
    pub source_index: usize,
    /// Stage the prospect was dropped in
    pub dest_stage: StageKey,
    /// Index within the destination bucket, after removal from the source
    pub dest_index: usize,
}

impl MoveOperation {
    /// Create move
    #[inline]
    #[must_use]
    pub fn new(
        prospect_id: impl Into<ProspectId>,
        (source_stage, source_index): (StageKey, usize),
        (dest_stage, dest_index): (StageKey, usize),
    ) -> Self {
        Self {
            prospect_id: prospect_id.into(),
            source_stage,
            source_index,
            dest_stage,
            dest_index,
        }
    }

    /// Check if the drop lands where the drag started
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.source_stage == self.dest_stage && self.source_index == self.dest_index
    }

    /// Check if the move changes stage
    #[inline]
    #[must_use]
    pub fn is_cross_column(&self) -> bool {
        self.source_stage != self.dest_stage
    }

    /// Classify the move
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MoveKind {
        if self.is_noop() {
            MoveKind::NoOp
        } else if self.is_cross_column() {
            MoveKind::CrossColumn
        } else {
            MoveKind::Reorder
        }
    }
}

/// Position on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropLocation {
    /// Stage column
    pub stage: StageKey,
    /// Index within the column
    pub index: usize,
}

/// Raw end-of-drag event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragResult {
    /// Prospect being dragged
    pub prospect_id: ProspectId,
    /// Where the drag started
    pub source: DropLocation,
    /// Where it was dropped; `None` when dropped outside every column
    pub destination: Option<DropLocation>,
}

impl DragResult {
    /// Resolve to a move. A drop outside every column is a move back to the source.
    #[must_use]
    pub fn into_operation(self) -> MoveOperation {
        let dest = self.destination.unwrap_or(self.source);
        MoveOperation::new(
            self.prospect_id,
            (self.source.stage, self.source.index),
            (dest.stage, dest.index),
        )
    }
}

/// Kind of move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    /// Dropped where it started
    NoOp,
    /// Same stage, different position
    Reorder,
    /// Different stage
    CrossColumn,
}

/// Result of a settled move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The move
    pub operation: MoveOperation,
    /// Kind of move
    pub kind: MoveKind,
    /// Final state: `Idle` for no-ops, `Confirmed` or `Abandoned` otherwise
    pub state: MoveState,
    /// Board version when the move settled
    pub version: BoardVersion,
}

/// Orchestrates moves between the board store and the persistence service
#[derive(Clone)]
pub struct MoveCoordinator {
    store: Arc<BoardStore>,
    service: Arc<dyn ProspectService>,
}

impl std::fmt::Debug for MoveCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveCoordinator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl MoveCoordinator {
    /// Create coordinator
    #[inline]
    #[must_use]
    pub fn new(store: Arc<BoardStore>, service: Arc<dyn ProspectService>) -> Self {
        Self { store, service }
    }

    /// The store this coordinator writes to
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<BoardStore> {
        &self.store
    }

    /// Full reload of the board
    ///
    /// # Errors
    /// See [`BoardStore::load`]
    pub async fn load(&self, filter: &ProspectFilter) -> Result<BoardVersion, BoardError> {
        self.store.load(self.service.as_ref(), filter).await
    }

    /// Apply a move to the board.
    ///
    /// No-ops and reorders settle immediately. A cross-stage move is
    /// published optimistically and returned in flight; call
    /// [`PendingMove::settle`] to persist it.
    ///
    /// # Errors
    /// - `BoardError::BoardClosed` if the board was torn down
    /// - `BoardError::StaleMove` if the move does not match the current board
    pub fn begin(&self, operation: MoveOperation) -> Result<PendingMove, BoardError> {
        if self.store.is_closed() {
            return Err(BoardError::BoardClosed);
        }

        let mut tracker = MoveTracker::new();
        let snapshot = self.store.snapshot();

        if operation.is_noop() {
            return Ok(PendingMove::settled(MoveOutcome {
                operation,
                kind: MoveKind::NoOp,
                state: tracker.state(),
                version: snapshot.version,
            }));
        }

        let (source, prospect) = take_source(&snapshot.board, &operation)?;

        if !operation.is_cross_column() {
            let bucket = insert_at(&source, operation.dest_stage, operation.dest_index, prospect)?;
            let board = snapshot.board.with_bucket(operation.source_stage, bucket);
            let version = self.apply(snapshot.version, board)?;
            tracker.advance(MoveState::Confirmed)?;

            tracing::debug!(
                prospect = %operation.prospect_id,
                stage = %operation.source_stage,
                from = operation.source_index,
                to = operation.dest_index,
                "Reordered within stage"
            );

            return Ok(PendingMove::settled(MoveOutcome {
                operation,
                kind: MoveKind::Reorder,
                state: tracker.state(),
                version,
            }));
        }

        let title = operation.dest_stage.title();
        let moved = Arc::new(prospect.with_status(title));
        let dest = insert_at(
            snapshot.board.bucket(operation.dest_stage),
            operation.dest_stage,
            operation.dest_index,
            moved,
        )?;
        let board = snapshot.board.with_buckets([
            (operation.source_stage, source),
            (operation.dest_stage, dest),
        ]);
        let applied = self.apply(snapshot.version, board)?;
        tracker.advance(MoveState::Applied)?;

        tracing::debug!(
            prospect = %operation.prospect_id,
            from = %operation.source_stage,
            to = %operation.dest_stage,
            %applied,
            "Applied optimistic stage move"
        );

        Ok(PendingMove {
            inner: Pending::InFlight(InFlight {
                operation,
                prior: snapshot.board,
                applied,
                tracker,
                store: Arc::clone(&self.store),
                service: Arc::clone(&self.service),
                timeout: self.store.config().persist_timeout(),
            }),
        })
    }

    /// Apply and settle a move
    ///
    /// # Errors
    /// - Everything [`MoveCoordinator::begin`] returns
    /// - `BoardError::PersistenceFailure` if the stage update failed
    pub async fn execute(&self, operation: MoveOperation) -> Result<MoveOutcome, BoardError> {
        self.begin(operation)?.settle().await
    }

    /// Handle an end-of-drag event
    ///
    /// # Errors
    /// See [`MoveCoordinator::execute`]
    pub async fn on_drag_end(&self, drag: DragResult) -> Result<MoveOutcome, BoardError> {
        self.execute(drag.into_operation()).await
    }

    fn apply(&self, expected: BoardVersion, board: Board) -> Result<BoardVersion, BoardError> {
        match self.store.replace_if_current(expected, board) {
            Replace::Replaced(version) => Ok(version),
            Replace::Superseded { current } => {
                Err(StaleMoveError::BoardChanged { expected, current }.into())
            }
            Replace::Closed => Err(BoardError::BoardClosed),
        }
    }
}

/// Remove the dragged prospect from its source bucket, checking the move
/// still describes the board
fn take_source(
    board: &Board,
    operation: &MoveOperation,
) -> Result<(Bucket, Arc<Prospect>), StaleMoveError> {
    let stage = operation.source_stage;
    let index = operation.source_index;
    let bucket = board.bucket(stage);

    let (rest, prospect) = bucket
        .removed(index)
        .ok_or(StaleMoveError::SourceOutOfRange {
            stage,
            index,
            len: bucket.len(),
        })?;

    if prospect.id != operation.prospect_id {
        return Err(StaleMoveError::ProspectMismatch {
            stage,
            index,
            expected: operation.prospect_id.clone(),
            found: prospect.id.clone(),
        });
    }

    Ok((rest, prospect))
}

fn insert_at(
    bucket: &Bucket,
    stage: StageKey,
    index: usize,
    prospect: Arc<Prospect>,
) -> Result<Bucket, StaleMoveError> {
    bucket
        .inserted(index, prospect)
        .ok_or(StaleMoveError::DestinationOutOfRange {
            stage,
            index,
            max: bucket.len(),
        })
}

/// A move that has been applied to the board but may not be settled yet
#[derive(Debug)]
#[must_use = "an in-flight move is never persisted or rolled back unless settled"]
pub struct PendingMove {
    inner: Pending,
}

#[derive(Debug)]
enum Pending {
    Settled(MoveOutcome),
    InFlight(InFlight),
}

struct InFlight {
    operation: MoveOperation,
    prior: Board,
    applied: BoardVersion,
    tracker: MoveTracker,
    store: Arc<BoardStore>,
    service: Arc<dyn ProspectService>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("operation", &self.operation)
            .field("applied", &self.applied)
            .field("state", &self.tracker.state())
            .finish_non_exhaustive()
    }
}

impl PendingMove {
    fn settled(outcome: MoveOutcome) -> Self {
        Self {
            inner: Pending::Settled(outcome),
        }
    }

    /// The move
    #[must_use]
    pub fn operation(&self) -> &MoveOperation {
        match &self.inner {
            Pending::Settled(outcome) => &outcome.operation,
            Pending::InFlight(flight) => &flight.operation,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> MoveState {
        match &self.inner {
            Pending::Settled(outcome) => outcome.state,
            Pending::InFlight(flight) => flight.tracker.state(),
        }
    }

    /// Check if a persistence call is still outstanding
    #[inline]
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self.inner, Pending::InFlight(_))
    }

    /// Version published by the optimistic apply, for in-flight moves
    #[must_use]
    pub fn applied_version(&self) -> Option<BoardVersion> {
        match &self.inner {
            Pending::Settled(_) => None,
            Pending::InFlight(flight) => Some(flight.applied),
        }
    }

    /// Persist the move and reconcile the board with the result.
    ///
    /// # Errors
    /// - `BoardError::PersistenceFailure` if the stage update failed; the
    ///   error's [`Rollback`] says whether the board was restored
    pub async fn settle(self) -> Result<MoveOutcome, BoardError> {
        match self.inner {
            Pending::Settled(outcome) => Ok(outcome),
            Pending::InFlight(flight) => flight.settle().await,
        }
    }
}

impl InFlight {
    async fn persist(&self) -> Result<Prospect, ServiceError> {
        let call = self
            .service
            .update_prospect_stage(&self.operation.prospect_id, self.operation.dest_stage.title());

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(ServiceError::Timeout(limit))),
            None => call.await,
        }
    }

    async fn settle(mut self) -> Result<MoveOutcome, BoardError> {
        let result = self.persist().await;
        let operation = &self.operation;

        match result {
            Ok(updated) => {
                if self.store.is_closed() {
                    self.tracker.advance(MoveState::Abandoned)?;
                    tracing::debug!(
                        prospect = %operation.prospect_id,
                        "Stage update confirmed after board closed"
                    );
                } else {
                    self.tracker.advance(MoveState::Confirmed)?;
                    if canonicalize(&updated.status) != operation.dest_stage {
                        tracing::warn!(
                            prospect = %operation.prospect_id,
                            status = %updated.status,
                            expected = %operation.dest_stage,
                            "Store echoed a status outside the destination stage"
                        );
                    }
                    tracing::info!(
                        prospect = %operation.prospect_id,
                        status = operation.dest_stage.title(),
                        "Updated prospect status"
                    );
                }

                Ok(MoveOutcome {
                    operation: self.operation.clone(),
                    kind: MoveKind::CrossColumn,
                    state: self.tracker.state(),
                    version: self.store.version(),
                })
            }
            Err(source) => {
                tracing::error!(
                    prospect = %operation.prospect_id,
                    error = %source,
                    "Error updating prospect status"
                );

                let rollback = match self.store.replace_if_current(self.applied, self.prior) {
                    Replace::Replaced(version) => {
                        self.tracker.advance(MoveState::RolledBack)?;
                        tracing::warn!(prospect = %operation.prospect_id, %version, "Rolled back stage move");
                        Rollback::Restored { version }
                    }
                    Replace::Superseded { current } => {
                        self.tracker.advance(MoveState::RolledBack)?;
                        tracing::warn!(
                            prospect = %operation.prospect_id,
                            applied = %self.applied,
                            %current,
                            "Board changed since move; rollback skipped"
                        );
                        Rollback::Superseded {
                            applied: self.applied,
                            current,
                        }
                    }
                    Replace::Closed => {
                        self.tracker.advance(MoveState::Abandoned)?;
                        Rollback::Abandoned
                    }
                };

                Err(BoardError::PersistenceFailure {
                    prospect_id: self.operation.prospect_id,
                    stage: self.operation.dest_stage,
                    rollback,
                    source,
                })
            }
        }
    }
}
