//! Board store
//!
//! Owns the current [`Board`] and publishes every replacement to readers
//! through a watch channel. The store is the only writer; each publish bumps
//! a [`BoardVersion`] so that a delayed rollback can check whether anything
//! replaced the board in the meantime.

use crate::board::{Board, PipelineStats};
use crate::config::BoardConfig;
use crate::error::{BoardError, LOAD_FAILURE_MESSAGE};
use crate::service::ProspectService;
use crate::types::{BoardVersion, Prospect, ProspectFilter};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// A board together with the version it was published at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardSnapshot {
    /// Board contents
    pub board: Board,
    /// Publish stamp
    pub version: BoardVersion,
}

/// Full-load lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    /// No load attempted yet
    #[default]
    Idle,
    /// Fetch in progress
    Loading,
    /// Board populated from the last fetch
    Ready,
    /// Last fetch failed; board is empty
    Failed {
        /// User-facing message
        message: String,
    },
}

/// Result of a conditional replace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replace {
    /// Board replaced; new version
    Replaced(BoardVersion),
    /// Version no longer matched; board untouched
    Superseded {
        /// Version currently published
        current: BoardVersion,
    },
    /// Store is closed; board untouched
    Closed,
}

/// Single-writer holder of the current board
#[derive(Debug)]
pub struct BoardStore {
    tx: watch::Sender<BoardSnapshot>,
    load_state: RwLock<LoadState>,
    closed: AtomicBool,
    config: BoardConfig,
}

impl BoardStore {
    /// Create store with an empty board and default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BoardConfig::default())
    }

    /// Create store with an empty board
    #[must_use]
    pub fn with_config(config: BoardConfig) -> Self {
        let (tx, _rx) = watch::channel(BoardSnapshot::default());
        Self {
            tx,
            load_state: RwLock::new(LoadState::Idle),
            closed: AtomicBool::new(false),
            config,
        }
    }

    /// Store configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Current board and version
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        self.tx.borrow().clone()
    }

    /// Current board
    #[must_use]
    pub fn board(&self) -> Board {
        self.tx.borrow().board.clone()
    }

    /// Current version
    #[must_use]
    pub fn version(&self) -> BoardVersion {
        self.tx.borrow().version
    }

    /// Receive every published board
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.tx.subscribe()
    }

    /// Full-load lifecycle state
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.load_state.read().clone()
    }

    /// Per-stage counts of the current board
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.tx.borrow().board.stats()
    }

    /// Most recently created prospects, up to the configured limit
    #[must_use]
    pub fn recent(&self) -> Vec<Prospect> {
        self.tx
            .borrow()
            .board
            .recent(self.config.recent_limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Check if the board was torn down
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear the board down. Later publishes and late results are ignored.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(version = %self.version(), "Board closed");
        }
    }

    /// Replace the board unconditionally
    ///
    /// # Errors
    /// - `BoardError::BoardClosed` if the store is closed
    pub fn publish(&self, board: Board) -> Result<BoardVersion, BoardError> {
        let mut published = None;
        self.tx.send_if_modified(|snapshot| {
            if self.is_closed() {
                return false;
            }
            snapshot.version = snapshot.version.next();
            snapshot.board = board;
            published = Some(snapshot.version);
            true
        });
        published.ok_or(BoardError::BoardClosed)
    }

    /// Replace the board only if it is still at `expected`
    pub fn replace_if_current(&self, expected: BoardVersion, board: Board) -> Replace {
        let mut outcome = Replace::Closed;
        self.tx.send_if_modified(|snapshot| {
            if self.is_closed() {
                return false;
            }
            if snapshot.version != expected {
                outcome = Replace::Superseded {
                    current: snapshot.version,
                };
                return false;
            }
            snapshot.version = snapshot.version.next();
            snapshot.board = board;
            outcome = Replace::Replaced(snapshot.version);
            true
        });
        outcome
    }

    /// Rebuild the board from the persistence service.
    ///
    /// On failure the board is emptied rather than left partially populated,
    /// and the load state carries the user-facing message. Calling `load`
    /// again is the retry.
    ///
    /// # Errors
    /// - `BoardError::LoadFailure` if the fetch fails
    /// - `BoardError::BoardClosed` if the store is closed before or during the
    ///   fetch; the load state goes back to `Idle`
    pub async fn load(
        &self,
        service: &dyn ProspectService,
        filter: &ProspectFilter,
    ) -> Result<BoardVersion, BoardError> {
        if self.is_closed() {
            return Err(BoardError::BoardClosed);
        }

        *self.load_state.write() = LoadState::Loading;
        tracing::info!(?filter, "Loading pipeline board");

        match service.fetch_prospects(filter).await {
            Ok(prospects) => {
                let count = prospects.len();
                let version = self
                    .publish(Board::build(prospects))
                    .map_err(|_| self.abandon_load())?;
                *self.load_state.write() = LoadState::Ready;
                tracing::info!(count, %version, "Pipeline board loaded");
                Ok(version)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch prospects");
                self.publish(Board::empty())
                    .map_err(|_| self.abandon_load())?;
                *self.load_state.write() = LoadState::Failed {
                    message: LOAD_FAILURE_MESSAGE.to_string(),
                };
                Err(BoardError::LoadFailure(e))
            }
        }
    }

    fn abandon_load(&self) -> BoardError {
        *self.load_state.write() = LoadState::Idle;
        tracing::debug!("Board closed during load");
        BoardError::BoardClosed
    }
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}
