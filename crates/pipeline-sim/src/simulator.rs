//! Seeded move simulator
//!
//! Each step generates a drag against the current board: a no-op, a reorder
//! within a stage, or a move to another stage. Moves are grouped into
//! batches; every move in a batch is applied before any of them settles, so
//! batches larger than one exercise the rollback race guard.
//!
//! Invariants checked:
//! - The board is a partition of the loaded prospects after every step
//! - Only cross-stage moves reach the persistence service
//! - A failed move that is the only one in flight restores the prior board
//! - A confirmed move that is the only one in flight leaves the prospect
//!   where it was dropped
//! - Unless a rollback was superseded, the board agrees with the store

use futures::future::join_all;
use pipeline_board::{
    canonicalize, Board, BoardConfig, BoardError, BoardStore, InMemoryProspectService,
    MoveCoordinator, MoveKind, MoveOperation, MoveState, Prospect, ProspectFilter, ProspectId,
    Rollback, StageKey, STAGE_COUNT,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Labels outside the nine stage titles, to exercise the fallback bucket
const UNKNOWN_LABELS: [&str; 3] = ["Archived", "", "follow up"];

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Total moves to generate
    pub moves: u64,
    /// Prospects loaded onto the board
    pub prospects: usize,
    /// Probability that a cross-stage move fails to persist
    pub failure_rate: f64,
    /// Largest number of moves applied before settling
    pub max_in_flight: usize,
    /// Stop conditions
    pub stop_on_first_violation: bool,
    /// Board configuration used by the store
    #[serde(skip)]
    pub board: BoardConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            moves: 1000,
            prospects: 40,
            failure_rate: 0.2,
            max_in_flight: 1,
            stop_on_first_violation: true,
            board: BoardConfig::default(),
        }
    }
}

impl SimulatorConfig {
    /// Validate configuration
    ///
    /// # Errors
    /// Returns an error describing the first invalid field
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.failure_rate),
            "failure rate must be between 0 and 1, got {}",
            self.failure_rate
        );
        anyhow::ensure!(self.prospects > 0, "at least one prospect is required");
        anyhow::ensure!(self.max_in_flight > 0, "max in flight must be at least 1");
        self.board.validate()?;
        Ok(())
    }
}

/// A violation detected during simulation
#[derive(Debug, Clone, Serialize)]
pub enum Violation {
    /// Initial load failed
    LoadFailed {
        /// Error text
        error: String,
    },
    /// A prospect is missing, duplicated, or unexpected
    PartitionBroken {
        /// Step number
        step: u64,
        /// What went wrong
        detail: String,
    },
    /// A failed solo move left the board different from before the move
    RollbackMismatch {
        /// Step number
        step: u64,
        /// The move
        operation: MoveOperation,
    },
    /// A confirmed solo move left the prospect somewhere else
    MisplacedAfterConfirm {
        /// Step number
        step: u64,
        /// The move
        operation: MoveOperation,
    },
    /// Number of persistence calls did not match the in-flight moves
    UnexpectedServiceCalls {
        /// Step number
        step: u64,
        /// Cross-stage moves in the batch
        expected: usize,
        /// Calls the service saw
        actual: usize,
    },
    /// Board and store disagree about a prospect's stage
    StoreDisagrees {
        /// Step number
        step: u64,
        /// Prospect
        prospect: ProspectId,
    },
    /// A move failed in a way the generator should rule out
    UnexpectedError {
        /// Step number
        step: u64,
        /// The move
        operation: MoveOperation,
        /// Error text
        error: String,
    },
}

/// Statistics for simulation
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulatorStats {
    /// Moves generated
    pub moves_attempted: u64,
    /// Drops back onto the starting position
    pub noops: u64,
    /// Moves within one stage
    pub reorders: u64,
    /// Moves to another stage
    pub cross_column: u64,
    /// Cross-stage moves the store accepted
    pub confirmed: u64,
    /// Failed moves whose prior board was restored
    pub rolled_back: u64,
    /// Failed moves whose rollback was skipped because the board had moved on
    pub rollbacks_superseded: u64,
    /// Full reloads after a skipped rollback
    pub reloads: u64,
}

/// Final report from simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    /// Configuration the run used
    pub config: SimulatorConfig,
    /// Move and outcome counters
    pub stats: SimulatorStats,
    /// Every invariant violation, in step order
    pub violations: Vec<Violation>,
    /// Prospects per stage at the end of the run
    pub final_counts: [usize; STAGE_COUNT],
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Pipeline Board Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Prospects: {}\n", self.config.prospects));
        report.push_str(&format!("Failure Rate: {:.2}\n", self.config.failure_rate));
        report.push_str(&format!("Max In Flight: {}\n", self.config.max_in_flight));
        report.push_str(&format!("Moves Attempted: {}\n", self.stats.moves_attempted));
        report.push_str(&format!("  No-ops: {}\n", self.stats.noops));
        report.push_str(&format!("  Reorders: {}\n", self.stats.reorders));
        report.push_str(&format!("  Cross-column: {}\n", self.stats.cross_column));
        report.push_str(&format!("Confirmed: {}\n", self.stats.confirmed));
        report.push_str(&format!("Rolled Back: {}\n", self.stats.rolled_back));
        report.push_str(&format!(
            "Rollbacks Superseded: {}\n",
            self.stats.rollbacks_superseded
        ));
        report.push_str(&format!("Reloads: {}\n", self.stats.reloads));

        report.push_str("\n=== Final Board ===\n");
        for key in StageKey::ALL {
            report.push_str(&format!(
                "{:<14} {}\n",
                key.title(),
                self.final_counts[key.index()]
            ));
        }

        report.push_str(&format!("\nViolations: {}\n", self.violations.len()));
        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

/// Run the simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let prospects = generate_prospects(&mut rng, config.prospects);
    let ids: HashSet<ProspectId> = prospects.iter().map(|p| p.id.clone()).collect();

    let service = Arc::new(InMemoryProspectService::new(prospects));
    let store = Arc::new(BoardStore::with_config(config.board.clone()));
    let coordinator = MoveCoordinator::new(Arc::clone(&store), service.clone());

    let mut sim = Simulation {
        rng,
        store,
        service,
        coordinator,
        ids,
        stats: SimulatorStats::default(),
        violations: Vec::new(),
        step: 0,
    };

    if let Err(e) = sim.coordinator.load(&ProspectFilter::all()).await {
        sim.violations.push(Violation::LoadFailed {
            error: e.to_string(),
        });
        return sim.finish(config);
    }

    while sim.step < config.moves {
        let remaining = usize::try_from(config.moves - sim.step).unwrap_or(usize::MAX);
        let size = sim.rng.random_range(1..=config.max_in_flight).min(remaining);
        sim.run_batch(size, config.failure_rate).await;

        if config.stop_on_first_violation && !sim.violations.is_empty() {
            break;
        }
    }

    tracing::info!(
        moves = sim.stats.moves_attempted,
        violations = sim.violations.len(),
        "Simulation finished"
    );

    sim.finish(config)
}

struct Simulation {
    rng: StdRng,
    store: Arc<BoardStore>,
    service: Arc<InMemoryProspectService>,
    coordinator: MoveCoordinator,
    ids: HashSet<ProspectId>,
    stats: SimulatorStats,
    violations: Vec<Violation>,
    step: u64,
}

impl Simulation {
    async fn run_batch(&mut self, size: usize, failure_rate: f64) {
        let calls_before = self.service.update_calls().len();
        let mut pending = Vec::with_capacity(size);
        let mut failures = 0;

        for _ in 0..size {
            self.step += 1;
            let prior = self.store.board();
            let operation = generate_move(&mut self.rng, &prior);
            self.stats.moves_attempted += 1;

            match operation.kind() {
                MoveKind::NoOp => self.stats.noops += 1,
                MoveKind::Reorder => self.stats.reorders += 1,
                MoveKind::CrossColumn => {
                    self.stats.cross_column += 1;
                    if self.rng.random_bool(failure_rate) {
                        failures += 1;
                    }
                }
            }

            match self.coordinator.begin(operation.clone()) {
                Ok(pending_move) => pending.push((self.step, prior, pending_move)),
                Err(e) => self.violations.push(Violation::UnexpectedError {
                    step: self.step,
                    operation,
                    error: e.to_string(),
                }),
            }
            self.check_partition();
        }

        let in_flight = pending.iter().filter(|(_, _, m)| m.is_in_flight()).count();
        let solo = pending.len() == 1;
        self.service.fail_next_updates(failures);

        let settled = join_all(pending.into_iter().map(|(step, prior, pending_move)| async move {
            let operation = pending_move.operation().clone();
            (step, prior, operation, pending_move.settle().await)
        }))
        .await;
        self.service.fail_next_updates(0);

        let mut needs_reload = false;
        for (step, prior, operation, result) in settled {
            match result {
                Ok(outcome) => {
                    if outcome.state == MoveState::Confirmed
                        && outcome.kind == MoveKind::CrossColumn
                    {
                        self.stats.confirmed += 1;
                        let landed = self.store.board().position_of(&operation.prospect_id);
                        if solo && landed != Some((operation.dest_stage, operation.dest_index)) {
                            self.violations
                                .push(Violation::MisplacedAfterConfirm { step, operation });
                        }
                    }
                }
                Err(BoardError::PersistenceFailure { rollback, .. }) => match rollback {
                    Rollback::Restored { .. } => {
                        self.stats.rolled_back += 1;
                        if solo && self.store.board() != prior {
                            self.violations
                                .push(Violation::RollbackMismatch { step, operation });
                        }
                    }
                    Rollback::Superseded { .. } => {
                        self.stats.rollbacks_superseded += 1;
                        needs_reload = true;
                    }
                    Rollback::Abandoned => {}
                },
                Err(e) => self.violations.push(Violation::UnexpectedError {
                    step,
                    operation,
                    error: e.to_string(),
                }),
            }
        }

        let actual = self.service.update_calls().len() - calls_before;
        if actual != in_flight {
            self.violations.push(Violation::UnexpectedServiceCalls {
                step: self.step,
                expected: in_flight,
                actual,
            });
        }

        if needs_reload {
            tracing::debug!(step = self.step, "Reloading after superseded rollback");
            self.stats.reloads += 1;
            if let Err(e) = self.coordinator.load(&ProspectFilter::all()).await {
                self.violations.push(Violation::LoadFailed {
                    error: e.to_string(),
                });
            }
        }

        self.check_partition();
        self.check_store_agreement();
    }

    fn check_partition(&mut self) {
        let board = self.store.board();
        let mut seen = HashSet::with_capacity(self.ids.len());

        for (_, bucket) in board.iter() {
            for p in bucket.iter() {
                if !self.ids.contains(&p.id) {
                    self.partition_broken(format!("unexpected prospect {}", p.id));
                    return;
                }
                if !seen.insert(p.id.clone()) {
                    self.partition_broken(format!("prospect {} appears twice", p.id));
                    return;
                }
            }
        }

        if seen.len() != self.ids.len() {
            self.partition_broken(format!(
                "board holds {} of {} prospects",
                seen.len(),
                self.ids.len()
            ));
        }
    }

    fn partition_broken(&mut self, detail: String) {
        self.violations.push(Violation::PartitionBroken {
            step: self.step,
            detail,
        });
    }

    fn check_store_agreement(&mut self) {
        let remote: HashMap<ProspectId, String> = self
            .service
            .prospects()
            .into_iter()
            .map(|p| (p.id, p.status))
            .collect();
        let board = self.store.board();

        for (key, bucket) in board.iter() {
            for p in bucket.iter() {
                let agrees = remote
                    .get(&p.id)
                    .is_some_and(|status| canonicalize(status) == key);
                if !agrees {
                    self.violations.push(Violation::StoreDisagrees {
                        step: self.step,
                        prospect: p.id.clone(),
                    });
                }
            }
        }
    }

    fn finish(self, config: SimulatorConfig) -> SimulatorReport {
        SimulatorReport {
            final_counts: self.store.stats().counts,
            config,
            stats: self.stats,
            violations: self.violations,
        }
    }
}

/// Prospects with random stage labels, some of them unrecognized
fn generate_prospects(rng: &mut StdRng, count: usize) -> Vec<Prospect> {
    (0..count)
        .map(|i| {
            let status = if rng.random_bool(0.1) {
                UNKNOWN_LABELS[rng.random_range(0..UNKNOWN_LABELS.len())]
            } else {
                StageKey::ALL[rng.random_range(0..STAGE_COUNT)].title()
            };
            Prospect::new(format!("prospect-{i:04}"), status)
                .with_name(format!("Prospect {i}"))
                .with_email(format!("prospect{i}@example.com"))
        })
        .collect()
}

/// Generate a drag that is valid against `board`
fn generate_move(rng: &mut StdRng, board: &Board) -> MoveOperation {
    let occupied: Vec<StageKey> = board
        .iter()
        .filter(|(_, bucket)| !bucket.is_empty())
        .map(|(key, _)| key)
        .collect();
    let source_stage = occupied[rng.random_range(0..occupied.len())];
    let source = board.bucket(source_stage);
    let source_index = rng.random_range(0..source.len());
    let id = source.ids().swap_remove(source_index);

    let roll = rng.random_range(0..100);
    if roll < 15 {
        return MoveOperation::new(id, (source_stage, source_index), (source_stage, source_index));
    }

    if roll < 50 {
        // Valid reorder targets are 0..len after removal, i.e. 0..len-1 inclusive.
        let dest_index = rng.random_range(0..source.len());
        return MoveOperation::new(id, (source_stage, source_index), (source_stage, dest_index));
    }

    let mut dest_stage = StageKey::ALL[rng.random_range(0..STAGE_COUNT)];
    if dest_stage == source_stage {
        dest_stage = StageKey::ALL[(source_stage.index() + 1) % STAGE_COUNT];
    }
    let dest_index = rng.random_range(0..=board.bucket(dest_stage).len());
    MoveOperation::new(id, (source_stage, source_index), (dest_stage, dest_index))
}
