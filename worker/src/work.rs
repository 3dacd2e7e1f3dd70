//! The work-execution substrate: generation and move resolution run as
//! discrete work items under a start-to-close budget.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sweeper_core::{
    Board, BoardGenerator, Coord2, GameConfig, GameError, GameState, MoveAction, MoveRequest,
    RandomBoardGenerator,
};
use thiserror::Error;
use time::OffsetDateTime;

use crate::settings::WorkSettings;

#[derive(Clone, Debug, PartialEq)]
pub enum WorkItem {
    GenerateBoard {
        config: GameConfig,
    },
    ApplyReveal {
        state: GameState,
        coords: Coord2,
        now: OffsetDateTime,
    },
    ApplyFlagToggle {
        state: GameState,
        coords: Coord2,
    },
    ApplyChord {
        state: GameState,
        coords: Coord2,
        now: OffsetDateTime,
    },
}

impl WorkItem {
    pub fn for_move(state: GameState, request: MoveRequest, now: OffsetDateTime) -> Self {
        let coords = request.coords();
        match request.action {
            MoveAction::Reveal => Self::ApplyReveal { state, coords, now },
            MoveAction::Flag | MoveAction::Unflag => Self::ApplyFlagToggle { state, coords },
            MoveAction::Chord => Self::ApplyChord { state, coords, now },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateBoard { .. } => "generate_board",
            Self::ApplyReveal { .. } => "apply_reveal",
            Self::ApplyFlagToggle { .. } => "apply_flag_toggle",
            Self::ApplyChord { .. } => "apply_chord",
        }
    }

    /// Runs the item to completion. `seed` only matters for generation.
    pub fn run(self, seed: u64) -> Result<WorkOutput, GameError> {
        match self {
            Self::GenerateBoard { config } => Ok(WorkOutput::Board(
                RandomBoardGenerator::new(seed).generate(config),
            )),
            Self::ApplyReveal { state, coords, now } => {
                sweeper_core::reveal(&state, coords, now).map(WorkOutput::State)
            }
            Self::ApplyFlagToggle { state, coords } => {
                sweeper_core::toggle_flag(&state, coords).map(WorkOutput::State)
            }
            Self::ApplyChord { state, coords, now } => {
                sweeper_core::chord_reveal(&state, coords, now).map(WorkOutput::State)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WorkOutput {
    Board(Board),
    State(GameState),
}

impl WorkOutput {
    pub fn into_board(self, item: &'static str) -> Result<Board, WorkError> {
        match self {
            Self::Board(board) => Ok(board),
            Self::State(_) => Err(WorkError::UnexpectedOutput { item }),
        }
    }

    pub fn into_state(self, item: &'static str) -> Result<GameState, WorkError> {
        match self {
            Self::State(state) => Ok(state),
            Self::Board(_) => Err(WorkError::UnexpectedOutput { item }),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkError {
    #[error("work item {item} timed out after {after:?}")]
    TimedOut { item: &'static str, after: Duration },
    #[error("work item {item} failed: {source}")]
    Failed {
        item: &'static str,
        #[source]
        source: GameError,
    },
    #[error("work item {item} was cancelled")]
    Cancelled { item: &'static str },
    #[error("work item {item} panicked")]
    Panicked { item: &'static str },
    #[error("work item {item} returned an unexpected output")]
    UnexpectedOutput { item: &'static str },
}

/// Submit a work item, get its result or a failure.
#[async_trait]
pub trait WorkExecutor: Send + Sync {
    async fn execute(&self, item: WorkItem) -> Result<WorkOutput, WorkError>;
}

/// Hands out generation seeds: a fixed base advanced per board, or fresh entropy.
#[derive(Debug, Default)]
pub struct SeedSource {
    base: Option<u64>,
    issued: AtomicU64,
}

impl SeedSource {
    pub fn new(base: Option<u64>) -> Self {
        Self {
            base,
            issued: AtomicU64::new(0),
        }
    }

    pub fn next_seed(&self) -> u64 {
        match self.base {
            Some(base) => base.wrapping_add(self.issued.fetch_add(1, Ordering::Relaxed)),
            None => rand::random(),
        }
    }
}

/// Awaits `fut` for at most `budget`, mapping an overrun to [`WorkError::TimedOut`].
pub async fn within_budget<T>(
    item: &'static str,
    budget: Duration,
    fut: impl Future<Output = Result<T, WorkError>>,
) -> Result<T, WorkError> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(WorkError::TimedOut {
            item,
            after: budget,
        }),
    }
}

/// Runs work items on tokio's blocking pool under the start-to-close timeout.
#[derive(Debug)]
pub struct LocalExecutor {
    start_to_close: Duration,
    seeds: SeedSource,
}

impl LocalExecutor {
    pub fn new(settings: &WorkSettings) -> Self {
        Self {
            start_to_close: settings.start_to_close_timeout(),
            seeds: SeedSource::new(settings.seed),
        }
    }
}

#[async_trait]
impl WorkExecutor for LocalExecutor {
    async fn execute(&self, item: WorkItem) -> Result<WorkOutput, WorkError> {
        let name = item.name();
        let seed = self.seeds.next_seed();
        let task = tokio::task::spawn_blocking(move || item.run(seed));
        let abort = task.abort_handle();

        let result = within_budget(name, self.start_to_close, async move {
            match task.await {
                Ok(result) => result.map_err(|source| WorkError::Failed { item: name, source }),
                Err(err) if err.is_cancelled() => Err(WorkError::Cancelled { item: name }),
                Err(_) => Err(WorkError::Panicked { item: name }),
            }
        })
        .await;

        if let Err(WorkError::TimedOut { .. }) = &result {
            abort.abort();
        }
        result
    }
}

/// Runs work items directly on the calling task, with no timeout. For hosts
/// that want fully deterministic scheduling, such as tests.
#[derive(Debug, Default)]
pub struct InlineExecutor {
    seeds: SeedSource,
}

impl InlineExecutor {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seeds: SeedSource::new(seed),
        }
    }
}

#[async_trait]
impl WorkExecutor for InlineExecutor {
    async fn execute(&self, item: WorkItem) -> Result<WorkOutput, WorkError> {
        let name = item.name();
        item.run(self.seeds.next_seed())
            .map_err(|source| WorkError::Failed { item: name, source })
    }
}
