use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::*;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    #[default]
    NotStarted,
    InProgress,
    Won,
    Lost,
    Closed,
}

impl GameStatus {
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }

    /// No further gameplay moves are applied.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost | Self::Closed)
    }

    pub const fn as_str(self) -> &'static str {
        use GameStatus::*;
        match self {
            NotStarted => "NOT_STARTED",
            InProgress => "IN_PROGRESS",
            Won => "WON",
            Lost => "LOST",
            Closed => "CLOSED",
        }
    }
}


impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one game. Sessions never mutate a committed value in place; every
/// transition builds a new one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub id: String,
    /// `None` only while the first board is still being generated.
    pub board: Option<Board>,
    pub status: GameStatus,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub flags_used: CellCount,
    pub cells_revealed: CellCount,
}

impl GameState {
    pub fn new(id: impl Into<String>, board: Board) -> Self {
        Self {
            id: id.into(),
            board: Some(board),
            status: GameStatus::NotStarted,
            start_time: None,
            end_time: None,
            flags_used: 0,
            cells_revealed: 0,
        }
    }

    /// What a session reports before its first board exists.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            board: None,
            status: GameStatus::NotStarted,
            start_time: None,
            end_time: None,
            flags_used: 0,
            cells_revealed: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.board.is_some()
    }

    pub fn board(&self) -> Result<&Board> {
        self.board.as_ref().ok_or(GameError::BoardNotReady)
    }

    /// NOT_STARTED → IN_PROGRESS, stamping the start time. Any other status is left alone.
    pub fn begin(&mut self, now: OffsetDateTime) {
        if self.status == GameStatus::NotStarted {
            self.status = GameStatus::InProgress;
            self.start_time = Some(now);
        }
    }

    pub fn close(&mut self, now: OffsetDateTime) {
        if self.status != GameStatus::Closed {
            self.status = GameStatus::Closed;
            self.end_time = Some(now);
        }
    }

    pub(crate) fn finish(&mut self, won: bool, now: OffsetDateTime) {
        self.status = if won { GameStatus::Won } else { GameStatus::Lost };
        self.end_time = Some(now);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveAction {
    Reveal,
    Flag,
    Unflag,
    Chord,
}

impl MoveAction {
    pub const fn as_str(self) -> &'static str {
        use MoveAction::*;
        match self {
            Reveal => "reveal",
            Flag => "flag",
            Unflag => "unflag",
            Chord => "chord",
        }
    }
}

impl fmt::Display for MoveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownAction;

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown move action")
    }
}

impl core::error::Error for UnknownAction {}

impl FromStr for MoveAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        use MoveAction::*;
        match s {
            "reveal" => Ok(Reveal),
            "flag" => Ok(Flag),
            "unflag" => Ok(Unflag),
            "chord" => Ok(Chord),
            _ => Err(UnknownAction),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub row: Coord,
    pub col: Coord,
    pub action: MoveAction,
}

impl MoveRequest {
    pub const fn new(row: Coord, col: Coord, action: MoveAction) -> Self {
        Self { row, col, action }
    }

    pub const fn reveal(row: Coord, col: Coord) -> Self {
        Self::new(row, col, MoveAction::Reveal)
    }

    pub const fn flag(row: Coord, col: Coord) -> Self {
        Self::new(row, col, MoveAction::Flag)
    }

    pub const fn chord(row: Coord, col: Coord) -> Self {
        Self::new(row, col, MoveAction::Chord)
    }

    pub const fn coords(&self) -> Coord2 {
        (self.row, self.col)
    }
}
