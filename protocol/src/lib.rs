//! JSON messages exchanged with the HTTP front end.
//!
//! Field names are camelCase and the status is the uppercase enum name. A game
//! state is produced from a [`GameState`] through one conversion,
//! [`GameStateMessage::from`], and nothing else inspects it.

use serde::{Deserialize, Serialize};
use sweeper_core::{
    Board, Cell, CellCount, Coord, GameConfig, GameError, GameState, GameStatus, MoveAction,
    MoveRequest,
};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid game configuration")]
    InvalidConfig,
    #[error("Too many mines for the board size")]
    TooManyMines,
    #[error("Invalid move request")]
    InvalidMove,
}

impl From<GameError> for ProtocolError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::TooManyMines => Self::TooManyMines,
            _ => Self::InvalidConfig,
        }
    }
}

macro_rules! json_codec {
    () => {
        pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
            serde_json::from_str(json)
        }

        pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
            serde_json::to_string(self)
        }
    };
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMessage {
    pub is_mine: bool,
    pub is_revealed: bool,
    pub is_flagged: bool,
    pub neighbor_mines: u8,
    pub row: Coord,
    pub col: Coord,
}

impl From<&Cell> for CellMessage {
    fn from(cell: &Cell) -> Self {
        Self {
            is_mine: cell.is_mine,
            is_revealed: cell.is_revealed,
            is_flagged: cell.is_flagged,
            neighbor_mines: cell.neighbor_mines,
            row: cell.row,
            col: cell.col,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMessage {
    pub cells: Vec<Vec<CellMessage>>,
    pub width: Coord,
    pub height: Coord,
    pub mine_count: CellCount,
}

impl From<&Board> for BoardMessage {
    fn from(board: &Board) -> Self {
        Self {
            cells: board
                .rows()
                .map(|row| row.map(CellMessage::from).collect())
                .collect(),
            width: board.width(),
            height: board.height(),
            mine_count: board.mine_count(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateMessage {
    pub id: String,
    pub board: BoardMessage,
    pub status: GameStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub flags_used: CellCount,
    pub cells_revealed: CellCount,
}

impl GameStateMessage {
    json_codec!();
}

/// A state without a board (still initializing) encodes as an empty 0×0 board.
impl From<&GameState> for GameStateMessage {
    fn from(state: &GameState) -> Self {
        Self {
            id: state.id.clone(),
            board: state
                .board
                .as_ref()
                .map(BoardMessage::from)
                .unwrap_or_default(),
            status: state.status,
            start_time: state.start_time,
            end_time: state.end_time,
            flags_used: state.flags_used,
            cells_revealed: state.cells_revealed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfigMessage {
    pub width: i64,
    pub height: i64,
    pub mine_count: i64,
}

impl TryFrom<GameConfigMessage> for GameConfig {
    type Error = ProtocolError;

    fn try_from(msg: GameConfigMessage) -> Result<Self, Self::Error> {
        let width = Coord::try_from(msg.width).map_err(|_| ProtocolError::InvalidConfig)?;
        let height = Coord::try_from(msg.height).map_err(|_| ProtocolError::InvalidConfig)?;
        let mine_count =
            CellCount::try_from(msg.mine_count).map_err(|_| ProtocolError::InvalidConfig)?;
        Ok(GameConfig::new(width, height, mine_count).validate()?)
    }
}

impl From<GameConfig> for GameConfigMessage {
    fn from(config: GameConfig) -> Self {
        Self {
            width: config.width.into(),
            height: config.height.into(),
            mine_count: config.mine_count.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequestMessage {
    pub row: i64,
    pub col: i64,
    pub action: String,
}

impl MoveRequestMessage {
    json_codec!();
}

impl TryFrom<MoveRequestMessage> for MoveRequest {
    type Error = ProtocolError;

    fn try_from(msg: MoveRequestMessage) -> Result<Self, Self::Error> {
        let row = Coord::try_from(msg.row).map_err(|_| ProtocolError::InvalidMove)?;
        let col = Coord::try_from(msg.col).map_err(|_| ProtocolError::InvalidMove)?;
        let action: MoveAction = msg.action.parse().map_err(|_| ProtocolError::InvalidMove)?;
        Ok(MoveRequest::new(row, col, action))
    }
}

impl From<MoveRequest> for MoveRequestMessage {
    fn from(request: MoveRequest) -> Self {
        Self {
            row: request.row.into(),
            col: request.col.into(),
            action: request.action.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub config: GameConfigMessage,
}

impl CreateGameRequest {
    json_codec!();
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartRequest {
    pub config: GameConfigMessage,
}

impl RestartRequest {
    json_codec!();
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResponse {
    pub game_state: GameStateMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GameResponse {
    pub fn new(state: &GameState) -> Self {
        Self {
            game_state: state.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    json_codec!();
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }

    json_codec!();
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl HealthResponse {
    pub fn ok(timestamp: OffsetDateTime) -> Self {
        Self {
            status: "OK".to_owned(),
            timestamp,
        }
    }

    json_codec!();
}
