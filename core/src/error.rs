use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Invalid coordinates")]
    InvalidCoords,
    #[error("Board dimensions must be positive")]
    InvalidDimensions,
    #[error("Too many mines for the board size")]
    TooManyMines,
    #[error("Board has not been generated yet")]
    BoardNotReady,
}

pub type Result<T> = core::result::Result<T, GameError>;
