use core::ops::BitOr;
use serde::{Deserialize, Serialize};

pub use board::*;
pub use cell::*;
pub use engine::*;
pub use error::*;
pub use generator::*;
pub use state::*;
pub use types::*;

mod board;
mod cell;
mod engine;
mod error;
mod generator;
mod state;
mod types;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub width: Coord,
    pub height: Coord,
    pub mine_count: CellCount,
}

impl GameConfig {
    pub const fn new(width: Coord, height: Coord, mine_count: CellCount) -> Self {
        Self {
            width,
            height,
            mine_count,
        }
    }

    pub const fn beginner() -> Self {
        Self::new(9, 9, 10)
    }

    pub const fn intermediate() -> Self {
        Self::new(16, 16, 40)
    }

    pub const fn expert() -> Self {
        Self::new(30, 16, 99)
    }

    /// `(height, width)`, matching board coordinates.
    pub const fn size(&self) -> Coord2 {
        (self.height, self.width)
    }

    pub const fn total_cells(&self) -> CellCount {
        mult(self.width, self.height)
    }

    /// Rejects configurations that a caller should never submit: empty boards
    /// and boards with no safe cell. Generation itself only caps.
    pub fn validate(self) -> Result<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(GameError::InvalidDimensions);
        }
        if self.mine_count >= self.total_cells() {
            return Err(GameError::TooManyMines);
        }
        Ok(self)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::beginner()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum RevealOutcome {
    NoChange,
    Revealed,
    HitMine,
}

impl BitOr for RevealOutcome {
    type Output = RevealOutcome;

    fn bitor(self, rhs: Self) -> Self::Output {
        use RevealOutcome::*;
        match (self, rhs) {
            (HitMine, _) => HitMine,
            (_, HitMine) => HitMine,
            (Revealed, _) => Revealed,
            (_, Revealed) => Revealed,
            (NoChange, NoChange) => NoChange,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_and_full_boards() {
        assert_eq!(
            GameConfig::new(0, 5, 1).validate(),
            Err(GameError::InvalidDimensions)
        );
        assert_eq!(
            GameConfig::new(3, 3, 9).validate(),
            Err(GameError::TooManyMines)
        );
        assert_eq!(
            GameConfig::new(3, 3, 8).validate(),
            Ok(GameConfig::new(3, 3, 8))
        );
    }

    #[test]
    fn hit_mine_dominates_outcomes() {
        use RevealOutcome::*;
        assert_eq!(Revealed | HitMine | NoChange, HitMine);
        assert_eq!(NoChange | Revealed, Revealed);
        assert_eq!(NoChange | NoChange, NoChange);
    }
}
