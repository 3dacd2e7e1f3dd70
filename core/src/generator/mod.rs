use crate::*;
pub use random::*;

mod random;

/// Produces a fresh board for a configuration.
pub trait BoardGenerator {
    fn generate(self, config: GameConfig) -> Board;
}
