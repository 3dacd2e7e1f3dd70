use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use super::*;

/// Uniform placement: shuffles every position of the grid and mines the prefix.
#[derive(Clone, Debug, PartialEq)]
pub struct RandomBoardGenerator {
    seed: u64,
}

impl RandomBoardGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl BoardGenerator for RandomBoardGenerator {
    fn generate(self, config: GameConfig) -> Board {
        let size = config.size();
        let total_cells = config.total_cells();

        if config.mine_count > total_cells {
            log::warn!(
                "Minefield already full, generated anyway, requested {} but only fits {}",
                config.mine_count,
                total_cells
            );
        }
        let mines = config.mine_count.min(total_cells) as usize;

        let (height, width) = size;
        let mut positions: Vec<Coord2> = (0..height)
            .flat_map(|row| (0..width).map(move |col| (row, col)))
            .collect();

        let mut rng = SmallRng::seed_from_u64(self.seed);
        positions.shuffle(&mut rng);

        let mut board = Board::blank(size);
        board.place_mines(positions[..mines].iter().copied());

        // double check mine count
        if board.mine_count() as usize != mines {
            log::warn!(
                "Generated board count mismatch, actual: {}, requested: {}",
                board.mine_count(),
                mines
            );
        }
        board
    }
}
