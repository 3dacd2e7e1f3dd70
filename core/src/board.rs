use std::collections::VecDeque;
use std::ops::Index;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::*;

/// The grid of cells for one game. Replaced wholesale on restart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    cells: Array2<Cell>,
    mine_count: CellCount,
}

impl Board {
    /// A board of `(height, width)` blank cells with no mines.
    pub fn blank((height, width): Coord2) -> Self {
        let cells = Array2::from_shape_fn([height.into(), width.into()], |(row, col)| {
            // both indices come from `Coord` ranges
            Cell::new(row as Coord, col as Coord)
        });
        Self {
            cells,
            mine_count: 0,
        }
    }

    pub fn from_mine_coords(size: Coord2, mine_coords: &[Coord2]) -> Result<Self> {
        let mut board = Self::blank(size);
        for &coords in mine_coords {
            board.validate_coords(coords)?;
        }
        board.place_mines(mine_coords.iter().copied());
        Ok(board)
    }

    /// Marks the given positions as mines and recomputes every neighbour count.
    /// Duplicate positions are counted once.
    pub(crate) fn place_mines(&mut self, positions: impl IntoIterator<Item = Coord2>) {
        for coords in positions {
            self.cells[coords.to_nd_index()].is_mine = true;
        }
        self.mine_count = self
            .cells
            .iter()
            .filter(|cell| cell.is_mine)
            .count()
            .try_into()
            .unwrap_or(CellCount::MAX);

        let size = self.size();
        for row in 0..size.0 {
            for col in 0..size.1 {
                let coords = (row, col);
                if self[coords].is_mine {
                    continue;
                }
                let count = NeighborIter::new(coords, size)
                    .filter(|&pos| self[pos].is_mine)
                    .count();
                // at most eight neighbours
                self.cells[coords.to_nd_index()].neighbor_mines = count as u8;
            }
        }
    }

    /// `(height, width)`.
    pub fn size(&self) -> Coord2 {
        let (height, width) = self.cells.dim();
        (height as Coord, width as Coord)
    }

    pub fn width(&self) -> Coord {
        self.size().1
    }

    pub fn height(&self) -> Coord {
        self.size().0
    }

    pub fn mine_count(&self) -> CellCount {
        self.mine_count
    }

    pub fn total_cells(&self) -> CellCount {
        let (height, width) = self.size();
        mult(height, width)
    }

    pub fn safe_cell_count(&self) -> CellCount {
        self.total_cells().saturating_sub(self.mine_count)
    }

    pub fn contains(&self, (row, col): Coord2) -> bool {
        let (height, width) = self.size();
        row < height && col < width
    }

    pub fn validate_coords(&self, coords: Coord2) -> Result<Coord2> {
        if self.contains(coords) {
            Ok(coords)
        } else {
            Err(GameError::InvalidCoords)
        }
    }

    pub fn cell(&self, coords: Coord2) -> Option<&Cell> {
        self.contains(coords).then(|| &self[coords])
    }

    pub fn cells(&self) -> &Array2<Cell> {
        &self.cells
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Cells row by row, for row-major serialization.
    pub fn rows(&self) -> impl Iterator<Item = impl Iterator<Item = &Cell>> {
        self.cells.rows().into_iter().map(|row| row.into_iter())
    }

    pub fn iter_neighbors(&self, coords: Coord2) -> NeighborIter {
        NeighborIter::new(coords, self.size())
    }

    pub fn revealed_count(&self) -> CellCount {
        self.count_where(|cell| cell.is_revealed)
    }

    pub fn flagged_count(&self) -> CellCount {
        self.count_where(|cell| cell.is_flagged)
    }

    fn count_where(&self, predicate: impl Fn(&Cell) -> bool) -> CellCount {
        self.cells
            .iter()
            .filter(|cell| predicate(cell))
            .count()
            .try_into()
            .unwrap_or(CellCount::MAX)
    }

    pub(crate) fn cell_mut(&mut self, coords: Coord2) -> &mut Cell {
        &mut self.cells[coords.to_nd_index()]
    }

    pub(crate) fn reveal_all_mines(&mut self) {
        for cell in self.cells.iter_mut().filter(|cell| cell.is_mine) {
            cell.is_revealed = true;
        }
    }

    /// Opens `start` and, through zero-count cells, everything reachable from it.
    /// Flagged cells and mines are never opened. Returns the number of newly
    /// revealed cells.
    pub(crate) fn flood_reveal(&mut self, start: Coord2) -> CellCount {
        let size = self.size();
        let mut revealed = 0;
        let mut to_visit = VecDeque::from([start]);

        while let Some(coords) = to_visit.pop_front() {
            let cell = &mut self.cells[coords.to_nd_index()];
            if !cell.is_cascade_target() {
                continue;
            }

            cell.is_revealed = true;
            revealed += 1;

            if cell.neighbor_mines == 0 {
                to_visit.extend(
                    NeighborIter::new(coords, size).filter(|&pos| self[pos].is_cascade_target()),
                );
            }
        }

        revealed
    }
}

impl Index<Coord2> for Board {
    type Output = Cell;

    fn index(&self, coords: Coord2) -> &Self::Output {
        &self.cells[coords.to_nd_index()]
    }
}
