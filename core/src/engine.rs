//! Move resolution.
//!
//! Every function here takes a committed snapshot by reference and hands back a
//! new one. No-op moves return a clone equal to the input; errors mean the
//! request never described a cell of this board.

use smallvec::SmallVec;
use time::OffsetDateTime;

use crate::*;

/// Opens a cell. Hitting a mine loses and exposes every mine; otherwise the
/// zero-count region around the cell cascades open.
pub fn reveal(state: &GameState, coords: Coord2, now: OffsetDateTime) -> Result<GameState> {
    let board = state.board()?;
    let coords = board.validate_coords(coords)?;

    if !board[coords].is_hidden() {
        return Ok(state.clone());
    }

    let mut next = state.clone();
    let outcome = reveal_cell(board_mut(&mut next)?, coords);
    settle(&mut next, outcome, now);
    Ok(next)
}

/// Flips the flag on a hidden cell. Serves both `flag` and `unflag`.
pub fn toggle_flag(state: &GameState, coords: Coord2) -> Result<GameState> {
    let board = state.board()?;
    let coords = board.validate_coords(coords)?;

    if board[coords].is_revealed {
        return Ok(state.clone());
    }

    let mut next = state.clone();
    let board = board_mut(&mut next)?;
    let cell = board.cell_mut(coords);
    cell.is_flagged = !cell.is_flagged;
    let flags_used = board.flagged_count();
    next.flags_used = flags_used;
    Ok(next)
}

/// Opens every hidden neighbour of a numbered cell whose flag count is satisfied.
pub fn chord_reveal(state: &GameState, coords: Coord2, now: OffsetDateTime) -> Result<GameState> {
    let board = state.board()?;
    let coords = board.validate_coords(coords)?;
    let cell = board[coords];

    if !cell.is_revealed || cell.is_mine || cell.neighbor_mines == 0 {
        return Ok(state.clone());
    }

    let mut flagged = 0;
    let mut targets: SmallVec<[Coord2; 8]> = SmallVec::new();
    for pos in board.iter_neighbors(coords) {
        let neighbor = board[pos];
        if neighbor.is_flagged {
            flagged += 1;
        } else if !neighbor.is_revealed {
            targets.push(pos);
        }
    }

    if flagged != cell.neighbor_mines {
        return Ok(state.clone());
    }

    let mut next = state.clone();
    let board = board_mut(&mut next)?;
    let outcome = targets
        .into_iter()
        .map(|pos| reveal_cell(board, pos))
        .reduce(core::ops::BitOr::bitor)
        .unwrap_or(RevealOutcome::NoChange);
    settle(&mut next, outcome, now);
    Ok(next)
}

/// Dispatches a move request to the matching resolver.
pub fn apply_move(state: &GameState, request: MoveRequest, now: OffsetDateTime) -> Result<GameState> {
    use MoveAction::*;

    match request.action {
        Reveal => reveal(state, request.coords(), now),
        Flag | Unflag => toggle_flag(state, request.coords()),
        Chord => chord_reveal(state, request.coords(), now),
    }
}

fn board_mut(state: &mut GameState) -> Result<&mut Board> {
    state.board.as_mut().ok_or(GameError::BoardNotReady)
}

fn reveal_cell(board: &mut Board, coords: Coord2) -> RevealOutcome {
    let cell = board[coords];

    if !cell.is_hidden() {
        RevealOutcome::NoChange
    } else if cell.is_mine {
        board.cell_mut(coords).is_revealed = true;
        RevealOutcome::HitMine
    } else if board.flood_reveal(coords) > 0 {
        RevealOutcome::Revealed
    } else {
        RevealOutcome::NoChange
    }
}

fn settle(state: &mut GameState, outcome: RevealOutcome, now: OffsetDateTime) {
    let Some(board) = state.board.as_mut() else {
        return;
    };

    if outcome == RevealOutcome::HitMine {
        board.reveal_all_mines();
        state.finish(false, now);
        return;
    }

    let revealed = board.revealed_count();
    let won = revealed == board.safe_cell_count();
    state.cells_revealed = revealed;
    if won {
        state.finish(true, now);
    }
}
