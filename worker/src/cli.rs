//! Line commands understood by the `sweeper` binary, and a plain-text board view.

use std::fmt::Write as _;
use std::str::FromStr;

use sweeper_core::{Cell, GameConfig, GameState, MoveAction, MoveRequest};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("{0:?} is not a valid number")]
    NotANumber(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LineCommand {
    Move(MoveRequest),
    /// Without a config the current dimensions are reused.
    Restart(Option<GameConfig>),
    Close,
    Show,
    Json,
    Quit,
}

impl FromStr for LineCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ParseError::Empty);
        };
        let rest: Vec<&str> = words.collect();

        let bare = |command| {
            if rest.is_empty() {
                Ok(command)
            } else {
                Err(ParseError::Usage("close | show | json | quit take no arguments"))
            }
        };

        match head {
            "close" => bare(Self::Close),
            "show" => bare(Self::Show),
            "json" => bare(Self::Json),
            "quit" | "exit" => bare(Self::Quit),
            "restart" => match rest.as_slice() {
                [] => Ok(Self::Restart(None)),
                [width, height, mines] => Ok(Self::Restart(Some(GameConfig::new(
                    number(width)?,
                    number(height)?,
                    number(mines)?,
                )))),
                _ => Err(ParseError::Usage("restart [width height mines]")),
            },
            _ => {
                let action: MoveAction = head
                    .parse()
                    .map_err(|_| ParseError::Unknown(head.to_owned()))?;
                match rest.as_slice() {
                    [row, col] => Ok(Self::Move(MoveRequest::new(number(row)?, number(col)?, action))),
                    _ => Err(ParseError::Usage("reveal|flag|unflag|chord row col")),
                }
            }
        }
    }
}

fn number<T: FromStr>(word: &str) -> Result<T, ParseError> {
    word.parse()
        .map_err(|_| ParseError::NotANumber(word.to_owned()))
}

fn glyph(cell: &Cell) -> char {
    if cell.is_flagged {
        'F'
    } else if !cell.is_revealed {
        '#'
    } else if cell.is_mine {
        '*'
    } else if cell.neighbor_mines == 0 {
        '.'
    } else {
        char::from(b'0' + cell.neighbor_mines)
    }
}

/// Status line followed by one text row per board row.
pub fn render(state: &GameState) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} flags={} revealed={}",
        state.id, state.status, state.flags_used, state.cells_revealed
    );
    match &state.board {
        Some(board) => {
            for row in board.rows() {
                out.extend(row.map(glyph));
                out.push('\n');
            }
        }
        None => out.push_str("(board not generated yet)\n"),
    }
    out
}
