//! Query input: a FEN position, optional moves, and a search depth.

use std::fmt;

use crate::error::{Result, StockfishError};
use crate::protocol::EngineCommand;

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

/// A position to evaluate.
///
/// Only the side-to-move field of the FEN is interpreted; the board itself
/// is passed through to the engine untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    fen: String,
    moves: Vec<String>,
    depth: u32,
    side_to_move: Color,
}

impl Position {
    /// Create a position from FEN and a search depth.
    ///
    /// # Arguments
    ///
    /// * `fen` - Position in Forsyth-Edwards Notation. Runs of whitespace
    ///   between fields are collapsed.
    /// * `depth` - Search depth in plies, at least 1
    ///
    /// # Example
    ///
    /// ```
    /// use stockfish::{Color, Position};
    ///
    /// let pos = Position::new("8/8/8/4k3/8/8/8/4K3 b - - 0 1", 12)?
    ///     .with_moves(["e5d5"]);
    /// assert_eq!(pos.side_to_move(), Color::White);
    /// # Ok::<(), stockfish::StockfishError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`StockfishError::InvalidPosition`] if the FEN has fewer than
    /// two fields, the side-to-move field is not `w` or `b`, or `depth` is 0.
    pub fn new(fen: &str, depth: u32) -> Result<Self> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(StockfishError::InvalidPosition(format!(
                "FEN needs at least a board and a side to move: {:?}",
                fen
            )));
        }
        let side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(StockfishError::InvalidPosition(format!(
                    "unknown side to move {:?}",
                    other
                )))
            }
        };
        if depth == 0 {
            return Err(StockfishError::InvalidPosition(
                "search depth must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            fen: fields.join(" "),
            moves: Vec::new(),
            depth,
            side_to_move,
        })
    }

    /// Play `moves` (UCI notation) from the FEN before searching.
    pub fn with_moves<I, S>(mut self, moves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.moves.extend(moves.into_iter().map(Into::into));
        self
    }

    /// The normalized FEN, without appended moves.
    pub fn fen(&self) -> &str {
        &self.fen
    }

    /// Moves played from the FEN, in UCI notation.
    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    /// Search depth in plies.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Side to move once all moves have been played.
    pub fn side_to_move(&self) -> Color {
        if self.moves.len() % 2 == 0 {
            self.side_to_move
        } else {
            self.side_to_move.opposite()
        }
    }

    /// The `position` command for this query.
    pub fn position_command(&self) -> EngineCommand {
        EngineCommand::Position {
            fen: self.fen.clone(),
            moves: self.moves.clone(),
        }
    }

    /// The `go` command for this query.
    pub fn go_command(&self) -> EngineCommand {
        EngineCommand::Go { depth: self.depth }
    }
}
