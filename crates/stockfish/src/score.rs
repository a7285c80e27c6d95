//! Position evaluation types and score extraction from UCI info lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;

use crate::error::{Result, StockfishError};

/// Represents a chess position evaluation.
///
/// Exactly one of a forced mate distance or a centipawn score. When returned
/// from [`Stockfish::evaluate`](crate::Stockfish::evaluate) the sign is always
/// from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluation {
    /// Mate in N plies (positive = white mates, negative = black mates,
    /// 0 = the side to move is already checkmated)
    Mate(i32),
    /// Centipawn evaluation (positive = white advantage)
    Centipawns(i32),
}

impl Evaluation {
    /// Returns true if this is a forced-mate score.
    pub fn is_mate(&self) -> bool {
        matches!(self, Evaluation::Mate(_))
    }

    /// The mate distance, if this is a mate score.
    pub fn mate(&self) -> Option<i32> {
        match *self {
            Evaluation::Mate(n) => Some(n),
            Evaluation::Centipawns(_) => None,
        }
    }

    /// The centipawn value, if this is a centipawn score.
    pub fn centipawns(&self) -> Option<i32> {
        match *self {
            Evaluation::Centipawns(cp) => Some(cp),
            Evaluation::Mate(_) => None,
        }
    }

    /// The same evaluation seen from the other side.
    pub fn negated(self) -> Self {
        match self {
            Evaluation::Mate(n) => Evaluation::Mate(n.saturating_neg()),
            Evaluation::Centipawns(cp) => Evaluation::Centipawns(cp.saturating_neg()),
        }
    }
}

impl Neg for Evaluation {
    type Output = Evaluation;

    fn neg(self) -> Self::Output {
        self.negated()
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Evaluation::Mate(n) => write!(f, "#{}", n),
            Evaluation::Centipawns(cp) => {
                let sign = if cp < 0 { '-' } else { '+' };
                let abs = cp.unsigned_abs();
                write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
            }
        }
    }
}

/// Extract the score carried by a UCI info line.
///
/// Looks for `score mate <n>` first, then `score cp <n>`. Other fields may
/// appear before or after the score, and bound markers such as `lowerbound`
/// are ignored. The value is returned exactly as the engine printed it,
/// relative to the side to move.
///
/// # Errors
///
/// Returns [`StockfishError::Parse`] if neither score form is present or the
/// number following it is not a valid integer.
pub fn extract(line: &str) -> Result<Evaluation> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    if let Some(value) = score_value(&tokens, "mate") {
        let n = parse_int(value, line)?;
        return Ok(Evaluation::Mate(n));
    }
    if let Some(value) = score_value(&tokens, "cp") {
        let cp = parse_int(value, line)?;
        return Ok(Evaluation::Centipawns(cp));
    }

    Err(StockfishError::Parse(line.to_string()))
}

/// Extract the value of a `Final evaluation` line printed by `eval`.
///
/// The value is in pawns from White's point of view, for example `+0.35`.
/// Trailing annotations such as `(white side)` are ignored.
///
/// # Errors
///
/// - [`StockfishError::NoEvaluation`] if the engine printed `none`, which
///   it does when the side to move is in check
/// - [`StockfishError::Parse`] if the line has no finite number after the label
pub fn extract_static(line: &str) -> Result<f64> {
    let mut tokens = line.split_whitespace();
    let labelled = tokens.next() == Some("Final")
        && matches!(tokens.next(), Some("evaluation") | Some("evaluation:"));
    if !labelled {
        return Err(StockfishError::Parse(line.to_string()));
    }

    match tokens.next() {
        Some("none") => Err(StockfishError::NoEvaluation),
        Some(value) => value
            .parse::<f64>()
            .ok()
            .filter(|pawns| pawns.is_finite())
            .ok_or_else(|| StockfishError::Parse(line.to_string())),
        None => Err(StockfishError::Parse(line.to_string())),
    }
}

/// Find the token following `score <kind>`.
fn score_value<'a>(tokens: &[&'a str], kind: &str) -> Option<&'a str> {
    tokens
        .windows(3)
        .find(|w| w[0] == "score" && w[1] == kind)
        .map(|w| w[2])
}

fn parse_int(value: &str, line: &str) -> Result<i32> {
    value
        .parse()
        .map_err(|e| StockfishError::Parse(format!("{} ({}: {:?})", line, e, value)))
}
