//! UCI commands sent to the engine and classification of its output lines.
//!
//! Only the small part of the protocol needed for fixed-depth evaluation is
//! modelled:
//!
//! - `uci` / `id name <name>` - identification
//! - `isready` / `readyok` - synchronization
//! - `setoption name <name> value <value>` - tuning
//! - `ucinewgame` - clear search state
//! - `position fen <fen> [moves <move>...]` - set position
//! - `go depth <d>` / `info depth ...` / `bestmove <move>` - search
//! - `eval` / `Final evaluation <pawns>` - static evaluation (a Stockfish
//!   extension, not part of UCI proper)

use std::fmt;

/// Commands sent from the host to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Enter UCI mode and identify.
    Uci,
    /// Synchronize; the engine answers `readyok`.
    IsReady,
    /// Set an engine option.
    SetOption { name: String, value: String },
    /// Discard state from previous searches.
    UciNewGame,
    /// Set up a position from FEN plus optional moves.
    Position { fen: String, moves: Vec<String> },
    /// Search to a fixed depth.
    Go { depth: u32 },
    /// Print the static evaluation of the current position.
    Eval,
}

impl EngineCommand {
    /// `setoption name Threads value <n>`.
    pub fn threads(count: usize) -> Self {
        EngineCommand::SetOption {
            name: "Threads".to_string(),
            value: count.to_string(),
        }
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::Uci => write!(f, "uci"),
            EngineCommand::IsReady => write!(f, "isready"),
            EngineCommand::SetOption { name, value } => {
                write!(f, "setoption name {} value {}", name, value)
            }
            EngineCommand::UciNewGame => write!(f, "ucinewgame"),
            EngineCommand::Position { fen, moves } => {
                write!(f, "position fen {}", fen)?;
                if !moves.is_empty() {
                    write!(f, " moves {}", moves.join(" "))?;
                }
                Ok(())
            }
            EngineCommand::Go { depth } => write!(f, "go depth {}", depth),
            EngineCommand::Eval => write!(f, "eval"),
        }
    }
}

/// A single line of engine output, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine {
    /// An `info` line carrying both a search depth and a score.
    Info { depth: u32 },
    /// End of search.
    BestMove { mv: String, ponder: Option<String> },
    /// Answer to `isready`.
    ReadyOk,
    /// The closing `Final evaluation` line of an `eval` report.
    FinalEvaluation,
    /// Anything else: banners, `id`, `option`, `info string`, `currmove`
    /// progress lines.
    Unrecognized,
}

impl EngineLine {
    /// Classify a raw output line.
    pub fn classify(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("readyok") if tokens.next().is_none() => EngineLine::ReadyOk,
            Some("bestmove") => match tokens.next() {
                Some(mv) => {
                    let ponder = match (tokens.next(), tokens.next()) {
                        (Some("ponder"), Some(p)) => Some(p.to_string()),
                        _ => None,
                    };
                    EngineLine::BestMove {
                        mv: mv.to_string(),
                        ponder,
                    }
                }
                None => EngineLine::Unrecognized,
            },
            Some("Final") => match tokens.next() {
                Some("evaluation") | Some("evaluation:") => EngineLine::FinalEvaluation,
                _ => EngineLine::Unrecognized,
            },
            Some("info") => {
                if tokens.next() != Some("depth") {
                    return EngineLine::Unrecognized;
                }
                let depth = match tokens.next().and_then(|d| d.parse().ok()) {
                    Some(d) => d,
                    None => return EngineLine::Unrecognized,
                };
                if tokens.any(|t| t == "score") {
                    EngineLine::Info { depth }
                } else {
                    EngineLine::Unrecognized
                }
            }
            _ => EngineLine::Unrecognized,
        }
    }
}

/// Extract the engine name from an `id name <name>` line.
pub fn engine_name(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("id name ")
        .map(str::trim)
        .filter(|name| !name.is_empty())
}
