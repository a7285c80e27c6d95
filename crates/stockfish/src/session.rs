//! The UCI conversation for fixed-depth evaluation.
//!
//! A [`Session`] drives one engine over any [`LineChannel`]: it performs the
//! `uci`/`isready` handshake, then answers evaluation queries by sending
//! `position` and `go depth`, remembering the last scored `info depth` line,
//! and stopping at the `bestmove` that follows it. Static evaluations send
//! `eval` instead and read its `Final evaluation` line.
//!
//! A session is not internally synchronized. The protocol has no request ids,
//! so callers sharing an engine must serialize whole queries, as
//! [`Stockfish`](crate::Stockfish) does.

use std::time::{Duration, Instant};

use crate::config::StockfishConfig;
use crate::error::{Result, StockfishError};
use crate::position::{Color, Position};
use crate::process::LineChannel;
use crate::protocol::{self, EngineCommand, EngineLine};
use crate::score::{self, Evaluation};

/// Protocol settings for a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Upper bound on the handshake and on each query.
    pub timeout: Duration,
    /// Clear engine state before each query.
    pub reset_between_queries: bool,
    /// Log each query's engine transcript at info level.
    pub verbose: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&StockfishConfig::default())
    }
}

impl From<&StockfishConfig> for SessionOptions {
    fn from(config: &StockfishConfig) -> Self {
        Self {
            timeout: config.timeout(),
            reset_between_queries: config.reset_between_queries,
            verbose: config.verbose,
        }
    }
}

/// A point in time after which reads fail with [`StockfishError::Timeout`].
struct Deadline {
    /// `None` when the budget reaches past the representable future.
    end: Option<Instant>,
    budget: Duration,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self {
            end: Instant::now().checked_add(budget),
            budget,
        }
    }

    fn remaining(&self) -> Result<Duration> {
        let end = match self.end {
            Some(end) => end,
            None => return Ok(self.budget),
        };
        let left = end.saturating_duration_since(Instant::now());
        if left.is_zero() {
            Err(StockfishError::Timeout(self.budget))
        } else {
            Ok(left)
        }
    }
}

/// A UCI conversation with one engine.
pub struct Session<C: LineChannel> {
    channel: C,
    options: SessionOptions,
    engine_name: Option<String>,
}

impl<C: LineChannel> Session<C> {
    /// Wrap `channel`. Nothing is sent until [`handshake`](Self::handshake).
    pub fn new(channel: C, options: SessionOptions) -> Self {
        Self {
            channel,
            options,
            engine_name: None,
        }
    }

    /// Name from the engine's `id name` line, once the handshake has run.
    pub fn engine_name(&self) -> Option<&str> {
        self.engine_name.as_deref()
    }

    /// The protocol settings this session was created with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The underlying line channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Send `uci` and `isready`, then discard output up to `readyok`.
    ///
    /// # Errors
    ///
    /// Returns [`StockfishError::Handshake`] if the engine closes its output
    /// before `readyok`, or [`StockfishError::Timeout`] if it takes too long.
    pub fn handshake(&mut self) -> Result<()> {
        let deadline = Deadline::after(self.options.timeout);
        self.send(EngineCommand::Uci)?;
        self.send(EngineCommand::IsReady)?;

        loop {
            let line = match self.read(&deadline) {
                Ok(line) => line,
                Err(StockfishError::Eof) => {
                    return Err(StockfishError::Handshake(
                        "engine closed its output before readyok".to_string(),
                    ))
                }
                Err(e) => return Err(e),
            };
            if let Some(name) = protocol::engine_name(&line) {
                self.engine_name = Some(name.to_string());
            }
            if EngineLine::classify(&line) == EngineLine::ReadyOk {
                break;
            }
        }

        tracing::debug!(
            "Handshake complete with {}",
            self.engine_name.as_deref().unwrap_or("unnamed engine")
        );
        Ok(())
    }

    /// Ask the engine to search with `count` threads. No reply is awaited.
    pub fn set_threads(&mut self, count: usize) -> Result<()> {
        if self.options.verbose {
            tracing::info!("Using {} CPU threads", count);
        }
        self.send(EngineCommand::threads(count))
    }

    /// Evaluate `position`, reporting the score from White's point of view.
    ///
    /// # Errors
    ///
    /// - [`StockfishError::Closed`] if the channel has been closed
    /// - [`StockfishError::NoEvaluation`] if the output ends without any
    ///   scored `info depth` line
    /// - [`StockfishError::Parse`] if the last such line has no usable score
    /// - [`StockfishError::Timeout`] if `bestmove` does not arrive in time
    pub fn evaluate(&mut self, position: &Position) -> Result<Evaluation> {
        if self.channel.is_closed() {
            return Err(StockfishError::Closed);
        }
        let deadline = Deadline::after(self.options.timeout);

        if self.options.reset_between_queries {
            self.reset(&deadline)?;
        }

        self.send(position.position_command())?;
        self.send(position.go_command())?;

        let mut candidate: Option<String> = None;
        let mut transcript = Vec::new();
        loop {
            let line = match self.read(&deadline) {
                Ok(line) => line,
                Err(StockfishError::Eof) if candidate.is_none() => {
                    return Err(StockfishError::NoEvaluation)
                }
                Err(e) => return Err(e),
            };
            let kind = EngineLine::classify(&line);
            if self.options.verbose {
                transcript.push(line.clone());
            }
            match kind {
                EngineLine::Info { .. } => candidate = Some(line),
                EngineLine::BestMove { .. } if candidate.is_some() => break,
                EngineLine::BestMove { mv, .. } => {
                    tracing::warn!("Ignoring bestmove {} before any scored info line", mv);
                }
                EngineLine::ReadyOk | EngineLine::FinalEvaluation | EngineLine::Unrecognized => {}
            }
        }

        self.log_transcript(position, &transcript);

        let line = candidate.ok_or(StockfishError::NoEvaluation)?;
        let raw = score::extract(&line)?;
        let evaluation = match position.side_to_move() {
            Color::White => raw,
            Color::Black => raw.negated(),
        };
        tracing::debug!("Evaluated {} at depth {}: {}", position.fen(), position.depth(), evaluation);
        Ok(evaluation)
    }

    /// Static evaluation of `position` in pawns, from White's point of view.
    ///
    /// Sends `position` and `eval` and reads up to the `Final evaluation`
    /// line. No search is run, so the position's depth is not used.
    ///
    /// # Errors
    ///
    /// - [`StockfishError::Closed`] if the channel has been closed
    /// - [`StockfishError::NoEvaluation`] if the output ends without a
    ///   `Final evaluation` line, or the side to move is in check
    /// - [`StockfishError::Parse`] if the value cannot be read
    /// - [`StockfishError::Timeout`] if the line does not arrive in time
    pub fn static_evaluate(&mut self, position: &Position) -> Result<f64> {
        if self.channel.is_closed() {
            return Err(StockfishError::Closed);
        }
        let deadline = Deadline::after(self.options.timeout);

        if self.options.reset_between_queries {
            self.reset(&deadline)?;
        }

        self.send(position.position_command())?;
        self.send(EngineCommand::Eval)?;

        let mut transcript = Vec::new();
        let line = loop {
            let line = match self.read(&deadline) {
                Ok(line) => line,
                Err(StockfishError::Eof) => return Err(StockfishError::NoEvaluation),
                Err(e) => return Err(e),
            };
            if self.options.verbose {
                transcript.push(line.clone());
            }
            if EngineLine::classify(&line) == EngineLine::FinalEvaluation {
                break line;
            }
        };

        self.log_transcript(position, &transcript);

        let pawns = score::extract_static(&line)?;
        tracing::debug!("Static evaluation of {}: {:+.2}", position.fen(), pawns);
        Ok(pawns)
    }

    /// Shut down the underlying channel.
    pub fn close(&mut self) -> Result<()> {
        self.channel.close()
    }

    /// `ucinewgame` + `isready`, then wait for `readyok`.
    fn reset(&mut self, deadline: &Deadline) -> Result<()> {
        self.send(EngineCommand::UciNewGame)?;
        self.send(EngineCommand::IsReady)?;
        loop {
            let line = self.read(deadline)?;
            if EngineLine::classify(&line) == EngineLine::ReadyOk {
                return Ok(());
            }
        }
    }

    fn log_transcript(&self, position: &Position, transcript: &[String]) {
        if self.options.verbose {
            tracing::info!(
                "Engine output for {}:\n{}",
                position.fen(),
                transcript.join("\n")
            );
        }
    }

    fn send(&mut self, command: EngineCommand) -> Result<()> {
        self.channel.write_line(&command.to_string())
    }

    fn read(&mut self, deadline: &Deadline) -> Result<String> {
        let remaining = deadline.remaining()?;
        match self.channel.read_line(remaining) {
            Err(StockfishError::Timeout(_)) => Err(StockfishError::Timeout(deadline.budget)),
            other => other,
        }
    }
}
