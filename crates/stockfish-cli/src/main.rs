//! stockfish-eval - Evaluate a chess position with Stockfish.
//!
//! Prints the evaluation, from White's point of view, as JSON: a search
//! score by default, or the engine's static evaluation with `--static`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use stockfish::{Position, Stockfish, StockfishConfig};

/// Evaluate a FEN position with Stockfish.
#[derive(Parser, Debug)]
#[command(name = "stockfish-eval")]
#[command(about = "Evaluate a chess position with Stockfish")]
struct Cli {
    /// Position in Forsyth-Edwards Notation
    fen: String,

    /// Search depth in plies
    #[arg(short, long, default_value = "10")]
    depth: u32,

    /// Moves to play from the position, in UCI notation (e2e4 e7e5 ...)
    #[arg(short, long, num_args = 1..)]
    moves: Vec<String>,

    /// Configuration file
    #[arg(short, long, default_value = "stockfish.toml")]
    config: PathBuf,

    /// Engine executable to use instead of the bundled binary
    #[arg(short, long)]
    engine: Option<PathBuf>,

    /// Engine search threads
    #[arg(short, long)]
    threads: Option<usize>,

    /// Timeout in seconds for the handshake and the search
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the static evaluation in pawns instead of searching
    #[arg(short = 's', long = "static")]
    static_eval: bool,

    /// Log the engine conversation to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// File configuration with command-line overrides applied.
    fn session_config(&self) -> anyhow::Result<StockfishConfig> {
        let mut config = StockfishConfig::load_or_default(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if self.verbose {
            config = config.with_verbose(true);
        }
        if let Some(engine) = &self.engine {
            config = config.with_engine_path(engine);
        }
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.session_config()?;
    let position = Position::new(&cli.fen, cli.depth)?.with_moves(cli.moves.iter().cloned());

    let engine = Stockfish::new(config)?;
    engine.start().context("starting engine")?;
    let result = if cli.static_eval {
        engine
            .static_evaluation_position(&position)
            .map(|pawns| serde_json::json!({ "pawns": pawns }))
    } else {
        engine
            .evaluate_position(&position)
            .map(|eval| serde_json::json!(eval))
    };
    if let Err(e) = engine.close() {
        tracing::warn!("Failed to close engine: {}", e);
    }
    let output = result.context("evaluating position")?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
