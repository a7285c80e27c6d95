//! Stockfish process supervision and position evaluation.
//!
//! This crate runs a Stockfish binary as a subprocess, talks UCI to it over
//! its stdin/stdout, and turns the engine's search output into a typed
//! [`Evaluation`] reported from White's point of view.
//!
//! # Overview
//!
//! - [`Stockfish`] - Session facade: `start`, `evaluate`, `static_evaluation`, `close`
//! - [`StockfishConfig`] - Explicit session configuration
//! - [`Evaluation`] - Mate-in-N or centipawn score
//! - [`Position`] - FEN, optional moves and search depth
//! - [`session::Session`] - The UCI conversation over any [`process::LineChannel`]
//! - [`provision::Provisioner`] - Extracts the bundled binary into a cache
//!
//! # Example
//!
//! ```no_run
//! use stockfish::{Stockfish, StockfishConfig};
//!
//! let engine = Stockfish::new(StockfishConfig::default())?;
//! engine.start()?;
//! let eval = engine.evaluate(
//!     "r1bqkbnr/ppp1nppp/3p4/3Pp3/4P3/5N2/PPP1BPPP/RNBQK2R b KQkq - 2 5",
//!     10,
//! )?;
//! println!("Evaluation: {}", eval);
//! engine.close()?;
//! # Ok::<(), stockfish::StockfishError>(())
//! ```

pub mod config;
pub mod error;
pub mod platform;
pub mod position;
pub mod process;
pub mod protocol;
pub mod provision;
pub mod score;
pub mod session;

pub use config::{ConfigError, StockfishConfig};
pub use error::{ErrorCategory, Result, StockfishError};
pub use platform::Platform;
pub use position::{Color, Position};
pub use provision::{DirectoryBundle, EmbeddedBundle, ProvisionError, Provisioner, ResourceBundle};
pub use score::Evaluation;

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use process::{EngineProcess, KillSwitch, LineChannel};
use session::{Session, SessionOptions};

/// Where the engine executable comes from.
enum Launcher {
    /// A caller-supplied executable.
    Path(PathBuf),
    /// The bundled binary for this platform, extracted on first use.
    Provisioned {
        platform: Platform,
        provisioner: Provisioner,
    },
}

impl Launcher {
    fn executable(&self) -> Result<PathBuf> {
        match self {
            Launcher::Path(path) => Ok(path.clone()),
            Launcher::Provisioned {
                platform,
                provisioner,
            } => Ok(provisioner.resolve_executable_path(*platform)?),
        }
    }
}

/// A Stockfish engine session.
///
/// One engine process per session, started with [`start`](Self::start) and
/// stopped with [`close`](Self::close) (or on drop). Queries reuse the
/// process. `Stockfish` is `Sync`: it can be shared between threads, and
/// concurrent queries run one at a time.
///
/// After a query fails partway through, the engine's output may be out of
/// step with the session; `close` and `start` again before reusing it.
pub struct Stockfish {
    config: StockfishConfig,
    launcher: Launcher,
    /// The live session. The lock spans a whole query.
    session: Mutex<Option<Session<EngineProcess>>>,
    /// Lets `close` kill the engine while a query holds the session lock.
    kill_switch: Mutex<Option<KillSwitch>>,
}

impl Stockfish {
    /// Create a session. No process is started yet.
    ///
    /// Without an `engine_path` in `config`, the bundled binary is read from
    /// `config.resources_dir` (or `$STOCKFISH_RESOURCES_DIR`).
    ///
    /// # Errors
    ///
    /// - [`StockfishError::Config`] if `config` fails
    ///   [`validate`](StockfishConfig::validate)
    /// - [`StockfishError::UnsupportedPlatform`] if a bundled binary would be
    ///   needed and none exists for this platform
    pub fn new(config: StockfishConfig) -> Result<Self> {
        let provisioner = Provisioner::from_config(&config);
        Self::build(config, provisioner)
    }

    /// Like [`new`](Self::new), but bundled binaries come from `bundle`.
    pub fn with_bundle(config: StockfishConfig, bundle: impl ResourceBundle + 'static) -> Result<Self> {
        let cache_dir = config
            .cache_dir
            .clone()
            .unwrap_or_else(provision::default_cache_dir);
        Self::build(config, Provisioner::new(cache_dir, bundle))
    }

    fn build(config: StockfishConfig, provisioner: Provisioner) -> Result<Self> {
        config.validate()?;
        let launcher = match &config.engine_path {
            Some(path) => Launcher::Path(path.clone()),
            None => Launcher::Provisioned {
                platform: Platform::current()?,
                provisioner,
            },
        };
        Ok(Self {
            config,
            launcher,
            session: Mutex::new(None),
            kill_switch: Mutex::new(None),
        })
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &StockfishConfig {
        &self.config
    }

    /// Launch the engine, complete the UCI handshake and set the thread count.
    ///
    /// Calling `start` while the engine is already running does nothing.
    ///
    /// # Errors
    ///
    /// - [`StockfishError::Provisioning`] if the binary cannot be extracted
    /// - [`StockfishError::Launch`] if the process cannot be spawned
    /// - [`StockfishError::Handshake`] or [`StockfishError::Timeout`] if the
    ///   engine never becomes ready
    pub fn start(&self) -> Result<()> {
        let mut slot = lock(&self.session);
        if slot.is_some() {
            tracing::debug!("Engine already running; start ignored");
            return Ok(());
        }

        let path = self.launcher.executable()?;
        let process = EngineProcess::spawn(&path, &self.config.engine_args)?;
        *lock(&self.kill_switch) = Some(process.kill_switch());

        let mut session = Session::new(process, SessionOptions::from(&self.config));
        if let Err(e) = initialize(&mut session, self.config.effective_threads()) {
            let _ = session.close();
            lock(&self.kill_switch).take();
            return Err(e);
        }

        *slot = Some(session);
        Ok(())
    }

    /// Evaluate a FEN position searched to `depth`.
    ///
    /// The result is from White's point of view whichever side is to move.
    ///
    /// # Errors
    ///
    /// - [`StockfishError::InvalidPosition`] for a malformed FEN or depth 0
    /// - [`StockfishError::Closed`] if the engine is not running
    /// - any error from [`Session::evaluate`]
    pub fn evaluate(&self, fen: &str, depth: u32) -> Result<Evaluation> {
        let position = Position::new(fen, depth)?;
        self.evaluate_position(&position)
    }

    /// Evaluate a prepared [`Position`].
    pub fn evaluate_position(&self, position: &Position) -> Result<Evaluation> {
        let mut slot = lock(&self.session);
        match slot.as_mut() {
            Some(session) => session.evaluate(position),
            None => Err(StockfishError::Closed),
        }
    }

    /// Static evaluation of a FEN position, in pawns from White's point of view.
    ///
    /// Uses the engine's `eval` command, so no search is run. Stockfish
    /// declines to evaluate a position where the side to move is in check.
    ///
    /// # Errors
    ///
    /// - [`StockfishError::InvalidPosition`] for a malformed FEN
    /// - [`StockfishError::Closed`] if the engine is not running
    /// - [`StockfishError::NoEvaluation`] if the engine printed no value
    /// - any error from [`Session::static_evaluate`]
    pub fn static_evaluation(&self, fen: &str) -> Result<f64> {
        let position = Position::new(fen, 1)?;
        self.static_evaluation_position(&position)
    }

    /// Static evaluation of a prepared [`Position`], after its moves.
    pub fn static_evaluation_position(&self, position: &Position) -> Result<f64> {
        let mut slot = lock(&self.session);
        match slot.as_mut() {
            Some(session) => session.static_evaluate(position),
            None => Err(StockfishError::Closed),
        }
    }

    /// Kill the engine process. Safe to call any number of times.
    ///
    /// A query blocked on engine output in another thread fails promptly.
    pub fn close(&self) -> Result<()> {
        let switch = lock(&self.kill_switch).take();
        if let Some(switch) = switch {
            switch.kill();
        }

        let session = lock(&self.session).take();
        match session {
            Some(mut session) => {
                tracing::info!("Closing engine session");
                session.close()
            }
            None => Ok(()),
        }
    }

    /// Whether an engine process is running.
    pub fn is_running(&self) -> bool {
        lock(&self.session)
            .as_ref()
            .is_some_and(|session| !session.channel().is_closed())
    }

    /// OS process id of the running engine.
    pub fn process_id(&self) -> Option<u32> {
        lock(&self.session)
            .as_ref()
            .map(|session| session.channel().id())
    }

    /// The name the engine reported during the handshake.
    pub fn engine_name(&self) -> Option<String> {
        lock(&self.session)
            .as_ref()
            .and_then(|session| session.engine_name().map(str::to_string))
    }
}

impl Drop for Stockfish {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn initialize(session: &mut Session<EngineProcess>, threads: usize) -> Result<()> {
    session.handshake()?;
    session.set_threads(threads)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
