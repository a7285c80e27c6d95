//! Session configuration.
//!
//! Configuration is an explicit value handed to [`Stockfish::new`](crate::Stockfish::new).
//! It can be built in code or loaded from a TOML file:
//!
//! ```toml
//! verbose = true
//! threads = 4
//! timeout_ms = 30000
//! engine_path = "/usr/local/bin/stockfish"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration parsed but holds an unusable value.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Options for a [`Stockfish`](crate::Stockfish) session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StockfishConfig {
    /// Log the thread count and every query's full engine transcript.
    pub verbose: bool,
    /// Engine search threads. Defaults to the number of available CPUs.
    pub threads: Option<usize>,
    /// Upper bound, in milliseconds, on the handshake and on each query.
    /// Must be non-zero.
    pub timeout_ms: u64,
    /// Send `ucinewgame` and wait for `readyok` before every query.
    pub reset_between_queries: bool,
    /// Use this executable instead of provisioning the bundled one.
    pub engine_path: Option<PathBuf>,
    /// Extra command-line arguments for the engine executable.
    pub engine_args: Vec<String>,
    /// Where provisioned binaries are cached.
    pub cache_dir: Option<PathBuf>,
    /// Directory the bundled binaries are read from.
    pub resources_dir: Option<PathBuf>,
}

impl Default for StockfishConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            threads: None,
            timeout_ms: default_timeout_ms(),
            reset_between_queries: true,
            engine_path: None,
            engine_args: Vec::new(),
            cache_dir: None,
            resources_dir: None,
        }
    }
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl StockfishConfig {
    /// Load configuration from a TOML file.
    ///
    /// Fields missing from the file take their default values.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Read`] if the file cannot be read
    /// - [`ConfigError::Parse`] if it contains invalid TOML
    /// - [`ConfigError::Invalid`] if a value is out of range
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Enable or disable transcript logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Request `threads` engine search threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set the handshake and per-query timeout, at millisecond precision.
    ///
    /// Durations beyond `u64::MAX` milliseconds are clamped. A zero timeout
    /// is rejected by [`validate`](Self::validate).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Whether to send `ucinewgame` before every query.
    pub fn with_reset_between_queries(mut self, reset: bool) -> Self {
        self.reset_between_queries = reset;
        self
    }

    /// Launch `path` instead of the bundled binary.
    ///
    /// This also skips the platform check in [`Stockfish::new`](crate::Stockfish::new).
    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = Some(path.into());
        self
    }

    /// Pass `args` to the engine executable, replacing any set before.
    pub fn with_engine_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.engine_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Cache provisioned binaries under `path`.
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Read bundled binaries from `path`.
    pub fn with_resources_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.resources_dir = Some(path.into());
        self
    }

    /// The handshake and per-query timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Thread count to request from the engine.
    pub fn effective_threads(&self) -> usize {
        self.threads.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StockfishConfig::default();
        assert!(!config.verbose);
        assert!(config.reset_between_queries);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.engine_path.is_none());
        assert!(config.engine_args.is_empty());
        assert!(config.effective_threads() >= 1);
    }

    #[test]
    fn test_load_partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "verbose = true").unwrap();
        writeln!(file, "threads = 3").unwrap();
        writeln!(file, "engine_path = \"/usr/games/stockfish\"").unwrap();

        let config = StockfishConfig::load(file.path()).unwrap();
        assert!(config.verbose);
        assert_eq!(config.threads, Some(3));
        assert_eq!(config.effective_threads(), 3);
        assert_eq!(
            config.engine_path.as_deref(),
            Some(Path::new("/usr/games/stockfish"))
        );
        assert_eq!(config.timeout_ms, 60_000);
        assert!(config.reset_between_queries);
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_ms = \"soon\"").unwrap();

        let err = StockfishConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockfish.toml");

        assert!(matches!(
            StockfishConfig::load(&path),
            Err(ConfigError::Read(_))
        ));
        assert_eq!(
            StockfishConfig::load_or_default(&path).unwrap(),
            StockfishConfig::default()
        );
    }

    #[test]
    fn test_builders() {
        let config = StockfishConfig::default()
            .with_verbose(true)
            .with_threads(2)
            .with_timeout(Duration::from_millis(1999))
            .with_reset_between_queries(false)
            .with_engine_path("/bin/engine")
            .with_engine_args(["--bench-free"])
            .with_cache_dir("/tmp/cache")
            .with_resources_dir("/tmp/res");

        assert!(config.verbose);
        assert_eq!(config.effective_threads(), 2);
        assert_eq!(config.timeout(), Duration::from_millis(1999));
        assert!(!config.reset_between_queries);
        assert_eq!(config.engine_args, vec!["--bench-free".to_string()]);
        assert_eq!(config.cache_dir.as_deref(), Some(Path::new("/tmp/cache")));
        assert_eq!(config.resources_dir.as_deref(), Some(Path::new("/tmp/res")));
    }

    #[test]
    fn test_zero_threads_falls_back_to_cpus() {
        let config = StockfishConfig {
            threads: Some(0),
            ..Default::default()
        };
        assert!(config.effective_threads() >= 1);
    }

    #[test]
    fn test_zero_timeout_rejected_on_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_ms = 0").unwrap();

        let err = StockfishConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {:?}", err);
    }

    #[test]
    fn test_zero_timeout_fails_validation() {
        let config = StockfishConfig::default().with_timeout(Duration::from_micros(500));
        assert_eq!(config.timeout_ms, 0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(StockfishConfig::default().validate().is_ok());
    }

    #[test]
    fn test_huge_timeout_is_clamped() {
        let config = StockfishConfig::default().with_timeout(Duration::MAX);
        assert_eq!(config.timeout_ms, u64::MAX);
        assert!(config.validate().is_ok());
    }
}
