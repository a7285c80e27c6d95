//! Materializes the bundled engine binary into a local cache.
//!
//! The binary for the current [`Platform`] is read from a [`ResourceBundle`]
//! the first time it is needed and written to the cache directory. Later
//! sessions, including ones in other processes, reuse the cached file.
//!
//! Writes go to a temporary file in the cache directory which is then moved
//! into place without overwriting, so a concurrent reader never sees a
//! partially written executable. When two writers race, the loser discards
//! its copy and uses the winner's.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::StockfishConfig;
use crate::platform::Platform;

/// Environment variable naming the directory bundled binaries are read from.
pub const RESOURCES_DIR_ENV: &str = "STOCKFISH_RESOURCES_DIR";

/// Errors that can occur while provisioning the engine binary.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The cache directory could not be created.
    #[error("Failed to create cache directory {}: {source}", path.display())]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The bundle has no binary with the requested name.
    #[error("Bundled binary not found: {0}")]
    MissingResource(String),
    /// The bundle exists but reading from it failed.
    #[error("Failed to read bundled binary {name}: {source}")]
    Resource {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// Writing the binary into the cache failed.
    #[error("Failed to write binary to cache at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A source of bundled engine binaries.
pub trait ResourceBundle: Send + Sync {
    /// Read the named binary.
    ///
    /// An error of kind [`std::io::ErrorKind::NotFound`] means the bundle
    /// does not contain it.
    fn read(&self, name: &str) -> std::io::Result<Vec<u8>>;
}

/// Binaries stored as files in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    /// Read binaries from files directly under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$STOCKFISH_RESOURCES_DIR`, or `./resources`.
    pub fn from_env() -> Self {
        let root = std::env::var_os(RESOURCES_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("resources"));
        Self::new(root)
    }

    /// The directory binaries are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceBundle for DirectoryBundle {
    fn read(&self, name: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.root.join(name))
    }
}

/// Binaries held in memory, typically filled with `include_bytes!`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedBundle {
    files: HashMap<String, Cow<'static, [u8]>>,
}

impl EmbeddedBundle {
    /// An empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binary under `name`.
    pub fn with(mut self, name: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) -> Self {
        self.files.insert(name.into(), bytes.into());
        self
    }
}

impl ResourceBundle for EmbeddedBundle {
    fn read(&self, name: &str) -> std::io::Result<Vec<u8>> {
        self.files
            .get(name)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }
}

/// Default cache location: `~/.cache/stockfish-binary`, or
/// `<tmp>/stockfish-binary` when there is no home directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".cache").join("stockfish-binary"))
        .unwrap_or_else(|| std::env::temp_dir().join("stockfish-binary"))
}

/// Resolves an executable engine path, extracting it on first use.
pub struct Provisioner {
    cache_dir: PathBuf,
    bundle: Box<dyn ResourceBundle>,
}

impl Provisioner {
    /// Create a provisioner.
    ///
    /// # Arguments
    ///
    /// * `cache_dir` - Directory extracted binaries are written to. It is
    ///   created on first use.
    /// * `bundle` - Where binaries missing from the cache are read from
    pub fn new(cache_dir: impl Into<PathBuf>, bundle: impl ResourceBundle + 'static) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            bundle: Box::new(bundle),
        }
    }

    /// Build a provisioner from the cache and resource settings in `config`.
    pub fn from_config(config: &StockfishConfig) -> Self {
        let cache_dir = config.cache_dir.clone().unwrap_or_else(default_cache_dir);
        let bundle = match &config.resources_dir {
            Some(dir) => DirectoryBundle::new(dir),
            None => DirectoryBundle::from_env(),
        };
        Self::new(cache_dir, bundle)
    }

    /// The directory extracted binaries are written to.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Return the cached executable for `platform`, writing it first if needed.
    ///
    /// # Errors
    ///
    /// - [`ProvisionError::CacheDir`] if the cache directory cannot be created
    /// - [`ProvisionError::MissingResource`] if the bundle lacks the binary
    /// - [`ProvisionError::Resource`] or [`ProvisionError::Write`] on I/O failure
    pub fn resolve_executable_path(&self, platform: Platform) -> Result<PathBuf, ProvisionError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|source| ProvisionError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        })?;

        let name = platform.binary_name();
        let target = self.cache_dir.join(name);
        if target.is_file() {
            tracing::debug!("Using cached engine binary {}", target.display());
            return Ok(target);
        }

        let bytes = self.bundle.read(name).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ProvisionError::MissingResource(name.to_string())
            } else {
                ProvisionError::Resource {
                    name: name.to_string(),
                    source,
                }
            }
        })?;

        self.install(&bytes, &target)?;
        Ok(target)
    }

    fn install(&self, bytes: &[u8], target: &Path) -> Result<(), ProvisionError> {
        let write_err = |source| ProvisionError::Write {
            path: target.to_path_buf(),
            source,
        };

        let mut staged = tempfile::NamedTempFile::new_in(&self.cache_dir).map_err(write_err)?;
        staged.write_all(bytes).map_err(write_err)?;
        staged.as_file().sync_all().map_err(write_err)?;
        make_executable(staged.as_file()).map_err(write_err)?;

        match staged.persist_noclobber(target) {
            Ok(_) => {
                tracing::info!("Extracted engine binary to {}", target.display());
                Ok(())
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::warn!(
                    "Engine binary {} was written concurrently; using existing file",
                    target.display()
                );
                Ok(())
            }
            Err(e) => Err(write_err(e.error)),
        }
    }
}

#[cfg(unix)]
fn make_executable(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}
