//! Detection of the platforms a bundled engine binary exists for.

use crate::error::{Result, StockfishError};

/// A platform with a bundled Stockfish build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS on Apple Silicon.
    MacOsArm64,
    /// Linux on x86-64 with AVX2.
    LinuxX86_64,
}

impl Platform {
    /// The platform this program is running on.
    ///
    /// # Errors
    ///
    /// Returns [`StockfishError::UnsupportedPlatform`] for anything other than
    /// macOS ARM64 or Linux x86-64.
    pub fn current() -> Result<Self> {
        Self::detect(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map an OS/architecture pair to a platform.
    pub fn detect(os: &str, arch: &str) -> Result<Self> {
        match (os, arch) {
            ("macos", "aarch64") => Ok(Platform::MacOsArm64),
            ("linux", "x86_64") => Ok(Platform::LinuxX86_64),
            _ => Err(StockfishError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
        }
    }

    /// File name of the bundled binary, both in the bundle and in the cache.
    pub fn binary_name(&self) -> &'static str {
        match self {
            Platform::MacOsArm64 => "stockfish-macos-m1-apple-silicon",
            Platform::LinuxX86_64 => "stockfish-ubuntu-x86-64-avx2",
        }
    }
}
