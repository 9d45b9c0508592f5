//! Error types for cell-ldr

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for a load session
#[derive(Error, Debug)]
pub enum Error {
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Loader errors
///
/// Every variant aborts the session. Malformed relocations, unknown
/// library records and NID misses are logged and skipped instead.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Invalid ELF: {0}")]
    InvalidElf(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No segments available")]
    NoSegments,

    #[error("Could not locate NID database file ({})", .0.display())]
    NidDatabaseMissing(PathBuf),

    #[error("Failed to load NID database file ({}): {reason}", path.display())]
    NidDatabaseParse { path: PathBuf, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Analysis database errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Unmapped address: 0x{0:08x}")]
    Unmapped(u32),

    #[error("Invalid region at 0x{start:08x} (size 0x{size:x})")]
    InvalidRegion { start: u32, size: u32 },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, Error>;
