//! Core types for the cell-ldr PS3 image loader
//!
//! This crate provides the error taxonomy, configuration and logging
//! infrastructure shared by the analysis database and the loader.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, DebugConfig, LoaderConfig, LogLevel};
pub use error::{ConfigError, DatabaseError, Error, LoaderError, Result};
