// src/utils/mod.rs
//! Shared utilities: error taxonomy and configuration loading

pub mod config;
pub mod errors;

pub use config::{GeneratorSettings, InterposeConfig, LoggingSettings};
pub use errors::{ProxyError, Result};
