//! # starload common library
//!
//! Shared code for the starload crates:
//! - Error type
//! - Configuration loading and resolution
//! - Database connection setup
//! - Declarative table definitions rendered to DDL

pub mod config;
pub mod db;
pub mod error;

pub use config::{ConnectionConfig, IngestConfig, TomlConfig};
pub use error::{Error, Result};
