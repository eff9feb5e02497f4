//! # Fixture Configuration
//!
//! Configuration for disposable backing-service fixtures.
//!
//! This crate provides:
//! - The `FixtureConfig` structure and presets
//! - Environment variable loading (`FX_*`)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (env > file > defaults)
//! - Configuration validation

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod precedence;
pub mod validator;

pub use config::{Credentials, FixtureConfig, POSTGRES_PORT, ReadinessKind};
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use loader::{EnvConfigError, load_from_env};
pub use precedence::{ResolveError, merge_configs, resolve};
pub use self::validator::validate;
