//! # Environment Variable Loader
//!
//! Loads fixture configuration from environment variables following 12-factor
//! app principles.
//!
//! # Naming Convention
//! - `FX_*`: fixture settings
//! - `FX_DB_*`: credentials handed to tests
//! - `FX_ENV_<NAME>`: injected into the container as `<NAME>`

use crate::config::{FixtureConfig, ReadinessKind};
use std::env;

const CONTAINER_ENV_PREFIX: &str = "FX_ENV_";

/// Environment loading error.
#[derive(Debug, thiserror::Error)]
pub enum EnvConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String
    }
}

/// Load configuration from environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Starts from [`FixtureConfig::default`] and overrides every field whose
/// variable is set. A set but unparsable variable is an error, not a silent
/// fallback to the default.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("image: {}", config.image_ref());
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// - `FX_IMAGE`: image name (default: "postgres")
/// - `FX_TAG`: image tag (default: "16-alpine")
/// - `FX_EXPOSED_PORTS`: comma separated container ports (default: "5432")
/// - `FX_PRIMARY_PORT`: port for descriptors and readiness (default: 5432)
/// - `FX_STARTUP_TIMEOUT_MS`: acquire timeout (default: 60000)
/// - `FX_POLL_INTERVAL_MS`: readiness poll interval (default: 250)
/// - `FX_READINESS`: `tcp` or `postgres` (default: "postgres")
/// - `FX_WAIT_FOR_MESSAGE`: log line to wait for (optional)
/// - `FX_DB_USER`, `FX_DB_PASSWORD`, `FX_DB_NAME`: credentials
/// - `FX_ENV_<NAME>`: container environment variable `<NAME>`
pub fn load_from_env() -> Result<FixtureConfig, EnvConfigError> {
    let mut config = FixtureConfig::default();

    if let Ok(image) = env::var("FX_IMAGE") {
        config.image = image;
    }
    if let Ok(tag) = env::var("FX_TAG") {
        config.tag = tag;
    }
    if let Ok(ports) = env::var("FX_EXPOSED_PORTS") {
        config.exposed_ports = parse_port_list("FX_EXPOSED_PORTS", &ports)?;
    }
    if let Some(port) = parse_env("FX_PRIMARY_PORT")? {
        config.primary_port = port;
    }
    if let Some(timeout) = parse_env("FX_STARTUP_TIMEOUT_MS")? {
        config.startup_timeout_ms = timeout;
    }
    if let Some(interval) = parse_env("FX_POLL_INTERVAL_MS")? {
        config.poll_interval_ms = interval;
    }
    if let Ok(kind) = env::var("FX_READINESS") {
        config.readiness = kind.parse::<ReadinessKind>().map_err(|reason| {
            EnvConfigError::InvalidValue {
                key: "FX_READINESS".to_string(),
                value: kind.clone(),
                reason
            }
        })?;
    }
    if let Ok(message) = env::var("FX_WAIT_FOR_MESSAGE") {
        config.wait_for_message = Some(message);
    }
    if let Ok(user) = env::var("FX_DB_USER") {
        config.credentials.username = user;
    }
    if let Ok(password) = env::var("FX_DB_PASSWORD") {
        config.credentials.password = password;
    }
    if let Ok(database) = env::var("FX_DB_NAME") {
        config.credentials.database = database;
    }

    for (key, value) in env::vars() {
        if let Some(name) = key.strip_prefix(CONTAINER_ENV_PREFIX) {
            if !name.is_empty() {
                config.env.insert(name.to_string(), value);
            }
        }
    }

    Ok(config)
}

fn parse_port_list(key: &str, raw: &str) -> Result<Vec<u16>, EnvConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>().map_err(|e| EnvConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                reason: e.to_string()
            })
        })
        .collect()
}

fn parse_env<T>(key: &str) -> Result<Option<T>, EnvConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display
{
    match env::var(key) {
        Ok(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| EnvConfigError::InvalidValue {
                key: key.to_string(),
                value: s.clone(),
                reason: e.to_string()
            }),
        Err(_) => Ok(None)
    }
}
