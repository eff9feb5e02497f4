//! # Configuration Precedence
//!
//! Merges fixture configuration from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. Environment variables (highest priority)
//! 2. Configuration file
//! 3. Default values (lowest priority)

use crate::config::FixtureConfig;
use crate::file_loader::{ConfigFileError, load_from_file};
use crate::loader::{EnvConfigError, load_from_env};
use std::path::Path;
use validator::Validate;

/// Error resolving the effective configuration.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    File(#[from] ConfigFileError),

    #[error(transparent)]
    Env(#[from] EnvConfigError),

    #[error("Invalid fixture configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors)
}

/// Merge configuration sources with precedence.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Applies `file_config` then `env_config` on top of `defaults`. A field of an
/// override source only wins when it differs from the built-in default, so a
/// source that does not mention a field cannot reset it.
///
/// ## Usage
/// ```rust,no_run
/// use config::{FixtureConfig, load_from_env, load_from_file, merge_configs};
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = merge_configs(
///         FixtureConfig::default(),
///         load_from_file(Path::new("fixture.toml"))?,
///         "file",
///         load_from_env()?,
///         "env"
///     );
///     println!("image: {}", config.image_ref());
///     Ok(())
/// }
/// ```
pub fn merge_configs(
    defaults: FixtureConfig,
    file_config: FixtureConfig,
    file_source_name: &str,
    env_config: FixtureConfig,
    env_source_name: &str
) -> FixtureConfig {
    let config = merge_with_logging(defaults, file_config, file_source_name);
    merge_with_logging(config, env_config, env_source_name)
}

fn merge_with_logging(
    mut base: FixtureConfig,
    override_config: FixtureConfig,
    source_name: &str
) -> FixtureConfig {
    let defaults = FixtureConfig::default();
    let mut changes = Vec::new();

    if override_config.image != defaults.image && override_config.image != base.image {
        changes.push(format!("image = {}", override_config.image));
        base.image = override_config.image;
    }
    if override_config.tag != defaults.tag && override_config.tag != base.tag {
        changes.push(format!("tag = {}", override_config.tag));
        base.tag = override_config.tag;
    }
    for (key, value) in override_config.env {
        if base.env.get(&key) != Some(&value) {
            changes.push(format!("env.{key} = {value}"));
            base.env.insert(key, value);
        }
    }
    if override_config.exposed_ports != defaults.exposed_ports
        && override_config.exposed_ports != base.exposed_ports
    {
        changes.push(format!("exposed_ports = {:?}", override_config.exposed_ports));
        base.exposed_ports = override_config.exposed_ports;
    }
    if override_config.primary_port != defaults.primary_port
        && override_config.primary_port != base.primary_port
    {
        changes.push(format!("primary_port = {}", override_config.primary_port));
        base.primary_port = override_config.primary_port;
    }
    if override_config.credentials.username != defaults.credentials.username
        && override_config.credentials.username != base.credentials.username
    {
        changes.push(format!(
            "credentials.username = {}",
            override_config.credentials.username
        ));
        base.credentials.username = override_config.credentials.username;
    }
    if override_config.credentials.password != defaults.credentials.password
        && override_config.credentials.password != base.credentials.password
    {
        changes.push("credentials.password = ***".to_string());
        base.credentials.password = override_config.credentials.password;
    }
    if override_config.credentials.database != defaults.credentials.database
        && override_config.credentials.database != base.credentials.database
    {
        changes.push(format!(
            "credentials.database = {}",
            override_config.credentials.database
        ));
        base.credentials.database = override_config.credentials.database;
    }
    if override_config.startup_timeout_ms != defaults.startup_timeout_ms
        && override_config.startup_timeout_ms != base.startup_timeout_ms
    {
        changes.push(format!(
            "startup_timeout_ms = {}",
            override_config.startup_timeout_ms
        ));
        base.startup_timeout_ms = override_config.startup_timeout_ms;
    }
    if override_config.poll_interval_ms != defaults.poll_interval_ms
        && override_config.poll_interval_ms != base.poll_interval_ms
    {
        changes.push(format!(
            "poll_interval_ms = {}",
            override_config.poll_interval_ms
        ));
        base.poll_interval_ms = override_config.poll_interval_ms;
    }
    if override_config.readiness != defaults.readiness
        && override_config.readiness != base.readiness
    {
        changes.push(format!("readiness = {:?}", override_config.readiness));
        base.readiness = override_config.readiness;
    }
    if override_config.wait_for_message.is_some()
        && override_config.wait_for_message != base.wait_for_message
    {
        changes.push(format!(
            "wait_for_message = {:?}",
            override_config.wait_for_message
        ));
        base.wait_for_message = override_config.wait_for_message;
    }

    if !changes.is_empty() {
        tracing::info!(
            source = source_name,
            changes = ?changes,
            "Applied fixture configuration overrides"
        );
    }

    base
}

/// Resolve the effective fixture configuration.
///
/// Defaults, then the optional file, then `FX_*` environment variables; the
/// result is validated before it is returned.
pub fn resolve(path: Option<&Path>) -> Result<FixtureConfig, ResolveError> {
    let file_config = match path {
        Some(path) => load_from_file(path)?,
        None => FixtureConfig::default()
    };
    let env_config = load_from_env()?;

    let config = merge_configs(
        FixtureConfig::default(),
        file_config,
        "file",
        env_config,
        "env"
    );
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadinessKind;

    #[test]
    fn test_merge_env_overrides_file() {
        let mut file = FixtureConfig::default();
        file.tag = "15".to_string();
        file.startup_timeout_ms = 10_000;

        let mut env = FixtureConfig::default();
        env.tag = "14".to_string();

        let merged = merge_configs(FixtureConfig::default(), file, "file", env, "env");
        assert_eq!(merged.tag, "14");
        assert_eq!(merged.startup_timeout_ms, 10_000);
    }

    #[test]
    fn test_merge_default_valued_source_does_not_reset() {
        let mut file = FixtureConfig::default();
        file.image = "redis".to_string();
        file.readiness = ReadinessKind::Tcp;

        let merged = merge_configs(
            FixtureConfig::default(),
            file,
            "file",
            FixtureConfig::default(),
            "env"
        );
        assert_eq!(merged.image, "redis");
        assert_eq!(merged.readiness, ReadinessKind::Tcp);
    }

    #[test]
    fn test_merge_file_without_readiness_keeps_postgres() {
        let file: FixtureConfig = toml::from_str("tag = \"15\"").unwrap();

        let merged = merge_configs(
            FixtureConfig::default(),
            file,
            "file",
            FixtureConfig::default(),
            "env"
        );
        assert_eq!(merged.image_ref(), "postgres:15");
        assert_eq!(merged.readiness, ReadinessKind::Postgres);
        assert!(merged.container_env().contains_key("POSTGRES_PASSWORD"));
    }

    #[test]
    fn test_merge_env_maps_are_unioned() {
        let file = FixtureConfig::default().with_env("A", "1");
        let env = FixtureConfig::default().with_env("B", "2");

        let merged = merge_configs(FixtureConfig::default(), file, "file", env, "env");
        assert_eq!(merged.env.len(), 2);
        assert_eq!(merged.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(merged.env.get("B").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_merge_credentials() {
        let mut env = FixtureConfig::default();
        env.credentials.password = "hunter2".to_string();

        let merged = merge_configs(
            FixtureConfig::default(),
            FixtureConfig::default(),
            "file",
            env,
            "env"
        );
        assert_eq!(merged.credentials.password, "hunter2");
        assert_eq!(merged.credentials.username, "postgres");
    }
}
