//! # Configuration Structures
//!
//! This module defines the configuration of a disposable backing-service
//! fixture: which image to run, what to inject into it, which ports to
//! expose and how long to wait for it.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for input validation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use validator::Validate;

pub const POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Configuration for one fixture instance.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Describes the backing service a test group acquires. The default value is
/// a PostgreSQL fixture equivalent to running
/// `postgres` with `POSTGRES_PASSWORD=example` and port 5432 exposed.
///
/// ## Usage
/// ```rust,no_run
/// use config::FixtureConfig;
///
/// let config = FixtureConfig::postgres();
/// println!("image: {}", config.image_ref());
/// ```
///
/// ## Fields
/// - `image`/`tag`: container image reference
/// - `env`: environment variables injected into the container
/// - `exposed_ports`: internal ports mapped to host ports
/// - `primary_port`: the port connection descriptors point at
/// - `credentials`: user, password and database handed to tests
/// - `startup_timeout_ms`: hard bound on acquire
/// - `poll_interval_ms`: delay between readiness probe attempts
/// - `readiness`: how readiness is decided
/// - `wait_for_message`: optional log line the runtime waits for first
///
/// ## Validation
/// `primary_port` must be one of `exposed_ports`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[validate(schema(function = "validate_primary_port_exposed"))]
pub struct FixtureConfig {
    /// Image name
    #[serde(default = "default_image")]
    #[validate(length(min = 1, max = 255))]
    pub image: String,

    /// Image tag
    #[serde(default = "default_tag")]
    #[validate(length(min = 1, max = 128))]
    pub tag: String,

    /// Environment variables injected into the container
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Container ports to expose
    #[serde(default = "default_exposed_ports")]
    #[validate(length(min = 1, max = 16))]
    pub exposed_ports: Vec<u16>,

    /// Port used for connection descriptors and readiness
    #[serde(default = "default_primary_port")]
    #[validate(range(min = 1, max = 65535))]
    pub primary_port: u16,

    /// Credentials handed to tests
    #[serde(default)]
    #[validate(nested)]
    pub credentials: Credentials,

    /// Startup timeout in milliseconds
    #[serde(default = "default_startup_timeout_ms")]
    #[validate(range(min = 100, max = 600_000))]
    pub startup_timeout_ms: u64,

    /// Readiness poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 10, max = 10_000))]
    pub poll_interval_ms: u64,

    /// Readiness probe kind
    #[serde(default = "default_readiness")]
    pub readiness: ReadinessKind,

    /// Log line to wait for before probing
    #[serde(default)]
    pub wait_for_message: Option<String>
}

fn default_image() -> String {
    "postgres".to_string()
}

fn default_tag() -> String {
    "16-alpine".to_string()
}

fn default_exposed_ports() -> Vec<u16> {
    vec![POSTGRES_PORT]
}

fn default_primary_port() -> u16 {
    POSTGRES_PORT
}

fn default_startup_timeout_ms() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_readiness() -> ReadinessKind {
    ReadinessKind::Postgres
}

fn validate_primary_port_exposed(config: &FixtureConfig) -> Result<(), validator::ValidationError> {
    if config.exposed_ports.contains(&config.primary_port) {
        Ok(())
    } else {
        Err(validator::ValidationError::new(
            "primary_port must be listed in exposed_ports"
        ))
    }
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self::postgres()
    }
}

impl FixtureConfig {
    /// PostgreSQL fixture with the password `example`.
    pub fn postgres() -> Self {
        Self {
            image: default_image(),
            tag: default_tag(),
            env: BTreeMap::new(),
            exposed_ports: default_exposed_ports(),
            primary_port: default_primary_port(),
            credentials: Credentials::default(),
            startup_timeout_ms: default_startup_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            readiness: ReadinessKind::Postgres,
            wait_for_message: None
        }
    }

    /// Any image reachable over plain TCP on `port`.
    pub fn generic(image: &str, tag: &str, port: u16) -> Self {
        Self {
            image: image.to_string(),
            tag: tag.to_string(),
            exposed_ports: vec![port],
            primary_port: port,
            readiness: ReadinessKind::Tcp,
            ..Self::postgres()
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Environment passed to the container.
    ///
    /// For PostgreSQL readiness the credentials are injected as
    /// `POSTGRES_USER`, `POSTGRES_PASSWORD` and `POSTGRES_DB` unless `env`
    /// already sets them.
    pub fn container_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        if self.readiness == ReadinessKind::Postgres {
            env.entry("POSTGRES_USER".to_string())
                .or_insert_with(|| self.credentials.username.clone());
            env.entry("POSTGRES_PASSWORD".to_string())
                .or_insert_with(|| self.credentials.password.clone());
            env.entry("POSTGRES_DB".to_string())
                .or_insert_with(|| self.credentials.database.clone());
        }
        env
    }
}

/// Credentials for the backing service.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Credentials {
    #[serde(default = "default_username")]
    #[validate(length(min = 1, max = 63))]
    pub username: String,

    #[serde(default = "default_password")]
    #[validate(length(min = 1))]
    pub password: String,

    #[serde(default = "default_database")]
    #[validate(length(min = 1, max = 63))]
    pub database: String
}

fn default_username() -> String {
    "postgres".to_string()
}

fn default_password() -> String {
    "example".to_string()
}

fn default_database() -> String {
    "postgres".to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
            database: default_database()
        }
    }
}

/// How the lifecycle manager decides a started instance is ready.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessKind {
    /// A TCP connect to the primary port succeeds.
    #[default]
    Tcp,
    /// A PostgreSQL login followed by `SELECT 1` succeeds.
    Postgres
}

impl std::str::FromStr for ReadinessKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown readiness kind: {other}"))
        }
    }
}
