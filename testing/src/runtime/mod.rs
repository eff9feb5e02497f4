//! Container runtime seam.
//!
//! The lifecycle manager only talks to a [`ContainerRuntime`]. Two runtimes
//! ship with the crate:
//! - [`TestcontainersRuntime`]: real containers through testcontainers
//! - [`FakeRuntime`]: loopback listeners standing in for containers, for
//!   exercising the lifecycle without Docker

mod docker;
mod fake;

pub use docker::TestcontainersRuntime;
pub use fake::{FakeBehavior, FakeRuntime, RuntimeCall};

use async_trait::async_trait;
use config::FixtureConfig;
use errors::RuntimeError;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Internal container port to host port.
pub type PortMap = BTreeMap<u16, u16>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to start.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub tag: String,
    pub env: BTreeMap<String, String>,
    pub exposed_ports: Vec<u16>,
    pub startup_timeout: Duration,
    pub wait_for_message: Option<String>
}

impl ContainerSpec {
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl From<&FixtureConfig> for ContainerSpec {
    fn from(config: &FixtureConfig) -> Self {
        Self {
            image: config.image.clone(),
            tag: config.tag.clone(),
            env: config.container_env(),
            exposed_ports: config.exposed_ports.clone(),
            startup_timeout: config.startup_timeout(),
            wait_for_message: config.wait_for_message.clone()
        }
    }
}

/// A container the runtime started.
#[derive(Debug, Clone)]
pub struct StartedContainer {
    pub id: ContainerId,
    pub host: String,
    pub ports: PortMap
}

/// Operations the lifecycle manager needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a container, returning once the runtime considers it
    /// started. Readiness of the service inside is not implied.
    async fn start(&self, spec: &ContainerSpec) -> Result<StartedContainer, RuntimeError>;

    /// Stop and remove. Unknown ids are not an error.
    async fn stop(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    /// Stop then start again. The returned port map may differ from the one
    /// reported at start.
    async fn restart(&self, id: &ContainerId) -> Result<PortMap, RuntimeError>;

    /// Make the container unreachable from the test process.
    async fn disconnect_network(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    /// Undo [`ContainerRuntime::disconnect_network`]. Like `restart`, the
    /// returned port map may differ from the one in use before.
    async fn connect_network(&self, id: &ContainerId) -> Result<PortMap, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::ReadinessKind;

    #[test]
    fn test_container_spec_from_config() {
        let config = FixtureConfig::postgres();
        let spec = ContainerSpec::from(&config);

        assert_eq!(spec.image_ref(), "postgres:16-alpine");
        assert_eq!(spec.exposed_ports, vec![5432]);
        assert_eq!(
            spec.env.get("POSTGRES_PASSWORD").map(String::as_str),
            Some("example")
        );
        assert_eq!(spec.startup_timeout, config.startup_timeout());
    }

    #[test]
    fn test_container_spec_generic_has_no_credential_env() {
        let mut config = FixtureConfig::generic("nginx", "alpine", 80);
        config.readiness = ReadinessKind::Tcp;
        let spec = ContainerSpec::from(&config);
        assert!(spec.env.is_empty());
    }
}
