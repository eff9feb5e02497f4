use super::{ContainerId, ContainerRuntime, ContainerSpec, PortMap, StartedContainer};
use async_trait::async_trait;
use dashmap::DashMap;
use errors::RuntimeError;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::{ContainerAsync, GenericImage, ImageExt, runners::AsyncRunner};

// The manager enforces the startup bound itself; testcontainers gets some
// slack so its own timeout never fires first.
const STARTUP_GRACE: Duration = Duration::from_secs(5);

/// Runs fixtures as real containers through testcontainers.
///
/// Network partitions are emulated with `docker pause`: the mapped port stays
/// bound on the host but nothing inside the container answers until unpause.
#[derive(Default)]
pub struct TestcontainersRuntime {
    containers: DashMap<ContainerId, Managed>
}

struct Managed {
    container: Arc<ContainerAsync<GenericImage>>,
    exposed: Vec<u16>
}

impl TestcontainersRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn container(&self, id: &ContainerId) -> Result<Arc<ContainerAsync<GenericImage>>, RuntimeError> {
        self.managed(id).map(|(container, _)| container)
    }

    fn managed(
        &self,
        id: &ContainerId
    ) -> Result<(Arc<ContainerAsync<GenericImage>>, Vec<u16>), RuntimeError> {
        self.containers
            .get(id)
            .map(|entry| (Arc::clone(&entry.container), entry.exposed.clone()))
            .ok_or_else(|| RuntimeError::NotFound { id: id.to_string() })
    }
}

async fn mapped_ports(
    container: &ContainerAsync<GenericImage>,
    exposed: impl IntoIterator<Item = u16>
) -> Result<PortMap, RuntimeError> {
    let mut ports = PortMap::new();
    for port in exposed {
        let host_port = container
            .get_host_port_ipv4(ContainerPort::Tcp(port))
            .await
            .map_err(|e| RuntimeError::operation("port", container.id(), e))?;
        ports.insert(port, host_port);
    }
    Ok(ports)
}

#[async_trait]
impl ContainerRuntime for TestcontainersRuntime {
    async fn start(&self, spec: &ContainerSpec) -> Result<StartedContainer, RuntimeError> {
        let mut image = GenericImage::new(spec.image.clone(), spec.tag.clone());
        for port in &spec.exposed_ports {
            image = image.with_exposed_port(ContainerPort::Tcp(*port));
        }
        if let Some(message) = &spec.wait_for_message {
            image = image.with_wait_for(WaitFor::message_on_either_std(message.clone()));
        }

        let mut request = image.with_startup_timeout(spec.startup_timeout + STARTUP_GRACE);
        for (key, value) in &spec.env {
            request = request.with_env_var(key.clone(), value.clone());
        }

        let container = request
            .start()
            .await
            .map_err(|e| RuntimeError::Unavailable {
                reason: format!("{}: {e}", spec.image_ref())
            })?;

        let id = ContainerId::new(container.id());
        let host = container
            .get_host()
            .await
            .map_err(|e| RuntimeError::operation("host", id.as_str(), e))?
            .to_string();
        let ports = mapped_ports(&container, spec.exposed_ports.iter().copied()).await?;

        self.containers.insert(
            id.clone(),
            Managed {
                container: Arc::new(container),
                exposed: spec.exposed_ports.clone()
            }
        );
        Ok(StartedContainer { id, host, ports })
    }

    async fn stop(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        let Some((_, managed)) = self.containers.remove(id) else {
            return Ok(());
        };

        match Arc::try_unwrap(managed.container) {
            Ok(container) => container
                .rm()
                .await
                .map_err(|e| RuntimeError::operation("rm", id.as_str(), e)),
            // Another runtime call still holds a handle; removal happens
            // when it drops.
            Err(shared) => shared
                .stop()
                .await
                .map_err(|e| RuntimeError::operation("stop", id.as_str(), e))
        }
    }

    async fn restart(&self, id: &ContainerId) -> Result<PortMap, RuntimeError> {
        let (container, exposed) = self.managed(id)?;

        container
            .stop()
            .await
            .map_err(|e| RuntimeError::operation("stop", id.as_str(), e))?;
        container
            .start()
            .await
            .map_err(|e| RuntimeError::operation("start", id.as_str(), e))?;

        mapped_ports(&container, exposed).await
    }

    async fn disconnect_network(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.container(id)?
            .pause()
            .await
            .map_err(|e| RuntimeError::operation("pause", id.as_str(), e))
    }

    async fn connect_network(&self, id: &ContainerId) -> Result<PortMap, RuntimeError> {
        let (container, exposed) = self.managed(id)?;
        container
            .unpause()
            .await
            .map_err(|e| RuntimeError::operation("unpause", id.as_str(), e))?;
        mapped_ports(&container, exposed).await
    }
}
