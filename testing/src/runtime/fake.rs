use super::{ContainerId, ContainerRuntime, ContainerSpec, PortMap, StartedContainer};
use async_trait::async_trait;
use dashmap::DashMap;
use errors::RuntimeError;
use parking_lot::Mutex;
use std::net::TcpListener;
use std::time::Duration;

const LOOPBACK: &str = "127.0.0.1";

/// Knobs for [`FakeRuntime`].
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
    /// `start` fails with `RuntimeError::Unavailable` carrying this reason.
    pub fail_start: Option<String>,
    /// `start` succeeds but nothing listens on the mapped ports.
    pub unreachable: bool,
    /// `restart` fails with this reason.
    pub fail_restart: Option<String>,
    /// Delay before `start` returns.
    pub start_delay: Duration,
    /// `restart` maps every port to a fresh host port.
    pub new_ports_on_restart: bool
}

/// Calls observed by a [`FakeRuntime`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Start(String),
    Stop(ContainerId),
    Restart(ContainerId),
    Disconnect(ContainerId),
    Connect(ContainerId)
}

struct FakeContainer {
    ports: PortMap,
    listeners: Vec<TcpListener>
}

/// In-process stand-in for a container runtime.
///
/// Each "container" is a set of loopback TCP listeners, one per exposed port.
/// Disconnecting drops the listeners so connects are refused; stopping
/// forgets the container.
#[derive(Default)]
pub struct FakeRuntime {
    behavior: FakeBehavior,
    containers: DashMap<ContainerId, FakeContainer>,
    calls: Mutex<Vec<RuntimeCall>>
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| matches(call)).count()
    }

    pub fn running(&self) -> usize {
        self.containers.len()
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.lock().push(call);
    }
}

fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((LOOPBACK, port))
}

fn bind_fresh() -> Result<(u16, TcpListener), RuntimeError> {
    let listener = bind(0).map_err(|e| RuntimeError::Unavailable {
        reason: format!("no loopback port available: {e}")
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| RuntimeError::Unavailable {
            reason: e.to_string()
        })?
        .port();
    Ok((port, listener))
}

/// Rebinds `ports`, falling back to a fresh port when the old one is taken.
fn rebind(ports: &mut PortMap) -> Result<Vec<TcpListener>, RuntimeError> {
    let mut listeners = Vec::with_capacity(ports.len());
    for host_port in ports.values_mut() {
        match bind(*host_port) {
            Ok(listener) => listeners.push(listener),
            Err(_) => {
                let (port, listener) = bind_fresh()?;
                *host_port = port;
                listeners.push(listener);
            }
        }
    }
    Ok(listeners)
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn start(&self, spec: &ContainerSpec) -> Result<StartedContainer, RuntimeError> {
        self.record(RuntimeCall::Start(spec.image_ref()));
        if !self.behavior.start_delay.is_zero() {
            tokio::time::sleep(self.behavior.start_delay).await;
        }
        if let Some(reason) = &self.behavior.fail_start {
            return Err(RuntimeError::Unavailable {
                reason: reason.clone()
            });
        }

        let mut ports = PortMap::new();
        let mut listeners = Vec::new();
        for internal in &spec.exposed_ports {
            let (port, listener) = bind_fresh()?;
            ports.insert(*internal, port);
            if !self.behavior.unreachable {
                listeners.push(listener);
            }
        }

        let id = ContainerId::new(uuid::Uuid::new_v4().simple().to_string());
        self.containers
            .insert(id.clone(), FakeContainer { ports: ports.clone(), listeners });

        Ok(StartedContainer {
            id,
            host: LOOPBACK.to_string(),
            ports
        })
    }

    async fn stop(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Stop(id.clone()));
        self.containers.remove(id);
        Ok(())
    }

    async fn restart(&self, id: &ContainerId) -> Result<PortMap, RuntimeError> {
        self.record(RuntimeCall::Restart(id.clone()));
        let mut container = self
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound { id: id.to_string() })?;

        if let Some(reason) = &self.behavior.fail_restart {
            container.listeners.clear();
            return Err(RuntimeError::operation("restart", id.as_str(), reason));
        }

        if self.behavior.new_ports_on_restart {
            // Old listeners stay bound until the new ones exist so the
            // ports cannot be handed out again.
            let mut listeners = Vec::with_capacity(container.ports.len());
            for host_port in container.ports.values_mut() {
                let (port, listener) = bind_fresh()?;
                *host_port = port;
                listeners.push(listener);
            }
            container.listeners = listeners;
        } else {
            container.listeners.clear();
            let listeners = rebind(&mut container.ports)?;
            container.listeners = listeners;
        }
        Ok(container.ports.clone())
    }

    async fn disconnect_network(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Disconnect(id.clone()));
        let mut container = self
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound { id: id.to_string() })?;
        container.listeners.clear();
        Ok(())
    }

    async fn connect_network(&self, id: &ContainerId) -> Result<PortMap, RuntimeError> {
        self.record(RuntimeCall::Connect(id.clone()));
        let mut container = self
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound { id: id.to_string() })?;
        let FakeContainer { ports, listeners } = &mut *container;
        *listeners = rebind(ports)?;
        Ok(ports.clone())
    }
}
