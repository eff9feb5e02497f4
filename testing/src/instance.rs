use crate::connection::ConnectionDescriptor;
use crate::probe::{NotReady, ReadinessProbe, wait_until_ready};
use crate::runtime::{ContainerId, ContainerRuntime, PortMap, StartedContainer};
use crate::state::FixtureState;
use config::FixtureConfig;
use errors::{FixtureError, FixtureResult, RuntimeError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One running backing-service instance, owned by a single test group.
///
/// Lifecycle transitions (`restart`, `inject_partition`) are not reentrant:
/// a second one issued while another is outstanding fails with
/// [`FixtureError::InvalidState`]. Data-plane traffic through connection
/// descriptors is never serialised by the instance.
///
/// Dropping an instance that was never released stops its container in the
/// background.
pub struct FixtureInstance {
    inner: Arc<Inner>
}

struct Inner {
    id: ContainerId,
    host: String,
    config: FixtureConfig,
    ports: RwLock<PortMap>,
    state: Mutex<FixtureState>,
    // Held for the duration of every runtime call so release never races a
    // half-finished restart.
    lifecycle: tokio::sync::Mutex<()>,
    alive: Arc<AtomicBool>,
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn ReadinessProbe>
}

impl FixtureInstance {
    pub(crate) fn new(
        started: StartedContainer,
        config: FixtureConfig,
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn ReadinessProbe>
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: started.id,
                host: started.host,
                config,
                ports: RwLock::new(started.ports),
                state: Mutex::new(FixtureState::Pending),
                lifecycle: tokio::sync::Mutex::new(()),
                alive: Arc::new(AtomicBool::new(true)),
                runtime,
                probe
            })
        }
    }

    pub fn id(&self) -> &ContainerId {
        &self.inner.id
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn state(&self) -> FixtureState {
        *self.inner.state.lock()
    }

    pub fn ports(&self) -> PortMap {
        self.inner.ports.read().clone()
    }

    /// Host port mapped to container port `internal`.
    pub fn mapped_port(&self, internal: u16) -> Option<u16> {
        self.inner.ports.read().get(&internal).copied()
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.inner.config
    }

    /// Connection coordinates for the primary port.
    pub fn connection(&self) -> FixtureResult<ConnectionDescriptor> {
        let state = self.state();
        if state.is_terminal() {
            return Err(FixtureError::invalid_state("connect", state));
        }
        self.inner.descriptor()
    }

    /// Polls the readiness probe; used by acquire before marking Running.
    pub(crate) async fn wait_ready(&self, timeout: Duration) -> Result<(), NotReady> {
        self.inner.wait_ready(timeout).await
    }

    pub(crate) fn mark_running(&self) {
        let mut state = self.inner.state.lock();
        if *state == FixtureState::Pending {
            *state = FixtureState::Running;
        }
    }

    /// Restarts the backing service.
    ///
    /// Returns once the service answers its readiness probe again. The host
    /// port may change; take a new [`ConnectionDescriptor`] afterwards. If the
    /// service does not come back the instance is released and
    /// [`FixtureError::RestartFailed`] is returned. A concurrent `release`
    /// wins: the restart stops waiting and returns
    /// [`FixtureError::InvalidState`].
    pub async fn restart(&self) -> FixtureResult<()> {
        let inner = &self.inner;
        inner.begin("restart", FixtureState::Restarting)?;

        let guard = inner.lifecycle.lock().await;
        inner.ensure_not_stopped("restart")?;
        tracing::info!(id = %inner.id, "Restarting fixture");

        let outcome = match inner.runtime.restart(&inner.id).await {
            Ok(ports) => {
                *inner.ports.write() = ports;
                inner
                    .wait_ready(inner.config.startup_timeout())
                    .await
                    .map_err(|reason| format!("not ready after restart: {reason}"))
            }
            Err(e) => Err(e.to_string())
        };

        if let Err(reason) = outcome {
            if !inner.mark_stopped() {
                // release owns the stop once it has marked the instance
                drop(guard);
                return Err(FixtureError::invalid_state("restart", FixtureState::Stopped));
            }
            tracing::warn!(id = %inner.id, reason = %reason, "Fixture restart failed");
            inner.stop_container().await;
            drop(guard);
            return Err(FixtureError::RestartFailed {
                id: inner.id.to_string(),
                reason
            });
        }
        drop(guard);

        inner.finish("restart", FixtureState::Restarting)?;
        tracing::info!(id = %inner.id, ports = ?self.ports(), "Fixture restarted");
        Ok(())
    }

    /// Makes the service unreachable for `duration`, then restores it.
    ///
    /// Restoration runs on its own task, so it happens even if the caller
    /// stops awaiting. Connections held across the window see failures;
    /// nothing masks them.
    pub async fn inject_partition(&self, duration: Duration) -> FixtureResult<()> {
        let inner = Arc::clone(&self.inner);
        inner.begin("inject_partition", FixtureState::Partitioned)?;

        let restore = tokio::spawn(async move { inner.partition_for(duration).await });
        match restore.await {
            Ok(result) => result,
            Err(e) => Err(FixtureError::ResourceUnavailable {
                image: self.inner.config.image_ref(),
                reason: format!("partition task failed: {e}")
            })
        }
    }

    /// Stops the instance and frees its container.
    ///
    /// Safe to call any number of times. Runtime failures are logged, never
    /// returned, so a cleanup problem cannot hide the failure of the test
    /// that ran before it.
    pub async fn release(&self) {
        let inner = &self.inner;
        if !inner.mark_stopped() {
            tracing::debug!(id = %inner.id, "Fixture already released");
            return;
        }
        let _guard = inner.lifecycle.lock().await;
        inner.stop_container().await;
        tracing::info!(id = %inner.id, "Fixture released");
    }
}

impl Drop for FixtureInstance {
    fn drop(&mut self) {
        let inner = &self.inner;
        if !inner.mark_stopped() {
            return;
        }
        tracing::warn!(id = %inner.id, "Fixture dropped without release; stopping in background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let runtime = Arc::clone(&inner.runtime);
                let id = inner.id.clone();
                handle.spawn(async move {
                    if let Err(e) = runtime.stop(&id).await {
                        tracing::warn!(id = %id, error = %e, "Background fixture stop failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(id = %inner.id, "No async runtime to stop fixture; left to the runtime's cleanup");
            }
        }
    }
}

impl Inner {
    fn descriptor(&self) -> FixtureResult<ConnectionDescriptor> {
        let primary = self.config.primary_port;
        let port = self.ports.read().get(&primary).copied().ok_or_else(|| {
            FixtureError::Config {
                message: format!("port {primary} is not exposed by {}", self.id)
            }
        })?;
        Ok(ConnectionDescriptor::new(
            self.host.clone(),
            port,
            self.config.credentials.clone(),
            Arc::clone(&self.alive)
        ))
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<(), NotReady> {
        let target = self.descriptor().map_err(|e| NotReady::TimedOut {
            last_error: e.to_string(),
            attempts: 0
        })?;
        wait_until_ready(
            self.probe.as_ref(),
            &target,
            timeout,
            self.config.poll_interval()
        )
        .await
    }

    /// Running -> `to`, or InvalidState.
    fn begin(&self, operation: &str, to: FixtureState) -> FixtureResult<()> {
        let mut state = self.state.lock();
        if !state.accepts_fault() {
            return Err(FixtureError::invalid_state(operation, *state));
        }
        *state = to;
        Ok(())
    }

    /// `from` -> Running, unless a release got there first.
    fn finish(&self, operation: &str, from: FixtureState) -> FixtureResult<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(FixtureError::invalid_state(operation, *state));
        }
        *state = FixtureState::Running;
        Ok(())
    }

    fn ensure_not_stopped(&self, operation: &str) -> FixtureResult<()> {
        let state = *self.state.lock();
        if state.is_terminal() {
            return Err(FixtureError::invalid_state(operation, state));
        }
        Ok(())
    }

    /// Returns false if the instance was already stopped.
    fn mark_stopped(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = FixtureState::Stopped;
        self.alive.store(false, Ordering::Release);
        true
    }

    async fn stop_container(&self) {
        if let Err(e) = self.runtime.stop(&self.id).await {
            tracing::warn!(id = %self.id, error = %e, "Failed to stop fixture container");
        }
    }

    fn unavailable(&self, error: &RuntimeError) -> FixtureError {
        FixtureError::ResourceUnavailable {
            image: self.config.image_ref(),
            reason: error.to_string()
        }
    }

    async fn partition_for(&self, duration: Duration) -> FixtureResult<()> {
        {
            let _guard = self.lifecycle.lock().await;
            self.ensure_not_stopped("inject_partition")?;
            if let Err(e) = self.runtime.disconnect_network(&self.id).await {
                tracing::warn!(id = %self.id, error = %e, "Failed to partition fixture");
                let _ = self.finish("inject_partition", FixtureState::Partitioned);
                return Err(self.unavailable(&e));
            }
        }
        tracing::info!(id = %self.id, duration_ms = duration.as_millis() as u64, "Fixture partitioned");

        tokio::time::sleep(duration).await;

        let _guard = self.lifecycle.lock().await;
        self.ensure_not_stopped("inject_partition")?;
        let healed = match self.runtime.connect_network(&self.id).await {
            Ok(ports) => {
                *self.ports.write() = ports;
                self.wait_ready(self.config.startup_timeout())
                    .await
                    .map_err(|e| format!("not ready after partition: {e}"))
            }
            Err(e) => Err(e.to_string())
        };
        if let Err(reason) = healed {
            if !self.mark_stopped() {
                return Err(FixtureError::invalid_state("inject_partition", FixtureState::Stopped));
            }
            tracing::warn!(id = %self.id, reason = %reason, "Failed to heal partition; releasing fixture");
            self.stop_container().await;
            return Err(FixtureError::ResourceUnavailable {
                image: self.config.image_ref(),
                reason
            });
        }

        self.finish("inject_partition", FixtureState::Partitioned)?;
        tracing::info!(id = %self.id, "Fixture partition healed");
        Ok(())
    }
}
