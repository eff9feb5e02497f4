use crate::instance::FixtureInstance;
use crate::probe::{ReadinessProbe, probe_for};
use crate::runtime::{ContainerRuntime, ContainerSpec, TestcontainersRuntime};
use config::FixtureConfig;
use errors::{FixtureError, FixtureResult, RuntimeError};
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use validator::Validate;

/// Acquires and releases disposable backing-service instances.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Starts a fresh instance per test group through a [`ContainerRuntime`],
/// waits for it to accept connections, and hands it out. There is no shared
/// global instance: each group owns what it acquires.
///
/// ## Usage
/// ```rust,no_run
/// use config::FixtureConfig;
/// use testing::FixtureManager;
///
/// # async fn run() -> Result<(), errors::FixtureError> {
/// let manager = FixtureManager::docker();
/// let rows = manager
///     .with_fixture(&FixtureConfig::postgres(), |instance| async move {
///         let descriptor = instance.connection()?;
///         println!("database at {}", descriptor.endpoint());
///         Ok::<_, errors::FixtureError>(1)
///     })
///     .await??;
/// # let _ = rows;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FixtureManager {
    runtime: Arc<dyn ContainerRuntime>
}

impl FixtureManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Manager backed by the local Docker daemon.
    pub fn docker() -> Self {
        Self::new(Arc::new(TestcontainersRuntime::new()))
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Starts an instance and waits until it is ready.
    ///
    /// The whole call is bounded by `config.startup_timeout()` regardless of
    /// any timeout the caller applies.
    ///
    /// ## Errors
    /// - `Config` if `config` does not validate
    /// - `StartupTimeout` if the service is not reachable in time
    /// - `ResourceUnavailable` if the runtime cannot create the instance
    pub async fn acquire(&self, config: &FixtureConfig) -> FixtureResult<FixtureInstance> {
        self.acquire_with_probe(config, probe_for(config.readiness))
            .await
    }

    pub async fn acquire_with_probe(
        &self,
        config: &FixtureConfig,
        probe: Arc<dyn ReadinessProbe>
    ) -> FixtureResult<FixtureInstance> {
        config.validate().map_err(|e| FixtureError::Config {
            message: e.to_string()
        })?;

        let image = config.image_ref();
        let timeout = config.startup_timeout();
        let spec = ContainerSpec::from(config);
        let began = Instant::now();
        let timed_out = || FixtureError::StartupTimeout {
            image: image.clone(),
            timeout_ms: config.startup_timeout_ms
        };

        let started = match tokio::time::timeout(timeout, self.runtime.start(&spec)).await {
            Ok(Ok(started)) => started,
            Ok(Err(RuntimeError::StartupTimeout { reason })) => {
                tracing::warn!(image = %image, reason = %reason, "Fixture startup timed out");
                return Err(timed_out());
            }
            Ok(Err(e)) => {
                tracing::warn!(image = %image, error = %e, "Failed to start fixture container");
                return Err(FixtureError::ResourceUnavailable {
                    image: image.clone(),
                    reason: e.to_string()
                });
            }
            Err(_) => {
                tracing::warn!(image = %image, timeout_ms = config.startup_timeout_ms, "Fixture start exceeded timeout");
                return Err(timed_out());
            }
        };

        tracing::info!(
            id = %started.id,
            image = %image,
            host = %started.host,
            ports = ?started.ports,
            "Fixture container started"
        );

        let instance = FixtureInstance::new(started, config.clone(), Arc::clone(&self.runtime), probe);
        let remaining = timeout.saturating_sub(began.elapsed());
        if let Err(reason) = instance.wait_ready(remaining).await {
            tracing::warn!(id = %instance.id(), reason = %reason, "Fixture never became ready");
            instance.release().await;
            return Err(timed_out());
        }

        instance.mark_running();
        tracing::info!(
            id = %instance.id(),
            elapsed_ms = began.elapsed().as_millis() as u64,
            "Fixture ready"
        );
        Ok(instance)
    }

    /// Scoped acquisition.
    ///
    /// Acquires an instance, runs `body`, and releases the instance on every
    /// exit path. A panic inside `body` is re-raised after release. An
    /// acquire failure is returned before `body` runs.
    pub async fn with_fixture<F, Fut, T>(&self, config: &FixtureConfig, body: F) -> FixtureResult<T>
    where
        F: FnOnce(Arc<FixtureInstance>) -> Fut,
        Fut: Future<Output = T>
    {
        let instance = Arc::new(self.acquire(config).await?);

        let outcome = AssertUnwindSafe(body(Arc::clone(&instance)))
            .catch_unwind()
            .await;

        instance.release().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{FakeBehavior, FakeRuntime, RuntimeCall};
    use crate::state::FixtureState;
    use config::ReadinessKind;
    use std::time::Duration;

    fn fake_config() -> FixtureConfig {
        let mut config = FixtureConfig::generic("fake", "1", 5432);
        config.readiness = ReadinessKind::Tcp;
        config.poll_interval_ms = 10;
        config.with_startup_timeout(Duration::from_secs(2))
    }

    fn manager(runtime: &Arc<FakeRuntime>) -> FixtureManager {
        FixtureManager::new(Arc::clone(runtime) as Arc<dyn ContainerRuntime>)
    }

    #[tokio::test]
    async fn test_acquire_returns_running_instance() {
        let runtime = Arc::new(FakeRuntime::new());
        let instance = manager(&runtime).acquire(&fake_config()).await.unwrap();

        assert_eq!(instance.state(), FixtureState::Running);
        assert_eq!(instance.host(), "127.0.0.1");
        assert!(instance.mapped_port(5432).is_some());
        assert!(instance.connection().unwrap().connect_tcp().await.is_ok());

        instance.release().await;
    }

    #[tokio::test]
    async fn test_acquire_rejects_invalid_config() {
        let runtime = Arc::new(FakeRuntime::new());
        let mut config = fake_config();
        config.primary_port = 9999;

        let result = manager(&runtime).acquire(&config).await;
        assert!(matches!(result, Err(FixtureError::Config { .. })));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_unreachable_times_out_within_bound() {
        let runtime = Arc::new(FakeRuntime::with_behavior(FakeBehavior {
            unreachable: true,
            ..FakeBehavior::default()
        }));
        let config = fake_config().with_startup_timeout(Duration::from_millis(300));

        let began = Instant::now();
        let result = manager(&runtime).acquire(&config).await;

        assert!(matches!(result, Err(FixtureError::StartupTimeout { timeout_ms: 300, .. })));
        assert!(began.elapsed() < Duration::from_secs(2));
        // the half-started container is cleaned up
        assert_eq!(runtime.running(), 0);
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Stop(_))), 1);
    }

    #[tokio::test]
    async fn test_acquire_slow_runtime_times_out() {
        let runtime = Arc::new(FakeRuntime::with_behavior(FakeBehavior {
            start_delay: Duration::from_secs(30),
            ..FakeBehavior::default()
        }));
        let config = fake_config().with_startup_timeout(Duration::from_millis(200));

        let began = Instant::now();
        let result = manager(&runtime).acquire(&config).await;

        assert!(matches!(result, Err(FixtureError::StartupTimeout { .. })));
        assert!(began.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_acquire_runtime_failure_is_resource_unavailable() {
        let runtime = Arc::new(FakeRuntime::with_behavior(FakeBehavior {
            fail_start: Some("pull access denied for nosuchimage".to_string()),
            ..FakeBehavior::default()
        }));

        let result = manager(&runtime).acquire(&fake_config()).await;
        match result {
            Err(FixtureError::ResourceUnavailable { image, reason }) => {
                assert_eq!(image, "fake:1");
                assert!(reason.contains("pull access denied"));
            }
            other => panic!("expected ResourceUnavailable, got {:?}", other.map(|i| i.state()))
        }
    }

    #[tokio::test]
    async fn test_with_fixture_releases_after_body() {
        let runtime = Arc::new(FakeRuntime::new());
        let value = manager(&runtime)
            .with_fixture(&fake_config(), |instance| async move {
                assert_eq!(instance.state(), FixtureState::Running);
                42
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(runtime.running(), 0);
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Stop(_))), 1);
    }

    #[tokio::test]
    async fn test_with_fixture_releases_on_panic() {
        let runtime = Arc::new(FakeRuntime::new());
        let mgr = manager(&runtime);
        let config = fake_config();

        let result = AssertUnwindSafe(mgr.with_fixture(&config, |_instance| async move {
            panic!("assertion failed inside test body");
        }))
        .catch_unwind()
        .await;

        assert!(result.is_err(), "panic should propagate");
        assert_eq!(runtime.running(), 0);
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Stop(_))), 1);
    }

    #[tokio::test]
    async fn test_with_fixture_releases_on_error_result() {
        let runtime = Arc::new(FakeRuntime::new());
        let result: FixtureResult<Result<(), String>> = manager(&runtime)
            .with_fixture(&fake_config(), |_instance| async move {
                Err("query failed".to_string())
            })
            .await;

        assert_eq!(result.unwrap(), Err("query failed".to_string()));
        assert_eq!(runtime.running(), 0);
    }

    #[tokio::test]
    async fn test_with_fixture_does_not_run_body_when_acquire_fails() {
        let runtime = Arc::new(FakeRuntime::with_behavior(FakeBehavior {
            fail_start: Some("daemon down".to_string()),
            ..FakeBehavior::default()
        }));
        let mut ran = false;

        let result = manager(&runtime)
            .with_fixture(&fake_config(), |_instance| {
                ran = true;
                async {}
            })
            .await;

        assert!(result.is_err());
        assert!(!ran);
    }
}
