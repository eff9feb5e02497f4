use crate::connection::ConnectionDescriptor;
use crate::instance::FixtureInstance;
use crate::manager::FixtureManager;
use config::FixtureConfig;
use errors::{FixtureError, FixtureResult};
use std::sync::Arc;

/// Group-level setup and teardown around one fixture.
///
/// `setup` acquires the instance once for a group of tests; the tests share
/// it through [`FixtureGroup::instance`]. `teardown` releases it and may be
/// called any number of times, including on a group whose setup produced no
/// instance.
pub struct FixtureGroup {
    name: String,
    instance: Option<Arc<FixtureInstance>>
}

impl FixtureGroup {
    pub async fn setup(
        name: &str,
        manager: &FixtureManager,
        config: &FixtureConfig
    ) -> FixtureResult<Self> {
        let instance = manager.acquire(config).await?;
        let descriptor = instance.connection()?;
        tracing::info!(
            group = name,
            id = %instance.id(),
            endpoint = %descriptor.endpoint(),
            "Fixture group ready"
        );
        Ok(Self {
            name: name.to_string(),
            instance: Some(Arc::new(instance))
        })
    }

    /// A group with nothing to tear down, for setups that failed.
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            instance: None
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> FixtureResult<Arc<FixtureInstance>> {
        self.instance
            .clone()
            .ok_or_else(|| FixtureError::invalid_state("use group fixture", "torn down"))
    }

    pub fn connection(&self) -> FixtureResult<ConnectionDescriptor> {
        self.instance()?.connection()
    }

    /// `DB_HOST`/`DB_PORT` and friends for child processes.
    pub fn env_vars(&self) -> FixtureResult<Vec<(&'static str, String)>> {
        Ok(self.connection()?.env_vars())
    }

    pub async fn teardown(&mut self) {
        if let Some(instance) = self.instance.take() {
            instance.release().await;
            tracing::info!(group = %self.name, "Fixture group torn down");
        }
    }
}
