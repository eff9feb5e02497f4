//! Disposable backing-service fixtures for integration tests.
//!
//! A test group acquires its own instance of a real service (PostgreSQL by
//! default), runs against it, injects faults, and releases it:
//! - [`FixtureManager`] starts instances and bounds their startup
//! - [`FixtureInstance`] restarts, partitions and releases one instance
//! - [`ConnectionDescriptor`] tells tests where to connect
//! - [`FixtureGroup`] wraps group-level setup and teardown
//!
//! Nothing is shared through process-wide statics; each group owns the
//! instance it acquired and releases it on every exit path.

mod connection;
mod group;
mod instance;
mod manager;
pub mod probe;
pub mod runtime;
pub mod smoke;
mod state;

pub use connection::ConnectionDescriptor;
pub use group::FixtureGroup;
pub use instance::FixtureInstance;
pub use manager::FixtureManager;
pub use probe::{NotReady, PostgresProbe, ReadinessProbe, TcpProbe};
pub use runtime::{ContainerId, ContainerRuntime, FakeRuntime, PortMap, TestcontainersRuntime};
pub use state::FixtureState;

use std::sync::atomic::{AtomicU32, Ordering};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_generation() {
        let id1 = unique_id("test");
        let id2 = unique_id("test");
        assert_ne!(id1, id2);
        assert!(id1.starts_with("test-"));
        assert!(id2.starts_with("test-"));
    }

    #[test]
    fn test_init_tracing_is_repeatable() {
        init_tracing();
        init_tracing();
    }
}
