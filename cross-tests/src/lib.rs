//! Shared glue for the suites under `tests/`.
//!
//! Every suite runs against a real PostgreSQL container. When no container
//! runtime is reachable the suites print a skip notice and pass, the same way
//! the storage tests treat a missing Docker daemon.

use config::FixtureConfig;
use errors::{FixtureError, FixtureResult};
use sqlx::PgConnection;
use std::time::Duration;
use testing::{FixtureInstance, FixtureManager};

/// PostgreSQL fixture with a startup bound suited to CI.
pub fn postgres_config() -> FixtureConfig {
    FixtureConfig::postgres().with_startup_timeout(Duration::from_secs(90))
}

/// Acquires a PostgreSQL fixture, or returns `None` when Docker is missing.
pub async fn postgres_or_skip(test: &str) -> Option<(FixtureManager, FixtureInstance)> {
    testing::init_tracing();
    let manager = FixtureManager::docker();
    match manager.acquire(&postgres_config()).await {
        Ok(instance) => Some((manager, instance)),
        Err(FixtureError::ResourceUnavailable { reason, .. }) => {
            eprintln!("Skipping {test}: Docker not available ({reason})");
            None
        }
        Err(e) => panic!("{test}: fixture acquisition failed: {e}")
    }
}

pub async fn create_test_table(conn: &mut PgConnection) -> FixtureResult<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS test_table (id SERIAL PRIMARY KEY, name TEXT NOT NULL)")
        .execute(conn)
        .await
        .map_err(database_error)?;
    Ok(())
}

pub async fn insert_name(conn: &mut PgConnection, name: &str) -> FixtureResult<()> {
    sqlx::query("INSERT INTO test_table (name) VALUES ($1)")
        .bind(name)
        .execute(conn)
        .await
        .map_err(database_error)?;
    Ok(())
}

pub async fn count_names(conn: &mut PgConnection, names: &[&str]) -> FixtureResult<i64> {
    let names: Vec<String> = names.iter().map(|n| (*n).to_string()).collect();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM test_table WHERE name = ANY($1)")
        .bind(names)
        .fetch_one(conn)
        .await
        .map_err(database_error)?;
    Ok(count)
}

fn database_error(error: sqlx::Error) -> FixtureError {
    FixtureError::Database {
        endpoint: "test_table".to_string(),
        reason: error.to_string()
    }
}
