//! Readiness probes.
//!
//! A container being started says nothing about the service inside accepting
//! connections. The lifecycle manager polls a probe until it succeeds.

use crate::connection::ConnectionDescriptor;
use async_trait::async_trait;
use config::ReadinessKind;
use sqlx::Connection;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// One attempt. `Err` carries the reason for logging.
    async fn check(&self, target: &ConnectionDescriptor) -> Result<(), String>;
}

/// Ready once a TCP connect succeeds.
pub struct TcpProbe;

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn check(&self, target: &ConnectionDescriptor) -> Result<(), String> {
        target
            .connect_tcp()
            .await
            .map(drop)
            .map_err(|e| e.to_string())
    }
}

/// Ready once a PostgreSQL login and `SELECT 1` succeed.
pub struct PostgresProbe;

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    async fn check(&self, target: &ConnectionDescriptor) -> Result<(), String> {
        let mut conn = target.connect().await.map_err(|e| e.to_string())?;
        sqlx::query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(|e| e.to_string())?;
        conn.close().await.map_err(|e| e.to_string())
    }
}

pub fn probe_for(kind: ReadinessKind) -> Arc<dyn ReadinessProbe> {
    match kind {
        ReadinessKind::Tcp => Arc::new(TcpProbe),
        ReadinessKind::Postgres => Arc::new(PostgresProbe)
    }
}

/// Why [`wait_until_ready`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReady {
    /// The target's instance was released while polling.
    Released,
    /// No attempt succeeded in time.
    TimedOut { last_error: String, attempts: u32 }
}

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Released => write!(f, "instance released"),
            Self::TimedOut {
                last_error,
                attempts
            } => write!(f, "{last_error} (after {attempts} attempts)")
        }
    }
}

/// Polls `probe` every `interval` until it succeeds or `timeout` elapses.
///
/// Stops early with [`NotReady::Released`] once `target` is no longer valid.
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    target: &ConnectionDescriptor,
    timeout: Duration,
    interval: Duration
) -> Result<(), NotReady> {
    let mut last_error = String::from("no attempt made");
    let mut attempts: u32 = 0;

    let polled = tokio::time::timeout(timeout, async {
        loop {
            if !target.is_valid() {
                return Err(NotReady::Released);
            }
            attempts += 1;
            match probe.check(target).await {
                Ok(()) => return Ok(()),
                Err(reason) => {
                    tracing::debug!(
                        endpoint = %target.endpoint(),
                        attempt = attempts,
                        reason = %reason,
                        "Fixture not ready yet"
                    );
                    last_error = reason;
                }
            }
            tokio::time::sleep(interval).await;
        }
    })
    .await;

    match polled {
        Ok(Ok(())) => Ok(()),
        Ok(Err(not_ready)) => Err(not_ready),
        Err(_) if !target.is_valid() => Err(NotReady::Released),
        Err(_) => Err(NotReady::TimedOut {
            last_error,
            attempts
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Credentials;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn descriptor(port: u16) -> ConnectionDescriptor {
        ConnectionDescriptor::new(
            "127.0.0.1".to_string(),
            port,
            Credentials::default(),
            Arc::new(AtomicBool::new(true))
        )
    }

    struct FlakyProbe {
        failures_left: AtomicU32
    }

    #[async_trait]
    impl ReadinessProbe for FlakyProbe {
        async fn check(&self, _target: &ConnectionDescriptor) -> Result<(), String> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left == 0 {
                Ok(())
            } else {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                Err(format!("{left} failures left"))
            }
        }
    }

    #[tokio::test]
    async fn test_wait_until_ready_retries() {
        let probe = FlakyProbe {
            failures_left: AtomicU32::new(3)
        };
        let result = wait_until_ready(
            &probe,
            &descriptor(1),
            Duration::from_secs(2),
            Duration::from_millis(10)
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_until_ready_times_out_with_reason() {
        let probe = FlakyProbe {
            failures_left: AtomicU32::new(u32::MAX)
        };
        let started = std::time::Instant::now();
        let result = wait_until_ready(
            &probe,
            &descriptor(1),
            Duration::from_millis(100),
            Duration::from_millis(10)
        )
        .await;

        match result {
            Err(NotReady::TimedOut {
                last_error,
                attempts
            }) => {
                assert!(last_error.contains("failures left"));
                assert!(attempts > 1);
            }
            other => panic!("expected TimedOut, got {other:?}")
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_until_ready_stops_when_target_released() {
        let probe = FlakyProbe {
            failures_left: AtomicU32::new(u32::MAX)
        };
        let alive = Arc::new(AtomicBool::new(true));
        let target = ConnectionDescriptor::new(
            "127.0.0.1".to_string(),
            1,
            Credentials::default(),
            Arc::clone(&alive)
        );

        let flag = Arc::clone(&alive);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(false, Ordering::SeqCst);
        });

        let started = std::time::Instant::now();
        let result = wait_until_ready(
            &probe,
            &target,
            Duration::from_secs(10),
            Duration::from_millis(10)
        )
        .await;

        assert_eq!(result, Err(NotReady::Released));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_tcp_probe_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(TcpProbe.check(&descriptor(port)).await.is_ok());

        drop(listener);
        assert!(TcpProbe.check(&descriptor(port)).await.is_err());
    }
}
