//! Health reporting and the periodic health monitor.

use crate::facade::CacheFacade;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Health of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No health check has completed yet.
    Unknown,
    /// The store answered the ping.
    Healthy,
    /// The ping failed.
    Unhealthy,
    /// The breaker rejected the ping without contacting the store.
    CircuitOpen,
}

impl HealthStatus {
    /// Returns the status as a lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::CircuitOpen => "circuit_open",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a health check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// Discriminated status.
    pub status: HealthStatus,
    /// Ping round-trip time; absent when no ping was sent.
    pub latency_ms: Option<u64>,
    /// When the check completed.
    pub checked_at: Option<DateTime<Utc>>,
    /// Failure description, if any.
    pub error: Option<String>,
}

impl HealthReport {
    /// Report for a store that has not been checked yet.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            status: HealthStatus::Unknown,
            latency_ms: None,
            checked_at: None,
            error: None,
        }
    }

    pub(crate) fn healthy(latency: Duration) -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms: Some(millis(latency)),
            checked_at: Some(Utc::now()),
            error: None,
        }
    }

    pub(crate) fn unhealthy(latency: Duration, error: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: Some(millis(latency)),
            checked_at: Some(Utc::now()),
            error: Some(error),
        }
    }

    pub(crate) fn circuit_open(error: String) -> Self {
        Self {
            status: HealthStatus::CircuitOpen,
            latency_ms: None,
            checked_at: Some(Utc::now()),
            error: Some(error),
        }
    }

    /// Whether the store answered.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::unknown()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Shortest period the monitor will tick at.
pub const MIN_HEALTH_INTERVAL: Duration = Duration::from_millis(1);

/// Background task that runs a health check on a fixed interval.
///
/// Each check goes through the breaker, so once the open duration has
/// elapsed the monitor's ping doubles as the half-open probe.
pub struct HealthMonitor {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the monitor on the current runtime.
    ///
    /// Periods shorter than [`MIN_HEALTH_INTERVAL`] are raised to it.
    pub fn spawn(facade: Arc<CacheFacade>, period: Duration) -> Self {
        let period = period.max(MIN_HEALTH_INTERVAL);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        info!(interval_ms = millis(period), "Starting health monitor");

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = HealthStatus::Unknown;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Health monitor received shutdown signal");
                        break;
                    }

                    _ = ticker.tick() => {
                        let report = facade.health_check().await;
                        if report.status != last {
                            match report.status {
                                HealthStatus::Healthy => {
                                    info!(from = %last, latency_ms = ?report.latency_ms, "Remote store healthy");
                                }
                                status => {
                                    warn!(from = %last, to = %status, error = ?report.error, "Remote store health changed");
                                }
                            }
                            last = report.status;
                        }
                    }
                }
            }

            info!("Health monitor stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Whether the monitor task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the monitor to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Health monitor task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::CacheFacadeConfig;
    use crate::store::{InMemoryStore, RemoteStore};

    #[test]
    fn test_status_labels() {
        assert_eq!(HealthStatus::CircuitOpen.to_string(), "circuit_open");
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(HealthReport::default().status, HealthStatus::Unknown);
    }

    #[test]
    fn test_report_constructors() {
        let report = HealthReport::healthy(Duration::from_millis(7));
        assert!(report.is_healthy());
        assert_eq!(report.latency_ms, Some(7));

        let report = HealthReport::circuit_open("open".to_string());
        assert!(!report.is_healthy());
        assert_eq!(report.latency_ms, None);
    }

    #[tokio::test]
    async fn test_monitor_updates_cached_status() {
        let store: Arc<dyn RemoteStore> = Arc::new(InMemoryStore::new());
        let facade = Arc::new(CacheFacade::new(store, CacheFacadeConfig::default()));
        assert_eq!(facade.health_status().status, HealthStatus::Unknown);

        let monitor = HealthMonitor::spawn(Arc::clone(&facade), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(facade.health_status().status, HealthStatus::Healthy);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_period_is_clamped() {
        let store: Arc<dyn RemoteStore> = Arc::new(InMemoryStore::new());
        let facade = Arc::new(CacheFacade::new(store, CacheFacadeConfig::default()));

        let monitor = HealthMonitor::spawn(Arc::clone(&facade), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!monitor.is_finished());
        assert_eq!(facade.health_status().status, HealthStatus::Healthy);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_monitor_stops_on_shutdown() {
        let store: Arc<dyn RemoteStore> = Arc::new(InMemoryStore::new());
        let facade = Arc::new(CacheFacade::new(store, CacheFacadeConfig::default()));

        let monitor = HealthMonitor::spawn(facade, Duration::from_secs(3600));
        tokio::time::timeout(Duration::from_secs(1), monitor.shutdown())
            .await
            .expect("monitor did not stop");
    }
}
