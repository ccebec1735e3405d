use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::OrderCache;
use crate::store::OrderStore;

// ============================================================================
// Health Reporting
// ============================================================================
//
// store down -> Unhealthy (nothing can be served)
// cache down -> Degraded  (reads fall back to the store)
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded(_))
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    #[serde(flatten)]
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

impl SystemHealth {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        Self {
            overall_status: compute_overall_status(&components),
            components,
        }
    }
}

pub fn compute_overall_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut unhealthy_components = Vec::new();
    let mut degraded = false;

    for component in components {
        match &component.status {
            HealthStatus::Unhealthy(msg) => {
                unhealthy_components.push(format!("{}: {}", component.name, msg));
            }
            HealthStatus::Degraded(_) => {
                degraded = true;
            }
            HealthStatus::Healthy => {}
        }
    }

    if !unhealthy_components.is_empty() {
        HealthStatus::Unhealthy(unhealthy_components.join(", "))
    } else if degraded {
        HealthStatus::Degraded("Some components degraded".to_string())
    } else {
        HealthStatus::Healthy
    }
}

/// Probes the store and cache on demand
pub struct HealthChecker {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<dyn OrderCache>, probe_timeout: Duration) -> Self {
        Self {
            store,
            cache,
            probe_timeout,
        }
    }

    pub async fn check(&self) -> SystemHealth {
        let (store, cache) = tokio::join!(self.check_store(), self.check_cache());
        let health = SystemHealth::from_components(vec![store, cache]);

        if !health.overall_status.is_healthy() {
            tracing::warn!(status = ?health.overall_status, "Health check not fully healthy");
        }
        health
    }

    async fn check_store(&self) -> ComponentHealth {
        let status = match tokio::time::timeout(self.probe_timeout, self.store.ping()).await {
            Ok(Ok(())) => HealthStatus::Healthy,
            Ok(Err(e)) => HealthStatus::Unhealthy(e.to_string()),
            Err(_) => HealthStatus::Unhealthy("ping timed out".to_string()),
        };
        ComponentHealth::new("store", status)
    }

    async fn check_cache(&self) -> ComponentHealth {
        let status = match tokio::time::timeout(self.probe_timeout, self.cache.ping()).await {
            Ok(Ok(())) => HealthStatus::Healthy,
            Ok(Err(e)) => HealthStatus::Degraded(e.to_string()),
            Err(_) => HealthStatus::Degraded("ping timed out".to_string()),
        };
        ComponentHealth::new("cache", status)
    }
}
