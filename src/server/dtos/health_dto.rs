use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub environment: String,
    pub services: ServiceHealthDetails,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealthDetails {
    pub allowlist: AllowlistHealth,
    pub playlist: PlaylistHealth,
}

#[derive(Debug, Serialize)]
pub struct AllowlistHealth {
    pub status: HealthStatus,
    pub trusted_domains: usize,
}

#[derive(Debug, Serialize)]
pub struct PlaylistHealth {
    pub status: HealthStatus,
    pub channels: usize,
}
