use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;

use crate::server::dtos::health_dto::{
    AllowlistHealth, HealthResponse, HealthStatus, PlaylistHealth, ServiceHealthDetails,
};
use crate::server::services::edge_services::EdgeServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// nothing external to ping, so health is about configuration: an empty allowlist or playlist
/// still serves but isn't much use
pub async fn health_endpoint(
    Extension(services): Extension<EdgeServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let allowlist = AllowlistHealth {
        status: if services.allowlist.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        },
        trusted_domains: services.allowlist.domains().len(),
    };

    let channels = services.channels.list(None).await.len();
    let playlist = PlaylistHealth {
        status: if channels == 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        },
        channels,
    };

    let overall_status = if allowlist.status == HealthStatus::Healthy
        && playlist.status == HealthStatus::Healthy
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            allowlist,
            playlist,
        },
    };

    // degraded still proxies, so the load balancer keeps it in rotation
    (StatusCode::OK, Json(response))
}
