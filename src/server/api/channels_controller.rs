use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    routing::get,
};

use crate::server::{
    dtos::channel_dto::{ChannelDto, ChannelsQuery},
    error::AppResult,
    services::edge_services::EdgeServices,
};

pub struct ChannelsController;

impl ChannelsController {
    pub fn app() -> Router {
        Router::new()
            .route("/api/channels", get(Self::list_channels))
            .route("/api/channels/groups", get(Self::list_groups))
            .route("/api/channels/{id}", get(Self::get_channel))
    }

    async fn list_channels(
        Extension(services): Extension<EdgeServices>,
        Query(query): Query<ChannelsQuery>,
    ) -> Json<Vec<ChannelDto>> {
        let proxy_route = services.config.proxy_route();
        let channels = services
            .channels
            .list(query.group)
            .await
            .into_iter()
            .map(|c| ChannelDto::from_channel(c, &services.allowlist, &proxy_route))
            .collect();

        Json(channels)
    }

    async fn get_channel(
        Extension(services): Extension<EdgeServices>,
        Path(id): Path<String>,
    ) -> AppResult<Json<ChannelDto>> {
        let channel = services.channels.get(id).await?;

        Ok(Json(ChannelDto::from_channel(
            channel,
            &services.allowlist,
            &services.config.proxy_route(),
        )))
    }

    async fn list_groups(Extension(services): Extension<EdgeServices>) -> Json<Vec<String>> {
        Json(services.channels.groups().await)
    }
}
