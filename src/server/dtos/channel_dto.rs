use serde::{Deserialize, Serialize};

use crate::{
    database::Channel,
    server::{services::allowlist_services::Allowlist, utils::url_utils::UrlUtil},
};

#[derive(Debug, Deserialize)]
pub struct ChannelsQuery {
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDto {
    pub id: String,
    pub name: String,
    pub url: String,
    pub logo: String,
    pub group: String,
    /// where the player should load the stream from, `None` when the origin isn't trusted and
    /// has to be played directly
    pub proxy_url: Option<String>,
}

impl ChannelDto {
    pub fn from_channel(channel: Channel, allowlist: &Allowlist, proxy_route: &str) -> Self {
        let proxy_url = allowlist
            .is_trusted(&channel.url)
            .then(|| UrlUtil::proxy_url(proxy_route, &channel.url));

        Self {
            id: channel.id,
            name: channel.name,
            url: channel.url,
            logo: channel.logo,
            group: channel.group,
            proxy_url,
        }
    }
}
