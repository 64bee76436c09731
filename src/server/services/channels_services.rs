use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::error;

use crate::{
    database::{Channel, PlaylistFile},
    server::error::{AppResult, Error},
};

pub type DynChannelsService = Arc<dyn ChannelsServiceTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait ChannelsServiceTrait {
    /// every channel, or only the ones in `group` when given
    async fn list(&self, group: Option<String>) -> Vec<Channel>;

    async fn get(&self, id: String) -> AppResult<Channel>;

    /// sorted, no duplicates
    async fn groups(&self) -> Vec<String>;
}

pub struct ChannelsService {
    channels: Vec<Channel>,
}

impl ChannelsService {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    // a broken playlist shouldn't take the proxy down with it, the channel api just comes up
    // empty
    pub async fn from_file(file: &PlaylistFile) -> Self {
        match file.load().await {
            Ok(channels) => Self::new(channels),
            Err(e) => {
                error!("Playlist unavailable, serving no channels: {:#}", e);
                Self::new(Vec::new())
            }
        }
    }
}

#[async_trait]
impl ChannelsServiceTrait for ChannelsService {
    async fn list(&self, group: Option<String>) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|c| group.as_deref().is_none_or(|g| c.group == g))
            .cloned()
            .collect()
    }

    async fn get(&self, id: String) -> AppResult<Channel> {
        self.channels
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("channel {}", id)))
    }

    async fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.channels.iter().map(|c| c.group.clone()).collect();
        groups.sort();
        groups.dedup();
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, group: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: id.to_string(),
            url: format!("https://trusted.example/{}.m3u8", id),
            logo: String::new(),
            group: group.to_string(),
        }
    }

    fn service() -> ChannelsService {
        ChannelsService::new(vec![
            channel("a", "News"),
            channel("b", "Sports"),
            channel("c", "News"),
        ])
    }

    #[tokio::test]
    async fn filters_by_group() {
        let ids: Vec<String> = service()
            .list(Some("News".to_string()))
            .await
            .into_iter()
            .map(|c| c.id)
            .collect();

        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(service().list(None).await.len(), 3);
    }

    #[tokio::test]
    async fn missing_channel_is_not_found() {
        assert_eq!(service().get("b".to_string()).await.unwrap().group, "Sports");
        assert!(matches!(
            service().get("zzz".to_string()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn groups_are_unique_and_sorted() {
        assert_eq!(service().groups().await, vec!["News", "Sports"]);
    }

    #[tokio::test]
    async fn unreadable_playlist_yields_no_channels() {
        let file = PlaylistFile::new("/definitely/not/here.m3u");
        let service = ChannelsService::from_file(&file).await;
        assert!(service.list(None).await.is_empty());
    }
}
