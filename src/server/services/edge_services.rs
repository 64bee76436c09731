use std::{sync::Arc, time::Duration};

use anyhow::Context;
use reqwest::redirect;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    database::PlaylistFile,
    server::services::{
        allowlist_services::Allowlist, channels_services::ChannelsService,
        manifest_services::ManifestRewriter,
    },
};

use super::channels_services::DynChannelsService;

const MAX_REDIRECTS: usize = 10;

/// everything a request handler needs, built once at startup and shared read-only between
/// requests
#[derive(Clone)]
pub struct EdgeServices {
    pub allowlist: Arc<Allowlist>,
    pub rewriter: Arc<ManifestRewriter>,
    pub channels: DynChannelsService,
    pub http: reqwest::Client,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub async fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        info!("starting edge services...");

        let playlist = PlaylistFile::new(&config.playlist_path);
        let channels = Arc::new(ChannelsService::from_file(&playlist).await) as DynChannelsService;

        Self::with_channels(config, channels)
    }

    pub fn with_channels(
        config: Arc<AppConfig>,
        channels: DynChannelsService,
    ) -> anyhow::Result<Self> {
        let allowlist = Arc::new(Allowlist::new(&config.trusted_domains));
        info!(
            "allowlist ok, trusting {} domain(s): {}",
            allowlist.domains().len(),
            allowlist.domains().join(", ")
        );

        let rewriter = Arc::new(ManifestRewriter::new(
            allowlist.clone(),
            config.proxy_route(),
        ));

        let http = Self::build_http_client(&config, allowlist.clone())?;

        Ok(Self {
            allowlist,
            rewriter,
            channels,
            http,
            config,
        })
    }

    // a redirect is a new upstream request, so every hop has to pass the allowlist just like the
    // url the player asked for
    fn build_http_client(
        config: &AppConfig,
        allowlist: Arc<Allowlist>,
    ) -> anyhow::Result<reqwest::Client> {
        let redirect_policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if allowlist.is_trusted_url(attempt.url()) {
                attempt.follow()
            } else {
                warn!("Refusing redirect to untrusted url: {}", attempt.url());
                attempt.error("redirected to a URL that is not allowed")
            }
        });

        reqwest::Client::builder()
            .user_agent(config.upstream_user_agent.clone())
            // per read, a segment a slow player is draining can take as long as it needs
            .read_timeout(Duration::from_secs(config.upstream_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(redirect_policy)
            .build()
            .context("Failed to build upstream http client")
    }
}
