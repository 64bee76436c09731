use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use super::channel::{Channel, PlaylistParser};

/// the playlist lives on disk next to the binary, there's no real database behind the channel api
#[derive(Debug, Clone)]
pub struct PlaylistFile {
    pub path: PathBuf,
}

impl PlaylistFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub async fn load(&self) -> anyhow::Result<Vec<Channel>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read playlist {}", self.path.display()))?;

        let channels = PlaylistParser::parse(&content);
        info!(
            "Loaded {} channels from {}",
            channels.len(),
            self.path.display()
        );

        Ok(channels)
    }
}
