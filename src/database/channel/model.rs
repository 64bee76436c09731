use serde::{Deserialize, Serialize};

/// one `#EXTINF` entry of the playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub url: String,
    pub logo: String,
    pub group: String,
}
