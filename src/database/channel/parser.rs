use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::Channel;

static ATTRIBUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([a-zA-Z0-9-]+)="([^"]*)""#).expect("attribute regex is valid"));

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

const DEFAULT_GROUP: &str = "General";

/// reads the extended m3u channel list, not to be confused with the hls manifests the proxy
/// rewrites
pub struct PlaylistParser;

impl PlaylistParser {
    pub fn parse(content: &str) -> Vec<Channel> {
        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        let mut channels = Vec::new();
        let mut id_counts: HashMap<String, usize> = HashMap::new();

        let mut i = 0;
        while i < lines.len() {
            let Some(metadata) = lines[i].strip_prefix("#EXTINF:") else {
                i += 1;
                continue;
            };

            // the stream url is the next line that isn't blank or an option line like
            // #EXTVLCOPT, another #EXTINF means this entry never got one
            let mut j = i + 1;
            while j < lines.len()
                && (lines[j].is_empty()
                    || (lines[j].starts_with('#') && !lines[j].starts_with("#EXTINF:")))
            {
                j += 1;
            }

            if j >= lines.len() || lines[j].starts_with("#EXTINF:") {
                debug!("Dropping playlist entry without url: {}", metadata);
                i = j;
                continue;
            }

            let attributes: HashMap<&str, &str> = ATTRIBUTE_RE
                .captures_iter(metadata)
                .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
                .collect();
            let attribute = |key: &str| attributes.get(key).copied().filter(|v| !v.is_empty());

            // display name is whatever comes after the last comma
            let display_name = metadata
                .rfind(',')
                .map_or(metadata, |idx| &metadata[idx + 1..])
                .trim();

            let base_id = attribute("tvg-id")
                .map(str::to_string)
                .unwrap_or_else(|| WHITESPACE_RE.replace_all(display_name, "-").into_owned());

            let count = id_counts.entry(base_id.clone()).or_insert(0);
            *count += 1;
            let id = if *count == 1 {
                base_id
            } else {
                format!("{}-{}", base_id, count)
            };

            channels.push(Channel {
                id,
                name: attribute("tvg-name").unwrap_or(display_name).to_string(),
                url: lines[j].to_string(),
                logo: attribute("tvg-logo").unwrap_or_default().to_string(),
                group: attribute("group-title").unwrap_or(DEFAULT_GROUP).to_string(),
            });

            i = j + 1;
        }

        channels
    }
}
