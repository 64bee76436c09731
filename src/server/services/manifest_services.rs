// manifest rewriting is done line by line instead of parsing the whole playlist into a model, the
// origin gets its manifest back byte for byte except for the uris we swap out. Directives we
// don't know about can't get mangled that way.
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::server::{services::allowlist_services::Allowlist, utils::url_utils::UrlUtil};

const MANIFEST_CONTENT_TYPES: [&str; 4] = [
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "audio/mpegurl",
    "audio/x-mpegurl",
];

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Manifest,
    Binary,
}

impl BodyKind {
    /// content-type wins when it's one we recognize, the `.m3u8` suffix is only the fallback for
    /// origins that send text/plain or octet-stream for everything
    pub fn classify(content_type: Option<&str>, target: &Url) -> Self {
        if let Some(content_type) = content_type {
            let mime = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();

            if MANIFEST_CONTENT_TYPES.contains(&mime.as_str()) {
                return Self::Manifest;
            }
            if mime.starts_with("video/") || mime.starts_with("audio/") || mime.starts_with("image/")
            {
                return Self::Binary;
            }
        }

        if has_manifest_suffix(target) {
            Self::Manifest
        } else {
            Self::Binary
        }
    }
}

/// `.m3u8`/`.m3u` on the path, the query string doesn't count
pub fn has_manifest_suffix(target: &Url) -> bool {
    let path = target.path().to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

/// decryption keys change with the stream so they're never cached
pub fn is_key_asset(target: &Url) -> bool {
    target.path().to_ascii_lowercase().ends_with(".key")
}

/// one `NAME=VALUE` pair of an hls attribute list, value offsets exclude the quotes
#[derive(Debug, PartialEq, Eq)]
struct Attribute<'a> {
    name: &'a str,
    value_start: usize,
    value_end: usize,
    quoted: bool,
}

// quoted strings can hold commas, everything else runs until the next comma. Pieces without an
// `=` (the duration of #EXTINF for one) are skipped.
fn parse_attribute_list(list: &str) -> Vec<Attribute<'_>> {
    let bytes = list.as_bytes();
    let mut attributes = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }

        let name_start = i;
        while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b',' {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        if bytes[i] == b',' {
            i += 1;
            continue;
        }

        let name = list[name_start..i].trim();
        i += 1;

        if bytes.get(i) == Some(&b'"') {
            let value_start = i + 1;
            let Some(len) = list[value_start..].find('"') else {
                // unterminated, leave the rest of the line alone
                break;
            };
            attributes.push(Attribute {
                name,
                value_start,
                value_end: value_start + len,
                quoted: true,
            });
            i = value_start + len + 1;
        } else {
            let value_start = i;
            while i < bytes.len() && bytes[i] != b',' {
                i += 1;
            }
            attributes.push(Attribute {
                name,
                value_start,
                value_end: i,
                quoted: false,
            });
        }

        while i < bytes.len() && bytes[i] != b',' {
            i += 1;
        }
        i += 1;
    }

    attributes
}

fn is_uri_attribute(name: &str) -> bool {
    name == "URI" || name.ends_with("-URI")
}

pub struct ManifestRewriter {
    allowlist: Arc<Allowlist>,
    proxy_path: String,
    marker: String,
}

impl ManifestRewriter {
    pub fn new(allowlist: Arc<Allowlist>, proxy_path: impl Into<String>) -> Self {
        let proxy_path = proxy_path.into();
        let marker = format!("{}?url=", proxy_path);

        Self {
            allowlist,
            proxy_path,
            marker,
        }
    }

    /// rewrite every trusted uri in `text` to go through the proxy, `base` is the url the
    /// manifest was fetched from. Running it over its own output changes nothing.
    pub fn rewrite(&self, text: &str, base: &Url) -> String {
        let mut out = String::with_capacity(text.len() + text.len() / 2);

        let body = match text.strip_prefix(BOM) {
            Some(rest) => {
                out.push(BOM);
                rest
            }
            None => text,
        };

        for raw_line in body.split_inclusive('\n') {
            let line = raw_line
                .strip_suffix("\r\n")
                .or_else(|| raw_line.strip_suffix('\n'))
                .unwrap_or(raw_line);

            self.rewrite_line(line, base, &mut out);
            out.push_str(&raw_line[line.len()..]);
        }

        out
    }

    fn rewrite_line(&self, line: &str, base: &Url, out: &mut String) {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            out.push_str(line);
            return;
        }

        if trimmed.starts_with('#') {
            if trimmed.starts_with("#EXT") {
                self.rewrite_directive(line, base, out);
            } else {
                out.push_str(line);
            }
            return;
        }

        // anything else is a segment or variant playlist uri
        let start = line.len() - line.trim_start().len();
        let end = start + trimmed.len();

        out.push_str(&line[..start]);
        match self.rewrite_uri(trimmed, base) {
            Some(proxied) => out.push_str(&proxied),
            None => out.push_str(trimmed),
        }
        out.push_str(&line[end..]);
    }

    fn rewrite_directive(&self, line: &str, base: &Url, out: &mut String) {
        let Some(colon) = line.find(':') else {
            out.push_str(line);
            return;
        };
        let list_start = colon + 1;

        // copy everything up to each replaced value, then the replacement
        let mut copied = 0;
        for attribute in parse_attribute_list(&line[list_start..]) {
            if !attribute.quoted || !is_uri_attribute(attribute.name) {
                continue;
            }

            let value_start = list_start + attribute.value_start;
            let value_end = list_start + attribute.value_end;

            if let Some(proxied) = self.rewrite_uri(&line[value_start..value_end], base) {
                out.push_str(&line[copied..value_start]);
                out.push_str(&proxied);
                copied = value_end;
            }
        }
        out.push_str(&line[copied..]);
    }

    /// `None` means leave the uri exactly as the origin wrote it
    fn rewrite_uri(&self, uri: &str, base: &Url) -> Option<String> {
        if uri.is_empty() || uri.contains(&self.marker) {
            return None;
        }

        let absolute = match UrlUtil::resolve(uri, base) {
            Ok(absolute) => absolute,
            Err(e) => {
                warn!("Failed to resolve manifest uri {} against {}: {}", uri, base, e);
                return None;
            }
        };

        if !self.allowlist.is_trusted(&absolute) {
            debug!("Leaving untrusted uri unproxied: {}", absolute);
            return None;
        }

        Some(UrlUtil::proxy_url(&self.proxy_path, &absolute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn content_type_takes_precedence_over_suffix() {
        let playlist = url("https://trusted.example/live/chan.m3u8");
        let segment = url("https://trusted.example/live/seg1.ts");

        assert_eq!(
            BodyKind::classify(Some("application/vnd.apple.mpegurl"), &segment),
            BodyKind::Manifest
        );
        assert_eq!(
            BodyKind::classify(Some("Application/X-MpegURL; charset=utf-8"), &segment),
            BodyKind::Manifest
        );
        assert_eq!(
            BodyKind::classify(Some("video/mp2t"), &playlist),
            BodyKind::Binary
        );
        assert_eq!(
            BodyKind::classify(Some("text/plain"), &playlist),
            BodyKind::Manifest
        );
        assert_eq!(BodyKind::classify(None, &playlist), BodyKind::Manifest);
        assert_eq!(BodyKind::classify(None, &segment), BodyKind::Binary);
    }

    #[test]
    fn suffix_ignores_query_string() {
        let with_query = url("https://trusted.example/chan.m3u8?token=abc");
        let fake = url("https://trusted.example/seg.ts?next=x.m3u8");

        assert_eq!(BodyKind::classify(None, &with_query), BodyKind::Manifest);
        assert_eq!(BodyKind::classify(None, &fake), BodyKind::Binary);
    }

    #[test]
    fn key_assets_by_extension() {
        assert!(is_key_asset(&url("https://trusted.example/keys/a.KEY")));
        assert!(!is_key_asset(&url("https://trusted.example/seg.ts?k=.key")));
    }

    #[test]
    fn attribute_list_handles_quoted_commas() {
        let list = r#"METHOD=AES-128,URI="https://x/k?a=1,b=2",IV=0x1F"#;
        let attributes = parse_attribute_list(list);

        let names: Vec<&str> = attributes.iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["METHOD", "URI", "IV"]);

        let uri = &attributes[1];
        assert!(uri.quoted);
        assert_eq!(&list[uri.value_start..uri.value_end], "https://x/k?a=1,b=2");
        assert_eq!(
            &list[attributes[2].value_start..attributes[2].value_end],
            "0x1F"
        );
    }

    #[test]
    fn attribute_list_skips_bare_values() {
        let attributes = parse_attribute_list("10.0,title");
        assert!(attributes.is_empty());
    }

    #[test]
    fn unterminated_quote_stops_parsing() {
        let attributes = parse_attribute_list(r#"METHOD=AES-128,URI="https://x/k"#);
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].name, "METHOD");
    }

    #[test]
    fn uri_attribute_names() {
        assert!(is_uri_attribute("URI"));
        assert!(is_uri_attribute("X-ASSET-URI"));
        assert!(!is_uri_attribute("METHOD"));
        assert!(!is_uri_attribute("URIS"));
    }
}
