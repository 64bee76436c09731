use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed percent escape at byte {0}")]
    MalformedEscape(usize),

    #[error("decoded value is not valid utf-8")]
    InvalidUtf8,
}

pub struct UrlUtil;

impl UrlUtil {
    pub fn has_http_scheme(candidate: &str) -> bool {
        let lower = candidate
            .get(..8)
            .unwrap_or(candidate)
            .to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// turn a uri found inside a manifest into an absolute one, using the manifest's own url as
    /// the base. absolute http(s) uris come back untouched so the bytes we proxy are the bytes
    /// the origin wrote
    pub fn resolve(candidate: &str, base: &Url) -> Result<String, url::ParseError> {
        if Self::has_http_scheme(candidate) {
            return Ok(candidate.to_string());
        }

        base.join(candidate).map(String::from)
    }

    /// same-origin uri that routes `absolute` back through the proxy
    pub fn proxy_url(proxy_path: &str, absolute: &str) -> String {
        format!("{}?url={}", proxy_path, urlencoding::encode(absolute))
    }

    /// raw, still percent-encoded value of the first `url` query parameter
    ///
    /// axum's Query would decode for us but it can't tell a missing parameter apart from a
    /// broken one, so we pull it out by hand
    pub fn extract_url_param(raw_query: &str) -> Option<&str> {
        raw_query
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(key, _)| *key == "url")
            .map(|(_, value)| value)
    }

    /// form-style decoding, `+` is a space and every `%` must be followed by two hex digits
    pub fn decode_url_param(raw: &str) -> Result<String, DecodeError> {
        let bytes = raw.as_bytes();
        let mut decoded = Vec::with_capacity(bytes.len());

        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'+' => {
                    decoded.push(b' ');
                    i += 1;
                }
                b'%' => {
                    let hex = bytes
                        .get(i + 1..i + 3)
                        .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                        .and_then(|h| std::str::from_utf8(h).ok())
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                        .ok_or(DecodeError::MalformedEscape(i))?;
                    decoded.push(hex);
                    i += 3;
                }
                b => {
                    decoded.push(b);
                    i += 1;
                }
            }
        }

        String::from_utf8(decoded).map_err(|_| DecodeError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://trusted.example/path/chan.m3u8").unwrap()
    }

    #[test]
    fn resolves_relative_against_manifest_directory() {
        assert_eq!(
            UrlUtil::resolve("seg001.ts", &base()).unwrap(),
            "https://trusted.example/path/seg001.ts"
        );
        assert_eq!(
            UrlUtil::resolve("../keys/k.key", &base()).unwrap(),
            "https://trusted.example/keys/k.key"
        );
        assert_eq!(
            UrlUtil::resolve("/root.m3u8", &base()).unwrap(),
            "https://trusted.example/root.m3u8"
        );
        assert_eq!(
            UrlUtil::resolve("//cdn.trusted.example/a.ts", &base()).unwrap(),
            "https://cdn.trusted.example/a.ts"
        );
    }

    #[test]
    fn absolute_uris_are_returned_verbatim() {
        let odd = "HTTP://Trusted.Example/a/../b.ts";
        assert_eq!(UrlUtil::resolve(odd, &base()).unwrap(), odd);
    }

    #[test]
    fn unresolvable_uris_error() {
        assert!(UrlUtil::resolve("//[::1", &base()).is_err());
    }

    #[test]
    fn proxy_url_encodes_like_encode_uri_component() {
        assert_eq!(
            UrlUtil::proxy_url("/proxy", "https://trusted.example/a/key.bin?x=1&y=2"),
            "/proxy?url=https%3A%2F%2Ftrusted.example%2Fa%2Fkey.bin%3Fx%3D1%26y%3D2"
        );
    }

    #[test]
    fn extracts_first_url_param() {
        assert_eq!(
            UrlUtil::extract_url_param("a=1&url=https%3A%2F%2Fx&url=second"),
            Some("https%3A%2F%2Fx")
        );
        assert_eq!(UrlUtil::extract_url_param("url"), Some(""));
        assert_eq!(UrlUtil::extract_url_param("urls=1"), None);
    }

    #[test]
    fn decodes_and_rejects_broken_escapes() {
        assert_eq!(
            UrlUtil::decode_url_param("https%3A%2F%2Fx.example%2Fa+b.m3u8").unwrap(),
            "https://x.example/a b.m3u8"
        );
        assert_eq!(
            UrlUtil::decode_url_param("https%3A%2F%2Fx%zz"),
            Err(DecodeError::MalformedEscape(15))
        );
        assert_eq!(
            UrlUtil::decode_url_param("%E0%A4%A"),
            Err(DecodeError::MalformedEscape(6))
        );
        assert_eq!(
            UrlUtil::decode_url_param("%FF%FE"),
            Err(DecodeError::InvalidUtf8)
        );
    }
}
