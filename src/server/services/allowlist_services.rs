use tracing::debug;
use url::{Host, Url};

/// upstream hosts the proxy is allowed to talk to
///
/// an entry trusts itself and every proper subdomain of itself, so `example.com` lets through
/// `example.com` and `cdn.example.com` but never `evilexample.com`. Anything that fails to
/// parse is untrusted.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    domains: Vec<String>,
}

impl Allowlist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut domains: Vec<String> = entries
            .into_iter()
            .filter_map(|entry| Self::normalize(entry.as_ref()))
            .collect();
        domains.sort();
        domains.dedup();

        Self { domains }
    }

    // lowercase + punycode through the same host parser the url crate uses on requests, so an
    // entry and a request host always compare in the same form
    fn normalize(entry: &str) -> Option<String> {
        let entry = entry.trim().trim_matches('.');
        if entry.is_empty() {
            return None;
        }

        Some(
            Host::parse(entry)
                .map(|host| host.to_string())
                .unwrap_or_else(|_| entry.to_ascii_lowercase()),
        )
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn is_trusted(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => self.is_trusted_url(&parsed),
            Err(e) => {
                debug!("Untrusted, failed to parse {}: {}", url, e);
                false
            }
        }
    }

    pub fn is_trusted_url(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        url.host_str()
            .is_some_and(|host| self.is_trusted_host(host))
    }

    pub fn is_trusted_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }

        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_entries() {
        let allowlist = Allowlist::new([" Example.COM ", ".cdn.example.net.", "", "example.com"]);
        assert_eq!(allowlist.domains(), &["cdn.example.net", "example.com"]);
    }

    #[test]
    fn empty_allowlist_trusts_nothing() {
        let allowlist = Allowlist::new(Vec::<String>::new());
        assert!(allowlist.is_empty());
        assert!(!allowlist.is_trusted("https://example.com/a.m3u8"));
    }

    #[test]
    fn trailing_root_dot_is_ignored() {
        let allowlist = Allowlist::new(["example.com"]);
        assert!(allowlist.is_trusted_host("example.com."));
        assert!(allowlist.is_trusted_host("EXAMPLE.com"));
    }
}
