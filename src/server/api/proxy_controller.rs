// one route, one request at a time, nothing shared between requests except the read-only services
use std::time::{Duration, Instant};

use axum::{
    Extension, Router,
    body::Body,
    extract::RawQuery,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::StreamExt;
use tracing::{debug, error, warn};
use url::Url;

use crate::server::{
    error::{AppResult, Error},
    extractors::ForwardedHeaders,
    services::{
        edge_services::EdgeServices,
        manifest_services::{BodyKind, has_manifest_suffix, is_key_asset},
    },
    utils::url_utils::UrlUtil,
};

const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CACHE_CONTROL: &str = "public, max-age=3600";
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

// upstream headers that never make it back to the player. encoding and length stop being true
// once reqwest decodes the body or we rewrite it, cors and caching are ours to decide, and the
// rest are hop-by-hop or cookies for a domain the player never talks to
const STRIPPED_HEADERS: [HeaderName; 13] = [
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::SET_COOKIE,
    header::CACHE_CONTROL,
    header::PRAGMA,
    header::EXPIRES,
];

pub struct ProxyController;

impl ProxyController {
    pub fn app(proxy_route: &str) -> Router {
        Router::new()
            .route(proxy_route, get(Self::proxy_get).options(Self::proxy_options))
            .layer(map_response(Self::cors_headers))
    }

    /// every answer of this route is read by a player on another origin, errors included
    async fn cors_headers(mut response: Response) -> Response {
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Range, Accept"),
        );
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("Content-Range, Accept-Ranges"),
        );
        response
    }

    async fn proxy_options() -> impl IntoResponse {
        StatusCode::NO_CONTENT
    }

    async fn proxy_get(
        Extension(services): Extension<EdgeServices>,
        RawQuery(query): RawQuery,
        ForwardedHeaders(mut forwarded): ForwardedHeaders,
    ) -> AppResult<Response> {
        let target_url = Self::validate_target(&services, query.as_deref())?;
        debug!("Proxying: {}", target_url);

        // a manifest gets rewritten, a byte range of the original would describe the wrong body
        if has_manifest_suffix(&target_url) {
            forwarded.remove(header::RANGE);
            forwarded.remove(header::IF_RANGE);
        }

        let started = Instant::now();
        let wait = Duration::from_secs(services.config.upstream_timeout_secs);

        let mut request_builder = services.http.get(target_url.clone()).headers(forwarded.clone());
        if !forwarded.contains_key(header::ACCEPT) {
            request_builder = request_builder.header(header::ACCEPT, "*/*");
        }

        let target_response = tokio::time::timeout(wait, request_builder.send())
            .await
            .map_err(|_| {
                error!("Request to {} timed out after {:?}", target_url, wait);
                Error::Upstream(format!("timed out after {}s", wait.as_secs()))
            })?
            .map_err(|e| {
                let message = Self::describe(e);
                error!("Request to {} failed: {}", target_url, message);
                Error::Upstream(message)
            })?;

        let status = target_response.status();
        let content_type = target_response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body_kind = BodyKind::classify(content_type.as_deref(), &target_url);

        debug!(
            "Upstream answered {} for {}, Content-Type: {:?}, treating as {:?}",
            status, target_url, content_type, body_kind
        );

        // an origin that answers with an error still answered, the player gets its status
        if !status.is_success() {
            warn!("Upstream returned {} for {}", status, target_url);
        }

        let mut response_headers = Self::forwardable_headers(target_response.headers());

        if body_kind == BodyKind::Manifest && status.is_success() {
            let status = Self::manifest_status(status, target_response.headers())?;
            response_headers.remove(header::CONTENT_RANGE);
            response_headers.remove(header::ACCEPT_RANGES);

            // rewritten uris are relative to wherever we actually ended up after redirects
            let base_url = target_response.url().clone();
            // segments only bound each read, a manifest has to arrive whole within the wait
            let remaining = wait.saturating_sub(started.elapsed());
            let text = tokio::time::timeout(
                remaining,
                Self::read_manifest(target_response, services.config.max_manifest_bytes),
            )
            .await
            .map_err(|_| {
                error!("Reading manifest {} timed out after {:?}", base_url, wait);
                Error::Upstream(format!("timed out after {}s", wait.as_secs()))
            })??;

            let processed = services.rewriter.rewrite(&text, &base_url);
            debug!(
                "Rewrote manifest {} ({} -> {} bytes)",
                base_url,
                text.len(),
                processed.len()
            );

            Self::insert_no_cache(&mut response_headers);
            if !response_headers.contains_key(header::CONTENT_TYPE) {
                response_headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(MANIFEST_CONTENT_TYPE),
                );
            }

            return Ok((status, response_headers, processed).into_response());
        }

        if status.is_success() && !is_key_asset(&target_url) {
            response_headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(SEGMENT_CACHE_CONTROL),
            );
        } else {
            Self::insert_no_cache(&mut response_headers);
        }

        // segments are streamed straight through, never decoded as text. If the player hangs up
        // the body is dropped and the upstream connection with it
        let body = Body::from_stream(target_response.bytes_stream());

        Ok((status, response_headers, body).into_response())
    }

    /// missing -> 400, undecodable -> 400, anything that isn't an allowlisted http(s) url -> 403.
    /// nothing here touches the network
    fn validate_target(services: &EdgeServices, query: Option<&str>) -> AppResult<Url> {
        let raw = query
            .and_then(UrlUtil::extract_url_param)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                warn!("Missing URL parameter");
                Error::MissingUrl
            })?;

        let decoded = UrlUtil::decode_url_param(raw).map_err(|e| {
            warn!("Failed to decode url parameter {}: {}", raw, e);
            Error::InvalidUrl
        })?;

        match Url::parse(&decoded) {
            Ok(url) if services.allowlist.is_trusted_url(&url) => Ok(url),
            Ok(_) => {
                warn!("URL not allowed: {}", decoded);
                Err(Error::UrlNotAllowed)
            }
            Err(e) => {
                warn!("URL not allowed, failed to parse {}: {}", decoded, e);
                Err(Error::UrlNotAllowed)
            }
        }
    }

    /// a 206 that covers the whole manifest is just the manifest. Anything shorter can't be
    /// rewritten without the rest of it
    fn manifest_status(status: StatusCode, upstream: &HeaderMap) -> AppResult<StatusCode> {
        if status != StatusCode::PARTIAL_CONTENT {
            return Ok(status);
        }

        if Self::covers_whole_resource(upstream.get(header::CONTENT_RANGE)) {
            Ok(StatusCode::OK)
        } else {
            error!("Upstream answered a manifest request with a partial range");
            Err(Error::Upstream("partial manifest".to_string()))
        }
    }

    // `bytes 0-{n-1}/{n}`
    fn covers_whole_resource(content_range: Option<&HeaderValue>) -> bool {
        let Some((span, total)) = content_range
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().strip_prefix("bytes "))
            .and_then(|v| v.split_once('/'))
        else {
            return false;
        };
        let Some((start, end)) = span.split_once('-') else {
            return false;
        };

        match (start.parse::<u64>(), end.parse::<u64>(), total.parse::<u64>()) {
            (Ok(0), Ok(end), Ok(total)) => end.checked_add(1) == Some(total),
            _ => false,
        }
    }

    fn forwardable_headers(upstream: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(upstream.len());

        for (name, value) in upstream {
            let stripped = STRIPPED_HEADERS.contains(name)
                || name.as_str().starts_with("access-control-")
                || name.as_str().starts_with("proxy-")
                || name.as_str() == "keep-alive";

            if !stripped {
                headers.append(name.clone(), value.clone());
            }
        }

        headers
    }

    fn insert_no_cache(headers: &mut HeaderMap) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }

    // manifests have to be complete before they can be rewritten, so they're the only thing we
    // buffer. The cap keeps a misbehaving origin from streaming us forever
    async fn read_manifest(response: reqwest::Response, max_bytes: usize) -> AppResult<String> {
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                let message = Self::describe(e);
                error!("Failed to read manifest: {}", message);
                Error::Upstream(message)
            })?;

            if body.len() + chunk.len() > max_bytes {
                error!("Manifest larger than {} bytes, refusing it", max_bytes);
                return Err(Error::Upstream(format!(
                    "manifest exceeds {} bytes",
                    max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        // a latin-1 title shouldn't cost the player its stream, the uris are ascii anyway
        match String::from_utf8(body) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!("Manifest is not valid UTF-8 ({}), decoding lossily", e.utf8_error());
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }

    // reqwest keeps the useful part (connection refused, timed out, ...) in the source chain
    fn describe(e: reqwest::Error) -> String {
        format!("{:#}", anyhow::Error::from(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_encoding_length_cors_and_hop_by_hop() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp2t"));
        upstream.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        upstream.insert(header::CONTENT_RANGE, HeaderValue::from_static("bytes 0-9/42"));
        upstream.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        upstream.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://origin.example"),
        );
        upstream.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        upstream.insert(header::SET_COOKIE, HeaderValue::from_static("a=b"));

        let headers = ProxyController::forwardable_headers(&upstream);

        assert_eq!(headers.len(), 3);
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp2t");
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-9/42");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    }

    #[test]
    fn full_ranges_only() {
        let full = HeaderValue::from_static("bytes 0-44/45");
        let partial = HeaderValue::from_static("bytes 0-9/45");
        let offset = HeaderValue::from_static("bytes 5-44/45");
        let unknown_total = HeaderValue::from_static("bytes 0-44/*");

        assert!(ProxyController::covers_whole_resource(Some(&full)));
        assert!(!ProxyController::covers_whole_resource(Some(&partial)));
        assert!(!ProxyController::covers_whole_resource(Some(&offset)));
        assert!(!ProxyController::covers_whole_resource(Some(&unknown_total)));
        assert!(!ProxyController::covers_whole_resource(None));
    }

    #[test]
    fn full_range_manifest_becomes_200() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_RANGE, HeaderValue::from_static("bytes 0-44/45"));

        let status = ProxyController::manifest_status(StatusCode::PARTIAL_CONTENT, &upstream);
        assert_eq!(status.unwrap(), StatusCode::OK);

        upstream.insert(header::CONTENT_RANGE, HeaderValue::from_static("bytes 0-9/45"));
        let status = ProxyController::manifest_status(StatusCode::PARTIAL_CONTENT, &upstream);
        assert!(matches!(status, Err(Error::Upstream(_))));

        let status = ProxyController::manifest_status(StatusCode::OK, &HeaderMap::new());
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    #[test]
    fn no_cache_trio() {
        let mut headers = HeaderMap::new();
        ProxyController::insert_no_cache(&mut headers);

        assert_eq!(headers[header::CACHE_CONTROL], NO_CACHE);
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
    }
}
