use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, HeaderName, header, request::Parts};

/// the only request headers that make it to the upstream, cookies and auth headers stay with us
pub const FORWARDED_HEADERS: [HeaderName; 3] = [header::RANGE, header::IF_RANGE, header::ACCEPT];

/// subset of the player's headers that gets sent upstream
pub struct ForwardedHeaders(pub HeaderMap);

impl<S> FromRequestParts<S> for ForwardedHeaders
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut forwarded = HeaderMap::new();

        for name in FORWARDED_HEADERS {
            // if-range means nothing without a range
            if name == header::IF_RANGE && !parts.headers.contains_key(header::RANGE) {
                continue;
            }
            if let Some(value) = parts.headers.get(&name) {
                forwarded.insert(name, value.clone());
            }
        }

        Ok(ForwardedHeaders(forwarded))
    }
}
