//! Response headers for a gateway that only ever answers with JSON, plain text
//! or redirects, some of which carry credentials.
//!
//! - nothing here may be framed, sniffed, cached or leak its URL via Referer
//!   (redirect targets can carry tokens in the query)
//! - every header is only set when the handler did not set it itself

use axum::Router;
use axum::http::header::{HeaderName, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;

const RESPONSE_HEADERS: [(&str, &str); 6] = [
    ("x-frame-options", "DENY"),
    ("content-security-policy", "default-src 'none'; frame-ancestors 'none'"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    ("permissions-policy", "camera=(), microphone=(), geolocation=()"),
    ("cache-control", "no-store"),
];

pub fn apply(router: Router) -> Router {
    RESPONSE_HEADERS
        .iter()
        .fold(router, |router, &(name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ))
        })
}
