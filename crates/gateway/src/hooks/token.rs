//! Shared-secret extraction and comparison for the hook ingress.

use {
    axum::http::{HeaderMap, Uri, header},
    subtle::ConstantTimeEq,
};

pub const TOKEN_HEADER: &str = "x-portico-token";
const TOKEN_QUERY_PARAM: &str = "token";

/// Where a hook token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Bearer,
    Header,
    Query,
}

/// Pull the token out of a request: `Authorization: Bearer`, then the
/// `X-Portico-Token` header, then the `?token=` query parameter.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<(String, TokenSource)> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer)
    {
        return Some((token, TokenSource::Bearer));
    }
    if let Some(token) = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some((token.to_string(), TokenSource::Header));
    }
    query_param(uri, TOKEN_QUERY_PARAM)
        .filter(|t| !t.is_empty())
        .map(|t| (t, TokenSource::Query))
}

fn bearer(value: &str) -> Option<String> {
    let (scheme, rest) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub(crate) fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.trim().to_string())
}

/// Constant-time comparison. Length differences still short-circuit, which
/// leaks only the length.
pub fn token_matches(provided: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}
