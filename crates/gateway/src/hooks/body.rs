//! Size-bounded JSON body reading.

use {
    axum::{
        body::Body,
        http::{HeaderMap, header},
    },
    bytes::{Bytes, BytesMut},
    http_body_util::BodyExt,
    serde_json::{Map, Value},
};

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("payload too large")]
    TooLarge,
    #[error("failed to read body: {0}")]
    Read(String),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a JSON object body of at most `limit` bytes.
///
/// A declared `Content-Length` over the limit is rejected before reading.
/// Otherwise the stream is aborted as soon as the limit is crossed. An empty
/// body, and any JSON value that is not an object, yields an empty object.
pub async fn read_json_body(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<Map<String, Value>, BodyError> {
    if let Some(declared) = content_length(headers)
        && declared > u64::try_from(limit).unwrap_or(u64::MAX)
    {
        return Err(BodyError::TooLarge);
    }
    let bytes = read_limited(body, limit).await?;
    parse_object(&bytes)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

async fn read_limited(mut body: Body, limit: usize) -> Result<Bytes, BodyError> {
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| BodyError::Read(e.to_string()))?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        if buf.len() + data.len() > limit {
            return Err(BodyError::TooLarge);
        }
        buf.extend_from_slice(&data);
    }
    Ok(buf.freeze())
}

pub fn parse_object(bytes: &[u8]) -> Result<Map<String, Value>, BodyError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::http::HeaderValue,
        futures::stream,
        serde_json::json,
    };

    #[tokio::test]
    async fn reads_object() {
        let body = Body::from(r#"{"text":"hi"}"#);
        let map = read_json_body(&HeaderMap::new(), body, 1024).await.unwrap();
        assert_eq!(Value::Object(map), json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn empty_and_non_object_become_empty() {
        let map = read_json_body(&HeaderMap::new(), Body::empty(), 16).await.unwrap();
        assert!(map.is_empty());
        let map = read_json_body(&HeaderMap::new(), Body::from("[1,2]"), 16)
            .await
            .unwrap();
        assert!(map.is_empty());
        let map = read_json_body(&HeaderMap::new(), Body::from("  \n"), 16)
            .await
            .unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn declared_length_rejected_early() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("4096"));
        let err = read_json_body(&headers, Body::from("{}"), 1024).await.unwrap_err();
        assert!(matches!(err, BodyError::TooLarge));
    }

    #[tokio::test]
    async fn streamed_body_aborted_at_limit() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"text\":\"")),
            Ok(Bytes::from(vec![b'a'; 64])),
            Ok(Bytes::from_static(b"\"}")),
        ];
        let body = Body::from_stream(stream::iter(chunks));
        let err = read_json_body(&HeaderMap::new(), body, 32).await.unwrap_err();
        assert!(matches!(err, BodyError::TooLarge));
        assert_eq!(err.to_string(), "payload too large");
    }

    #[tokio::test]
    async fn malformed_json() {
        let err = read_json_body(&HeaderMap::new(), Body::from("{nope"), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, BodyError::Json(_)));
        assert!(err.to_string().starts_with("invalid JSON"));
    }
}
