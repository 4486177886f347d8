//! Request id propagation.
//!
//! An incoming `x-request-id` is reused when it looks sane, otherwise a fresh
//! UUID is minted. The id is stored in request extensions, attached to the
//! request span and echoed on the response.

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone)]
pub struct RequestId(pub Arc<str>);

impl RequestId {
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_header(request: &Request) -> Option<Self> {
        let value = request.headers().get(&REQUEST_ID_HEADER)?.to_str().ok()?;
        is_valid_request_id(value).then(|| Self(Arc::from(value)))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_header(&request).unwrap_or_default();
    request.extensions_mut().insert(request_id.clone());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_request_id_generation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1.as_str(), id2.as_str());
        assert!(Uuid::parse_str(id1.as_str()).is_ok());
    }

    #[test]
    fn test_header_is_reused_when_valid() {
        let request = Request::builder()
            .header("x-request-id", "abc-123_xyz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            RequestId::from_header(&request).unwrap().to_string(),
            "abc-123_xyz"
        );
    }

    #[test]
    fn test_header_is_ignored_when_invalid() {
        let request = Request::builder()
            .header("x-request-id", "abc 123")
            .body(Body::empty())
            .unwrap();
        assert!(RequestId::from_header(&request).is_none());

        let request = Request::builder().body(Body::empty()).unwrap();
        assert!(RequestId::from_header(&request).is_none());
    }

    #[test]
    fn test_valid_request_id() {
        assert!(is_valid_request_id("abc123"));
        assert!(is_valid_request_id("ABC-123_xyz"));
        assert!(is_valid_request_id("a".repeat(128).as_str()));
    }

    #[test]
    fn test_invalid_request_id() {
        assert!(!is_valid_request_id(""));
        assert!(!is_valid_request_id("abc@123"));
        assert!(!is_valid_request_id("abc/123"));
        assert!(!is_valid_request_id("a".repeat(129).as_str()));
    }
}
