//! Per-request tracing for the node HTTP API
//!
//! Each request runs inside an `http_request` span carrying its request id,
//! route and peer. A request arriving from another shard keeps the id the
//! peer assigned, so one client call can be followed across nodes.

use crate::cluster::FORWARDED_BY_HEADER;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, HeaderValue, Request, Response},
    middleware::Next,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Tags the request and its response with a request id and logs the
/// outcome inside the request span.
pub async fn request_tracing_middleware(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let request_id = header_str(request.headers(), REQUEST_ID_HEADER)
        .map(str::to_owned)
        .unwrap_or_else(generate_request_id);
    let id_value = HeaderValue::from_str(&request_id).ok();

    // The forwarder copies request headers, so the id reaches the owner.
    if let Some(value) = &id_value {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        peer = tracing::field::Empty,
        forwarded_by = tracing::field::Empty,
    );
    if let Some(ConnectInfo(addr)) = connect_info {
        span.record("peer", tracing::field::display(addr));
    }
    if let Some(from) = header_str(request.headers(), FORWARDED_BY_HEADER) {
        span.record("forwarded_by", from);
    }

    async move {
        let started = Instant::now();
        let mut response = next.run(request).await;
        let status = response.status().as_u16();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some(value) = id_value {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        if response.status().is_server_error() {
            tracing::warn!(status, elapsed_ms, "request failed");
        } else {
            tracing::info!(status, elapsed_ms, "request completed");
        }
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique_uuids() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert!(Uuid::parse_str(&a).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_header_str() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(header_str(&headers, REQUEST_ID_HEADER), Some("abc"));
        assert_eq!(header_str(&headers, FORWARDED_BY_HEADER), None);
    }
}
