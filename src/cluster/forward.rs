//! Request forwarding to the owning shard
//!
//! A request for a key this node does not own is re-issued to the owner
//! with the same method, path, query and body, and the owner's response is
//! streamed back unmodified. One attempt, bounded by a timeout.

use crate::common::{Error, Result};
use axum::body::Body;
use axum::http::{self, header, HeaderMap, HeaderName, Method, Uri};
use axum::response::Response;
use bytes::Bytes;
use std::time::Duration;

/// Set on forwarded requests to the index of the forwarding shard.
pub const FORWARDED_BY_HEADER: &str = "x-shardkv-forwarded-by";

const HOP_BY_HOP: [HeaderName; 4] = [
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::HOST,
    header::TRANSFER_ENCODING,
];

/// Build an absolute base URL from a shard list address.
pub fn base_url(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", addr.trim_end_matches('/'))
    }
}

#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Re-issue a request against `addr` and stream back the answer.
    pub async fn forward(
        &self,
        addr: &str,
        from_shard: usize,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response> {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let url = format!("{}{}", base_url(addr), path_and_query);

        let mut outgoing = headers.clone();
        for name in &HOP_BY_HOP {
            outgoing.remove(name);
        }
        outgoing.insert(FORWARDED_BY_HEADER, from_shard.into());

        tracing::debug!(%method, %url, "forwarding request");

        let upstream = self
            .client
            .request(method, &url)
            .headers(outgoing)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Forward {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        let mut response = http::Response::builder().status(upstream.status());
        if let Some(response_headers) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                if !HOP_BY_HOP.contains(name) {
                    response_headers.append(name, value.clone());
                }
            }
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| Error::Internal(format!("building forwarded response: {}", e)))
    }
}
