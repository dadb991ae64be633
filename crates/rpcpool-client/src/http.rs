// Copyright 2025 rpcpool Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON-RPC over HTTP base client
//!
//! [`HttpClient`] POSTs a JSON-RPC 2.0 request to one endpoint URL and maps
//! the outcome onto [`PoolError`] so the pool can classify it:
//!
//! - Non-2xx status: [`PoolError::Http`] with the status, the body text and
//!   the `Retry-After` header (delta-seconds form)
//! - JSON-RPC `error` object: [`PoolError::Rpc`]
//! - Body that is not a JSON-RPC envelope: [`PoolError::InvalidResponse`]
//!   with a body excerpt
//! - Connection failure: [`PoolError::Transport`]
//!
//! Both `http://` and `https://` URLs are supported. TLS uses rustls with the
//! ring provider and the bundled webpki root certificates.

use crate::transport::BaseClient;
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Method, Request, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rpcpool_common::{JsonRpcRequest, JsonRpcResponse, PoolError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Longest body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Upper bound on a parsed `Retry-After`.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// JSON-RPC 2.0 client for a single HTTP endpoint.
///
/// Holds one pooled hyper client, so concurrent calls reuse keep-alive
/// connections. Request ids come from a per-client counter.
pub struct HttpClient {
    url: String,
    uri: Uri,
    client: HttpsClient,
    next_id: AtomicU64,
}

impl HttpClient {
    /// Creates a client for `url`.
    ///
    /// # Errors
    /// [`PoolError::InvalidConfig`] if the URL does not parse, is neither
    /// `http://` nor `https://`, or the TLS configuration cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let uri: Uri = url
            .parse()
            .map_err(|e| PoolError::InvalidConfig(format!("Invalid endpoint URL {}: {}", url, e)))?;

        let supported = matches!(uri.scheme_str(), Some("http") | Some("https"));
        if !supported || uri.host().is_none() {
            return Err(PoolError::InvalidConfig(format!(
                "Unsupported endpoint URL {} (expected http[s]://host[:port]/path)",
                url
            )));
        }

        let client = Client::builder(TokioExecutor::new()).build(https_connector()?);

        Ok(Self {
            url,
            uri,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BaseClient for HttpClient {
    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_vec(&JsonRpcRequest::new(method, params, id))?;

        let http_request = Request::builder()
            .method(Method::POST)
            .uri(self.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| PoolError::Transport(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .request(http_request)
            .await
            .map_err(|e| PoolError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| PoolError::Transport(format!("Failed to read response: {}", e)))?
            .to_bytes();

        if !status.is_success() {
            let text = excerpt(&body);
            let message = if text.is_empty() {
                status.canonical_reason().unwrap_or("Unknown status").to_string()
            } else {
                text
            };
            return Err(PoolError::Http {
                status: status.as_u16(),
                message,
                retry_after,
            });
        }

        let envelope: JsonRpcResponse = serde_json::from_slice(&body).map_err(|e| {
            PoolError::InvalidResponse(format!("{} (body: {})", e, excerpt(&body)))
        })?;

        envelope.into_result()
    }
}

/// Connector speaking TLS for `https://` and plain TCP for `http://`.
fn https_connector() -> Result<HttpsConnector<HttpConnector>> {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| PoolError::InvalidConfig(format!("Failed to configure TLS: {}", e)))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .build())
}

/// Parses a delta-seconds `Retry-After` header, capped at one hour.
///
/// The HTTP-date form is ignored; callers fall back to their default delay.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    value
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
