//! Collaborator capabilities used by the connection driver.
//!
//! - [`Transport`] issues one streaming HTTP request per attempt.
//! - [`NetworkMonitor`] reports whether the network is reachable and signals
//!   when it becomes reachable again.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use tokio::sync::watch;
use url::Url;

use crate::error::EventSourceResult;

/// Body of a streaming response.
///
/// Yields chunks as they arrive. An `Err` item is a network failure; the end
/// of the stream is a normal close by the server. Dropping the stream aborts
/// the request.
pub type BodyStream = BoxStream<'static, EventSourceResult<Bytes>>;

/// A single streaming request.
#[derive(Clone, Debug)]
pub struct StreamRequest {
    /// Absolute request URL.
    pub url: Url,
    /// Request headers, including the event-stream protocol headers.
    pub headers: http::HeaderMap,
    /// Whether credentials (cookies, auth) should be included.
    pub with_credentials: bool,
}

/// Response head plus the streaming body.
pub struct TransportResponse {
    /// Response status.
    pub status: http::StatusCode,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Effective URL after any redirects the transport followed.
    pub url: Url,
    /// Response body.
    pub body: BodyStream,
}

impl TransportResponse {
    /// The `Content-Type` header, if present and valid text.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

/// HTTP client able to stream a response body incrementally.
///
/// Transport-level timeouts, TLS, proxies and redirects are the
/// implementation's concern.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue `request` and resolve once the response head has arrived.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::Network`](crate::EventSourceError::Network)
    /// if no response could be obtained.
    async fn start(&self, request: StreamRequest) -> EventSourceResult<TransportResponse>;

    /// Whether this transport can issue requests to `url`.
    ///
    /// Checked once when a connection is created; an unsupported URL is
    /// rejected there instead of failing on the first attempt.
    fn supports(&self, url: &Url) -> bool {
        let _ = url;
        true
    }
}

/// Network reachability capability.
#[async_trait]
pub trait NetworkMonitor: Send + Sync + 'static {
    /// Whether the network is currently reachable.
    fn is_available(&self) -> bool;

    /// Resolves once the network becomes reachable.
    async fn became_available(&self);
}

/// Monitor that always reports the network as reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl NetworkMonitor for AlwaysOnline {
    fn is_available(&self) -> bool {
        true
    }

    async fn became_available(&self) {}
}

/// Reachability flag driven by the application.
///
/// Clones share the same flag.
#[derive(Clone, Debug)]
pub struct NetworkStatus {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl NetworkStatus {
    /// Create a flag with the given initial value.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Update the flag, waking waiters when it turns `true`.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl NetworkMonitor for NetworkStatus {
    fn is_available(&self) -> bool {
        *self.tx.borrow()
    }

    async fn became_available(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|online| *online).await;
    }
}
