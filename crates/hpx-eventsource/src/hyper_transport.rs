//! HTTP/1 [`Transport`] built on `hyper-util`'s client.
//!
//! Plain `http://` only. Redirects are not followed, so a redirect status
//! fails the connection like any other non-`200` response.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyExt, Empty};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tracing::debug;
use url::Url;

use crate::{
    error::{EventSourceError, EventSourceResult},
    transport::{StreamRequest, Transport, TransportResponse},
};

/// Streaming HTTP/1 transport.
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HyperTransport {
    /// Create a transport with a fresh connection pool.
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    fn supports(&self, url: &Url) -> bool {
        url.scheme() == "http"
    }

    async fn start(&self, request: StreamRequest) -> EventSourceResult<TransportResponse> {
        if !self.supports(&request.url) {
            return Err(EventSourceError::config(format!(
                "HyperTransport does not support scheme {:?}",
                request.url.scheme()
            )));
        }
        if request.with_credentials {
            debug!(url = %request.url, "Credentials requested; no cookie store attached");
        }

        let uri: http::Uri = request
            .url
            .as_str()
            .parse()
            .map_err(|e| EventSourceError::invalid_url(format!("{e}")))?;
        let mut req = http::Request::builder()
            .method(http::Method::GET)
            .uri(uri)
            .body(Empty::<Bytes>::new())
            .map_err(|e| EventSourceError::config(format!("Failed to build request: {e}")))?;
        *req.headers_mut() = request.headers;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| EventSourceError::network(e.to_string()))?;

        let (parts, body) = resp.into_parts();
        let body = body
            .into_data_stream()
            .map(|chunk| chunk.map_err(|e| EventSourceError::network(e.to_string())))
            .boxed();

        Ok(TransportResponse {
            status: parts.status,
            headers: parts.headers,
            url: request.url,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_supports_plain_http_only() {
        let transport = HyperTransport::new();
        assert!(transport.supports(&Url::parse("http://example.com/stream").expect("url")));
        assert!(!transport.supports(&Url::parse("https://example.com/stream").expect("url")));
    }

    #[tokio::test]
    async fn test_https_is_rejected_as_fatal() {
        let transport = HyperTransport::new();
        let err = transport
            .start(StreamRequest {
                url: Url::parse("https://example.com/stream").expect("url"),
                headers: http::HeaderMap::new(),
                with_credentials: false,
            })
            .await
            .expect_err("https unsupported");
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_recoverable() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let transport = HyperTransport::new();
        let err = transport
            .start(StreamRequest {
                url: Url::parse(&format!("http://{addr}/stream")).expect("url"),
                headers: http::HeaderMap::new(),
                with_credentials: false,
            })
            .await
            .expect_err("nothing listening");
        assert!(err.is_recoverable());
    }
}
