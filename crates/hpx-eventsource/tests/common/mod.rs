//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use hpx_eventsource::{
    BodyStream, EventSource, EventSourceError, EventSourceResult, Notification, StreamRequest,
    Transport, TransportResponse,
};
use parking_lot::Mutex;
use tokio::time::Instant;
use url::Url;

/// How a scripted body ends after its chunks.
#[derive(Clone, Copy, Debug)]
pub enum BodyEnd {
    /// Server closes the stream normally.
    Close,
    /// Stream stays open forever.
    Hang,
    /// Network failure mid-stream.
    Error,
}

/// One scripted outcome for a call to `Transport::start`.
#[derive(Debug)]
pub enum Step {
    /// No response at all.
    NetworkError,
    /// `start` fails with the given error.
    Fail(EventSourceError),
    /// A response head followed by a body.
    Respond {
        status: u16,
        content_type: &'static str,
        chunks: Vec<&'static [u8]>,
        end: BodyEnd,
    },
}

impl Step {
    /// Valid event stream whose body then closes.
    pub fn stream(chunks: Vec<&'static str>) -> Self {
        Self::Respond {
            status: 200,
            content_type: "text/event-stream",
            chunks: chunks.into_iter().map(str::as_bytes).collect(),
            end: BodyEnd::Close,
        }
    }

    /// Valid event stream whose body stays open.
    pub fn open(chunks: Vec<&'static str>) -> Self {
        Self::Respond {
            status: 200,
            content_type: "text/event-stream",
            chunks: chunks.into_iter().map(str::as_bytes).collect(),
            end: BodyEnd::Hang,
        }
    }

    /// Response with the given status and an empty body.
    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            content_type: "text/event-stream",
            chunks: Vec::new(),
            end: BodyEnd::Close,
        }
    }
}

/// A request observed by the transport.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub at: Instant,
    pub request: StreamRequest,
}

#[derive(Default)]
struct Inner {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Recorded>>,
    bodies_dropped: AtomicUsize,
}

/// Transport replaying a script. Once the script is exhausted every request
/// gets an empty event stream that never ends.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
    scheme: Option<&'static str>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        let transport = Self::default();
        transport.inner.script.lock().extend(steps);
        transport
    }

    /// Only accept URLs with the given scheme.
    pub fn only_scheme(mut self, scheme: &'static str) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    /// Millisecond gaps between consecutive requests.
    pub fn gaps_ms(&self) -> Vec<u128> {
        self.requests()
            .windows(2)
            .map(|w| (w[1].at - w[0].at).as_millis())
            .collect()
    }

    pub fn bodies_dropped(&self) -> usize {
        self.inner.bodies_dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn supports(&self, url: &Url) -> bool {
        self.scheme.is_none_or(|scheme| url.scheme() == scheme)
    }

    async fn start(&self, request: StreamRequest) -> EventSourceResult<TransportResponse> {
        let url = request.url.clone();
        self.inner.requests.lock().push(Recorded {
            at: Instant::now(),
            request,
        });

        let step = self.inner.script.lock().pop_front().unwrap_or(Step::Respond {
            status: 200,
            content_type: "text/event-stream",
            chunks: Vec::new(),
            end: BodyEnd::Hang,
        });

        match step {
            Step::NetworkError => Err(EventSourceError::network("connection refused")),
            Step::Fail(err) => Err(err),
            Step::Respond {
                status,
                content_type,
                chunks,
                end,
            } => {
                let mut headers = http::HeaderMap::new();
                headers.insert(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static(content_type),
                );
                Ok(TransportResponse {
                    status: http::StatusCode::from_u16(status).expect("valid status"),
                    headers,
                    url,
                    body: scripted_body(chunks, end, Arc::clone(&self.inner)),
                })
            }
        }
    }
}

fn scripted_body(chunks: Vec<&'static [u8]>, end: BodyEnd, inner: Arc<Inner>) -> BodyStream {
    let tail: BodyStream = match end {
        BodyEnd::Close => stream::empty().boxed(),
        BodyEnd::Hang => stream::pending().boxed(),
        BodyEnd::Error => {
            stream::once(async { Err(EventSourceError::network("connection reset")) }).boxed()
        }
    };
    let body = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))))
        .chain(tail)
        .boxed();
    TrackedBody { body, inner }.boxed()
}

/// Counts bodies dropped by the client (aborted or finished).
struct TrackedBody {
    body: BodyStream,
    inner: Arc<Inner>,
}

impl Stream for TrackedBody {
    type Item = EventSourceResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.body.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.inner.bodies_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn stream_url() -> Url {
    Url::parse("http://example.com/stream").expect("valid url")
}

/// Next notification, failing the test instead of hanging.
pub async fn next(source: &mut EventSource) -> Notification {
    tokio::time::timeout(Duration::from_secs(60), source.next_notification())
        .await
        .expect("timed out waiting for notification")
        .expect("stream ended unexpectedly")
}

/// Data of a message notification.
pub fn message_data(notification: &Notification) -> String {
    notification
        .as_message()
        .map(|m| m.data().to_string())
        .unwrap_or_else(|| panic!("expected message, got {notification:?}"))
}
