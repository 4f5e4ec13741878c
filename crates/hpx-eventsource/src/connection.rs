//! EventSource connection driver implementation.
//!
//! Provides [`EventSource`], [`EventSourceHandle`] and the background task
//! that owns the connection state: it issues requests, validates responses,
//! feeds the parser, enforces the buffer limit and schedules reconnections.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::{Stream, StreamExt};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    buffer_guard::BufferGuard,
    config::{EventSourceConfig, Settings},
    dispatch::{DispatchQueue, ErrorEvent, EventSourceStream, Notification},
    error::{EventSourceError, EventSourceResult},
    parse::{MessageEvent, StreamParser},
    reconnect::ReconnectionPolicy,
    state::{CloseCause, ReadyState, ReadyStateCell, ResumeState},
    transport::{AlwaysOnline, BodyStream, NetworkMonitor, StreamRequest, Transport, TransportResponse},
};

/// MIME type every response must declare.
const EVENT_STREAM_MIME: &str = "text/event-stream";

/// `Last-Event-ID` request header.
const LAST_EVENT_ID: http::HeaderName = http::HeaderName::from_static("last-event-id");

// ---------------------------------------------------------------------------
// Public API: EventSource
// ---------------------------------------------------------------------------

/// An auto-reconnecting Server-Sent Events connection.
///
/// Notifications are consumed through the [`Stream`] implementation (or
/// [`next_notification`](Self::next_notification)); [`split`](Self::split)
/// separates a clone-able [`EventSourceHandle`] from the
/// [`EventSourceStream`]. Dropping the stream stops the connection.
#[derive(Debug)]
pub struct EventSource {
    handle: EventSourceHandle,
    stream: EventSourceStream,
}

impl EventSource {
    /// Open a connection using `transport`, assuming the network is always
    /// reachable.
    ///
    /// Spawns the background task that drives the connection; the first
    /// request is issued from there.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::InvalidUrl`] if the URL does not resolve
    /// or `transport` cannot reach it, and [`EventSourceError::Config`] if
    /// the configuration is invalid.
    pub async fn connect<T: Transport>(
        config: EventSourceConfig,
        transport: T,
    ) -> EventSourceResult<Self> {
        Self::connect_with_monitor(config, transport, AlwaysOnline).await
    }

    /// Open a connection that defers requests while `monitor` reports the
    /// network as unreachable.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with_monitor<T: Transport, N: NetworkMonitor>(
        config: EventSourceConfig,
        transport: T,
        monitor: N,
    ) -> EventSourceResult<Self> {
        let url = config.resolve_url()?;
        config.validate()?;
        if !transport.supports(&url) {
            return Err(EventSourceError::invalid_url(format!(
                "Transport does not support scheme {:?}",
                url.scheme()
            )));
        }

        // Interval and growth rate are fixed for the lifetime of the
        // connection; the buffer limit is left to be read live.
        let settings = Settings::global();
        let interval = config
            .reconnection_interval
            .unwrap_or_else(|| settings.reconnection_interval());
        let growth_rate = config
            .growth_rate
            .unwrap_or_else(|| settings.growth_rate());

        let state = ReadyStateCell::new();
        let (queue, stream) = DispatchQueue::new(config.event_channel_capacity, state.clone());

        let manager = ConnectionManager {
            url: url.clone(),
            with_credentials: config.with_credentials,
            headers: config.headers,
            state: state.clone(),
            queue,
            resume: ResumeState::new(interval),
            policy: ReconnectionPolicy::new(growth_rate)
                .with_max_delay(config.max_reconnect_delay),
            max_buffer_size: config.max_buffer_size,
            transport,
            monitor,
        };
        tokio::spawn(manager.run());

        let handle = EventSourceHandle {
            url,
            with_credentials: config.with_credentials,
            state,
        };
        Ok(Self { handle, stream })
    }

    /// Open a connection with the built-in HTTP/1 transport.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    #[cfg(feature = "hyper-transport")]
    pub async fn connect_http(config: EventSourceConfig) -> EventSourceResult<Self> {
        Self::connect(config, crate::hyper_transport::HyperTransport::new()).await
    }

    /// Split into a control handle and the notification stream.
    pub fn split(self) -> (EventSourceHandle, EventSourceStream) {
        (self.handle, self.stream)
    }

    /// Get a reference to the control handle.
    pub fn handle(&self) -> &EventSourceHandle {
        &self.handle
    }

    /// Resolved stream URL.
    pub fn url(&self) -> &Url {
        self.handle.url()
    }

    /// Credentials flag the connection was created with.
    pub fn with_credentials(&self) -> bool {
        self.handle.with_credentials()
    }

    /// Current ready state.
    pub fn ready_state(&self) -> ReadyState {
        self.handle.ready_state()
    }

    /// Close the connection. See [`EventSourceHandle::close`].
    pub fn close(&self) {
        self.handle.close();
    }

    /// Receive the next notification.
    pub async fn next_notification(&mut self) -> Option<Notification> {
        self.stream.next_notification().await
    }
}

impl Stream for EventSource {
    type Item = Notification;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.stream).poll_next(cx)
    }
}

// ---------------------------------------------------------------------------
// EventSourceHandle
// ---------------------------------------------------------------------------

/// Clone-able handle for inspecting and closing a connection.
#[derive(Clone, Debug)]
pub struct EventSourceHandle {
    url: Url,
    with_credentials: bool,
    state: ReadyStateCell,
}

impl EventSourceHandle {
    /// Resolved stream URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Credentials flag the connection was created with.
    pub fn with_credentials(&self) -> bool {
        self.with_credentials
    }

    /// Current ready state.
    pub fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    /// Close the connection.
    ///
    /// Idempotent. The state becomes [`ReadyState::Closed`] immediately, any
    /// in-flight request is aborted, pending reconnections are cancelled and
    /// no further notification is delivered, including ones already queued.
    pub fn close(&self) {
        if self.state.close(CloseCause::Requested) {
            info!(url = %self.url, "EventSource closed");
        }
    }
}

// ---------------------------------------------------------------------------
// Internal: connection manager
// ---------------------------------------------------------------------------

/// How a single stream attempt ended.
#[derive(Debug)]
enum StreamOutcome {
    /// The consumer closed the connection or went away.
    Stopped,
    /// The response failed validation; never retried.
    Fatal(EventSourceError),
    /// Network failure or normal end of stream; retried after backoff.
    Lost(String),
    /// The buffer limit was hit; retried immediately and silently.
    Restart,
}

/// Owns all per-connection state and runs in its own task.
struct ConnectionManager<T, N> {
    url: Url,
    with_credentials: bool,
    headers: http::HeaderMap,
    state: ReadyStateCell,
    queue: DispatchQueue,
    resume: ResumeState,
    policy: ReconnectionPolicy,
    max_buffer_size: Option<usize>,
    transport: T,
    monitor: N,
}

impl<T: Transport, N: NetworkMonitor> ConnectionManager<T, N> {
    /// The long-lived driver loop.
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            if !self.wait_for_network().await {
                break;
            }

            info!(url = %self.url, attempt, "EventSource connecting");
            match self.attempt().await {
                StreamOutcome::Stopped => break,
                StreamOutcome::Fatal(err) => {
                    self.fail(err).await;
                    return;
                }
                StreamOutcome::Restart => {
                    attempt = 0;
                }
                StreamOutcome::Lost(reason) => {
                    attempt = attempt.saturating_add(1);
                    if !self.reconnect_after_backoff(reason, attempt).await {
                        break;
                    }
                }
            }
        }

        // Reached on close() or when the consumer dropped its stream.
        if self.state.close(CloseCause::Requested) {
            info!(url = %self.url, "EventSource stream dropped, connection closed");
        }
        debug!(url = %self.url, "EventSource driver stopped");
    }

    /// Resolves when the consumer closed the connection or dropped the
    /// stream.
    async fn stopped(&self) {
        tokio::select! {
            () = self.state.close_requested() => {}
            () = self.queue.abandoned() => {}
        }
    }

    /// Returns `false` if stopped while waiting for the network.
    async fn wait_for_network(&self) -> bool {
        if self.monitor.is_available() {
            return true;
        }
        warn!(url = %self.url, "Network unavailable, waiting before connecting");
        tokio::select! {
            biased;
            () = self.stopped() => false,
            () = self.monitor.became_available() => {
                info!(url = %self.url, "Network available again");
                true
            }
        }
    }

    /// Request for the next attempt.
    ///
    /// `Last-Event-ID` is sent only when the last event ID is non-empty and
    /// is a valid header value. An ID holding other control characters is
    /// still reported on messages but cannot be sent, so the server sees a
    /// request without resumption.
    fn build_request(&self) -> StreamRequest {
        let mut headers = self.headers.clone();
        headers.insert(
            http::header::ACCEPT,
            http::HeaderValue::from_static(EVENT_STREAM_MIME),
        );
        headers.insert(
            http::header::CACHE_CONTROL,
            http::HeaderValue::from_static("no-store"),
        );
        headers.remove(LAST_EVENT_ID);

        // Last-Event-ID for resumption.
        let last_event_id = &self.resume.last_event_id;
        if !last_event_id.is_empty() {
            match http::HeaderValue::from_bytes(last_event_id.as_bytes()) {
                Ok(value) => {
                    headers.insert(LAST_EVENT_ID, value);
                }
                Err(_) => {
                    warn!(last_event_id = %last_event_id, "Last event ID is not a valid header value");
                }
            }
        }

        StreamRequest {
            url: self.url.clone(),
            headers,
            with_credentials: self.with_credentials,
        }
    }

    /// Run one request from issue to completion.
    async fn attempt(&mut self) -> StreamOutcome {
        let request = self.build_request();

        let response = tokio::select! {
            biased;
            () = self.stopped() => return StreamOutcome::Stopped,
            response = self.transport.start(request) => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(err) if err.is_recoverable() => return StreamOutcome::Lost(err.to_string()),
            Err(err) => return StreamOutcome::Fatal(err),
        };

        if self.state.get().is_closed() {
            return StreamOutcome::Stopped;
        }
        if let Err(err) = validate_response(&response) {
            return StreamOutcome::Fatal(err);
        }

        self.policy.reset();
        if self.state.transition(ReadyState::Open) {
            info!(url = %self.url, "EventSource connection established");
            if !self.queue.schedule(Notification::Open).await {
                return StreamOutcome::Stopped;
            }
        } else {
            debug!(url = %self.url, "EventSource stream restarted");
        }

        let origin = response.url.origin().ascii_serialization();
        self.read_stream(response.body, origin).await
    }

    /// Feed the body into a fresh parser until it ends.
    async fn read_stream(&mut self, mut body: BodyStream, origin: String) -> StreamOutcome {
        let mut parser = StreamParser::new(origin);
        let mut guard = match self.max_buffer_size {
            Some(limit) => BufferGuard::with_limit(limit),
            None => BufferGuard::new(),
        };
        let mut completed: Vec<MessageEvent> = Vec::new();

        loop {
            let item = tokio::select! {
                biased;
                () = self.stopped() => return StreamOutcome::Stopped,
                item = body.next() => item,
            };

            match item {
                Some(Ok(chunk)) => {
                    parser.feed(&chunk, &mut self.resume, |event| completed.push(event));
                    if !self.dispatch_messages(&mut completed).await {
                        return StreamOutcome::Stopped;
                    }
                    if guard.record(chunk.len()) {
                        warn!(
                            url = %self.url,
                            received = guard.received(),
                            limit = guard.limit(),
                            "EventSource buffer limit exceeded, restarting stream"
                        );
                        // Dropping the body aborts the request.
                        return StreamOutcome::Restart;
                    }
                }
                Some(Err(err)) => {
                    error!(url = %self.url, error = %err, "EventSource stream error");
                    return StreamOutcome::Lost(err.to_string());
                }
                None => {
                    parser.finish(&mut self.resume, |event| completed.push(event));
                    if !self.dispatch_messages(&mut completed).await {
                        return StreamOutcome::Stopped;
                    }
                    warn!(url = %self.url, "EventSource stream ended");
                    return StreamOutcome::Lost("stream ended".to_string());
                }
            }
        }
    }

    async fn dispatch_messages(&self, completed: &mut Vec<MessageEvent>) -> bool {
        for event in completed.drain(..) {
            debug!(
                event_type = %event.event,
                last_event_id = %event.last_event_id,
                "EventSource message received",
            );
            if !self.queue.schedule(Notification::Message(event)).await {
                return false;
            }
        }
        true
    }

    /// Report a recoverable loss and sleep for the backoff delay. Returns
    /// `false` if stopped meanwhile.
    async fn reconnect_after_backoff(&mut self, reason: String, attempt: u32) -> bool {
        if self.state.get().is_closed() {
            return false;
        }
        self.state.transition(ReadyState::Connecting);

        let delay = self.policy.next_delay(self.resume.reconnection_interval);
        warn!(
            url = %self.url,
            attempt,
            reason = %reason,
            delay_ms = delay.as_millis() as u64,
            "EventSource reconnecting after backoff"
        );

        let notified = self
            .queue
            .schedule(Notification::Error(ErrorEvent {
                reconnecting: true,
                reason,
            }))
            .await;
        if !notified {
            return false;
        }

        tokio::select! {
            biased;
            () = self.stopped() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Close permanently and report the failure.
    async fn fail(&mut self, err: EventSourceError) {
        error!(url = %self.url, error = %err, "EventSource connection failed, not retrying");
        if self.state.close(CloseCause::Failed) {
            self.queue
                .schedule(Notification::Error(ErrorEvent {
                    reconnecting: false,
                    reason: err.to_string(),
                }))
                .await;
        }
    }
}

/// Accept only `200 OK` with a `text/event-stream` content type.
fn validate_response(response: &TransportResponse) -> EventSourceResult<()> {
    if response.status != http::StatusCode::OK {
        return Err(EventSourceError::invalid_status(response.status));
    }
    let content_type = response.content_type().unwrap_or_default();
    if !is_event_stream(content_type) {
        return Err(EventSourceError::invalid_content_type(content_type));
    }
    Ok(())
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .get(..EVENT_STREAM_MIME.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(EVENT_STREAM_MIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, content_type: Option<&'static str>) -> TransportResponse {
        let mut headers = http::HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static(ct),
            );
        }
        TransportResponse {
            status: http::StatusCode::from_u16(status).expect("status"),
            headers,
            url: Url::parse("http://example.com/stream").expect("url"),
            body: Box::pin(futures_util::stream::empty()),
        }
    }

    #[test]
    fn test_content_type_prefix_is_case_insensitive() {
        assert!(is_event_stream("text/event-stream"));
        assert!(is_event_stream("Text/Event-Stream; charset=utf-8"));
        assert!(!is_event_stream("text/event"));
        assert!(!is_event_stream("application/json"));
        assert!(!is_event_stream(" text/event-stream"));
        assert!(!is_event_stream(""));
    }

    #[test]
    fn test_validate_response() {
        assert!(validate_response(&response(200, Some("text/event-stream"))).is_ok());

        let err = validate_response(&response(204, Some("text/event-stream")))
            .expect_err("204 is fatal");
        assert!(matches!(err, EventSourceError::InvalidStatus { .. }));

        let err = validate_response(&response(500, None)).expect_err("500 is fatal");
        assert!(matches!(err, EventSourceError::InvalidStatus { .. }));

        let err = validate_response(&response(200, Some("text/html")))
            .expect_err("wrong content type");
        assert!(matches!(err, EventSourceError::InvalidContentType { .. }));

        let err = validate_response(&response(200, None)).expect_err("missing content type");
        assert!(matches!(err, EventSourceError::InvalidContentType { .. }));
    }
}
