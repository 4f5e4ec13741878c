//! Deferred notification delivery.
//!
//! The driver task schedules notifications into a bounded FIFO channel; the
//! consumer receives them on its own turn through [`EventSourceStream`].
//! Every item is checked against the ready state at delivery, so once
//! `close()` has been called nothing more is yielded, including items that
//! were parsed and queued before the call.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::{parse::MessageEvent, state::ReadyStateCell};

/// Details of an `error` notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEvent {
    /// `true` if a reconnection has been scheduled, `false` if the
    /// connection failed permanently.
    pub reconnecting: bool,
    /// Human-readable cause.
    pub reason: String,
}

/// Consumer-visible notification.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Notification {
    /// The connection opened (or re-opened after a loss).
    Open,
    /// A message event. Its [`event_type`](MessageEvent::event_type) names
    /// the listener it is addressed to.
    Message(MessageEvent),
    /// The connection was lost or failed.
    Error(ErrorEvent),
}

impl Notification {
    /// Listener name: `"open"`, `"error"`, or the message's event type.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::Message(event) => event.event_type(),
            Self::Error(_) => "error",
        }
    }

    /// Returns the message if this is a message notification.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Self::Message(event) => Some(event),
            _ => None,
        }
    }

    /// Returns `true` for `open` notifications.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` for `error` notifications.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

/// Producer side, owned by the connection driver.
#[derive(Debug)]
pub(crate) struct DispatchQueue {
    tx: mpsc::Sender<Notification>,
    state: ReadyStateCell,
}

impl DispatchQueue {
    pub(crate) fn new(capacity: usize, state: ReadyStateCell) -> (Self, EventSourceStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let stream = EventSourceStream {
            rx,
            state: state.clone(),
        };
        (Self { tx, state }, stream)
    }

    /// Queue a notification for later delivery.
    ///
    /// Waits for channel capacity. Returns `false` if the consumer is gone
    /// or called `close()` meanwhile.
    pub(crate) async fn schedule(&self, notification: Notification) -> bool {
        tokio::select! {
            biased;
            () = self.state.close_requested() => false,
            sent = self.tx.send(notification) => sent.is_ok(),
        }
    }

    /// Resolves once the consumer dropped its stream.
    pub(crate) async fn abandoned(&self) {
        self.tx.closed().await;
    }
}

/// Stream of [`Notification`]s from an EventSource connection.
///
/// Ends after a fatal failure has been reported, or immediately once
/// `close()` has been called.
#[derive(Debug)]
pub struct EventSourceStream {
    rx: mpsc::Receiver<Notification>,
    state: ReadyStateCell,
}

impl EventSourceStream {
    /// Receive the next notification.
    pub async fn next_notification(&mut self) -> Option<Notification> {
        std::future::poll_fn(|cx| self.poll_deliver(cx)).await
    }

    fn poll_deliver(&mut self, cx: &mut Context<'_>) -> Poll<Option<Notification>> {
        if !self.state.delivers() {
            self.rx.close();
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            // The state may have changed while the item sat in the queue.
            Poll::Ready(Some(_)) if !self.state.delivers() => {
                self.rx.close();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Stream for EventSourceStream {
    type Item = Notification;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_deliver(cx)
    }
}
