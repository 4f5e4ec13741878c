//! Connection state shared between the driver task and the consumer.

use std::{fmt, sync::Arc, time::Duration};

use bytes_utils::Str;
use tokio::sync::watch;

/// Consumer-visible connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// Connecting, or waiting to reconnect.
    Connecting,
    /// Receiving events.
    Open,
    /// Terminal. No further reconnection and no further notifications.
    Closed,
}

impl ReadyState {
    /// Returns `true` if the connection is closed.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a connection reached [`ReadyState::Closed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CloseCause {
    /// `close()` was called by the consumer.
    Requested,
    /// The server response failed validation.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Connecting,
    Open,
    Closed(CloseCause),
}

impl Lifecycle {
    fn ready_state(self) -> ReadyState {
        match self {
            Self::Connecting => ReadyState::Connecting,
            Self::Open => ReadyState::Open,
            Self::Closed(_) => ReadyState::Closed,
        }
    }
}

/// Ready state cell enforcing the allowed transitions.
///
/// `CONNECTING <-> OPEN`, and either of them to `CLOSED`. Nothing leaves
/// `CLOSED`, except that a consumer `close()` after a failure records the
/// request so that pending notifications are dropped.
#[derive(Clone, Debug)]
pub(crate) struct ReadyStateCell {
    tx: Arc<watch::Sender<Lifecycle>>,
}

impl ReadyStateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(Lifecycle::Connecting);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn get(&self) -> ReadyState {
        self.tx.borrow().ready_state()
    }

    /// Move to `CONNECTING` or `OPEN`. Returns `false` if the state did not
    /// change (already there, or closed). Closing goes through
    /// [`close`](Self::close) only, so `to == Closed` is refused.
    pub(crate) fn transition(&self, to: ReadyState) -> bool {
        let target = match to {
            ReadyState::Connecting => Lifecycle::Connecting,
            ReadyState::Open => Lifecycle::Open,
            ReadyState::Closed => return false,
        };
        self.tx.send_if_modified(|current| {
            if matches!(current, Lifecycle::Closed(_)) || *current == target {
                return false;
            }
            *current = target;
            true
        })
    }

    /// Move to `CLOSED`. Returns `false` if already closed for the same or a
    /// stronger reason.
    pub(crate) fn close(&self, cause: CloseCause) -> bool {
        self.tx.send_if_modified(|current| match (*current, cause) {
            (Lifecycle::Closed(CloseCause::Requested), _)
            | (Lifecycle::Closed(CloseCause::Failed), CloseCause::Failed) => false,
            _ => {
                *current = Lifecycle::Closed(cause);
                true
            }
        })
    }

    /// Whether queued notifications may still reach the consumer.
    pub(crate) fn delivers(&self) -> bool {
        !matches!(*self.tx.borrow(), Lifecycle::Closed(CloseCause::Requested))
    }

    /// Resolves once the consumer has called `close()`.
    pub(crate) async fn close_requested(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx
            .wait_for(|s| matches!(s, Lifecycle::Closed(CloseCause::Requested)))
            .await;
    }
}

/// Per-connection values that outlive any single stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumeState {
    /// Echoed to the server as `Last-Event-ID` when non-empty.
    pub last_event_id: Str,
    /// Base reconnection interval, updated by `retry` fields.
    pub reconnection_interval: Duration,
}

impl ResumeState {
    /// Create resume state with an empty last event ID.
    pub fn new(reconnection_interval: Duration) -> Self {
        Self {
            last_event_id: Str::from_static(""),
            reconnection_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_connecting() {
        let cell = ReadyStateCell::new();
        assert_eq!(cell.get(), ReadyState::Connecting);
        assert!(cell.delivers());
    }

    #[test]
    fn test_open_and_reconnect_transitions() {
        let cell = ReadyStateCell::new();
        assert!(cell.transition(ReadyState::Open));
        assert!(!cell.transition(ReadyState::Open));
        assert!(cell.transition(ReadyState::Connecting));
        assert_eq!(cell.get(), ReadyState::Connecting);
    }

    #[test]
    fn test_transition_never_closes() {
        let cell = ReadyStateCell::new();
        assert!(!cell.transition(ReadyState::Closed));
        assert_eq!(cell.get(), ReadyState::Connecting);
        assert!(cell.transition(ReadyState::Open));
        assert!(!cell.transition(ReadyState::Closed));
        assert_eq!(cell.get(), ReadyState::Open);
    }

    #[test]
    fn test_closed_is_terminal() {
        let cell = ReadyStateCell::new();
        assert!(cell.close(CloseCause::Requested));
        assert!(!cell.transition(ReadyState::Open));
        assert!(!cell.transition(ReadyState::Connecting));
        assert!(!cell.close(CloseCause::Requested));
        assert!(!cell.close(CloseCause::Failed));
        assert_eq!(cell.get(), ReadyState::Closed);
        assert!(!cell.delivers());
    }

    #[test]
    fn test_failure_keeps_delivering_until_requested() {
        let cell = ReadyStateCell::new();
        assert!(cell.close(CloseCause::Failed));
        assert_eq!(cell.get(), ReadyState::Closed);
        assert!(cell.delivers());

        assert!(cell.close(CloseCause::Requested));
        assert_eq!(cell.get(), ReadyState::Closed);
        assert!(!cell.delivers());
    }

    #[tokio::test]
    async fn test_close_requested_resolves() {
        let cell = ReadyStateCell::new();
        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.close_requested().await })
        };
        tokio::task::yield_now().await;
        cell.close(CloseCause::Requested);
        waiter.await.expect("waiter completes");
    }

    #[test]
    fn test_ready_state_display() {
        assert_eq!(ReadyState::Connecting.to_string(), "CONNECTING");
        assert_eq!(ReadyState::Open.to_string(), "OPEN");
        assert_eq!(ReadyState::Closed.to_string(), "CLOSED");
    }
}
