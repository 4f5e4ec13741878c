//! Completed application-level events.

use bytes_utils::Str;

/// A message dispatched from a completed event block.
///
/// Only blocks that accumulated at least one `data` line produce a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Event type (`"message"` unless the block set an `event` field).
    pub event: Str,
    /// Payload, `data` lines joined by `\n`.
    pub data: Str,
    /// Serialized origin of the response that carried the event.
    pub origin: Str,
    /// Connection's last event ID at dispatch time.
    pub last_event_id: Str,
}

impl MessageEvent {
    /// Event type.
    pub fn event_type(&self) -> &str {
        &self.event
    }

    /// Payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Origin of the stream.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Last event ID.
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }
}
