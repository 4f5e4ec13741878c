//! Bounds the amount of data a single response may deliver.
//!
//! A response that never completes would otherwise grow without limit. Once
//! the cumulative size of one stream exceeds the threshold the connection
//! drops it and immediately starts a fresh request, resuming through
//! `Last-Event-ID`.

use crate::config::Settings;

/// Per-stream byte counter checked against the restart threshold.
#[derive(Debug, Clone, Copy)]
pub struct BufferGuard {
    received: usize,
    limit: Option<usize>,
}

impl BufferGuard {
    /// Guard reading the process-wide threshold on every check.
    pub fn new() -> Self {
        Self {
            received: 0,
            limit: None,
        }
    }

    /// Guard with a fixed threshold.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            received: 0,
            limit: Some(limit),
        }
    }

    /// Total bytes seen on this stream.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Threshold in effect right now.
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or_else(|| Settings::global().max_buffer_size())
    }

    /// Returns `true` iff `cumulative` exceeds the threshold.
    pub fn should_restart(&self, cumulative: usize) -> bool {
        cumulative > self.limit()
    }

    /// Account for `len` more bytes and report whether to restart.
    pub fn record(&mut self, len: usize) -> bool {
        self.received = self.received.saturating_add(len);
        self.should_restart(self.received)
    }
}

impl Default for BufferGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_only_above_limit() {
        let guard = BufferGuard::with_limit(10);
        assert!(!guard.should_restart(0));
        assert!(!guard.should_restart(10));
        assert!(guard.should_restart(11));
    }

    #[test]
    fn test_record_accumulates() {
        let mut guard = BufferGuard::with_limit(10);
        assert!(!guard.record(4));
        assert!(!guard.record(6));
        assert_eq!(guard.received(), 10);
        assert!(guard.record(1));
    }

    #[test]
    fn test_default_limit_is_global() {
        let guard = BufferGuard::new();
        assert_eq!(guard.limit(), Settings::global().max_buffer_size());
    }
}
