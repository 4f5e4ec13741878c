//! EventSource configuration.
//!
//! Two layers exist:
//!
//! - [`Settings`]: process-wide defaults. The reconnection interval and
//!   growth rate are snapshotted when a connection is created, while the
//!   maximum buffer size is read live on every buffer check.
//! - [`EventSourceConfig`]: per-connection builder, with optional overrides
//!   for each of the process-wide values.

use std::time::Duration;

use parking_lot::{RwLock, const_rwlock};
use url::Url;

use crate::{
    error::{EventSourceError, EventSourceResult},
    reconnect::{DEFAULT_GROWTH_RATE, validate_growth_rate},
};

/// Default base reconnection interval.
pub const DEFAULT_RECONNECTION_INTERVAL: Duration = Duration::from_millis(1000);

/// Default cumulative size after which a stream is restarted.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Process-wide settings
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
struct SettingsValues {
    reconnection_interval: Duration,
    growth_rate: f64,
    max_buffer_size: usize,
}

/// Shared defaults for every connection in the process.
///
/// Setters validate their input and leave the stored value unchanged on
/// error.
#[derive(Debug)]
pub struct Settings {
    values: RwLock<SettingsValues>,
}

static GLOBAL: Settings = Settings::new();

impl Settings {
    /// Create a settings cell holding the built-in defaults.
    pub const fn new() -> Self {
        Self {
            values: const_rwlock(SettingsValues {
                reconnection_interval: DEFAULT_RECONNECTION_INTERVAL,
                growth_rate: DEFAULT_GROWTH_RATE,
                max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            }),
        }
    }

    /// The process-wide instance used by [`EventSource::connect`].
    ///
    /// [`EventSource::connect`]: crate::connection::EventSource::connect
    pub fn global() -> &'static Settings {
        &GLOBAL
    }

    /// Default base reconnection interval.
    pub fn reconnection_interval(&self) -> Duration {
        self.values.read().reconnection_interval
    }

    /// Set the default base reconnection interval.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::Config`] if `interval` is zero.
    pub fn set_reconnection_interval(&self, interval: Duration) -> EventSourceResult<()> {
        if interval.is_zero() {
            return Err(EventSourceError::config(
                "Reconnection interval must be > 0",
            ));
        }
        self.values.write().reconnection_interval = interval;
        Ok(())
    }

    /// Default backoff growth rate.
    pub fn growth_rate(&self) -> f64 {
        self.values.read().growth_rate
    }

    /// Set the default backoff growth rate.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::Config`] unless `rate` is finite and
    /// greater than `1.0`.
    pub fn set_growth_rate(&self, rate: f64) -> EventSourceResult<()> {
        validate_growth_rate(rate).map_err(EventSourceError::config)?;
        self.values.write().growth_rate = rate;
        Ok(())
    }

    /// Cumulative stream size after which the stream is restarted.
    pub fn max_buffer_size(&self) -> usize {
        self.values.read().max_buffer_size
    }

    /// Set the buffer restart threshold.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::Config`] if `size` is zero.
    pub fn set_max_buffer_size(&self, size: usize) -> EventSourceResult<()> {
        if size == 0 {
            return Err(EventSourceError::config("Max buffer size must be > 0"));
        }
        self.values.write().max_buffer_size = size;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Set the process-wide default reconnection interval.
///
/// Only affects connections created afterwards.
///
/// # Errors
///
/// See [`Settings::set_reconnection_interval`].
pub fn set_default_reconnection_interval(interval: Duration) -> EventSourceResult<()> {
    Settings::global().set_reconnection_interval(interval)
}

/// Set the process-wide backoff growth rate.
///
/// Only affects connections created afterwards.
///
/// # Errors
///
/// See [`Settings::set_growth_rate`].
pub fn set_reconnection_growth_rate(rate: f64) -> EventSourceResult<()> {
    Settings::global().set_growth_rate(rate)
}

/// Set the process-wide buffer restart threshold.
///
/// Takes effect on the next buffer check of every live connection.
///
/// # Errors
///
/// See [`Settings::set_max_buffer_size`].
pub fn set_max_buffer_size(size: usize) -> EventSourceResult<()> {
    Settings::global().set_max_buffer_size(size)
}

// ---------------------------------------------------------------------------
// Per-connection configuration
// ---------------------------------------------------------------------------

/// Configuration for a single EventSource connection.
#[derive(Clone, Debug)]
pub struct EventSourceConfig {
    /// Stream URL, absolute or relative to `base_url`.
    pub url: String,
    /// Base URL used to resolve a relative `url`.
    pub base_url: Option<Url>,
    /// Whether credentials should accompany cross-origin requests.
    pub with_credentials: bool,
    /// Additional HTTP headers sent with every request.
    ///
    /// `Accept`, `Cache-Control` and `Last-Event-ID` are always set by the
    /// connection and override entries here.
    pub headers: http::HeaderMap,
    /// Capacity of the notification channel.
    pub event_channel_capacity: usize,
    /// Base reconnection interval. `None` snapshots the process-wide default.
    pub reconnection_interval: Option<Duration>,
    /// Backoff growth rate. `None` snapshots the process-wide default.
    pub growth_rate: Option<f64>,
    /// Buffer restart threshold. `None` reads the process-wide value live.
    pub max_buffer_size: Option<usize>,
    /// Upper bound for any single reconnection delay.
    pub max_reconnect_delay: Option<Duration>,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            base_url: None,
            with_credentials: false,
            headers: http::HeaderMap::new(),
            event_channel_capacity: 256,
            reconnection_interval: None,
            growth_rate: None,
            max_buffer_size: None,
            max_reconnect_delay: None,
        }
    }
}

impl EventSourceConfig {
    /// Create a configuration for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the base URL for resolving a relative stream URL.
    #[must_use]
    pub fn base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    /// Set the credentials flag.
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Set additional HTTP headers.
    #[must_use]
    pub fn headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the notification channel capacity.
    #[must_use]
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Override the base reconnection interval.
    #[must_use]
    pub fn reconnection_interval(mut self, interval: Duration) -> Self {
        self.reconnection_interval = Some(interval);
        self
    }

    /// Override the backoff growth rate.
    #[must_use]
    pub fn growth_rate(mut self, rate: f64) -> Self {
        self.growth_rate = Some(rate);
        self
    }

    /// Override the buffer restart threshold.
    #[must_use]
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = Some(size);
        self
    }

    /// Cap individual reconnection delays.
    #[must_use]
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = Some(delay);
        self
    }

    /// Resolve the stream URL to an absolute `http` or `https` URL.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::InvalidUrl`] if the URL cannot be parsed,
    /// is relative without a base, or uses another scheme.
    pub fn resolve_url(&self) -> EventSourceResult<Url> {
        if self.url.is_empty() {
            return Err(EventSourceError::invalid_url("URL cannot be empty"));
        }
        let url = match &self.base_url {
            Some(base) => base.join(&self.url)?,
            None => Url::parse(&self.url)?,
        };
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(EventSourceError::invalid_url(format!(
                "Unsupported scheme {other:?}"
            ))),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::Config`] if any override has an invalid
    /// value.
    pub fn validate(&self) -> EventSourceResult<()> {
        if self.event_channel_capacity == 0 {
            return Err(EventSourceError::config(
                "Event channel capacity must be > 0",
            ));
        }
        if self.reconnection_interval.is_some_and(|d| d.is_zero()) {
            return Err(EventSourceError::config(
                "Reconnection interval must be > 0",
            ));
        }
        if let Some(rate) = self.growth_rate {
            validate_growth_rate(rate).map_err(EventSourceError::config)?;
        }
        if self.max_buffer_size == Some(0) {
            return Err(EventSourceError::config("Max buffer size must be > 0"));
        }
        if self.max_reconnect_delay.is_some_and(|d| d.is_zero()) {
            return Err(EventSourceError::config(
                "Max reconnect delay must be > 0",
            ));
        }
        Ok(())
    }
}
