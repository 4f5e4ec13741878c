//! # hpx-eventsource
//!
//! Client-side Server-Sent Events engine: a long-lived, auto-reconnecting
//! `text/event-stream` connection that is parsed incrementally into message
//! events and exposes a `CONNECTING` / `OPEN` / `CLOSED` lifecycle.
//!
//! ## Features
//!
//! - **Incremental parsing**: LF / CR / CRLF line endings, BOM stripping and
//!   chunk boundaries anywhere, per the HTML Living Standard.
//! - **Resumption**: the last `id` seen is sent back as `Last-Event-ID` on
//!   every reconnection.
//! - **Backoff**: reconnection delays grow geometrically from the server's
//!   `retry` interval and reset on every successful open.
//! - **Buffer bounding**: a stream that delivers more than the configured
//!   limit is silently restarted.
//! - **Deferred delivery**: notifications are queued and re-checked against
//!   the ready state when the consumer receives them, so nothing is
//!   delivered after `close()`.
//!
//! ## Architecture
//!
//! ```text
//! EventSource::connect(config, transport)
//!   └─ spawns ConnectionManager ──► Transport::start(request)
//!        │                              │ body chunks
//!        │                              ▼
//!        │                         StreamParser ──► DispatchQueue (mpsc)
//!        │                              │                 │
//!        │                         BufferGuard            ▼
//!        │                                         EventSourceStream
//!        └─ ReconnectionPolicy ◄── loss / end of stream
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hpx_eventsource::{EventSource, EventSourceConfig, Notification};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EventSourceConfig::new("http://localhost:8080/events");
//! let mut source = EventSource::connect_http(config).await?;
//!
//! while let Some(notification) = source.next_notification().await {
//!     match notification {
//!         Notification::Open => println!("open"),
//!         Notification::Message(event) => {
//!             println!("{}: {}", event.event_type(), event.data());
//!         }
//!         Notification::Error(err) if !err.reconnecting => break,
//!         _ => {}
//!     }
//! }
//! source.close();
//! # Ok(())
//! # }
//! ```

pub mod buffer_guard;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod parse;
pub mod reconnect;
pub mod state;
pub mod transport;

#[cfg(feature = "hyper-transport")]
pub mod hyper_transport;

pub use buffer_guard::BufferGuard;
pub use config::{
    EventSourceConfig, Settings, set_default_reconnection_interval, set_max_buffer_size,
    set_reconnection_growth_rate,
};
pub use connection::{EventSource, EventSourceHandle};
pub use dispatch::{ErrorEvent, EventSourceStream, Notification};
pub use error::{EventSourceError, EventSourceResult};
#[cfg(feature = "hyper-transport")]
pub use hyper_transport::HyperTransport;
pub use parse::{MessageEvent, StreamParser};
pub use reconnect::ReconnectionPolicy;
pub use state::{ReadyState, ResumeState};
pub use transport::{
    AlwaysOnline, BodyStream, NetworkMonitor, NetworkStatus, StreamRequest, Transport,
    TransportResponse,
};
