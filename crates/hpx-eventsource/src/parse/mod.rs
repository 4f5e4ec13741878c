//! Incremental `text/event-stream` parser.
//!
//! Based on the
//! [HTML Living Standard](https://html.spec.whatwg.org/multipage/server-sent-events.html)
//! event stream interpretation rules. Chunks may split lines, CRLF pairs and
//! the leading byte order mark at arbitrary positions; only fully terminated
//! lines are interpreted.

pub(crate) mod constants;
pub mod event;
pub(crate) mod line;
pub mod parser;

pub use event::MessageEvent;
pub use parser::StreamParser;
