//! Stateful stream interpretation.

use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use bytes_utils::Str;
use tracing::debug;

use super::{
    constants::{BOM, CR, LF, MESSAGE_STR},
    event::MessageEvent,
    line::{FieldName, Line, next_line},
};
use crate::state::ResumeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BomState {
    /// Fewer than three bytes seen and all of them match the BOM so far.
    Pending,
    Done,
}

/// Parser for one response body.
///
/// A fresh parser is created for every stream attempt. Values that must
/// survive reconnection (`last_event_id`, `reconnection_interval`) live in
/// the caller's [`ResumeState`] and are updated in place.
#[derive(Debug)]
pub struct StreamParser {
    /// Unconsumed tail of the stream. Everything before it has been parsed.
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for a line terminator.
    scanned: usize,
    bom: BomState,
    origin: Str,
    event_type: String,
    data: String,
    /// `id` value seen in the current stream, committed on every dispatch.
    pending_id: Option<Str>,
}

impl StreamParser {
    /// Create a parser for a stream served from `origin`.
    pub fn new(origin: impl Into<Str>) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            bom: BomState::Pending,
            origin: origin.into(),
            event_type: String::new(),
            data: String::new(),
            pending_id: None,
        }
    }

    /// Origin attached to every dispatched message.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Bytes received but not yet part of a terminated line.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed the next chunk of the body.
    ///
    /// Every complete line is interpreted; `emit` is called once for each
    /// completed message, in stream order. A trailing partial line is kept
    /// until more data arrives.
    pub fn feed(
        &mut self,
        chunk: &[u8],
        resume: &mut ResumeState,
        mut emit: impl FnMut(MessageEvent),
    ) {
        if chunk.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(chunk);

        if self.bom == BomState::Pending {
            match starts_with_bom(&self.buffer) {
                Some(true) => {
                    self.buffer.advance(BOM.len());
                    self.bom = BomState::Done;
                }
                Some(false) => self.bom = BomState::Done,
                None => return,
            }
        }

        self.drain_lines(resume, &mut emit);
    }

    /// Signal the end of the body.
    ///
    /// A final lone CR can no longer be the start of a CRLF pair, so it is
    /// treated as a line terminator. An unterminated last line is discarded.
    pub fn finish(&mut self, resume: &mut ResumeState, mut emit: impl FnMut(MessageEvent)) {
        if self.buffer.last() == Some(&CR) {
            self.buffer.put_u8(LF);
            self.drain_lines(resume, &mut emit);
        }
        self.buffer.clear();
        self.scanned = 0;
    }

    fn drain_lines(&mut self, resume: &mut ResumeState, emit: &mut impl FnMut(MessageEvent)) {
        while let Some(line) = next_line(&mut self.buffer, &mut self.scanned) {
            match Line::parse(&line) {
                Line::Empty => {
                    if let Some(event) = self.dispatch(resume) {
                        emit(event);
                    }
                }
                Line::Comment => {}
                Line::Field { name, value } => self.process_field(name, value, resume),
            }
        }
    }

    fn process_field(&mut self, name: FieldName, value: &[u8], resume: &mut ResumeState) {
        match name {
            FieldName::Event => {
                self.event_type.clear();
                self.event_type.push_str(&String::from_utf8_lossy(value));
            }
            FieldName::Data => {
                self.data.push_str(&String::from_utf8_lossy(value));
                self.data.push('\n');
            }
            FieldName::Id => {
                if memchr::memchr(0, value).is_none() {
                    self.pending_id = Some(Str::from(String::from_utf8_lossy(value).into_owned()));
                }
            }
            FieldName::Retry => {
                if let Some(interval) = parse_retry(value) {
                    debug!(retry_ms = interval.as_millis() as u64, "Reconnection interval updated");
                    resume.reconnection_interval = interval;
                }
            }
            FieldName::Ignored => {}
        }
    }

    fn dispatch(&mut self, resume: &mut ResumeState) -> Option<MessageEvent> {
        if let Some(id) = &self.pending_id {
            resume.last_event_id = id.clone();
        }

        let event_type = std::mem::take(&mut self.event_type);
        let mut data = std::mem::take(&mut self.data);
        if data.is_empty() {
            return None;
        }
        if data.ends_with('\n') {
            data.pop();
        }

        let event = if event_type.is_empty() {
            MESSAGE_STR
        } else {
            Str::from(event_type)
        };

        Some(MessageEvent {
            event,
            data: Str::from(data),
            origin: self.origin.clone(),
            last_event_id: resume.last_event_id.clone(),
        })
    }
}

/// Parses a `retry` value made only of ASCII digits.
fn parse_retry(value: &[u8]) -> Option<Duration> {
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(value)
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_millis)
}

/// `None` while the buffer is too short to decide.
const fn starts_with_bom(buf: &[u8]) -> Option<bool> {
    match buf.len() {
        0 => None,
        1 => {
            if buf[0] == BOM[0] {
                None
            } else {
                Some(false)
            }
        }
        2 => {
            if buf[0] == BOM[0] && buf[1] == BOM[1] {
                None
            } else {
                Some(false)
            }
        }
        _gte_3 => Some(buf[0] == BOM[0] && buf[1] == BOM[1] && buf[2] == BOM[2]),
    }
}
