//! Line splitting and field extraction.

use bytes::{Buf, Bytes, BytesMut};

use super::constants::{COLON, CR, LF};

/// Field names understood by the parser, matched ASCII case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldName {
    Event,
    Data,
    Id,
    Retry,
    Ignored,
}

impl FieldName {
    fn from_bytes(name: &[u8]) -> Self {
        if name.eq_ignore_ascii_case(b"event") {
            Self::Event
        } else if name.eq_ignore_ascii_case(b"data") {
            Self::Data
        } else if name.eq_ignore_ascii_case(b"id") {
            Self::Id
        } else if name.eq_ignore_ascii_case(b"retry") {
            Self::Retry
        } else {
            Self::Ignored
        }
    }
}

/// One fully terminated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Line<'a> {
    /// Blank line, the event block delimiter.
    Empty,
    /// Line starting with `:`.
    Comment,
    /// `name` or `name: value`. A line without a colon has an empty value.
    Field { name: FieldName, value: &'a [u8] },
}

impl<'a> Line<'a> {
    pub(crate) fn parse(bytes: &'a [u8]) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }
        match memchr::memchr(COLON, bytes) {
            Some(0) => Self::Comment,
            Some(colon_pos) => {
                let value = &bytes[colon_pos + 1..];
                // Strip single leading space if present.
                let value = match value {
                    [b' ', rest @ ..] => rest,
                    _ => value,
                };
                Self::Field {
                    name: FieldName::from_bytes(&bytes[..colon_pos]),
                    value,
                }
            }
            None => Self::Field {
                name: FieldName::from_bytes(bytes),
                value: &[],
            },
        }
    }
}

/// Finds the next end-of-line in `bytes`, searching from `from`.
///
/// Returns `(line_end, remainder_start)`. Returns `None` if more data is
/// needed, including when the buffer ends with a CR that may be the first
/// half of a CRLF pair.
fn find_eol(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let first_match = from + memchr::memchr2(CR, LF, bytes.get(from..)?)?;

    if bytes[first_match] == LF {
        return Some((first_match, first_match + 1));
    }
    match bytes.get(first_match + 1) {
        None => None,
        Some(&LF) => Some((first_match, first_match + 2)),
        Some(_) => Some((first_match, first_match + 1)),
    }
}

/// Splits the next terminated line off the front of `buffer`, without its
/// terminator.
///
/// `scanned` is the length of the buffer prefix already known to hold no
/// terminator. It is advanced when no line is found, so a partial line is
/// never searched twice, and reset once a line is split off.
pub(crate) fn next_line(buffer: &mut BytesMut, scanned: &mut usize) -> Option<Bytes> {
    let Some((line_end, rem_start)) = find_eol(buffer, *scanned) else {
        // A trailing CR is looked at again once the next byte arrives.
        *scanned = buffer.len() - usize::from(buffer.last() == Some(&CR));
        return None;
    };
    *scanned = 0;
    let line = buffer.split_to(line_end).freeze();
    buffer.advance(rem_start - line_end);
    Some(line)
}
