//! Field-level interpretation of scanned lines, per
//! [html.spec.whatwg.org](https://html.spec.whatwg.org/multipage/server-sent-events.html#event-stream-interpretation).

use core::str::Utf8Error;

use bytes::Bytes;
use bytes_utils::Str;

use crate::constants::EMPTY_STR;

/// Field names the event-stream format gives meaning to. Anything else is
/// carried as [`FieldName::Ignored`] so the decoder can skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    Event,
    Data,
    Id,
    Retry,
    Ignored,
}

impl FieldName {
    fn from_bytes(name: &[u8]) -> Self {
        match name {
            b"event" => Self::Event,
            b"data" => Self::Data,
            b"id" => Self::Id,
            b"retry" => Self::Retry,
            _ => Self::Ignored,
        }
    }
}

/// One interpreted line of an event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// Leading-colon line, skipped entirely.
    Comment,
    /// Record separator.
    Empty,
    Field { name: FieldName, value: Str },
}

/// Interprets a single scanned line (terminator already removed).
///
/// The value is everything after the colon minus at most one leading SPACE;
/// tabs and any further spaces are preserved. A line without a colon is a
/// field with an empty value.
pub fn classify_line(line: Bytes) -> Result<Line, Utf8Error> {
    if line.is_empty() {
        return Ok(Line::Empty);
    }
    match memchr::memchr(b':', &line) {
        Some(0) => Ok(Line::Comment),
        Some(colon) => {
            let name = FieldName::from_bytes(&line[..colon]);
            let value_start = if line.get(colon + 1) == Some(&b' ') {
                colon + 2
            } else {
                colon + 1
            };
            Ok(Line::Field {
                name,
                value: validate(line.slice(value_start..))?,
            })
        }
        None => Ok(Line::Field {
            name: FieldName::from_bytes(&line),
            value: EMPTY_STR,
        }),
    }
}

fn validate(value: Bytes) -> Result<Str, Utf8Error> {
    core::str::from_utf8(&value)?;
    // Checked just above.
    Ok(unsafe { Str::from_inner_unchecked(value) })
}
