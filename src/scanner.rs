//! Logical-line extraction for the event-stream wire format.
//!
//! Lines end with LF, CRLF, or a lone CR. A CR at the tail of the available
//! bytes is ambiguous until the next byte arrives (it may be half of a
//! CRLF), so the scanner refuses to commit it unless the stream is known to
//! have ended.

use bytes::{Buf, Bytes, BytesMut};

use crate::constants::{CR, LF};

/// Location of the next logical line within a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBoundary {
    /// Exclusive end of the line content.
    pub end: usize,
    /// Start of the bytes following the terminator.
    pub next: usize,
}

/// Finds the next line boundary in `bytes`, or `None` when more input is
/// needed.
///
/// With `at_eof` set the bytes are final: a trailing CR terminates its line
/// and an unterminated tail is yielded as one last line.
pub fn find_line_boundary(bytes: &[u8], at_eof: bool) -> Option<LineBoundary> {
    match memchr::memchr2(CR, LF, bytes) {
        Some(pos) if bytes[pos] == LF => Some(LineBoundary {
            end: pos,
            next: pos + 1,
        }),
        Some(pos) => match bytes.get(pos + 1) {
            Some(&LF) => Some(LineBoundary {
                end: pos,
                next: pos + 2,
            }),
            Some(_) => Some(LineBoundary {
                end: pos,
                next: pos + 1,
            }),
            None if at_eof => Some(LineBoundary {
                end: pos,
                next: pos + 1,
            }),
            None => None,
        },
        None if at_eof && !bytes.is_empty() => Some(LineBoundary {
            end: bytes.len(),
            next: bytes.len(),
        }),
        None => None,
    }
}

/// Splits the next logical line off the front of `buffer`, consuming its
/// terminator.
pub fn take_line(buffer: &mut BytesMut, at_eof: bool) -> Option<Bytes> {
    let boundary = find_line_boundary(buffer, at_eof)?;
    let line = buffer.split_to(boundary.end).freeze();
    buffer.advance(boundary.next - boundary.end);
    Some(line)
}
