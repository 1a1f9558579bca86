//! Canonical wire serialisation of message events.

use core::time::Duration;
use std::io::{self, Write};

use crate::event::MessageEvent;

/// Writes `text/event-stream` records to a byte sink.
///
/// Each call assembles its output in a scratch buffer and lands on the
/// sink as a single write, returning the number of bytes written.
#[derive(Debug)]
pub struct Encoder<W> {
    buf: Vec<u8>,
    out: W,
}

impl<W> Encoder<W>
where
    W: Write,
{
    pub fn new(out: W) -> Self {
        Self {
            buf: Vec::new(),
            out,
        }
    }

    /// Serialises one full event record, terminated by a blank line.
    ///
    /// An explicit empty id is written as a bare `id` line, which tells the
    /// receiver to reset its resume position. Multi-line data becomes one
    /// `data:` line per LF-separated component.
    pub fn write_event(&mut self, event: &MessageEvent) -> io::Result<usize> {
        self.buf.clear();

        match &event.id {
            Some(id) if id.is_empty() => self.buf.extend_from_slice(b"id\n"),
            Some(id) => {
                self.buf.extend_from_slice(b"id: ");
                self.buf.extend_from_slice(id.as_bytes());
                self.buf.push(b'\n');
            }
            None => {}
        }

        if !event.name.is_empty() {
            self.buf.extend_from_slice(b"event: ");
            self.buf.extend_from_slice(event.name.as_bytes());
            self.buf.push(b'\n');
        }

        if !event.data.is_empty() {
            for line in event.data.split('\n') {
                self.buf.extend_from_slice(b"data: ");
                self.buf.extend_from_slice(line.as_bytes());
                self.buf.push(b'\n');
            }
        }

        self.buf.push(b'\n');
        self.flush_buf()
    }

    /// Writes a `retry:` directive advising the reconnection delay.
    pub fn write_retry(&mut self, retry: Duration) -> io::Result<usize> {
        self.buf.clear();
        writeln!(self.buf, "retry: {}", retry.as_millis())?;
        self.flush_buf()
    }

    /// Writes a comment line, which decoders discard.
    pub fn write_comment(&mut self, comment: &str) -> io::Result<usize> {
        self.buf.clear();
        self.buf.push(b':');
        self.buf.extend_from_slice(comment.as_bytes());
        self.buf.push(b'\n');
        self.flush_buf()
    }

    /// Returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn flush_buf(&mut self) -> io::Result<usize> {
        self.out.write_all(&self.buf)?;
        Ok(self.buf.len())
    }
}
