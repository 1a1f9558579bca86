//! Streaming decoder for `text/event-stream` input.

use core::{
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};

use bytes::{Buf, BytesMut};
use bytes_utils::{Str, StrMut};
use futures_core::Stream;
use futures_util::StreamExt;

use crate::{
    constants::{BOM, DEFAULT_RETRY, EMPTY_STR, LF},
    errors::DecodeError,
    event::MessageEvent,
    parser::{FieldName, Line, classify_line},
    scanner::{find_line_boundary, take_line},
};

/// Accumulates the fields of the record currently being parsed.
#[derive(Debug)]
struct EventBuilder {
    name: Str,
    id: Option<Str>,
    data: StrMut,
    seen: bool,
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self {
            name: EMPTY_STR,
            id: None,
            data: StrMut::new(),
            seen: false,
        }
    }
}

impl EventBuilder {
    /// Folds one line into the record. Returns a finished event when the
    /// line is the record separator and a recognised field came before it.
    ///
    /// `last_event_id` and `retry` outlive single records, so they live on
    /// the decoder and are threaded through here.
    fn add(
        &mut self,
        line: Line,
        last_event_id: &mut Str,
        retry: &mut Duration,
    ) -> Option<MessageEvent> {
        match line {
            Line::Empty => {
                if self.seen {
                    return Some(self.dispatch(last_event_id));
                }
            }
            Line::Comment => {}
            Line::Field {
                name: FieldName::Event,
                value,
            } => {
                self.name = value;
                self.seen = true;
            }
            Line::Field {
                name: FieldName::Data,
                value,
            } => {
                self.data.push_str(&value);
                self.data.push('\n');
                self.seen = true;
            }
            Line::Field {
                name: FieldName::Id,
                value,
            } => {
                // An id carrying NUL is discarded but the field still
                // counts towards dispatching the record.
                self.seen = true;
                if memchr::memchr(0, value.as_bytes()).is_none() {
                    *last_event_id = value.clone();
                    self.id = Some(value);
                }
            }
            Line::Field {
                name: FieldName::Retry,
                value,
            } => {
                // Negative or malformed values are ignored, and retry alone
                // never dispatches a record.
                if let Ok(millis) = value.parse::<u64>() {
                    *retry = Duration::from_millis(millis);
                }
            }
            Line::Field {
                name: FieldName::Ignored,
                ..
            } => {}
        }
        None
    }

    fn dispatch(&mut self, last_event_id: &Str) -> MessageEvent {
        let EventBuilder { name, id, data, .. } = core::mem::take(self);

        let mut buf = data.into_inner();
        if buf.last() == Some(&LF) {
            buf.truncate(buf.len() - 1);
        }
        // Safety: LF is a complete code point, so removing it cannot split
        // a UTF-8 sequence.
        let data = unsafe { Str::from_inner_unchecked(buf.freeze()) };

        MessageEvent {
            id,
            name,
            data,
            last_event_id: last_event_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Nothing parsed yet; a leading byte-order mark may still arrive.
    Leading,
    Running,
    /// Input exhausted; only the residual buffer is left to drain.
    Eof,
    /// Poisoned by a decode error.
    Failed,
}

fn next_event<E>(
    buffer: &mut BytesMut,
    builder: &mut EventBuilder,
    last_event_id: &mut Str,
    retry: &mut Duration,
    max_line_len: Option<usize>,
    at_eof: bool,
) -> Result<Option<MessageEvent>, DecodeError<E>> {
    loop {
        if let Some(limit) = max_line_len {
            match find_line_boundary(buffer, at_eof) {
                Some(boundary) if boundary.end > limit => {
                    return Err(DecodeError::LineOverflow { limit });
                }
                None if buffer.len() > limit => {
                    return Err(DecodeError::LineOverflow { limit });
                }
                _ => {}
            }
        }
        let Some(line) = take_line(buffer, at_eof) else {
            return Ok(None);
        };
        let line = classify_line(line).map_err(DecodeError::Utf8)?;
        if let Some(event) = builder.add(line, last_event_id, retry) {
            return Ok(Some(event));
        }
    }
}

macro_rules! try_next_event {
    ($this:ident, $at_eof:expr) => {
        match next_event(
            $this.buffer,
            $this.builder,
            $this.last_event_id,
            $this.retry,
            *$this.max_line_len,
            $at_eof,
        ) {
            Ok(Some(event)) => return Poll::Ready(Some(Ok(event))),
            Ok(None) => {}
            Err(e) => {
                *$this.phase = Phase::Failed;
                return Poll::Ready(Some(Err(e)));
            }
        }
    };
}

pin_project_lite::pin_project! {
    /// Parses a chunked byte stream into [`MessageEvent`]s.
    ///
    /// Implemented as a [`Stream`]: `Some(Ok(event))` per dispatched
    /// record, `Some(Err(_))` on transport or encoding failures, `None`
    /// once the input ends (any half-built record is discarded, as the
    /// format requires). A leading U+FEFF byte order mark is stripped.
    #[derive(Debug)]
    pub struct Decoder<S> {
        #[pin]
        stream: S,
        buffer: BytesMut,
        builder: EventBuilder,
        phase: Phase,
        last_event_id: Str,
        retry: Duration,
        max_line_len: Option<usize>,
    }
}

impl<S> Decoder<S> {
    /// Decoder with an unbounded line buffer.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            builder: EventBuilder::default(),
            phase: Phase::Leading,
            last_event_id: EMPTY_STR,
            retry: DEFAULT_RETRY,
            max_line_len: None,
        }
    }

    /// Decoder that refuses lines longer than `limit` bytes, surfacing
    /// [`DecodeError::LineOverflow`] and ending the stream.
    pub fn with_max_line_len(stream: S, limit: usize) -> Self {
        Self {
            max_line_len: Some(limit),
            ..Self::new(stream)
        }
    }

    /// The server-advised reconnection delay: the most recent valid
    /// `retry:` value, or 2500 ms before one arrives.
    pub fn retry(&self) -> Duration {
        self.retry
    }

    /// The id the stream is currently resumable from.
    pub fn last_event_id(&self) -> &Str {
        &self.last_event_id
    }

    /// Seeds the resume id, e.g. when picking up after a reconnect.
    pub fn set_last_event_id(&mut self, id: impl Into<Str>) {
        self.last_event_id = id.into()
    }
}

impl<S, B, E> Decoder<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    /// Parses the next event, consuming as much input as needed.
    pub async fn decode(&mut self) -> Option<Result<MessageEvent, DecodeError<E>>> {
        self.next().await
    }
}

impl<S, B, E> Stream for Decoder<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    type Item = Result<MessageEvent, DecodeError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        match *this.phase {
            Phase::Failed => return Poll::Ready(None),
            Phase::Eof => {
                try_next_event!(this, true);
                return Poll::Ready(None);
            }
            // While a leading byte order mark may still arrive the buffer
            // holds fewer than three bytes, so there is nothing to parse
            // early.
            Phase::Leading => {}
            Phase::Running => try_next_event!(this, false),
        }

        loop {
            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let chunk = chunk.as_ref();
                    if chunk.is_empty() {
                        continue;
                    }
                    this.buffer.extend_from_slice(chunk);

                    if let Phase::Leading = *this.phase {
                        if this.buffer.len() < BOM.len() {
                            // The mark may still be split across chunks.
                            continue;
                        }
                        if this.buffer.starts_with(BOM) {
                            this.buffer.advance(BOM.len());
                        }
                        *this.phase = Phase::Running;
                    }

                    try_next_event!(this, false);
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(DecodeError::Transport(e)))),
                None => {
                    *this.phase = Phase::Eof;
                    try_next_event!(this, true);
                    return Poll::Ready(None);
                }
            }
        }
    }
}
