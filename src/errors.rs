//! Error types for decoding and for the client.

use core::fmt::{Display, Formatter};
use core::str::Utf8Error;
use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

/// Decoder failure. `E` is the error type of the underlying byte stream.
///
/// A cleanly exhausted stream is not an error; the decoder signals it by
/// ending, discarding any half-built record as the format requires.
#[derive(Debug, PartialEq)]
pub enum DecodeError<E> {
    /// The underlying stream failed.
    Transport(E),
    /// The stream carried invalid UTF-8.
    Utf8(Utf8Error),
    /// A single line exceeded the configured maximum length.
    LineOverflow { limit: usize },
}

impl<E> From<Utf8Error> for DecodeError<E> {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8(value)
    }
}

impl<E> Display for DecodeError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::Transport(e) => e.fmt(f),
            DecodeError::Utf8(e) => e.fmt(f),
            DecodeError::LineOverflow { limit } => {
                write!(f, "line exceeded the configured maximum of {limit} bytes")
            }
        }
    }
}

impl<E> core::error::Error for DecodeError<E> where E: core::error::Error {}

/// Why an [`EventSource`][crate::client::EventSource] gave up or had to
/// reconnect.
///
/// Cloneable so the same value can be returned from the initial connect and
/// attached to the terminal `Closed` status.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The response media type is not `text/event-stream`.
    #[error("content type {0:?} is not \"text/event-stream\"")]
    ContentType(String),
    /// The server answered 401.
    #[error("connection is unauthorized")]
    Unauthorized,
    /// Non-2xx response that is neither 401 nor 204.
    #[error("request returned status {0}")]
    HttpNotOk(StatusCode),
    /// The request could not be performed.
    #[error("transport failure: {0}")]
    Transport(Arc<reqwest::Error>),
    /// The open stream broke mid-flight.
    #[error("stream failure: {0}")]
    Stream(Arc<DecodeError<reqwest::Error>>),
    /// The resume id cannot be carried in a `Last-Event-ID` header.
    #[error("last event id {0:?} cannot be sent as a header")]
    InvalidLastEventId(String),
}

impl ClientError {
    /// Was this caused by a response with the wrong media type?
    pub fn is_content_type(&self) -> bool {
        matches!(self, ClientError::ContentType(_))
    }

    /// Was this caused by a 401 response?
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }
}
