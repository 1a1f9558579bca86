//! Message events surfaced to consumers.

use bytes_utils::Str;

use crate::constants::EMPTY_STR;

/// A dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// The record's explicit `id` field, when present and free of NUL.
    /// `Some("")` records a bare or empty `id` line, which resets the
    /// resume position.
    pub id: Option<Str>,
    /// Server-sent event name; empty when the record carried no `event`
    /// field. Consumers typically treat empty as the implicit name
    /// `message`.
    pub name: Str,
    /// All `data` values of the record joined with LF, without a trailing
    /// LF.
    pub data: Str,
    /// The id the stream is resumable from, as of this event.
    pub last_event_id: Str,
}

impl Default for MessageEvent {
    fn default() -> Self {
        Self {
            id: None,
            name: EMPTY_STR,
            data: EMPTY_STR,
            last_event_id: EMPTY_STR,
        }
    }
}
