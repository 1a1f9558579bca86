//! Wire-level constants shared across the crate.

use core::time::Duration;

use bytes_utils::Str;

pub(crate) const LF: u8 = b'\n';
pub(crate) const CR: u8 = b'\r';

// bom = %xFEFF ; U+FEFF BYTE ORDER MARK
pub(crate) const BOM: &[u8] = "\u{FEFF}".as_bytes();

pub(crate) const EMPTY_STR: Str = Str::from_static("");

/// Reconnection delay used until the server advises one via `retry:`.
pub(crate) const DEFAULT_RETRY: Duration = Duration::from_millis(2500);

/// The only media type an event stream may be served with.
pub(crate) const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";

/// Ready-state updates buffered ahead of the consumer, sized for several
/// reconnect cycles of two transitions each.
pub(crate) const STATUS_BUFFER: usize = 32;
