//! Parsers turn a byte stream into a sequence of [`Record`]s (spec §4.2).
//!
//! Every parser shares one contract: given bytes that may end mid-record,
//! emit every complete record, leave the trailing partial bytes in place
//! for the next call, and never allocate memory proportional to the whole
//! input — only to the largest single record plus whatever state the
//! parser itself needs to carry across calls (spec §4.2 intro).

pub mod dsv;
pub mod json_array;
pub mod ndjson;
pub mod xml;

use crate::error::ConvertResult;
use crate::record::Record;

/// A sink a parser emits completed records into. Returning `Err` from the
/// sink (a downstream transform/encoder failure) aborts the parser's
/// current `feed`/`finish` call immediately; the parser must leave its
/// internal state consistent for the error to propagate cleanly to the
/// kernel's terminal `Failed` state.
pub type Sink<'a> = dyn FnMut(Record) -> ConvertResult<()> + 'a;

/// Re-entrant, chunk-safe parser for one input format.
pub trait Parser {
    /// Consume as much of `buffer` as currently possible, emitting every
    /// complete record to `emit`, then drain the consumed prefix out of
    /// `buffer` so it only holds bytes still needed for a future call.
    fn feed(&mut self, buffer: &mut Vec<u8>, emit: &mut Sink) -> ConvertResult<()>;

    /// Called once, after the last `feed`. `buffer` holds whatever trailing
    /// bytes were never consumed; the parser must emit a final trailing
    /// record if one is complete, or fail with `UnexpectedEof`/`ParseError`
    /// if the input was truncated mid-record.
    fn finish(&mut self, buffer: &mut Vec<u8>, emit: &mut Sink) -> ConvertResult<()>;

    /// Bytes of state the parser is holding onto beyond what's left
    /// unconsumed in `buffer` (a partially-built record's fields, a
    /// depth-counter's pending bytes, ...). Added to `buffer.len()` to
    /// compute `currentPartialSize` / enforce `maxBufferBytes` (spec §3).
    fn pending_bytes(&self) -> usize;
}
