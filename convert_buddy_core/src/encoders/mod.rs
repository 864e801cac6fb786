//! Encoders turn a sequence of [`Record`]s back into bytes (spec §4.3).
//!
//! Every encoder writes into an owned output buffer that the kernel drains
//! and whose capacity it retains between calls (spec §3 "Output chunk"),
//! mirroring the amortized-growth `record_buffer`/`field_ends` pattern the
//! teacher crate keeps across `push_chunk` calls. Numeric/escape semantics
//! are bit-exact per format (spec §4.3); no pretty-printing by default.

pub mod dsv;
pub mod json_array;
pub mod ndjson;
pub mod xml;

use crate::error::ConvertResult;
use crate::record::Record;

/// An encoder for one output format. `write_record` is called once per
/// record the transform kept; `finish` is called exactly once, after the
/// last record, to emit any closing framing (array terminator, wrapper
/// close tag, ...).
pub trait Encoder {
    /// Append bytes representing `record` to `out`.
    fn write_record(&mut self, record: &Record, out: &mut Vec<u8>) -> ConvertResult<()>;

    /// Append closing framing to `out`. Called exactly once, even for zero
    /// records (spec §8 "Empty input" boundary behaviors).
    fn finish(&mut self, out: &mut Vec<u8>) -> ConvertResult<()>;
}
