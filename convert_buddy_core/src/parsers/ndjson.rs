//! NDJSON parser (spec §4.2.2): any whitespace-delimited sequence of JSON
//! values, canonically one per line.
//!
//! Incremental parsing is a depth counter plus a small string-state
//! automaton (in-string, escape-next) shared with the JSON array parser via
//! [`ValueScanner`]. A record boundary is the return to depth 0 outside a
//! string.

use crate::config::JsonConfig;
use crate::error::{ConvertError, ConvertResult, ParseErrorKind};
use crate::parsers::{Parser, Sink};
use crate::record::{Record, Scalar};
use serde_json::Value;

/// Scans a byte stream for complete top-level JSON values without needing
/// the whole input in memory. Shared building block for NDJSON and the
/// JSON-array element parser.
#[derive(Default)]
pub(crate) struct ValueScanner {
    depth: i64,
    in_string: bool,
    escape_next: bool,
    started: bool,
    pub(crate) scratch: Vec<u8>,
}

pub(crate) enum ScanOutcome {
    /// No complete value yet; `n` bytes were consumed into `scratch`.
    NeedMore,
    /// A complete value's bytes are sitting in `scratch`; caller should
    /// parse and clear it.
    Complete,
}

impl ValueScanner {
    pub(crate) fn new() -> Self {
        ValueScanner::default()
    }

    pub(crate) fn pending_bytes(&self) -> usize {
        self.scratch.len()
    }

    /// Feed one byte. Returns `Complete` when `scratch` now holds exactly
    /// one full top-level JSON value (whitespace around it already
    /// excluded).
    pub(crate) fn push(&mut self, b: u8) -> ScanOutcome {
        if !self.started {
            if b.is_ascii_whitespace() {
                return ScanOutcome::NeedMore;
            }
            self.started = true;
        }

        self.scratch.push(b);

        if self.in_string {
            if self.escape_next {
                self.escape_next = false;
            } else if b == b'\\' {
                self.escape_next = true;
            } else if b == b'"' {
                self.in_string = false;
            }
            return ScanOutcome::NeedMore;
        }

        match b {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => self.depth -= 1,
            _ => {}
        }

        if self.started && self.depth <= 0 && !self.in_string && is_value_complete(&self.scratch) {
            ScanOutcome::Complete
        } else {
            ScanOutcome::NeedMore
        }
    }

    pub(crate) fn take_value(&mut self) -> Vec<u8> {
        self.started = false;
        self.depth = 0;
        std::mem::take(&mut self.scratch)
    }

    pub(crate) fn is_idle(&self) -> bool {
        !self.started && self.scratch.is_empty()
    }

    /// Whether the scanner is currently outside any string and back at
    /// bracket/brace depth zero — used to detect the end of a bare scalar
    /// sibling value, which (unlike `{}`/`[]`) has no closing token of its
    /// own to trigger on.
    pub(crate) fn depth_is_zero_outside_string(&self) -> bool {
        self.depth <= 0 && !self.in_string
    }
}

/// A scalar JSON value (`true`, `42`, `"x"`, ...) is "complete" the instant
/// it's been fully read, but we only know that for certain once we hit a
/// delimiter, whitespace, or bracket/brace after it, or EOF. Since the
/// bracket/brace counter already tracks `{}`/`[]` completion, this helper
/// only needs to special-case a lone scalar at depth 0: that can't be
/// detected mid-stream byte-by-byte, so scalar NDJSON rows are finalized by
/// the caller noticing a newline/EOF instead of by this scan.
fn is_value_complete(scratch: &[u8]) -> bool {
    matches!(scratch.first(), Some(b'{') | Some(b'['))
}

pub struct NdjsonParser {
    config: JsonConfig,
    scanner: ValueScanner,
}

impl NdjsonParser {
    pub fn new(config: JsonConfig) -> Self {
        NdjsonParser {
            config,
            scanner: ValueScanner::new(),
        }
    }

    fn finalize_scalar_if_any(&mut self, emit: &mut Sink) -> ConvertResult<()> {
        if !self.scanner.scratch.is_empty() {
            let bytes = self.scanner.take_value();
            self.emit_value(&bytes, emit)?;
        }
        Ok(())
    }

    fn emit_value(&mut self, bytes: &[u8], emit: &mut Sink) -> ConvertResult<()> {
        let value: Value = serde_json::from_slice(bytes).map_err(|_| ConvertError::Parse {
            line: 0,
            col: 0,
            kind: ParseErrorKind::InvalidJson,
        })?;
        let record = value_to_record(value, self.config.strict_objects)?;
        emit(record)
    }
}

/// Convert one parsed JSON value into a record, per spec §4.2.2: objects map
/// field-for-field; any other shape becomes a single `value` field unless
/// `strictObjects` rejects it.
pub(crate) fn value_to_record(value: Value, strict_objects: bool) -> ConvertResult<Record> {
    match value {
        Value::Object(map) => {
            let mut record = Record::with_capacity(map.len());
            for (k, v) in map {
                record.set(k, Scalar::from_json(&v));
            }
            Ok(record)
        }
        other => {
            if strict_objects {
                Err(ConvertError::Parse {
                    line: 0,
                    col: 0,
                    kind: ParseErrorKind::UnexpectedJsonShape,
                })
            } else {
                let mut record = Record::with_capacity(1);
                record.set("value", Scalar::from_json(&other));
                Ok(record)
            }
        }
    }
}

impl Parser for NdjsonParser {
    fn feed(&mut self, buffer: &mut Vec<u8>, emit: &mut Sink) -> ConvertResult<()> {
        let mut consumed = 0usize;
        for (i, &b) in buffer.iter().enumerate() {
            // A bare scalar (number/bool/null/bare string) at depth 0 is
            // only known to be finished once whitespace follows it.
            if self.scanner.started
                && self.scanner.depth <= 0
                && !self.scanner.in_string
                && !matches!(self.scanner.scratch.first(), Some(b'{') | Some(b'['))
                && b.is_ascii_whitespace()
            {
                let bytes = self.scanner.take_value();
                if let Err(e) = self.emit_value(&bytes, emit) {
                    consumed = i;
                    buffer.drain(..consumed);
                    return Err(e);
                }
                consumed = i + 1;
                continue;
            }

            match self.scanner.push(b) {
                ScanOutcome::Complete => {
                    let bytes = self.scanner.take_value();
                    if let Err(e) = self.emit_value(&bytes, emit) {
                        consumed = i + 1;
                        buffer.drain(..consumed);
                        return Err(e);
                    }
                    consumed = i + 1;
                }
                ScanOutcome::NeedMore => {
                    consumed = i + 1;
                }
            }
        }
        buffer.drain(..consumed.min(buffer.len()));
        Ok(())
    }

    fn finish(&mut self, buffer: &mut Vec<u8>, emit: &mut Sink) -> ConvertResult<()> {
        self.feed(buffer, emit)?;
        self.finalize_scalar_if_any(emit)
    }

    fn pending_bytes(&self) -> usize {
        self.scanner.pending_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut NdjsonParser, input: &[u8]) -> Vec<Record> {
        let mut out = Vec::new();
        let mut buf = input.to_vec();
        let mut sink: Box<Sink> = Box::new(|r| {
            out.push(r);
            Ok(())
        });
        parser.feed(&mut buf, &mut sink).unwrap();
        parser.finish(&mut buf, &mut sink).unwrap();
        out
    }

    #[test]
    fn two_objects_one_per_line() {
        let mut parser = NdjsonParser::new(JsonConfig::default());
        let records = collect(
            &mut parser,
            b"{\"name\":\"Ada\",\"age\":36}\n{\"name\":\"Linus\",\"age\":54}\n",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some(&Scalar::String("Ada".into())));
    }

    #[test]
    fn tolerates_blank_lines_and_no_trailing_newline() {
        let mut parser = NdjsonParser::new(JsonConfig::default());
        let records = collect(&mut parser, b"\n{\"a\":1}\n\n{\"a\":2}");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn non_object_becomes_value_field() {
        let mut parser = NdjsonParser::new(JsonConfig::default());
        let records = collect(&mut parser, b"42\n\"hi\"\n");
        assert_eq!(records[0].get("value"), Some(&Scalar::Integer(42)));
        assert_eq!(
            records[1].get("value"),
            Some(&Scalar::String("hi".into()))
        );
    }

    #[test]
    fn strict_objects_rejects_scalars() {
        let mut config = JsonConfig::default();
        config.strict_objects = true;
        let mut parser = NdjsonParser::new(config);
        let mut buf = b"42\n".to_vec();
        let mut out = Vec::new();
        let mut sink: Box<Sink> = Box::new(|r| {
            out.push(r);
            Ok(())
        });
        let err = parser.feed(&mut buf, &mut sink).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Parse {
                kind: ParseErrorKind::UnexpectedJsonShape,
                ..
            }
        ));
    }

    #[test]
    fn chunked_across_pushes_matches_one_shot() {
        let mut parser = NdjsonParser::new(JsonConfig::default());
        let mut out = Vec::new();
        let mut sink: Box<Sink> = Box::new(|r| {
            out.push(r);
            Ok(())
        });
        for chunk in [&b"{\"a\":"[..], b"1}\n{\"a\":2"[..], b"}\n"[..]] {
            let mut buf = chunk.to_vec();
            parser.feed(&mut buf, &mut sink).unwrap();
        }
        assert_eq!(out.len(), 2);
    }
}
