//! DSV (delimiter-separated values) parser (spec §4.2.1).
//!
//! Byte-at-a-time state machine: `FieldStart -> (Unquoted | Quoted) ->
//! AfterQuote -> FieldStart|RecordEnd`. Consumes every byte it is handed so
//! the kernel's scratch buffer always drains to empty after a `feed` call
//! (mirroring the `buffer.drain(..offset)` pattern the teacher crate already
//! used for its own `csv-core`-backed reader); a partially built record
//! lives in `field`/`record` on `self` instead, which is what
//! [`Parser::pending_bytes`] reports for the `maxBufferBytes` accounting.

use crate::config::{DsvConfig, FieldCountMismatchPolicy, RecordTerminator};
use crate::error::{ConvertError, ConvertResult, ParseErrorKind};
use crate::parsers::{Parser, Sink};
use crate::record::{Header, Record, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    AfterQuote,
}

pub struct DsvParser {
    config: DsvConfig,
    state: State,
    field: Vec<u8>,
    record: Vec<Vec<u8>>,
    header: Option<Header>,
    header_pending: bool,
    /// Resolved once we've seen the first terminator, when config asked for
    /// autodetection.
    terminator: Option<Terminator>,
    /// Set when the previous byte was an unquoted/post-quote `\r` whose
    /// terminator-ness depends on the byte that follows.
    pending_cr: bool,
    line: usize,
    col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Lf,
    CrLf,
}

impl DsvParser {
    pub fn new(config: DsvConfig) -> Self {
        let header_pending = config.has_header;
        let terminator = match config.record_terminator {
            RecordTerminator::Lf => Some(Terminator::Lf),
            RecordTerminator::CrLf => Some(Terminator::CrLf),
            RecordTerminator::Auto => None,
        };
        DsvParser {
            config,
            state: State::FieldStart,
            field: Vec::new(),
            record: Vec::new(),
            header: None,
            header_pending,
            terminator,
            pending_cr: false,
            line: 1,
            col: 0,
        }
    }

    fn cr_is_meaningful(&self) -> bool {
        !matches!(self.config.record_terminator, RecordTerminator::Lf)
    }

    fn flush_field(&mut self) {
        let bytes = std::mem::take(&mut self.field);
        self.record.push(bytes);
    }

    fn field_to_string(bytes: Vec<u8>, trim: bool) -> ConvertResult<String> {
        let s = String::from_utf8(bytes).map_err(|e| ConvertError::InvalidUtf8 {
            offset: e.utf8_error().valid_up_to(),
        })?;
        Ok(if trim { s.trim().to_string() } else { s })
    }

    fn end_record(&mut self, emit: &mut Sink) -> ConvertResult<()> {
        let raw_fields = std::mem::take(&mut self.record);

        if self.config.skip_empty_lines
            && raw_fields.len() == 1
            && raw_fields[0].is_empty()
        {
            return Ok(());
        }

        let mut fields = Vec::with_capacity(raw_fields.len());
        for bytes in raw_fields {
            fields.push(Self::field_to_string(bytes, self.config.trim_whitespace)?);
        }

        if self.header_pending {
            let mut header = Header::new();
            for name in &fields {
                header.push(name.clone());
            }
            self.header = Some(header);
            self.header_pending = false;
            return Ok(());
        }

        let header = self
            .header
            .get_or_insert_with(|| Header::synthesized(fields.len()));

        let reconciled = reconcile_row(header, fields, &self.config, self.line)?;
        emit(reconciled)
    }

    /// Handle one byte while the field under construction is unquoted.
    fn handle_unquoted_byte(
        &mut self,
        b: u8,
        emit: &mut Sink,
    ) -> ConvertResult<()> {
        if b == self.config.delimiter {
            self.flush_field();
            self.state = State::FieldStart;
        } else if b == b'\n' && self.terminator != Some(Terminator::CrLf) {
            self.resolve_terminator(Terminator::Lf);
            self.flush_field();
            self.end_record(emit)?;
            self.state = State::FieldStart;
            self.advance_line();
        } else if b == b'\r' && self.cr_is_meaningful() {
            self.pending_cr = true;
        } else if b == self.config.quote && !self.field.is_empty() && !self.config.lenient_quoting {
            return Err(ConvertError::Parse {
                line: self.line,
                col: self.col,
                kind: ParseErrorKind::UnexpectedQuote,
            });
        } else {
            self.field.push(b);
            self.state = State::Unquoted;
        }
        Ok(())
    }

    fn resolve_terminator(&mut self, t: Terminator) {
        if self.terminator.is_none() {
            self.terminator = Some(t);
        }
    }

    fn advance_line(&mut self) {
        self.line += 1;
        self.col = 0;
    }

    fn process_byte(&mut self, b: u8, emit: &mut Sink) -> ConvertResult<()> {
        self.col += 1;

        if self.pending_cr {
            self.pending_cr = false;
            if b == b'\n' {
                self.resolve_terminator(Terminator::CrLf);
                // The field was already flushed when the CR arrived only in
                // the AfterQuote case; in Unquoted we flush now.
                if self.state != State::FieldStart {
                    self.flush_field();
                }
                self.end_record(emit)?;
                self.state = State::FieldStart;
                self.advance_line();
                return Ok(());
            } else {
                // Lone CR: not a terminator. It was part of an unquoted
                // field's literal content; push it back in before handling
                // `b` normally.
                self.field.push(b'\r');
            }
        }

        match self.state {
            State::FieldStart => {
                if b == self.config.quote {
                    self.state = State::Quoted;
                    return Ok(());
                }
                self.handle_unquoted_byte(b, emit)
            }
            State::Unquoted => self.handle_unquoted_byte(b, emit),
            State::Quoted => {
                if b == self.config.quote {
                    self.state = State::AfterQuote;
                } else {
                    self.field.push(b);
                }
                Ok(())
            }
            State::AfterQuote => {
                if b == self.config.quote {
                    self.field.push(b);
                    self.state = State::Quoted;
                } else if b == self.config.delimiter {
                    self.flush_field();
                    self.state = State::FieldStart;
                } else if b == b'\n' {
                    self.resolve_terminator(Terminator::Lf);
                    self.flush_field();
                    self.end_record(emit)?;
                    self.state = State::FieldStart;
                    self.advance_line();
                } else if b == b'\r' && self.cr_is_meaningful() {
                    self.flush_field();
                    self.pending_cr = true;
                    self.state = State::FieldStart;
                } else {
                    return Err(ConvertError::Parse {
                        line: self.line,
                        col: self.col,
                        kind: ParseErrorKind::UnexpectedQuote,
                    });
                }
                Ok(())
            }
        }
    }
}

/// Project parsed `fields` onto `header`, honoring the field-count mismatch
/// policy and extending the header with synthesized names if this is the
/// first data row and no header was configured.
fn reconcile_row(
    header: &mut Header,
    fields: Vec<String>,
    config: &DsvConfig,
    line: usize,
) -> ConvertResult<Record> {
    if fields.len() > header.len() {
        match config.on_field_count_mismatch {
            FieldCountMismatchPolicy::Fail => {
                return Err(ConvertError::Parse {
                    line,
                    col: 0,
                    kind: ParseErrorKind::FieldCountMismatch,
                });
            }
            FieldCountMismatchPolicy::Truncate => {}
            FieldCountMismatchPolicy::PadWithNull => {
                for i in header.len()..fields.len() {
                    header.push(format!("col_{i}"));
                }
            }
        }
    }

    let names = header.names();
    let mut record = Record::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let value = match fields.get(i) {
            Some(v) => Scalar::Raw(v.clone()),
            None => match config.on_field_count_mismatch {
                FieldCountMismatchPolicy::Fail => {
                    return Err(ConvertError::Parse {
                        line,
                        col: 0,
                        kind: ParseErrorKind::FieldCountMismatch,
                    });
                }
                FieldCountMismatchPolicy::Truncate | FieldCountMismatchPolicy::PadWithNull => {
                    if config.missing_field_placeholder.is_empty() {
                        Scalar::Null
                    } else {
                        Scalar::Raw(config.missing_field_placeholder.clone())
                    }
                }
            },
        };
        record.set(name.clone(), value);
    }
    Ok(record)
}

impl Parser for DsvParser {
    fn feed(&mut self, buffer: &mut Vec<u8>, emit: &mut Sink) -> ConvertResult<()> {
        for i in 0..buffer.len() {
            if let Err(e) = self.process_byte(buffer[i], emit) {
                buffer.drain(..=i);
                return Err(e);
            }
        }
        buffer.clear();
        Ok(())
    }

    fn finish(&mut self, buffer: &mut Vec<u8>, emit: &mut Sink) -> ConvertResult<()> {
        self.feed(buffer, emit)?;

        if self.pending_cr {
            // A trailing lone CR with no following byte: literal content.
            self.pending_cr = false;
            self.field.push(b'\r');
        }

        match self.state {
            State::Quoted => {
                return Err(ConvertError::Parse {
                    line: self.line,
                    col: self.col,
                    kind: ParseErrorKind::UnterminatedQuote,
                });
            }
            State::FieldStart if self.field.is_empty() && self.record.is_empty() => {
                // Clean EOF right at a record boundary; nothing pending.
            }
            _ => {
                self.flush_field();
                self.end_record(emit)?;
            }
        }
        Ok(())
    }

    fn pending_bytes(&self) -> usize {
        self.field.len() + self.record.iter().map(Vec::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut DsvParser, input: &[u8]) -> Vec<Record> {
        let mut out = Vec::new();
        let mut buf = input.to_vec();
        {
            let mut sink: Box<Sink> = Box::new(|r| {
                out.push(r);
                Ok(())
            });
            parser.feed(&mut buf, &mut sink).unwrap();
            parser.finish(&mut buf, &mut sink).unwrap();
        }
        out
    }

    #[test]
    fn basic_two_row_csv() {
        let mut parser = DsvParser::new(DsvConfig::default());
        let records = collect(&mut parser, b"name,age\nAda,36\nLinus,54\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some(&Scalar::Raw("Ada".into())));
        assert_eq!(records[0].get("age"), Some(&Scalar::Raw("36".into())));
        assert_eq!(records[1].get("name"), Some(&Scalar::Raw("Linus".into())));
    }

    #[test]
    fn quoted_field_with_embedded_delimiter_and_escaped_quote() {
        let mut parser = DsvParser::new(DsvConfig::default());
        let records = collect(&mut parser, b"a,b\n\"x,y\",\"she said \"\"hi\"\"\"\n");
        assert_eq!(records[0].get("a"), Some(&Scalar::Raw("x,y".into())));
        assert_eq!(
            records[0].get("b"),
            Some(&Scalar::Raw("she said \"hi\"".into()))
        );
    }

    #[test]
    fn crlf_terminator_is_one_boundary() {
        let mut parser = DsvParser::new(DsvConfig::default());
        let records = collect(&mut parser, b"a,b\r\n1,2\r\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("a"), Some(&Scalar::Raw("1".into())));
    }

    #[test]
    fn chunked_feed_matches_one_shot() {
        let mut parser = DsvParser::new(DsvConfig::default());
        let mut out = Vec::new();
        let mut sink: Box<Sink> = Box::new(|r| {
            out.push(r);
            Ok(())
        });
        for chunk in [&b"name,age\n"[..], b"Ada,", b"36\nLinus,54\n"] {
            let mut buf = chunk.to_vec();
            parser.feed(&mut buf, &mut sink).unwrap();
        }
        let mut buf = Vec::new();
        parser.finish(&mut buf, &mut sink).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("age"), Some(&Scalar::Raw("36".into())));
    }

    #[test]
    fn unterminated_quote_errors_at_finish() {
        let mut parser = DsvParser::new(DsvConfig::default());
        let mut buf = b"a,b\n\"unterminated,2".to_vec();
        let mut out = Vec::new();
        let mut sink: Box<Sink> = Box::new(|r| {
            out.push(r);
            Ok(())
        });
        parser.feed(&mut buf, &mut sink).unwrap();
        let err = parser.finish(&mut buf, &mut sink).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Parse {
                kind: ParseErrorKind::UnterminatedQuote,
                ..
            }
        ));
    }

    #[test]
    fn header_only_input_yields_zero_records() {
        let mut parser = DsvParser::new(DsvConfig::default());
        let records = collect(&mut parser, b"a,b,c\n");
        assert!(records.is_empty());
    }

    #[test]
    fn no_header_uses_synthesized_column_names() {
        let mut config = DsvConfig::default();
        config.has_header = false;
        let mut parser = DsvParser::new(config);
        let records = collect(&mut parser, b"1,2,3\n");
        assert_eq!(records[0].get("col_0"), Some(&Scalar::Raw("1".into())));
    }
}
