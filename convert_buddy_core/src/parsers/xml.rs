//! Record-oriented XML parser (spec §4.2.4).
//!
//! A pull tokenizer over a byte stream recognizing element open/close,
//! attributes, text, CDATA, comments and processing instructions, fused
//! with the record-building state machine directly (the same "one state
//! machine, no intermediate event buffer" shape `dsv.rs` uses). Partial
//! tags, attribute values and text nodes that straddle a `feed` boundary
//! live in `self` (`tag_name`, `attr_name`, `attr_value`, the open frame
//! stack's `text` buffers) rather than in the caller's buffer, which is
//! what makes this re-entrant.
//!
//! Well-formedness (matching close tags, terminated tags, valid entity
//! references) is enforced for the whole document; external DTDs are never
//! fetched (fixed hard policy, spec §4.2.4) and `<!DOCTYPE ...>` /
//! processing instructions are skipped rather than interpreted.

use crate::config::XmlConfig;
use crate::error::{ConvertError, ConvertResult, ParseErrorKind};
use crate::parsers::{Parser, Sink};
use crate::record::{Record, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    AfterLt,
    BangStart,
    CommentBody,
    CDataBody,
    BangOtherBody,
    PiBody,
    TagName { closing: bool },
    AfterTagName { closing: bool },
    AttrName,
    AfterAttrName,
    AfterAttrEq,
    AttrValue { quote: u8 },
    AfterSlash,
}

#[derive(Clone, Copy)]
enum Dest {
    Text,
    AttrValue,
}

/// One element currently open, whole-document scope (needed for
/// well-formedness checking even outside an active record). Only
/// `path`/`text`/`has_child` are meaningful while a record is being built.
struct Frame {
    name: String,
    path: String,
    text: Vec<u8>,
    has_child: bool,
}

pub struct XmlParser {
    config: XmlConfig,
    /// Resolved once: either the configured name, or the winner of the
    /// autodetection scan (spec §9 "XML record autodetection"). `None`
    /// until a first full scan over the buffered prefix resolves it.
    record_element: Option<String>,
    /// Raw bytes buffered while `record_element` is still unresolved, so
    /// detection can be replayed through the real tokenizer once decided.
    detect_buffer: Vec<u8>,
    detect_cap: usize,

    state: State,
    tag_name: Vec<u8>,
    attr_name: Vec<u8>,
    attr_value: Vec<u8>,
    pending_attrs: Vec<(String, String)>,
    in_entity: bool,
    entity_buf: Vec<u8>,
    comment_buf: Vec<u8>,

    stack: Vec<Frame>,
    current_record: Option<Record>,
    record_root_depth: usize,

    line: usize,
}

const MAX_ENTITY_LEN: usize = 32;

impl XmlParser {
    pub fn new(config: XmlConfig) -> Self {
        Self::with_detection_cap(config, 256 * 1024)
    }

    pub fn with_detection_cap(config: XmlConfig, detect_cap: usize) -> Self {
        let record_element = config.record_element.clone();
        XmlParser {
            config,
            record_element,
            detect_buffer: Vec::new(),
            detect_cap,
            state: State::Text,
            tag_name: Vec::new(),
            attr_name: Vec::new(),
            attr_value: Vec::new(),
            pending_attrs: Vec::new(),
            in_entity: false,
            entity_buf: Vec::new(),
            comment_buf: Vec::new(),
            stack: Vec::new(),
            current_record: None,
            record_root_depth: 0,
            line: 1,
        }
    }

    /// The record element name this parser resolved to, once known.
    pub fn resolved_record_element(&self) -> Option<&str> {
        self.record_element.as_deref()
    }

    fn malformed(&self) -> ConvertError {
        ConvertError::Parse {
            line: self.line,
            col: 0,
            kind: ParseErrorKind::MalformedXml,
        }
    }

    fn invalid_entity(&self) -> ConvertError {
        ConvertError::Parse {
            line: self.line,
            col: 0,
            kind: ParseErrorKind::InvalidEntity,
        }
    }

    // -- entity decoding --------------------------------------------------

    fn decode_entity(name: &[u8]) -> Option<Vec<u8>> {
        match name {
            b"amp" => Some(b"&".to_vec()),
            b"lt" => Some(b"<".to_vec()),
            b"gt" => Some(b">".to_vec()),
            b"quot" => Some(b"\"".to_vec()),
            b"apos" => Some(b"'".to_vec()),
            _ if name.len() > 1 && name[0] == b'#' => {
                let (digits, radix) = if name.len() > 2 && (name[1] == b'x' || name[1] == b'X') {
                    (&name[2..], 16)
                } else {
                    (&name[1..], 10)
                };
                let text = std::str::from_utf8(digits).ok()?;
                let cp = u32::from_str_radix(text, radix).ok()?;
                let ch = char::from_u32(cp)?;
                let mut buf = [0u8; 4];
                Some(ch.encode_utf8(&mut buf).as_bytes().to_vec())
            }
            _ => None,
        }
    }

    /// Push one content byte, routing through the streaming entity
    /// decoder, into whichever buffer (`dest`) is currently active — a
    /// text frame or an attribute value.
    fn push_content_byte(&mut self, b: u8, dest: Dest) -> ConvertResult<()> {
        if self.in_entity {
            if b == b';' {
                let name = std::mem::take(&mut self.entity_buf);
                let decoded = Self::decode_entity(&name).ok_or_else(|| self.invalid_entity())?;
                self.in_entity = false;
                self.append_to(dest, &decoded);
            } else {
                if self.entity_buf.len() >= MAX_ENTITY_LEN {
                    return Err(self.invalid_entity());
                }
                self.entity_buf.push(b);
            }
            return Ok(());
        }
        if b == b'&' {
            self.in_entity = true;
            self.entity_buf.clear();
        } else {
            self.append_to(dest, &[b]);
        }
        Ok(())
    }

    fn append_to(&mut self, dest: Dest, bytes: &[u8]) {
        match dest {
            Dest::Text => {
                if let Some(frame) = self.stack.last_mut() {
                    frame.text.extend_from_slice(bytes);
                }
            }
            Dest::AttrValue => self.attr_value.extend_from_slice(bytes),
        }
    }

    // -- frame / record building ------------------------------------------

    fn record_active(&self) -> bool {
        self.current_record.is_some()
    }

    fn child_path(parent_path: &str, name: &str) -> String {
        if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{parent_path}.{name}")
        }
    }

    fn add_or_accumulate(record: &mut Record, path: &str, value: Scalar) {
        match record.get(path).cloned() {
            Some(Scalar::List(mut items)) => {
                items.push(value);
                record.set(path, Scalar::List(items));
            }
            Some(existing) => {
                record.set(path, Scalar::List(vec![existing, value]));
            }
            None => record.set(path, value),
        }
    }

    fn open_tag(&mut self, name: String, attrs: Vec<(String, String)>) -> ConvertResult<()> {
        let is_record_root =
            !self.record_active() && self.record_element.as_deref() == Some(name.as_str());

        let parent_path = if is_record_root {
            None
        } else if self.record_active() {
            if let Some(parent) = self.stack.last_mut() {
                parent.has_child = true;
                Some(parent.path.clone())
            } else {
                None
            }
        } else {
            None
        };

        if is_record_root {
            self.current_record = Some(Record::new());
            self.record_root_depth = self.stack.len();
        }

        let path = if is_record_root {
            String::new()
        } else if let Some(parent_path) = &parent_path {
            Self::child_path(parent_path, &name)
        } else {
            String::new()
        };

        if self.record_active() && self.config.include_attributes {
            if let Some(record) = self.current_record.as_mut() {
                for (attr_name, attr_value) in &attrs {
                    let field = if path.is_empty() {
                        format!("@{attr_name}")
                    } else {
                        format!("{path}.@{attr_name}")
                    };
                    Self::add_or_accumulate(record, &field, Scalar::String(attr_value.clone()));
                }
            }
        }

        self.stack.push(Frame {
            name,
            path,
            text: Vec::new(),
            has_child: false,
        });
        Ok(())
    }

    fn close_tag(&mut self, name: &str, emit: &mut Sink) -> ConvertResult<()> {
        let Some(frame) = self.stack.pop() else {
            return Err(self.malformed());
        };
        if frame.name != name {
            return Err(self.malformed());
        }

        if !self.record_active() {
            return Ok(());
        }

        let text_trimmed = self.finalize_text(&frame.text);
        let is_record_root = self.stack.len() == self.record_root_depth;

        if is_record_root {
            let mut record = self.current_record.take().unwrap_or_default();
            if !frame.has_child {
                if let Some(text) = text_trimmed {
                    record.set(self.config.text_field.clone(), Scalar::String(text));
                }
            }
            return emit(record);
        }

        let record = self
            .current_record
            .as_mut()
            .expect("current_record is Some while inside an active record");
        if frame.has_child {
            if let Some(text) = text_trimmed {
                let field = format!("{}.{}", frame.path, self.config.text_field);
                Self::add_or_accumulate(record, &field, Scalar::String(text));
            }
        } else {
            let value = text_trimmed.unwrap_or_default();
            Self::add_or_accumulate(record, &frame.path, Scalar::String(value));
        }
        Ok(())
    }

    fn finalize_text(&self, raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw).into_owned();
        if self.config.trim_text {
            let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if collapsed.is_empty() {
                None
            } else {
                Some(collapsed)
            }
        } else if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    // -- byte-level tokenizer ---------------------------------------------

    fn process_byte(&mut self, b: u8, emit: &mut Sink) -> ConvertResult<()> {
        if b == b'\n' {
            self.line += 1;
        }
        match self.state {
            State::Text => {
                if b == b'<' {
                    self.state = State::AfterLt;
                } else {
                    self.push_content_byte(b, Dest::Text)?;
                }
            }
            State::AfterLt => match b {
                b'/' => {
                    self.tag_name.clear();
                    self.state = State::TagName { closing: true };
                }
                b'!' => self.state = State::BangStart,
                b'?' => {
                    self.comment_buf.clear();
                    self.state = State::PiBody;
                }
                _ => {
                    self.tag_name.clear();
                    self.tag_name.push(b);
                    self.state = State::TagName { closing: false };
                }
            },
            State::BangStart => {
                self.comment_buf.clear();
                self.comment_buf.push(b);
                if b == b'-' {
                    self.state = State::CommentBody;
                } else if b == b'[' {
                    self.state = State::CDataBody;
                } else {
                    self.state = State::BangOtherBody;
                }
            }
            State::CommentBody => {
                self.comment_buf.push(b);
                if self.comment_buf.ends_with(b"-->") {
                    self.state = State::Text;
                }
            }
            State::CDataBody => {
                self.comment_buf.push(b);
                if self.comment_buf.ends_with(b"]]>") {
                    let content_end = self.comment_buf.len() - 3;
                    // comment_buf so far is "[CDATA[" + content + "]]>";
                    // skip the 7-byte "[CDATA[" prefix.
                    let content = if content_end > 7 {
                        self.comment_buf[7..content_end].to_vec()
                    } else {
                        Vec::new()
                    };
                    if let Some(frame) = self.stack.last_mut() {
                        frame.text.extend_from_slice(&content);
                    }
                    self.state = State::Text;
                }
            }
            State::BangOtherBody => {
                self.comment_buf.push(b);
                if b == b'>' {
                    self.state = State::Text;
                }
            }
            State::PiBody => {
                self.comment_buf.push(b);
                if self.comment_buf.ends_with(b"?>") {
                    self.state = State::Text;
                }
            }
            State::TagName { closing } => {
                if b.is_ascii_whitespace() || b == b'/' || b == b'>' {
                    if closing {
                        if b == b'>' {
                            let name = self.take_tag_name()?;
                            self.close_tag(&name, emit)?;
                            self.state = State::Text;
                        } else {
                            self.state = State::AfterTagName { closing: true };
                        }
                    } else {
                        self.pending_attrs.clear();
                        match b {
                            b'>' => {
                                let name = self.take_tag_name()?;
                                let attrs = std::mem::take(&mut self.pending_attrs);
                                self.open_tag(name, attrs)?;
                                self.state = State::Text;
                            }
                            b'/' => self.state = State::AfterSlash,
                            _ => self.state = State::AfterTagName { closing: false },
                        }
                    }
                } else {
                    self.tag_name.push(b);
                }
            }
            State::AfterTagName { closing } => {
                if b.is_ascii_whitespace() {
                    // stay
                } else if b == b'>' {
                    if closing {
                        let name = self.take_tag_name()?;
                        self.close_tag(&name, emit)?;
                    } else {
                        let name = self.take_tag_name()?;
                        let attrs = std::mem::take(&mut self.pending_attrs);
                        self.open_tag(name, attrs)?;
                    }
                    self.state = State::Text;
                } else if b == b'/' && !closing {
                    self.state = State::AfterSlash;
                } else if !closing {
                    self.attr_name.clear();
                    self.attr_name.push(b);
                    self.state = State::AttrName;
                } else {
                    return Err(self.malformed());
                }
            }
            State::AttrName => {
                if b == b'=' {
                    self.state = State::AfterAttrEq;
                } else if b.is_ascii_whitespace() {
                    self.state = State::AfterAttrName;
                } else {
                    self.attr_name.push(b);
                }
            }
            State::AfterAttrName => {
                if b == b'=' {
                    self.state = State::AfterAttrEq;
                } else if b.is_ascii_whitespace() {
                    // stay
                } else {
                    return Err(self.malformed());
                }
            }
            State::AfterAttrEq => {
                if b.is_ascii_whitespace() {
                    // stay
                } else if b == b'"' || b == b'\'' {
                    self.attr_value.clear();
                    self.state = State::AttrValue { quote: b };
                } else {
                    return Err(self.malformed());
                }
            }
            State::AttrValue { quote } => {
                if !self.in_entity && b == quote {
                    let name = std::mem::take(&mut self.attr_name);
                    let name = String::from_utf8(name).map_err(|e| ConvertError::InvalidUtf8 {
                        offset: e.utf8_error().valid_up_to(),
                    })?;
                    let value = std::mem::take(&mut self.attr_value);
                    let value =
                        String::from_utf8(value).map_err(|e| ConvertError::InvalidUtf8 {
                            offset: e.utf8_error().valid_up_to(),
                        })?;
                    self.pending_attrs.push((name, value));
                    self.state = State::AfterTagName { closing: false };
                } else {
                    self.push_content_byte(b, Dest::AttrValue)?;
                }
            }
            State::AfterSlash => {
                if b == b'>' {
                    let name = self.take_tag_name()?;
                    let attrs = std::mem::take(&mut self.pending_attrs);
                    self.open_tag(name.clone(), attrs)?;
                    self.close_tag(&name, emit)?;
                    self.state = State::Text;
                } else {
                    return Err(self.malformed());
                }
            }
        }
        Ok(())
    }

    fn take_tag_name(&mut self) -> ConvertResult<String> {
        let bytes = std::mem::take(&mut self.tag_name);
        String::from_utf8(bytes).map_err(|e| ConvertError::InvalidUtf8 {
            offset: e.utf8_error().valid_up_to(),
        })
    }

    fn at_clean_boundary(&self) -> bool {
        self.state == State::Text && self.stack.is_empty() && !self.in_entity
    }

    // -- record-element autodetection -------------------------------------

    /// Run the whole-prefix scan that decides `record_element` when it was
    /// not configured: the earliest-seen element whose siblings under the
    /// same parent repeat at least twice (spec §9, DESIGN NOTES).
    fn try_resolve_record_element(&mut self) -> bool {
        if self.record_element.is_some() {
            return true;
        }
        if let Some(name) = detect_record_element(&self.detect_buffer) {
            self.record_element = Some(name);
            true
        } else {
            false
        }
    }
}

/// One-shot heuristic scan over a bounded, fully-buffered prefix (detection
/// is explicitly allowed to do more work than the per-byte streaming parse
/// path, spec §4.5). Tracks, for each `(parent_path, child_name)` pair, the
/// order it was first seen and how many times it recurs; returns the
/// earliest pair seen at least twice.
pub(crate) fn detect_record_element(prefix: &[u8]) -> Option<String> {
    use std::collections::HashMap;

    let mut stack: Vec<String> = Vec::new();
    let mut counts: HashMap<(String, String), usize> = HashMap::new();
    let mut first_seen: Vec<(String, String)> = Vec::new();
    let mut i = 0usize;
    let n = prefix.len();

    while i < n {
        if prefix[i] != b'<' {
            i += 1;
            continue;
        }
        if prefix[i..].starts_with(b"<!--") {
            if let Some(end) = find_from(prefix, i + 4, b"-->") {
                i = end + 3;
            } else {
                break;
            }
            continue;
        }
        if prefix[i..].starts_with(b"<![CDATA[") {
            if let Some(end) = find_from(prefix, i + 9, b"]]>") {
                i = end + 3;
            } else {
                break;
            }
            continue;
        }
        if prefix[i..].starts_with(b"<?") {
            if let Some(end) = find_from(prefix, i + 2, b"?>") {
                i = end + 2;
            } else {
                break;
            }
            continue;
        }
        if prefix.get(i + 1) == Some(&b'!') {
            if let Some(end) = find_byte_from(prefix, i + 2, b'>') {
                i = end + 1;
            } else {
                break;
            }
            continue;
        }
        let closing = prefix.get(i + 1) == Some(&b'/');
        let name_start = if closing { i + 2 } else { i + 1 };
        let mut j = name_start;
        while j < n && !prefix[j].is_ascii_whitespace() && prefix[j] != b'>' && prefix[j] != b'/' {
            j += 1;
        }
        let name = String::from_utf8_lossy(&prefix[name_start..j]).into_owned();
        if name.is_empty() {
            i += 1;
            continue;
        }

        let Some(tag_end) = find_byte_from(prefix, j, b'>') else {
            break;
        };
        let self_closing = tag_end > 0 && prefix[tag_end - 1] == b'/';

        if closing {
            if stack.last() == Some(&name) {
                stack.pop();
            }
        } else {
            let parent = stack.last().cloned().unwrap_or_default();
            let key = (parent, name.clone());
            let count = counts.entry(key.clone()).or_insert(0);
            if *count == 0 {
                first_seen.push(key);
            }
            *count += 1;
            if !self_closing {
                stack.push(name);
            }
        }
        i = tag_end + 1;
    }

    first_seen
        .into_iter()
        .find(|key| counts.get(key).copied().unwrap_or(0) >= 2)
        .map(|(_, name)| name)
}

fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn find_byte_from(haystack: &[u8], from: usize, needle: u8) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..].iter().position(|&b| b == needle).map(|p| p + from)
}

impl Parser for XmlParser {
    fn feed(&mut self, buffer: &mut Vec<u8>, emit: &mut Sink) -> ConvertResult<()> {
        if self.record_element.is_none() {
            let room = self.detect_cap.saturating_sub(self.detect_buffer.len());
            let take = room.min(buffer.len());
            self.detect_buffer.extend_from_slice(&buffer[..take]);
            let reached_cap = self.detect_buffer.len() >= self.detect_cap;
            if !self.try_resolve_record_element() {
                if reached_cap {
                    // Nothing repeats twice within the cap; fall back to
                    // the first element opened, matching decision rule 4's
                    // "otherwise" fallthrough resolved at the cap.
                    let fallback = first_open_tag(&self.detect_buffer);
                    self.record_element = fallback.or_else(|| Some("record".to_string()));
                } else {
                    // Still collecting; leave the rest of `buffer` for a
                    // future call by not consuming it yet.
                    buffer.drain(..take);
                    return Ok(());
                }
            }
            // Resolved: replay everything buffered so far through the real
            // tokenizer, then fall through to process whatever remains of
            // `buffer` normally.
            let replay = std::mem::take(&mut self.detect_buffer);
            buffer.drain(..take);
            for b in replay {
                self.process_byte(b, emit)?;
            }
        }

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
        if self.record_element.is_none() {
            self.detect_buffer.extend_from_slice(buffer);
            buffer.clear();
            if !self.try_resolve_record_element() {
                let fallback = first_open_tag(&self.detect_buffer);
                self.record_element = fallback.or_else(|| Some("record".to_string()));
            }
            let replay = std::mem::take(&mut self.detect_buffer);
            for b in replay {
                self.process_byte(b, emit)?;
            }
        } else {
            self.feed(buffer, emit)?;
        }

        if !self.at_clean_boundary() {
            return Err(ConvertError::UnexpectedEof);
        }
        Ok(())
    }

    fn pending_bytes(&self) -> usize {
        self.detect_buffer.len()
            + self.tag_name.len()
            + self.attr_name.len()
            + self.attr_value.len()
            + self
                .stack
                .iter()
                .map(|f| f.text.len() + f.name.len())
                .sum::<usize>()
    }
}

pub(crate) fn first_open_tag(prefix: &[u8]) -> Option<String> {
    let mut i = 0usize;
    let n = prefix.len();
    while i < n {
        if prefix[i] != b'<' {
            i += 1;
            continue;
        }
        let next = prefix.get(i + 1).copied();
        if next == Some(b'/') || next == Some(b'!') || next == Some(b'?') {
            i += 1;
            continue;
        }
        let name_start = i + 1;
        let mut j = name_start;
        while j < n && !prefix[j].is_ascii_whitespace() && prefix[j] != b'>' && prefix[j] != b'/' {
            j += 1;
        }
        if j > name_start {
            return Some(String::from_utf8_lossy(&prefix[name_start..j]).into_owned());
        }
        i = j.max(i + 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut XmlParser, input: &[u8]) -> Vec<Record> {
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
    fn basic_two_records_with_configured_element() {
        let mut config = XmlConfig::default();
        config.record_element = Some("row".to_string());
        let mut parser = XmlParser::new(config);
        let records = collect(
            &mut parser,
            b"<rows><row><name>Ada</name><age>36</age></row><row><name>Linus</name><age>54</age></row></rows>",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some(&Scalar::String("Ada".into())));
        assert_eq!(records[1].get("age"), Some(&Scalar::String("54".into())));
    }

    #[test]
    fn autodetects_the_repeating_sibling_element() {
        let mut parser = XmlParser::new(XmlConfig::default());
        let records = collect(
            &mut parser,
            b"<rows><row><name>Ada</name></row><row><name>Linus</name></row></rows>",
        );
        assert_eq!(parser.resolved_record_element(), Some("row"));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn attributes_become_at_prefixed_fields_when_enabled() {
        let mut config = XmlConfig::default();
        config.record_element = Some("row".to_string());
        config.include_attributes = true;
        let mut parser = XmlParser::new(config);
        let records = collect(&mut parser, br#"<rows><row id="1"><name>Ada</name></row></rows>"#);
        assert_eq!(
            records[0].get("@id"),
            Some(&Scalar::String("1".to_string()))
        );
    }

    #[test]
    fn repeated_child_elements_accumulate_into_a_list() {
        let mut config = XmlConfig::default();
        config.record_element = Some("row".to_string());
        let mut parser = XmlParser::new(config);
        let records = collect(
            &mut parser,
            b"<rows><row><tag>a</tag><tag>b</tag></row></rows>",
        );
        assert_eq!(
            records[0].get("tag"),
            Some(&Scalar::List(vec![
                Scalar::String("a".into()),
                Scalar::String("b".into())
            ]))
        );
    }

    #[test]
    fn nested_elements_become_dotted_fields() {
        let mut config = XmlConfig::default();
        config.record_element = Some("row".to_string());
        let mut parser = XmlParser::new(config);
        let records = collect(
            &mut parser,
            b"<rows><row><address><city>Cork</city></address></row></rows>",
        );
        assert_eq!(
            records[0].get("address.city"),
            Some(&Scalar::String("Cork".into()))
        );
    }

    #[test]
    fn predefined_and_numeric_entities_decode() {
        let mut config = XmlConfig::default();
        config.record_element = Some("row".to_string());
        let mut parser = XmlParser::new(config);
        let records = collect(
            &mut parser,
            b"<rows><row><name>Ben &amp; Co &#65;</name></row></rows>",
        );
        assert_eq!(
            records[0].get("name"),
            Some(&Scalar::String("Ben & Co A".into()))
        );
    }

    #[test]
    fn chunked_feed_matches_one_shot() {
        let mut config = XmlConfig::default();
        config.record_element = Some("row".to_string());
        let mut parser = XmlParser::new(config);
        let mut out = Vec::new();
        let mut sink: Box<Sink> = Box::new(|r| {
            out.push(r);
            Ok(())
        });
        for chunk in [
            &b"<rows><row><na"[..],
            b"me>Ada</name></row><row><name>Lin",
            b"us</name></row></rows>",
        ] {
            let mut buf = chunk.to_vec();
            parser.feed(&mut buf, &mut sink).unwrap();
        }
        let mut buf = Vec::new();
        parser.finish(&mut buf, &mut sink).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].get("name"), Some(&Scalar::String("Linus".into())));
    }

    #[test]
    fn mismatched_close_tag_errors() {
        let mut config = XmlConfig::default();
        config.record_element = Some("row".to_string());
        let mut parser = XmlParser::new(config);
        let mut buf = b"<rows><row><name>Ada</wrong></row></rows>".to_vec();
        let mut out = Vec::new();
        let mut sink: Box<Sink> = Box::new(|r| {
            out.push(r);
            Ok(())
        });
        let err = parser.feed(&mut buf, &mut sink).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Parse {
                kind: ParseErrorKind::MalformedXml,
                ..
            }
        ));
    }

    #[test]
    fn unterminated_tag_at_eof_errors() {
        let mut config = XmlConfig::default();
        config.record_element = Some("row".to_string());
        let mut parser = XmlParser::new(config);
        let mut buf = b"<rows><row><name>Ada</name>".to_vec();
        let mut out = Vec::new();
        let mut sink: Box<Sink> = Box::new(|r| {
            out.push(r);
            Ok(())
        });
        parser.feed(&mut buf, &mut sink).unwrap();
        let err = parser.finish(&mut buf, &mut sink).unwrap_err();
        assert!(matches!(err, ConvertError::UnexpectedEof));
    }
}
