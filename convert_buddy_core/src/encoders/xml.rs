//! XML encoder (spec §4.3).
//!
//! Each record's flat, dotted-path fields (the mirror image of what
//! `parsers::xml` flattens on the way in) are re-expanded into a small
//! element tree before serialization: `a.b` becomes nested `<a><b>`,
//! `@attr` becomes an attribute, the configured `textField` becomes mixed
//! text content, and a field holding `Scalar::List` becomes repeated
//! sibling elements. An outer wrapper element is written on the first
//! record and closed on `finish`; escaping is bit-exact per spec (`& < >`
//! in text, plus `" '` in attribute values).

use crate::config::XmlConfig;
use crate::encoders::Encoder;
use crate::error::ConvertResult;
use crate::record::{Record, Scalar};

enum ChildValue {
    Leaf(String),
    Node(Box<ElementNode>),
}

#[derive(Default)]
struct ElementNode {
    attrs: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<(String, ChildValue)>,
}

impl ElementNode {
    fn insert(&mut self, segments: &[&str], value: &Scalar, text_field: &str) {
        if segments.len() == 1 {
            let seg = segments[0];
            if let Some(attr) = seg.strip_prefix('@') {
                self.attrs.push((attr.to_string(), value.as_display()));
            } else if seg == text_field {
                self.text = Some(value.as_display());
            } else if let Scalar::List(items) = value {
                for item in items {
                    self.children
                        .push((seg.to_string(), ChildValue::Leaf(item.as_display())));
                }
            } else {
                self.children
                    .push((seg.to_string(), ChildValue::Leaf(value.as_display())));
            }
            return;
        }

        let head = segments[0];
        let existing = self.children.iter_mut().find_map(|(name, v)| {
            if name == head {
                match v {
                    ChildValue::Node(node) => Some(node.as_mut()),
                    ChildValue::Leaf(_) => None,
                }
            } else {
                None
            }
        });
        if let Some(node) = existing {
            node.insert(&segments[1..], value, text_field);
        } else {
            let mut node = ElementNode::default();
            node.insert(&segments[1..], value, text_field);
            self.children
                .push((head.to_string(), ChildValue::Node(Box::new(node))));
        }
    }
}

fn escape_text(value: &str, out: &mut Vec<u8>) {
    for ch in value.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            other => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn escape_attr(value: &str, out: &mut Vec<u8>) {
    for ch in value.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            '"' => out.extend_from_slice(b"&quot;"),
            '\'' => out.extend_from_slice(b"&apos;"),
            other => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn write_node(name: &str, node: &ElementNode, out: &mut Vec<u8>) {
    out.push(b'<');
    out.extend_from_slice(name.as_bytes());
    for (attr_name, attr_value) in &node.attrs {
        out.push(b' ');
        out.extend_from_slice(attr_name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape_attr(attr_value, out);
        out.push(b'"');
    }

    if node.children.is_empty() && node.text.is_none() {
        out.extend_from_slice(b"/>");
        return;
    }

    out.push(b'>');
    if let Some(text) = &node.text {
        escape_text(text, out);
    }
    for (child_name, child) in &node.children {
        match child {
            ChildValue::Leaf(value) => {
                out.push(b'<');
                out.extend_from_slice(child_name.as_bytes());
                if value.is_empty() {
                    out.extend_from_slice(b"/>");
                } else {
                    out.push(b'>');
                    escape_text(value, out);
                    out.extend_from_slice(b"</");
                    out.extend_from_slice(child_name.as_bytes());
                    out.push(b'>');
                }
            }
            ChildValue::Node(node) => write_node(child_name, node, out),
        }
    }
    out.extend_from_slice(b"</");
    out.extend_from_slice(name.as_bytes());
    out.push(b'>');
}

pub struct XmlEncoder {
    config: XmlConfig,
    record_element: String,
    wrote_any: bool,
}

impl XmlEncoder {
    pub fn new(config: XmlConfig) -> Self {
        let record_element = config
            .record_element
            .clone()
            .unwrap_or_else(|| "record".to_string());
        XmlEncoder {
            config,
            record_element,
            wrote_any: false,
        }
    }
}

impl Encoder for XmlEncoder {
    fn write_record(&mut self, record: &Record, out: &mut Vec<u8>) -> ConvertResult<()> {
        if !self.wrote_any {
            out.push(b'<');
            out.extend_from_slice(self.config.wrapper_element.as_bytes());
            out.push(b'>');
            self.wrote_any = true;
        }

        let mut tree = ElementNode::default();
        for (name, value) in record.iter() {
            let segments: Vec<&str> = name.split('.').collect();
            tree.insert(&segments, value, &self.config.text_field);
        }
        write_node(&self.record_element, &tree, out);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> ConvertResult<()> {
        if !self.wrote_any {
            out.push(b'<');
            out.extend_from_slice(self.config.wrapper_element.as_bytes());
            out.push(b'>');
        }
        out.extend_from_slice(b"</");
        out.extend_from_slice(self.config.wrapper_element.as_bytes());
        out.push(b'>');
        Ok(())
    }
}
