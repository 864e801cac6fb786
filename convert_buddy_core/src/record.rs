//! The record data model shared by every parser, encoder and the transform
//! engine (spec §3, §9 "Dynamic-value representation").
//!
//! A [`Record`] is an ordered list of `(name, Scalar)` pairs rather than a
//! map: field order is semantically meaningful (it drives header-based
//! encoders) and re-hashing per record would be wasted work when the
//! encoder already knows the header.

use std::fmt;

/// A single scalar value carried by a field. `Raw` is the "not yet decided"
/// variant a parser emits before a transform coerces it; most values coming
/// out of DSV start life as `Raw` or `String`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Floating(f64),
    Boolean(bool),
    Null,
    /// The value exactly as seen in the source text, type not yet decided.
    Raw(String),
    /// An ordered list of scalars. Not one of the base tags in spec §3, but
    /// required by §4.2.4: XML siblings sharing a local name "accumulate
    /// into an ordered list". Keeping it a list-of-`Scalar` (rather than
    /// reaching for an untyped JSON value) keeps the "tagged scalar, not a
    /// free-form map" design the rest of the crate follows (§9 DESIGN
    /// NOTES). JSON/NDJSON round-trip it as a native array; DSV, which has
    /// no place to put a list, joins it with `;` (documented data loss, on
    /// a par with DSV losing type distinctions elsewhere).
    List(Vec<Scalar>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Render as a display string, the form DSV and text-ish encoders want.
    pub fn as_display(&self) -> String {
        match self {
            Scalar::String(s) | Scalar::Raw(s) => s.clone(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Floating(f) => format_float(*f),
            Scalar::Boolean(b) => b.to_string(),
            Scalar::Null => String::new(),
            Scalar::List(items) => items
                .iter()
                .map(Scalar::as_display)
                .collect::<Vec<_>>()
                .join(";"),
        }
    }

    /// Convert to a `serde_json::Value`, used by the JSON/NDJSON encoders
    /// and by the compute expression evaluator.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::String(s) => serde_json::Value::String(s.clone()),
            Scalar::Raw(s) => serde_json::Value::String(s.clone()),
            Scalar::Integer(i) => serde_json::Value::Number((*i).into()),
            Scalar::Floating(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Scalar::Boolean(b) => serde_json::Value::Bool(*b),
            Scalar::Null => serde_json::Value::Null,
            Scalar::List(items) => {
                serde_json::Value::Array(items.iter().map(Scalar::to_json).collect())
            }
        }
    }

    /// Construct a `Scalar` from a parsed JSON value. Arrays of scalars
    /// become `Scalar::List`; arrays of objects and nested objects (out of
    /// scope for a flat record field) are stringified, matching how the XML
    /// parser already has to fall back for structures deeper than it
    /// models.
    pub fn from_json(value: &serde_json::Value) -> Scalar {
        match value {
            serde_json::Value::String(s) => Scalar::String(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Scalar::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Scalar::Floating(f)
                } else {
                    Scalar::Raw(n.to_string())
                }
            }
            serde_json::Value::Bool(b) => Scalar::Boolean(*b),
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Array(items) => {
                Scalar::List(items.iter().map(Scalar::from_json).collect())
            }
            other => Scalar::Raw(other.to_string()),
        }
    }
}

fn format_float(f: f64) -> String {
    if f == f.trunc() && f.is_finite() && f.abs() < 1e15 {
        format!("{f:.0}")
    } else {
        let mut s = format!("{f}");
        if s == "inf" || s == "-inf" || s == "NaN" {
            s = "0".to_string();
        }
        s
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_display())
    }
}

/// An ordered `(name, value)` pair. Field order is the order of first
/// appearance in the input, or the order a transform declares (spec §3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
}

impl Record {
    pub fn new() -> Self {
        Record { fields: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Record {
            fields: Vec::with_capacity(cap),
        }
    }

    /// Append a field, or overwrite the value in place if the name already
    /// exists (keeping the original position — matters for the "augment"
    /// transform mode overriding a passed-through field).
    pub fn set(&mut self, name: impl Into<String>, value: Scalar) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<Scalar> {
        if let Some(idx) = self.fields.iter().position(|(n, _)| n == name) {
            Some(self.fields.remove(idx).1)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Scalar)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn into_fields(self) -> Vec<(String, Scalar)> {
        self.fields
    }
}

impl FromIterator<(String, Scalar)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.set(name, value);
        }
        record
    }
}

/// An ordered list of field names, with O(1) "have we seen this before"
/// membership tracking for the lazily-discovered NDJSON/JSON/XML case (spec
/// §3 "Header").
#[derive(Debug, Clone, Default)]
pub struct Header {
    names: Vec<String>,
    seen: std::collections::HashSet<String>,
}

impl Header {
    pub fn new() -> Self {
        Header::default()
    }

    pub fn synthesized(count: usize) -> Self {
        let mut header = Header::new();
        for i in 0..count {
            header.push(format!("col_{i}"));
        }
        header
    }

    /// Append `name` if it has not been seen yet. Returns true if it was new.
    pub fn push(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.seen.insert(name.clone()) {
            self.names.push(name);
            true
        } else {
            false
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fold every key of `record` into the header, in first-appearance order.
    pub fn absorb(&mut self, record: &Record) {
        for name in record.field_names() {
            self.push(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_set_overwrites_in_place() {
        let mut r = Record::new();
        r.set("a", Scalar::Integer(1));
        r.set("b", Scalar::Integer(2));
        r.set("a", Scalar::Integer(9));
        let names: Vec<_> = r.field_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(r.get("a"), Some(&Scalar::Integer(9)));
    }

    #[test]
    fn header_absorb_only_adds_novel_keys() {
        let mut h = Header::new();
        let mut r1 = Record::new();
        r1.set("name", Scalar::String("Ada".into()));
        r1.set("age", Scalar::Integer(36));
        h.absorb(&r1);

        let mut r2 = Record::new();
        r2.set("age", Scalar::Integer(54));
        r2.set("country", Scalar::String("IE".into()));
        h.absorb(&r2);

        assert_eq!(h.names(), &["name", "age", "country"]);
    }

    #[test]
    fn scalar_float_formats_without_trailing_zero() {
        assert_eq!(Scalar::Floating(10.0).as_display(), "10");
        assert_eq!(Scalar::Floating(10.5).as_display(), "10.5");
    }
}
