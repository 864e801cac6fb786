//! Format and structure inference over a bounded prefix (spec §4.5).
//!
//! Deliberately lossy and bounded: both operations here run once, against a
//! caller-supplied sample, never against the kernel's growing scratch
//! buffer. The kernel's own `auto` format resolution (spec §9 "Auto
//! format") reuses [`detect_format`] but buffers and replays the prefix
//! itself rather than calling back into this module mid-stream.

use serde::Serialize;

use crate::config::Format;
use crate::parsers::xml::{detect_record_element, first_open_tag};

const DEFAULT_MAX_BYTES: usize = 256 * 1024;
const DEFAULT_MAX_RECORDS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct DetectionOptions {
    pub max_bytes: usize,
    pub max_records: usize,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        DetectionOptions {
            max_bytes: DEFAULT_MAX_BYTES,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

/// The result of [`detect_format`]. `Unknown` is a sentinel value, not an
/// error (spec §7 "Detection: `DetectionInconclusive`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedFormat {
    Dsv,
    Ndjson,
    Json,
    Xml,
    Unknown,
}

impl DetectedFormat {
    pub fn to_format(self) -> Option<Format> {
        match self {
            DetectedFormat::Dsv => Some(Format::Dsv),
            DetectedFormat::Ndjson => Some(Format::Ndjson),
            DetectedFormat::Json => Some(Format::Json),
            DetectedFormat::Xml => Some(Format::Xml),
            DetectedFormat::Unknown => None,
        }
    }
}

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

fn skip_leading_whitespace(sample: &[u8]) -> usize {
    sample.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(sample.len())
}

/// Rule 1: `<` followed immediately by a tag-name-start character (or a
/// prolog/comment opener that itself leads to one), closed by a `>`
/// somewhere in the sample.
fn looks_like_xml(sample: &[u8]) -> bool {
    let mut i = skip_leading_whitespace(sample);
    // Walk past any number of leading `<?...?>` / `<!--...-->` / `<!...>`
    // prologue constructs to the first real element open.
    loop {
        if i >= sample.len() || sample[i] != b'<' {
            return false;
        }
        if sample[i..].starts_with(b"<?") {
            match sample[i..].windows(2).position(|w| w == b"?>") {
                Some(end) => {
                    i += end + 2;
                    i += skip_leading_whitespace(&sample[i..]);
                    continue;
                }
                None => return false,
            }
        }
        if sample[i..].starts_with(b"<!--") {
            match sample[i..].windows(3).position(|w| w == b"-->") {
                Some(end) => {
                    i += end + 3;
                    i += skip_leading_whitespace(&sample[i..]);
                    continue;
                }
                None => return false,
            }
        }
        if sample.get(i + 1) == Some(&b'!') {
            // `<!DOCTYPE ...>` or similar; skip to the matching `>`.
            match sample[i..].iter().position(|&b| b == b'>') {
                Some(end) => {
                    i += end + 1;
                    i += skip_leading_whitespace(&sample[i..]);
                    continue;
                }
                None => return false,
            }
        }
        break;
    }
    let name_start = i + 1;
    match sample.get(name_start) {
        Some(c) => c.is_ascii_alphabetic() || *c == b'_' || *c == b':',
        None => false,
    }
}

/// Rule 2: first non-space byte `[`, followed (after whitespace) by the
/// start of a value or `]` — a syntactic check, not a full parse, since the
/// sample may be truncated mid-array.
fn looks_like_json_array(sample: &[u8]) -> bool {
    let i = skip_leading_whitespace(sample);
    if sample.get(i) != Some(&b'[') {
        return false;
    }
    let j = i + 1 + skip_leading_whitespace(&sample[i + 1..]);
    match sample.get(j) {
        None => true, // truncated right after `[`; still a plausible opening
        Some(b']' | b'{' | b'[' | b'"' | b't' | b'f' | b'n') => true,
        Some(c) => c.is_ascii_digit() || *c == b'-',
    }
}

fn complete_lines(sample: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = sample.split(|&b| b == b'\n').collect();
    // The trailing element after the last `\n` (or the whole sample if there
    // is no `\n` at all) may be a truncated partial line; drop it.
    if !sample.ends_with(b"\n") {
        lines.pop();
    }
    lines
        .into_iter()
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .filter(|l| !l.is_empty())
        .collect()
}

/// Rule 3: at least two complete lines, each independently parsing as a
/// JSON value whose first non-space byte is `{` or `[`.
fn looks_like_ndjson(sample: &[u8]) -> bool {
    let lines = complete_lines(sample);
    if lines.len() < 2 {
        return false;
    }
    lines.iter().all(|line| {
        let i = skip_leading_whitespace(line);
        matches!(line.get(i), Some(b'{') | Some(b'['))
            && serde_json::from_slice::<serde_json::Value>(line).is_ok()
    })
}

/// Rule 4: try each candidate delimiter, splitting the first few complete
/// lines naively (no quote awareness — sniffing is allowed to be lossy);
/// the winner is whichever delimiter gives the largest column count shared
/// by at least two lines.
fn detect_dsv_delimiter(sample: &[u8]) -> Option<u8> {
    let lines = complete_lines(sample);
    if lines.len() < 2 {
        return None;
    }
    let sample_lines = &lines[..lines.len().min(20)];

    let mut best: Option<(u8, usize)> = None;
    for &delim in &CANDIDATE_DELIMITERS {
        let mut counts: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
        for line in sample_lines {
            let cols = line.iter().filter(|&&b| b == delim).count() + 1;
            *counts.entry(cols).or_insert(0) += 1;
        }
        let Some((&cols, &agreeing)) = counts.iter().max_by_key(|(cols, count)| (**count, **cols))
        else {
            continue;
        };
        if cols < 2 || agreeing < 2 {
            continue;
        }
        if best.map(|(_, best_cols)| cols > best_cols).unwrap_or(true) {
            best = Some((delim, cols));
        }
    }
    best.map(|(delim, _)| delim)
}

/// `detectFormat(sample, opts)` (spec §4.5): decision rules evaluated in
/// order after leading whitespace is skipped.
pub fn detect_format(sample: &[u8], opts: &DetectionOptions) -> DetectedFormat {
    let bound = sample.len().min(opts.max_bytes);
    let sample = &sample[..bound];

    if looks_like_xml(sample) {
        return DetectedFormat::Xml;
    }
    if looks_like_json_array(sample) {
        return DetectedFormat::Json;
    }
    if looks_like_ndjson(sample) {
        return DetectedFormat::Ndjson;
    }
    if detect_dsv_delimiter(sample).is_some() {
        return DetectedFormat::Dsv;
    }
    DetectedFormat::Unknown
}

impl Default for DetectedFormat {
    fn default() -> Self {
        DetectedFormat::Unknown
    }
}

/// The shape `detectStructure` reports back (spec §4.5).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedStructure {
    pub format: DetectedFormat,
    pub fields: Vec<String>,
    pub delimiter: Option<u8>,
    pub record_element: Option<String>,
}

fn split_naive(line: &[u8], delim: u8) -> Vec<String> {
    line.split(|&b| b == delim)
        .map(|f| String::from_utf8_lossy(f).trim().to_string())
        .collect()
}

fn ordered_key_union(values: impl Iterator<Item = serde_json::Value>, max_records: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut fields = Vec::new();
    for value in values.take(max_records) {
        if let serde_json::Value::Object(map) = value {
            for key in map.keys() {
                if seen.insert(key.clone()) {
                    fields.push(key.clone());
                }
            }
        }
    }
    fields
}

/// `detectStructure(sample, formatHint?, opts)` (spec §4.5).
pub fn detect_structure(
    sample: &[u8],
    format_hint: Option<DetectedFormat>,
    opts: &DetectionOptions,
) -> DetectedStructure {
    let bound = sample.len().min(opts.max_bytes);
    let sample = &sample[..bound];
    let format = format_hint.unwrap_or_else(|| detect_format(sample, opts));

    match format {
        DetectedFormat::Dsv => {
            let delimiter = detect_dsv_delimiter(sample);
            let fields = match delimiter {
                Some(delim) => complete_lines(sample)
                    .first()
                    .map(|line| split_naive(line, delim))
                    .unwrap_or_default(),
                None => Vec::new(),
            };
            DetectedStructure {
                format,
                fields,
                delimiter,
                record_element: None,
            }
        }
        DetectedFormat::Ndjson => {
            let values = complete_lines(sample)
                .into_iter()
                .filter_map(|line| serde_json::from_slice::<serde_json::Value>(line).ok());
            DetectedStructure {
                format,
                fields: ordered_key_union(values, opts.max_records),
                delimiter: None,
                record_element: None,
            }
        }
        DetectedFormat::Json => {
            let fields = match serde_json::Deserializer::from_slice(sample)
                .into_iter::<serde_json::Value>()
                .next()
            {
                Some(Ok(serde_json::Value::Array(items))) => {
                    ordered_key_union(items.into_iter(), opts.max_records)
                }
                _ => Vec::new(),
            };
            DetectedStructure {
                format,
                fields,
                delimiter: None,
                record_element: None,
            }
        }
        DetectedFormat::Xml => {
            let record_element =
                detect_record_element(sample).or_else(|| first_open_tag(sample));
            DetectedStructure {
                format,
                fields: Vec::new(),
                delimiter: None,
                record_element,
            }
        }
        DetectedFormat::Unknown => DetectedStructure::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_xml_by_leading_element_open() {
        let sample = b"<rows><row><name>Ada</name></row></rows>";
        assert_eq!(detect_format(sample, &DetectionOptions::default()), DetectedFormat::Xml);
    }

    #[test]
    fn detects_json_array_by_leading_bracket() {
        let sample = br#"[{"a":1},{"a":2}]"#;
        assert_eq!(detect_format(sample, &DetectionOptions::default()), DetectedFormat::Json);
    }

    #[test]
    fn detects_ndjson_by_multiple_independent_lines() {
        let sample = b"{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n";
        assert_eq!(detect_format(sample, &DetectionOptions::default()), DetectedFormat::Ndjson);
    }

    #[test]
    fn detects_dsv_by_consistent_comma_counts() {
        let sample = b"name,age\nAda,36\nLinus,54\n";
        assert_eq!(detect_format(sample, &DetectionOptions::default()), DetectedFormat::Dsv);
    }

    #[test]
    fn detects_dsv_with_semicolon_delimiter() {
        let sample = b"name;age\nAda;36\nLinus;54\n";
        assert_eq!(detect_format(sample, &DetectionOptions::default()), DetectedFormat::Dsv);
    }

    #[test]
    fn unrecognizable_input_is_unknown() {
        let sample = b"just some prose, nothing structured here at all";
        assert_eq!(detect_format(sample, &DetectionOptions::default()), DetectedFormat::Unknown);
    }

    #[test]
    fn structure_detection_reports_dsv_header_and_delimiter() {
        let sample = b"name,age\nAda,36\nLinus,54\n";
        let structure = detect_structure(sample, None, &DetectionOptions::default());
        assert_eq!(structure.delimiter, Some(b','));
        assert_eq!(structure.fields, vec!["name".to_string(), "age".to_string()]);
    }

    #[test]
    fn structure_detection_reports_ndjson_key_union() {
        let sample = b"{\"a\":1}\n{\"a\":2,\"b\":3}\n";
        let structure = detect_structure(sample, None, &DetectionOptions::default());
        assert_eq!(structure.fields, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn structure_detection_reports_xml_record_element() {
        let sample = b"<rows><row><name>Ada</name></row><row><name>Linus</name></row></rows>";
        let structure = detect_structure(sample, None, &DetectionOptions::default());
        assert_eq!(structure.record_element, Some("row".to_string()));
    }
}
