//! Construction options (spec §6), modeled as plain `serde` structs in the
//! style of `estuary-flow`'s `AdvancedCsvConfig`: one struct per concern,
//! `#[serde(rename_all = "camelCase")]` so the wire shape matches the option
//! names spec.md already uses, `Default` everywhere so a host can omit
//! anything it doesn't care about.

use serde::{Deserialize, Serialize};

use crate::transform::TransformSpec;

/// One of the four concrete formats, plus the `auto` request marker. `Auto`
/// is never stored after detection resolves it (spec §3 "Format tag").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Dsv,
    Ndjson,
    Json,
    Xml,
    Auto,
}

impl Format {
    pub fn is_auto(&self) -> bool {
        matches!(self, Format::Auto)
    }
}

/// Policy for a DSV row whose field count disagrees with the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldCountMismatchPolicy {
    Fail,
    PadWithNull,
    Truncate,
}

impl Default for FieldCountMismatchPolicy {
    fn default() -> Self {
        FieldCountMismatchPolicy::Fail
    }
}

/// The newline convention a DSV stream uses. `Auto` means "detect from the
/// first terminator seen" (spec §4.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordTerminator {
    Auto,
    Lf,
    CrLf,
}

impl Default for RecordTerminator {
    fn default() -> Self {
        RecordTerminator::Auto
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsvConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: u8,
    #[serde(default = "default_quote")]
    pub quote: u8,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default)]
    pub trim_whitespace: bool,
    #[serde(default)]
    pub record_terminator: RecordTerminator,
    #[serde(default)]
    pub on_field_count_mismatch: FieldCountMismatchPolicy,
    /// Allow a bare quote inside an unquoted, non-empty field instead of
    /// erroring (spec §4.2.1 "lenient policy").
    #[serde(default)]
    pub lenient_quoting: bool,
    #[serde(default)]
    pub skip_empty_lines: bool,
    /// Placeholder text for a missing field under `pad-with-null`. Defaults
    /// to the empty string.
    #[serde(default)]
    pub missing_field_placeholder: String,
    /// The header the encoder falls back to when the first record's keys
    /// aren't a reliable header on their own (spec §4.3) — including the
    /// zero-record case, where there is otherwise no record to derive a
    /// header from at all.
    #[serde(default)]
    pub declared_header: Option<Vec<String>>,
}

fn default_delimiter() -> u8 {
    b','
}

fn default_quote() -> u8 {
    b'"'
}

fn default_true() -> bool {
    true
}

impl Default for DsvConfig {
    fn default() -> Self {
        DsvConfig {
            delimiter: default_delimiter(),
            quote: default_quote(),
            has_header: true,
            trim_whitespace: false,
            record_terminator: RecordTerminator::default(),
            on_field_count_mismatch: FieldCountMismatchPolicy::default(),
            lenient_quoting: false,
            skip_empty_lines: false,
            missing_field_placeholder: String::new(),
            declared_header: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlConfig {
    /// The element local name whose boundaries delimit one record.
    /// Autodetected (spec §4.5) when absent.
    #[serde(default)]
    pub record_element: Option<String>,
    #[serde(default)]
    pub include_attributes: bool,
    #[serde(default = "default_true")]
    pub trim_text: bool,
    #[serde(default = "default_text_field")]
    pub text_field: String,
    #[serde(default = "default_wrapper_element")]
    pub wrapper_element: String,
}

fn default_text_field() -> String {
    "#text".to_string()
}

fn default_wrapper_element() -> String {
    "records".to_string()
}

impl Default for XmlConfig {
    fn default() -> Self {
        XmlConfig {
            record_element: None,
            include_attributes: false,
            trim_text: true,
            text_field: default_text_field(),
            wrapper_element: default_wrapper_element(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonConfig {
    /// A dotted path into a top-level object locating the array of records,
    /// for inputs shaped like `{"data": {"rows": [...]}}`.
    #[serde(default)]
    pub record_path: Option<String>,
    /// Reject non-object top-level NDJSON/JSON-array values instead of
    /// wrapping them in a single `value` field (spec §4.2.2).
    #[serde(default)]
    pub strict_objects: bool,
}

/// Aggregate construction options for one kernel instance (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelOptions {
    pub input_format: Format,
    pub output_format: Format,
    #[serde(default)]
    pub dsv_config: DsvConfig,
    #[serde(default)]
    pub xml_config: XmlConfig,
    #[serde(default)]
    pub json_config: JsonConfig,
    #[serde(default)]
    pub transform: Option<TransformSpec>,
    #[serde(default = "default_chunk_target_bytes")]
    pub chunk_target_bytes: usize,
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: usize,
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
    #[serde(default)]
    pub progress_interval_bytes: u64,
    #[serde(default)]
    pub profile: bool,
    #[serde(default)]
    pub debug: bool,
    /// Bound on how much of the input detection will buffer before falling
    /// back to a default (spec §4.5, §9 "Auto format"). Not part of the
    /// host-facing wire contract's required fields, defaults to 256 KiB.
    #[serde(default = "default_detection_max_bytes")]
    pub detection_max_bytes: usize,
}

fn default_chunk_target_bytes() -> usize {
    1024 * 1024
}

fn default_max_memory_mb() -> usize {
    512
}

fn default_max_buffer_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_detection_max_bytes() -> usize {
    256 * 1024
}

impl Default for KernelOptions {
    fn default() -> Self {
        KernelOptions {
            input_format: Format::Auto,
            output_format: Format::Ndjson,
            dsv_config: DsvConfig::default(),
            xml_config: XmlConfig::default(),
            json_config: JsonConfig::default(),
            transform: None,
            chunk_target_bytes: default_chunk_target_bytes(),
            max_memory_mb: default_max_memory_mb(),
            max_buffer_bytes: default_max_buffer_bytes(),
            progress_interval_bytes: 0,
            profile: false,
            debug: false,
            detection_max_bytes: default_detection_max_bytes(),
        }
    }
}

impl KernelOptions {
    pub fn validate(&self) -> Result<(), crate::error::ConvertError> {
        if self.output_format.is_auto() {
            return Err(crate::error::ConvertError::InvalidOption(
                "outputFormat cannot be auto".to_string(),
            ));
        }
        if self.max_buffer_bytes == 0 {
            return Err(crate::error::ConvertError::InvalidOption(
                "maxBufferBytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
