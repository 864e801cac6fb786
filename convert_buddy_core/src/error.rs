//! Tagged error type shared by every surface the kernel exposes.
//!
//! The contract is strictly return-based (see spec §7): nothing in this
//! crate panics or throws across an API boundary on a recoverable failure.
//! Host bindings translate [`ConvertError`] into whatever the target
//! language prefers (a `JsValue` for `wasm-bindgen`, see `src/lib.rs`).

use std::fmt;

/// The kind of malformation a parser observed, attached to [`ConvertError::Parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A quoted DSV field was opened but never closed before EOF.
    UnterminatedQuote,
    /// A bare quote appeared inside an unquoted, non-empty field.
    UnexpectedQuote,
    /// A row had more or fewer fields than the header under a strict policy.
    FieldCountMismatch,
    /// A JSON value could not be parsed at all.
    InvalidJson,
    /// The JSON root was not the shape a parser expected (e.g. not an array).
    UnexpectedJsonShape,
    /// An XML open tag was never closed, or closed with a mismatched name.
    MalformedXml,
    /// An XML entity reference was neither one of the five predefined
    /// entities nor a numeric character reference.
    InvalidEntity,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParseErrorKind::UnterminatedQuote => "unterminated quoted field",
            ParseErrorKind::UnexpectedQuote => "unexpected quote in unquoted field",
            ParseErrorKind::FieldCountMismatch => "field count does not match header",
            ParseErrorKind::InvalidJson => "invalid JSON",
            ParseErrorKind::UnexpectedJsonShape => "unexpected JSON shape",
            ParseErrorKind::MalformedXml => "malformed XML",
            ParseErrorKind::InvalidEntity => "invalid XML entity reference",
        };
        f.write_str(s)
    }
}

/// Every failure the kernel, a parser, an encoder, the transform engine or
/// detection can surface, as one flat enum. Variant names track the tags
/// enumerated in spec §7 one-to-one.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    // -- Configuration --
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),

    // -- Lifecycle --
    #[error("instance has been aborted")]
    Aborted,
    #[error("instance is paused")]
    Paused,
    #[error("instance has already finished")]
    Finished,
    #[error("callback attempted to re-enter the kernel")]
    Reentrancy,

    // -- Input --
    #[error("input is not valid UTF-8 at byte {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("parse error at line {line}, column {col}: {kind}")]
    Parse {
        line: usize,
        col: usize,
        kind: ParseErrorKind,
    },
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("input scratch buffer exceeded its {limit}-byte cap")]
    BufferOverflow { limit: usize },

    // -- Transform --
    #[error("failed to coerce field {field:?} (value {value:?})")]
    CoercionError { field: String, value: String },
    #[error("required field {name:?} is missing")]
    MissingField { name: String },

    // -- Encoder --
    #[error("encoder cannot represent value: {0}")]
    EncoderError(String),
}

impl ConvertError {
    /// A short, stable tag for host bindings that want to `match` on the
    /// kind of failure without depending on the formatted message.
    pub fn tag(&self) -> &'static str {
        match self {
            ConvertError::UnsupportedFormat(_) => "UnsupportedFormat",
            ConvertError::InvalidOption(_) => "InvalidOption",
            ConvertError::Aborted => "Aborted",
            ConvertError::Paused => "Paused",
            ConvertError::Finished => "Finished",
            ConvertError::Reentrancy => "Reentrancy",
            ConvertError::InvalidUtf8 { .. } => "InvalidUtf8",
            ConvertError::Parse { .. } => "ParseError",
            ConvertError::UnexpectedEof => "UnexpectedEof",
            ConvertError::BufferOverflow { .. } => "BufferOverflow",
            ConvertError::CoercionError { .. } => "CoercionError",
            ConvertError::MissingField { .. } => "MissingField",
            ConvertError::EncoderError(_) => "EncoderError",
        }
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;
