//! One-shot conversion helpers (spec §6 "One-shot conversion").
//!
//! Both functions are thin wrappers around [`Kernel`]: push the whole input
//! in one call, `finish`, concatenate. They exist for callers that already
//! hold the entire input in memory and don't want to manage an incremental
//! instance themselves.

use crate::config::KernelOptions;
use crate::error::ConvertResult;
use crate::kernel::Kernel;

/// Convert `input` in full according to `options`, returning the encoded
/// output bytes.
pub fn convert(input: &[u8], options: KernelOptions) -> ConvertResult<Vec<u8>> {
    let mut kernel = Kernel::new(options)?;
    let mut out = kernel.push(input)?;
    out.extend(kernel.finish()?);
    Ok(out)
}

/// Like [`convert`], but requires the output to be valid UTF-8 (true for
/// every format this crate encodes) and returns it as a `String`.
pub fn convert_to_string(input: &[u8], options: KernelOptions) -> ConvertResult<String> {
    let bytes = convert(input, options)?;
    String::from_utf8(bytes).map_err(|e| crate::error::ConvertError::InvalidUtf8 {
        offset: e.utf8_error().valid_up_to(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DsvConfig, Format, JsonConfig};

    fn options(input: Format, output: Format) -> KernelOptions {
        KernelOptions {
            input_format: input,
            output_format: output,
            dsv_config: DsvConfig::default(),
            xml_config: Default::default(),
            json_config: JsonConfig::default(),
            transform: None,
            chunk_target_bytes: 1024,
            max_memory_mb: 512,
            max_buffer_bytes: 64 * 1024 * 1024,
            progress_interval_bytes: 0,
            profile: false,
            debug: false,
            detection_max_bytes: 256 * 1024,
        }
    }

    #[test]
    fn one_shot_csv_to_json() {
        let out = convert_to_string(b"name,age\nAda,36\n", options(Format::Dsv, Format::Json)).unwrap();
        assert_eq!(out, r#"[{"name":"Ada","age":"36"}]"#);
    }

    #[test]
    fn one_shot_json_to_csv_with_coercion() {
        use crate::transform::{CoerceType, FieldSpec, TransformSpec};

        let mut opts = options(Format::Ndjson, Format::Dsv);
        opts.transform = Some(TransformSpec {
            mode: crate::transform::TransformMode::Augment,
            fields: vec![FieldSpec {
                target_field_name: "v".to_string(),
                origin_field_name: Some("v".to_string()),
                coerce: Some(CoerceType::I64),
                default_value: None,
                compute: None,
            }],
            filter: None,
            on_missing_field: crate::transform::MissingFieldPolicy::Null,
            on_coerce_error: crate::transform::CoerceErrorPolicy::Error,
        });
        let out = convert_to_string(b"{\"v\":\"42\"}\n", opts).unwrap();
        assert_eq!(out, "v\n42\n");
    }
}
