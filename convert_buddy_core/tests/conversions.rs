//! Integration-level conversion scenarios, driving the crate exactly as a
//! host binding would: construct options, run a kernel or the one-shot
//! helpers, inspect the bytes and stats that come back.

use convert_buddy_core::config::{DsvConfig, Format, JsonConfig, KernelOptions, XmlConfig};
use convert_buddy_core::convert::convert_to_string;
use convert_buddy_core::error::ConvertError;
use convert_buddy_core::kernel::Kernel;
use convert_buddy_core::transform::{CoerceType, FieldSpec, MissingFieldPolicy, TransformMode, TransformSpec};

fn options(input: Format, output: Format) -> KernelOptions {
    KernelOptions {
        input_format: input,
        output_format: output,
        dsv_config: DsvConfig::default(),
        xml_config: XmlConfig::default(),
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
fn csv_to_json_basic() {
    let out = convert_to_string(b"name,age\nAda,36\nLinus,54\n", options(Format::Dsv, Format::Json)).unwrap();
    assert_eq!(out, r#"[{"name":"Ada","age":"36"},{"name":"Linus","age":"54"}]"#);
}

#[test]
fn csv_to_ndjson_chunked_matches_one_shot() {
    let mut kernel = Kernel::new(options(Format::Dsv, Format::Ndjson)).unwrap();
    let mut out = Vec::new();
    out.extend(kernel.push(b"name,age\n").unwrap());
    out.extend(kernel.push(b"Ada,").unwrap());
    out.extend(kernel.push(b"36\nLinus,54\n").unwrap());
    out.extend(kernel.finish().unwrap());

    let one_shot = convert_to_string(b"name,age\nAda,36\nLinus,54\n", options(Format::Dsv, Format::Ndjson)).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), one_shot);
    assert_eq!(one_shot, "{\"name\":\"Ada\",\"age\":\"36\"}\n{\"name\":\"Linus\",\"age\":\"54\"}\n");
}

#[test]
fn json_to_csv_with_coercion() {
    let mut opts = options(Format::Json, Format::Dsv);
    opts.transform = Some(TransformSpec {
        mode: TransformMode::Replace,
        fields: vec![
            FieldSpec {
                target_field_name: "n".to_string(),
                origin_field_name: None,
                coerce: None,
                default_value: None,
                compute: None,
            },
            FieldSpec {
                target_field_name: "v".to_string(),
                origin_field_name: None,
                coerce: Some(CoerceType::I64),
                default_value: None,
                compute: None,
            },
        ],
        filter: None,
        on_missing_field: MissingFieldPolicy::Null,
        on_coerce_error: Default::default(),
    });
    let out = convert_to_string(br#"[{"n":"A","v":"10"},{"n":"B","v":"20"}]"#, opts).unwrap();
    assert_eq!(out, "n,v\nA,10\nB,20\n");
}

#[test]
fn transform_compute_derives_a_boolean_field() {
    let mut opts = options(Format::Json, Format::Json);
    opts.transform = Some(TransformSpec {
        mode: TransformMode::Augment,
        fields: vec![FieldSpec {
            target_field_name: "isVeteran".to_string(),
            origin_field_name: Some("level".to_string()),
            coerce: Some(CoerceType::I64),
            default_value: None,
            compute: Some("level >= 15".to_string()),
        }],
        filter: None,
        on_missing_field: MissingFieldPolicy::Null,
        on_coerce_error: Default::default(),
    });
    let out = convert_to_string(br#"[{"level":"20"},{"level":"10"}]"#, opts).unwrap();
    assert_eq!(out, r#"[{"level":"20","isVeteran":true},{"level":"10","isVeteran":false}]"#);
}

#[test]
fn xml_detection_and_convert() {
    let mut opts = options(Format::Xml, Format::Json);
    opts.xml_config.record_element = Some("row".to_string());
    let input = b"<rows><row><name>Ada</name><age>36</age></row><row><name>Linus</name><age>54</age></row></rows>";
    let out = convert_to_string(input, opts).unwrap();
    assert_eq!(out, r#"[{"name":"Ada","age":"36"},{"name":"Linus","age":"54"}]"#);
}

#[test]
fn abort_after_header_and_one_row_is_terminal() {
    let mut kernel = Kernel::new(options(Format::Dsv, Format::Ndjson)).unwrap();
    let header_and_row = "id,name\n1,Ada\n";
    let rest: String = (2..=10).map(|i| format!("{i},Row{i}\n")).collect();

    kernel.push(header_and_row.as_bytes()).unwrap();
    kernel.abort();

    assert!(kernel.is_aborted());
    assert_eq!(kernel.stats().records_processed, 1);
    assert!(matches!(kernel.push(rest.as_bytes()), Err(ConvertError::Aborted)));
    assert!(matches!(kernel.finish(), Err(ConvertError::Aborted)));
}
