//! NDJSON encoder (spec §4.3): one JSON object per line, `\n`-terminated,
//! no leading or trailing framing.

use crate::encoders::Encoder;
use crate::error::ConvertResult;
use crate::record::Record;

#[derive(Default)]
pub struct NdjsonEncoder;

impl NdjsonEncoder {
    pub fn new() -> Self {
        NdjsonEncoder
    }
}

fn record_to_json(record: &Record) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in record.iter() {
        map.insert(name.clone(), value.to_json());
    }
    serde_json::Value::Object(map)
}

impl Encoder for NdjsonEncoder {
    fn write_record(&mut self, record: &Record, out: &mut Vec<u8>) -> ConvertResult<()> {
        let value = record_to_json(record);
        serde_json::to_writer(&mut *out, &value)
            .map_err(|e| crate::error::ConvertError::EncoderError(e.to_string()))?;
        out.push(b'\n');
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> ConvertResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Scalar;

    #[test]
    fn one_object_per_line() {
        let mut enc = NdjsonEncoder::new();
        let mut out = Vec::new();
        let mut r = Record::new();
        r.set("name", Scalar::String("Ada".into()));
        r.set("age", Scalar::Integer(36));
        enc.write_record(&r, &mut out).unwrap();
        enc.finish(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"name\":\"Ada\",\"age\":36}\n"
        );
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let mut enc = NdjsonEncoder::new();
        let mut out = Vec::new();
        enc.finish(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
