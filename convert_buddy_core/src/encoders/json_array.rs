//! JSON array encoder (spec §4.3): `[` on the first record, `,` between
//! records, `]` on `finish`. Zero records produces `[]`.

use crate::encoders::Encoder;
use crate::error::{ConvertError, ConvertResult};
use crate::record::Record;

#[derive(Default)]
pub struct JsonArrayEncoder {
    wrote_any: bool,
}

impl JsonArrayEncoder {
    pub fn new() -> Self {
        JsonArrayEncoder { wrote_any: false }
    }
}

fn record_to_json(record: &Record) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in record.iter() {
        map.insert(name.clone(), value.to_json());
    }
    serde_json::Value::Object(map)
}

impl Encoder for JsonArrayEncoder {
    fn write_record(&mut self, record: &Record, out: &mut Vec<u8>) -> ConvertResult<()> {
        out.push(if self.wrote_any { b',' } else { b'[' });
        self.wrote_any = true;
        let value = record_to_json(record);
        serde_json::to_writer(&mut *out, &value).map_err(|e| ConvertError::EncoderError(e.to_string()))
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> ConvertResult<()> {
        if !self.wrote_any {
            out.push(b'[');
        }
        out.push(b']');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Scalar;

    #[test]
    fn two_records_join_with_commas() {
        let mut enc = JsonArrayEncoder::new();
        let mut out = Vec::new();
        let mut r1 = Record::new();
        r1.set("n", Scalar::String("A".into()));
        let mut r2 = Record::new();
        r2.set("n", Scalar::String("B".into()));
        enc.write_record(&r1, &mut out).unwrap();
        enc.write_record(&r2, &mut out).unwrap();
        enc.finish(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[{\"n\":\"A\"},{\"n\":\"B\"}]"
        );
    }

    #[test]
    fn zero_records_yields_empty_array() {
        let mut enc = JsonArrayEncoder::new();
        let mut out = Vec::new();
        enc.finish(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[]");
    }
}
