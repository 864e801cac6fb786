//! DSV encoder (spec §4.3).
//!
//! The header is fixed by the first record's key order; every later record
//! is projected onto that header — missing fields become the configured
//! placeholder (empty string by default), fields the header doesn't know
//! about are dropped. Quoting is applied only when a value actually
//! contains the delimiter, the quote character, or a newline, matching
//! the "no pretty-printing / minimal escapes by default" rule spec §4.3
//! states for every encoder.

use crate::config::DsvConfig;
use crate::encoders::Encoder;
use crate::error::ConvertResult;
use crate::record::Record;

pub struct DsvEncoder {
    config: DsvConfig,
    header: Option<Vec<String>>,
    wrote_header: bool,
}

impl DsvEncoder {
    pub fn new(config: DsvConfig) -> Self {
        let header = config.declared_header.clone();
        DsvEncoder {
            config,
            header,
            wrote_header: false,
        }
    }

    fn needs_quoting(&self, value: &str) -> bool {
        let delim = self.config.delimiter as char;
        let quote = self.config.quote as char;
        value.contains(delim) || value.contains(quote) || value.contains('\n') || value.contains('\r')
    }

    fn write_field(&self, value: &str, out: &mut Vec<u8>) {
        if self.needs_quoting(value) {
            out.push(self.config.quote);
            for b in value.bytes() {
                if b == self.config.quote {
                    out.push(self.config.quote);
                }
                out.push(b);
            }
            out.push(self.config.quote);
        } else {
            out.extend_from_slice(value.as_bytes());
        }
    }

    fn write_row<'a>(&self, values: impl Iterator<Item = &'a str>, out: &mut Vec<u8>) {
        for (i, value) in values.enumerate() {
            if i > 0 {
                out.push(self.config.delimiter);
            }
            self.write_field(value, out);
        }
        out.push(b'\n');
    }
}

impl Encoder for DsvEncoder {
    fn write_record(&mut self, record: &Record, out: &mut Vec<u8>) -> ConvertResult<()> {
        if self.header.is_none() {
            let header: Vec<String> = record.field_names().map(str::to_string).collect();
            self.header = Some(header);
        }
        let header = self.header.clone().unwrap_or_default();

        if self.config.has_header && !self.wrote_header {
            self.write_row(header.iter().map(String::as_str), out);
            self.wrote_header = true;
        }

        let placeholder = self.config.missing_field_placeholder.clone();
        let values: Vec<String> = header
            .iter()
            .map(|name| match record.get(name) {
                Some(scalar) => scalar.as_display(),
                None => placeholder.clone(),
            })
            .collect();
        self.write_row(values.iter().map(String::as_str), out);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> ConvertResult<()> {
        // Zero records: still emit the header alone if `hasHeader` and a
        // declared header is configured (spec §8 "Empty input" — DSV emits
        // a header iff `hasHeader`). With no declared header and no record
        // ever seen there is no field list to draw one from.
        if self.config.has_header && !self.wrote_header {
            if let Some(header) = self.header.clone() {
                self.write_row(header.iter().map(String::as_str), out);
                self.wrote_header = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Scalar;

    fn record(pairs: &[(&str, &str)]) -> Record {
        let mut r = Record::new();
        for (k, v) in pairs {
            r.set(*k, Scalar::Raw(v.to_string()));
        }
        r
    }

    #[test]
    fn writes_header_then_rows() {
        let mut enc = DsvEncoder::new(DsvConfig::default());
        let mut out = Vec::new();
        enc.write_record(&record(&[("name", "Ada"), ("age", "36")]), &mut out)
            .unwrap();
        enc.write_record(&record(&[("name", "Linus"), ("age", "54")]), &mut out)
            .unwrap();
        enc.finish(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "name,age\nAda,36\nLinus,54\n"
        );
    }

    #[test]
    fn quotes_values_containing_delimiter_or_quote() {
        let mut enc = DsvEncoder::new(DsvConfig::default());
        let mut out = Vec::new();
        enc.write_record(&record(&[("a", "x,y"), ("b", "she said \"hi\"")]), &mut out)
            .unwrap();
        enc.finish(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "a,b\n\"x,y\",\"she said \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn missing_field_uses_placeholder() {
        let mut config = DsvConfig::default();
        config.missing_field_placeholder = "NA".to_string();
        let mut enc = DsvEncoder::new(config);
        let mut out = Vec::new();
        enc.write_record(&record(&[("a", "1"), ("b", "2")]), &mut out)
            .unwrap();
        enc.write_record(&record(&[("a", "3")]), &mut out).unwrap();
        enc.finish(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,b\n1,2\n3,NA\n");
    }

    #[test]
    fn no_header_configured_omits_header_row() {
        let mut config = DsvConfig::default();
        config.has_header = false;
        let mut enc = DsvEncoder::new(config);
        let mut out = Vec::new();
        enc.write_record(&record(&[("a", "1")]), &mut out).unwrap();
        enc.finish(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1\n");
    }

    #[test]
    fn zero_records_with_declared_header_emits_header_only() {
        let mut config = DsvConfig::default();
        config.declared_header = Some(vec!["name".to_string(), "age".to_string()]);
        let mut enc = DsvEncoder::new(config);
        let mut out = Vec::new();
        enc.finish(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "name,age\n");
    }

    #[test]
    fn zero_records_without_declared_header_emits_nothing() {
        let mut enc = DsvEncoder::new(DsvConfig::default());
        let mut out = Vec::new();
        enc.finish(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
