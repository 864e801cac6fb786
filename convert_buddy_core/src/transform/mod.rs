//! The transform engine (spec §4.4): an ordered list of field specs run
//! between parse and encode, each one doing source selection, type
//! coercion, default substitution and (optionally) a compute expression,
//! plus an optional record-level filter.

pub mod expr;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, ConvertResult};
use crate::record::{Record, Scalar};

/// Whether the transform's output fields replace the record entirely or are
/// layered onto the fields the parser already produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMode {
    Replace,
    Augment,
}

impl Default for TransformMode {
    fn default() -> Self {
        TransformMode::Augment
    }
}

/// How to react when a field spec's source field is absent from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingFieldPolicy {
    Error,
    Null,
    DropRecord,
}

impl Default for MissingFieldPolicy {
    fn default() -> Self {
        MissingFieldPolicy::Null
    }
}

/// How to react when a coercion or compute expression fails for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoerceErrorPolicy {
    Error,
    Null,
    DropRecord,
}

impl Default for CoerceErrorPolicy {
    fn default() -> Self {
        CoerceErrorPolicy::Error
    }
}

/// The target type a field spec's value is coerced to before `compute` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoerceType {
    String,
    I64,
    F64,
    Bool,
    TimestampMs,
}

/// One declared output field (spec §4.4 "Field specs").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// The name the resolved value is written under.
    pub target_field_name: String,
    /// The field read for the starting value; defaults to `targetFieldName`.
    #[serde(default)]
    pub origin_field_name: Option<String>,
    #[serde(default)]
    pub coerce: Option<CoerceType>,
    /// Substituted in when the (post-coercion) value is null.
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
    /// An expression (see `expr`) evaluated over the record's already
    /// resolved fields; its result, not the coerced source value, becomes
    /// the final value when present.
    #[serde(default)]
    pub compute: Option<String>,
}

impl FieldSpec {
    fn origin(&self) -> &str {
        self.origin_field_name
            .as_deref()
            .unwrap_or(&self.target_field_name)
    }
}

/// The full transform declaration attached to `KernelOptions.transform`
/// (spec §4.4, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSpec {
    #[serde(default)]
    pub mode: TransformMode,
    pub fields: Vec<FieldSpec>,
    /// An expression evaluated once all fields are resolved; a falsy result
    /// drops the record (counts against `recordsFiltered`, not an error).
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub on_missing_field: MissingFieldPolicy,
    #[serde(default)]
    pub on_coerce_error: CoerceErrorPolicy,
}

fn coerce(value: Scalar, target: CoerceType, field: &str) -> ConvertResult<Scalar> {
    if value.is_null() {
        return Ok(Scalar::Null);
    }
    let text = value.as_display();
    Ok(match target {
        CoerceType::String => Scalar::String(text),
        CoerceType::I64 => {
            // Accept "3.0"-shaped text by routing through f64 first, but only
            // when it has no fractional remainder — spec §4.4 "numeric
            // coercions accept the JSON number grammar".
            if let Ok(i) = text.trim().parse::<i64>() {
                Scalar::Integer(i)
            } else if let Ok(f) = text.trim().parse::<f64>() {
                if f.fract() == 0.0 && f.is_finite() {
                    Scalar::Integer(f as i64)
                } else {
                    return Err(ConvertError::CoercionError {
                        field: field.to_string(),
                        value: text,
                    });
                }
            } else {
                return Err(ConvertError::CoercionError {
                    field: field.to_string(),
                    value: text,
                });
            }
        }
        CoerceType::F64 => text
            .trim()
            .parse::<f64>()
            .map(Scalar::Floating)
            .map_err(|_| ConvertError::CoercionError {
                field: field.to_string(),
                value: text.clone(),
            })?,
        CoerceType::Bool => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Scalar::Boolean(true),
            "false" => Scalar::Boolean(false),
            _ => {
                return Err(ConvertError::CoercionError {
                    field: field.to_string(),
                    value: text,
                })
            }
        },
        CoerceType::TimestampMs => {
            let parsed = time::OffsetDateTime::parse(
                text.trim(),
                &time::format_description::well_known::Rfc3339,
            )
            .map_err(|_| ConvertError::CoercionError {
                field: field.to_string(),
                value: text.clone(),
            })?;
            Scalar::Integer(parsed.unix_timestamp() * 1000 + i64::from(parsed.millisecond()))
        }
    })
}

/// Outcome of running one field spec.
enum Resolution {
    Value(Scalar),
    Drop,
}

fn resolve_field(
    spec: &FieldSpec,
    context: &Record,
    on_missing: MissingFieldPolicy,
    on_coerce_error: CoerceErrorPolicy,
) -> ConvertResult<Resolution> {
    let origin = spec.origin();
    let raw = match context.get(origin) {
        Some(v) => v.clone(),
        None => match on_missing {
            MissingFieldPolicy::Error => {
                return Err(ConvertError::MissingField {
                    name: origin.to_string(),
                })
            }
            MissingFieldPolicy::Null => Scalar::Null,
            MissingFieldPolicy::DropRecord => return Ok(Resolution::Drop),
        },
    };

    let mut value = match spec.coerce {
        Some(target) => match coerce(raw, target, &spec.target_field_name) {
            Ok(v) => v,
            Err(e) => match on_coerce_error {
                CoerceErrorPolicy::Error => return Err(e),
                CoerceErrorPolicy::Null => Scalar::Null,
                CoerceErrorPolicy::DropRecord => return Ok(Resolution::Drop),
            },
        },
        None => raw,
    };

    if value.is_null() {
        if let Some(default) = &spec.default_value {
            value = Scalar::from_json(default);
        }
    }

    Ok(Resolution::Value(value))
}

/// Run one record through the transform. `Ok(None)` means the record was
/// dropped (by `onMissingField`/`onCoerceError: drop-record` or by
/// `filter`), not an error — the kernel counts it against
/// `Stats.records_filtered` rather than `records_failed`.
pub fn apply(spec: &TransformSpec, input: Record) -> ConvertResult<Option<Record>> {
    let mut context = input.clone();
    let mut output = match spec.mode {
        TransformMode::Augment => input,
        TransformMode::Replace => Record::new(),
    };

    for field in &spec.fields {
        let resolved = resolve_field(field, &context, spec.on_missing_field, spec.on_coerce_error)?;
        let mut value = match resolved {
            Resolution::Value(v) => v,
            Resolution::Drop => return Ok(None),
        };
        context.set(field.origin(), value.clone());

        if let Some(expr_src) = &field.compute {
            let evaluated = match expr::eval_expr(expr_src, &context) {
                Ok(json) => Scalar::from_json(&json),
                Err(e) => match spec.on_coerce_error {
                    CoerceErrorPolicy::Error => return Err(e),
                    CoerceErrorPolicy::Null => Scalar::Null,
                    CoerceErrorPolicy::DropRecord => return Ok(None),
                },
            };
            value = evaluated;
        }

        context.set(&field.target_field_name, value.clone());
        output.set(&field.target_field_name, value);
    }

    if let Some(filter_src) = &spec.filter {
        let keep = match expr::eval_expr(filter_src, &context) {
            Ok(serde_json::Value::Bool(b)) => b,
            Ok(other) => !other.is_null() && other != serde_json::Value::Bool(false),
            Err(e) => match spec.on_coerce_error {
                CoerceErrorPolicy::Error => return Err(e),
                CoerceErrorPolicy::Null => false,
                CoerceErrorPolicy::DropRecord => false,
            },
        };
        if !keep {
            return Ok(None);
        }
    }

    Ok(Some(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Scalar)]) -> Record {
        let mut r = Record::new();
        for (k, v) in pairs {
            r.set(*k, v.clone());
        }
        r
    }

    #[test]
    fn augment_mode_adds_computed_field_without_mutating_the_source() {
        let spec = TransformSpec {
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
            on_coerce_error: CoerceErrorPolicy::Error,
        };
        let input = record(&[("level", Scalar::String("20".to_string()))]);
        let out = apply(&spec, input).unwrap().unwrap();
        assert_eq!(out.get("level"), Some(&Scalar::String("20".to_string())));
        assert_eq!(out.get("isVeteran"), Some(&Scalar::Boolean(true)));
    }

    #[test]
    fn replace_mode_drops_unlisted_fields() {
        let spec = TransformSpec {
            mode: TransformMode::Replace,
            fields: vec![FieldSpec {
                target_field_name: "name".to_string(),
                origin_field_name: None,
                coerce: None,
                default_value: None,
                compute: None,
            }],
            filter: None,
            on_missing_field: MissingFieldPolicy::Null,
            on_coerce_error: CoerceErrorPolicy::Error,
        };
        let input = record(&[
            ("name", Scalar::String("Ada".to_string())),
            ("age", Scalar::Integer(36)),
        ]);
        let out = apply(&spec, input).unwrap().unwrap();
        assert_eq!(out.field_names().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn missing_field_drop_record_policy_filters_the_record() {
        let spec = TransformSpec {
            mode: TransformMode::Augment,
            fields: vec![FieldSpec {
                target_field_name: "email".to_string(),
                origin_field_name: None,
                coerce: None,
                default_value: None,
                compute: None,
            }],
            filter: None,
            on_missing_field: MissingFieldPolicy::DropRecord,
            on_coerce_error: CoerceErrorPolicy::Error,
        };
        let input = record(&[("name", Scalar::String("Ada".to_string()))]);
        assert!(apply(&spec, input).unwrap().is_none());
    }

    #[test]
    fn coerce_error_null_policy_substitutes_null() {
        let spec = TransformSpec {
            mode: TransformMode::Augment,
            fields: vec![FieldSpec {
                target_field_name: "age".to_string(),
                origin_field_name: None,
                coerce: Some(CoerceType::I64),
                default_value: None,
                compute: None,
            }],
            filter: None,
            on_missing_field: MissingFieldPolicy::Null,
            on_coerce_error: CoerceErrorPolicy::Null,
        };
        let input = record(&[("age", Scalar::String("not-a-number".to_string()))]);
        let out = apply(&spec, input).unwrap().unwrap();
        assert_eq!(out.get("age"), Some(&Scalar::Null));
    }

    #[test]
    fn filter_drops_records_that_evaluate_falsy() {
        let spec = TransformSpec {
            mode: TransformMode::Augment,
            fields: vec![],
            filter: Some("age >= 18".to_string()),
            on_missing_field: MissingFieldPolicy::Null,
            on_coerce_error: CoerceErrorPolicy::Error,
        };
        let adult = record(&[("age", Scalar::Integer(30))]);
        let minor = record(&[("age", Scalar::Integer(10))]);
        assert!(apply(&spec, adult).unwrap().is_some());
        assert!(apply(&spec, minor).unwrap().is_none());
    }

    #[test]
    fn default_value_fills_in_for_null() {
        let spec = TransformSpec {
            mode: TransformMode::Augment,
            fields: vec![FieldSpec {
                target_field_name: "country".to_string(),
                origin_field_name: None,
                coerce: None,
                default_value: Some(serde_json::Value::String("IE".to_string())),
                compute: None,
            }],
            filter: None,
            on_missing_field: MissingFieldPolicy::Null,
            on_coerce_error: CoerceErrorPolicy::Error,
        };
        let input = record(&[("country", Scalar::Null)]);
        let out = apply(&spec, input).unwrap().unwrap();
        assert_eq!(out.get("country"), Some(&Scalar::String("IE".to_string())));
    }
}
