//! Label construction.
use metrics::Label;
use serde_json::Value;

use crate::coerce::coerce;
use crate::config::{LabelConfig, LabelSource, ParsedType, ParsedValue};
use crate::error::{json_kind, LabelError, LabelSide};
use crate::extract::extract;

/// Builds the labels of one metric instance.
///
/// Labels are emitted in configuration order. Literal keys and values are used as-is; field-derived
/// ones are extracted from `document` and converted to their string form. The first label that
/// cannot be built aborts construction: an instance is never emitted with a partial label set.
pub fn build_labels(labels: &[LabelConfig], document: &Value) -> Result<Vec<Label>, LabelError> {
    labels
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let key = resolve(&label.label_key, document, index, LabelSide::Key)?;
            let value = resolve(&label.label_value, document, index, LabelSide::Value)?;
            Ok(Label::new(key, value))
        })
        .collect()
}

fn resolve(
    source: &LabelSource,
    document: &Value,
    index: usize,
    side: LabelSide,
) -> Result<String, LabelError> {
    match source {
        LabelSource::StringValue(s) => Ok(s.clone()),
        LabelSource::ParsedValue(parsed) => resolve_field(parsed, document, index, side),
    }
}

fn resolve_field(
    parsed: &ParsedValue,
    document: &Value,
    index: usize,
    side: LabelSide,
) -> Result<String, LabelError> {
    let value = extract(document, &parsed.field_path)
        .map_err(|source| LabelError::Missing { index, side, source })?;

    match parsed.parsed_type {
        ParsedType::String => stringify(value).ok_or_else(|| LabelError::NotScalar {
            index,
            side,
            path: parsed.field_path.clone(),
            found: json_kind(value),
        }),
        numeric => coerce(value, numeric)
            .map(|value| value.to_string())
            .map_err(|source| LabelError::Coercion { index, side, source }),
    }
}

/// Canonical string form of a JSON scalar.
fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::build_labels;
    use crate::config::{FieldPath, LabelConfig, LabelSource, ParsedType, ParsedValue};
    use crate::error::{LabelError, LabelSide};
    use metrics::Label;
    use serde_json::json;

    fn numeric_field(path: &[&str], parsed_type: ParsedType) -> LabelSource {
        let field_path = FieldPath::new(path.iter().copied());
        LabelSource::ParsedValue(ParsedValue::new(field_path, parsed_type))
    }

    #[test]
    fn test_literal_labels() {
        let labels = vec![LabelConfig::new("Application", "MetricRule")];
        let built = build_labels(&labels, &json!({})).unwrap();
        assert_eq!(built, vec![Label::new("Application", "MetricRule")]);
    }

    #[test]
    fn test_no_labels() {
        assert!(build_labels(&[], &json!({ "a": 1 })).unwrap().is_empty());
    }

    #[test]
    fn test_preserves_configuration_order() {
        let labels = vec![
            LabelConfig::new("z", "1"),
            LabelConfig::new("a", "2"),
            LabelConfig::new("m", "3"),
        ];
        let built = build_labels(&labels, &json!({})).unwrap();
        let keys = built.iter().map(|l| l.key()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_field_derived_scalars() {
        let document = json!({
            "model": { "name": "resnet", "version": 3, "canary": false, "temperature": 0.5 }
        });
        let labels = vec![
            LabelConfig::new("model", LabelSource::field(["model", "name"])),
            LabelConfig::new("version", LabelSource::field(["model", "version"])),
            LabelConfig::new("canary", LabelSource::field(["model", "canary"])),
            LabelConfig::new("temperature", LabelSource::field(["model", "temperature"])),
            LabelConfig::new(LabelSource::field(["model", "name"]), "key-from-field"),
        ];

        let built = build_labels(&labels, &document).unwrap();
        assert_eq!(
            built,
            vec![
                Label::new("model", "resnet"),
                Label::new("version", "3"),
                Label::new("canary", "false"),
                Label::new("temperature", "0.5"),
                Label::new("resnet", "key-from-field"),
            ]
        );
    }

    #[test]
    fn test_numeric_declared_fields_are_normalized() {
        let document = json!({ "a": "7", "b": 7.0, "c": "0.250" });
        let labels = vec![
            LabelConfig::new("a", numeric_field(&["a"], ParsedType::Int)),
            LabelConfig::new("b", numeric_field(&["b"], ParsedType::Int)),
            LabelConfig::new("c", numeric_field(&["c"], ParsedType::Float)),
        ];

        let built = build_labels(&labels, &document).unwrap();
        assert_eq!(
            built,
            vec![Label::new("a", "7"), Label::new("b", "7"), Label::new("c", "0.25")]
        );
    }

    #[test]
    fn test_missing_field_fails() {
        let labels = vec![
            LabelConfig::new("ok", "fine"),
            LabelConfig::new("model", LabelSource::field(["model"])),
        ];
        let err = build_labels(&labels, &json!({})).unwrap_err();
        assert!(matches!(err, LabelError::Missing { index: 1, side: LabelSide::Value, .. }));
    }

    #[test]
    fn test_non_scalar_fields_fail() {
        let document = json!({ "obj": { "a": 1 }, "arr": [1, 2], "nil": null });
        for (field, found) in [("obj", "object"), ("arr", "array"), ("nil", "null")] {
            let labels = vec![LabelConfig::new(LabelSource::field([field]), "v")];
            let err = build_labels(&labels, &document).unwrap_err();
            assert!(
                matches!(
                    err,
                    LabelError::NotScalar { side: LabelSide::Key, found: f, .. } if f == found
                ),
                "{field} should not be usable as a label"
            );
        }
    }

    #[test]
    fn test_numeric_coercion_failure() {
        let labels = vec![LabelConfig::new("n", numeric_field(&["n"], ParsedType::Int))];
        let err = build_labels(&labels, &json!({ "n": 1.5 })).unwrap_err();
        assert!(matches!(err, LabelError::Coercion { index: 0, side: LabelSide::Value, .. }));
    }
}
