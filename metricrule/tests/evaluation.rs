use approx::assert_relative_eq;
use metricrule::{
    derive_specs, evaluate, Context, FieldPath, InstrumentKind, InstrumentSpec, LabelSource,
    MetricConfig, MetricError, MetricRules, MetricValue, ParsedType, SidecarConfig, ValueKind,
};
use metrics::Label;

const CONFIG: &str = r#"{
    "input_metrics": [
        {
            "name": "requests",
            "simple_counter": {},
            "labels": [
                {
                    "label_key": { "string_value": "Application" },
                    "label_value": { "string_value": "MetricRule" }
                }
            ]
        },
        {
            "name": "batch_size",
            "value": {
                "parsed_value": { "field_path": { "paths": ["batch", "size"] }, "parsed_type": "INT" }
            },
            "labels": [
                {
                    "label_key": { "string_value": "model" },
                    "label_value": { "parsed_value": { "field_path": { "paths": ["model"] } } }
                }
            ]
        }
    ],
    "output_metrics": [
        {
            "name": "prediction",
            "value": {
                "parsed_value": { "field_path": { "paths": ["prediction"] }, "parsed_type": "FLOAT" }
            }
        },
        {
            "name": "confidence",
            "value": {
                "parsed_value": { "field_path": { "paths": ["confidence"] }, "parsed_type": "FLOAT" }
            }
        }
    ]
}"#;

fn rules() -> MetricRules {
    MetricRules::from_json_str(CONFIG).unwrap()
}

#[test]
fn test_derived_specs() {
    let rules = rules();

    let input = rules.specs(Context::Input).iter().cloned().collect::<Vec<_>>();
    assert_eq!(
        input,
        vec![
            InstrumentSpec::new("requests", InstrumentKind::Counter, ValueKind::Int64),
            InstrumentSpec::new("batch_size", InstrumentKind::ValueRecorder, ValueKind::Int64),
        ]
    );

    let output = rules.specs(Context::Output).iter().cloned().collect::<Vec<_>>();
    assert_eq!(
        output,
        vec![
            InstrumentSpec::new("prediction", InstrumentKind::ValueRecorder, ValueKind::Float64),
            InstrumentSpec::new("confidence", InstrumentKind::ValueRecorder, ValueKind::Float64),
        ]
    );
}

#[test]
fn test_input_payload() {
    let rules = rules();
    let evaluation = rules
        .evaluate(Context::Input, r#"{ "model": "resnet", "batch": { "size": "32" } }"#)
        .unwrap();

    assert_eq!(evaluation.context(), Context::Input);
    assert!(evaluation.skipped().is_empty());

    let requests = InstrumentSpec::new("requests", InstrumentKind::Counter, ValueKind::Int64);
    let instances = evaluation.get(&requests).unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].value(), MetricValue::Int64(1));
    assert_eq!(instances[0].labels(), &[Label::new("Application", "MetricRule")]);

    let batch_size =
        InstrumentSpec::new("batch_size", InstrumentKind::ValueRecorder, ValueKind::Int64);
    let instances = evaluation.get(&batch_size).unwrap();
    assert_eq!(instances[0].value(), MetricValue::Int64(32));
    assert_eq!(instances[0].labels(), &[Label::new("model", "resnet")]);
}

#[test]
fn test_output_payload() {
    let rules = rules();
    let evaluation =
        rules.evaluate(Context::Output, r#"{ "prediction": 0.495, "confidence": "0.8" }"#).unwrap();

    let values = evaluation
        .iter()
        .map(|(spec, instances)| {
            assert_eq!(instances.len(), 1);
            assert!(instances[0].labels().is_empty());
            (spec.name().to_string(), instances[0].value().as_f64())
        })
        .collect::<Vec<_>>();

    assert_eq!(values.len(), 2);
    assert_eq!(values[0].0, "prediction");
    assert_relative_eq!(values[0].1, 0.495);
    assert_eq!(values[1].0, "confidence");
    assert_relative_eq!(values[1].1, 0.8);
}

#[test]
fn test_unmatched_definitions_are_isolated() {
    let rules = rules();
    let evaluation = rules.evaluate(Context::Input, r#"{ "batch": { "size": 3.5 } }"#).unwrap();

    // The label-less counter is unaffected by the broken value metric.
    assert_eq!(evaluation.len(), 1);
    assert_eq!(evaluation.instance_count(), 1);

    let skipped = evaluation.skipped();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].index, 1);
    assert_eq!(skipped[0].name, "batch_size");
    assert!(matches!(skipped[0].error, MetricError::Coercion(_)));
}

#[test]
fn test_missing_label_field_skips_metric() {
    let rules = rules();
    let evaluation = rules.evaluate(Context::Input, r#"{ "batch": { "size": 3 } }"#).unwrap();

    assert_eq!(evaluation.instance_count(), 1);
    assert_eq!(evaluation.skipped()[0].error.reason(), "label");
}

#[test]
fn test_invalid_payload_aborts_evaluation() {
    let rules = rules();
    let err = rules.evaluate(Context::Output, "not json").unwrap_err();
    assert_eq!(err.context, Context::Output);
}

#[test]
fn test_non_object_payload() {
    let rules = rules();
    let evaluation = rules.evaluate(Context::Input, "[1, 2, 3]").unwrap();

    // Only the counter matches: it reads no field.
    assert_eq!(evaluation.instance_count(), 1);
    assert_eq!(evaluation.skipped()[0].error.reason(), "missing_field");
}

#[test]
fn test_shared_instrument_collects_every_instance() {
    let config = SidecarConfig::new()
        .with_output_metric(
            MetricConfig::parsed_value(FieldPath::new(["a"]), ParsedType::Float)
                .with_name("score")
                .with_label("source", "a"),
        )
        .with_output_metric(
            MetricConfig::parsed_value(FieldPath::new(["b"]), ParsedType::Float)
                .with_name("score")
                .with_label("source", "b"),
        );

    let specs = derive_specs(&config).unwrap();
    assert_eq!(specs.get(Context::Output).len(), 1);

    let evaluation = evaluate(&config, Context::Output, r#"{ "a": 1, "b": 2 }"#).unwrap();
    assert_eq!(evaluation.len(), 1);

    let (_, instances) = evaluation.iter().next().unwrap();
    let labels = instances.iter().map(|i| i.labels()[0].value().to_string()).collect::<Vec<_>>();
    assert_eq!(labels, vec!["a", "b"]);
}

#[test]
fn test_unnamed_metrics_get_default_names() {
    let config = SidecarConfig::new()
        .with_input_metric(MetricConfig::simple_counter())
        .with_output_metric(MetricConfig::parsed_value(
            FieldPath::new(["prediction"]),
            ParsedType::Float,
        ))
        .with_output_metric(MetricConfig::simple_counter().with_name(""));

    let specs = derive_specs(&config).unwrap();
    let names = specs.iter().map(|(_, spec)| spec.name().to_string()).collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["input_simple_counter", "output_parsed_value_float", "output_simple_counter"]
    );
}

#[test]
fn test_field_derived_label_keys() {
    let config = SidecarConfig::new().with_input_metric(
        MetricConfig::simple_counter()
            .with_name("requests")
            .with_label(LabelSource::field(["tenant", "key"]), LabelSource::field(["tenant", "id"])),
    );

    let evaluation =
        evaluate(&config, Context::Input, r#"{ "tenant": { "key": "team", "id": 42 } }"#).unwrap();
    let (_, instances) = evaluation.iter().next().unwrap();
    assert_eq!(instances[0].labels(), &[Label::new("team", "42")]);
}

#[test]
fn test_config_file_round_trip() {
    let config = rules().config().clone();
    let serialized = serde_json::to_string(&config).unwrap();
    let reparsed = SidecarConfig::from_json_str(&serialized).unwrap();
    assert_eq!(config, reparsed);
}
