//! Recording evaluations through a [`metrics`] recorder.
//!
//! Counters are registered with [`Recorder::register_counter`] and value recorders with
//! [`Recorder::register_histogram`]. Each instance's labels become the labels of the key it is
//! recorded under, so any `metrics` exporter can be used as the backend.
//!
//! ```rust
//! # use metricrule::{facade, Context, MetricRules};
//! let rules = MetricRules::from_json_str(r#"{
//!     "input_metrics": [{ "name": "requests", "simple_counter": {} }]
//! }"#).expect("valid configuration");
//!
//! // Once, at startup.
//! metrics::with_recorder(|recorder| facade::describe(recorder, rules.all_specs()));
//!
//! // Per request.
//! let evaluation = rules.evaluate(Context::Input, "{}").expect("valid payload");
//! facade::record_global(&evaluation);
//! ```
use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString, Unit};

use crate::evaluate::Evaluation;
use crate::spec::{InstrumentKind, InstrumentSpecs};

/// Name of the counter tracking metric definitions skipped during evaluation.
///
/// Labeled with `context` and `reason`.
pub const SKIPPED_METRICS_TOTAL: &str = "metricrule_skipped_metrics_total";

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Describes every derived instrument to `recorder`.
///
/// Intended to run once at startup so the backend knows about each instrument before the first
/// payload is evaluated.
pub fn describe<R>(recorder: &R, specs: &InstrumentSpecs)
where
    R: Recorder + ?Sized,
{
    for (context, spec) in specs.iter() {
        let key_name = KeyName::from(spec.name().to_string());
        let description = SharedString::from(format!(
            "{} {} derived from {} payloads",
            spec.value_kind(),
            spec.instrument_kind(),
            context
        ));
        match spec.instrument_kind() {
            InstrumentKind::Counter => {
                recorder.describe_counter(key_name, Some(Unit::Count), description)
            }
            InstrumentKind::ValueRecorder => {
                recorder.describe_histogram(key_name, None, description)
            }
        }
    }

    recorder.describe_counter(
        KeyName::from_const_str(SKIPPED_METRICS_TOTAL),
        Some(Unit::Count),
        SharedString::const_str("Metric definitions skipped because a payload did not match them"),
    );
}

/// Records every instance of `evaluation` through `recorder`.
///
/// Each counter instance is one event and increments its counter by one.
pub fn record<R>(recorder: &R, evaluation: &Evaluation)
where
    R: Recorder + ?Sized,
{
    for (spec, instances) in evaluation.iter() {
        for instance in instances {
            let key = Key::from_parts(spec.name().to_string(), instance.labels().to_vec());
            match spec.instrument_kind() {
                InstrumentKind::Counter => recorder.register_counter(&key, &METADATA).increment(1),
                InstrumentKind::ValueRecorder => recorder
                    .register_histogram(&key, &METADATA)
                    .record(instance.value().as_f64()),
            }
        }
    }
}

/// Counts the metric definitions `evaluation` skipped, by context and reason.
pub fn record_skipped<R>(recorder: &R, evaluation: &Evaluation)
where
    R: Recorder + ?Sized,
{
    for skipped in evaluation.skipped() {
        let labels = vec![
            Label::new("context", evaluation.context().as_str()),
            Label::new("reason", skipped.error.reason()),
        ];
        let key = Key::from_parts(SKIPPED_METRICS_TOTAL, labels);
        recorder.register_counter(&key, &METADATA).increment(1);
    }
}

/// Records `evaluation`, including its skipped definitions, through the global recorder.
pub fn record_global(evaluation: &Evaluation) {
    metrics::with_recorder(|recorder| {
        record(recorder, evaluation);
        record_skipped(recorder, evaluation);
    })
}
