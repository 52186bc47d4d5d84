//! Per-payload evaluation of metric definitions.
use std::fmt;

use indexmap::IndexMap;
use metrics::Label;
use serde_json::Value;
use tracing::debug;

use crate::coerce::coerce;
use crate::config::{Context, MetricConfig, MetricKind, SidecarConfig, ValueSource};
use crate::error::{MetricError, PayloadParseError};
use crate::extract::extract;
use crate::label::build_labels;
use crate::spec::{InstrumentSpec, ValueKind};

/// A single measured value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
}

impl MetricValue {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            MetricValue::Int64(_) => ValueKind::Int64,
            MetricValue::Float64(_) => ValueKind::Float64,
        }
    }

    /// This value as a float.
    ///
    /// Integers beyond 2^53 lose precision.
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Int64(v) => v as f64,
            MetricValue::Float64(v) => v,
        }
    }

    /// This value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            MetricValue::Int64(v) => Some(v),
            MetricValue::Float64(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int64(v) => write!(f, "{}", v),
            MetricValue::Float64(v) => write!(f, "{}", v),
        }
    }
}

/// One observation: a value and the labels it was observed with.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricInstance {
    value: MetricValue,
    labels: Vec<Label>,
}

impl MetricInstance {
    /// Creates a [`MetricInstance`] from a value and its labels.
    pub fn new(value: MetricValue, labels: Vec<Label>) -> Self {
        MetricInstance { value, labels }
    }

    /// The observed value.
    pub fn value(&self) -> MetricValue {
        self.value
    }

    /// Labels of this observation, in configuration order.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Consumes this instance, returning the value and labels.
    pub fn into_parts(self) -> (MetricValue, Vec<Label>) {
        (self.value, self.labels)
    }
}

/// A metric definition that produced no instance for one payload.
#[derive(Debug)]
pub struct SkippedMetric {
    /// Position of the definition in its context's metric list.
    pub index: usize,
    /// Name of the instrument the definition targets.
    pub name: String,
    /// Why it was skipped.
    pub error: MetricError,
}

/// Result of evaluating one payload.
///
/// Instances are grouped by the instrument they are recorded against, in the order each
/// instrument first appears in the configuration. Definitions that could not be evaluated for this
/// payload are listed separately and do not affect the others.
#[derive(Debug)]
pub struct Evaluation {
    context: Context,
    instances: IndexMap<InstrumentSpec, Vec<MetricInstance>>,
    skipped: Vec<SkippedMetric>,
}

impl Evaluation {
    pub(crate) fn new(context: Context) -> Self {
        Evaluation { context, instances: IndexMap::new(), skipped: Vec::new() }
    }

    /// Context the payload was evaluated in.
    pub fn context(&self) -> Context {
        self.context
    }

    /// Instances grouped by instrument.
    pub fn instances(&self) -> &IndexMap<InstrumentSpec, Vec<MetricInstance>> {
        &self.instances
    }

    /// Instances recorded against `spec`, if any.
    pub fn get(&self, spec: &InstrumentSpec) -> Option<&[MetricInstance]> {
        self.instances.get(spec).map(Vec::as_slice)
    }

    /// Iterates over each instrument and its instances.
    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentSpec, &[MetricInstance])> {
        self.instances.iter().map(|(spec, instances)| (spec, instances.as_slice()))
    }

    /// Definitions skipped for this payload.
    pub fn skipped(&self) -> &[SkippedMetric] {
        &self.skipped
    }

    /// Number of distinct instruments with at least one instance.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether or not no instance was produced.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Total number of instances across all instruments.
    pub fn instance_count(&self) -> usize {
        self.instances.values().map(Vec::len).sum()
    }

    /// Consumes this evaluation, returning the instances and the skipped definitions.
    pub fn into_parts(
        self,
    ) -> (IndexMap<InstrumentSpec, Vec<MetricInstance>>, Vec<SkippedMetric>) {
        (self.instances, self.skipped)
    }

    pub(crate) fn push(
        &mut self,
        index: usize,
        metric: &MetricConfig,
        result: Result<(InstrumentSpec, MetricInstance), MetricError>,
    ) {
        match result {
            Ok((spec, instance)) => self.instances.entry(spec).or_default().push(instance),
            Err(error) => {
                let name = metric.display_name(self.context);
                debug!(
                    context = %self.context,
                    metric = %name,
                    index,
                    reason = error.reason(),
                    error = %error,
                    "Skipping metric for this payload."
                );
                self.skipped.push(SkippedMetric { index, name, error });
            }
        }
    }
}

/// Evaluates the metrics of `context` against `payload`.
///
/// The payload is parsed as JSON once. Each metric definition is then evaluated in configuration
/// order; a definition whose field is missing, whose value cannot be converted, or whose labels
/// cannot be built is skipped without affecting the others.
///
/// The configuration does not need to have been validated: invalid definitions are skipped with
/// [`MetricError::Config`]. Prefer [`MetricRules`](crate::MetricRules), which validates once and
/// reuses the derived instruments on every call.
///
/// # Errors
///
/// Fails only if `payload` is not valid JSON.
///
/// ```rust
/// # use metricrule::{evaluate, Context, FieldPath, MetricConfig, MetricValue, ParsedType};
/// # use metricrule::SidecarConfig;
/// let config = SidecarConfig::new().with_output_metric(
///     MetricConfig::parsed_value(FieldPath::new(["prediction"]), ParsedType::Float)
///         .with_name("prediction"),
/// );
///
/// let evaluation = evaluate(&config, Context::Output, r#"{ "prediction": 0.495 }"#).unwrap();
/// let (spec, instances) = evaluation.iter().next().unwrap();
/// assert_eq!(spec.name(), "prediction");
/// assert_eq!(instances[0].value(), MetricValue::Float64(0.495));
/// ```
pub fn evaluate(
    config: &SidecarConfig,
    context: Context,
    payload: &str,
) -> Result<Evaluation, PayloadParseError> {
    let document = parse_payload(context, payload)?;

    let mut evaluation = Evaluation::new(context);
    for (index, metric) in config.metrics(context).iter().enumerate() {
        let result = InstrumentSpec::for_metric(metric, context)
            .map_err(MetricError::from)
            .and_then(|spec| evaluate_metric(metric, &document).map(|instance| (spec, instance)));
        evaluation.push(index, metric, result);
    }
    Ok(evaluation)
}

pub(crate) fn parse_payload(context: Context, payload: &str) -> Result<Value, PayloadParseError> {
    serde_json::from_str(payload).map_err(|source| PayloadParseError { context, source })
}

/// Computes the value and labels of one metric definition against a parsed payload.
pub(crate) fn evaluate_metric(
    metric: &MetricConfig,
    document: &Value,
) -> Result<MetricInstance, MetricError> {
    let value = match &metric.kind {
        MetricKind::SimpleCounter(_) => MetricValue::Int64(1),
        MetricKind::Value(ValueSource::ParsedValue(parsed)) => {
            let raw = extract(document, &parsed.field_path)?;
            coerce(raw, parsed.parsed_type)?
        }
    };
    let labels = build_labels(&metric.labels, document)?;
    Ok(MetricInstance::new(value, labels))
}
