//! Instrument identities derived from the static configuration.
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::config::{
    Context, LabelSource, MetricConfig, MetricKind, ParsedType, SidecarConfig, ValueSource,
};
use crate::error::ConfigError;

/// Kind of instrument a metric is registered as.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum InstrumentKind {
    /// Monotonic, accumulate-only instrument.
    Counter,
    /// Instrument recording arbitrary point measurements.
    ValueRecorder,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentKind::Counter => f.write_str("counter"),
            InstrumentKind::ValueRecorder => f.write_str("value recorder"),
        }
    }
}

/// Numeric type of the values an instrument receives.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum ValueKind {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Int64 => f.write_str("int64"),
            ValueKind::Float64 => f.write_str("float64"),
        }
    }
}

/// Identity of a registered instrument.
///
/// Two metric definitions that reduce to the same name, instrument kind and value kind target the
/// same instrument. Clones are cheap: the name is shared.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct InstrumentSpec {
    name: Arc<str>,
    instrument_kind: InstrumentKind,
    value_kind: ValueKind,
}

impl InstrumentSpec {
    /// Creates an [`InstrumentSpec`] from its parts.
    pub fn new<N>(name: N, instrument_kind: InstrumentKind, value_kind: ValueKind) -> Self
    where
        N: Into<Arc<str>>,
    {
        InstrumentSpec { name: name.into(), instrument_kind, value_kind }
    }

    /// Reduces a metric definition to the instrument it targets.
    ///
    /// This is the only place the mapping from configuration to instrument is defined. Both static
    /// derivation and per-payload evaluation go through it, so evaluation can never produce an
    /// identity that derivation did not.
    ///
    /// - a simple counter is an `Int64` counter
    /// - a `FLOAT` parsed value is a `Float64` value recorder
    /// - an `INT` parsed value is an `Int64` value recorder
    ///
    /// Unnamed metrics are named after their context, kind and parsed type, e.g.
    /// `output_parsed_value_float`.
    ///
    /// # Errors
    ///
    /// Fails if a parsed value is declared `STRING`, or if any field path of the metric or its
    /// labels is empty or contains an empty segment.
    pub fn for_metric(metric: &MetricConfig, context: Context) -> Result<Self, ConfigError> {
        let name = metric.display_name(context);

        let (instrument_kind, value_kind) = match &metric.kind {
            MetricKind::SimpleCounter(_) => (InstrumentKind::Counter, ValueKind::Int64),
            MetricKind::Value(ValueSource::ParsedValue(parsed)) => {
                parsed.field_path.validate(&name)?;
                match parsed.parsed_type {
                    ParsedType::Float => (InstrumentKind::ValueRecorder, ValueKind::Float64),
                    ParsedType::Int => (InstrumentKind::ValueRecorder, ValueKind::Int64),
                    ParsedType::String => {
                        return Err(ConfigError::NonNumericValue {
                            metric: name,
                            parsed_type: parsed.parsed_type,
                        })
                    }
                }
            }
        };

        for label in &metric.labels {
            for source in [&label.label_key, &label.label_value] {
                if let LabelSource::ParsedValue(parsed) = source {
                    parsed.field_path.validate(&name)?;
                }
            }
        }

        Ok(InstrumentSpec::new(name, instrument_kind, value_kind))
    }

    /// Name of the instrument.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of the instrument.
    pub fn instrument_kind(&self) -> InstrumentKind {
        self.instrument_kind
    }

    /// Kind of the values the instrument receives.
    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }
}

impl fmt::Display for InstrumentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.instrument_kind, self.value_kind)
    }
}

/// The distinct instruments a configuration can produce, per context.
///
/// Specs within a context are kept in the order their first defining metric appears in the
/// configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstrumentSpecs {
    input: IndexSet<InstrumentSpec>,
    output: IndexSet<InstrumentSpec>,
}

impl InstrumentSpecs {
    /// Specs for the given context.
    pub fn get(&self, context: Context) -> &IndexSet<InstrumentSpec> {
        match context {
            Context::Input => &self.input,
            Context::Output => &self.output,
        }
    }

    /// Whether or not `spec` can be produced in `context`.
    pub fn contains(&self, context: Context, spec: &InstrumentSpec) -> bool {
        self.get(context).contains(spec)
    }

    /// Iterates over every spec, input context first.
    pub fn iter(&self) -> impl Iterator<Item = (Context, &InstrumentSpec)> {
        let input = self.input.iter().map(|spec| (Context::Input, spec));
        let output = self.output.iter().map(|spec| (Context::Output, spec));
        input.chain(output)
    }

    /// Total number of specs across both contexts.
    ///
    /// A spec produced in both contexts is counted twice.
    pub fn len(&self) -> usize {
        self.input.len() + self.output.len()
    }

    /// Whether or not the configuration produces no instruments at all.
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    pub(crate) fn from_parts(
        input: IndexSet<InstrumentSpec>,
        output: IndexSet<InstrumentSpec>,
    ) -> Self {
        InstrumentSpecs { input, output }
    }
}

/// Derives every instrument identity `config` can produce.
///
/// Only the configuration is inspected; the result is the same for every payload. Definitions that
/// reduce to an identical spec collapse into one entry.
///
/// # Errors
///
/// Fails on the first invalid metric definition, or when two definitions in the same context share
/// a name but not an instrument kind and value kind.
pub fn derive_specs(config: &SidecarConfig) -> Result<InstrumentSpecs, ConfigError> {
    let input = derive_context(config.metrics(Context::Input), Context::Input)?;
    let output = derive_context(config.metrics(Context::Output), Context::Output)?;
    Ok(InstrumentSpecs::from_parts(input.specs, output.specs))
}

/// Specs derived for one context.
pub(crate) struct DerivedContext {
    /// Spec of each metric definition, aligned with the configuration.
    pub per_metric: Vec<InstrumentSpec>,
    /// Distinct specs, in first-appearance order.
    pub specs: IndexSet<InstrumentSpec>,
}

pub(crate) fn derive_context(
    metrics: &[MetricConfig],
    context: Context,
) -> Result<DerivedContext, ConfigError> {
    let mut per_metric = Vec::with_capacity(metrics.len());
    let mut by_name: IndexMap<Arc<str>, InstrumentSpec> = IndexMap::with_capacity(metrics.len());

    for (index, metric) in metrics.iter().enumerate() {
        let spec = InstrumentSpec::for_metric(metric, context)?;

        match by_name.get(&spec.name) {
            Some(existing) if existing == &spec => {
                debug!(
                    %context,
                    %spec,
                    index,
                    "Metric shares an instrument with an earlier definition."
                );
            }
            Some(existing) => {
                return Err(ConfigError::ConflictingInstrument {
                    context,
                    existing: existing.clone(),
                    conflicting: spec,
                });
            }
            None => {
                by_name.insert(spec.name.clone(), spec.clone());
            }
        }
        per_metric.push(spec);
    }

    Ok(DerivedContext { per_metric, specs: by_name.into_values().collect() })
}
