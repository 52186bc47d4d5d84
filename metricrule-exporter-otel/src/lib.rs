#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![deny(missing_docs)]

mod instruments;
mod metadata;

use std::collections::HashMap;

use metricrule::{Evaluation, InstrumentKind, InstrumentSpec, InstrumentSpecs};
use opentelemetry::metrics::Meter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::instruments::OtelInstrument;
use crate::metadata::{valid_bounds, InstrumentMetadata};

/// Errors that could occur while registering instruments.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// Two instrument specs share a name but not an instrument shape.
    #[error("instrument `{}` is declared as both {existing} and {conflicting}", .existing.name())]
    ConflictingInstrument {
        /// The spec registered first.
        existing: InstrumentSpec,
        /// The spec that could not be registered.
        conflicting: InstrumentSpec,
    },

    /// Histogram bounds were not finite and strictly increasing.
    #[error("histogram bounds for `{name}` must be finite and strictly increasing: {bounds:?}")]
    InvalidHistogramBounds {
        /// Instrument the bounds were configured for.
        name: String,
        /// The rejected bounds.
        bounds: Vec<f64>,
    },
}

/// Builder for [`OtelInstruments`].
pub struct OtelInstrumentsBuilder {
    meter: Meter,
    metadata: InstrumentMetadata,
}

impl OtelInstrumentsBuilder {
    /// Sets custom bucket boundaries for the histogram backing the instrument named `name`.
    ///
    /// Bounds must be finite and strictly increasing, otherwise [`build`](Self::build) fails.
    #[must_use]
    pub fn with_histogram_bounds<N: Into<String>>(mut self, name: N, bounds: Vec<f64>) -> Self {
        self.metadata.set_histogram_bounds(name.into(), bounds);
        self
    }

    /// Sets the description of the instrument named `name`.
    #[must_use]
    pub fn with_description<N, D>(mut self, name: N, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        self.metadata.set_description(name.into(), description.into());
        self
    }

    /// Creates one OpenTelemetry instrument per distinct spec in `specs`.
    ///
    /// Specs shared by both contexts are backed by a single instrument.
    ///
    /// # Errors
    ///
    /// If two specs share a name but not an instrument shape, or if any configured histogram bounds
    /// are invalid, an error variant will be returned describing the problem.
    pub fn build(self, specs: &InstrumentSpecs) -> Result<OtelInstruments, RegisterError> {
        let mut by_name: HashMap<&str, &InstrumentSpec> = HashMap::with_capacity(specs.len());
        let mut instruments = HashMap::with_capacity(specs.len());

        for (context, spec) in specs.iter() {
            match by_name.get(spec.name()) {
                Some(existing) if *existing == spec => {
                    debug!(%context, %spec, "Instrument already registered by another context.");
                    continue;
                }
                Some(existing) => {
                    return Err(RegisterError::ConflictingInstrument {
                        existing: (*existing).clone(),
                        conflicting: spec.clone(),
                    });
                }
                None => {}
            }

            if let Some(bounds) = self.metadata.histogram_bounds(spec.name()) {
                let is_histogram = spec.instrument_kind() == InstrumentKind::ValueRecorder;
                if is_histogram && !valid_bounds(bounds) {
                    return Err(RegisterError::InvalidHistogramBounds {
                        name: spec.name().to_string(),
                        bounds: bounds.to_vec(),
                    });
                }
            }

            by_name.insert(spec.name(), spec);
            let instrument = OtelInstrument::new(&self.meter, spec, &self.metadata);
            instruments.insert(spec.clone(), instrument);
        }

        for (name, reason) in self.metadata.ignored_options(&by_name) {
            warn!(
                instrument = name,
                reason,
                "Options configured for an instrument have no effect."
            );
        }

        Ok(OtelInstruments { instruments })
    }
}

/// OpenTelemetry instruments for every instrument a metric configuration can produce.
///
/// The instrument table is fixed once built. Recording only reads it, so a single instance can be
/// shared across threads without locking.
///
/// ```rust,no_run
/// use metricrule::{Context, MetricRules};
/// use metricrule_exporter_otel::OtelInstruments;
/// use opentelemetry::metrics::MeterProvider;
/// use opentelemetry_sdk::metrics::SdkMeterProvider;
///
/// let rules = MetricRules::from_json_str(r#"{
///     "input_metrics": [{ "name": "requests", "simple_counter": {} }]
/// }"#).expect("valid configuration");
///
/// let provider = SdkMeterProvider::default();
/// let instruments = OtelInstruments::builder(provider.meter("sidecar"))
///     .build(rules.all_specs())
///     .expect("consistent instruments");
///
/// let evaluation = rules.evaluate(Context::Input, "{}").expect("valid payload");
/// assert_eq!(instruments.record(&evaluation), 0);
/// ```
pub struct OtelInstruments {
    instruments: HashMap<InstrumentSpec, OtelInstrument>,
}

impl OtelInstruments {
    /// Creates a builder that registers instruments with `meter`.
    pub fn builder(meter: Meter) -> OtelInstrumentsBuilder {
        OtelInstrumentsBuilder { meter, metadata: InstrumentMetadata::default() }
    }

    /// Whether or not an instrument was registered for `spec`.
    pub fn contains(&self, spec: &InstrumentSpec) -> bool {
        self.instruments.contains_key(spec)
    }

    /// Number of registered instruments.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Whether or not no instrument was registered.
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Records every instance of `evaluation`.
    ///
    /// Counters are incremented by one per instance and histograms record the instance's value.
    /// Instances of a spec that was never registered are dropped. Returns the number of dropped
    /// instances.
    pub fn record(&self, evaluation: &Evaluation) -> usize {
        let mut dropped = 0;
        for (spec, instances) in evaluation.iter() {
            match self.instruments.get(spec) {
                Some(instrument) => instances.iter().for_each(|i| instrument.record(i)),
                None => {
                    warn!(
                        context = %evaluation.context(),
                        %spec,
                        instances = instances.len(),
                        "Dropping instances of an unregistered instrument."
                    );
                    dropped += instances.len();
                }
            }
        }
        dropped
    }
}
