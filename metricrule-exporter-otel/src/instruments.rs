//! OpenTelemetry instruments backing derived instrument specs.

use metricrule::{InstrumentKind, InstrumentSpec, MetricInstance};
use metrics::Unit;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

use crate::metadata::InstrumentMetadata;

pub enum OtelInstrument {
    Counter(Counter<u64>),
    Histogram(Histogram<f64>),
}

impl OtelInstrument {
    pub fn new(meter: &Meter, spec: &InstrumentSpec, metadata: &InstrumentMetadata) -> Self {
        let name = spec.name().to_string();
        let description = metadata.description(spec.name()).map(str::to_string);

        match spec.instrument_kind() {
            InstrumentKind::Counter => {
                let builder = meter.u64_counter(name).with_unit(Unit::Count.as_str());
                let builder = match description {
                    Some(description) => builder.with_description(description),
                    None => builder,
                };
                OtelInstrument::Counter(builder.build())
            }
            InstrumentKind::ValueRecorder => {
                let builder = meter.f64_histogram(name);
                let builder = match description {
                    Some(description) => builder.with_description(description),
                    None => builder,
                };
                let builder = match metadata.histogram_bounds(spec.name()) {
                    Some(bounds) => builder.with_boundaries(bounds.to_vec()),
                    None => builder,
                };
                OtelInstrument::Histogram(builder.build())
            }
        }
    }

    pub fn record(&self, instance: &MetricInstance) {
        let attributes = get_attributes(instance);
        match self {
            // Every counter instance is a single event.
            OtelInstrument::Counter(counter) => counter.add(1, &attributes),
            OtelInstrument::Histogram(histogram) => {
                histogram.record(instance.value().as_f64(), &attributes)
            }
        }
    }
}

fn get_attributes(instance: &MetricInstance) -> Vec<KeyValue> {
    instance
        .labels()
        .iter()
        .map(|label| KeyValue::new(label.key().to_string(), label.value().to_string()))
        .collect()
}
