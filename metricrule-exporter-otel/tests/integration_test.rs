use metricrule::{
    Context, FieldPath, InstrumentKind, InstrumentSpec, LabelSource, MetricConfig, MetricRules,
    ParsedType, SidecarConfig, ValueKind,
};
use metricrule_exporter_otel::{OtelInstruments, RegisterError};
use opentelemetry::metrics::MeterProvider;
use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, Metric, MetricData, ResourceMetrics};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
use std::time::Duration;

fn provider() -> (SdkMeterProvider, InMemoryMetricExporter) {
    let exporter = InMemoryMetricExporter::default();
    let reader =
        PeriodicReader::builder(exporter.clone()).with_interval(Duration::from_millis(100)).build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    (provider, exporter)
}

fn rules() -> MetricRules {
    let config = SidecarConfig::new()
        .with_input_metric(
            MetricConfig::simple_counter()
                .with_name("requests")
                .with_label("model", LabelSource::field(["model"])),
        )
        .with_output_metric(
            MetricConfig::parsed_value(FieldPath::new(["prediction"]), ParsedType::Float)
                .with_name("prediction")
                .with_label("Application", "MetricRule"),
        )
        .with_output_metric(
            MetricConfig::parsed_value(FieldPath::new(["tokens"]), ParsedType::Int)
                .with_name("tokens"),
        );
    MetricRules::new(config).unwrap()
}

fn find_metric<'a>(metrics: &'a [ResourceMetrics], name: &str) -> &'a Metric {
    metrics
        .last()
        .unwrap()
        .scope_metrics()
        .flat_map(|sm| sm.metrics())
        .find(|m| m.name() == name)
        .unwrap_or_else(|| panic!("{} metric should exist", name))
}

fn has_attribute<'a>(
    mut attributes: impl Iterator<Item = &'a KeyValue>,
    key: &'static str,
    value: &'static str,
) -> bool {
    attributes.any(|a| a.key == Key::from(key) && a.value == Value::from(value))
}

#[test]
fn test_counter_counts_instances_per_label_set() {
    // Given: instruments built from the derived specs
    let (provider, exporter) = provider();
    let rules = rules();
    let instruments =
        OtelInstruments::builder(provider.meter("test_meter")).build(rules.all_specs()).unwrap();
    assert_eq!(instruments.len(), 3);

    // When: several request payloads are evaluated and recorded
    for payload in [r#"{ "model": "a" }"#, r#"{ "model": "b" }"#, r#"{ "model": "a" }"#] {
        let evaluation = rules.evaluate(Context::Input, payload).unwrap();
        assert_eq!(instruments.record(&evaluation), 0);
    }
    provider.force_flush().unwrap();

    // Then: one data point per label set
    let metrics = exporter.get_finished_metrics().unwrap();
    let requests = find_metric(&metrics, "requests");
    assert_eq!(requests.unit(), "count");

    let AggregatedMetrics::U64(metric_data) = requests.data() else {
        panic!("Counter should be U64");
    };
    let MetricData::Sum(sum) = metric_data else {
        panic!("Counter should be Sum");
    };

    let data_points: Vec<_> = sum.data_points().collect();
    assert_eq!(data_points.len(), 2, "Should have 2 data points for different models");

    let point_a = data_points
        .iter()
        .find(|dp| has_attribute(dp.attributes(), "model", "a"))
        .expect("Should have model=a data point");
    assert_eq!(point_a.value(), 2);

    let point_b = data_points
        .iter()
        .find(|dp| has_attribute(dp.attributes(), "model", "b"))
        .expect("Should have model=b data point");
    assert_eq!(point_b.value(), 1);
}

#[test]
fn test_values_are_recorded_in_histograms() {
    // Given: instruments with custom bounds and a description
    let (provider, exporter) = provider();
    let rules = rules();
    let instruments = OtelInstruments::builder(provider.meter("test_meter"))
        .with_histogram_bounds("prediction", vec![0.25, 0.5, 0.75])
        .with_description("prediction", "Model prediction")
        .build(rules.all_specs())
        .unwrap();

    // When: response payloads are evaluated and recorded
    for payload in [r#"{ "prediction": 0.495, "tokens": 12 }"#, r#"{ "prediction": 0.9 }"#] {
        let evaluation = rules.evaluate(Context::Output, payload).unwrap();
        instruments.record(&evaluation);
    }
    provider.force_flush().unwrap();

    // Then: float values land in the configured buckets with their labels
    let metrics = exporter.get_finished_metrics().unwrap();
    let prediction = find_metric(&metrics, "prediction");
    assert_eq!(prediction.description(), "Model prediction");

    let AggregatedMetrics::F64(metric_data) = prediction.data() else {
        panic!("Histogram should be F64");
    };
    let MetricData::Histogram(hist_data) = metric_data else {
        panic!("Should be Histogram type");
    };

    let point = hist_data.data_points().next().expect("Should have data point");
    assert_eq!(point.count(), 2);
    assert_eq!(point.sum(), 0.495 + 0.9);
    assert_eq!(point.bounds().collect::<Vec<_>>(), vec![0.25, 0.5, 0.75]);
    assert!(has_attribute(point.attributes(), "Application", "MetricRule"));

    // Then: integer values are recorded as floats
    let tokens = find_metric(&metrics, "tokens");
    let AggregatedMetrics::F64(MetricData::Histogram(hist_data)) = tokens.data() else {
        panic!("Integer values should be recorded in an F64 histogram");
    };
    let point = hist_data.data_points().next().expect("Should have data point");
    assert_eq!(point.count(), 1);
    assert_eq!(point.sum(), 12.0);
}

#[test]
fn test_unregistered_instances_are_dropped() {
    let (provider, _exporter) = provider();
    let registered = rules();
    let instruments = OtelInstruments::builder(provider.meter("test_meter"))
        .build(registered.all_specs())
        .unwrap();

    let other = MetricRules::new(
        SidecarConfig::new().with_input_metric(MetricConfig::simple_counter().with_name("other")),
    )
    .unwrap();
    let evaluation = other.evaluate(Context::Input, "{}").unwrap();

    assert!(!instruments
        .contains(&InstrumentSpec::new("other", InstrumentKind::Counter, ValueKind::Int64)));
    assert_eq!(instruments.record(&evaluation), 1);
}

#[test]
fn test_shared_instruments_across_contexts() {
    let (provider, _exporter) = provider();
    let rules = MetricRules::new(
        SidecarConfig::new()
            .with_input_metric(MetricConfig::simple_counter().with_name("events"))
            .with_output_metric(MetricConfig::simple_counter().with_name("events")),
    )
    .unwrap();

    let instruments =
        OtelInstruments::builder(provider.meter("test_meter")).build(rules.all_specs()).unwrap();
    assert_eq!(instruments.len(), 1);
}

#[test]
fn test_conflicting_instruments_across_contexts() {
    let (provider, _exporter) = provider();
    let rules = MetricRules::new(
        SidecarConfig::new()
            .with_input_metric(MetricConfig::simple_counter().with_name("events"))
            .with_output_metric(
                MetricConfig::parsed_value(FieldPath::new(["n"]), ParsedType::Int)
                    .with_name("events"),
            ),
    )
    .unwrap();

    let result = OtelInstruments::builder(provider.meter("test_meter")).build(rules.all_specs());
    let Err(RegisterError::ConflictingInstrument { existing, conflicting }) = result else {
        panic!("Conflicting shapes should be rejected");
    };
    assert_eq!(existing.instrument_kind(), InstrumentKind::Counter);
    assert_eq!(conflicting.instrument_kind(), InstrumentKind::ValueRecorder);
}

#[test]
fn test_invalid_histogram_bounds_are_rejected() {
    let (provider, _exporter) = provider();
    let rules = rules();

    let result = OtelInstruments::builder(provider.meter("test_meter"))
        .with_histogram_bounds("prediction", vec![0.5, 0.25])
        .build(rules.all_specs());
    assert!(matches!(
        result,
        Err(RegisterError::InvalidHistogramBounds { ref name, .. }) if name == "prediction"
    ));
}

#[test]
fn test_histogram_bounds_on_a_counter_are_ignored() {
    // Given: bounds, even invalid ones, configured for a counter
    let (provider, exporter) = provider();
    let rules = rules();
    let instruments = OtelInstruments::builder(provider.meter("test_meter"))
        .with_histogram_bounds("requests", vec![10.0, 1.0])
        .build(rules.all_specs())
        .unwrap();

    // When: a request payload is recorded
    let evaluation = rules.evaluate(Context::Input, r#"{ "model": "a" }"#).unwrap();
    assert_eq!(instruments.record(&evaluation), 0);
    provider.force_flush().unwrap();

    // Then: the instrument is still a counter
    let metrics = exporter.get_finished_metrics().unwrap();
    let AggregatedMetrics::U64(MetricData::Sum(sum)) = find_metric(&metrics, "requests").data()
    else {
        panic!("Counter should be a U64 Sum");
    };
    assert_eq!(sum.data_points().map(|dp| dp.value()).sum::<u64>(), 1);
}
