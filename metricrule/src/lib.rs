//! Derives typed, labeled metric observations from JSON payloads.
//!
//! `metricrule` is the engine of a metrics sidecar sitting next to a model server. Operators
//! describe, in a [`SidecarConfig`], which metrics to derive from inbound requests and outbound
//! responses. The engine then does two things:
//!
//! - at startup, [`derive_specs`] computes every instrument the configuration can produce, so a
//!   metrics backend can register them before any traffic arrives
//! - per payload, [`evaluate`] walks the configured metric definitions in order and produces the
//!   concrete measurements for that payload, grouped by instrument
//!
//! # Metric definitions
//!
//! Each [`MetricConfig`] is either a **simple counter**, which counts one event per payload, or a
//! **parsed value**, which extracts a field from the payload along a [`FieldPath`], coerces it to
//! the declared [`ParsedType`] and records it. Labels are attached from [`LabelConfig`]s whose keys
//! and values are either literals or fields of the payload.
//!
//! A payload that does not match a definition (missing field, non-numeric value, unresolvable
//! label) only skips that definition for that payload. The reason is kept in
//! [`Evaluation::skipped`]; every other definition is still evaluated.
//!
//! # Example
//!
//! ```rust
//! use metricrule::{Context, InstrumentKind, MetricRules, MetricValue};
//!
//! let rules = MetricRules::from_json_str(r#"{
//!     "input_metrics": [{
//!         "name": "requests",
//!         "simple_counter": {},
//!         "labels": [{
//!             "label_key": { "string_value": "Application" },
//!             "label_value": { "string_value": "MetricRule" }
//!         }]
//!     }],
//!     "output_metrics": [{
//!         "name": "prediction",
//!         "value": {
//!             "parsed_value": { "field_path": { "paths": ["prediction"] }, "parsed_type": "FLOAT" }
//!         }
//!     }]
//! }"#).expect("valid configuration");
//!
//! let evaluation = rules
//!     .evaluate(Context::Output, r#"{ "prediction": 0.495 }"#)
//!     .expect("valid payload");
//!
//! let (spec, instances) = evaluation.iter().next().expect("one instrument");
//! assert_eq!(spec.name(), "prediction");
//! assert_eq!(spec.instrument_kind(), InstrumentKind::ValueRecorder);
//! assert_eq!(instances[0].value(), MetricValue::Float64(0.495));
//! ```
//!
//! # Recording
//!
//! The engine only computes measurements. With the `facade` feature (enabled by default), the
//! [`facade`] module records evaluations through any [`metrics`] recorder; the
//! `metricrule-exporter-otel` crate records them directly into OpenTelemetry instruments.
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![deny(missing_docs)]

mod coerce;
pub use self::coerce::coerce;

mod config;
pub use self::config::{
    Context, FieldPath, LabelConfig, LabelSource, MetricConfig, MetricKind, ParsedType,
    ParsedValue, SidecarConfig, SimpleCounter, ValueSource,
};

mod error;
pub use self::error::{
    CoercionError, ConfigError, LabelError, LabelSide, MetricError, MissingField,
    PayloadParseError,
};

mod evaluate;
pub use self::evaluate::{evaluate, Evaluation, MetricInstance, MetricValue, SkippedMetric};

mod extract;
pub use self::extract::extract;

mod label;
pub use self::label::build_labels;

mod rules;
pub use self::rules::MetricRules;

mod spec;
pub use self::spec::{derive_specs, InstrumentKind, InstrumentSpec, InstrumentSpecs, ValueKind};

#[cfg(feature = "facade")]
#[cfg_attr(docsrs, doc(cfg(feature = "facade")))]
pub mod facade;
