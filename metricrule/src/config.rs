//! Declarative metric configuration.
//!
//! A [`SidecarConfig`] holds one ordered list of [`MetricConfig`] entries per [`Context`]. It is
//! loaded once at startup and never mutated afterwards; every other part of the crate only reads
//! from it.
//!
//! The serialized form mirrors the field names of the sidecar's configuration schema:
//!
//! ```rust
//! # use metricrule::{Context, SidecarConfig};
//! let config = SidecarConfig::from_json_str(r#"{
//!     "output_metrics": [{
//!         "name": "prediction",
//!         "value": { "parsed_value": {
//!             "field_path": { "paths": ["prediction"] },
//!             "parsed_type": "FLOAT"
//!         } }
//!     }]
//! }"#).expect("valid configuration");
//!
//! assert_eq!(config.metrics(Context::Output).len(), 1);
//! assert!(config.metrics(Context::Input).is_empty());
//! ```
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which side of a request/response exchange a metric applies to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Context {
    /// The request sent to the model server.
    Input,
    /// The response returned by the model server.
    Output,
}

impl Context {
    /// Both contexts, in evaluation order.
    pub const ALL: [Context; 2] = [Context::Input, Context::Output];

    /// Short lowercase name of this context, suitable for use as a label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Input => "input",
            Context::Output => "output",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered key sequence addressing a nested value inside a JSON object.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldPath {
    paths: Vec<String>,
}

impl FieldPath {
    /// Creates a [`FieldPath`] from an ordered sequence of object keys.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldPath { paths: segments.into_iter().map(Into::into).collect() }
    }

    /// Segments of this path.
    pub fn segments(&self) -> &[String] {
        &self.paths
    }

    /// Whether or not this path has no segments.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub(crate) fn validate(&self, metric: &str) -> Result<(), ConfigError> {
        if self.paths.is_empty() {
            return Err(ConfigError::EmptyFieldPath { metric: metric.to_string() });
        }
        if let Some(position) = self.paths.iter().position(String::is_empty) {
            return Err(ConfigError::EmptyPathSegment {
                metric: metric.to_string(),
                path: self.clone(),
                position,
            });
        }
        Ok(())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.paths.join("."))
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        FieldPath::new(iter)
    }
}

/// Primitive type a parsed field is declared as.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParsedType {
    /// 64-bit floating point.
    Float,
    /// 64-bit signed integer.
    Int,
    /// Plain string. Only meaningful for labels.
    #[default]
    String,
}

impl ParsedType {
    /// Whether or not a metric value can be backed by this type.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ParsedType::Float | ParsedType::Int)
    }
}

impl fmt::Display for ParsedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParsedType::Float => "FLOAT",
            ParsedType::Int => "INT",
            ParsedType::String => "STRING",
        };
        f.write_str(s)
    }
}

/// A field extracted from the payload and interpreted as a declared type.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParsedValue {
    /// Location of the field inside the payload.
    pub field_path: FieldPath,
    /// Declared type of the field.
    #[serde(default)]
    pub parsed_type: ParsedType,
}

impl ParsedValue {
    /// Creates a [`ParsedValue`] from a path and a declared type.
    pub fn new(field_path: FieldPath, parsed_type: ParsedType) -> Self {
        ParsedValue { field_path, parsed_type }
    }
}

/// Where a metric's value comes from.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// The value is extracted from the payload.
    ParsedValue(ParsedValue),
}

/// Marker for a counter that is incremented once per evaluation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleCounter {}

/// Kind of a metric definition.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricKind {
    /// Counts evaluations; independent of the payload.
    SimpleCounter(SimpleCounter),
    /// Records a value parsed out of the payload.
    Value(ValueSource),
}

impl MetricKind {
    /// The parsed value backing this metric, if any.
    pub fn parsed_value(&self) -> Option<&ParsedValue> {
        match self {
            MetricKind::SimpleCounter(_) => None,
            MetricKind::Value(ValueSource::ParsedValue(parsed)) => Some(parsed),
        }
    }
}

/// One side of a label: a literal string or a field extracted from the payload.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// A literal string.
    StringValue(String),
    /// A field extracted from the payload and converted to a string.
    ParsedValue(ParsedValue),
}

impl LabelSource {
    /// Creates a field-derived [`LabelSource`] read as a string.
    pub fn field<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LabelSource::ParsedValue(ParsedValue::new(FieldPath::new(segments), ParsedType::String))
    }

    /// Whether or not this source is a literal string.
    pub fn is_literal(&self) -> bool {
        matches!(self, LabelSource::StringValue(_))
    }
}

impl From<&str> for LabelSource {
    fn from(s: &str) -> Self {
        LabelSource::StringValue(s.to_string())
    }
}

impl From<String> for LabelSource {
    fn from(s: String) -> Self {
        LabelSource::StringValue(s)
    }
}

/// A label definition.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LabelConfig {
    /// Source of the label key.
    pub label_key: LabelSource,
    /// Source of the label value.
    pub label_value: LabelSource,
}

impl LabelConfig {
    /// Creates a [`LabelConfig`] from a key source and a value source.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<LabelSource>,
        V: Into<LabelSource>,
    {
        LabelConfig { label_key: key.into(), label_value: value.into() }
    }
}

/// One metric definition.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "RawMetricConfig", into = "RawMetricConfig")]
pub struct MetricConfig {
    /// Human-readable name, used as the instrument name when present.
    pub name: Option<String>,
    /// What the metric measures.
    pub kind: MetricKind,
    /// Labels attached to every observation, in order.
    pub labels: Vec<LabelConfig>,
}

/// Serialized form of [`MetricConfig`]: the metric kind is a one-of over sibling fields.
#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawMetricConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    simple_counter: Option<SimpleCounter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    labels: Vec<LabelConfig>,
}

impl TryFrom<RawMetricConfig> for MetricConfig {
    type Error = String;

    fn try_from(raw: RawMetricConfig) -> Result<Self, Self::Error> {
        let kind = match (raw.simple_counter, raw.value) {
            (Some(counter), None) => MetricKind::SimpleCounter(counter),
            (None, Some(value)) => MetricKind::Value(value),
            (Some(_), Some(_)) => {
                return Err("metric sets both `simple_counter` and `value`".to_string())
            }
            (None, None) => {
                return Err("metric must set one of `simple_counter` or `value`".to_string())
            }
        };
        Ok(MetricConfig { name: raw.name, kind, labels: raw.labels })
    }
}

impl From<MetricConfig> for RawMetricConfig {
    fn from(metric: MetricConfig) -> Self {
        let (simple_counter, value) = match metric.kind {
            MetricKind::SimpleCounter(counter) => (Some(counter), None),
            MetricKind::Value(value) => (None, Some(value)),
        };
        RawMetricConfig { name: metric.name, simple_counter, value, labels: metric.labels }
    }
}

impl MetricConfig {
    /// Creates a counter incremented once per evaluation.
    pub fn simple_counter() -> Self {
        MetricConfig {
            name: None,
            kind: MetricKind::SimpleCounter(SimpleCounter {}),
            labels: Vec::new(),
        }
    }

    /// Creates a value metric read from `field_path` and interpreted as `parsed_type`.
    pub fn parsed_value(field_path: FieldPath, parsed_type: ParsedType) -> Self {
        MetricConfig {
            name: None,
            kind: MetricKind::Value(ValueSource::ParsedValue(ParsedValue::new(
                field_path,
                parsed_type,
            ))),
            labels: Vec::new(),
        }
    }

    /// Sets the name of this metric.
    pub fn with_name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a label to this metric.
    pub fn with_label<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<LabelSource>,
        V: Into<LabelSource>,
    {
        self.labels.push(LabelConfig::new(key, value));
        self
    }

    /// Configured name, ignoring empty strings.
    pub fn configured_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// Name used in diagnostics: the configured name or the default for `context`.
    pub(crate) fn display_name(&self, context: Context) -> String {
        match self.configured_name() {
            Some(name) => name.to_string(),
            None => self.default_name(context),
        }
    }

    /// Name of an unnamed metric, unique per context and instrument shape.
    pub(crate) fn default_name(&self, context: Context) -> String {
        match &self.kind {
            MetricKind::SimpleCounter(_) => format!("{}_simple_counter", context.as_str()),
            MetricKind::Value(ValueSource::ParsedValue(parsed)) => {
                let parsed_type = match parsed.parsed_type {
                    ParsedType::Float => "float",
                    ParsedType::Int => "int",
                    ParsedType::String => "string",
                };
                format!("{}_parsed_value_{}", context.as_str(), parsed_type)
            }
        }
    }
}

/// Complete sidecar metric configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SidecarConfig {
    /// Metrics evaluated against request payloads.
    #[serde(default)]
    pub input_metrics: Vec<MetricConfig>,
    /// Metrics evaluated against response payloads.
    #[serde(default)]
    pub output_metrics: Vec<MetricConfig>,
}

impl SidecarConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a metric evaluated against request payloads.
    pub fn with_input_metric(mut self, metric: MetricConfig) -> Self {
        self.input_metrics.push(metric);
        self
    }

    /// Appends a metric evaluated against response payloads.
    pub fn with_output_metric(mut self, metric: MetricConfig) -> Self {
        self.output_metrics.push(metric);
        self
    }

    /// Metric definitions for the given context, in configuration order.
    pub fn metrics(&self, context: Context) -> &[MetricConfig] {
        match context {
            Context::Input => &self.input_metrics,
            Context::Output => &self.output_metrics,
        }
    }

    /// Parses a configuration from its JSON form.
    ///
    /// This only checks that the document is well-formed; semantic validation happens when
    /// instrument specs are derived.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Parse)
    }

    /// Parses a configuration from a reader yielding its JSON form.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        serde_json::from_reader(reader).map_err(ConfigError::Parse)
    }

    /// Reads and parses a configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_reader(BufReader::new(file))
    }
}

impl FromStr for SidecarConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json_str(s)
    }
}
