use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::{Context, FieldPath, ParsedType};
use crate::spec::InstrumentSpec;

/// Errors in the configuration itself.
///
/// These are detected once, before any traffic is served, and are fatal: a configuration that
/// cannot produce valid instruments must not be deployed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not well-formed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[source] serde_json::Error),

    /// The configuration file could not be read.
    #[error("failed to read configuration from {}: {source}", .path.display())]
    Io {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A value metric declares a type that cannot back a metric value.
    #[error("metric `{metric}` declares a {parsed_type} value, but only FLOAT and INT can back a metric")]
    NonNumericValue {
        /// Name of the offending metric.
        metric: String,
        /// Declared type.
        parsed_type: ParsedType,
    },

    /// A field path has no segments.
    #[error("metric `{metric}` has an empty field path")]
    EmptyFieldPath {
        /// Name of the offending metric.
        metric: String,
    },

    /// A field path contains an empty segment.
    #[error("metric `{metric}` has an empty segment at position {position} of field path `{path}`")]
    EmptyPathSegment {
        /// Name of the offending metric.
        metric: String,
        /// The offending path.
        path: FieldPath,
        /// Index of the empty segment.
        position: usize,
    },

    /// Two metrics in the same context share a name but not an instrument shape.
    #[error("instrument `{}` in the {context} context is declared as both {existing} and {conflicting}", .existing.name())]
    ConflictingInstrument {
        /// Context both metrics belong to.
        context: Context,
        /// Spec derived from the first metric with this name.
        existing: InstrumentSpec,
        /// Spec derived from the later metric.
        conflicting: InstrumentSpec,
    },
}

/// A field path that does not resolve against a payload.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("field path `{path}` does not resolve at segment {position}")]
pub struct MissingField {
    /// The path that was being resolved.
    pub path: FieldPath,
    /// Index of the first segment that could not be resolved.
    pub position: usize,
}

/// A resolved value that cannot be converted to its declared type.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CoercionError {
    /// The declared type cannot back a metric value.
    #[error("type {0} cannot back a metric value")]
    NotNumeric(ParsedType),

    /// The JSON value is of a kind that never converts to a number.
    #[error("cannot convert a JSON {found} to {expected}")]
    UnsupportedValue {
        /// Declared type.
        expected: ParsedType,
        /// Kind of JSON value found.
        found: &'static str,
    },

    /// A string does not parse as the declared type.
    #[error("string {value:?} does not parse as {expected}")]
    InvalidString {
        /// Declared type.
        expected: ParsedType,
        /// The offending string.
        value: String,
    },

    /// A value declared as `INT` has a fractional part.
    #[error("value {0} has a fractional part and cannot be an INT")]
    Fractional(f64),

    /// A value declared as `INT` only exists as a float too large to hold it exactly.
    #[error("value {0} is beyond 2^53 and cannot be read as an exact INT")]
    Inexact(f64),

    /// A value declared as `INT` does not fit in 64 bits.
    #[error("value {0} does not fit in a 64-bit signed integer")]
    OutOfRange(String),
}

/// Which half of a label failed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LabelSide {
    /// The label key.
    Key,
    /// The label value.
    Value,
}

impl fmt::Display for LabelSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelSide::Key => f.write_str("key"),
            LabelSide::Value => f.write_str("value"),
        }
    }
}

/// A label key or value that cannot be resolved to a string.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum LabelError {
    /// The label's field path does not resolve.
    #[error("label {index} {side}: {source}")]
    Missing {
        /// Position of the label in the metric's label list.
        index: usize,
        /// Failing half of the label.
        side: LabelSide,
        /// Resolution failure.
        #[source]
        source: MissingField,
    },

    /// The label's field resolved to something that has no string form.
    #[error("label {index} {side}: field `{path}` is a JSON {found}, not a scalar")]
    NotScalar {
        /// Position of the label in the metric's label list.
        index: usize,
        /// Failing half of the label.
        side: LabelSide,
        /// Path of the field.
        path: FieldPath,
        /// Kind of JSON value found.
        found: &'static str,
    },

    /// The label's field declares a numeric type and could not be converted.
    #[error("label {index} {side}: {source}")]
    Coercion {
        /// Position of the label in the metric's label list.
        index: usize,
        /// Failing half of the label.
        side: LabelSide,
        /// Conversion failure.
        #[source]
        source: CoercionError,
    },
}

/// Why a single metric definition produced no instance for one evaluation.
#[derive(Debug, Error)]
pub enum MetricError {
    /// The metric's value field is absent from the payload.
    #[error(transparent)]
    MissingField(#[from] MissingField),

    /// The metric's value field cannot be converted to its declared type.
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// One of the metric's labels cannot be built.
    #[error(transparent)]
    Label(#[from] LabelError),

    /// The metric definition itself is invalid.
    ///
    /// Only reachable when evaluating a configuration that was never validated.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MetricError {
    /// Stable, low-cardinality name of this error kind.
    pub fn reason(&self) -> &'static str {
        match self {
            MetricError::MissingField(_) => "missing_field",
            MetricError::Coercion(_) => "coercion",
            MetricError::Label(_) => "label",
            MetricError::Config(_) => "config",
        }
    }
}

/// The payload of an evaluation is not valid JSON.
#[derive(Debug, Error)]
#[error("{context} payload is not valid JSON: {source}")]
pub struct PayloadParseError {
    /// Context the payload was evaluated for.
    pub context: Context,
    /// Parser failure.
    #[source]
    pub source: serde_json::Error,
}

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
