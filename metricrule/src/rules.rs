//! Validated configurations, compiled once and shared across evaluations.
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::info;

use crate::config::{Context, SidecarConfig};
use crate::error::{ConfigError, PayloadParseError};
use crate::evaluate::{evaluate_metric, parse_payload, Evaluation};
use crate::spec::{derive_context, InstrumentSpec, InstrumentSpecs};

/// A validated configuration, ready to evaluate payloads.
///
/// Construction derives every instrument the configuration can produce and fails on any invalid
/// metric definition, so a [`MetricRules`] can only exist for a configuration that is safe to
/// deploy. The derived instruments are cached for the lifetime of the rules and reused by every
/// evaluation.
///
/// Clone is shallow; clones share the same underlying configuration. Evaluation never mutates
/// shared state, so a single instance can serve any number of concurrent requests.
///
/// ```rust
/// # use metricrule::{Context, MetricRules, MetricValue};
/// let rules = MetricRules::from_json_str(r#"{
///     "input_metrics": [{ "name": "requests", "simple_counter": {} }]
/// }"#).expect("valid configuration");
///
/// assert_eq!(rules.specs(Context::Input).len(), 1);
///
/// let evaluation = rules.evaluate(Context::Input, "{}").expect("valid payload");
/// assert_eq!(evaluation.instance_count(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct MetricRules {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: SidecarConfig,
    specs: InstrumentSpecs,
    // Spec of each metric definition, aligned with the configuration.
    input: Vec<InstrumentSpec>,
    output: Vec<InstrumentSpec>,
}

impl MetricRules {
    /// Validates `config` and derives its instruments.
    ///
    /// # Errors
    ///
    /// Fails if any metric definition is invalid. See [`derive_specs`](crate::derive_specs).
    pub fn new(config: SidecarConfig) -> Result<Self, ConfigError> {
        let input = derive_context(config.metrics(Context::Input), Context::Input)?;
        let output = derive_context(config.metrics(Context::Output), Context::Output)?;

        info!(
            input_metrics = config.input_metrics.len(),
            input_instruments = input.specs.len(),
            output_metrics = config.output_metrics.len(),
            output_instruments = output.specs.len(),
            "Compiled metric rules."
        );

        let specs = InstrumentSpecs::from_parts(input.specs, output.specs);
        let inner = Inner { config, specs, input: input.per_metric, output: output.per_metric };
        Ok(MetricRules { inner: Arc::new(inner) })
    }

    /// Parses and validates a configuration from its JSON form.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Self::new(SidecarConfig::from_json_str(s)?)
    }

    /// Reads, parses and validates a configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::new(SidecarConfig::from_path(path)?)
    }

    /// The validated configuration.
    pub fn config(&self) -> &SidecarConfig {
        &self.inner.config
    }

    /// Distinct instruments the given context can produce.
    pub fn specs(&self, context: Context) -> &IndexSet<InstrumentSpec> {
        self.inner.specs.get(context)
    }

    /// Distinct instruments of both contexts.
    pub fn all_specs(&self) -> &InstrumentSpecs {
        &self.inner.specs
    }

    /// Evaluates the metrics of `context` against `payload`.
    ///
    /// Behaves like [`evaluate`](crate::evaluate), but reuses the instruments derived at
    /// construction instead of reducing every definition again.
    ///
    /// # Errors
    ///
    /// Fails only if `payload` is not valid JSON.
    pub fn evaluate(
        &self,
        context: Context,
        payload: &str,
    ) -> Result<Evaluation, PayloadParseError> {
        let document = parse_payload(context, payload)?;

        let specs = match context {
            Context::Input => &self.inner.input,
            Context::Output => &self.inner.output,
        };

        let mut evaluation = Evaluation::new(context);
        let metrics = self.inner.config.metrics(context);
        for (index, (metric, spec)) in metrics.iter().zip(specs).enumerate() {
            let result =
                evaluate_metric(metric, &document).map(|instance| (spec.clone(), instance));
            evaluation.push(index, metric, result);
        }
        Ok(evaluation)
    }
}
