use std::collections::HashMap;

use metricrule::{InstrumentKind, InstrumentSpec};

/// Per-instrument options supplied before the instruments are built.
#[derive(Clone, Debug, Default)]
pub struct InstrumentMetadata {
    descriptions: HashMap<String, String>,
    histogram_bounds: HashMap<String, Vec<f64>>,
}

impl InstrumentMetadata {
    pub fn set_description(&mut self, name: String, description: String) {
        self.descriptions.insert(name, description);
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.descriptions.get(name).map(String::as_str)
    }

    pub fn set_histogram_bounds(&mut self, name: String, bounds: Vec<f64>) {
        self.histogram_bounds.insert(name, bounds);
    }

    pub fn histogram_bounds(&self, name: &str) -> Option<&[f64]> {
        self.histogram_bounds.get(name).map(Vec::as_slice)
    }

    /// Options that have no effect on the instruments in `by_name`, with the reason, sorted by
    /// name.
    pub fn ignored_options<'a>(
        &'a self,
        by_name: &HashMap<&str, &InstrumentSpec>,
    ) -> Vec<(&'a str, &'static str)> {
        let mut ignored = Vec::new();
        for name in self.descriptions.keys() {
            if !by_name.contains_key(name.as_str()) {
                ignored.push((name.as_str(), "never derived"));
            }
        }
        for name in self.histogram_bounds.keys() {
            match by_name.get(name.as_str()) {
                None if !self.descriptions.contains_key(name) => {
                    ignored.push((name.as_str(), "never derived"))
                }
                Some(spec) if spec.instrument_kind() == InstrumentKind::Counter => {
                    ignored.push((name.as_str(), "histogram bounds on a counter"))
                }
                _ => {}
            }
        }
        ignored.sort_unstable();
        ignored
    }
}

/// Whether `bounds` are finite and strictly increasing.
pub fn valid_bounds(bounds: &[f64]) -> bool {
    bounds.iter().all(|b| b.is_finite()) && bounds.windows(2).all(|w| w[0] < w[1])
}
