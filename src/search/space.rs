//! Hyperparameter search domains
//!
//! A [`SearchSpace`] is an ordered set of named parameters, each with a
//! domain: a continuous range, a discrete numeric set, or a list of string
//! choices. Sampled combinations travel as [`TrialParams`] maps.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Domain of a single hyperparameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParameterDomain {
    /// Continuous range, optionally sampled on a log scale.
    FloatRange { low: f64, high: f64, log_scale: bool },
    /// Inclusive integer range.
    IntRange { low: i64, high: i64 },
    /// Discrete set of float values.
    FloatSet(Vec<f64>),
    /// Discrete set of integer values.
    IntSet(Vec<i64>),
    /// Categorical string choices.
    Choice(Vec<String>),
}

/// A named parameter and its domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub domain: ParameterDomain,
}

impl Parameter {
    pub fn float_range(name: &str, low: f64, high: f64) -> Self {
        Self {
            name: name.to_string(),
            domain: ParameterDomain::FloatRange { low, high, log_scale: false },
        }
    }

    pub fn log_float_range(name: &str, low: f64, high: f64) -> Self {
        Self {
            name: name.to_string(),
            domain: ParameterDomain::FloatRange { low, high, log_scale: true },
        }
    }

    pub fn int_range(name: &str, low: i64, high: i64) -> Self {
        Self {
            name: name.to_string(),
            domain: ParameterDomain::IntRange { low, high },
        }
    }

    pub fn float_set(name: &str, values: &[f64]) -> Self {
        Self {
            name: name.to_string(),
            domain: ParameterDomain::FloatSet(values.to_vec()),
        }
    }

    pub fn int_set(name: &str, values: &[i64]) -> Self {
        Self {
            name: name.to_string(),
            domain: ParameterDomain::IntSet(values.to_vec()),
        }
    }

    pub fn choice(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            domain: ParameterDomain::Choice(values.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Draw one value from this parameter's domain.
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.domain {
            ParameterDomain::FloatRange { low, high, log_scale } => {
                let value = if *log_scale && *low > 0.0 {
                    rng.gen_range(low.ln()..=high.ln()).exp()
                } else {
                    rng.gen_range(*low..=*high)
                };
                ParameterValue::Float(value)
            }
            ParameterDomain::IntRange { low, high } => {
                ParameterValue::Int(rng.gen_range(*low..=*high))
            }
            ParameterDomain::FloatSet(values) => {
                ParameterValue::Float(values[rng.gen_range(0..values.len())])
            }
            ParameterDomain::IntSet(values) => {
                ParameterValue::Int(values[rng.gen_range(0..values.len())])
            }
            ParameterDomain::Choice(values) => {
                ParameterValue::Text(values[rng.gen_range(0..values.len())].clone())
            }
        }
    }

    /// Width used to normalize distances between two values of this
    /// parameter; 1.0 for categorical domains.
    pub fn span(&self) -> f64 {
        match &self.domain {
            ParameterDomain::FloatRange { low, high, .. } => (high - low).abs().max(f64::MIN_POSITIVE),
            ParameterDomain::IntRange { low, high } => ((high - low).abs() as f64).max(1.0),
            ParameterDomain::FloatSet(values) => {
                let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                (max - min).abs().max(f64::MIN_POSITIVE)
            }
            ParameterDomain::IntSet(values) => {
                let min = values.iter().min().copied().unwrap_or(0);
                let max = values.iter().max().copied().unwrap_or(1);
                ((max - min).abs() as f64).max(1.0)
            }
            ParameterDomain::Choice(_) => 1.0,
        }
    }
}

/// A sampled hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            ParameterValue::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|v| usize::try_from(v).ok())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{v}"),
            ParameterValue::Int(v) => write!(f, "{v}"),
            ParameterValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// One sampled hyperparameter combination.
pub type TrialParams = HashMap<String, ParameterValue>;

/// Ordered collection of parameters defining the search domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Draw one full combination, visiting parameters in declaration order.
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn space() -> SearchSpace {
        SearchSpace::new()
            .with(Parameter::int_set("depth", &[2, 4, 6]))
            .with(Parameter::float_set("rate", &[0.1, 0.01]))
            .with(Parameter::choice("objective", &["squared_error", "poisson"]))
            .with(Parameter::float_range("sub", 0.3, 0.9))
    }

    #[test]
    fn test_sample_covers_all_parameters() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let params = space().sample(&mut rng);
        assert_eq!(params.len(), 4);
        assert!(params.contains_key("depth"));
        assert!(params.contains_key("objective"));
    }

    #[test]
    fn test_sampled_values_stay_in_domain() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let space = space();
        for _ in 0..50 {
            let params = space.sample(&mut rng);
            let depth = params["depth"].as_i64().unwrap();
            assert!([2, 4, 6].contains(&depth));
            let sub = params["sub"].as_f64().unwrap();
            assert!((0.3..=0.9).contains(&sub));
            let obj = params["objective"].as_str().unwrap();
            assert!(obj == "squared_error" || obj == "poisson");
        }
    }

    #[test]
    fn test_seeded_sampling_is_deterministic() {
        let space = space();
        let mut a = Xoshiro256PlusPlus::seed_from_u64(9);
        let mut b = Xoshiro256PlusPlus::seed_from_u64(9);
        for _ in 0..10 {
            assert_eq!(space.sample(&mut a), space.sample(&mut b));
        }
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(ParameterValue::Int(4).as_usize(), Some(4));
        assert_eq!(ParameterValue::Float(0.5).as_f64(), Some(0.5));
        assert_eq!(ParameterValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(ParameterValue::Float(3.5).as_i64(), None);
        assert!(ParameterValue::Text("a".into()).as_f64().is_none());
    }
}
