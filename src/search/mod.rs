//! Hyperparameter search: spaces, samplers, folds, and the batched driver.

pub mod bayes;
pub mod cv;
pub mod sampler;
pub mod space;

pub use bayes::{SearchDriver, SearchOutcome, TrialRecord};
pub use cv::{rolling_origin, TimeSlice};
pub use sampler::{RandomSampler, Sampler, TpeSampler};
pub use space::{Parameter, ParameterDomain, ParameterValue, SearchSpace, TrialParams};
