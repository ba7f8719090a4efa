//! Batched Bayesian search driver
//!
//! Proposes candidates in batches, evaluates every (candidate, fold) pair of
//! a batch in one parallel pass, and feeds mean fold scores back into the
//! sampler. Scores are maximized; callers hand in negated error metrics.
//! Any fold evaluation error aborts the whole search.

use rayon::prelude::*;
use tracing::debug;

use crate::error::{ForecastError, Result};
use crate::search::cv::{rolling_origin, TimeSlice};
use crate::search::sampler::{propose_batch, Sampler};
use crate::search::space::{SearchSpace, TrialParams};

/// One evaluated hyperparameter combination.
#[derive(Debug, Clone)]
pub struct TrialRecord {
    pub params: TrialParams,
    /// Mean validation score across folds (higher is better).
    pub score: f64,
}

/// Result of a completed search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best_params: TrialParams,
    pub best_score: f64,
    pub trials: Vec<TrialRecord>,
}

/// Drives a batched search over a space with rolling-origin validation.
#[derive(Debug, Clone)]
pub struct SearchDriver {
    budget: usize,
    batch: usize,
    n_folds: usize,
}

impl SearchDriver {
    pub fn new(budget: usize, batch: usize, n_folds: usize) -> Self {
        Self { budget, batch, n_folds }
    }

    /// Evaluate up to `budget` candidates against `n_rows` ordered training
    /// rows. `evaluate` scores one candidate on one fold; it runs on the
    /// rayon pool, so per-pair work must be self-contained.
    pub fn run<F>(
        &self,
        space: &SearchSpace,
        sampler: &mut dyn Sampler,
        n_rows: usize,
        evaluate: F,
    ) -> Result<SearchOutcome>
    where
        F: Fn(&TrialParams, &TimeSlice) -> Result<f64> + Sync,
    {
        if self.budget == 0 || self.batch == 0 {
            return Err(ForecastError::Search(
                "search budget and batch size must be positive".to_string(),
            ));
        }
        if space.is_empty() {
            return Err(ForecastError::Search(
                "search space has no parameters".to_string(),
            ));
        }
        let slices = rolling_origin(n_rows, self.n_folds)?;

        let mut history: Vec<(TrialParams, f64)> = Vec::with_capacity(self.budget);
        let mut trials = Vec::with_capacity(self.budget);
        let mut best: Option<(TrialParams, f64)> = None;

        let mut remaining = self.budget;
        let mut iteration = 0usize;
        while remaining > 0 {
            let batch_size = remaining.min(self.batch);
            let candidates = propose_batch(sampler, space, &history, batch_size);

            let pairs: Vec<(usize, &TimeSlice)> = (0..candidates.len())
                .flat_map(|ci| slices.iter().map(move |s| (ci, s)))
                .collect();
            let fold_scores: Vec<(usize, f64)> = pairs
                .par_iter()
                .map(|&(ci, slice)| {
                    let score = evaluate(&candidates[ci], slice).map_err(|e| {
                        ForecastError::Search(format!(
                            "candidate {ci} failed on fold {}: {e}",
                            slice.fold
                        ))
                    })?;
                    Ok((ci, score))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut sums = vec![0.0f64; candidates.len()];
            for (ci, score) in fold_scores {
                sums[ci] += score;
            }
            for (ci, candidate) in candidates.into_iter().enumerate() {
                let score = sums[ci] / slices.len() as f64;
                if !score.is_finite() {
                    return Err(ForecastError::Search(format!(
                        "candidate {ci} produced a non-finite validation score"
                    )));
                }
                let better = match &best {
                    Some((_, s)) => score > *s,
                    None => true,
                };
                if better {
                    best = Some((candidate.clone(), score));
                }
                history.push((candidate.clone(), score));
                trials.push(TrialRecord { params: candidate, score });
            }

            iteration += 1;
            remaining -= batch_size;
            if let Some((_, score)) = &best {
                debug!(iteration, evaluated = trials.len(), best_score = score, "search batch done");
            }
        }

        let (best_params, best_score) = best.ok_or_else(|| {
            ForecastError::Search("search finished without evaluating a candidate".to_string())
        })?;
        Ok(SearchOutcome { best_params, best_score, trials })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::sampler::RandomSampler;
    use crate::search::space::{Parameter, ParameterValue};

    fn space() -> SearchSpace {
        SearchSpace::new().with(Parameter::float_range("x", 0.0, 10.0))
    }

    fn quadratic(params: &TrialParams, _slice: &TimeSlice) -> Result<f64> {
        let x = params["x"].as_f64().unwrap();
        Ok(-(x - 7.0) * (x - 7.0))
    }

    #[test]
    fn test_budget_is_exhausted_exactly() {
        let driver = SearchDriver::new(13, 5, 3);
        let mut sampler = RandomSampler::new(1);
        let outcome = driver.run(&space(), &mut sampler, 100, quadratic).unwrap();
        assert_eq!(outcome.trials.len(), 13);
    }

    #[test]
    fn test_best_score_matches_best_trial() {
        let driver = SearchDriver::new(20, 5, 4);
        let mut sampler = RandomSampler::new(2);
        let outcome = driver.run(&space(), &mut sampler, 60, quadratic).unwrap();
        let max = outcome
            .trials
            .iter()
            .map(|t| t.score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(outcome.best_score, max);
        let x = outcome.best_params["x"].as_f64().unwrap();
        assert!((x - 7.0).abs() < 3.0);
    }

    #[test]
    fn test_fold_error_aborts_search() {
        let driver = SearchDriver::new(10, 5, 3);
        let mut sampler = RandomSampler::new(3);
        let result = driver.run(&space(), &mut sampler, 40, |_, slice| {
            if slice.fold == 1 {
                Err(ForecastError::Data("hole in validation block".to_string()))
            } else {
                Ok(0.0)
            }
        });
        match result {
            Err(ForecastError::Search(msg)) => assert!(msg.contains("fold 1")),
            other => panic!("expected search failure, got {other:?}"),
        }
    }

    #[test]
    fn test_same_seed_reproduces_outcome() {
        let driver = SearchDriver::new(15, 5, 3);
        let mut a = RandomSampler::new(42);
        let mut b = RandomSampler::new(42);
        let out_a = driver.run(&space(), &mut a, 50, quadratic).unwrap();
        let out_b = driver.run(&space(), &mut b, 50, quadratic).unwrap();
        assert_eq!(out_a.best_score, out_b.best_score);
        assert_eq!(out_a.best_params, out_b.best_params);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let driver = SearchDriver::new(0, 5, 3);
        let mut sampler = RandomSampler::new(7);
        assert!(driver.run(&space(), &mut sampler, 50, quadratic).is_err());
    }

    #[test]
    fn test_non_finite_score_rejected() {
        let driver = SearchDriver::new(5, 5, 2);
        let mut sampler = RandomSampler::new(8);
        let result = driver.run(&space(), &mut sampler, 30, |_, _| Ok(f64::NAN));
        assert!(matches!(result, Err(ForecastError::Search(_))));
    }

    #[test]
    fn test_params_feed_back_into_history() {
        struct CountingSampler {
            inner: RandomSampler,
            seen: usize,
        }
        impl Sampler for CountingSampler {
            fn propose(
                &mut self,
                space: &SearchSpace,
                history: &[(TrialParams, f64)],
            ) -> TrialParams {
                self.seen = self.seen.max(history.len());
                let mut p = self.inner.propose(space, history);
                p.insert("x".into(), ParameterValue::Float(1.0));
                p
            }
        }
        let driver = SearchDriver::new(10, 5, 2);
        let mut sampler = CountingSampler {
            inner: RandomSampler::new(9),
            seen: 0,
        };
        driver.run(&space(), &mut sampler, 30, quadratic).unwrap();
        // The second batch must see the first batch's five results.
        assert_eq!(sampler.seen, 5);
    }
}
