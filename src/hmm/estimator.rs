//! State estimation from continuous readings.
//!
//! [`HmmEstimator`] couples a model with a [`Discretizer`] that maps raw
//! measurements onto observation symbols, then runs filtering and decoding
//! over the resulting sequence.

use super::model::Hmm;
use crate::error::{PlanError, Result};
use log::debug;

/// Maps a continuous reading onto an observation index.
pub trait Discretizer {
    /// Observation index for `value`.
    fn discretize(&self, value: f64) -> usize;

    /// Number of distinct indices produced, if known.
    ///
    /// When provided, [`HmmEstimator::new`] checks it against the model.
    fn bins(&self) -> Option<usize> {
        None
    }
}

impl<F> Discretizer for F
where
    F: Fn(f64) -> usize,
{
    fn discretize(&self, value: f64) -> usize {
        self(value)
    }
}

/// Bins readings by ascending cut points.
///
/// A value's bin is the number of cut points at or below it, so `n` cut
/// points produce `n + 1` bins.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Thresholds {
    cutoffs: Vec<f64>,
}

impl Thresholds {
    /// Cut points must be finite and strictly ascending.
    pub fn new(cutoffs: Vec<f64>) -> Result<Self> {
        if cutoffs.iter().any(|c| !c.is_finite()) {
            return Err(PlanError::InvalidConfig("thresholds must be finite".into()));
        }
        if cutoffs.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PlanError::InvalidConfig(
                "thresholds must be strictly ascending".into(),
            ));
        }
        Ok(Self { cutoffs })
    }

    pub fn cutoffs(&self) -> &[f64] {
        &self.cutoffs
    }
}

impl Discretizer for Thresholds {
    fn discretize(&self, value: f64) -> usize {
        self.cutoffs.partition_point(|&c| c <= value)
    }

    fn bins(&self) -> Option<usize> {
        Some(self.cutoffs.len() + 1)
    }
}

/// Result of [`HmmEstimator::estimate`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Estimate {
    /// Most likely state after the last reading.
    pub current_state: String,
    pub current_index: usize,

    /// Filtering posterior over states after the last reading.
    pub posterior: Vec<f64>,

    /// Viterbi path, by state name.
    pub path: Vec<String>,
    pub path_indices: Vec<usize>,

    /// Posterior mass of `current_state`.
    pub confidence: f64,

    /// ln P(observations); `-inf` if the readings are impossible.
    pub log_likelihood: f64,

    /// Observation indices the readings were mapped to.
    pub observations: Vec<usize>,
}

/// HMM-based estimator over continuous readings.
///
/// # Examples
///
/// ```
/// use u_plan::hmm::{Hmm, HmmEstimator, Thresholds};
///
/// let hmm = Hmm::new(
///     vec!["sharp".into(), "dull".into()],
///     vec!["low".into(), "high".into()],
///     vec![0.9, 0.1],
///     vec![vec![0.9, 0.1], vec![0.0, 1.0]],
///     vec![vec![0.8, 0.2], vec![0.2, 0.8]],
/// )
/// .unwrap();
/// let estimator = HmmEstimator::new(hmm, Thresholds::new(vec![0.5]).unwrap()).unwrap();
/// let estimate = estimator.estimate(&[0.1, 0.7, 0.9, 0.8]).unwrap();
/// assert_eq!(estimate.current_state, "dull");
/// ```
#[derive(Debug, Clone)]
pub struct HmmEstimator<D> {
    hmm: Hmm,
    discretizer: D,
}

impl<D: Discretizer> HmmEstimator<D> {
    /// Fails if the discretizer's bin count differs from the model's
    /// observation count.
    pub fn new(hmm: Hmm, discretizer: D) -> Result<Self> {
        if let Some(bins) = discretizer.bins() {
            if bins != hmm.num_observations() {
                return Err(PlanError::InvalidModel(format!(
                    "discretizer produces {bins} bins but the model has {} observations",
                    hmm.num_observations()
                )));
            }
        }
        Ok(Self { hmm, discretizer })
    }

    pub fn hmm(&self) -> &Hmm {
        &self.hmm
    }

    /// Discretizes `values` and runs forward filtering plus Viterbi decoding.
    pub fn estimate(&self, values: &[f64]) -> Result<Estimate> {
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(PlanError::InvalidModel(format!("reading {v} is not finite")));
        }
        let observations: Vec<usize> = values
            .iter()
            .map(|&v| self.discretizer.discretize(v))
            .collect();

        let forward = self.hmm.forward(&observations)?;
        let viterbi = self.hmm.viterbi(&observations)?;

        let posterior = forward.posterior().to_vec();
        let (current_index, confidence) = posterior
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            });

        let states = self.hmm.states();
        let estimate = Estimate {
            current_state: states[current_index].clone(),
            current_index,
            posterior,
            path: viterbi.path.iter().map(|&s| states[s].clone()).collect(),
            path_indices: viterbi.path,
            confidence,
            log_likelihood: forward.log_likelihood,
            observations,
        };

        debug!(
            "hmm estimate: {} readings, state={} confidence={:.4} log_likelihood={:.4}",
            values.len(),
            estimate.current_state,
            estimate.confidence,
            estimate.log_likelihood
        );
        Ok(estimate)
    }
}

impl Estimate {
    /// Posterior probability of a state by name.
    pub fn posterior_of(&self, state: &str, hmm: &Hmm) -> Option<f64> {
        hmm.state_index(state).map(|i| self.posterior[i])
    }
}
