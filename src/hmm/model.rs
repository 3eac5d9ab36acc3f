//! HMM model definition and validation.

use crate::error::{PlanError, Result};

/// Tolerance for probability rows summing to one.
const STOCHASTIC_TOLERANCE: f64 = 1e-6;

/// A discrete hidden Markov model.
///
/// Constructed through [`Hmm::new`], which rejects inconsistent shapes and
/// non-stochastic rows. Immutable afterwards.
///
/// # Examples
///
/// ```
/// use u_plan::hmm::Hmm;
///
/// let hmm = Hmm::new(
///     vec!["rain".into(), "dry".into()],
///     vec!["umbrella".into(), "none".into()],
///     vec![0.5, 0.5],
///     vec![vec![0.7, 0.3], vec![0.3, 0.7]],
///     vec![vec![0.9, 0.1], vec![0.2, 0.8]],
/// )
/// .unwrap();
/// assert_eq!(hmm.num_states(), 2);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Hmm {
    states: Vec<String>,
    observations: Vec<String>,
    initial: Vec<f64>,
    transition: Vec<Vec<f64>>,
    emission: Vec<Vec<f64>>,
}

impl Hmm {
    /// Creates a validated model.
    ///
    /// - `initial`: one entry per state, summing to 1.
    /// - `transition[i][j]`: P(next = j | current = i), rows summing to 1.
    /// - `emission[i][k]`: P(observation k | state i), rows summing to 1.
    pub fn new(
        states: Vec<String>,
        observations: Vec<String>,
        initial: Vec<f64>,
        transition: Vec<Vec<f64>>,
        emission: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let n = states.len();
        let m = observations.len();
        if n == 0 {
            return Err(PlanError::InvalidModel("hmm needs at least one state".into()));
        }
        if m == 0 {
            return Err(PlanError::InvalidModel(
                "hmm needs at least one observation symbol".into(),
            ));
        }
        if initial.len() != n {
            return Err(PlanError::InvalidModel(format!(
                "initial has {} entries, expected {n}",
                initial.len()
            )));
        }
        check_distribution("initial", &initial)?;

        if transition.len() != n {
            return Err(PlanError::InvalidModel(format!(
                "transition has {} rows, expected {n}",
                transition.len()
            )));
        }
        for (i, row) in transition.iter().enumerate() {
            if row.len() != n {
                return Err(PlanError::InvalidModel(format!(
                    "transition row {i} has {} entries, expected {n}",
                    row.len()
                )));
            }
            check_distribution(&format!("transition row {i}"), row)?;
        }

        if emission.len() != n {
            return Err(PlanError::InvalidModel(format!(
                "emission has {} rows, expected {n}",
                emission.len()
            )));
        }
        for (i, row) in emission.iter().enumerate() {
            if row.len() != m {
                return Err(PlanError::InvalidModel(format!(
                    "emission row {i} has {} entries, expected {m}",
                    row.len()
                )));
            }
            check_distribution(&format!("emission row {i}"), row)?;
        }

        Ok(Self {
            states,
            observations,
            initial,
            transition,
            emission,
        })
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn observations(&self) -> &[String] {
        &self.observations
    }

    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    pub fn transition(&self) -> &[Vec<f64>] {
        &self.transition
    }

    pub fn emission(&self) -> &[Vec<f64>] {
        &self.emission
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    /// Index of a state by name.
    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s == name)
    }

    /// Maps observation names to indices.
    pub fn encode(&self, symbols: &[&str]) -> Result<Vec<usize>> {
        symbols
            .iter()
            .map(|sym| {
                self.observations
                    .iter()
                    .position(|o| o == sym)
                    .ok_or_else(|| PlanError::InvalidModel(format!("unknown observation: {sym}")))
            })
            .collect()
    }

    /// Rejects empty sequences and out-of-range symbols.
    pub(crate) fn check_sequence(&self, observations: &[usize]) -> Result<()> {
        if observations.is_empty() {
            return Err(PlanError::InvalidModel("observation sequence is empty".into()));
        }
        if let Some(&bad) = observations.iter().find(|&&o| o >= self.observations.len()) {
            return Err(PlanError::InvalidModel(format!(
                "observation index {bad} out of range (model has {} symbols)",
                self.observations.len()
            )));
        }
        Ok(())
    }
}

fn check_distribution(label: &str, row: &[f64]) -> Result<()> {
    if let Some(p) = row.iter().find(|p| !p.is_finite() || **p < 0.0) {
        return Err(PlanError::InvalidModel(format!(
            "{label} contains invalid probability {p}"
        )));
    }
    let sum: f64 = row.iter().sum();
    if (sum - 1.0).abs() > STOCHASTIC_TOLERANCE {
        return Err(PlanError::InvalidModel(format!(
            "{label} sums to {sum}, expected 1"
        )));
    }
    Ok(())
}
