//! MDP solver configuration.

use crate::error::{PlanError, Result};

/// Configuration for value and policy iteration.
///
/// # Examples
///
/// ```
/// use u_plan::mdp::MdpConfig;
///
/// let config = MdpConfig::default().with_gamma(0.95).with_theta(1e-6);
/// assert!(config.validate().is_ok());
/// assert!(MdpConfig::default().with_gamma(0.0).validate().is_err());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MdpConfig {
    /// Discount factor, in `(0, 1]`.
    pub gamma: f64,

    /// Convergence threshold on the largest value change in a sweep.
    pub theta: f64,

    /// Maximum sweeps (value iteration) or improvement rounds (policy
    /// iteration).
    pub max_iterations: usize,

    /// Maximum sweeps of a single policy evaluation.
    pub max_evaluation_sweeps: usize,
}

impl Default for MdpConfig {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            theta: 1e-4,
            max_iterations: 1000,
            max_evaluation_sweeps: 1000,
        }
    }
}

impl MdpConfig {
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_max_evaluation_sweeps(mut self, n: usize) -> Self {
        self.max_evaluation_sweeps = n;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(PlanError::InvalidConfig(format!(
                "gamma must be in (0, 1], got {}",
                self.gamma
            )));
        }
        if !(self.theta > 0.0 && self.theta.is_finite()) {
            return Err(PlanError::InvalidConfig(format!(
                "theta must be positive, got {}",
                self.theta
            )));
        }
        if self.max_iterations == 0 {
            return Err(PlanError::InvalidConfig(
                "max_iterations must be positive".into(),
            ));
        }
        if self.max_evaluation_sweeps == 0 {
            return Err(PlanError::InvalidConfig(
                "max_evaluation_sweeps must be positive".into(),
            ));
        }
        Ok(())
    }
}
