//! MCTS configuration.

use crate::error::{PlanError, Result};

/// Configuration for Monte Carlo tree search.
///
/// # Examples
///
/// ```
/// use u_plan::mcts::MctsConfig;
///
/// let config = MctsConfig::default()
///     .with_iterations(5000)
///     .with_exploration(1.0)
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MctsConfig {
    /// Number of select/expand/rollout/backpropagate rounds.
    pub iterations: usize,

    /// UCB1 exploration constant `C`.
    pub exploration: f64,

    /// Maximum number of actions in a random rollout.
    pub max_depth: usize,

    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            exploration: std::f64::consts::SQRT_2,
            max_depth: 50,
            seed: None,
        }
    }
}

impl MctsConfig {
    pub fn with_iterations(mut self, n: usize) -> Self {
        self.iterations = n;
        self
    }

    pub fn with_exploration(mut self, c: f64) -> Self {
        self.exploration = c;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(PlanError::InvalidConfig(
                "iterations must be positive".into(),
            ));
        }
        if !(self.exploration >= 0.0 && self.exploration.is_finite()) {
            return Err(PlanError::InvalidConfig(format!(
                "exploration must be non-negative, got {}",
                self.exploration
            )));
        }
        Ok(())
    }
}
