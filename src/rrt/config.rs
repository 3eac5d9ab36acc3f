//! RRT configuration.

use crate::error::{PlanError, Result};

/// Tree-growth strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Planner {
    /// Plain RRT: attach to the nearest node, stop at the first goal hit.
    Rrt,
    /// RRT*: best parent within the rewire radius, then rewire neighbors.
    RrtStar,
}

/// Configuration for RRT and RRT*.
///
/// # Examples
///
/// ```
/// use u_plan::rrt::RrtConfig;
///
/// let config = RrtConfig::default()
///     .with_step_size(0.5)
///     .with_rewire_radius(1.5)
///     .with_seed(42);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.tolerance(), 0.5);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RrtConfig {
    /// Maximum extension per iteration.
    pub step_size: f64,

    /// Probability of sampling the goal instead of a uniform point.
    pub goal_bias: f64,

    /// Maximum number of samples.
    pub max_iterations: usize,

    /// Neighborhood radius for RRT* parent choice and rewiring.
    pub rewire_radius: f64,

    /// Distance at which a node may connect to the goal. `None` uses
    /// `step_size`.
    pub goal_tolerance: Option<f64>,

    /// RRT* only: keep sampling after the first goal connection and return
    /// the cheapest one.
    pub refine_after_goal: bool,

    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

impl Default for RrtConfig {
    fn default() -> Self {
        Self {
            step_size: 1.0,
            goal_bias: 0.1,
            max_iterations: 5000,
            rewire_radius: 2.0,
            goal_tolerance: None,
            refine_after_goal: false,
            seed: None,
        }
    }
}

impl RrtConfig {
    pub fn with_step_size(mut self, step: f64) -> Self {
        self.step_size = step;
        self
    }

    pub fn with_goal_bias(mut self, bias: f64) -> Self {
        self.goal_bias = bias;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_rewire_radius(mut self, radius: f64) -> Self {
        self.rewire_radius = radius;
        self
    }

    pub fn with_goal_tolerance(mut self, tolerance: f64) -> Self {
        self.goal_tolerance = Some(tolerance);
        self
    }

    pub fn with_refine_after_goal(mut self, refine: bool) -> Self {
        self.refine_after_goal = refine;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Effective goal tolerance.
    pub fn tolerance(&self) -> f64 {
        self.goal_tolerance.unwrap_or(self.step_size)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.step_size > 0.0 && self.step_size.is_finite()) {
            return Err(PlanError::InvalidConfig(format!(
                "step_size must be positive, got {}",
                self.step_size
            )));
        }
        if !(0.0..=1.0).contains(&self.goal_bias) {
            return Err(PlanError::InvalidConfig(format!(
                "goal_bias must be in [0, 1], got {}",
                self.goal_bias
            )));
        }
        if self.max_iterations == 0 {
            return Err(PlanError::InvalidConfig(
                "max_iterations must be positive".into(),
            ));
        }
        if !(self.rewire_radius > 0.0 && self.rewire_radius.is_finite()) {
            return Err(PlanError::InvalidConfig(format!(
                "rewire_radius must be positive, got {}",
                self.rewire_radius
            )));
        }
        if let Some(t) = self.goal_tolerance {
            if !(t > 0.0 && t.is_finite()) {
                return Err(PlanError::InvalidConfig(format!(
                    "goal_tolerance must be positive, got {t}"
                )));
            }
        }
        Ok(())
    }
}
