//! CSP solver configuration.

use crate::error::{PlanError, Result};

/// Configuration for [`CspSolver`](super::CspSolver).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CspConfig {
    /// Maximum number of backtracks (exhausted value lists) before giving up.
    pub max_backtracks: usize,

    /// Whether to run AC-3 before backtracking.
    pub arc_consistency: bool,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            max_backtracks: 100_000,
            arc_consistency: true,
        }
    }
}

impl CspConfig {
    pub fn with_max_backtracks(mut self, n: usize) -> Self {
        self.max_backtracks = n;
        self
    }

    pub fn with_arc_consistency(mut self, enabled: bool) -> Self {
        self.arc_consistency = enabled;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_backtracks == 0 {
            return Err(PlanError::InvalidConfig(
                "max_backtracks must be positive".into(),
            ));
        }
        Ok(())
    }
}
