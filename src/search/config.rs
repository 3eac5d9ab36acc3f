//! Graph search configuration.

use crate::error::{PlanError, Result};

/// Search strategy selector for [`GraphSearch::run`](super::GraphSearch::run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Algorithm {
    /// Breadth-first search. Fewest edges, optimal for uniform costs.
    Bfs,
    /// Depth-limited depth-first search.
    Dfs,
    /// A* with the problem's heuristic.
    AStar,
    /// Iterative-deepening A*.
    IdaStar,
}

/// Configuration for graph search.
///
/// # Examples
///
/// ```
/// use u_plan::search::SearchConfig;
///
/// let config = SearchConfig::default()
///     .with_max_iterations(50_000)
///     .with_max_depth(200);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchConfig {
    /// Maximum number of node expansions before giving up.
    pub max_iterations: usize,

    /// Maximum path length for DFS and IDA*.
    pub max_depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            max_depth: 64,
        }
    }
}

impl SearchConfig {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(PlanError::InvalidConfig(
                "max_iterations must be positive".into(),
            ));
        }
        Ok(())
    }
}
