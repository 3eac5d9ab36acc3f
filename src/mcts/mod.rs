//! Monte Carlo tree search.
//!
//! UCT over a caller-defined [`MctsProblem`]. Each iteration:
//!
//! 1. **Select**: from the root, follow the child maximizing
//!    `mean + C * sqrt(ln(N_parent) / N_child)` while the node is fully
//!    expanded.
//! 2. **Expand**: add one untried action of the reached node.
//! 3. **Rollout**: play uniformly random actions until a terminal state or
//!    `max_depth` actions, then score the final state.
//! 4. **Backpropagate**: add the reward to every node on the path.
//!
//! The recommendation is the most visited root child.
//!
//! # References
//!
//! - Kocsis & Szepesvári (2006), "Bandit based Monte-Carlo Planning"
//! - Auer, Cesa-Bianchi & Fischer (2002), "Finite-time Analysis of the
//!   Multiarmed Bandit Problem"
//! - Browne et al. (2012), "A Survey of Monte Carlo Tree Search Methods"

mod config;
mod runner;
mod types;

pub use config::MctsConfig;
pub use runner::{ActionStats, MctsResult, MctsRunner};
pub use types::MctsProblem;
