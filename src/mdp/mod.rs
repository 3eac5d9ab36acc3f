//! Finite Markov decision processes.
//!
//! Solves for the value function and an optimal stationary policy of a
//! finite MDP described through [`MdpProblem`].
//!
//! - [`MdpSolver::value_iteration`]: Bellman optimality sweeps, updated in
//!   place, until the largest change drops below `theta`.
//! - [`MdpSolver::policy_iteration`]: alternating full policy evaluation and
//!   greedy improvement until the policy is stable.
//! - [`MdpSolver::evaluate_policy`]: value of a fixed policy.
//!
//! States without actions are terminal and keep value 0. Running out of
//! iterations is reported through `converged`, not as an error.
//!
//! # References
//!
//! - Bellman (1957), "Dynamic Programming"
//! - Howard (1960), "Dynamic Programming and Markov Processes"
//! - Sutton & Barto (2018), "Reinforcement Learning: An Introduction", ch. 4

mod config;
mod solver;
mod types;

pub use config::MdpConfig;
pub use solver::{MdpSolution, MdpSolver};
pub use types::{MdpProblem, Transition};
