//! Domain-agnostic search and planning toolkit.
//!
//! Provides generic implementations of classic planning algorithms over
//! state spaces defined entirely by the caller:
//!
//! - **Graph search**: BFS, depth-limited DFS, A* and IDA* over implicit
//!   graphs described by a successor function.
//! - **CSP**: finite-domain constraint satisfaction with node consistency,
//!   AC-3 propagation and MRV backtracking.
//! - **HMM**: scaled forward filtering, backward smoothing and Viterbi
//!   decoding, plus an estimator over continuous readings.
//! - **MDP**: value iteration, policy iteration and policy evaluation for
//!   finite Markov decision processes.
//! - **RRT / RRT***: sampling-based motion planning among axis-aligned box
//!   obstacles in any dimension.
//! - **MCTS**: UCT Monte Carlo tree search.
//!
//! # Architecture
//!
//! Every algorithm follows the same shape: a problem trait (or model type)
//! describes the domain, a config struct with `Default` and builder methods
//! bounds the run, and a runner returns a result carrying the answer plus
//! diagnostics. Failing to find an answer is reported in the result
//! (`found`, `solved`, `converged`); only malformed inputs produce a
//! [`PlanError`]. Runs are synchronous and single-threaded; long runs can
//! be stopped through a cancellation flag.
//!
//! States are identified through [`keying::StateKey`], which lets any
//! hashable projection of a state act as its identity.

pub mod csp;
pub mod error;
pub mod hmm;
pub mod keying;
pub mod mcts;
pub mod mdp;
pub mod random;
pub mod rrt;
pub mod search;

pub use error::{PlanError, Result};
