//! Graph search over caller-defined state spaces.
//!
//! The caller describes the space through [`SearchProblem`]: an initial
//! state, a goal test, a successor function and an optional heuristic.
//! [`GraphSearch`] runs one of four classic strategies over it and returns
//! a [`SearchResult`] with the reconstructed path and diagnostics.
//!
//! | Algorithm | Optimal when                         | Memory        |
//! |-----------|--------------------------------------|---------------|
//! | BFS       | all edge costs are equal             | frontier      |
//! | DFS       | never (depth-limited, first found)   | explicit stack|
//! | A*        | heuristic is admissible              | open + closed |
//! | IDA*      | heuristic is admissible              | current path  |
//!
//! States are identified through [`StateKey`](crate::keying::StateKey), so
//! visited-set checks never serialize states.
//!
//! Running out of `max_iterations` yields `found == false` with
//! `exhausted == false`: the goal may still be reachable.
//!
//! # References
//!
//! - Hart, Nilsson & Raphael (1968), "A Formal Basis for the Heuristic
//!   Determination of Minimum Cost Paths"
//! - Korf (1985), "Depth-First Iterative-Deepening: An Optimal Admissible
//!   Tree Search"
//! - Russell & Norvig (2020), *Artificial Intelligence: A Modern Approach*, ch. 3

mod config;
mod runner;
mod types;

pub use config::{Algorithm, SearchConfig};
pub use runner::{GraphSearch, PathStep, SearchResult};
pub use types::{SearchProblem, Successor};
