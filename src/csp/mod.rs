//! Finite-domain constraint satisfaction.
//!
//! A [`Csp`] holds named variables, an ordered finite domain per variable,
//! and constraints expressed as predicates over a partial assignment.
//! [`CspSolver`] solves it in three stages:
//!
//! 1. **Node consistency**: unary constraints filter domains.
//! 2. **AC-3**: binary constraints prune values without support, to a
//!    fixpoint or until a domain empties (proven infeasible).
//! 3. **Backtracking** with minimum-remaining-values ordering over the
//!    reduced domains. A constraint is checked only once every variable it
//!    references is assigned.
//!
//! There is no propagation during search (no forward checking, no MAC);
//! the single AC-3 pass is the only look-ahead.
//!
//! # References
//!
//! - Mackworth (1977), "Consistency in Networks of Relations"
//! - Haralick & Elliott (1980), "Increasing Tree Search Efficiency for
//!   Constraint Satisfaction Problems"

mod config;
mod model;
mod solver;

pub use config::CspConfig;
pub use model::{Assignment, Constraint, Csp};
pub use solver::{Ac3Outcome, CspResult, CspSolver};
