//! Discrete hidden Markov models.
//!
//! [`Hmm`] is an immutable, validated model: initial distribution,
//! row-stochastic transition matrix and row-stochastic emission matrix.
//! On top of it:
//!
//! - [`Hmm::forward`]: filtering with per-step rescaling. The lattice is
//!   renormalized at every step to avoid underflow; the per-step scale
//!   factors are returned, so the exact log-likelihood is available next to
//!   the relative probability of the final step.
//! - [`Hmm::backward`] / [`Hmm::smooth`]: scaled backward pass and
//!   per-step posteriors given the whole sequence.
//! - [`Hmm::viterbi`]: most likely state path, computed in log space.
//! - [`HmmEstimator`]: discretizes continuous readings through a
//!   [`Discretizer`] and summarizes the current hidden state.
//!
//! # References
//!
//! - Rabiner (1989), "A Tutorial on Hidden Markov Models and Selected
//!   Applications in Speech Recognition"
//! - Viterbi (1967), "Error Bounds for Convolutional Codes and an
//!   Asymptotically Optimum Decoding Algorithm"

mod estimator;
mod inference;
mod model;

pub use estimator::{Discretizer, Estimate, HmmEstimator, Thresholds};
pub use inference::{ForwardResult, ViterbiResult};
pub use model::Hmm;
