//! Core trait for Markov decision processes.

use crate::keying::StateKey;

/// One stochastic outcome of taking an action.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transition<S> {
    pub next_state: S,
    pub probability: f64,
}

impl<S> Transition<S> {
    pub fn new(next_state: S, probability: f64) -> Self {
        Self {
            next_state,
            probability,
        }
    }
}

/// Defines a finite MDP.
///
/// The state set is enumerated once per solve through [`states`]; every
/// state a transition leads to must appear there. A state with no actions
/// is terminal and keeps value 0.
///
/// [`states`]: MdpProblem::states
///
/// # Examples
///
/// ```
/// use u_plan::mdp::{MdpProblem, Transition};
///
/// /// Walk right along 0..=2; reaching 2 pays 1.
/// struct Corridor;
///
/// impl MdpProblem for Corridor {
///     type State = u8;
///     type Action = &'static str;
///
///     fn states(&self) -> Vec<u8> { vec![0, 1, 2] }
///
///     fn actions(&self, s: &u8) -> Vec<&'static str> {
///         if *s == 2 { vec![] } else { vec!["right"] }
///     }
///
///     fn transitions(&self, s: &u8, _a: &&'static str) -> Vec<Transition<u8>> {
///         vec![Transition::new(s + 1, 1.0)]
///     }
///
///     fn reward(&self, _s: &u8, _a: &&'static str, next: &u8) -> f64 {
///         if *next == 2 { 1.0 } else { 0.0 }
///     }
/// }
/// ```
pub trait MdpProblem {
    /// State type, identified by its key.
    type State: StateKey + Clone;

    /// Action type.
    type Action: Clone + PartialEq;

    /// Every state of the process, without duplicates.
    fn states(&self) -> Vec<Self::State>;

    /// Actions available in `state`. Empty means terminal.
    fn actions(&self, state: &Self::State) -> Vec<Self::Action>;

    /// Outcome distribution of `action` in `state`. Probabilities must sum
    /// to 1.
    fn transitions(&self, state: &Self::State, action: &Self::Action)
        -> Vec<Transition<Self::State>>;

    /// Immediate reward of the transition `state --action--> next`.
    fn reward(&self, state: &Self::State, action: &Self::Action, next: &Self::State) -> f64;
}
