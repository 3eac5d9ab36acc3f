//! Core trait for Monte Carlo tree search.

use rand::Rng;

/// Defines a single-agent sequential decision problem.
///
/// The search maximizes [`reward`](MctsProblem::reward), evaluated at the
/// state where a rollout stops.
///
/// # Examples
///
/// ```
/// use rand::Rng;
/// use u_plan::mcts::MctsProblem;
///
/// /// Pick three bits; the reward is the fraction of ones.
/// struct Bits;
///
/// impl MctsProblem for Bits {
///     type State = Vec<u8>;
///     type Action = u8;
///
///     fn actions(&self, s: &Vec<u8>) -> Vec<u8> {
///         if s.len() < 3 { vec![0, 1] } else { vec![] }
///     }
///
///     fn apply<R: Rng>(&self, s: &Vec<u8>, a: &u8, _rng: &mut R) -> Vec<u8> {
///         let mut next = s.clone();
///         next.push(*a);
///         next
///     }
///
///     fn is_terminal(&self, s: &Vec<u8>) -> bool { s.len() == 3 }
///
///     fn reward(&self, s: &Vec<u8>) -> f64 {
///         s.iter().map(|&b| b as f64).sum::<f64>() / 3.0
///     }
/// }
/// ```
pub trait MctsProblem {
    /// State type.
    type State: Clone;

    /// Action type.
    type Action: Clone;

    /// Actions available in `state`. An empty list ends a rollout.
    fn actions(&self, state: &Self::State) -> Vec<Self::Action>;

    /// Successor of `state` under `action`. May be stochastic.
    fn apply<R: Rng>(&self, state: &Self::State, action: &Self::Action, rng: &mut R)
        -> Self::State;

    /// Whether `state` ends the episode.
    fn is_terminal(&self, state: &Self::State) -> bool;

    /// Value of the state a rollout ends in. Higher is better.
    fn reward(&self, state: &Self::State) -> f64;
}
