//! Core trait for graph search problems.

use crate::keying::StateKey;

/// One outgoing edge of a state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Successor<S, A> {
    /// State reached by taking `action`.
    pub state: S,
    /// Label of the edge, reported back in the path.
    pub action: A,
    /// Non-negative edge cost.
    pub cost: f64,
}

impl<S, A> Successor<S, A> {
    pub fn new(state: S, action: A, cost: f64) -> Self {
        Self {
            state,
            action,
            cost,
        }
    }
}

/// Defines a search problem over an implicit state graph.
///
/// The engine never inspects states beyond their [`StateKey`]; everything
/// else about the domain stays behind this trait.
///
/// # Examples
///
/// ```
/// use u_plan::search::{SearchProblem, Successor};
///
/// /// Walk along the integers from 0 to `target`.
/// struct Line { target: i64 }
///
/// impl SearchProblem for Line {
///     type State = i64;
///     type Action = i64;
///
///     fn initial_state(&self) -> i64 { 0 }
///
///     fn is_goal(&self, s: &i64) -> bool { *s == self.target }
///
///     fn successors(&self, s: &i64) -> Vec<Successor<i64, i64>> {
///         vec![Successor::new(s + 1, 1, 1.0), Successor::new(s - 1, -1, 1.0)]
///     }
///
///     fn heuristic(&self, s: &i64) -> f64 { (self.target - s).abs() as f64 }
/// }
/// ```
pub trait SearchProblem {
    /// State type. Equality for search purposes is defined by its key.
    type State: StateKey + Clone;

    /// Edge label type.
    type Action: Clone;

    /// The start state.
    fn initial_state(&self) -> Self::State;

    /// Whether `state` satisfies the goal.
    fn is_goal(&self, state: &Self::State) -> bool;

    /// Outgoing edges of `state`. Costs must be finite and non-negative.
    fn successors(&self, state: &Self::State) -> Vec<Successor<Self::State, Self::Action>>;

    /// Estimated remaining cost to a goal. Defaults to zero (uninformed).
    ///
    /// A* and IDA* return optimal paths only when this never overestimates.
    fn heuristic(&self, _state: &Self::State) -> f64 {
        0.0
    }
}
