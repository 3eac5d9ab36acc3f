//! Dynamic-programming solvers.
//!
//! The problem is first compiled into dense index tables: states are interned
//! through a [`KeyTable`], and every `(state, action)` pair gets its outcome
//! list with rewards precomputed. The sweeps then touch only `Vec`s.

use super::config::MdpConfig;
use super::types::MdpProblem;
use crate::error::{PlanError, Result};
use crate::keying::{KeyTable, StateKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tolerance for outcome probabilities summing to one.
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Minimum improvement for policy iteration to switch actions.
const IMPROVEMENT_EPSILON: f64 = 1e-12;

/// Result of an MDP solve.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MdpSolution<S, A> {
    /// States in the order returned by [`MdpProblem::states`].
    pub states: Vec<S>,

    /// Value of each state.
    pub values: Vec<f64>,

    /// Action of each state; `None` for terminal states.
    pub policy: Vec<Option<A>>,

    /// Sweeps (value iteration) or improvement rounds (policy iteration).
    pub iterations: usize,

    /// Whether the stopping criterion was met before the budget.
    pub converged: bool,

    /// Largest value change in the last sweep.
    pub max_delta: f64,

    /// Total policy-evaluation sweeps.
    pub evaluation_sweeps: usize,

    /// Whether cancelled externally.
    pub cancelled: bool,
}

impl<S: StateKey, A> MdpSolution<S, A> {
    fn position(&self, state: &S) -> Option<usize> {
        let key = state.state_key();
        self.states.iter().position(|s| s.state_key() == key)
    }

    /// Value of `state`, if it belongs to the problem.
    pub fn value_of(&self, state: &S) -> Option<f64> {
        self.position(state).map(|i| self.values[i])
    }

    /// Policy action for `state`; `None` if terminal or unknown.
    pub fn action_for(&self, state: &S) -> Option<&A> {
        self.position(state).and_then(|i| self.policy[i].as_ref())
    }
}

/// One outcome of a `(state, action)` pair.
#[derive(Debug, Clone, Copy)]
struct Outcome {
    next: usize,
    probability: f64,
    reward: f64,
}

/// Index form of an [`MdpProblem`].
struct Compiled<S, A> {
    states: Vec<S>,
    actions: Vec<Vec<A>>,
    /// `outcomes[s][a]`
    outcomes: Vec<Vec<Vec<Outcome>>>,
}

impl<S, A> Compiled<S, A> {
    fn q_value(&self, values: &[f64], gamma: f64, s: usize, a: usize) -> f64 {
        self.outcomes[s][a]
            .iter()
            .map(|o| o.probability * (o.reward + gamma * values[o.next]))
            .sum()
    }

    /// First action with the largest Q-value.
    fn greedy(&self, values: &[f64], gamma: f64, s: usize) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for a in 0..self.actions[s].len() {
            let q = self.q_value(values, gamma, s, a);
            if best.is_none_or(|(_, b)| q > b) {
                best = Some((a, q));
            }
        }
        best
    }
}

fn compile<P: MdpProblem>(problem: &P) -> Result<Compiled<P::State, P::Action>> {
    let states = problem.states();
    if states.is_empty() {
        return Err(PlanError::InvalidModel("mdp has no states".into()));
    }

    let mut table = KeyTable::new();
    for (i, s) in states.iter().enumerate() {
        let (_, inserted) = table.intern(s.state_key());
        if !inserted {
            return Err(PlanError::InvalidModel(format!(
                "state at position {i} is listed twice"
            )));
        }
    }

    let mut all_actions = Vec::with_capacity(states.len());
    let mut all_outcomes = Vec::with_capacity(states.len());
    for (si, state) in states.iter().enumerate() {
        let actions = problem.actions(state);
        let mut per_action = Vec::with_capacity(actions.len());
        for (ai, action) in actions.iter().enumerate() {
            let transitions = problem.transitions(state, action);
            let mut outcomes = Vec::with_capacity(transitions.len());
            let mut total = 0.0;
            for t in &transitions {
                if !(t.probability.is_finite() && t.probability >= 0.0) {
                    return Err(PlanError::InvalidModel(format!(
                        "state {si} action {ai}: invalid probability {}",
                        t.probability
                    )));
                }
                let next = table.get(&t.next_state.state_key()).ok_or_else(|| {
                    PlanError::InvalidModel(format!(
                        "state {si} action {ai}: transition to an undeclared state"
                    ))
                })?;
                let reward = problem.reward(state, action, &t.next_state);
                if !reward.is_finite() {
                    return Err(PlanError::InvalidModel(format!(
                        "state {si} action {ai}: reward {reward} is not finite"
                    )));
                }
                total += t.probability;
                outcomes.push(Outcome {
                    next,
                    probability: t.probability,
                    reward,
                });
            }
            if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
                return Err(PlanError::InvalidModel(format!(
                    "state {si} action {ai}: probabilities sum to {total}, expected 1"
                )));
            }
            per_action.push(outcomes);
        }
        all_actions.push(actions);
        all_outcomes.push(per_action);
    }

    Ok(Compiled {
        states,
        actions: all_actions,
        outcomes: all_outcomes,
    })
}

fn is_cancelled(cancel: &Option<Arc<AtomicBool>>) -> bool {
    cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed))
}

/// Outcome of in-place policy evaluation.
struct Evaluation {
    sweeps: usize,
    converged: bool,
    max_delta: f64,
}

/// Iterative policy evaluation, in place. `policy[s] == None` pins `V(s)` to 0.
fn evaluate<S, A>(
    model: &Compiled<S, A>,
    policy: &[Option<usize>],
    values: &mut [f64],
    config: &MdpConfig,
) -> Evaluation {
    let mut max_delta = f64::INFINITY;
    let mut sweeps = 0;
    while sweeps < config.max_evaluation_sweeps {
        max_delta = 0.0;
        for (s, action) in policy.iter().enumerate() {
            let v = match action {
                Some(a) => model.q_value(values, config.gamma, s, *a),
                None => 0.0,
            };
            max_delta = max_delta.max((v - values[s]).abs());
            values[s] = v;
        }
        sweeps += 1;
        if max_delta < config.theta {
            return Evaluation {
                sweeps,
                converged: true,
                max_delta,
            };
        }
    }
    Evaluation {
        sweeps,
        converged: false,
        max_delta,
    }
}

/// Solves finite MDPs by dynamic programming.
///
/// # Examples
///
/// ```
/// use u_plan::mdp::{MdpConfig, MdpProblem, MdpSolver, Transition};
///
/// struct Corridor;
///
/// impl MdpProblem for Corridor {
///     type State = u8;
///     type Action = u8;
///     fn states(&self) -> Vec<u8> { vec![0, 1, 2] }
///     fn actions(&self, s: &u8) -> Vec<u8> { if *s == 2 { vec![] } else { vec![1] } }
///     fn transitions(&self, s: &u8, _a: &u8) -> Vec<Transition<u8>> {
///         vec![Transition::new(s + 1, 1.0)]
///     }
///     fn reward(&self, _s: &u8, _a: &u8, next: &u8) -> f64 {
///         if *next == 2 { 1.0 } else { 0.0 }
///     }
/// }
///
/// let solution = MdpSolver::value_iteration(&Corridor, &MdpConfig::default()).unwrap();
/// assert!(solution.converged);
/// assert!((solution.value_of(&0).unwrap() - 0.9).abs() < 1e-9);
/// ```
pub struct MdpSolver;

impl MdpSolver {
    /// Value iteration with in-place (Gauss-Seidel) sweeps.
    pub fn value_iteration<P: MdpProblem>(
        problem: &P,
        config: &MdpConfig,
    ) -> Result<MdpSolution<P::State, P::Action>> {
        Self::value_iteration_with_cancel(problem, config, None)
    }

    /// Value iteration with an optional cancellation token, checked before
    /// every sweep.
    pub fn value_iteration_with_cancel<P: MdpProblem>(
        problem: &P,
        config: &MdpConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<MdpSolution<P::State, P::Action>> {
        config.validate()?;
        let model = compile(problem)?;
        let n = model.states.len();
        log::debug!("value iteration: {n} states, gamma={}", config.gamma);

        let mut values = vec![0.0; n];
        let mut iterations = 0;
        let mut converged = false;
        let mut cancelled = false;
        let mut max_delta = f64::INFINITY;

        while iterations < config.max_iterations {
            if is_cancelled(&cancel) {
                cancelled = true;
                break;
            }
            max_delta = 0.0;
            for s in 0..n {
                if let Some((_, best)) = model.greedy(&values, config.gamma, s) {
                    max_delta = max_delta.max((best - values[s]).abs());
                    values[s] = best;
                }
            }
            iterations += 1;
            log::trace!("value iteration sweep {iterations}: delta={max_delta}");
            if max_delta < config.theta {
                converged = true;
                break;
            }
        }

        if !converged && !cancelled {
            log::warn!(
                "value iteration stopped after {iterations} sweeps (delta={max_delta})"
            );
        }

        let policy: Vec<Option<usize>> = (0..n)
            .map(|s| model.greedy(&values, config.gamma, s).map(|(a, _)| a))
            .collect();

        log::debug!(
            "value iteration finished: converged={converged}, sweeps={iterations}, delta={max_delta}"
        );
        Ok(finish(
            model,
            values,
            &policy,
            iterations,
            converged,
            max_delta,
            0,
            cancelled,
        ))
    }

    /// Policy iteration starting from each state's first action.
    pub fn policy_iteration<P: MdpProblem>(
        problem: &P,
        config: &MdpConfig,
    ) -> Result<MdpSolution<P::State, P::Action>> {
        Self::policy_iteration_with_cancel(problem, config, None)
    }

    /// Policy iteration with an optional cancellation token, checked before
    /// every evaluation.
    pub fn policy_iteration_with_cancel<P: MdpProblem>(
        problem: &P,
        config: &MdpConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<MdpSolution<P::State, P::Action>> {
        config.validate()?;
        let model = compile(problem)?;
        let n = model.states.len();
        log::debug!("policy iteration: {n} states, gamma={}", config.gamma);

        let mut policy: Vec<Option<usize>> = model
            .actions
            .iter()
            .map(|a| if a.is_empty() { None } else { Some(0) })
            .collect();
        let mut values = vec![0.0; n];
        let mut iterations = 0;
        let mut evaluation_sweeps = 0;
        let mut converged = false;
        let mut cancelled = false;
        let mut max_delta = f64::INFINITY;

        while iterations < config.max_iterations {
            if is_cancelled(&cancel) {
                cancelled = true;
                break;
            }
            let evaluation = evaluate(&model, &policy, &mut values, config);
            evaluation_sweeps += evaluation.sweeps;
            max_delta = evaluation.max_delta;
            if !evaluation.converged {
                log::warn!(
                    "policy evaluation hit {} sweeps without converging",
                    config.max_evaluation_sweeps
                );
            }

            let mut stable = true;
            for s in 0..n {
                let Some(current) = policy[s] else {
                    continue;
                };
                let mut best = current;
                let mut best_q = model.q_value(&values, config.gamma, s, current);
                for a in 0..model.actions[s].len() {
                    let q = model.q_value(&values, config.gamma, s, a);
                    if q > best_q + IMPROVEMENT_EPSILON {
                        best = a;
                        best_q = q;
                    }
                }
                if best != current {
                    policy[s] = Some(best);
                    stable = false;
                }
            }
            iterations += 1;
            log::trace!("policy iteration round {iterations}: stable={stable}");
            if stable {
                converged = true;
                break;
            }
        }

        if !converged && !cancelled {
            log::warn!("policy iteration stopped after {iterations} rounds with an unstable policy");
        }
        log::debug!(
            "policy iteration finished: converged={converged}, rounds={iterations}, sweeps={evaluation_sweeps}"
        );
        Ok(finish(
            model,
            values,
            &policy,
            iterations,
            converged,
            max_delta,
            evaluation_sweeps,
            cancelled,
        ))
    }

    /// Evaluates a fixed policy.
    ///
    /// `policy` picks the action for each state; it must return one of the
    /// state's available actions, or `None` to treat the state as terminal.
    pub fn evaluate_policy<P, F>(
        problem: &P,
        config: &MdpConfig,
        policy: F,
    ) -> Result<MdpSolution<P::State, P::Action>>
    where
        P: MdpProblem,
        F: Fn(&P::State) -> Option<P::Action>,
    {
        config.validate()?;
        let model = compile(problem)?;

        let mut indices = Vec::with_capacity(model.states.len());
        for (s, state) in model.states.iter().enumerate() {
            let index = match policy(state) {
                None => None,
                Some(action) => Some(
                    model.actions[s]
                        .iter()
                        .position(|a| *a == action)
                        .ok_or_else(|| {
                            PlanError::InvalidModel(format!(
                                "policy picks an unavailable action in state {s}"
                            ))
                        })?,
                ),
            };
            indices.push(index);
        }

        let mut values = vec![0.0; model.states.len()];
        let evaluation = evaluate(&model, &indices, &mut values, config);
        if !evaluation.converged {
            log::warn!(
                "policy evaluation hit {} sweeps without converging",
                config.max_evaluation_sweeps
            );
        }
        log::debug!(
            "policy evaluation finished: sweeps={}, delta={}",
            evaluation.sweeps,
            evaluation.max_delta
        );
        Ok(finish(
            model,
            values,
            &indices,
            evaluation.sweeps,
            evaluation.converged,
            evaluation.max_delta,
            evaluation.sweeps,
            false,
        ))
    }
}

#[allow(clippy::too_many_arguments)]
fn finish<S, A: Clone>(
    model: Compiled<S, A>,
    values: Vec<f64>,
    policy: &[Option<usize>],
    iterations: usize,
    converged: bool,
    max_delta: f64,
    evaluation_sweeps: usize,
    cancelled: bool,
) -> MdpSolution<S, A> {
    let policy = policy
        .iter()
        .enumerate()
        .map(|(s, a)| a.map(|a| model.actions[s][a].clone()))
        .collect();
    MdpSolution {
        states: model.states,
        values,
        policy,
        iterations,
        converged,
        max_delta,
        evaluation_sweeps,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::Transition;

    // ---- Deterministic chain ----

    /// 0 -> 1 -> 2, entering 2 pays 1. State 2 is terminal. Each
    /// non-terminal state may also stay put for nothing.
    struct Chain;

    impl MdpProblem for Chain {
        type State = u32;
        type Action = &'static str;

        fn states(&self) -> Vec<u32> {
            vec![0, 1, 2]
        }

        fn actions(&self, s: &u32) -> Vec<&'static str> {
            if *s == 2 {
                vec![]
            } else {
                vec!["stay", "right"]
            }
        }

        fn transitions(&self, s: &u32, a: &&'static str) -> Vec<Transition<u32>> {
            match *a {
                "right" => vec![Transition::new(s + 1, 1.0)],
                _ => vec![Transition::new(*s, 1.0)],
            }
        }

        fn reward(&self, _s: &u32, _a: &&'static str, next: &u32) -> f64 {
            if *next == 2 {
                1.0
            } else {
                0.0
            }
        }
    }

    #[test]
    fn test_value_iteration_chain() {
        let config = MdpConfig::default();
        let solution = MdpSolver::value_iteration(&Chain, &config).unwrap();

        assert!(solution.converged);
        assert!(!solution.cancelled);
        assert!((solution.value_of(&2).unwrap() - 0.0).abs() < config.theta);
        assert!((solution.value_of(&1).unwrap() - 1.0).abs() < config.theta);
        assert!((solution.value_of(&0).unwrap() - 0.9).abs() < config.theta);
        assert_eq!(solution.action_for(&0), Some(&"right"));
        assert_eq!(solution.action_for(&1), Some(&"right"));
        assert_eq!(solution.action_for(&2), None);
        assert_eq!(solution.value_of(&7), None);
    }

    #[test]
    fn test_policy_iteration_chain() {
        let solution = MdpSolver::policy_iteration(&Chain, &MdpConfig::default()).unwrap();

        assert!(solution.converged);
        assert_eq!(solution.policy, vec![Some("right"), Some("right"), None]);
        assert!((solution.values[0] - 0.9).abs() < 1e-4);
        assert!(solution.evaluation_sweeps >= solution.iterations);
    }

    #[test]
    fn test_evaluate_policy() {
        let config = MdpConfig::default();

        let idle = MdpSolver::evaluate_policy(&Chain, &config, |s| {
            (*s != 2).then_some("stay")
        })
        .unwrap();
        assert!(idle.converged);
        assert!(idle.values.iter().all(|v| v.abs() < 1e-12));

        let eager = MdpSolver::evaluate_policy(&Chain, &config, |s| {
            (*s != 2).then_some("right")
        })
        .unwrap();
        assert!((eager.values[1] - 1.0).abs() < 1e-9);
        assert!((eager.values[0] - 0.9).abs() < 1e-9);

        let err = MdpSolver::evaluate_policy(&Chain, &config, |_| Some("jump")).unwrap_err();
        assert!(matches!(err, PlanError::InvalidModel(_)));
    }

    // ---- Stochastic problems ----

    /// Single state paying 1 forever: V = 1 / (1 - gamma).
    struct Annuity;

    impl MdpProblem for Annuity {
        type State = ();
        type Action = ();

        fn states(&self) -> Vec<()> {
            vec![()]
        }

        fn actions(&self, _s: &()) -> Vec<()> {
            vec![()]
        }

        fn transitions(&self, _s: &(), _a: &()) -> Vec<Transition<()>> {
            vec![Transition::new((), 1.0)]
        }

        fn reward(&self, _s: &(), _a: &(), _next: &()) -> f64 {
            1.0
        }
    }

    #[test]
    fn test_discounted_annuity() {
        let config = MdpConfig::default().with_theta(1e-8);
        let solution = MdpSolver::value_iteration(&Annuity, &config).unwrap();

        assert!(solution.converged);
        assert!((solution.values[0] - 10.0).abs() < 1e-6);
    }

    #[test_log::test]
    fn test_undiscounted_budget() {
        let config = MdpConfig::default().with_gamma(1.0).with_max_iterations(5);
        let solution = MdpSolver::value_iteration(&Annuity, &config).unwrap();

        assert!(!solution.converged, "an undiscounted annuity never converges");
        assert_eq!(solution.iterations, 5);
        assert!((solution.values[0] - 5.0).abs() < 1e-12);
    }

    /// Slippery corridor 0..=4: moves succeed with 0.8, else stay. Reaching
    /// 4 pays 10, every other step costs 1.
    struct Slippery;

    impl MdpProblem for Slippery {
        type State = i32;
        type Action = i32;

        fn states(&self) -> Vec<i32> {
            (0..=4).collect()
        }

        fn actions(&self, s: &i32) -> Vec<i32> {
            if *s == 4 {
                vec![]
            } else {
                vec![-1, 1]
            }
        }

        fn transitions(&self, s: &i32, a: &i32) -> Vec<Transition<i32>> {
            let target = (s + a).clamp(0, 4);
            if target == *s {
                vec![Transition::new(*s, 1.0)]
            } else {
                vec![Transition::new(target, 0.8), Transition::new(*s, 0.2)]
            }
        }

        fn reward(&self, _s: &i32, _a: &i32, next: &i32) -> f64 {
            if *next == 4 {
                10.0
            } else {
                -1.0
            }
        }
    }

    #[test]
    fn test_value_and_policy_iteration_agree() {
        let config = MdpConfig::default().with_gamma(0.95).with_theta(1e-8);
        let vi = MdpSolver::value_iteration(&Slippery, &config).unwrap();
        let pi = MdpSolver::policy_iteration(&Slippery, &config).unwrap();

        assert!(vi.converged && pi.converged);
        assert_eq!(vi.policy, pi.policy);
        assert_eq!(vi.policy[..4], [Some(1), Some(1), Some(1), Some(1)]);
        for (a, b) in vi.values.iter().zip(&pi.values) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
        // Values increase toward the goal.
        assert!(vi.values.windows(2).take(3).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_cancellation() {
        let cancel = Arc::new(AtomicBool::new(true));
        let config = MdpConfig::default();
        let solution =
            MdpSolver::value_iteration_with_cancel(&Slippery, &config, Some(cancel.clone()))
                .unwrap();
        assert!(solution.cancelled);
        assert_eq!(solution.iterations, 0);

        let solution =
            MdpSolver::policy_iteration_with_cancel(&Slippery, &config, Some(cancel)).unwrap();
        assert!(solution.cancelled);
        assert!(!solution.converged);
    }

    // ---- Validation ----

    struct Leaky {
        probability: f64,
        target: u8,
    }

    impl MdpProblem for Leaky {
        type State = u8;
        type Action = u8;

        fn states(&self) -> Vec<u8> {
            vec![0, 1]
        }

        fn actions(&self, s: &u8) -> Vec<u8> {
            if *s == 0 {
                vec![0]
            } else {
                vec![]
            }
        }

        fn transitions(&self, _s: &u8, _a: &u8) -> Vec<Transition<u8>> {
            vec![Transition::new(self.target, self.probability)]
        }

        fn reward(&self, _s: &u8, _a: &u8, _next: &u8) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_invalid_models() {
        let config = MdpConfig::default();

        let ok = Leaky {
            probability: 1.0,
            target: 1,
        };
        assert!(MdpSolver::value_iteration(&ok, &config).is_ok());

        let short = Leaky {
            probability: 0.5,
            target: 1,
        };
        assert!(matches!(
            MdpSolver::value_iteration(&short, &config),
            Err(PlanError::InvalidModel(_))
        ));

        let stray = Leaky {
            probability: 1.0,
            target: 9,
        };
        let err = MdpSolver::policy_iteration(&stray, &config).unwrap_err();
        assert!(err.to_string().contains("undeclared"));

        let err = MdpSolver::value_iteration(&ok, &config.clone().with_gamma(0.0)).unwrap_err();
        assert!(matches!(err, PlanError::InvalidConfig(_)));
    }
}
