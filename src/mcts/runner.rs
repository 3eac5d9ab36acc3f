//! UCT search loop.

use super::config::MctsConfig;
use super::types::MctsProblem;
use crate::error::Result;
use crate::random::rng_from;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Statistics of one root action.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionStats<A> {
    pub action: A,
    pub visits: usize,
    /// Average backed-up reward.
    pub mean_value: f64,
}

/// Result of an MCTS run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MctsResult<A> {
    /// Most visited root action; `None` if the root has no actions.
    pub best_action: Option<A>,

    /// Expanded root actions, in expansion order.
    pub children: Vec<ActionStats<A>>,

    /// Iterations performed.
    pub iterations: usize,

    /// Number of nodes in the search tree, root included.
    pub tree_size: usize,

    /// Whether cancelled externally.
    pub cancelled: bool,
}

struct Node<S, A> {
    state: S,
    /// Action leading here from the parent.
    action: Option<A>,
    parent: Option<usize>,
    children: Vec<usize>,
    untried: Vec<A>,
    terminal: bool,
    visits: usize,
    value_sum: f64,
}

impl<S, A> Node<S, A> {
    fn mean(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.value_sum / self.visits as f64
        }
    }
}

/// Monte Carlo tree search with UCB1 selection (UCT).
///
/// # Examples
///
/// ```
/// use rand::Rng;
/// use u_plan::mcts::{MctsConfig, MctsProblem, MctsRunner};
///
/// /// One move: take 1 or 0.
/// struct Choice;
///
/// impl MctsProblem for Choice {
///     type State = Option<u8>;
///     type Action = u8;
///     fn actions(&self, s: &Option<u8>) -> Vec<u8> {
///         if s.is_none() { vec![0, 1] } else { vec![] }
///     }
///     fn apply<R: Rng>(&self, _s: &Option<u8>, a: &u8, _rng: &mut R) -> Option<u8> {
///         Some(*a)
///     }
///     fn is_terminal(&self, s: &Option<u8>) -> bool { s.is_some() }
///     fn reward(&self, s: &Option<u8>) -> f64 { s.map_or(0.0, f64::from) }
/// }
///
/// let config = MctsConfig::default().with_iterations(200).with_seed(1);
/// let result = MctsRunner::run(&Choice, None, &config).unwrap();
/// assert_eq!(result.best_action, Some(1));
/// ```
pub struct MctsRunner;

impl MctsRunner {
    /// Searches from `root` and returns the recommended first action.
    pub fn run<P>(
        problem: &P,
        root: P::State,
        config: &MctsConfig,
    ) -> Result<MctsResult<P::Action>>
    where
        P: MctsProblem,
    {
        Self::run_with_cancel(problem, root, config, None)
    }

    /// Runs with an optional cancellation token, checked before every
    /// iteration.
    pub fn run_with_cancel<P>(
        problem: &P,
        root: P::State,
        config: &MctsConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<MctsResult<P::Action>>
    where
        P: MctsProblem,
    {
        config.validate()?;
        let mut rng = rng_from(config.seed);

        let root_actions = problem.actions(&root);
        if root_actions.is_empty() || problem.is_terminal(&root) {
            log::debug!("mcts root has no actions");
            return Ok(MctsResult {
                best_action: None,
                children: Vec::new(),
                iterations: 0,
                tree_size: 1,
                cancelled: false,
            });
        }

        let mut nodes: Vec<Node<P::State, P::Action>> = vec![Node {
            state: root,
            action: None,
            parent: None,
            children: Vec::new(),
            untried: root_actions,
            terminal: false,
            visits: 0,
            value_sum: 0.0,
        }];

        log::debug!(
            "mcts start: {} root actions, iterations={}, C={}",
            nodes[0].untried.len(),
            config.iterations,
            config.exploration
        );

        let mut iterations = 0;
        let mut cancelled = false;
        while iterations < config.iterations {
            if cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed)) {
                cancelled = true;
                break;
            }
            iterations += 1;

            // Selection
            let mut current = 0;
            while nodes[current].untried.is_empty()
                && !nodes[current].children.is_empty()
                && !nodes[current].terminal
            {
                current = select_child(&nodes, current, config.exploration);
            }

            // Expansion
            if !nodes[current].terminal && !nodes[current].untried.is_empty() {
                let pick = rng.random_range(0..nodes[current].untried.len());
                let action = nodes[current].untried.swap_remove(pick);
                let state = problem.apply(&nodes[current].state, &action, &mut rng);
                let terminal = problem.is_terminal(&state);
                let untried = if terminal {
                    Vec::new()
                } else {
                    problem.actions(&state)
                };
                let id = nodes.len();
                nodes.push(Node {
                    state,
                    action: Some(action),
                    parent: Some(current),
                    children: Vec::new(),
                    untried,
                    terminal,
                    visits: 0,
                    value_sum: 0.0,
                });
                nodes[current].children.push(id);
                current = id;
            }

            let reward = rollout(problem, &nodes[current].state, config.max_depth, &mut rng);

            // Backpropagation
            let mut walk = Some(current);
            while let Some(i) = walk {
                nodes[i].visits += 1;
                nodes[i].value_sum += reward;
                walk = nodes[i].parent;
            }
        }

        let children: Vec<ActionStats<P::Action>> = nodes[0]
            .children
            .iter()
            .filter_map(|&c| {
                nodes[c].action.clone().map(|action| ActionStats {
                    action,
                    visits: nodes[c].visits,
                    mean_value: nodes[c].mean(),
                })
            })
            .collect();

        let mut best: Option<&ActionStats<P::Action>> = None;
        for stats in &children {
            if best.is_none_or(|b| stats.visits > b.visits) {
                best = Some(stats);
            }
        }
        let best_action = best.map(|s| s.action.clone());

        log::debug!(
            "mcts finished: iterations={iterations}, tree={}, best visits={}",
            nodes.len(),
            best.map_or(0, |s| s.visits)
        );

        Ok(MctsResult {
            best_action,
            children,
            iterations,
            tree_size: nodes.len(),
            cancelled,
        })
    }
}

/// Child of `parent` with the highest UCB1 score; first on ties.
fn select_child<S, A>(nodes: &[Node<S, A>], parent: usize, c: f64) -> usize {
    let ln_parent = (nodes[parent].visits.max(1) as f64).ln();
    let mut best = (nodes[parent].children[0], f64::NEG_INFINITY);
    for &child in &nodes[parent].children {
        let node = &nodes[child];
        let score = if node.visits == 0 {
            f64::INFINITY
        } else {
            node.mean() + c * (ln_parent / node.visits as f64).sqrt()
        };
        if score > best.1 {
            best = (child, score);
        }
    }
    best.0
}

/// Uniform random playout from `state`.
fn rollout<P: MctsProblem, R: Rng>(
    problem: &P,
    state: &P::State,
    max_depth: usize,
    rng: &mut R,
) -> f64 {
    let mut state = state.clone();
    for _ in 0..max_depth {
        if problem.is_terminal(&state) {
            break;
        }
        let actions = problem.actions(&state);
        if actions.is_empty() {
            break;
        }
        let action = &actions[rng.random_range(0..actions.len())];
        state = problem.apply(&state, action, rng);
    }
    problem.reward(&state)
}
