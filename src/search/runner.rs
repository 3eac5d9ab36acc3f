//! Graph search execution.
//!
//! All four strategies share one node arena: every generated node records
//! its parent index, so the path is rebuilt by walking parent links from the
//! goal. DFS and IDA* use explicit stacks; nothing here recurses.

use super::config::{Algorithm, SearchConfig};
use super::types::{SearchProblem, Successor};
use crate::error::{PlanError, Result};
use crate::keying::StateKey;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One edge of a returned path.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathStep<A> {
    /// Action taken.
    pub action: A,
    /// Cost of this edge.
    pub cost: f64,
}

/// Result of a graph search run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchResult<S, A> {
    /// Whether a goal state was reached.
    pub found: bool,

    /// Actions from the initial state to the goal (empty if not found or
    /// if the initial state is a goal).
    pub path: Vec<PathStep<A>>,

    /// States along the path, including the initial and goal states.
    pub states: Vec<S>,

    /// Sum of edge costs along `path`.
    pub total_cost: f64,

    /// Number of node expansions (goal tests).
    pub iterations: usize,

    /// Number of nodes generated (pushed to a frontier).
    pub nodes_generated: usize,

    /// Whether the reachable space was fully explored without finding a goal.
    ///
    /// `found == false && exhausted == false` means the search stopped on a
    /// budget (iterations, depth) and the answer is unknown.
    pub exhausted: bool,

    /// Whether cancelled externally.
    pub cancelled: bool,
}

impl<S, A> SearchResult<S, A> {
    fn not_found(
        iterations: usize,
        nodes_generated: usize,
        exhausted: bool,
        cancelled: bool,
    ) -> Self {
        Self {
            found: false,
            path: Vec::new(),
            states: Vec::new(),
            total_cost: f64::INFINITY,
            iterations,
            nodes_generated,
            exhausted,
            cancelled,
        }
    }

    /// Number of edges in the path.
    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// The actions of the path, in order.
    pub fn actions(&self) -> Vec<&A> {
        self.path.iter().map(|s| &s.action).collect()
    }
}

/// A node in the search arena.
struct SearchNode<S, A> {
    state: S,
    g_cost: f64,
    parent: Option<usize>,
    action: Option<A>,
    step_cost: f64,
    depth: usize,
}

/// Open-list entry for A*. Orders by lowest `f`, then deepest `g`.
struct OpenEntry {
    f_cost: f64,
    g_cost: f64,
    index: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .f_cost
            .total_cmp(&self.f_cost)
            .then_with(|| self.g_cost.total_cmp(&other.g_cost))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for OpenEntry {}

/// Executes graph search strategies.
///
/// # Examples
///
/// ```
/// use u_plan::search::{GraphSearch, SearchConfig, SearchProblem, Successor};
///
/// struct Line;
///
/// impl SearchProblem for Line {
///     type State = i64;
///     type Action = &'static str;
///     fn initial_state(&self) -> i64 { 0 }
///     fn is_goal(&self, s: &i64) -> bool { *s == 3 }
///     fn successors(&self, s: &i64) -> Vec<Successor<i64, &'static str>> {
///         vec![Successor::new(s + 1, "inc", 1.0)]
///     }
/// }
///
/// let result = GraphSearch::a_star(&Line, &SearchConfig::default()).unwrap();
/// assert!(result.found);
/// assert_eq!(result.total_cost, 3.0);
/// assert_eq!(result.actions(), vec![&"inc"; 3]);
/// ```
pub struct GraphSearch;

impl GraphSearch {
    /// Runs the selected algorithm.
    pub fn run<P: SearchProblem>(
        problem: &P,
        config: &SearchConfig,
        algorithm: Algorithm,
    ) -> Result<SearchResult<P::State, P::Action>> {
        Self::run_with_cancel(problem, config, algorithm, None)
    }

    /// Runs the selected algorithm with an optional cancellation token.
    ///
    /// The flag is checked before every expansion.
    pub fn run_with_cancel<P: SearchProblem>(
        problem: &P,
        config: &SearchConfig,
        algorithm: Algorithm,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<SearchResult<P::State, P::Action>> {
        config.validate()?;
        let result = match algorithm {
            Algorithm::Bfs => bfs(problem, config, &cancel),
            Algorithm::Dfs => dfs(problem, config, &cancel),
            Algorithm::AStar => a_star(problem, config, &cancel),
            Algorithm::IdaStar => ida_star(problem, config, &cancel),
        }?;

        if !result.found && !result.exhausted && !result.cancelled {
            log::warn!(
                "{algorithm:?} stopped on its budget after {} iterations; goal reachability unknown",
                result.iterations
            );
        }
        log::debug!(
            "{algorithm:?} finished: found={}, cost={}, iterations={}, generated={}",
            result.found,
            result.total_cost,
            result.iterations,
            result.nodes_generated
        );
        Ok(result)
    }

    /// A* search ordered by `f = g + heuristic`.
    pub fn a_star<P: SearchProblem>(
        problem: &P,
        config: &SearchConfig,
    ) -> Result<SearchResult<P::State, P::Action>> {
        Self::run(problem, config, Algorithm::AStar)
    }

    /// Breadth-first search.
    pub fn bfs<P: SearchProblem>(
        problem: &P,
        config: &SearchConfig,
    ) -> Result<SearchResult<P::State, P::Action>> {
        Self::run(problem, config, Algorithm::Bfs)
    }

    /// Depth-first search limited to `max_depth` edges.
    pub fn dfs<P: SearchProblem>(
        problem: &P,
        config: &SearchConfig,
        max_depth: usize,
    ) -> Result<SearchResult<P::State, P::Action>> {
        let config = config.clone().with_max_depth(max_depth);
        Self::run(problem, &config, Algorithm::Dfs)
    }

    /// Iterative-deepening A*.
    pub fn ida_star<P: SearchProblem>(
        problem: &P,
        config: &SearchConfig,
    ) -> Result<SearchResult<P::State, P::Action>> {
        Self::run(problem, config, Algorithm::IdaStar)
    }
}

fn is_cancelled(cancel: &Option<Arc<AtomicBool>>) -> bool {
    cancel
        .as_ref()
        .is_some_and(|flag| flag.load(Ordering::Relaxed))
}

fn check_cost<S, A>(succ: &Successor<S, A>) -> Result<()> {
    if !succ.cost.is_finite() || succ.cost < 0.0 {
        return Err(PlanError::InvalidModel(format!(
            "edge cost must be finite and non-negative, got {}",
            succ.cost
        )));
    }
    Ok(())
}

fn heuristic<P: SearchProblem>(problem: &P, state: &P::State) -> Result<f64> {
    let h = problem.heuristic(state);
    if h.is_nan() {
        return Err(PlanError::InvalidModel("heuristic returned NaN".into()));
    }
    Ok(h)
}

fn root<P: SearchProblem>(problem: &P) -> SearchNode<P::State, P::Action> {
    SearchNode {
        state: problem.initial_state(),
        g_cost: 0.0,
        parent: None,
        action: None,
        step_cost: 0.0,
        depth: 0,
    }
}

fn child<S, A>(
    parent: usize,
    parent_node: &SearchNode<S, A>,
    succ: Successor<S, A>,
) -> SearchNode<S, A> {
    SearchNode {
        g_cost: parent_node.g_cost + succ.cost,
        depth: parent_node.depth + 1,
        state: succ.state,
        parent: Some(parent),
        action: Some(succ.action),
        step_cost: succ.cost,
    }
}

/// Walks parent links from `goal` back to the root.
fn reconstruct<S: Clone, A: Clone>(
    nodes: &[SearchNode<S, A>],
    goal: usize,
    iterations: usize,
) -> SearchResult<S, A> {
    let mut path = Vec::new();
    let mut states = Vec::new();
    let mut current = Some(goal);
    while let Some(i) = current {
        let node = &nodes[i];
        states.push(node.state.clone());
        if let Some(action) = &node.action {
            path.push(PathStep {
                action: action.clone(),
                cost: node.step_cost,
            });
        }
        current = node.parent;
    }
    path.reverse();
    states.reverse();

    SearchResult {
        found: true,
        total_cost: nodes[goal].g_cost,
        path,
        states,
        iterations,
        nodes_generated: nodes.len(),
        exhausted: false,
        cancelled: false,
    }
}

fn a_star<P: SearchProblem>(
    problem: &P,
    config: &SearchConfig,
    cancel: &Option<Arc<AtomicBool>>,
) -> Result<SearchResult<P::State, P::Action>> {
    let start = root(problem);
    let h0 = heuristic(problem, &start.state)?;

    let mut best_g: HashMap<<P::State as StateKey>::Key, f64> = HashMap::new();
    let mut closed: HashSet<<P::State as StateKey>::Key> = HashSet::new();
    let mut open = BinaryHeap::new();

    best_g.insert(start.state.state_key(), 0.0);
    let mut nodes = vec![start];
    open.push(OpenEntry {
        f_cost: h0,
        g_cost: 0.0,
        index: 0,
    });

    let mut iterations = 0usize;

    while let Some(entry) = open.pop() {
        if is_cancelled(cancel) {
            return Ok(SearchResult::not_found(iterations, nodes.len(), false, true));
        }

        let key = nodes[entry.index].state.state_key();
        if closed.contains(&key) {
            continue;
        }
        // Stale entry superseded by a cheaper path to the same key.
        if best_g.get(&key).is_some_and(|&g| entry.g_cost > g) {
            continue;
        }

        if iterations >= config.max_iterations {
            return Ok(SearchResult::not_found(iterations, nodes.len(), false, false));
        }
        iterations += 1;

        if problem.is_goal(&nodes[entry.index].state) {
            return Ok(reconstruct(&nodes, entry.index, iterations));
        }
        closed.insert(key);

        for succ in problem.successors(&nodes[entry.index].state) {
            check_cost(&succ)?;
            let tentative = nodes[entry.index].g_cost + succ.cost;
            let succ_key = succ.state.state_key();
            if best_g.get(&succ_key).is_some_and(|&g| tentative >= g) {
                continue;
            }
            // Strictly cheaper: (re)open, even if previously closed.
            let h = heuristic(problem, &succ.state)?;
            closed.remove(&succ_key);
            best_g.insert(succ_key, tentative);

            let node = child(entry.index, &nodes[entry.index], succ);
            nodes.push(node);
            open.push(OpenEntry {
                f_cost: tentative + h,
                g_cost: tentative,
                index: nodes.len() - 1,
            });
        }
    }

    Ok(SearchResult::not_found(iterations, nodes.len(), true, false))
}

fn bfs<P: SearchProblem>(
    problem: &P,
    config: &SearchConfig,
    cancel: &Option<Arc<AtomicBool>>,
) -> Result<SearchResult<P::State, P::Action>> {
    let start = root(problem);
    let mut visited = HashSet::new();
    visited.insert(start.state.state_key());

    let mut nodes = vec![start];
    let mut frontier = VecDeque::from([0usize]);
    let mut iterations = 0usize;

    while let Some(index) = frontier.pop_front() {
        if is_cancelled(cancel) {
            return Ok(SearchResult::not_found(iterations, nodes.len(), false, true));
        }
        if iterations >= config.max_iterations {
            return Ok(SearchResult::not_found(iterations, nodes.len(), false, false));
        }
        iterations += 1;

        if problem.is_goal(&nodes[index].state) {
            return Ok(reconstruct(&nodes, index, iterations));
        }

        for succ in problem.successors(&nodes[index].state) {
            check_cost(&succ)?;
            if !visited.insert(succ.state.state_key()) {
                continue;
            }
            let node = child(index, &nodes[index], succ);
            nodes.push(node);
            frontier.push_back(nodes.len() - 1);
        }
    }

    Ok(SearchResult::not_found(iterations, nodes.len(), true, false))
}

fn dfs<P: SearchProblem>(
    problem: &P,
    config: &SearchConfig,
    cancel: &Option<Arc<AtomicBool>>,
) -> Result<SearchResult<P::State, P::Action>> {
    let start = root(problem);
    // Shallowest depth at which each key has been pushed.
    let mut best_depth = HashMap::new();
    best_depth.insert(start.state.state_key(), 0usize);

    let mut nodes = vec![start];
    let mut stack = vec![0usize];
    let mut iterations = 0usize;
    let mut depth_limited = false;

    while let Some(index) = stack.pop() {
        if is_cancelled(cancel) {
            return Ok(SearchResult::not_found(iterations, nodes.len(), false, true));
        }
        if iterations >= config.max_iterations {
            return Ok(SearchResult::not_found(iterations, nodes.len(), false, false));
        }
        iterations += 1;

        if problem.is_goal(&nodes[index].state) {
            return Ok(reconstruct(&nodes, index, iterations));
        }

        let successors = problem.successors(&nodes[index].state);
        if nodes[index].depth >= config.max_depth {
            depth_limited |= !successors.is_empty();
            continue;
        }

        let depth = nodes[index].depth + 1;
        let mut children = Vec::with_capacity(successors.len());
        for succ in successors {
            check_cost(&succ)?;
            let key = succ.state.state_key();
            if best_depth.get(&key).is_some_and(|&d| d <= depth) {
                continue;
            }
            best_depth.insert(key, depth);
            let node = child(index, &nodes[index], succ);
            nodes.push(node);
            children.push(nodes.len() - 1);
        }
        // First successor on top of the stack.
        stack.extend(children.into_iter().rev());
    }

    Ok(SearchResult::not_found(
        iterations,
        nodes.len(),
        !depth_limited,
        false,
    ))
}

/// Entry on the IDA* path.
struct PathEntry<S, A, K> {
    state: S,
    key: K,
    g_cost: f64,
    action: Option<A>,
    step_cost: f64,
}

fn ida_star<P: SearchProblem>(
    problem: &P,
    config: &SearchConfig,
    cancel: &Option<Arc<AtomicBool>>,
) -> Result<SearchResult<P::State, P::Action>> {
    let initial = problem.initial_state();
    let mut bound = heuristic(problem, &initial)?;
    let mut iterations = 0usize;
    let mut generated = 1usize;
    let mut round = 0usize;

    loop {
        round += 1;
        log::trace!("ida* round {round}: bound={bound}");

        let mut next_bound = f64::INFINITY;
        let mut depth_limited = false;

        let key = initial.state_key();
        let mut on_path = HashSet::from([key.clone()]);
        let mut path = vec![PathEntry {
            state: initial.clone(),
            key,
            g_cost: 0.0,
            action: None,
            step_cost: 0.0,
        }];

        if iterations >= config.max_iterations {
            return Ok(SearchResult::not_found(iterations, generated, false, false));
        }
        iterations += 1;
        if problem.is_goal(&initial) {
            return Ok(path_result(path, iterations, generated));
        }
        let mut frames = vec![problem.successors(&initial).into_iter()];

        while let Some(frame) = frames.last_mut() {
            if is_cancelled(cancel) {
                return Ok(SearchResult::not_found(iterations, generated, false, true));
            }

            let Some(succ) = frame.next() else {
                frames.pop();
                if let Some(entry) = path.pop() {
                    on_path.remove(&entry.key);
                }
                continue;
            };
            check_cost(&succ)?;

            let succ_key = succ.state.state_key();
            if on_path.contains(&succ_key) {
                continue;
            }

            let g = path.last().map_or(0.0, |e| e.g_cost) + succ.cost;
            let f = g + heuristic(problem, &succ.state)?;
            if f > bound + 1e-9 {
                next_bound = next_bound.min(f);
                continue;
            }
            if path.len() > config.max_depth {
                depth_limited = true;
                continue;
            }

            if iterations >= config.max_iterations {
                return Ok(SearchResult::not_found(iterations, generated, false, false));
            }
            iterations += 1;
            generated += 1;

            let successors = if problem.is_goal(&succ.state) {
                None
            } else {
                Some(problem.successors(&succ.state))
            };

            on_path.insert(succ_key.clone());
            path.push(PathEntry {
                state: succ.state,
                key: succ_key,
                g_cost: g,
                action: Some(succ.action),
                step_cost: succ.cost,
            });

            match successors {
                None => return Ok(path_result(path, iterations, generated)),
                Some(successors) => frames.push(successors.into_iter()),
            }
        }

        if !next_bound.is_finite() {
            // Nothing was pruned by the bound: the space below max_depth is exhausted.
            return Ok(SearchResult::not_found(
                iterations,
                generated,
                !depth_limited,
                false,
            ));
        }
        bound = next_bound;
    }
}

fn path_result<S, A, K>(
    path: Vec<PathEntry<S, A, K>>,
    iterations: usize,
    generated: usize,
) -> SearchResult<S, A> {
    let total_cost = path.last().map_or(0.0, |e| e.g_cost);
    let mut steps = Vec::with_capacity(path.len());
    let mut states = Vec::with_capacity(path.len());
    for entry in path {
        if let Some(action) = entry.action {
            steps.push(PathStep {
                action,
                cost: entry.step_cost,
            });
        }
        states.push(entry.state);
    }
    SearchResult {
        found: true,
        path: steps,
        states,
        total_cost,
        iterations,
        nodes_generated: generated,
        exhausted: false,
        cancelled: false,
    }
}
