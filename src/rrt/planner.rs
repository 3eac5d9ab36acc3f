//! RRT and RRT* execution.

use super::config::{Planner, RrtConfig};
use super::types::{distance, MotionProblem};
use crate::error::Result;
use crate::random::rng_from;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Slack for RRT* cost comparisons.
const COST_EPSILON: f64 = 1e-12;

/// One node of the exploration tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeNode {
    pub point: Vec<f64>,
    /// `None` for the root (the start).
    pub parent: Option<usize>,
    /// Path length from the root.
    pub cost: f64,
}

/// Result of a planning run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RrtResult {
    /// Whether the goal was connected.
    pub found: bool,

    /// Waypoints from start to goal, both included. Empty if not found.
    pub path: Vec<Vec<f64>>,

    /// Length of `path` (`INFINITY` if not found).
    pub cost: f64,

    /// Samples drawn.
    pub iterations: usize,

    /// The exploration tree; index 0 is the start.
    pub tree: Vec<TreeNode>,

    /// Parent changes made by RRT* rewiring.
    pub rewires: usize,

    /// Whether cancelled externally.
    pub cancelled: bool,
}

/// Tree arena with child lists for subtree cost updates.
struct Tree {
    nodes: Vec<TreeNode>,
    children: Vec<Vec<usize>>,
}

impl Tree {
    fn new(root: Vec<f64>) -> Self {
        Self {
            nodes: vec![TreeNode {
                point: root,
                parent: None,
                cost: 0.0,
            }],
            children: vec![Vec::new()],
        }
    }

    fn push(&mut self, point: Vec<f64>, parent: usize, cost: f64) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            point,
            parent: Some(parent),
            cost,
        });
        self.children.push(Vec::new());
        self.children[parent].push(id);
        id
    }

    fn nearest(&self, point: &[f64]) -> usize {
        let mut best = (0, f64::INFINITY);
        for (i, node) in self.nodes.iter().enumerate() {
            let d = distance(&node.point, point);
            if d < best.1 {
                best = (i, d);
            }
        }
        best.0
    }

    fn within(&self, point: &[f64], radius: f64) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| distance(&n.point, point) <= radius)
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether `ancestor` lies on the root path of `node` (inclusive).
    fn is_ancestor(&self, ancestor: usize, node: usize) -> bool {
        let mut current = Some(node);
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.nodes[i].parent;
        }
        false
    }

    /// Moves `node` under `new_parent` and refreshes the costs of its subtree.
    fn reparent(&mut self, node: usize, new_parent: usize) {
        if let Some(old) = self.nodes[node].parent {
            self.children[old].retain(|&c| c != node);
        }
        self.nodes[node].parent = Some(new_parent);
        self.children[new_parent].push(node);

        let mut stack = vec![node];
        while let Some(i) = stack.pop() {
            if let Some(p) = self.nodes[i].parent {
                self.nodes[i].cost =
                    self.nodes[p].cost + distance(&self.nodes[p].point, &self.nodes[i].point);
            }
            stack.extend_from_slice(&self.children[i]);
        }
    }

    fn path_to(&self, node: usize) -> Vec<Vec<f64>> {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(i) = current {
            path.push(self.nodes[i].point.clone());
            current = self.nodes[i].parent;
        }
        path.reverse();
        path
    }
}

/// Moves from `from` toward `to` by at most `step`.
fn steer(from: &[f64], to: &[f64], step: f64) -> Vec<f64> {
    let d = distance(from, to);
    if d <= step {
        return to.to_vec();
    }
    let ratio = step / d;
    from.iter()
        .zip(to)
        .map(|(a, b)| a + (b - a) * ratio)
        .collect()
}

fn is_cancelled(cancel: &Option<Arc<AtomicBool>>) -> bool {
    cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed))
}

/// Sampling-based motion planner.
///
/// # Examples
///
/// ```
/// use u_plan::rrt::{Aabb, MotionProblem, RrtConfig, RrtRunner};
///
/// let problem = MotionProblem::new(
///     vec![1.0, 1.0],
///     vec![9.0, 9.0],
///     Aabb::new(vec![0.0, 0.0], vec![10.0, 10.0]),
/// );
/// let result = RrtRunner::rrt(&problem, &RrtConfig::default().with_seed(1)).unwrap();
/// assert!(result.found);
/// assert_eq!(result.path.first(), Some(&vec![1.0, 1.0]));
/// assert_eq!(result.path.last(), Some(&vec![9.0, 9.0]));
/// ```
pub struct RrtRunner;

impl RrtRunner {
    /// Plain RRT.
    pub fn rrt(problem: &MotionProblem, config: &RrtConfig) -> Result<RrtResult> {
        Self::run_with_cancel(problem, config, Planner::Rrt, None)
    }

    /// RRT* with rewiring.
    pub fn rrt_star(problem: &MotionProblem, config: &RrtConfig) -> Result<RrtResult> {
        Self::run_with_cancel(problem, config, Planner::RrtStar, None)
    }

    /// Runs the chosen planner with an optional cancellation token, checked
    /// before every sample.
    pub fn run_with_cancel(
        problem: &MotionProblem,
        config: &RrtConfig,
        planner: Planner,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<RrtResult> {
        config.validate()?;
        problem.validate()?;

        let mut rng = rng_from(config.seed);
        let star = planner == Planner::RrtStar;
        let refine = star && config.refine_after_goal;
        let tolerance = config.tolerance();
        let goal = &problem.goal;

        log::debug!(
            "{planner:?} start: dim={}, obstacles={}, max_iterations={}",
            problem.dim(),
            problem.obstacles.len(),
            config.max_iterations
        );

        let mut tree = Tree::new(problem.start.clone());
        // Nodes with a free segment to the goal within tolerance.
        let mut goal_links: Vec<usize> = Vec::new();
        if distance(&problem.start, goal) <= tolerance && problem.segment_free(&problem.start, goal)
        {
            goal_links.push(0);
        }

        let mut iterations = 0;
        let mut rewires = 0;
        let mut cancelled = false;

        while iterations < config.max_iterations && (goal_links.is_empty() || refine) {
            if is_cancelled(&cancel) {
                cancelled = true;
                break;
            }
            iterations += 1;

            let sample: Vec<f64> = if rng.random::<f64>() < config.goal_bias {
                goal.clone()
            } else {
                problem
                    .bounds
                    .min
                    .iter()
                    .zip(&problem.bounds.max)
                    .map(|(lo, hi)| rng.random_range(*lo..=*hi))
                    .collect()
            };

            let nearest = tree.nearest(&sample);
            let point = steer(&tree.nodes[nearest].point, &sample, config.step_size);
            let step = distance(&tree.nodes[nearest].point, &point);
            if step <= 0.0 || !problem.segment_free(&tree.nodes[nearest].point, &point) {
                continue;
            }

            let mut parent = nearest;
            let mut cost = tree.nodes[nearest].cost + step;
            let neighbors = if star {
                tree.within(&point, config.rewire_radius)
            } else {
                Vec::new()
            };
            for &nb in &neighbors {
                let via = tree.nodes[nb].cost + distance(&tree.nodes[nb].point, &point);
                if via + COST_EPSILON < cost && problem.segment_free(&tree.nodes[nb].point, &point)
                {
                    parent = nb;
                    cost = via;
                }
            }

            let id = tree.push(point, parent, cost);

            for &nb in &neighbors {
                if nb == parent {
                    continue;
                }
                let via = cost + distance(&tree.nodes[id].point, &tree.nodes[nb].point);
                if via + COST_EPSILON < tree.nodes[nb].cost
                    && !tree.is_ancestor(nb, id)
                    && problem.segment_free(&tree.nodes[id].point, &tree.nodes[nb].point)
                {
                    tree.reparent(nb, id);
                    rewires += 1;
                }
            }

            let to_goal = distance(&tree.nodes[id].point, goal);
            if to_goal <= tolerance && problem.segment_free(&tree.nodes[id].point, goal) {
                if goal_links.is_empty() {
                    log::debug!(
                        "{planner:?} reached goal after {iterations} iterations, cost={:.4}",
                        cost + to_goal
                    );
                }
                goal_links.push(id);
            }
        }

        // Rewiring may have lowered costs since a link was recorded.
        let best = goal_links
            .iter()
            .map(|&i| (i, tree.nodes[i].cost + distance(&tree.nodes[i].point, goal)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let (found, path, cost) = match best {
            Some((node, cost)) => {
                let mut path = tree.path_to(node);
                if distance(&tree.nodes[node].point, goal) > 0.0 {
                    path.push(goal.clone());
                }
                (true, path, cost)
            }
            None => (false, Vec::new(), f64::INFINITY),
        };

        if !found && !cancelled {
            log::warn!("{planner:?} found no path within {iterations} iterations");
        }
        log::debug!(
            "{planner:?} finished: found={found}, cost={cost:.4}, iterations={iterations}, tree={}, rewires={rewires}",
            tree.nodes.len()
        );

        Ok(RrtResult {
            found,
            path,
            cost,
            iterations,
            tree: tree.nodes,
            rewires,
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use crate::rrt::Aabb;

    fn open_field() -> MotionProblem {
        MotionProblem::new(
            vec![1.0, 1.0],
            vec![9.0, 9.0],
            Aabb::new(vec![0.0, 0.0], vec![10.0, 10.0]),
        )
    }

    fn path_length(path: &[Vec<f64>]) -> f64 {
        path.windows(2).map(|w| distance(&w[0], &w[1])).sum()
    }

    fn assert_tree_consistent(tree: &[TreeNode]) {
        assert_eq!(tree[0].parent, None);
        for (i, node) in tree.iter().enumerate().skip(1) {
            let p = node.parent.expect("non-root node has a parent");
            let expected = tree[p].cost + distance(&tree[p].point, &node.point);
            assert!(
                (node.cost - expected).abs() < 1e-9,
                "node {i}: cost {} != {expected}",
                node.cost
            );
            // Walking up terminates at the root.
            let mut steps = 0;
            let mut current = Some(i);
            while let Some(c) = current {
                current = tree[c].parent;
                steps += 1;
                assert!(steps <= tree.len(), "cycle through node {i}");
            }
        }
    }

    // ---- RRT ----

    #[test]
    fn test_open_field_success_rate() {
        let problem = open_field();
        let successes = (0..100)
            .filter(|&seed| {
                RrtRunner::rrt(&problem, &RrtConfig::default().with_seed(seed))
                    .unwrap()
                    .found
            })
            .count();
        assert!(successes >= 99, "only {successes}/100 runs reached the goal");
    }

    #[test]
    fn test_path_shape() {
        let problem = open_field();
        let result = RrtRunner::rrt(&problem, &RrtConfig::default().with_seed(3)).unwrap();

        assert!(result.found);
        assert_eq!(result.path[0], problem.start);
        assert_eq!(result.path.last(), Some(&problem.goal));
        assert!((path_length(&result.path) - result.cost).abs() < 1e-9);
        assert!(result.cost >= distance(&problem.start, &problem.goal) - 1e-9);
        assert_eq!(result.rewires, 0);
        for w in result.path.windows(2) {
            assert!(distance(&w[0], &w[1]) <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_obstacle_avoidance() {
        let problem = MotionProblem::new(
            vec![1.0, 1.0],
            vec![9.0, 1.0],
            Aabb::new(vec![0.0, 0.0], vec![10.0, 10.0]),
        )
        .with_obstacle(Aabb::new(vec![4.0, 0.0], vec![6.0, 8.0]));

        for seed in 0..5 {
            let result = RrtRunner::rrt(&problem, &RrtConfig::default().with_seed(seed)).unwrap();
            assert!(result.found, "seed {seed}");
            for w in result.path.windows(2) {
                assert!(problem.segment_free(&w[0], &w[1]));
            }
            // Has to climb over the wall.
            assert!(result.path.iter().any(|p| p[1] > 8.0));
        }
    }

    #[test_log::test]
    fn test_blocked_goal() {
        let problem = MotionProblem::new(
            vec![1.0, 5.0],
            vec![9.0, 5.0],
            Aabb::new(vec![0.0, 0.0], vec![10.0, 10.0]),
        )
        .with_obstacle(Aabb::new(vec![4.0, 0.0], vec![6.0, 10.0]));

        let config = RrtConfig::default().with_seed(0).with_max_iterations(300);
        let result = RrtRunner::rrt(&problem, &config).unwrap();
        assert!(!result.found);
        assert!(result.path.is_empty());
        assert_eq!(result.cost, f64::INFINITY);
        assert_eq!(result.iterations, 300);
        assert!(result.tree.iter().all(|n| n.point[0] < 4.0));
    }

    #[test]
    fn test_start_within_tolerance() {
        let problem = MotionProblem::new(
            vec![5.0, 5.0],
            vec![5.5, 5.0],
            Aabb::new(vec![0.0, 0.0], vec![10.0, 10.0]),
        );
        let result = RrtRunner::rrt(&problem, &RrtConfig::default().with_seed(0)).unwrap();
        assert!(result.found);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.path.len(), 2);
        assert!((result.cost - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let problem = open_field();
        let config = RrtConfig::default().with_seed(99);
        let a = RrtRunner::rrt(&problem, &config).unwrap();
        let b = RrtRunner::rrt(&problem, &config).unwrap();
        assert_eq!(a.path, b.path);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_three_dimensional() {
        let problem = MotionProblem::new(
            vec![0.5, 0.5, 0.5],
            vec![4.5, 4.5, 4.5],
            Aabb::new(vec![0.0; 3], vec![5.0; 3]),
        )
        .with_obstacle(Aabb::new(vec![2.0, 2.0, 0.0], vec![3.0, 3.0, 5.0]));
        let result = RrtRunner::rrt(&problem, &RrtConfig::default().with_seed(5)).unwrap();
        assert!(result.found);
        for w in result.path.windows(2) {
            assert!(problem.segment_free(&w[0], &w[1]));
        }
    }

    #[test]
    fn test_cancellation() {
        let cancel = Arc::new(AtomicBool::new(true));
        let result = RrtRunner::run_with_cancel(
            &open_field(),
            &RrtConfig::default().with_seed(0),
            Planner::RrtStar,
            Some(cancel),
        )
        .unwrap();
        assert!(result.cancelled);
        assert!(!result.found);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.tree.len(), 1);
    }

    #[test]
    fn test_invalid_inputs() {
        let blocked = open_field().with_obstacle(Aabb::new(vec![8.0, 8.0], vec![10.0, 10.0]));
        assert!(matches!(
            RrtRunner::rrt(&blocked, &RrtConfig::default()),
            Err(PlanError::InvalidModel(_))
        ));
        assert!(matches!(
            RrtRunner::rrt_star(&open_field(), &RrtConfig::default().with_step_size(-1.0)),
            Err(PlanError::InvalidConfig(_))
        ));
    }

    // ---- RRT* ----

    #[test]
    fn test_rrt_star_tree_invariants() {
        let problem = open_field().with_obstacle(Aabb::new(vec![4.0, 4.0], vec![6.0, 6.0]));
        let config = RrtConfig::default()
            .with_seed(11)
            .with_max_iterations(1500)
            .with_refine_after_goal(true);
        let result = RrtRunner::rrt_star(&problem, &config).unwrap();

        assert!(result.found);
        assert_eq!(result.iterations, 1500);
        assert!(result.rewires > 0);
        assert_tree_consistent(&result.tree);
        assert!((path_length(&result.path) - result.cost).abs() < 1e-9);
        for w in result.path.windows(2) {
            assert!(problem.segment_free(&w[0], &w[1]));
        }
    }

    #[test]
    fn test_rrt_star_not_worse_than_rrt() {
        let problem = open_field();
        let seeds = 0..20u64;
        let mut rrt_total = 0.0;
        let mut star_total = 0.0;
        for seed in seeds.clone() {
            let config = RrtConfig::default()
                .with_seed(seed)
                .with_max_iterations(2000)
                .with_refine_after_goal(true);
            let rrt = RrtRunner::rrt(&problem, &config).unwrap();
            let star = RrtRunner::rrt_star(&problem, &config).unwrap();
            assert!(rrt.found && star.found, "seed {seed}");
            rrt_total += rrt.cost;
            star_total += star.cost;
        }
        let n = seeds.count() as f64;
        assert!(
            star_total / n <= rrt_total / n,
            "rrt* average {} > rrt average {}",
            star_total / n,
            rrt_total / n
        );
        // Straight line is sqrt(128).
        assert!(star_total / n < 128f64.sqrt() * 1.1);
    }
}
