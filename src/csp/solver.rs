//! Arc consistency and backtracking search.

use super::config::CspConfig;
use super::model::{Assignment, Csp};
use crate::error::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of the consistency pre-pass (node consistency + AC-3).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ac3Outcome<V> {
    /// `false` if some domain became empty: the problem has no solution.
    pub consistent: bool,
    /// Reduced domains (possibly with an empty one when inconsistent).
    pub domains: HashMap<String, Vec<V>>,
    /// Number of arc revisions that removed at least one value.
    pub revisions: usize,
    /// Number of arcs processed.
    pub arcs_checked: usize,
}

/// Result of a CSP solve.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CspResult<V> {
    /// Whether a complete consistent assignment was found.
    pub solved: bool,

    /// The solution (empty unless `solved`).
    pub assignment: Assignment<V>,

    /// Domains after the consistency pre-pass.
    pub domains: HashMap<String, Vec<V>>,

    /// Pruning revisions performed by AC-3.
    pub revisions: usize,

    /// Variables whose value list was exhausted during search.
    pub backtracks: usize,

    /// Values tentatively assigned during search.
    pub assignments_tried: usize,

    /// Whether infeasibility was proven (`false` while `solved` or when a
    /// budget or cancellation stopped the search).
    pub exhausted: bool,

    /// Whether cancelled externally.
    pub cancelled: bool,
}

/// Solves finite-domain CSPs.
///
/// # Examples
///
/// ```
/// use u_plan::csp::{Constraint, Csp, CspConfig, CspSolver};
///
/// let mut csp = Csp::new();
/// for v in ["a", "b", "c"] {
///     csp.add_variable(v, vec![1, 2, 3]);
/// }
/// csp.add_constraint(Constraint::binary("a", "b", |a, b| a < b));
/// csp.add_constraint(Constraint::binary("b", "c", |b, c| b < c));
///
/// let result = CspSolver::solve(&csp, &CspConfig::default()).unwrap();
/// assert!(result.solved);
/// assert_eq!(result.assignment["a"], 1);
/// assert_eq!(result.assignment["c"], 3);
/// ```
pub struct CspSolver;

impl CspSolver {
    /// Solves the problem.
    pub fn solve<V: Clone>(csp: &Csp<V>, config: &CspConfig) -> Result<CspResult<V>> {
        Self::solve_with_cancel(csp, config, None)
    }

    /// Solves with an optional cancellation token, checked before every
    /// tentative assignment.
    pub fn solve_with_cancel<V: Clone>(
        csp: &Csp<V>,
        config: &CspConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<CspResult<V>> {
        config.validate()?;
        csp.validate()?;

        let outcome = if config.arc_consistency {
            propagate(csp)
        } else {
            let (consistent, domains) = node_consistency(csp);
            Ac3Outcome {
                consistent,
                domains,
                revisions: 0,
                arcs_checked: 0,
            }
        };

        if !outcome.consistent {
            log::debug!(
                "csp infeasible after consistency pass ({} revisions)",
                outcome.revisions
            );
            return Ok(CspResult {
                solved: false,
                assignment: Assignment::new(),
                domains: outcome.domains,
                revisions: outcome.revisions,
                backtracks: 0,
                assignments_tried: 0,
                exhausted: true,
                cancelled: false,
            });
        }

        let domains: Vec<&[V]> = csp
            .variables
            .iter()
            .map(|v| outcome.domains.get(v).map_or(&[][..], Vec::as_slice))
            .collect();

        let mut constraints_by_var = vec![Vec::new(); csp.variables.len()];
        let index: HashMap<&str, usize> = csp
            .variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.as_str(), i))
            .collect();
        for (ci, c) in csp.constraints.iter().enumerate() {
            let scope: HashSet<usize> = c
                .variables
                .iter()
                .filter_map(|v| index.get(v.as_str()).copied())
                .collect();
            for var in scope {
                constraints_by_var[var].push(ci);
            }
        }

        let mut search = Backtracker {
            csp,
            domains: &domains,
            constraints_by_var,
            assignment: Assignment::new(),
            assigned: vec![false; csp.variables.len()],
            backtracks: 0,
            assignments_tried: 0,
            max_backtracks: config.max_backtracks,
            cancel,
            stop: None,
        };
        let solved = search.search();

        let (exhausted, cancelled) = match search.stop {
            None => (!solved, false),
            Some(Stop::Budget) => {
                log::warn!(
                    "csp search stopped after {} backtracks without a verdict",
                    search.backtracks
                );
                (false, false)
            }
            Some(Stop::Cancelled) => (false, true),
        };

        let backtracks = search.backtracks;
        let assignments_tried = search.assignments_tried;
        let assignment = if solved {
            search.assignment
        } else {
            Assignment::new()
        };

        log::debug!(
            "csp finished: solved={solved}, revisions={}, backtracks={backtracks}, tried={assignments_tried}",
            outcome.revisions
        );

        Ok(CspResult {
            solved,
            assignment,
            domains: outcome.domains,
            revisions: outcome.revisions,
            backtracks,
            assignments_tried,
            exhausted,
            cancelled,
        })
    }

    /// Runs node consistency followed by AC-3 and returns the reduced domains.
    pub fn ac3<V: Clone>(csp: &Csp<V>) -> Result<Ac3Outcome<V>> {
        csp.validate()?;
        Ok(propagate(csp))
    }
}

/// Filters every domain through its unary constraints.
fn node_consistency<V: Clone>(csp: &Csp<V>) -> (bool, HashMap<String, Vec<V>>) {
    let mut domains = csp.domains.clone();
    let mut scratch = Assignment::new();

    for constraint in csp.constraints.iter().filter(|c| c.arity() == 1) {
        let var = &constraint.variables[0];
        let Some(domain) = domains.get_mut(var) else {
            continue;
        };
        domain.retain(|value| {
            scratch.insert(var.clone(), value.clone());
            constraint.is_satisfied(&scratch)
        });
        scratch.clear();
        if domain.is_empty() {
            log::trace!("node consistency emptied domain of {var}");
            return (false, domains);
        }
    }
    (true, domains)
}

fn propagate<V: Clone>(csp: &Csp<V>) -> Ac3Outcome<V> {
    let (consistent, domains) = node_consistency(csp);
    if !consistent {
        return Ac3Outcome {
            consistent,
            domains,
            revisions: 0,
            arcs_checked: 0,
        };
    }
    ac3(csp, domains)
}

/// A directed arc `xi -> xj` under constraint `ci`.
type DirectedArc = (usize, usize, usize);

fn ac3<V: Clone>(csp: &Csp<V>, domains: HashMap<String, Vec<V>>) -> Ac3Outcome<V> {
    let names = &csp.variables;
    let index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, v)| (v.as_str(), i))
        .collect();
    let mut doms: Vec<Vec<V>> = names
        .iter()
        .map(|v| domains.get(v).cloned().unwrap_or_default())
        .collect();

    // neighbors[x] = arcs (other, constraint) for binary constraints touching x
    let mut neighbors: Vec<Vec<(usize, usize)>> = vec![Vec::new(); names.len()];
    let mut queue: VecDeque<DirectedArc> = VecDeque::new();
    for (ci, c) in csp.constraints.iter().enumerate() {
        if c.arity() != 2 {
            continue;
        }
        let mut scope = c.variables.iter().filter_map(|v| index.get(v.as_str()).copied());
        let Some(a) = scope.next() else {
            continue;
        };
        let Some(b) = scope.find(|&i| i != a) else {
            continue;
        };
        neighbors[a].push((b, ci));
        neighbors[b].push((a, ci));
        queue.push_back((a, b, ci));
        queue.push_back((b, a, ci));
    }
    let mut queued: HashSet<DirectedArc> = queue.iter().copied().collect();

    let mut revisions = 0usize;
    let mut arcs_checked = 0usize;
    let mut scratch = Assignment::new();

    while let Some(arc) = queue.pop_front() {
        queued.remove(&arc);
        arcs_checked += 1;
        let (xi, xj, ci) = arc;

        if revise(csp, &mut doms, xi, xj, ci, &mut scratch) {
            revisions += 1;
            if doms[xi].is_empty() {
                log::trace!("ac-3 emptied domain of {}", names[xi]);
                return Ac3Outcome {
                    consistent: false,
                    domains: rebuild(names, doms),
                    revisions,
                    arcs_checked,
                };
            }
            for &(xk, ck) in &neighbors[xi] {
                if xk == xj && ck == ci {
                    continue;
                }
                let incoming = (xk, xi, ck);
                if queued.insert(incoming) {
                    queue.push_back(incoming);
                }
            }
        }
    }

    Ac3Outcome {
        consistent: true,
        domains: rebuild(names, doms),
        revisions,
        arcs_checked,
    }
}

/// Keeps the values of `xi` that have a support in `xj` under constraint `ci`.
fn revise<V: Clone>(
    csp: &Csp<V>,
    doms: &mut [Vec<V>],
    xi: usize,
    xj: usize,
    ci: usize,
    scratch: &mut Assignment<V>,
) -> bool {
    let constraint = &csp.constraints[ci];
    let (name_i, name_j) = (&csp.variables[xi], &csp.variables[xj]);
    let support = doms[xj].clone();
    let before = doms[xi].len();

    doms[xi].retain(|a| {
        scratch.insert(name_i.clone(), a.clone());
        support.iter().any(|b| {
            scratch.insert(name_j.clone(), b.clone());
            constraint.is_satisfied(scratch)
        })
    });
    scratch.clear();

    doms[xi].len() < before
}

fn rebuild<V>(names: &[String], doms: Vec<Vec<V>>) -> HashMap<String, Vec<V>> {
    names.iter().cloned().zip(doms).collect()
}

enum Stop {
    Budget,
    Cancelled,
}

/// Chronological backtracking with MRV variable ordering.
struct Backtracker<'a, V> {
    csp: &'a Csp<V>,
    domains: &'a [&'a [V]],
    constraints_by_var: Vec<Vec<usize>>,
    assignment: Assignment<V>,
    assigned: Vec<bool>,
    backtracks: usize,
    assignments_tried: usize,
    max_backtracks: usize,
    cancel: Option<Arc<AtomicBool>>,
    stop: Option<Stop>,
}

impl<V: Clone> Backtracker<'_, V> {
    /// Recursion depth is bounded by the number of variables.
    fn search(&mut self) -> bool {
        let Some(var) = self.select_unassigned() else {
            return true;
        };
        let csp = self.csp;
        let name = &csp.variables[var];
        let domain = self.domains[var];

        for value in domain {
            if let Some(ref flag) = self.cancel {
                if flag.load(Ordering::Relaxed) {
                    self.stop = Some(Stop::Cancelled);
                    return false;
                }
            }

            self.assignments_tried += 1;
            self.assignment.insert(name.clone(), value.clone());
            self.assigned[var] = true;

            if self.is_consistent(var) && self.search() {
                return true;
            }

            self.assignment.remove(name);
            self.assigned[var] = false;
            if self.stop.is_some() {
                return false;
            }
        }

        self.backtracks += 1;
        if self.backtracks >= self.max_backtracks {
            self.stop = Some(Stop::Budget);
        }
        false
    }

    /// Minimum remaining values; ties go to the earlier-declared variable.
    fn select_unassigned(&self) -> Option<usize> {
        (0..self.assigned.len())
            .filter(|&i| !self.assigned[i])
            .min_by_key(|&i| self.domains[i].len())
    }

    /// Checks the constraints touching `var` whose scopes are now complete.
    fn is_consistent(&self, var: usize) -> bool {
        self.constraints_by_var[var].iter().all(|&ci| {
            let c = &self.csp.constraints[ci];
            !c.is_ready(&self.assignment) || c.is_satisfied(&self.assignment)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csp::Constraint;
    use crate::error::PlanError;
    use proptest::prelude::*;

    fn cell(r: usize, c: usize) -> String {
        format!("r{r}c{c}")
    }

    /// 4x4 Latin square with first row/column fixed plus two clues.
    /// Exactly one completion exists.
    fn latin_square() -> Csp<u8> {
        let clues: HashMap<(usize, usize), u8> = [
            ((0, 0), 1),
            ((0, 1), 2),
            ((0, 2), 3),
            ((0, 3), 4),
            ((1, 0), 2),
            ((2, 0), 3),
            ((3, 0), 4),
            ((1, 1), 1),
            ((2, 2), 1),
        ]
        .into_iter()
        .collect();

        let mut csp = Csp::new();
        for r in 0..4 {
            for c in 0..4 {
                let domain = match clues.get(&(r, c)) {
                    Some(&v) => vec![v],
                    None => vec![1, 2, 3, 4],
                };
                csp.add_variable(cell(r, c), domain);
            }
        }
        for i in 0..4 {
            let row: Vec<String> = (0..4).map(|c| cell(i, c)).collect();
            let col: Vec<String> = (0..4).map(|r| cell(r, i)).collect();
            csp.add_all_different(&row.iter().map(String::as_str).collect::<Vec<_>>());
            csp.add_all_different(&col.iter().map(String::as_str).collect::<Vec<_>>());
        }
        csp
    }

    #[test_log::test]
    fn test_latin_square_unique_solution() {
        let csp = latin_square();
        let result = CspSolver::solve(&csp, &CspConfig::default()).unwrap();

        let expected = [[1, 2, 3, 4], [2, 1, 4, 3], [3, 4, 1, 2], [4, 3, 2, 1]];
        assert!(result.solved);
        assert!(!result.exhausted);
        for (r, row) in expected.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                assert_eq!(result.assignment[&cell(r, c)], v, "cell {r},{c}");
            }
        }
        assert!(csp.is_solution(&result.assignment));
    }

    #[test]
    fn test_latin_square_without_ac3() {
        let csp = latin_square();
        let config = CspConfig::default().with_arc_consistency(false);
        let result = CspSolver::solve(&csp, &config).unwrap();

        assert!(result.solved);
        assert_eq!(result.revisions, 0);
        assert_eq!(result.assignment[&cell(3, 3)], 1);
    }

    #[test]
    fn test_map_coloring() {
        let regions = ["wa", "nt", "sa", "q", "nsw", "v", "t"];
        let borders = [
            ("wa", "nt"),
            ("wa", "sa"),
            ("nt", "sa"),
            ("nt", "q"),
            ("sa", "q"),
            ("sa", "nsw"),
            ("sa", "v"),
            ("q", "nsw"),
            ("nsw", "v"),
        ];
        let mut csp = Csp::new();
        for r in regions {
            csp.add_variable(r, vec!["red", "green", "blue"]);
        }
        for (a, b) in borders {
            csp.add_constraint(Constraint::binary(a, b, |x, y| x != y));
        }

        let result = CspSolver::solve(&csp, &CspConfig::default()).unwrap();
        assert!(result.solved);
        assert!(csp.is_solution(&result.assignment));
        for (a, b) in borders {
            assert_ne!(result.assignment[a], result.assignment[b]);
        }
    }

    #[test]
    fn test_ac3_detects_infeasibility() {
        let mut csp = Csp::new();
        csp.add_variable("x", vec![1, 2, 3]);
        csp.add_variable("y", vec![1, 2, 3]);
        csp.add_constraint(Constraint::binary("x", "y", |x, y| x < y));
        csp.add_constraint(Constraint::binary("y", "x", |y, x| y < x));

        let outcome = CspSolver::ac3(&csp).unwrap();
        assert!(!outcome.consistent);

        let result = CspSolver::solve(&csp, &CspConfig::default()).unwrap();
        assert!(!result.solved);
        assert!(result.exhausted);
        assert_eq!(result.assignments_tried, 0);
    }

    #[test]
    fn test_ac3_prunes_chain() {
        let mut csp = Csp::new();
        for v in ["a", "b", "c"] {
            csp.add_variable(v, vec![1, 2, 3]);
        }
        csp.add_constraint(Constraint::binary("a", "b", |a, b| a < b));
        csp.add_constraint(Constraint::binary("b", "c", |b, c| b < c));

        let outcome = CspSolver::ac3(&csp).unwrap();
        assert!(outcome.consistent);
        assert_eq!(outcome.domains["a"], vec![1]);
        assert_eq!(outcome.domains["b"], vec![2]);
        assert_eq!(outcome.domains["c"], vec![3]);
        assert!(outcome.revisions >= 3);
    }

    #[test]
    fn test_unary_constraints_prune_first() {
        let mut csp = Csp::new();
        csp.add_variable("x", vec![1, 2, 3, 4]);
        csp.add_constraint(Constraint::unary("x", |x| x % 2 == 0));

        let outcome = CspSolver::ac3(&csp).unwrap();
        assert_eq!(outcome.domains["x"], vec![2, 4]);

        let result = CspSolver::solve(&csp, &CspConfig::default()).unwrap();
        assert_eq!(result.assignment["x"], 2);
    }

    #[test]
    fn test_ternary_constraint_checked_when_complete() {
        let mut csp = Csp::new();
        for v in ["x", "y", "z"] {
            csp.add_variable(v, (0..=5).collect::<Vec<i32>>());
        }
        csp.add_constraint(Constraint::new(
            "sum",
            vec!["x".into(), "y".into(), "z".into()],
            |a| a["x"] + a["y"] + a["z"] == 12,
        ));
        csp.add_all_different(&["x", "y", "z"]);

        let result = CspSolver::solve(&csp, &CspConfig::default()).unwrap();
        assert!(result.solved);
        let a = &result.assignment;
        assert_eq!(a["x"] + a["y"] + a["z"], 12);
    }

    fn pigeonhole(holes: u8) -> Csp<u8> {
        let names: Vec<String> = (0..=holes).map(|i| format!("p{i}")).collect();
        let mut csp = Csp::new();
        for n in &names {
            csp.add_variable(n.clone(), (0..holes).collect());
        }
        csp.add_all_different(&names.iter().map(String::as_str).collect::<Vec<_>>());
        csp
    }

    #[test]
    fn test_infeasible_by_search() {
        // Pairwise != is arc consistent; only search proves infeasibility.
        let csp = pigeonhole(3);
        let result = CspSolver::solve(&csp, &CspConfig::default()).unwrap();

        assert!(!result.solved);
        assert!(result.exhausted);
        assert_eq!(result.revisions, 0);
        assert!(result.backtracks > 0);
        assert!(result.assignment.is_empty());
    }

    #[test]
    fn test_backtrack_budget() {
        let csp = pigeonhole(5);
        let config = CspConfig::default().with_max_backtracks(3);
        let result = CspSolver::solve(&csp, &config).unwrap();

        assert!(!result.solved);
        assert!(!result.exhausted);
        assert_eq!(result.backtracks, 3);
    }

    #[test]
    fn test_cancellation() {
        let csp = pigeonhole(4);
        let cancel = Arc::new(AtomicBool::new(true));
        let result = CspSolver::solve_with_cancel(&csp, &CspConfig::default(), Some(cancel)).unwrap();

        assert!(result.cancelled);
        assert!(!result.exhausted);
    }

    #[test]
    fn test_empty_problem_is_solved() {
        let csp: Csp<i32> = Csp::new();
        let result = CspSolver::solve(&csp, &CspConfig::default()).unwrap();
        assert!(result.solved);
        assert!(result.assignment.is_empty());
    }

    #[test]
    fn test_invalid_model_rejected() {
        let mut csp = Csp::new();
        csp.add_variable("x", vec![1]);
        csp.add_constraint(Constraint::binary("x", "nope", |a: &i32, b: &i32| a == b));

        let err = CspSolver::solve(&csp, &CspConfig::default()).unwrap_err();
        assert!(matches!(err, PlanError::InvalidModel(_)));
    }

    #[test]
    fn test_constraint_on_undeclared_domain_rejected() {
        let mut csp = Csp::new();
        csp.add_variable("x", vec![1, 2]);
        csp.domains.insert("y".to_string(), vec![1, 2]);
        csp.add_constraint(Constraint::binary("x", "y", |a: &i32, b: &i32| a != b));

        let err = CspSolver::solve(&csp, &CspConfig::default()).unwrap_err();
        assert!(matches!(err, PlanError::InvalidModel(_)));
        assert!(matches!(CspSolver::ac3(&csp), Err(PlanError::InvalidModel(_))));
    }

    #[test]
    fn test_variable_without_domain_rejected() {
        let mut csp = Csp::new();
        csp.add_variable("x", vec![1, 2]);
        csp.variables.push("z".to_string());

        let err = CspSolver::solve(&csp, &CspConfig::default()).unwrap_err();
        assert!(matches!(err, PlanError::InvalidModel(_)));
    }

    // ---- AC-3 soundness ----

    fn relation(kind: u8) -> fn(&i32, &i32) -> bool {
        match kind % 5 {
            0 => |a, b| a < b,
            1 => |a, b| a != b,
            2 => |a, b| a == b,
            3 => |a, b| (a - b).abs() >= 2,
            _ => |a, b| (a + b) % 2 == 0,
        }
    }

    fn random_csp(domains: &[Vec<i32>], edges: &[(usize, usize, u8)]) -> Csp<i32> {
        let mut csp = Csp::new();
        for (i, d) in domains.iter().enumerate() {
            csp.add_variable(format!("v{i}"), d.clone());
        }
        for &(a, b, kind) in edges {
            if a != b {
                let f = relation(kind);
                csp.add_constraint(Constraint::binary(format!("v{a}"), format!("v{b}"), f));
            }
        }
        csp
    }

    /// All complete assignments, by brute force.
    fn brute_force(csp: &Csp<i32>) -> Vec<Assignment<i32>> {
        let mut out = vec![Assignment::new()];
        for v in &csp.variables {
            let mut next = Vec::new();
            for partial in &out {
                for value in &csp.domains[v] {
                    let mut a = partial.clone();
                    a.insert(v.clone(), *value);
                    next.push(a);
                }
            }
            out = next;
        }
        out.into_iter().filter(|a| csp.is_solution(a)).collect()
    }

    proptest! {
        #[test]
        fn prop_ac3_sound(
            domains in proptest::collection::vec(
                proptest::collection::vec(0i32..6, 1..5).prop_map(|mut d| { d.sort(); d.dedup(); d }),
                4,
            ),
            edges in proptest::collection::vec((0usize..4, 0usize..4, any::<u8>()), 0..6),
        ) {
            let csp = random_csp(&domains, &edges);
            let outcome = CspSolver::ac3(&csp).unwrap();
            let solutions = brute_force(&csp);

            if outcome.consistent {
                // Every remaining value has a support in each constrained neighbor.
                for c in &csp.constraints {
                    let (a, b) = (&c.variables[0], &c.variables[1]);
                    for (x, y) in [(a, b), (b, a)] {
                        for vx in &outcome.domains[x] {
                            let supported = outcome.domains[y].iter().any(|vy| {
                                let mut asg = Assignment::new();
                                asg.insert(x.clone(), *vx);
                                asg.insert(y.clone(), *vy);
                                c.is_satisfied(&asg)
                            });
                            prop_assert!(supported, "{x}={vx} has no support in {y}");
                        }
                    }
                }
            } else {
                prop_assert!(solutions.is_empty());
            }

            // Pruning never removes a value used by a solution.
            for solution in &solutions {
                for (var, value) in solution {
                    prop_assert!(outcome.domains[var].contains(value));
                }
            }

            let result = CspSolver::solve(&csp, &CspConfig::default()).unwrap();
            prop_assert_eq!(result.solved, !solutions.is_empty());
            if result.solved {
                prop_assert!(csp.is_solution(&result.assignment));
            }
        }
    }
}
