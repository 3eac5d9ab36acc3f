//! CSP model definition.

use crate::error::{PlanError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A (partial) assignment of values to variable names.
pub type Assignment<V> = HashMap<String, V>;

type Predicate<V> = Box<dyn Fn(&Assignment<V>) -> bool + Send + Sync>;

/// A constraint over a subset of the model's variables.
///
/// The predicate receives an assignment in which every variable listed in
/// `variables` is present; it is never called on a partial scope.
pub struct Constraint<V> {
    /// Label used in diagnostics.
    pub name: String,
    /// Variables the predicate reads.
    pub variables: Vec<String>,
    check: Predicate<V>,
}

impl<V> Constraint<V> {
    /// Creates a constraint from an arbitrary predicate.
    pub fn new<F>(name: impl Into<String>, variables: Vec<String>, check: F) -> Self
    where
        F: Fn(&Assignment<V>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            variables,
            check: Box::new(check),
        }
    }

    /// Evaluates the predicate.
    pub fn is_satisfied(&self, assignment: &Assignment<V>) -> bool {
        (self.check)(assignment)
    }

    /// Whether every variable in scope is assigned.
    pub fn is_ready(&self, assignment: &Assignment<V>) -> bool {
        self.variables.iter().all(|v| assignment.contains_key(v))
    }

    /// Number of distinct variables in scope.
    pub fn arity(&self) -> usize {
        self.variables.iter().collect::<HashSet<_>>().len()
    }
}

impl<V: 'static> Constraint<V> {
    /// A constraint over a single variable.
    pub fn unary<F>(var: impl Into<String>, check: F) -> Self
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        let var = var.into();
        let key = var.clone();
        Self::new(format!("unary({var})"), vec![var], move |a| {
            a.get(&key).is_none_or(&check)
        })
    }

    /// A constraint relating two variables.
    pub fn binary<F>(a: impl Into<String>, b: impl Into<String>, check: F) -> Self
    where
        F: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        let (a, b) = (a.into(), b.into());
        let (ka, kb) = (a.clone(), b.clone());
        Self::new(format!("binary({a}, {b})"), vec![a, b], move |asg| {
            match (asg.get(&ka), asg.get(&kb)) {
                (Some(x), Some(y)) => check(x, y),
                _ => true,
            }
        })
    }
}

impl<V> fmt::Debug for Constraint<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("name", &self.name)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// A constraint satisfaction problem.
///
/// # Examples
///
/// ```
/// use u_plan::csp::{Constraint, Csp};
///
/// let mut csp = Csp::new();
/// csp.add_variable("wa", vec!["red", "green", "blue"]);
/// csp.add_variable("nt", vec!["red", "green", "blue"]);
/// csp.add_constraint(Constraint::binary("wa", "nt", |a, b| a != b));
/// assert!(csp.validate().is_ok());
/// ```
#[derive(Debug)]
pub struct Csp<V> {
    /// Variable names in declaration order (the MRV tie-breaker).
    pub variables: Vec<String>,
    /// Ordered candidate values per variable.
    pub domains: HashMap<String, Vec<V>>,
    /// Constraints.
    pub constraints: Vec<Constraint<V>>,
}

impl<V> Csp<V> {
    /// Creates an empty problem.
    pub fn new() -> Self {
        Self {
            variables: Vec::new(),
            domains: HashMap::new(),
            constraints: Vec::new(),
        }
    }

    /// Declares a variable with its domain. Re-declaring replaces the domain.
    pub fn add_variable(&mut self, name: impl Into<String>, domain: Vec<V>) {
        let name = name.into();
        if !self.domains.contains_key(&name) {
            self.variables.push(name.clone());
        }
        self.domains.insert(name, domain);
    }

    /// Adds a constraint.
    pub fn add_constraint(&mut self, constraint: Constraint<V>) {
        self.constraints.push(constraint);
    }

    /// Checks that `variables` and the keys of `domains` name the same set,
    /// and that every constraint references declared variables only.
    pub fn validate(&self) -> Result<()> {
        let mut declared = HashSet::with_capacity(self.variables.len());
        for var in &self.variables {
            if !declared.insert(var.as_str()) {
                return Err(PlanError::InvalidModel(format!(
                    "variable declared twice: {var}"
                )));
            }
            if !self.domains.contains_key(var) {
                return Err(PlanError::InvalidModel(format!(
                    "variable without a domain: {var}"
                )));
            }
        }
        if let Some(orphan) = self
            .domains
            .keys()
            .find(|name| !declared.contains(name.as_str()))
        {
            return Err(PlanError::InvalidModel(format!(
                "domain given for undeclared variable: {orphan}"
            )));
        }

        for constraint in &self.constraints {
            if constraint.variables.is_empty() {
                return Err(PlanError::InvalidModel(format!(
                    "constraint {} has an empty scope",
                    constraint.name
                )));
            }
            for var in &constraint.variables {
                if !declared.contains(var.as_str()) {
                    return Err(PlanError::InvalidModel(format!(
                        "constraint {} references undeclared variable: {var}",
                        constraint.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether `assignment` violates no constraint whose scope is fully assigned.
    pub fn is_consistent(&self, assignment: &Assignment<V>) -> bool {
        self.constraints
            .iter()
            .filter(|c| c.is_ready(assignment))
            .all(|c| c.is_satisfied(assignment))
    }

    /// Whether `assignment` covers every variable and satisfies every constraint.
    pub fn is_solution(&self, assignment: &Assignment<V>) -> bool {
        self.variables.iter().all(|v| assignment.contains_key(v)) && self.is_consistent(assignment)
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }
}

impl<V: PartialEq + 'static> Csp<V> {
    /// Adds pairwise inequality constraints over `vars`.
    pub fn add_all_different(&mut self, vars: &[&str]) {
        for (i, a) in vars.iter().enumerate() {
            for b in &vars[i + 1..] {
                self.constraints
                    .push(Constraint::binary(*a, *b, |x: &V, y: &V| x != y));
            }
        }
    }
}

impl<V> Default for Csp<V> {
    fn default() -> Self {
        Self::new()
    }
}
