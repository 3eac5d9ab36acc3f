//! Workspace geometry for motion planning.

use crate::error::{PlanError, Result};

/// Below this a segment component counts as parallel to a slab.
const PARALLEL_EPSILON: f64 = 1e-12;

/// Axis-aligned box, closed on every face.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl Aabb {
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Self {
        Self { min, max }
    }

    pub fn dim(&self) -> usize {
        self.min.len()
    }

    /// Whether the box has matching finite corners with `min <= max`.
    fn is_well_formed(&self) -> bool {
        self.min.len() == self.max.len()
            && self
                .min
                .iter()
                .zip(&self.max)
                .all(|(lo, hi)| lo.is_finite() && hi.is_finite() && lo <= hi)
    }

    /// Whether `point` lies inside or on the boundary.
    pub fn contains(&self, point: &[f64]) -> bool {
        point
            .iter()
            .zip(self.min.iter().zip(&self.max))
            .all(|(p, (lo, hi))| *lo <= *p && *p <= *hi)
    }

    /// Whether the segment `a -> b` touches the box (slab method).
    pub fn intersects_segment(&self, a: &[f64], b: &[f64]) -> bool {
        let mut t_enter = 0.0f64;
        let mut t_exit = 1.0f64;
        for i in 0..self.dim() {
            let d = b[i] - a[i];
            if d.abs() < PARALLEL_EPSILON {
                if a[i] < self.min[i] || a[i] > self.max[i] {
                    return false;
                }
                continue;
            }
            let mut t0 = (self.min[i] - a[i]) / d;
            let mut t1 = (self.max[i] - a[i]) / d;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return false;
            }
        }
        true
    }
}

/// A point-robot motion planning query.
///
/// # Examples
///
/// ```
/// use u_plan::rrt::{Aabb, MotionProblem};
///
/// let problem = MotionProblem::new(
///     vec![1.0, 1.0],
///     vec![9.0, 9.0],
///     Aabb::new(vec![0.0, 0.0], vec![10.0, 10.0]),
/// )
/// .with_obstacle(Aabb::new(vec![4.0, 0.0], vec![6.0, 8.0]));
/// assert!(problem.validate().is_ok());
/// assert!(!problem.segment_free(&[1.0, 1.0], &[9.0, 1.0]));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionProblem {
    pub start: Vec<f64>,
    pub goal: Vec<f64>,
    /// Sampling region.
    pub bounds: Aabb,
    pub obstacles: Vec<Aabb>,
}

impl MotionProblem {
    pub fn new(start: Vec<f64>, goal: Vec<f64>, bounds: Aabb) -> Self {
        Self {
            start,
            goal,
            bounds,
            obstacles: Vec::new(),
        }
    }

    pub fn with_obstacle(mut self, obstacle: Aabb) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    pub fn dim(&self) -> usize {
        self.bounds.dim()
    }

    /// Checks dimensions, bounds and endpoint placement.
    pub fn validate(&self) -> Result<()> {
        let dim = self.dim();
        if dim == 0 || !self.bounds.is_well_formed() {
            return Err(PlanError::InvalidModel("bounds are empty".into()));
        }
        if self.start.len() != dim || self.goal.len() != dim {
            return Err(PlanError::InvalidModel(format!(
                "start/goal dimension does not match bounds ({dim})"
            )));
        }
        for (i, obstacle) in self.obstacles.iter().enumerate() {
            if obstacle.dim() != dim || !obstacle.is_well_formed() {
                return Err(PlanError::InvalidModel(format!(
                    "obstacle {i} is malformed or has the wrong dimension"
                )));
            }
        }
        for (label, point) in [("start", &self.start), ("goal", &self.goal)] {
            if point.iter().any(|x| !x.is_finite()) || !self.bounds.contains(point) {
                return Err(PlanError::InvalidModel(format!("{label} is out of bounds")));
            }
            if !self.is_free(point) {
                return Err(PlanError::InvalidModel(format!(
                    "{label} lies inside an obstacle"
                )));
            }
        }
        Ok(())
    }

    /// Whether `point` is outside every obstacle.
    pub fn is_free(&self, point: &[f64]) -> bool {
        !self.obstacles.iter().any(|o| o.contains(point))
    }

    /// Whether the straight segment `a -> b` avoids every obstacle.
    pub fn segment_free(&self, a: &[f64], b: &[f64]) -> bool {
        !self.obstacles.iter().any(|o| o.intersects_segment(a, b))
    }
}

/// Euclidean distance.
pub(crate) fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
