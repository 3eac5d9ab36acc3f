//! Sampling-based motion planning.
//!
//! Rapidly-exploring random trees for a point robot in an axis-aligned
//! workspace of any dimension, with axis-aligned box obstacles.
//!
//! # Algorithm
//!
//! Each iteration samples a point (the goal with probability `goal_bias`,
//! otherwise uniform in the bounds), finds the nearest tree node and steers
//! from it by at most `step_size`. The new node is kept only if the segment
//! from its parent is collision-free. The goal is reached when a node lies
//! within `goal_tolerance` of it with a free final segment.
//!
//! RRT* additionally picks the cheapest collision-free parent within
//! `rewire_radius` and then rewires neighbors through the new node whenever
//! that shortens their path, updating the costs of the moved subtrees.
//!
//! # References
//!
//! - LaValle (1998), "Rapidly-Exploring Random Trees: A New Tool for Path
//!   Planning"
//! - Karaman & Frazzoli (2011), "Sampling-based Algorithms for Optimal
//!   Motion Planning"
//! - Williams et al. (2005), "An Efficient and Robust Ray-Box Intersection
//!   Algorithm"

mod config;
mod planner;
mod types;

pub use config::{Planner, RrtConfig};
pub use planner::{RrtResult, RrtRunner, TreeNode};
pub use types::{Aabb, MotionProblem};
