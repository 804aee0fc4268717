//! Bounds on the two-electron integrals between four nodes of the spatial tree.
use std::collections::HashMap;

use nalgebra::DMatrix;

use crate::{
    basis::{norm, Center},
    integrals::{s_type_integral, schwartz_factors, Integrator},
    tree::{NodeId, SpatialTree},
};

/// A closed interval `[lower, upper]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn point(value: f64) -> Self {
        Self::new(value, value)
    }

    /// Smallest interval containing both.
    pub fn hull(self, other: Self) -> Self {
        Self::new(self.lower.min(other.lower), self.upper.max(other.upper))
    }

    /// Multiplies both ends by a non-negative factor.
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.lower * factor, self.upper * factor)
    }

    /// Product of two intervals, either of which may contain negative numbers.
    pub fn times(self, other: Self) -> Self {
        let products = [
            self.lower * other.lower,
            self.lower * other.upper,
            self.upper * other.lower,
            self.upper * other.upper,
        ];
        Self::new(
            products.into_iter().fold(f64::INFINITY, f64::min),
            products.into_iter().fold(f64::NEG_INFINITY, f64::max),
        )
    }

    /// Sets any end with a magnitude below `cutoff` to exactly zero.
    pub fn cutoff(self, cutoff: f64) -> Self {
        let clamp = |value: f64| if value.abs() < cutoff { 0.0 } else { value };
        Self::new(clamp(self.lower), clamp(self.upper))
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }

    /// The value inside the interval closest to `value`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }

    /// Smallest magnitude of any value in the interval, zero if it contains zero.
    pub fn min_magnitude(&self) -> f64 {
        if self.lower > 0.0 {
            self.lower
        } else if self.upper < 0.0 {
            -self.upper
        } else {
            0.0
        }
    }

    /// Largest distance from `value` to either end.
    pub fn deviation(&self, value: f64) -> f64 {
        (self.upper - value).max(value - self.lower).max(0.0)
    }
}

/// Four spatial nodes (mu nu|rho sigma), in chemists' notation.
pub type NodeQuartet = [NodeId; 4];

/// Bounds integrals over blocks of the basis.
///
/// For blocks made only of s functions the bounds are closed-form, using the range
/// of exponents and normalizations and the distances between bounding boxes. Blocks
/// with p functions fall back to the Schwartz inequality, which holds for any angular
/// momentum.
#[derive(Clone, Debug, Default)]
pub struct IntegralBoundEngine {
    /// sqrt((ij|ij)) for every pair of functions, in tree order
    schwartz: DMatrix<f64>,
    /// largest Schwartz factor of the block of two spatial nodes
    block_max: HashMap<(NodeId, NodeId), f64>,
}

impl IntegralBoundEngine {
    pub fn new(
        tree: &SpatialTree,
        integrator: &(impl Integrator<Function = Center> + Sync),
    ) -> Self {
        Self {
            schwartz: schwartz_factors(tree.centers(), tree.layout(), integrator),
            block_max: HashMap::new(),
        }
    }

    /// Upper bound on every integral in the block.
    pub fn nodes_max_integral(&mut self, tree: &SpatialTree, quartet: NodeQuartet) -> f64 {
        if s_only(tree, quartet) {
            s_extreme_integral(tree, quartet, Extreme::Max)
        } else {
            self.schwartz_product(tree, quartet)
        }
    }

    /// Lower bound on every integral in the block.
    pub fn nodes_min_integral(&mut self, tree: &SpatialTree, quartet: NodeQuartet) -> f64 {
        if s_only(tree, quartet) {
            s_extreme_integral(tree, quartet, Extreme::Min)
        } else {
            -self.schwartz_product(tree, quartet)
        }
    }

    pub fn nodes_bounds(&mut self, tree: &SpatialTree, quartet: NodeQuartet) -> Interval {
        Interval::new(
            self.nodes_min_integral(tree, quartet),
            self.nodes_max_integral(tree, quartet),
        )
    }

    /// Estimate of a typical integral in the block, at the midpoint exponents and the
    /// centers of the bounding boxes.
    pub fn nodes_midpoint_integral(&self, tree: &SpatialTree, quartet: NodeQuartet) -> f64 {
        if !s_only(tree, quartet) {
            // p integrals of either sign are equally likely
            return 0.0;
        }

        let nodes = quartet.map(|id| tree.node(id));
        let exponents = nodes.map(|node| 0.5 * (node.stat.min_bandwidth + node.stat.max_bandwidth));
        let positions = nodes.map(|node| node.bound.midpoint());

        let [a, b, c, d] = exponents;
        let product_ab = (a * positions[0] + b * positions[1]) / (a + b);
        let product_cd = (c * positions[2] + d * positions[3]) / (c + d);

        exponents
            .iter()
            .map(|&exponent| norm(exponent, (0, 0, 0)))
            .product::<f64>()
            * s_type_integral(
                exponents,
                (positions[0] - positions[1]).norm_squared(),
                (positions[2] - positions[3]).norm_squared(),
                (product_ab - product_cd).norm_squared(),
            )
    }

    /// Bound from the Cauchy-Schwarz inequality |(ab|cd)| <= sqrt((ab|ab)) sqrt((cd|cd)),
    /// with a lower bound of zero when all functions are s-type.
    pub fn schwartz_bound(&mut self, tree: &SpatialTree, quartet: NodeQuartet) -> Interval {
        let upper = self.schwartz_product(tree, quartet);
        let lower = if s_only(tree, quartet) { 0.0 } else { -upper };
        Interval::new(lower, upper)
    }

    fn schwartz_product(&mut self, tree: &SpatialTree, [a, b, c, d]: NodeQuartet) -> f64 {
        self.schwartz_block(tree, a, b) * self.schwartz_block(tree, c, d)
    }

    /// Largest Schwartz factor between any function of `x` and any function of `y`.
    fn schwartz_block(&mut self, tree: &SpatialTree, x: NodeId, y: NodeId) -> f64 {
        let key = if x <= y { (x, y) } else { (y, x) };
        if let Some(&factor) = self.block_max.get(&key) {
            return factor;
        }

        let (x, y) = key;
        let factor = match (tree.node(x).children, tree.node(y).children) {
            (Some([left, right]), _) => self
                .schwartz_block(tree, left, y)
                .max(self.schwartz_block(tree, right, y)),
            (None, Some([left, right])) => self
                .schwartz_block(tree, x, left)
                .max(self.schwartz_block(tree, x, right)),
            (None, None) => itertools::iproduct!(
                tree.node(x).functions.clone(),
                tree.node(y).functions.clone()
            )
            .map(|(i, j)| self.schwartz[(i, j)])
            .fold(0.0, f64::max),
        };

        self.block_max.insert(key, factor);
        factor
    }
}

fn s_only(tree: &SpatialTree, quartet: NodeQuartet) -> bool {
    quartet.iter().all(|&id| tree.node(id).stat.s_only())
}

#[derive(Copy, Clone, PartialEq)]
enum Extreme {
    Min,
    Max,
}

/// Closed-form extreme of
///   N_a N_b N_c N_d 2 pi^2.5 / (pq sqrt(p + q)) exp(-ab/p |AB|^2) exp(-cd/q |CD|^2) F0(pq/(p+q) |PQ|^2)
/// over the exponents and positions allowed by four nodes. Every factor is positive,
/// so the product of the factors' extremes bounds the product.
fn s_extreme_integral(tree: &SpatialTree, quartet: NodeQuartet, extreme: Extreme) -> f64 {
    let nodes = quartet.map(|id| tree.node(id));

    let (exponents, normalization) = match extreme {
        Extreme::Max => (
            nodes.map(|node| node.stat.min_bandwidth),
            nodes.iter().map(|node| node.stat.max_normalization).product::<f64>(),
        ),
        Extreme::Min => (
            nodes.map(|node| node.stat.max_bandwidth),
            nodes.iter().map(|node| node.stat.min_normalization).product::<f64>(),
        ),
    };

    let hull_ab = nodes[0].bound.union(&nodes[1].bound);
    let hull_cd = nodes[2].bound.union(&nodes[3].bound);
    let (distance_ab, distance_cd, distance_pq) = match extreme {
        Extreme::Max => (
            nodes[0].bound.min_distance_sq(&nodes[1].bound),
            nodes[2].bound.min_distance_sq(&nodes[3].bound),
            hull_ab.min_distance_sq(&hull_cd),
        ),
        Extreme::Min => (
            nodes[0].bound.max_distance_sq(&nodes[1].bound),
            nodes[2].bound.max_distance_sq(&nodes[3].bound),
            hull_ab.max_distance_sq(&hull_cd),
        ),
    };

    // the prefactor shrinks with the exponents, the reduced exponents grow with them
    normalization * s_type_integral(exponents, distance_ab, distance_cd, distance_pq)
}
