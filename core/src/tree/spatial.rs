use std::ops::Range;

use crate::basis::{normalization_range, BasisLayout, Center};

use super::BoundingBox;

/// Index of a node in a [`SpatialTree`]. Nodes are numbered in pre-order, so the root is
/// always `NodeId(0)` and every child has a larger index than its parent.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Summary of the shells owned by a node.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpatialStat {
    pub min_bandwidth: f64,
    pub max_bandwidth: f64,
    /// the minimum and maximum normalization factor for this node
    pub min_normalization: f64,
    pub max_normalization: f64,
    /// 0 for leaves
    pub height: usize,
    /// Largest angular momentum of any shell in this node
    pub max_momentum: i32,
}

impl Default for SpatialStat {
    fn default() -> Self {
        Self {
            min_bandwidth: f64::INFINITY,
            max_bandwidth: 0.0,
            min_normalization: f64::INFINITY,
            max_normalization: 0.0,
            height: 0,
            max_momentum: 0,
        }
    }
}

impl SpatialStat {
    fn merge(left: &Self, right: &Self) -> Self {
        Self {
            min_bandwidth: left.min_bandwidth.min(right.min_bandwidth),
            max_bandwidth: left.max_bandwidth.max(right.max_bandwidth),
            min_normalization: left.min_normalization.min(right.min_normalization),
            max_normalization: left.max_normalization.max(right.max_normalization),
            height: left.height.max(right.height) + 1,
            max_momentum: left.max_momentum.max(right.max_momentum),
        }
    }

    /// Only s shells below this node.
    pub fn s_only(&self) -> bool {
        self.max_momentum == 0
    }
}

#[derive(Clone, Debug)]
pub struct SpatialNode {
    /// First center of this node, in tree order
    pub begin: usize,
    /// Number of centers in this node
    pub count: usize,
    /// Basis functions of the centers in this node, in tree order
    pub functions: Range<usize>,
    pub bound: BoundingBox,
    pub children: Option<[NodeId; 2]>,
    pub stat: SpatialStat,
}

impl SpatialNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn centers(&self) -> Range<usize> {
        self.begin..self.begin + self.count
    }

    pub fn n_functions(&self) -> usize {
        self.functions.len()
    }
}

/// Binary space partitioning tree over the shells of a basis.
///
/// Building the tree reorders the shells so that every node owns a contiguous range.
/// The tree keeps the reordered shells along with the permutation that produced them.
#[derive(Clone, Debug, Default)]
pub struct SpatialTree {
    nodes: Vec<SpatialNode>,
    centers: Vec<Center>,
    layout: BasisLayout,
    old_from_new: Vec<usize>,
}

impl SpatialTree {
    /// Builds a tree over `centers` by splitting every node at the midpoint of its widest
    /// dimension, until nodes hold at most `leaf_size` centers or can't be split further.
    pub fn build(centers: &[Center], leaf_size: usize) -> Self {
        let mut old_from_new = (0..centers.len()).collect::<Vec<_>>();
        let mut nodes = Vec::with_capacity(2 * centers.len() / leaf_size.max(1) + 1);

        if !centers.is_empty() {
            split_midpoint(
                centers,
                &mut old_from_new,
                0,
                centers.len(),
                leaf_size.max(1),
                &mut nodes,
            );
        }

        // IMPORTANT: the stats can only be set once the centers are in tree order
        let centers = old_from_new
            .iter()
            .map(|&old| centers[old])
            .collect::<Vec<_>>();
        let layout = BasisLayout::new(&centers);

        let mut tree = Self {
            nodes,
            centers,
            layout,
            old_from_new,
        };
        tree.set_exponent_bounds();

        log::debug!(
            "built spatial tree with {} nodes over {} centers, height {}",
            tree.nodes.len(),
            tree.centers.len(),
            tree.nodes.first().map_or(0, |root| root.stat.height)
        );

        tree
    }

    /// Annotates every node with bandwidth, normalization and height, children before
    /// parents.
    fn set_exponent_bounds(&mut self) {
        // pre-order numbering, so walking backwards visits children first
        for id in (0..self.nodes.len()).rev() {
            let node = &self.nodes[id];
            let functions = self.layout.span(node.begin, node.count);

            let stat = match node.children {
                Some([left, right]) => {
                    SpatialStat::merge(&self.nodes[left.0].stat, &self.nodes[right.0].stat)
                }
                None => self.centers[node.centers()].iter().fold(
                    SpatialStat::default(),
                    |stat, center| {
                        let (min_norm, max_norm) =
                            normalization_range(center.exponent, center.exponent, center.momentum);
                        SpatialStat {
                            min_bandwidth: stat.min_bandwidth.min(center.exponent),
                            max_bandwidth: stat.max_bandwidth.max(center.exponent),
                            min_normalization: stat.min_normalization.min(min_norm),
                            max_normalization: stat.max_normalization.max(max_norm),
                            height: 0,
                            max_momentum: stat.max_momentum.max(center.momentum),
                        }
                    },
                ),
            };

            let node = &mut self.nodes[id];
            node.functions = functions;
            node.stat = stat;
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &SpatialNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[SpatialNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The shells, in tree order.
    pub fn centers(&self) -> &[Center] {
        &self.centers
    }

    /// Function layout of the shells in tree order.
    pub fn layout(&self) -> &BasisLayout {
        &self.layout
    }

    /// `old_from_new[i]` is the index in the input of the center stored at `i`.
    pub fn permutation(&self) -> &[usize] {
        &self.old_from_new
    }
}

/// Recursively splits `old_from_new[begin..begin + count]`, pushing nodes in pre-order.
fn split_midpoint(
    centers: &[Center],
    old_from_new: &mut [usize],
    begin: usize,
    count: usize,
    leaf_size: usize,
    nodes: &mut Vec<SpatialNode>,
) -> NodeId {
    let indices = &mut old_from_new[begin..begin + count];
    let bound = BoundingBox::from_points(indices.iter().map(|&i| &centers[i].position));

    let id = NodeId(nodes.len());
    nodes.push(SpatialNode {
        begin,
        count,
        functions: 0..0,
        bound,
        children: None,
        stat: SpatialStat::default(),
    });

    if count <= leaf_size {
        return id;
    }

    let widths = bound.widths();
    let axis = widths.imax();
    if widths[axis] <= 0.0 {
        // all centers at the same position
        return id;
    }

    let split = bound.midpoint()[axis];
    // stable, so the permutation only depends on the input order
    indices.sort_by_key(|&i| centers[i].position[axis] >= split);
    let left_count = indices
        .iter()
        .take_while(|&&i| centers[i].position[axis] < split)
        .count();

    if left_count == 0 || left_count == count {
        return id;
    }

    let left = split_midpoint(centers, old_from_new, begin, left_count, leaf_size, nodes);
    let right = split_midpoint(
        centers,
        old_from_new,
        begin + left_count,
        count - left_count,
        leaf_size,
        nodes,
    );
    nodes[id.0].children = Some([left, right]);

    id
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::{NodeId, SpatialTree};
    use crate::basis::Center;

    fn random_centers(n: usize, seed: u64) -> Vec<Center> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Center::new(
                    Vector3::new(
                        rng.gen_range(-5.0..5.0),
                        rng.gen_range(-5.0..5.0),
                        rng.gen_range(-5.0..5.0),
                    ),
                    rng.gen_range(0.1..4.0),
                    rng.gen_range(0..=1),
                )
            })
            .collect()
    }

    #[test]
    fn permutation_is_a_bijection() {
        let centers = random_centers(57, 1);
        let tree = SpatialTree::build(&centers, 4);

        let mut sorted = tree.permutation().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..57).collect::<Vec<_>>());

        for (new, &old) in tree.permutation().iter().enumerate() {
            assert_eq!(tree.centers()[new], centers[old]);
        }
    }

    #[test]
    fn leaves_respect_leaf_size_and_cover_all_centers() {
        let centers = random_centers(100, 2);
        let tree = SpatialTree::build(&centers, 7);

        let covered: usize = tree
            .nodes()
            .iter()
            .filter(|node| node.is_leaf())
            .map(|node| {
                assert!(node.count <= 7);
                node.count
            })
            .sum();
        assert_eq!(covered, 100);

        let root = tree.node(tree.root());
        assert_eq!(root.count, 100);
        assert_eq!(root.functions, 0..tree.layout().n_functions());
    }

    #[test]
    fn bandwidth_bounds_are_consistent() {
        let centers = random_centers(80, 3);
        let tree = SpatialTree::build(&centers, 5);

        for node in tree.nodes() {
            let stat = node.stat;
            assert!(stat.min_bandwidth > 0.0);
            assert!(stat.min_bandwidth <= stat.max_bandwidth);
            assert!(stat.min_normalization <= stat.max_normalization);

            match node.children {
                None => {
                    assert_eq!(stat.height, 0);
                    let owned = &tree.centers()[node.centers()];
                    let min = owned.iter().map(|c| c.exponent).fold(f64::INFINITY, f64::min);
                    let max = owned.iter().map(|c| c.exponent).fold(0.0, f64::max);
                    assert_eq!(stat.min_bandwidth, min);
                    assert_eq!(stat.max_bandwidth, max);
                }
                Some([NodeId(left), NodeId(right)]) => {
                    let (left, right) = (&tree.nodes()[left].stat, &tree.nodes()[right].stat);
                    assert_eq!(stat.min_bandwidth, left.min_bandwidth.min(right.min_bandwidth));
                    assert_eq!(stat.max_bandwidth, left.max_bandwidth.max(right.max_bandwidth));
                    assert_eq!(stat.height, 1 + left.height.max(right.height));
                }
            }
        }
    }

    #[test]
    fn coincident_centers_stay_in_one_leaf() {
        let centers = vec![Center::new(Vector3::new(1.0, 2.0, 3.0), 1.0, 0); 12];
        let tree = SpatialTree::build(&centers, 2);

        assert_eq!(tree.nodes().len(), 1);
        assert!(tree.node(tree.root()).is_leaf());
    }
}
