use nalgebra::DMatrix;
use smallvec::SmallVec;

use crate::error::FockError;

use super::{NodeId, SpatialTree};

/// Index of a node in a [`SquareTree`], numbered in pre-order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SquareId(pub usize);

/// Which pass an error ledger belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LedgerKind {
    Coulomb,
    Exchange,
}

/// How much error a square node may still spend in one pass.
///
/// `remaining_epsilon` is the error budget summed over all entries of the node and
/// `remaining_references` the number of reference pairs whose contribution to the node
/// hasn't been accounted for. Losses spent at this node that its children haven't seen
/// yet are kept as pending and pushed down before recursing.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Ledger {
    pub remaining_epsilon: f64,
    pub remaining_references: u64,
    initial_epsilon: f64,
    pending_loss: f64,
    pending_references: u64,
}

impl Ledger {
    /// Relative round-off tolerated before an overdrawn budget is an error.
    const ROUNDING: f64 = 1e-9;

    fn seeded(epsilon: f64, references: u64) -> Self {
        Self {
            remaining_epsilon: epsilon,
            remaining_references: references,
            initial_epsilon: epsilon,
            pending_loss: 0.0,
            pending_references: 0,
        }
    }

    /// Error each entry may take on from `count` more references, given `entries` entries
    /// in the node.
    pub fn allowed_error(&self, entries: usize, count: u64) -> f64 {
        if self.remaining_references == 0 || entries == 0 {
            return 0.0;
        }
        self.remaining_epsilon / entries as f64 * count as f64 / self.remaining_references as f64
    }

    /// Accounts for `count` references whose contribution lost `lost_error` in total.
    fn spend(&mut self, lost_error: f64, count: u64) -> Result<(), f64> {
        self.remaining_epsilon -= lost_error;
        self.remaining_references = self.remaining_references.saturating_sub(count);
        self.pending_loss += lost_error;
        self.pending_references += count;
        self.check()
    }

    fn check(&mut self) -> Result<(), f64> {
        if self.remaining_epsilon < 0.0 {
            if self.remaining_epsilon < -Self::ROUNDING * self.initial_epsilon {
                return Err(self.remaining_epsilon);
            }
            self.remaining_epsilon = 0.0;
        }
        Ok(())
    }
}

/// A block of the basis x basis matrix, made of two spatial nodes.
///
/// Off the diagonal the node covers both `mu x nu` and the transposed `nu x mu` entries;
/// on the diagonal (`mu == nu`) it covers `mu x mu` once.
#[derive(Clone, Debug)]
pub struct SquareNode {
    pub mu: NodeId,
    pub nu: NodeId,
    pub children: SmallVec<[SquareId; 4]>,
    pub on_diagonal: bool,
    /// Number of ordered (row, col) entries covered
    pub entries: usize,
    pub density_upper_bound: f64,
    pub density_lower_bound: f64,
    pub coulomb: Ledger,
    pub exchange: Ledger,
}

impl SquareNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn ledger(&self, kind: LedgerKind) -> &Ledger {
        match kind {
            LedgerKind::Coulomb => &self.coulomb,
            LedgerKind::Exchange => &self.exchange,
        }
    }

    fn ledger_mut(&mut self, kind: LedgerKind) -> &mut Ledger {
        match kind {
            LedgerKind::Coulomb => &mut self.coulomb,
            LedgerKind::Exchange => &mut self.exchange,
        }
    }
}

/// Product of a spatial tree with itself, restricted to the upper triangle.
#[derive(Clone, Debug, Default)]
pub struct SquareTree {
    nodes: Vec<SquareNode>,
}

impl SquareTree {
    pub fn build(tree: &SpatialTree) -> Self {
        let mut square = Self { nodes: Vec::new() };
        if !tree.is_empty() {
            square.build_recursive(tree, tree.root(), tree.root());
        }

        log::debug!(
            "built square tree with {} nodes, {} leaves",
            square.nodes.len(),
            square.nodes.iter().filter(|node| node.is_leaf()).count()
        );

        square
    }

    fn build_recursive(&mut self, tree: &SpatialTree, mu: NodeId, nu: NodeId) -> SquareId {
        let on_diagonal = mu == nu;
        let (mu_node, nu_node) = (tree.node(mu), tree.node(nu));
        let entries = if on_diagonal {
            mu_node.n_functions().pow(2)
        } else {
            2 * mu_node.n_functions() * nu_node.n_functions()
        };

        let id = SquareId(self.nodes.len());
        self.nodes.push(SquareNode {
            mu,
            nu,
            children: SmallVec::new(),
            on_diagonal,
            entries,
            density_upper_bound: 0.0,
            density_lower_bound: 0.0,
            coulomb: Ledger::default(),
            exchange: Ledger::default(),
        });

        let pairs: SmallVec<[(NodeId, NodeId); 4]> = match (mu_node.children, nu_node.children)
        {
            (None, None) => SmallVec::new(),
            // the transposed block (right, left) is covered by (left, right)
            (Some([left, right]), Some(_)) if on_diagonal => {
                smallvec::smallvec![(left, left), (left, right), (right, right)]
            }
            (Some([mu_left, mu_right]), Some([nu_left, nu_right])) => smallvec::smallvec![
                (mu_left, nu_left),
                (mu_left, nu_right),
                (mu_right, nu_left),
                (mu_right, nu_right)
            ],
            (Some([left, right]), None) => smallvec::smallvec![(left, nu), (right, nu)],
            (None, Some([left, right])) => smallvec::smallvec![(mu, left), (mu, right)],
        };

        let children = pairs
            .into_iter()
            .map(|(child_mu, child_nu)| self.build_recursive(tree, child_mu, child_nu))
            .collect();
        self.nodes[id.0].children = children;

        id
    }

    pub fn root(&self) -> SquareId {
        SquareId(0)
    }

    pub fn node(&self, id: SquareId) -> &SquareNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[SquareNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sets the density bounds of every node from the tree-ordered density matrix.
    pub fn set_entry_bounds(&mut self, tree: &SpatialTree, density: &DMatrix<f64>) {
        for id in (0..self.nodes.len()).rev() {
            let node = &self.nodes[id];

            let (lower, upper) = if node.is_leaf() {
                let rows = tree.node(node.mu).functions.clone();
                let cols = tree.node(node.nu).functions.clone();
                itertools::iproduct!(rows, cols).fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lower, upper), (i, j)| {
                        let entry = density[(i, j)];
                        (lower.min(entry), upper.max(entry))
                    },
                )
            } else {
                node.children.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lower, upper), child| {
                        let child = &self.nodes[child.0];
                        (
                            lower.min(child.density_lower_bound),
                            upper.max(child.density_upper_bound),
                        )
                    },
                )
            };

            let node = &mut self.nodes[id];
            node.density_lower_bound = lower;
            node.density_upper_bound = upper;
        }
    }

    /// Gives every node of the tree a fresh ledger for one pass: `epsilon` of error per
    /// entry and `references` reference pairs still to be accounted for.
    pub fn reset_ledgers(&mut self, kind: LedgerKind, epsilon: f64, references: u64) {
        for node in &mut self.nodes {
            *node.ledger_mut(kind) = Ledger::seeded(epsilon * node.entries as f64, references);
        }
    }

    /// Records that the contribution of `count` references to `id` has been accounted
    /// for, at a total loss of `lost_error`.
    pub fn spend(
        &mut self,
        id: SquareId,
        kind: LedgerKind,
        lost_error: f64,
        count: u64,
    ) -> Result<(), FockError> {
        self.nodes[id.0]
            .ledger_mut(kind)
            .spend(lost_error, count)
            .map_err(|remaining| FockError::BudgetUnderflow {
                node: id.0,
                remaining,
            })
    }

    /// Pushes the losses recorded at `id` since the last call down to its children,
    /// split in proportion to the number of entries each child covers.
    pub fn propagate_bounds_down(&mut self, id: SquareId, kind: LedgerKind) -> Result<(), FockError> {
        let parent = &mut self.nodes[id.0];
        let entries = parent.entries as f64;
        let children = parent.children.clone();
        let ledger = parent.ledger_mut(kind);
        let (loss, references) = (ledger.pending_loss, ledger.pending_references);
        ledger.pending_loss = 0.0;
        ledger.pending_references = 0;

        if loss == 0.0 && references == 0 {
            return Ok(());
        }

        for child in children {
            let node = &mut self.nodes[child.0];
            let share = loss * node.entries as f64 / entries;
            node.ledger_mut(kind)
                .spend(share, references)
                .map_err(|remaining| FockError::BudgetUnderflow {
                    node: child.0,
                    remaining,
                })?;
        }

        Ok(())
    }

    /// Replaces the ledger of `id` by the most constrained of its children's, scaled to
    /// the size of `id`.
    pub fn propagate_bounds_up(&mut self, id: SquareId, kind: LedgerKind) {
        let parent = &self.nodes[id.0];
        let entries = parent.entries as f64;

        let (epsilon, references) = parent.children.iter().fold(
            (f64::INFINITY, 0),
            |(epsilon, references), child| {
                let child = &self.nodes[child.0];
                let ledger = child.ledger(kind);
                (
                    epsilon.min(ledger.remaining_epsilon / child.entries as f64 * entries),
                    references.max(ledger.remaining_references),
                )
            },
        );

        if epsilon.is_finite() {
            let ledger = self.nodes[id.0].ledger_mut(kind);
            ledger.remaining_epsilon = epsilon;
            ledger.remaining_references = references;
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, Vector3};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::{LedgerKind, SquareId, SquareTree};
    use crate::{basis::Center, tree::SpatialTree};

    fn spatial(n: usize, leaf_size: usize) -> SpatialTree {
        let mut rng = StdRng::seed_from_u64(7);
        let centers = (0..n)
            .map(|_| {
                Center::new(
                    Vector3::new(
                        rng.gen_range(-3.0..3.0),
                        rng.gen_range(-3.0..3.0),
                        rng.gen_range(-3.0..3.0),
                    ),
                    rng.gen_range(0.2..2.0),
                    rng.gen_range(0..=1),
                )
            })
            .collect::<Vec<_>>();
        SpatialTree::build(&centers, leaf_size)
    }

    #[test]
    fn leaves_cover_every_entry_once() {
        let tree = spatial(40, 3);
        let square = SquareTree::build(&tree);
        let n = tree.layout().n_functions();

        let mut coverage = DMatrix::<u32>::zeros(n, n);
        for node in square.nodes().iter().filter(|node| node.is_leaf()) {
            let rows = tree.node(node.mu).functions.clone();
            let cols = tree.node(node.nu).functions.clone();
            for (i, j) in itertools::iproduct!(rows, cols) {
                coverage[(i, j)] += 1;
                if !node.on_diagonal {
                    coverage[(j, i)] += 1;
                }
            }
        }

        assert!(coverage.iter().all(|&count| count == 1));
        assert_eq!(square.node(square.root()).entries, n * n);
    }

    #[test]
    fn children_entries_sum_to_parent() {
        let tree = spatial(33, 2);
        let square = SquareTree::build(&tree);

        for node in square.nodes().iter().filter(|node| !node.is_leaf()) {
            let sum: usize = node
                .children
                .iter()
                .map(|&child| square.node(child).entries)
                .sum();
            assert_eq!(sum, node.entries);
            assert!(node.children.len() >= 2 && node.children.len() <= 4);
        }
    }

    #[test]
    fn density_bounds_contain_entries() {
        let tree = spatial(25, 3);
        let mut square = SquareTree::build(&tree);
        let n = tree.layout().n_functions();
        let density = DMatrix::from_fn(n, n, |i, j| ((i * j) as f64).sin() - 0.1 * (i + j) as f64);
        let density = (&density + density.transpose()) / 2.0;

        square.set_entry_bounds(&tree, &density);

        for node in square.nodes() {
            let rows = tree.node(node.mu).functions.clone();
            let cols = tree.node(node.nu).functions.clone();
            for (i, j) in itertools::iproduct!(rows, cols) {
                assert!(density[(i, j)] >= node.density_lower_bound);
                assert!(density[(i, j)] <= node.density_upper_bound);
            }
        }
    }

    #[test]
    fn epsilon_is_conserved_when_pushed_down() {
        let tree = spatial(30, 3);
        let mut square = SquareTree::build(&tree);
        let references = square.node(square.root()).entries as u64;
        square.reset_ledgers(LedgerKind::Coulomb, 1e-3, references);

        let root = square.root();
        square
            .spend(root, LedgerKind::Coulomb, 0.25 * square.node(root).coulomb.remaining_epsilon, 10)
            .unwrap();
        let initial = square.node(root).coulomb.remaining_epsilon / 0.75;

        // pushing is lazy, one level per call, so walk the whole tree top-down the way
        // a recursion reaching every node would
        for id in 0..square.nodes().len() {
            if !square.node(SquareId(id)).is_leaf() {
                square
                    .propagate_bounds_down(SquareId(id), LedgerKind::Coulomb)
                    .unwrap();
            }
        }

        for (id, node) in square.nodes().iter().enumerate() {
            if node.is_leaf() {
                continue;
            }
            let parent = node.coulomb.remaining_epsilon;
            let children: f64 = node
                .children
                .iter()
                .map(|&child| square.node(child).coulomb.remaining_epsilon)
                .sum();
            assert!(
                parent * (1.0 + 1e-12) >= children,
                "node {id}: parent {parent} < children {children}"
            );
        }

        let leaves: f64 = square
            .nodes()
            .iter()
            .filter(|node| node.is_leaf())
            .map(|node| node.coulomb.remaining_epsilon)
            .sum();
        assert_relative_eq!(leaves, 0.75 * initial, max_relative = 1e-10);

        // exchange ledger untouched
        assert_eq!(square.node(SquareId(0)).exchange.remaining_epsilon, 0.0);
    }

    #[test]
    fn propagating_up_takes_most_constrained_child() {
        let tree = spatial(30, 3);
        let mut square = SquareTree::build(&tree);
        let references = square.node(square.root()).entries as u64;
        square.reset_ledgers(LedgerKind::Exchange, 1.0, references);

        let root = square.root();
        let first = square.node(root).children[0];
        let budget = square.node(first).exchange.remaining_epsilon;
        square.spend(first, LedgerKind::Exchange, 0.5 * budget, 5).unwrap();
        square.propagate_bounds_up(root, LedgerKind::Exchange);

        let root_node = square.node(root);
        let first_node = square.node(first);
        let expected = 0.5 * budget / first_node.entries as f64 * root_node.entries as f64;
        assert!((root_node.exchange.remaining_epsilon - expected).abs() < 1e-9 * expected);
        assert_eq!(root_node.exchange.remaining_references, references);
    }

    #[test]
    fn overdrawn_budget_is_an_error() {
        let tree = spatial(10, 2);
        let mut square = SquareTree::build(&tree);
        square.reset_ledgers(LedgerKind::Coulomb, 1e-3, 100);

        let root = square.root();
        let budget = square.node(root).coulomb.remaining_epsilon;
        assert!(square.spend(root, LedgerKind::Coulomb, 2.0 * budget, 1).is_err());
    }
}
