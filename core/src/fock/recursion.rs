//! Dual-tree recursion of a query square tree against a reference square tree.
//!
//! Both passes share the traversal, the pruning and the error accounting. They differ
//! in which integrals pair a query block with a reference block, which is what
//! [`Interaction`] describes.
use nalgebra::DMatrix;
use smallvec::{smallvec, SmallVec};

use crate::{
    error::FockError,
    integrals::{DefaultIntegrator, Integrator},
    tree::{LedgerKind, SpatialTree, SquareId, SquareNode, SquareTree},
};

use super::{
    bounds::{IntegralBoundEngine, Interval, NodeQuartet},
    prune::{can_prune, Approximation, ErrorPolicy},
};

/// Pairing of query and reference blocks for one of the two passes.
pub(crate) trait Interaction {
    const KIND: LedgerKind;
    const NAME: &'static str;

    /// Spatial nodes of the integrals coupling the two blocks. Every integral needed for
    /// any entry of the query block, from any pair of the reference block, is in one of
    /// these blocks.
    fn quartets(query: &SquareNode, reference: &SquareNode) -> SmallVec<[NodeQuartet; 2]>;

    /// Exact contribution of the reference block to the `mu x nu` block of the query,
    /// indexed from the first function of each. Returns the number of integrals computed.
    fn base_case(
        input: &BaseCaseInput,
        query: &SquareNode,
        reference: &SquareNode,
        block: &mut DMatrix<f64>,
    ) -> usize;
}

/// Everything a base case reads.
pub(crate) struct BaseCaseInput<'a> {
    pub tree: &'a SpatialTree,
    pub density: &'a DMatrix<f64>,
    pub integrator: &'a DefaultIntegrator,
}

/// Coulomb pass: J_mu,nu = sum D_rho,sigma (mu nu|rho sigma).
pub(crate) struct Coulomb;

impl Interaction for Coulomb {
    const KIND: LedgerKind = LedgerKind::Coulomb;
    const NAME: &'static str = "coulomb";

    fn quartets(query: &SquareNode, reference: &SquareNode) -> SmallVec<[NodeQuartet; 2]> {
        smallvec![[query.mu, query.nu, reference.mu, reference.nu]]
    }

    fn base_case(
        input: &BaseCaseInput,
        query: &SquareNode,
        reference: &SquareNode,
        block: &mut DMatrix<f64>,
    ) -> usize {
        let BaseCaseInput {
            tree,
            density,
            integrator,
        } = input;
        let (centers, layout) = (tree.centers(), tree.layout());
        let row_start = tree.node(query.mu).functions.start;
        let col_start = tree.node(query.nu).functions.start;
        // (rho sigma) and (sigma rho) give the same contribution
        let weight = if reference.on_diagonal { 1.0 } else { 2.0 };
        let mut computed = 0;

        for (a, b, c, d) in itertools::iproduct!(
            tree.node(query.mu).centers(),
            tree.node(query.nu).centers(),
            tree.node(reference.mu).centers(),
            tree.node(reference.nu).centers()
        ) {
            let quartet =
                integrator.electron_repulsion((&centers[a], &centers[b], &centers[c], &centers[d]));
            let [dim_a, dim_b, dim_c, dim_d] = quartet.dims();
            computed += quartet.len();

            let (mu, nu) = (layout.functions(a).start, layout.functions(b).start);
            let (rho, sigma) = (layout.functions(c).start, layout.functions(d).start);
            for (i, j, k, l) in itertools::iproduct!(0..dim_a, 0..dim_b, 0..dim_c, 0..dim_d) {
                block[(mu + i - row_start, nu + j - col_start)] +=
                    weight * density[(rho + k, sigma + l)] * quartet[(i, j, k, l)];
            }
        }

        computed
    }
}

/// Exchange pass: K_mu,nu = sum D_rho,sigma (mu rho|nu sigma).
pub(crate) struct Exchange;

impl Interaction for Exchange {
    const KIND: LedgerKind = LedgerKind::Exchange;
    const NAME: &'static str = "exchange";

    fn quartets(query: &SquareNode, reference: &SquareNode) -> SmallVec<[NodeQuartet; 2]> {
        let mut quartets = smallvec![[query.mu, reference.mu, query.nu, reference.nu]];
        if !reference.on_diagonal {
            // pairs (sigma, rho) of the transposed reference block
            quartets.push([query.mu, reference.nu, query.nu, reference.mu]);
        }
        quartets
    }

    fn base_case(
        input: &BaseCaseInput,
        query: &SquareNode,
        reference: &SquareNode,
        block: &mut DMatrix<f64>,
    ) -> usize {
        let BaseCaseInput {
            tree,
            density,
            integrator,
        } = input;
        let (centers, layout) = (tree.centers(), tree.layout());
        let row_start = tree.node(query.mu).functions.start;
        let col_start = tree.node(query.nu).functions.start;
        let transposed = (!reference.on_diagonal).then_some((reference.nu, reference.mu));
        let mut computed = 0;

        for (rows, cols) in std::iter::once((reference.mu, reference.nu)).chain(transposed) {
            for (a, c, b, d) in itertools::iproduct!(
                tree.node(query.mu).centers(),
                tree.node(rows).centers(),
                tree.node(query.nu).centers(),
                tree.node(cols).centers()
            ) {
                let quartet = integrator
                    .electron_repulsion((&centers[a], &centers[c], &centers[b], &centers[d]));
                let [dim_a, dim_c, dim_b, dim_d] = quartet.dims();
                computed += quartet.len();

                let (mu, rho) = (layout.functions(a).start, layout.functions(c).start);
                let (nu, sigma) = (layout.functions(b).start, layout.functions(d).start);
                for (i, k, j, l) in itertools::iproduct!(0..dim_a, 0..dim_c, 0..dim_b, 0..dim_d) {
                    block[(mu + i - row_start, nu + j - col_start)] +=
                        density[(rho + k, sigma + l)] * quartet[(i, k, j, l)];
                }
            }
        }

        computed
    }
}

/// Counters of one pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PassCounters {
    pub approximations: usize,
    pub schwartz_prunes: usize,
    pub base_cases: usize,
    pub integrals_computed: usize,
}

/// State of one pass of the recursion, writing into `target`.
pub(crate) struct Recursion<'a> {
    pub tree: &'a SpatialTree,
    pub square: &'a mut SquareTree,
    pub bounds: &'a mut IntegralBoundEngine,
    pub density: &'a DMatrix<f64>,
    pub integrator: &'a DefaultIntegrator,
    pub policy: ErrorPolicy,
    pub target: &'a mut DMatrix<f64>,
    pub counters: PassCounters,
}

impl Recursion<'_> {
    /// Runs the pass from the root of the square tree against itself.
    pub fn run<K: Interaction>(mut self) -> Result<PassCounters, FockError> {
        let root = self.square.root();
        self.recurse::<K>(root, root)?;

        log::debug!(
            "{} pass: {} approximations ({} by schwartz), {} base cases, {} integrals",
            K::NAME,
            self.counters.approximations,
            self.counters.schwartz_prunes,
            self.counters.base_cases,
            self.counters.integrals_computed
        );

        Ok(self.counters)
    }

    fn recurse<K: Interaction>(
        &mut self,
        query: SquareId,
        reference: SquareId,
    ) -> Result<(), FockError> {
        let count = self.square.node(reference).entries as u64;

        if let Some(approximation) = self.can_approximate::<K>(query, reference) {
            log::trace!(
                "{}: approximated {:?} against {:?} by {:e}",
                K::NAME,
                query,
                reference,
                approximation.value
            );
            self.fill_approximation(query, approximation.value);
            return self.square.spend(query, K::KIND, approximation.lost_error, count);
        }

        let (query_node, reference_node) = (self.square.node(query), self.square.node(reference));
        let query_children = query_node.children.clone();
        let reference_children: SmallVec<[SquareId; 4]> = if reference_node.is_leaf() {
            smallvec![reference]
        } else {
            reference_node.children.clone()
        };

        match (query_node.is_leaf(), reference_node.is_leaf()) {
            (true, true) => {
                self.base_case::<K>(query, reference);
                self.square.spend(query, K::KIND, 0.0, count)
            }
            (true, false) => {
                for child in reference_children {
                    self.recurse::<K>(query, child)?;
                }
                Ok(())
            }
            (false, _) => {
                self.square.propagate_bounds_down(query, K::KIND)?;
                for query_child in query_children {
                    for &reference_child in &reference_children {
                        self.recurse::<K>(query_child, reference_child)?;
                    }
                }
                self.square.propagate_bounds_up(query, K::KIND);
                Ok(())
            }
        }
    }

    /// Tries the Schwartz bound first if enabled, then the general bounds.
    fn can_approximate<K: Interaction>(
        &mut self,
        query: SquareId,
        reference: SquareId,
    ) -> Option<Approximation> {
        let (query_node, reference_node) = (self.square.node(query), self.square.node(reference));
        let quartets = K::quartets(query_node, reference_node);
        let ledger = *query_node.ledger(K::KIND);
        let density = Interval::new(
            reference_node.density_lower_bound,
            reference_node.density_upper_bound,
        );
        let count = reference_node.entries as u64;
        let entries = query_node.entries;

        if self.policy.schwartz_pruning {
            let bounds = self.hull(&quartets, IntegralBoundEngine::schwartz_bound);
            let estimate = quartets
                .iter()
                .map(|&quartet| self.bounds.nodes_midpoint_integral(self.tree, quartet))
                .sum::<f64>()
                / quartets.len() as f64;

            let approximation = can_prune(
                &self.policy,
                &ledger,
                entries,
                count,
                bounds,
                density,
                Some(estimate),
            );
            if let Some(approximation) = approximation {
                self.counters.approximations += 1;
                self.counters.schwartz_prunes += 1;
                return Some(approximation);
            }
        }

        let bounds = self.hull(&quartets, IntegralBoundEngine::nodes_bounds);
        let approximation =
            can_prune(&self.policy, &ledger, entries, count, bounds, density, None)?;
        self.counters.approximations += 1;
        Some(approximation)
    }

    fn hull(
        &mut self,
        quartets: &[NodeQuartet],
        bound: impl Fn(&mut IntegralBoundEngine, &SpatialTree, NodeQuartet) -> Interval,
    ) -> Interval {
        quartets
            .iter()
            .map(|&quartet| bound(self.bounds, self.tree, quartet))
            .reduce(Interval::hull)
            .unwrap_or(Interval::point(0.0))
    }

    fn base_case<K: Interaction>(&mut self, query: SquareId, reference: SquareId) {
        let query_node = self.square.node(query);
        let rows = self.tree.node(query_node.mu).n_functions();
        let cols = self.tree.node(query_node.nu).n_functions();
        let mut block = DMatrix::zeros(rows, cols);

        let input = BaseCaseInput {
            tree: self.tree,
            density: self.density,
            integrator: self.integrator,
        };
        self.counters.integrals_computed +=
            K::base_case(&input, query_node, self.square.node(reference), &mut block);
        self.counters.base_cases += 1;

        self.fill(query, |i, j| block[(i, j)]);
    }

    fn fill_approximation(&mut self, query: SquareId, value: f64) {
        self.fill(query, |_, _| value);
    }

    /// Adds `value(i, j)` to entry `(mu_i, nu_j)` of the target, and to the transposed
    /// entry off the diagonal.
    fn fill(&mut self, query: SquareId, value: impl Fn(usize, usize) -> f64) {
        let query_node = self.square.node(query);
        let rows = self.tree.node(query_node.mu).functions.clone();
        let cols = self.tree.node(query_node.nu).functions.clone();

        for (i, mu) in rows.enumerate() {
            for (j, nu) in cols.clone().enumerate() {
                let entry = value(i, j);
                self.target[(mu, nu)] += entry;
                if !query_node.on_diagonal {
                    self.target[(nu, mu)] += entry;
                }
            }
        }
    }
}
