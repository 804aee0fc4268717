//! Multi-tree approximation of the Coulomb and exchange matrices.
//!
//! The basis is partitioned by a [`SpatialTree`], and the upper triangle of the
//! basis x basis matrix by a [`SquareTree`] over it. Each pass recurses the square tree
//! against itself: a (query, reference) pair of blocks is either approximated from
//! bounds on its integrals, split further, or computed exactly once both are leaves.
//! The error of every approximation is charged to the budget of the query block, which
//! keeps the error of every entry within epsilon.
use std::time::Instant;

use nalgebra::{DMatrix, Matrix3xX};

use crate::{
    basis::{build_centers, BasisLayout, Center},
    config::MultiTreeOptions,
    error::FockError,
    integrals::DefaultIntegrator,
    tree::{LedgerKind, SpatialTree, SquareTree},
    utils::{apply_permutation, check_density, unapply_permutation},
};

mod bounds;
mod naive;
mod prune;
mod recursion;
mod stats;

pub use bounds::{IntegralBoundEngine, Interval, NodeQuartet};
pub use naive::naive_fock;
pub use prune::{can_prune, count_factor, density_factor, Approximation, ErrorMode, ErrorPolicy};
pub use stats::{FockStatistics, PhaseTimings};

use recursion::{Coulomb, Exchange, Interaction, Recursion};

/// The three output matrices, F = J - K / 2.
#[derive(Clone, Debug, PartialEq)]
pub struct FockOutput {
    pub fock: DMatrix<f64>,
    pub coulomb: DMatrix<f64>,
    pub exchange: DMatrix<f64>,
}

impl FockOutput {
    pub fn new(coulomb: DMatrix<f64>, exchange: DMatrix<f64>) -> Self {
        Self {
            fock: &coulomb - 0.5 * &exchange,
            coulomb,
            exchange,
        }
    }

    fn placeholder() -> Self {
        Self::new(DMatrix::zeros(1, 1), DMatrix::zeros(1, 1))
    }
}

/// Approximate Fock matrix builder for a fixed basis.
///
/// The trees are built once, in [`MultiTreeFock::new`]. The density can be replaced
/// between computations with [`MultiTreeFock::update_density`], as in an SCF loop.
///
/// Internally all matrices are stored in tree order. The accessors return them in the
/// order of the input basis.
#[derive(Clone, Debug)]
pub struct MultiTreeFock {
    options: MultiTreeOptions,
    policy: ErrorPolicy,
    tree: SpatialTree,
    square_tree: SquareTree,
    bounds: IntegralBoundEngine,
    integrator: DefaultIntegrator,
    /// old_from_new for basis functions
    function_permutation: Vec<usize>,
    /// in tree order
    density: DMatrix<f64>,
    /// in tree order
    output: FockOutput,
    statistics: FockStatistics,
}

impl MultiTreeFock {
    /// Sets up a builder for the shells at the columns of `positions`. `density` is in
    /// the order of the functions of the shells.
    pub fn new(
        positions: &Matrix3xX<f64>,
        exponents: &[f64],
        momenta: &[i32],
        density: &DMatrix<f64>,
        options: MultiTreeOptions,
    ) -> Result<Self, FockError> {
        let centers = build_centers(positions, exponents, momenta)?;
        Self::from_centers(&centers, density, options)
    }

    pub fn from_centers(
        centers: &[Center],
        density: &DMatrix<f64>,
        options: MultiTreeOptions,
    ) -> Result<Self, FockError> {
        let options = options.validated()?;
        if centers.is_empty() {
            return Err(FockError::EmptySystem);
        }

        let mut statistics = FockStatistics::default();

        let start = Instant::now();
        let tree = SpatialTree::build(centers, options.leaf_size);
        statistics.timings.tree_building = start.elapsed();

        let start = Instant::now();
        let square_tree = SquareTree::build(&tree);
        statistics.timings.square_tree_building = start.elapsed();

        let integrator = DefaultIntegrator::default();
        let start = Instant::now();
        let bounds = IntegralBoundEngine::new(&tree, &integrator);
        statistics.timings.schwartz_factors = start.elapsed();

        let n_basis = tree.layout().n_functions();
        statistics.n_centers = centers.len();
        statistics.n_basis = n_basis;

        log::info!(
            "multi-tree fock setup: {} centers, {} functions, {} square nodes, epsilon {:e} ({})",
            centers.len(),
            n_basis,
            square_tree.nodes().len(),
            options.epsilon,
            if options.absolute_error { "absolute" } else { "relative" }
        );

        let mut fock = Self {
            policy: ErrorPolicy::new(&options),
            // the tree's layout is in tree order, the permutation indexes the input shells
            function_permutation: BasisLayout::new(centers)
                .function_permutation(tree.permutation()),
            options,
            tree,
            square_tree,
            bounds,
            integrator,
            density: DMatrix::zeros(n_basis, n_basis),
            output: FockOutput::new(
                DMatrix::zeros(n_basis, n_basis),
                DMatrix::zeros(n_basis, n_basis),
            ),
            statistics,
        };
        fock.update_density(density)?;

        Ok(fock)
    }

    /// Replaces the density and resets the per node bounds and budgets. The previous
    /// output stays available until the next [`MultiTreeFock::compute`].
    pub fn update_density(&mut self, density: &DMatrix<f64>) -> Result<(), FockError> {
        if self.square_tree.is_empty() {
            return Err(FockError::EmptySystem);
        }
        check_density(density, self.n_basis())?;

        self.density = apply_permutation(&self.function_permutation, density);
        self.square_tree.set_entry_bounds(&self.tree, &self.density);
        self.reset_tree();

        Ok(())
    }

    fn reset_tree(&mut self) {
        let references = (self.n_basis() * self.n_basis()) as u64;
        self.square_tree.reset_ledgers(
            LedgerKind::Coulomb,
            self.options.epsilon_coulomb(),
            references,
        );
        self.reset_tree_for_exchange();
    }

    fn reset_tree_for_exchange(&mut self) {
        let references = (self.n_basis() * self.n_basis()) as u64;
        self.square_tree.reset_ledgers(
            LedgerKind::Exchange,
            self.options.epsilon_exchange(),
            references,
        );
    }

    /// Computes the Coulomb, exchange and Fock matrices for the current density.
    ///
    /// Repeated calls with the same density give identical results.
    pub fn compute(&mut self) -> Result<&FockStatistics, FockError> {
        if self.square_tree.is_empty() {
            return Err(FockError::EmptySystem);
        }

        let n = self.n_basis();
        self.reset_tree();
        self.statistics.reset_counters();
        self.statistics.epsilon_coulomb = self.options.epsilon_coulomb();
        self.statistics.epsilon_exchange = self.options.epsilon_exchange();

        let mut coulomb = DMatrix::zeros(n, n);
        let start = Instant::now();
        let counters = self.pass::<Coulomb>(&mut coulomb)?;
        self.statistics.record_coulomb(counters, start.elapsed());

        self.reset_tree_for_exchange();

        let mut exchange = DMatrix::zeros(n, n);
        let start = Instant::now();
        let counters = self.pass::<Exchange>(&mut exchange)?;
        self.statistics.record_exchange(counters, start.elapsed());

        self.output = FockOutput::new(coulomb, exchange);

        log::info!(
            "computed fock matrix in {:?}: {} + {} approximations, {} + {} base cases, {:.3}% of integrals exact",
            self.statistics.timings.coulomb_recursion + self.statistics.timings.exchange_recursion,
            self.statistics.coulomb_approximations,
            self.statistics.exchange_approximations,
            self.statistics.coulomb_base_cases,
            self.statistics.exchange_base_cases,
            100.0 * self.statistics.exact_fraction()
        );

        Ok(&self.statistics)
    }

    fn pass<K: Interaction>(
        &mut self,
        target: &mut DMatrix<f64>,
    ) -> Result<recursion::PassCounters, FockError> {
        Recursion {
            tree: &self.tree,
            square: &mut self.square_tree,
            bounds: &mut self.bounds,
            density: &self.density,
            integrator: &self.integrator,
            policy: self.policy,
            target,
            counters: Default::default(),
        }
        .run::<K>()
    }

    /// Drops the trees and the matrices. Computing afterwards is an error.
    pub fn clear(&mut self) {
        self.tree = SpatialTree::default();
        self.square_tree = SquareTree::default();
        self.bounds = IntegralBoundEngine::default();
        self.function_permutation.clear();
        self.density = DMatrix::zeros(1, 1);
        self.output = FockOutput::placeholder();
        self.statistics = FockStatistics::default();
    }

    pub fn n_basis(&self) -> usize {
        self.tree.layout().n_functions()
    }

    pub fn fock_matrix(&self) -> DMatrix<f64> {
        self.unpermuted(&self.output.fock)
    }

    pub fn coulomb_matrix(&self) -> DMatrix<f64> {
        self.unpermuted(&self.output.coulomb)
    }

    pub fn exchange_matrix(&self) -> DMatrix<f64> {
        self.unpermuted(&self.output.exchange)
    }

    /// All three matrices, in the order of the input basis.
    pub fn output(&self) -> FockOutput {
        FockOutput {
            fock: self.fock_matrix(),
            coulomb: self.coulomb_matrix(),
            exchange: self.exchange_matrix(),
        }
    }

    fn unpermuted(&self, matrix: &DMatrix<f64>) -> DMatrix<f64> {
        if self.function_permutation.is_empty() {
            // cleared, return the placeholder as is
            return matrix.clone();
        }
        unapply_permutation(&self.function_permutation, matrix)
    }

    pub fn statistics(&self) -> &FockStatistics {
        &self.statistics
    }

    pub fn options(&self) -> &MultiTreeOptions {
        &self.options
    }

    /// `old_from_new` for shells: the input index of the shell at each tree position.
    pub fn center_permutation(&self) -> &[usize] {
        self.tree.permutation()
    }

    /// `old_from_new` for basis functions.
    pub fn function_permutation(&self) -> &[usize] {
        &self.function_permutation
    }
}
