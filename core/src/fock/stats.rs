use std::time::Duration;

use serde::Serialize;

use super::recursion::PassCounters;

/// Wall time spent in each phase of a build.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct PhaseTimings {
    pub tree_building: Duration,
    pub square_tree_building: Duration,
    pub schwartz_factors: Duration,
    pub coulomb_recursion: Duration,
    pub exchange_recursion: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.tree_building
            + self.square_tree_building
            + self.schwartz_factors
            + self.coulomb_recursion
            + self.exchange_recursion
    }
}

/// What the last call to `compute` did.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FockStatistics {
    pub n_centers: usize,
    pub n_basis: usize,
    pub epsilon_coulomb: f64,
    pub epsilon_exchange: f64,
    pub coulomb_approximations: usize,
    pub exchange_approximations: usize,
    /// Approximations accepted by the Schwartz bound, in both passes
    pub schwartz_prunes: usize,
    pub coulomb_base_cases: usize,
    pub exchange_base_cases: usize,
    /// Exact integrals evaluated in base cases
    pub integrals_computed: usize,
    pub timings: PhaseTimings,
}

impl FockStatistics {
    /// Clears the counters of a previous computation, keeping the setup timings.
    pub(crate) fn reset_counters(&mut self) {
        *self = Self {
            n_centers: self.n_centers,
            n_basis: self.n_basis,
            timings: PhaseTimings {
                coulomb_recursion: Duration::ZERO,
                exchange_recursion: Duration::ZERO,
                ..self.timings
            },
            ..Self::default()
        };
    }

    pub(crate) fn record_coulomb(&mut self, counters: PassCounters, elapsed: Duration) {
        self.coulomb_approximations = counters.approximations;
        self.coulomb_base_cases = counters.base_cases;
        self.schwartz_prunes += counters.schwartz_prunes;
        self.integrals_computed += counters.integrals_computed;
        self.timings.coulomb_recursion = elapsed;
    }

    pub(crate) fn record_exchange(&mut self, counters: PassCounters, elapsed: Duration) {
        self.exchange_approximations = counters.approximations;
        self.exchange_base_cases = counters.base_cases;
        self.schwartz_prunes += counters.schwartz_prunes;
        self.integrals_computed += counters.integrals_computed;
        self.timings.exchange_recursion = elapsed;
    }

    /// Fraction of the n^4 integrals of the basis that were evaluated exactly.
    pub fn exact_fraction(&self) -> f64 {
        let total = (self.n_basis as f64).powi(4);
        if total == 0.0 {
            0.0
        } else {
            // both passes evaluate the integrals they need
            self.integrals_computed as f64 / (2.0 * total)
        }
    }
}
