//! Deciding whether the contribution of a reference block to a query block can be
//! replaced by a single value.
use crate::{config::MultiTreeOptions, tree::Ledger};

use super::bounds::Interval;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorMode {
    /// The error budget is in the units of the matrix entries.
    Absolute,
    /// The error budget is a fraction of the magnitude of each contribution.
    Relative,
}

/// How the error of an approximation is measured, and which bounds are tried.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ErrorPolicy {
    pub mode: ErrorMode,
    /// Integral bounds with a smaller magnitude are set to zero.
    pub bounds_cutoff: f64,
    pub schwartz_pruning: bool,
}

impl ErrorPolicy {
    pub fn new(options: &MultiTreeOptions) -> Self {
        Self {
            mode: if options.absolute_error {
                ErrorMode::Absolute
            } else {
                ErrorMode::Relative
            },
            bounds_cutoff: options.bounds_cutoff.max(0.0),
            schwartz_pruning: options.schwartz_pruning,
        }
    }

    /// Error of using `value` in place of any contribution in `contribution`.
    pub fn error(&self, contribution: Interval, value: f64) -> f64 {
        let deviation = contribution.deviation(value);
        match self.mode {
            ErrorMode::Absolute => deviation,
            ErrorMode::Relative if deviation == 0.0 => 0.0,
            ErrorMode::Relative => {
                let magnitude = contribution.min_magnitude();
                if magnitude > 0.0 {
                    deviation / magnitude
                } else {
                    f64::INFINITY
                }
            }
        }
    }
}

/// An accepted approximation of the contribution of a reference block.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Approximation {
    /// Added to every entry of the query block
    pub value: f64,
    /// Error summed over the entries of the query block
    pub lost_error: f64,
}

/// Bounds on a single reference pair's contribution to one entry, given bounds on the
/// integrals and on the density entries.
pub fn density_factor(integrals: Interval, density: Interval) -> Interval {
    integrals.times(density)
}

/// Scales the single pair bounds by the number of reference pairs the block contains.
pub fn count_factor(per_pair: Interval, count: u64) -> Interval {
    per_pair.scale(count as f64)
}

/// Tries to approximate the contribution of `count` reference pairs to each of the
/// `entries` entries of a query block.
///
/// Without an `estimate` the midpoint of the contribution bounds is used, which
/// minimizes the worst case error. An estimate of a single integral is scaled like the
/// bounds and clamped into them.
pub fn can_prune(
    policy: &ErrorPolicy,
    ledger: &Ledger,
    entries: usize,
    count: u64,
    integrals: Interval,
    density: Interval,
    estimate: Option<f64>,
) -> Option<Approximation> {
    let integrals = integrals.cutoff(policy.bounds_cutoff);
    let contribution = count_factor(density_factor(integrals, density), count);

    let value = match estimate {
        Some(integral) => contribution.clamp(integral * density.midpoint() * count as f64),
        None => contribution.midpoint(),
    };

    let error = policy.error(contribution, value);
    let allowed = ledger.allowed_error(entries, count);

    // NaN bounds fail the comparison and are never pruned
    (error <= allowed).then(|| Approximation {
        value,
        lost_error: error * entries as f64,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::{can_prune, ErrorMode, ErrorPolicy};
    use crate::{
        fock::bounds::Interval,
        tree::{LedgerKind, SpatialTree, SquareTree},
    };

    fn policy(mode: ErrorMode) -> ErrorPolicy {
        ErrorPolicy {
            mode,
            bounds_cutoff: 0.0,
            schwartz_pruning: false,
        }
    }

    #[test]
    fn relative_error_of_interval() {
        let relative = policy(ErrorMode::Relative);
        assert_relative_eq!(relative.error(Interval::new(1.0, 3.0), 2.0), 1.0);
        assert_eq!(relative.error(Interval::new(-1.0, 3.0), 1.0), f64::INFINITY);
        assert_eq!(relative.error(Interval::point(0.0), 0.0), 0.0);

        let absolute = policy(ErrorMode::Absolute);
        assert_relative_eq!(absolute.error(Interval::new(-1.0, 3.0), 1.0), 2.0);
        assert_relative_eq!(absolute.error(Interval::new(1.0, 3.0), 1.5), 1.5);
    }

    fn ledger(epsilon: f64) -> crate::tree::Ledger {
        let tree = SpatialTree::build(
            &[crate::basis::Center::new(nalgebra::Vector3::zeros(), 1.0, 0)],
            1,
        );
        let mut square = SquareTree::build(&tree);
        square.reset_ledgers(LedgerKind::Coulomb, epsilon, 4);
        *square.node(square.root()).ledger(LedgerKind::Coulomb)
    }

    #[test]
    fn prunes_only_within_budget() {
        let absolute = policy(ErrorMode::Absolute);
        // one entry, four references: each reference may lose a quarter of the budget
        let ledger = ledger(1.0);
        let density = Interval::point(1.0);

        let pruned = can_prune(&absolute, &ledger, 1, 1, Interval::new(1.0, 1.5), density, None);
        let pruned = pruned.expect("error of 0.25 fits in a budget of 0.25");
        assert_relative_eq!(pruned.value, 1.25);
        assert_relative_eq!(pruned.lost_error, 0.25);

        let refused = can_prune(&absolute, &ledger, 1, 1, Interval::new(1.0, 1.6), density, None);
        assert_eq!(refused, None);
    }

    #[test]
    fn estimate_is_clamped_into_bounds() {
        let absolute = policy(ErrorMode::Absolute);
        let ledger = ledger(10.0);

        let pruned = can_prune(
            &absolute,
            &ledger,
            1,
            2,
            Interval::new(0.0, 1.0),
            Interval::point(0.5),
            Some(3.0),
        )
        .unwrap();
        // contribution is within [0, 1], the estimate of 3 becomes 1
        assert_relative_eq!(pruned.value, 1.0);
        assert_relative_eq!(pruned.lost_error, 1.0);
    }

    #[test]
    fn cutoff_makes_small_blocks_exact_zeros() {
        let relative = ErrorPolicy {
            bounds_cutoff: 1e-6,
            ..policy(ErrorMode::Relative)
        };
        let ledger = ledger(0.0);

        let pruned = can_prune(
            &relative,
            &ledger,
            1,
            1,
            Interval::new(1e-9, 1e-7),
            Interval::new(-2.0, 2.0),
            None,
        )
        .unwrap();
        assert_eq!(pruned.value, 0.0);
        assert_eq!(pruned.lost_error, 0.0);
    }
}
