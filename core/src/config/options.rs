use serde::Deserialize;

use crate::error::FockError;

/// Tuning parameters of the multi-tree Fock build.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MultiTreeOptions {
    /// The error cutoff, relative by default. Split between the Coulomb and exchange passes.
    pub epsilon: f64,
    /// Fraction of `epsilon` given to the Coulomb pass. A value of 1 gives all of the
    /// error to the Coulomb side.
    pub epsilon_split: f64,
    /// The largest number of centers in a leaf of the spatial tree.
    pub leaf_size: usize,
    /// Use absolute error instead of relative error.
    pub absolute_error: bool,
    /// Attempt to prune with the Schwartz inequality before the general bounds.
    pub schwartz_pruning: bool,
    /// Bounds with a magnitude below this are set to zero.
    pub bounds_cutoff: f64,
}

impl Default for MultiTreeOptions {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            epsilon_split: 0.5,
            leaf_size: 10,
            absolute_error: false,
            schwartz_pruning: false,
            bounds_cutoff: 0.0,
        }
    }
}

impl MultiTreeOptions {
    /// Checks the options and returns a copy with out of range, but harmless, values
    /// clamped. A negative bounds cutoff is treated as zero.
    pub fn validated(self) -> Result<Self, FockError> {
        if !(0.0..=1.0).contains(&self.epsilon_split) {
            return Err(FockError::EpsilonSplit(self.epsilon_split));
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(FockError::NegativeEpsilon(self.epsilon));
        }
        if self.leaf_size == 0 {
            return Err(FockError::LeafSize);
        }

        Ok(Self {
            bounds_cutoff: self.bounds_cutoff.max(0.0),
            ..self
        })
    }

    pub fn epsilon_coulomb(&self) -> f64 {
        self.epsilon_split * self.epsilon
    }

    pub fn epsilon_exchange(&self) -> f64 {
        (1.0 - self.epsilon_split) * self.epsilon
    }
}
