mod functions;

use std::ops::Range;

pub use functions::{norm, normalization_range, Center};
use nalgebra::Matrix3xX;

use crate::error::FockError;

/// Builds the shells of a system from the column-wise positions, exponents and angular
/// momenta of every center.
///
/// Only s and p shells are accepted, since the number of functions per shell is
/// `1 + 2 l^2`.
pub fn build_centers(
    positions: &Matrix3xX<f64>,
    exponents: &[f64],
    momenta: &[i32],
) -> Result<Vec<Center>, FockError> {
    let n_centers = positions.ncols();

    if exponents.len() != n_centers {
        return Err(FockError::DimensionMismatch {
            what: "exponents",
            expected: n_centers,
            found: exponents.len(),
        });
    }
    if momenta.len() != n_centers {
        return Err(FockError::DimensionMismatch {
            what: "momenta",
            expected: n_centers,
            found: momenta.len(),
        });
    }

    positions
        .column_iter()
        .zip(exponents.iter().zip(momenta))
        .enumerate()
        .map(|(center, (position, (&exponent, &momentum)))| {
            if !exponent.is_finite() || exponent <= 0.0 {
                return Err(FockError::InvalidExponent { center, exponent });
            }
            if !(0..=1).contains(&momentum) {
                return Err(FockError::UnsupportedMomentum { center, momentum });
            }
            Ok(Center::new(position.into_owned(), exponent, momentum))
        })
        .collect()
}

/// Maps shells to the contiguous range of basis functions they own.
#[derive(Clone, Debug, Default)]
pub struct BasisLayout {
    /// `offsets[c]` is the first function of center `c`, with one extra trailing entry
    offsets: Vec<usize>,
}

impl BasisLayout {
    pub fn new(centers: &[Center]) -> Self {
        let mut offsets = Vec::with_capacity(centers.len() + 1);
        let mut offset = 0;
        offsets.push(offset);
        for center in centers {
            offset += center.n_functions();
            offsets.push(offset);
        }
        Self { offsets }
    }

    /// Total number of basis functions, the dimension of the Fock matrix.
    pub fn n_functions(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// The functions of a single center.
    pub fn functions(&self, center: usize) -> Range<usize> {
        self.offsets[center]..self.offsets[center + 1]
    }

    /// The functions of `count` consecutive centers starting at `begin`.
    pub fn span(&self, begin: usize, count: usize) -> Range<usize> {
        self.offsets[begin]..self.offsets[begin + count]
    }

    /// Expands a permutation of centers into a permutation of basis functions.
    ///
    /// `old_from_new[i]` is the original index of the center now stored at `i`; the
    /// returned vector has the same meaning for functions.
    pub fn function_permutation(&self, old_from_new: &[usize]) -> Vec<usize> {
        old_from_new
            .iter()
            .flat_map(|&old| self.functions(old))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Matrix3xX;

    use super::{build_centers, BasisLayout};
    use crate::error::FockError;

    fn positions(n: usize) -> Matrix3xX<f64> {
        Matrix3xX::from_fn(n, |i, j| (i + 3 * j) as f64)
    }

    #[test]
    fn layout_counts_s_and_p() {
        let centers = build_centers(&positions(3), &[1.0, 2.0, 3.0], &[0, 1, 0]).unwrap();
        let layout = BasisLayout::new(&centers);

        // N = n_centers + 2 * sum(l^2)
        assert_eq!(layout.n_functions(), 3 + 2);
        assert_eq!(layout.functions(1), 1..4);
        assert_eq!(layout.span(1, 2), 1..5);
    }

    #[test]
    fn function_permutation_keeps_shells_together() {
        let centers = build_centers(&positions(3), &[1.0, 2.0, 3.0], &[0, 1, 0]).unwrap();
        let layout = BasisLayout::new(&centers);

        assert_eq!(layout.function_permutation(&[1, 2, 0]), vec![1, 2, 3, 4, 0]);
    }

    #[test]
    fn rejects_invalid_input() {
        assert_eq!(
            build_centers(&positions(2), &[1.0, -2.0], &[0, 0]),
            Err(FockError::InvalidExponent {
                center: 1,
                exponent: -2.0
            })
        );
        assert_eq!(
            build_centers(&positions(2), &[1.0, 2.0], &[0, 2]),
            Err(FockError::UnsupportedMomentum {
                center: 1,
                momentum: 2
            })
        );
        assert!(matches!(
            build_centers(&positions(2), &[1.0], &[0, 0]),
            Err(FockError::DimensionMismatch { .. })
        ));
    }
}
