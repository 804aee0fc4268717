use nalgebra::DMatrix;

use crate::error::FockError;

#[inline(always)]
/// Create a symmetric, square matrix. Function is only run for upper triangle of the matrix
pub(crate) fn symmetric_matrix(
    n: usize,
    mut func: impl FnMut(usize, usize) -> f64,
) -> DMatrix<f64> {
    let m = DMatrix::from_fn(n, n, |i, j| if i <= j { func(i, j) } else { 0.0 });
    DMatrix::from_fn(n, n, |i, j| if i <= j { m[(i, j)] } else { m[(j, i)] })
}

/// Reorders rows and columns so that entry `(i, j)` of the result is entry
/// `(old_from_new[i], old_from_new[j])` of `matrix`.
pub fn apply_permutation(old_from_new: &[usize], matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let n = old_from_new.len();
    DMatrix::from_fn(n, n, |i, j| matrix[(old_from_new[i], old_from_new[j])])
}

/// Inverse of [`apply_permutation`].
pub fn unapply_permutation(old_from_new: &[usize], matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let n = old_from_new.len();
    let mut result = DMatrix::zeros(n, n);
    for (i, j) in itertools::iproduct!(0..n, 0..n) {
        result[(old_from_new[i], old_from_new[j])] = matrix[(i, j)];
    }
    result
}

/// Checks that `matrix` is `n x n` and symmetric up to round-off.
pub(crate) fn check_density(matrix: &DMatrix<f64>, n: usize) -> Result<(), FockError> {
    if matrix.nrows() != n || matrix.ncols() != n {
        return Err(FockError::DimensionMismatch {
            what: "density matrix",
            expected: n,
            found: if matrix.nrows() != n {
                matrix.nrows()
            } else {
                matrix.ncols()
            },
        });
    }

    for (row, col) in (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j))) {
        let (upper, lower) = (matrix[(row, col)], matrix[(col, row)]);
        if (upper - lower).abs() > 1e-10 * upper.abs().max(lower.abs()).max(1.0) {
            return Err(FockError::AsymmetricDensity { row, col });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::{apply_permutation, check_density, symmetric_matrix, unapply_permutation};
    use crate::error::FockError;

    #[test]
    fn permutation_round_trip() {
        let matrix = DMatrix::from_fn(4, 4, |i, j| (10 * i + j) as f64);
        let old_from_new = [2, 0, 3, 1];

        let permuted = apply_permutation(&old_from_new, &matrix);
        assert_eq!(permuted[(0, 1)], matrix[(2, 0)]);
        assert_eq!(permuted[(3, 2)], matrix[(1, 3)]);

        assert_eq!(unapply_permutation(&old_from_new, &permuted), matrix);
    }

    #[test]
    fn density_must_be_symmetric() {
        let density = symmetric_matrix(3, |i, j| (i + j) as f64 * 0.5);
        assert_eq!(check_density(&density, 3), Ok(()));

        let mut asymmetric = density.clone();
        asymmetric[(0, 2)] += 1e-3;
        assert_eq!(
            check_density(&asymmetric, 3),
            Err(FockError::AsymmetricDensity { row: 0, col: 2 })
        );

        assert!(matches!(
            check_density(&density, 4),
            Err(FockError::DimensionMismatch { expected: 4, found: 3, .. })
        ));
    }
}
