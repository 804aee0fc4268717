use nalgebra::DMatrix;

use crate::basis::{BasisLayout, Center};

use super::Integrator;

/// Computes the Schwartz factors sqrt((ij|ij)) for every pair of basis functions.
///
/// The result is symmetric and indexed like the Fock matrix of `centers`. Together
/// with the Cauchy-Schwarz inequality |(ij|kl)| <= sqrt((ij|ij)) sqrt((kl|kl)) these
/// bound any integral of the basis, whatever the angular momentum.
pub fn schwartz_factors(
    centers: &[Center],
    layout: &BasisLayout,
    integrator: &(impl Integrator<Function = Center> + Sync),
) -> DMatrix<f64> {
    let n_centers = centers.len();
    let mut factors = DMatrix::zeros(layout.n_functions(), layout.n_functions());

    let pairs = (0..n_centers)
        .flat_map(|a| (a..n_centers).map(move |b| (a, b)))
        .collect::<Vec<_>>();

    let diagonal = |&(a, b): &(usize, usize)| {
        let quartet =
            integrator.electron_repulsion((&centers[a], &centers[b], &centers[a], &centers[b]));
        let [dim_a, dim_b, ..] = quartet.dims();

        itertools::iproduct!(0..dim_a, 0..dim_b)
            .map(|(i, j)| {
                let function_i = layout.functions(a).start + i;
                let function_j = layout.functions(b).start + j;
                // (ij|ij) is positive for gaussians, a zero here is round-off or
                // underflow while its square root may still be representable. Flooring
                // keeps the factor an upper bound without ever being zero.
                let factor = quartet[(i, j, i, j)].max(f64::MIN_POSITIVE).sqrt();
                (function_i, function_j, factor)
            })
            .collect::<Vec<_>>()
    };

    #[cfg(feature = "rayon")]
    let entries = {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

        pairs.par_iter().flat_map_iter(diagonal).collect::<Vec<_>>()
    };

    #[cfg(not(feature = "rayon"))]
    let entries = pairs.iter().flat_map(diagonal).collect::<Vec<_>>();

    for (i, j, factor) in entries {
        factors[(i, j)] = factor;
        factors[(j, i)] = factor;
    }

    log::debug!(
        "computed {} schwartz factors for {} centers",
        pairs.len(),
        n_centers
    );

    factors
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::schwartz_factors;
    use crate::{
        basis::{BasisLayout, Center},
        integrals::{DefaultIntegrator, Integrator},
    };

    #[test]
    fn factors_bound_integrals() {
        let centers = vec![
            Center::new(Vector3::new(0.0, 0.0, 0.0), 1.0, 0),
            Center::new(Vector3::new(0.8, 0.0, 0.3), 0.5, 1),
            Center::new(Vector3::new(-0.2, 1.1, 0.0), 2.0, 0),
        ];
        let layout = BasisLayout::new(&centers);
        let integrator = DefaultIntegrator::default();
        let factors = schwartz_factors(&centers, &layout, &integrator);

        assert_eq!(factors.nrows(), 5);
        assert_relative_eq!(factors, factors.transpose());

        let quartet =
            integrator.electron_repulsion((&centers[0], &centers[1], &centers[2], &centers[1]));
        for (j, l) in itertools::iproduct!(0..3, 0..3) {
            let bound = factors[(0, 1 + j)] * factors[(4, 1 + l)];
            assert!(quartet[(0, j, 0, l)].abs() <= bound * (1.0 + 1e-12));
        }
    }

    #[test]
    fn underflowing_factors_stay_positive() {
        // (ij|ij) ~ exp(-2 d^2 ab / (a + b)) underflows, its square root does not
        let centers = vec![
            Center::new(Vector3::new(0.0, 0.0, 0.0), 2.0, 0),
            Center::new(Vector3::new(24.0, 0.0, 0.0), 2.0, 0),
        ];
        let layout = BasisLayout::new(&centers);
        let factors = schwartz_factors(&centers, &layout, &DefaultIntegrator::default());

        assert!(factors[(0, 1)] > 0.0);
        assert!(factors[(0, 1)] >= f64::MIN_POSITIVE.sqrt());
        assert!(factors[(0, 0)] > factors[(0, 1)]);
    }
}
