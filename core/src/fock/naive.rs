use nalgebra::DMatrix;

use crate::{
    basis::{BasisLayout, Center},
    error::FockError,
    integrals::Integrator,
    utils::check_density,
};

use super::FockOutput;

/// Builds the Coulomb, exchange and Fock matrices by evaluating every integral of the
/// basis exactly. Quartic in the number of functions; meant as a reference for small
/// systems.
pub fn naive_fock(
    centers: &[Center],
    density: &DMatrix<f64>,
    integrator: &impl Integrator<Function = Center>,
) -> Result<FockOutput, FockError> {
    let layout = BasisLayout::new(centers);
    let n = layout.n_functions();
    if n == 0 {
        return Err(FockError::EmptySystem);
    }
    check_density(density, n)?;

    let mut coulomb = DMatrix::zeros(n, n);
    let mut exchange = DMatrix::zeros(n, n);
    let n_centers = centers.len();

    for (a, b, c, d) in itertools::iproduct!(0..n_centers, 0..n_centers, 0..n_centers, 0..n_centers)
    {
        let quartet =
            integrator.electron_repulsion((&centers[a], &centers[b], &centers[c], &centers[d]));
        let [dim_a, dim_b, dim_c, dim_d] = quartet.dims();
        let starts = [a, b, c, d].map(|center| layout.functions(center).start);

        for (i, j, k, l) in itertools::iproduct!(0..dim_a, 0..dim_b, 0..dim_c, 0..dim_d) {
            let [p, q, r, s] = [starts[0] + i, starts[1] + j, starts[2] + k, starts[3] + l];
            let integral = quartet[(i, j, k, l)];
            // (pq|rs): J_pq gets D_rs, K_pr gets D_qs
            coulomb[(p, q)] += density[(r, s)] * integral;
            exchange[(p, r)] += density[(q, s)] * integral;
        }
    }

    Ok(FockOutput::new(coulomb, exchange))
}
