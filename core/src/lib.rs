pub mod basis;
pub mod config;
pub mod error;
pub mod fock;
pub mod integrals;
pub mod tree;
pub mod utils;

pub use config::{ConfigSystem, MultiTreeOptions};
pub use error::FockError;
pub use fock::{naive_fock, FockOutput, FockStatistics, MultiTreeFock};

pub mod testing {
    use nalgebra::{DMatrix, Vector3};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::{basis::Center, config::ConfigSystem, utils::symmetric_matrix};

    /// Random system of `n` shells in a cube of side `2 * spread`, with a positive
    /// semi-definite density of rank `occupied`.
    pub fn random_system(
        n: usize,
        spread: f64,
        max_momentum: i32,
        occupied: usize,
        seed: u64,
    ) -> ConfigSystem {
        let mut rng = StdRng::seed_from_u64(seed);

        let centers = (0..n)
            .map(|_| {
                Center::new(
                    Vector3::from_fn(|_, _| rng.gen_range(-spread..spread)),
                    rng.gen_range(0.3..3.0),
                    rng.gen_range(0..=max_momentum),
                )
            })
            .collect::<Vec<_>>();

        let n_basis = centers.iter().map(Center::n_functions).sum();
        let coefficients = DMatrix::from_fn(n_basis, occupied, |_, _| rng.gen_range(-1.0..1.0));
        // closed shell, two electrons per occupied orbital
        let density = symmetric_matrix(n_basis, |i, j| {
            2.0 * coefficients.row(i).dot(&coefficients.row(j))
        });

        ConfigSystem::new(format!("random-{n}-{seed}"), &centers, &density)
    }
}
