pub mod mmd;
mod schwartz;

use std::ops::Index;

pub use schwartz::schwartz_factors;

use crate::basis::Center;

pub type DefaultIntegrator = mmd::McMurchieDavidson;

/// Every two-electron integral has a factor of pi^(2.5).
pub(crate) const PI_POW_2_5: f64 = 17.493418327624862;

pub trait Integrator {
    type Function;

    /// Calculate the electron-electron repulsion integrals between all functions of
    /// four shells, in chemists' notation (ab|cd).
    fn electron_repulsion(
        &self,
        functions: (
            &Self::Function,
            &Self::Function,
            &Self::Function,
            &Self::Function,
        ),
    ) -> ShellQuartet;
}

/// Largest number of functions in a supported shell (p).
const MAX_SHELL: usize = 3;

/// The integrals (ij|kl) for every function i, j, k, l of four shells.
#[derive(Copy, Clone, Debug)]
pub struct ShellQuartet {
    data: [f64; MAX_SHELL.pow(4)],
    dims: [usize; 4],
}

impl ShellQuartet {
    pub(crate) fn from_fn(
        dims: [usize; 4],
        mut func: impl FnMut(usize, usize, usize, usize) -> f64,
    ) -> Self {
        let mut data = [0.0; MAX_SHELL.pow(4)];
        for (i, j, k, l) in itertools::iproduct!(0..dims[0], 0..dims[1], 0..dims[2], 0..dims[3])
        {
            data[Self::linear((i, j, k, l))] = func(i, j, k, l);
        }
        Self { data, dims }
    }

    #[inline(always)]
    const fn linear((i, j, k, l): (usize, usize, usize, usize)) -> usize {
        ((i * MAX_SHELL + j) * MAX_SHELL + k) * MAX_SHELL + l
    }

    /// Number of functions in each of the four shells.
    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    /// Number of function-level integrals held.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Index<(usize, usize, usize, usize)> for ShellQuartet {
    type Output = f64;

    fn index(&self, index: (usize, usize, usize, usize)) -> &Self::Output {
        &self.data[Self::linear(index)]
    }
}

/// The Boys function F_n(x).
pub(crate) fn boys(n: u64, x: f64) -> f64 {
    // the incomplete gamma form is singular at the origin, use the series there
    if x < 1e-12 {
        let n = n as f64;
        (2.0 * n + 1.0).recip() - x / (2.0 * n + 3.0)
    } else {
        boys::exact::boys(n, x)
    }
}

/// The unnormalized s-type integral (ab|cd) for exponents `[a, b, c, d]`, given the squared
/// distances between the two bra centers, the two ket centers, and the two product
/// centers.
pub(crate) fn s_type_integral(
    [a, b, c, d]: [f64; 4],
    distance_ab_sq: f64,
    distance_cd_sq: f64,
    distance_pq_sq: f64,
) -> f64 {
    let p = a + b;
    let q = c + d;
    2.0 * PI_POW_2_5 / (p * q * (p + q).sqrt())
        * f64::exp(-a * b / p * distance_ab_sq)
        * f64::exp(-c * d / q * distance_cd_sq)
        * boys(0, p * q / (p + q) * distance_pq_sq)
}

/// Returns the shells' function counts for (ab|cd).
pub(crate) fn quartet_dims(shells: (&Center, &Center, &Center, &Center)) -> [usize; 4] {
    let (a, b, c, d) = shells;
    [
        a.n_functions(),
        b.n_functions(),
        c.n_functions(),
        d.n_functions(),
    ]
}
