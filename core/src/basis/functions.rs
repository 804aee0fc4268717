use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// (i, j, k) exponents of the polynomial terms of the s function.
const S_COMPONENTS: [(i32, i32, i32); 1] = [(0, 0, 0)];
/// (i, j, k) exponents of the polynomial terms of the p_x, p_y, p_z functions.
const P_COMPONENTS: [(i32, i32, i32); 3] = [(1, 0, 0), (0, 1, 0), (0, 0, 1)];

/// A single primitive Gaussian shell of the form x^i*y^j*z^k*exp(-alpha*r^2), centered
/// at `position`. An s shell holds one basis function, a p shell three.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Center {
    /// The position of this shell, in natural units
    pub position: Vector3<f64>,
    /// The gaussian exponent, also called the bandwidth of the shell
    pub exponent: f64,
    /// Total angular momentum, 0 for s and 1 for p
    pub momentum: i32,
}

impl Center {
    pub fn new(position: Vector3<f64>, exponent: f64, momentum: i32) -> Self {
        Self {
            position,
            exponent,
            momentum,
        }
    }

    /// Number of basis functions in this shell.
    ///
    /// Only correct for s and p shells, which are the only ones accepted when a basis
    /// is built.
    pub fn n_functions(&self) -> usize {
        1 + 2 * (self.momentum * self.momentum) as usize
    }

    /// Cartesian exponents of every function in this shell, in storage order.
    pub fn components(&self) -> &'static [(i32, i32, i32)] {
        match self.momentum {
            0 => &S_COMPONENTS,
            _ => &P_COMPONENTS,
        }
    }

    /// Normalization constants of every function in this shell, in storage order.
    pub fn normalizations(&self) -> impl Iterator<Item = f64> + '_ {
        self.components()
            .iter()
            .map(|&angular| norm(self.exponent, angular))
    }
}

/// Normalization constant of a primitive cartesian gaussian.
pub fn norm(exponent: f64, angular: (i32, i32, i32)) -> f64 {
    let (i, j, k) = angular;

    (std::f64::consts::FRAC_2_PI * exponent)
        .powi(3)
        .sqrt()
        .sqrt()
        * f64::sqrt(
            (8.0 * exponent).powi(i + j + k)
                / ((i + 1..=2 * i).product::<i32>()
                    * (j + 1..=2 * j).product::<i32>()
                    * (k + 1..=2 * k).product::<i32>()) as f64,
        )
}

/// Smallest and largest normalization over all functions of the given momentum whose
/// exponent lies in `[min_exponent, max_exponent]`. Both s and p normalizations grow
/// with the exponent.
pub fn normalization_range(min_exponent: f64, max_exponent: f64, momentum: i32) -> (f64, f64) {
    let angular = match momentum {
        0 => (0, 0, 0),
        _ => (1, 0, 0),
    };
    (norm(min_exponent, angular), norm(max_exponent, angular))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::{norm, Center};

    #[test]
    fn s_normalization() {
        // (2a/pi)^(3/4)
        let expected = (2.0 * 0.8 / std::f64::consts::PI).powf(0.75);
        assert_relative_eq!(norm(0.8, (0, 0, 0)), expected, epsilon = 1e-14);
    }

    #[test]
    fn p_normalization() {
        // (2a/pi)^(3/4) * 2 sqrt(a)
        let a = 1.3;
        let expected = (2.0 * a / std::f64::consts::PI).powf(0.75) * 2.0 * a.sqrt();
        assert_relative_eq!(norm(a, (0, 1, 0)), expected, epsilon = 1e-14);
    }

    #[test]
    fn function_counts() {
        let s = Center::new(Vector3::zeros(), 1.0, 0);
        let p = Center::new(Vector3::zeros(), 1.0, 1);

        assert_eq!(s.n_functions(), 1);
        assert_eq!(p.n_functions(), 3);
        assert_eq!(s.components().len(), s.n_functions());
        assert_eq!(p.components().len(), p.n_functions());
    }
}
