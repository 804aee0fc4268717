//! McMurchie Davidon integration scheme.
//! Reference:
//!
//! [1] Goings, J. Integrals. https://joshuagoings.com/2017/04/28/integrals/
use nalgebra::Vector3;

use crate::basis::{norm, Center};

use super::{boys, quartet_dims, Integrator, ShellQuartet, PI_POW_2_5};

#[derive(Copy, Clone, Debug, Default)]
pub struct McMurchieDavidson;

impl Integrator for McMurchieDavidson {
    type Function = Center;

    fn electron_repulsion(
        &self,
        functions: (
            &Self::Function,
            &Self::Function,
            &Self::Function,
            &Self::Function,
        ),
    ) -> ShellQuartet {
        let (shell_a, shell_b, shell_c, shell_d) = functions;
        let diff_ab = shell_a.position - shell_b.position;
        let diff_cd = shell_c.position - shell_d.position;

        let product_center_ab = product_center(
            shell_a.position,
            shell_a.exponent,
            shell_b.position,
            shell_b.exponent,
        );
        let product_center_cd = product_center(
            shell_c.position,
            shell_c.exponent,
            shell_d.position,
            shell_d.exponent,
        );
        let diff_product = product_center_ab - product_center_cd;

        let (components_a, components_b, components_c, components_d) = (
            shell_a.components(),
            shell_b.components(),
            shell_c.components(),
            shell_d.components(),
        );

        ShellQuartet::from_fn(quartet_dims(functions), |i, j, k, l| {
            let angular = [
                components_a[i],
                components_b[j],
                components_c[k],
                components_d[l],
            ];

            let normalization = norm(shell_a.exponent, angular[0])
                * norm(shell_b.exponent, angular[1])
                * norm(shell_c.exponent, angular[2])
                * norm(shell_d.exponent, angular[3]);

            normalization
                * primitive_electron(
                    [
                        shell_a.exponent,
                        shell_b.exponent,
                        shell_c.exponent,
                        shell_d.exponent,
                    ],
                    angular,
                    diff_ab,
                    diff_cd,
                    diff_product,
                )
        })
    }
}

fn primitive_electron(
    [a, b, c, d]: [f64; 4],
    angular: [(i32, i32, i32); 4],
    diff_ab: Vector3<f64>,
    diff_cd: Vector3<f64>,
    diff_product: Vector3<f64>,
) -> f64 {
    let [(l1, m1, n1), (l2, m2, n2), (l3, m3, n3), (l4, m4, n4)] = angular;

    let p = a + b;
    let q = c + d;
    let alpha = p * q / (p + q);

    let mut sum = 0.0;
    for t1 in 0..=l1 + l2 {
        let e1 = hermite_expansion([l1, l2, t1], diff_ab.x, a, b);
        for u1 in 0..=m1 + m2 {
            let e2 = hermite_expansion([m1, m2, u1], diff_ab.y, a, b);
            for v1 in 0..=n1 + n2 {
                let e3 = hermite_expansion([n1, n2, v1], diff_ab.z, a, b);
                for t2 in 0..=l3 + l4 {
                    let e4 = hermite_expansion([l3, l4, t2], diff_cd.x, c, d);
                    for u2 in 0..=m3 + m4 {
                        let e5 = hermite_expansion([m3, m4, u2], diff_cd.y, c, d);
                        for v2 in 0..=n3 + n4 {
                            let e6 = hermite_expansion([n3, n4, v2], diff_cd.z, c, d);

                            // (-1)^(t2 + u2 + v2)
                            let sign = if (t2 + u2 + v2) % 2 == 0 { 1.0 } else { -1.0 };

                            sum += e1
                                * e2
                                * e3
                                * e4
                                * e5
                                * e6
                                * sign
                                * coulomb_auxiliary(
                                    t1 + t2,
                                    u1 + u2,
                                    v1 + v2,
                                    0,
                                    alpha,
                                    diff_product,
                                );
                        }
                    }
                }
            }
        }
    }

    2.0 * PI_POW_2_5 * (p * q * (p + q).sqrt()).recip() * sum
}

/// Hermite expansion coefficient E^{ij}_t along one axis, where `diff` is the
/// component of A - B.
pub(crate) fn hermite_expansion([i, j, t]: [i32; 3], diff: f64, a: f64, b: f64) -> f64 {
    let p = a + b;
    let q = a * b / p;

    if t < 0 || t > i + j {
        0.0
    } else if i == 0 && j == 0 && t == 0 {
        f64::exp(-q * diff * diff)
    } else if j == 0 {
        (2.0 * p).recip() * hermite_expansion([i - 1, j, t - 1], diff, a, b)
            - (q * diff / a) * hermite_expansion([i - 1, j, t], diff, a, b)
            + (t + 1) as f64 * hermite_expansion([i - 1, j, t + 1], diff, a, b)
    } else {
        (2.0 * p).recip() * hermite_expansion([i, j - 1, t - 1], diff, a, b)
            + (q * diff / b) * hermite_expansion([i, j - 1, t], diff, a, b)
            + (t + 1) as f64 * hermite_expansion([i, j - 1, t + 1], diff, a, b)
    }
}

/// Hermite Coulomb integral R^n_{tuv}, where `diff` is the vector between the two
/// product centers, P - Q.
pub(crate) fn coulomb_auxiliary(t: i32, u: i32, v: i32, n: u64, p: f64, diff: Vector3<f64>) -> f64 {
    if t == 0 && u == 0 && v == 0 {
        return (-2.0 * p).powi(n as i32) * boys(n, p * diff.norm_squared());
    }

    let mut value = 0.0;
    if t == 0 && u == 0 {
        if v > 1 {
            value += (v - 1) as f64 * coulomb_auxiliary(t, u, v - 2, n + 1, p, diff);
        }
        value += diff.z * coulomb_auxiliary(t, u, v - 1, n + 1, p, diff);
    } else if t == 0 {
        if u > 1 {
            value += (u - 1) as f64 * coulomb_auxiliary(t, u - 2, v, n + 1, p, diff);
        }
        value += diff.y * coulomb_auxiliary(t, u - 1, v, n + 1, p, diff);
    } else {
        if t > 1 {
            value += (t - 1) as f64 * coulomb_auxiliary(t - 2, u, v, n + 1, p, diff);
        }
        value += diff.x * coulomb_auxiliary(t - 1, u, v, n + 1, p, diff);
    }
    value
}

#[inline(always)]
fn product_center(
    a_pos: Vector3<f64>,
    a_exp: f64,
    b_pos: Vector3<f64>,
    b_exp: f64,
) -> Vector3<f64> {
    (a_exp * a_pos + b_exp * b_pos) / (a_exp + b_exp)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::{hermite_expansion, McMurchieDavidson};
    use crate::{
        basis::{norm, Center},
        integrals::{s_type_integral, Integrator},
    };

    fn s(x: f64, y: f64, z: f64, exponent: f64) -> Center {
        Center::new(Vector3::new(x, y, z), exponent, 0)
    }

    fn p(x: f64, y: f64, z: f64, exponent: f64) -> Center {
        Center::new(Vector3::new(x, y, z), exponent, 1)
    }

    #[test]
    fn hermite_base_case() {
        // E^{00}_0 = exp(-ab/(a+b) * Q^2)
        assert_relative_eq!(
            hermite_expansion([0, 0, 0], 0.5, 1.0, 3.0),
            f64::exp(-0.75 * 0.25)
        );
        assert_eq!(hermite_expansion([1, 0, 2], 0.5, 1.0, 3.0), 0.0);
    }

    #[test]
    fn s_quartet_matches_closed_form() {
        let (a, b, c, d) = (
            s(0.0, 0.0, 0.0, 1.2),
            s(0.5, -0.3, 0.1, 0.4),
            s(1.5, 0.2, -0.7, 2.1),
            s(-0.4, 1.1, 0.3, 0.9),
        );

        let quartet = McMurchieDavidson.electron_repulsion((&a, &b, &c, &d));

        let p = a.exponent + b.exponent;
        let q = c.exponent + d.exponent;
        let product_ab = (a.exponent * a.position + b.exponent * b.position) / p;
        let product_cd = (c.exponent * c.position + d.exponent * d.position) / q;

        let expected = norm(a.exponent, (0, 0, 0))
            * norm(b.exponent, (0, 0, 0))
            * norm(c.exponent, (0, 0, 0))
            * norm(d.exponent, (0, 0, 0))
            * s_type_integral(
                [a.exponent, b.exponent, c.exponent, d.exponent],
                (a.position - b.position).norm_squared(),
                (c.position - d.position).norm_squared(),
                (product_ab - product_cd).norm_squared(),
            );

        assert_eq!(quartet.dims(), [1, 1, 1, 1]);
        assert_relative_eq!(quartet[(0, 0, 0, 0)], expected, max_relative = 1e-12);
    }

    #[test]
    fn single_center_self_repulsion() {
        // (ss|ss) of a single normalized s function is sqrt(4a / pi)
        let a = 0.7;
        let center = s(0.1, 0.2, 0.3, a);
        let quartet = McMurchieDavidson.electron_repulsion((&center, &center, &center, &center));

        assert_relative_eq!(
            quartet[(0, 0, 0, 0)],
            (4.0 * a / std::f64::consts::PI).sqrt(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn p_quartet_symmetries() {
        let (a, b, c, d) = (
            p(0.0, 0.0, 0.0, 1.1),
            s(0.3, 0.4, -0.2, 0.6),
            p(1.0, -0.5, 0.2, 0.8),
            s(0.2, 0.9, 0.6, 1.7),
        );

        let abcd = McMurchieDavidson.electron_repulsion((&a, &b, &c, &d));
        let badc = McMurchieDavidson.electron_repulsion((&b, &a, &d, &c));
        let cdab = McMurchieDavidson.electron_repulsion((&c, &d, &a, &b));

        assert_eq!(abcd.dims(), [3, 1, 3, 1]);
        for (i, k) in itertools::iproduct!(0..3, 0..3) {
            assert_relative_eq!(abcd[(i, 0, k, 0)], badc[(0, i, 0, k)], max_relative = 1e-10);
            assert_relative_eq!(abcd[(i, 0, k, 0)], cdab[(k, 0, i, 0)], max_relative = 1e-10);
        }
    }

    #[test]
    fn p_diagonal_is_positive() {
        let (a, b) = (p(0.0, 0.0, 0.0, 0.9), p(0.7, 0.1, -0.3, 1.4));
        let quartet = McMurchieDavidson.electron_repulsion((&a, &b, &a, &b));

        for (i, j) in itertools::iproduct!(0..3, 0..3) {
            assert!(quartet[(i, j, i, j)] > 0.0);
        }
    }
}
