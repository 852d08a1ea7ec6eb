//! Rational-damped dipole-dipole and dipole-quadrupole dispersion.

use super::contributions::Contributions;
use super::damping::{RationalDamping, damped_kernel};
use super::model::DispersionCoefficients;
use crate::model::lattice::minimum_image;
use crate::model::structure::Structure;
use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;

/// Evaluates the two-body energy over all pairs and lattice images.
///
/// With `gradient` set the direct position and strain derivatives as well
/// as the derivatives with respect to coordination numbers and charges are
/// accumulated.
pub fn dispersion_2b(
    structure: &Structure,
    trans: &[Vector3<f64>],
    cutoff: f64,
    r4r2: &[f64],
    param: &RationalDamping,
    coeff: &DispersionCoefficients,
    gradient: bool,
) -> Contributions {
    let n = structure.natoms();
    if param.s6 == 0.0 && param.s8 == 0.0 {
        return Contributions::zeros(n);
    }
    let positions = structure.positions();
    let cutoff2 = cutoff * cutoff;

    (0..n)
        .into_par_iter()
        .fold(
            || Contributions::zeros(n),
            |mut acc, iat| {
                for jat in 0..=iat {
                    let c6 = coeff.c6[(iat, jat)];
                    let rrij = 3.0 * r4r2[iat] * r4r2[jat];
                    let r0 = param.critical_radius(r4r2[iat], r4r2[jat]);
                    let base =
                        minimum_image(structure.cell(), positions[iat] - positions[jat]);
                    for t in trans {
                        let vec = base - t;
                        let r2 = vec.norm_squared();
                        if r2 > cutoff2 || r2 < f64::EPSILON {
                            continue;
                        }
                        let r = r2.sqrt();
                        let (t6, d6) = damped_kernel(6, r, r0);
                        let (t8, d8) = damped_kernel(8, r, r0);
                        let edisp = param.s6 * t6 + param.s8 * rrij * t8;

                        let de = -c6 * edisp * 0.5;
                        acc.energies[iat] += de;
                        if iat != jat {
                            acc.energies[jat] += de;
                        }
                        if !gradient {
                            continue;
                        }

                        let gdisp = param.s6 * d6 + param.s8 * rrij * d8;
                        let dg = vec * (-c6 * gdisp);
                        acc.dedcn[iat] -= coeff.dc6dcn[(iat, jat)] * edisp;
                        acc.dedq[iat] -= coeff.dc6dq[(iat, jat)] * edisp;
                        if iat != jat {
                            acc.dedcn[jat] -= coeff.dc6dcn[(jat, iat)] * edisp;
                            acc.dedq[jat] -= coeff.dc6dq[(jat, iat)] * edisp;
                            acc.gradient[iat] += dg;
                            acc.gradient[jat] -= dg;
                            acc.sigma += dg * vec.transpose();
                        } else {
                            acc.sigma += dg * vec.transpose() * 0.5;
                        }
                    }
                }
                acc
            },
        )
        .reduce(|| Contributions::zeros(n), Contributions::merge)
}

/// Two-body energy resolved into atom pairs.
///
/// The returned matrix sums to the two-body energy; each pair carries half
/// of its interaction in both `(i, j)` and `(j, i)`.
pub fn pairwise_2b(
    structure: &Structure,
    trans: &[Vector3<f64>],
    cutoff: f64,
    r4r2: &[f64],
    param: &RationalDamping,
    c6: &DMatrix<f64>,
) -> DMatrix<f64> {
    let n = structure.natoms();
    let positions = structure.positions();
    let cutoff2 = cutoff * cutoff;
    let mut energy = DMatrix::zeros(n, n);

    for iat in 0..n {
        for jat in 0..=iat {
            let rrij = 3.0 * r4r2[iat] * r4r2[jat];
            let r0 = param.critical_radius(r4r2[iat], r4r2[jat]);
            let base = minimum_image(structure.cell(), positions[iat] - positions[jat]);
            let mut pair = 0.0;
            for t in trans {
                let r2 = (base - t).norm_squared();
                if r2 > cutoff2 || r2 < f64::EPSILON {
                    continue;
                }
                let r = r2.sqrt();
                let edisp =
                    param.s6 * damped_kernel(6, r, r0).0 + param.s8 * rrij * damped_kernel(8, r, r0).0;
                pair -= c6[(iat, jat)] * edisp * 0.5;
            }
            energy[(jat, iat)] += pair;
            if iat != jat {
                energy[(iat, jat)] += pair;
            }
        }
    }
    energy
}
