//! Axilrod-Teller-Muto three-body dispersion with zero damping.
//!
//! Triples are enumerated with `k ≤ j ≤ i` over independent images of `j`
//! and `k`; coinciding indices are weighted by [`triple_scale`].

use super::contributions::Contributions;
use super::damping::RationalDamping;
use super::model::DispersionCoefficients;
use crate::model::lattice::minimum_image;
use crate::model::structure::Structure;
use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;

/// Multiplicity correction for triples with repeated atom indices.
#[inline]
fn triple_scale(i: usize, j: usize, k: usize) -> f64 {
    if i == j {
        if i == k { 1.0 / 6.0 } else { 0.5 }
    } else if i != k && j != k {
        1.0
    } else {
        0.5
    }
}

/// Geometry of one triple: squared side lengths, angular term, damping and
/// the derivative factors of `ang * fdmp` with respect to each squared side.
struct Triple {
    ang: f64,
    fdmp: f64,
    /// `∂(ang * fdmp)/∂r²` for the sides ij, ik and jk.
    d: [f64; 3],
}

impl Triple {
    fn new(r2ij: f64, r2ik: f64, r2jk: f64, r0: f64, alp: f64) -> Self {
        let r2 = r2ij * r2ik * r2jk;
        let r1 = r2.sqrt();
        let r3 = r2 * r1;
        let r5 = r3 * r2;

        let p = (r0 / r1).powf(alp / 3.0);
        let fdmp = 1.0 / (1.0 + 6.0 * p);
        let ang = 0.375 * (r2ij + r2jk - r2ik) * (r2ij - r2jk + r2ik) * (-r2ij + r2jk + r2ik) / r5
            + 1.0 / r3;

        // ∂fdmp/∂r²_x = alp p fdmp² / r²_x, ∂ang/∂r²_x = dang_x / (2 r²_x)
        let dfdmp = alp * p * fdmp * fdmp;
        let side = |a: f64, b: f64, c: f64| {
            let dang = -0.375
                * (a.powi(3) + a * a * (b + c) + a * (3.0 * b * b + 2.0 * b * c + 3.0 * c * c)
                    - 5.0 * (b - c).powi(2) * (b + c))
                / r5;
            (0.5 * dang * fdmp + ang * dfdmp) / a
        };

        Self {
            ang,
            fdmp,
            d: [
                side(r2ij, r2jk, r2ik),
                side(r2ik, r2jk, r2ij),
                side(r2jk, r2ik, r2ij),
            ],
        }
    }
}

/// Visits every contributing triple.
///
/// The callback receives `(i, j, k, vij, vik, vjk, c9, triple)` where the
/// vectors point from the first to the second atom of each side and `c9`
/// is already scaled by `s9`.
fn for_each_triple<F>(
    structure: &Structure,
    trans: &[Vector3<f64>],
    cutoff: f64,
    c6: &DMatrix<f64>,
    param: &RationalDamping,
    iat: usize,
    mut visit: F,
) where
    F: FnMut(usize, usize, usize, &Vector3<f64>, &Vector3<f64>, &Vector3<f64>, f64, f64),
{
    let positions = structure.positions();
    let cutoff2 = cutoff * cutoff;
    let cell = structure.cell();
    for jat in 0..=iat {
        let c6ij = c6[(iat, jat)];
        let base_ij = minimum_image(cell, positions[jat] - positions[iat]);
        for tj in trans {
            let vij = base_ij + tj;
            let r2ij = vij.norm_squared();
            if r2ij > cutoff2 || r2ij < f64::EPSILON {
                continue;
            }
            for kat in 0..=jat {
                let c9 = param.s9 * (c6ij * c6[(iat, kat)] * c6[(jat, kat)]).abs().sqrt();
                let triple = triple_scale(iat, jat, kat);
                let base_ik = minimum_image(cell, positions[kat] - positions[iat]);
                for tk in trans {
                    let vik = base_ik + tk;
                    let r2ik = vik.norm_squared();
                    if r2ik > cutoff2 || r2ik < f64::EPSILON {
                        continue;
                    }
                    let vjk = vik - vij;
                    let r2jk = vjk.norm_squared();
                    if r2jk > cutoff2 || r2jk < f64::EPSILON {
                        continue;
                    }
                    visit(iat, jat, kat, &vij, &vik, &vjk, c9, triple);
                }
            }
        }
    }
}

/// Evaluates the three-body energy.
///
/// `coeff` must hold C6 coefficients evaluated at zero partial charges;
/// the three-body term does not contribute to the charge derivatives.
pub fn dispersion_3b(
    structure: &Structure,
    trans: &[Vector3<f64>],
    cutoff: f64,
    r4r2: &[f64],
    param: &RationalDamping,
    coeff: &DispersionCoefficients,
    gradient: bool,
) -> Contributions {
    let n = structure.natoms();
    if !param.has_three_body() {
        return Contributions::zeros(n);
    }
    let r0 = |i: usize, j: usize| param.critical_radius(r4r2[i], r4r2[j]);
    let c6 = &coeff.c6;

    (0..n)
        .into_par_iter()
        .fold(
            || Contributions::zeros(n),
            |mut acc, iat| {
                for_each_triple(structure, trans, cutoff, c6, param, iat, |i, j, k, vij, vik, vjk, c9, triple| {
                    let r0ijk = r0(i, j) * r0(i, k) * r0(j, k);
                    let geom = Triple::new(
                        vij.norm_squared(),
                        vik.norm_squared(),
                        vjk.norm_squared(),
                        r0ijk,
                        param.alp,
                    );
                    let e = c9 * geom.ang * geom.fdmp * triple;
                    acc.energies[i] += e / 3.0;
                    acc.energies[j] += e / 3.0;
                    acc.energies[k] += e / 3.0;
                    if !gradient {
                        return;
                    }

                    let scale = 2.0 * c9 * triple;
                    let dgij = vij * (scale * geom.d[0]);
                    let dgik = vik * (scale * geom.d[1]);
                    let dgjk = vjk * (scale * geom.d[2]);
                    acc.gradient[i] -= dgij + dgik;
                    acc.gradient[j] += dgij - dgjk;
                    acc.gradient[k] += dgik + dgjk;
                    acc.sigma += dgij * vij.transpose() + dgik * vik.transpose() + dgjk * vjk.transpose();

                    let (cij, cik, cjk) = (c6[(i, j)], c6[(i, k)], c6[(j, k)]);
                    let dc = &coeff.dc6dcn;
                    acc.dedcn[i] += 0.5 * e * (dc[(i, j)] / cij + dc[(i, k)] / cik);
                    acc.dedcn[j] += 0.5 * e * (dc[(j, i)] / cij + dc[(j, k)] / cjk);
                    acc.dedcn[k] += 0.5 * e * (dc[(k, i)] / cik + dc[(k, j)] / cjk);
                });
                acc
            },
        )
        .reduce(|| Contributions::zeros(n), Contributions::merge)
}

/// Three-body energy resolved into atom pairs.
///
/// Each triple distributes its energy evenly over the six ordered pairs it
/// contains, so the matrix sums to the three-body energy.
pub fn pairwise_3b(
    structure: &Structure,
    trans: &[Vector3<f64>],
    cutoff: f64,
    r4r2: &[f64],
    param: &RationalDamping,
    c6: &DMatrix<f64>,
) -> DMatrix<f64> {
    let n = structure.natoms();
    let mut energy = DMatrix::zeros(n, n);
    if !param.has_three_body() {
        return energy;
    }
    let r0 = |i: usize, j: usize| param.critical_radius(r4r2[i], r4r2[j]);
    for iat in 0..n {
        for_each_triple(structure, trans, cutoff, c6, param, iat, |i, j, k, vij, vik, vjk, c9, triple| {
            let geom = Triple::new(
                vij.norm_squared(),
                vik.norm_squared(),
                vjk.norm_squared(),
                r0(i, j) * r0(i, k) * r0(j, k),
                param.alp,
            );
            let e = c9 * geom.ang * geom.fdmp * triple / 6.0;
            for (a, b) in [(j, i), (k, i), (i, j), (k, j), (i, k), (j, k)] {
                energy[(a, b)] += e;
            }
        });
    }
    energy
}
