//! Electronegativity equilibration.
//!
//! Charges minimize a second-order energy expression subject to a fixed
//! total charge. The stationarity conditions form the linear system
//!
//! ```text
//! | A  1 | | q |   | x |
//! | 1ᵀ 0 | | λ | = | Q |
//! ```
//!
//! with the Coulomb matrix `A` and the coordination-number dependent
//! electronegativities `x`.

use super::ewald::Ewald;
use crate::dispersion::error::Error;
use crate::dispersion::jacobian::Jacobian;
use crate::dispersion::params::EeqParams;
use crate::model::structure::Structure;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use std::f64::consts::PI;

/// Smallest accepted pivot relative to the largest one.
const PIVOT_TOLERANCE: f64 = 1.0e-14;

/// Regularization of `sqrt(cn)` in the electronegativity derivative.
const CN_REG: f64 = 1.0e-14;

/// Coulomb interaction between Gaussian charge distributions.
pub(super) enum Interaction {
    Molecular,
    Periodic(Ewald),
}

impl Interaction {
    fn pair(&self, gamma: f64, r: &Vector3<f64>) -> f64 {
        match self {
            Self::Molecular => {
                let d = r.norm();
                libm::erf(gamma * d) / d
            }
            Self::Periodic(ewald) => ewald.pair(gamma, r),
        }
    }

    fn pair_derivative(&self, gamma: f64, r: &Vector3<f64>) -> (Vector3<f64>, Matrix3<f64>) {
        match self {
            Self::Molecular => {
                let d = r.norm();
                let g = gamma * d;
                let slope =
                    (2.0 * gamma / PI.sqrt() * (-g * g).exp() - libm::erf(g) / d) / d;
                let dg = r * (slope / d);
                (dg, dg * r.transpose())
            }
            Self::Periodic(ewald) => ewald.pair_derivative(gamma, r),
        }
    }

    fn self_interaction(&self, gamma: f64) -> f64 {
        match self {
            Self::Molecular => 2.0 * gamma / PI.sqrt(),
            Self::Periodic(ewald) => ewald.self_interaction(gamma),
        }
    }

    fn self_interaction_strain(&self, gamma: f64) -> Matrix3<f64> {
        match self {
            Self::Molecular => Matrix3::zeros(),
            Self::Periodic(ewald) => ewald.self_interaction_strain(gamma),
        }
    }
}

#[inline]
pub(super) fn gamma(a: &EeqParams, b: &EeqParams) -> f64 {
    1.0 / (a.radius * a.radius + b.radius * b.radius).sqrt()
}

/// Right-hand side `x_i = -χ_i + κ_i sqrt(cn_i)` and `dx_i/dcn_i`.
pub(super) fn electronegativities(params: &[&EeqParams], cn: &[f64]) -> (Vec<f64>, Vec<f64>) {
    params
        .iter()
        .zip(cn)
        .map(|(p, &cn)| {
            (
                -p.chi + p.kcn * cn.sqrt(),
                0.5 * p.kcn / (cn + CN_REG).sqrt(),
            )
        })
        .unzip()
}

/// Assembles the bordered `(n + 1) × (n + 1)` equilibration matrix.
pub(super) fn coulomb_matrix(
    structure: &Structure,
    params: &[&EeqParams],
    interaction: &Interaction,
) -> DMatrix<f64> {
    let n = structure.natoms();
    let positions = structure.positions();
    let mut a = DMatrix::zeros(n + 1, n + 1);
    for i in 0..n {
        let p = params[i];
        a[(i, i)] = p.eta + interaction.self_interaction(gamma(p, p));
        for j in 0..i {
            let rij = positions[i] - positions[j];
            let value = interaction.pair(gamma(p, params[j]), &rij);
            a[(i, j)] = value;
            a[(j, i)] = value;
        }
        a[(i, n)] = 1.0;
        a[(n, i)] = 1.0;
    }
    a
}

/// Derivative of `A q` with respect to positions and strain.
pub(super) fn coulomb_derivative(
    structure: &Structure,
    params: &[&EeqParams],
    interaction: &Interaction,
    q: &[f64],
) -> Jacobian {
    let n = structure.natoms();
    let positions = structure.positions();
    let mut jac = Jacobian::zeros(n);
    for i in 0..n {
        let p = params[i];
        jac.add_dl(i, &(interaction.self_interaction_strain(gamma(p, p)) * q[i]));
        for j in 0..i {
            let rij = positions[i] - positions[j];
            let (dg, ds) = interaction.pair_derivative(gamma(p, params[j]), &rij);
            jac.add_dr(i, i, &(dg * q[j]));
            jac.add_dr(j, i, &(-dg * q[j]));
            jac.add_dr(j, j, &(-dg * q[i]));
            jac.add_dr(i, j, &(dg * q[i]));
            jac.add_dl(i, &(ds * q[j]));
            jac.add_dl(j, &(ds * q[i]));
        }
    }
    jac
}

/// Solves the equilibration system.
///
/// Returns the solution vector and, if requested, the full inverse.
///
/// # Errors
///
/// Returns [`Error::NumericalFailure`] if the matrix is singular to working
/// precision or the solution is not finite.
pub(super) fn solve(
    matrix: DMatrix<f64>,
    rhs: &DVector<f64>,
    inverse: bool,
) -> Result<(DVector<f64>, Option<DMatrix<f64>>), Error> {
    let lu = matrix.lu();
    let pivots = lu.u().diagonal().map(f64::abs);
    let largest = pivots.max();
    let smallest = pivots.min();
    if !(largest > 0.0) || smallest < PIVOT_TOLERANCE * largest {
        return Err(Error::numerical(format!(
            "charge equilibration matrix is singular (pivot ratio {:.3e})",
            if largest > 0.0 { smallest / largest } else { 0.0 }
        )));
    }

    let solution = lu
        .solve(rhs)
        .ok_or_else(|| Error::numerical("charge equilibration solve failed"))?;
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(Error::numerical("charge equilibration produced non-finite charges"));
    }

    let inverse = match inverse {
        true => Some(
            lu.try_inverse()
                .ok_or_else(|| Error::numerical("charge equilibration matrix is not invertible"))?,
        ),
        false => None,
    };
    Ok((solution, inverse))
}
