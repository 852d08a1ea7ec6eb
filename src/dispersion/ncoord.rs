//! Coordination numbers from error-function counting.
//!
//! Two flavours are used by the model: the dispersion coordination number,
//! which scales every pair count by an electronegativity factor, and the
//! charge-model coordination number, which uses the bare count followed by a
//! smooth upper bound. Both are summed over all lattice images within a
//! real-space cutoff and optionally return their [`Jacobian`].

use super::error::{Error, ensure_finite};
use super::jacobian::Jacobian;
use super::params::{ElementData, lookup};
use crate::model::lattice::{minimum_image, translations};
use crate::model::structure::Structure;
use nalgebra::Vector3;
use std::f64::consts::PI;

/// Steepness of the counting function.
const KCN: f64 = 7.5;
/// Electronegativity factor `k4 * exp(-(|ΔEN| + k5)² / k6)`.
const K4: f64 = 4.104_51;
const K5: f64 = 19.088_57;
const K6: f64 = 2.0 * 11.281_74 * 11.281_74;

/// Coordination numbers with optional geometric derivatives.
#[derive(Debug, Clone)]
pub struct CoordinationNumbers {
    pub cn: Vec<f64>,
    pub jacobian: Option<Jacobian>,
}

#[inline]
fn erf_count(r: f64, r0: f64) -> f64 {
    0.5 * (1.0 + libm::erf(-KCN * (r - r0) / r0))
}

#[inline]
fn derf_count(r: f64, r0: f64) -> f64 {
    let x = KCN * (r - r0) / r0;
    -KCN / PI.sqrt() / r0 * (-x * x).exp()
}

#[inline]
fn en_factor(a: &ElementData, b: &ElementData) -> f64 {
    let den = (a.electronegativity - b.electronegativity).abs() + K5;
    K4 * (-den * den / K6).exp()
}

/// Dispersion coordination numbers.
///
/// # Arguments
///
/// * `structure` — Geometry
/// * `cutoff` — Real-space cutoff in Bohr
/// * `derivatives` — Whether to build the [`Jacobian`]
///
/// # Errors
///
/// Returns [`Error::NumericalFailure`] if a coordination number is not finite.
pub fn dispersion_cn(
    structure: &Structure,
    cutoff: f64,
    derivatives: bool,
) -> Result<CoordinationNumbers, Error> {
    let data = lookup(structure.numbers())?;
    let result = pair_sum(structure, cutoff, derivatives, |i, j, r| {
        let r0 = data[i].covalent_radius + data[j].covalent_radius;
        let den = en_factor(data[i], data[j]);
        (den * erf_count(r, r0), den * derf_count(r, r0))
    });
    ensure_finite("coordination number", result.cn.iter())?;
    tracing::trace!(natoms = structure.natoms(), "dispersion coordination numbers");
    Ok(result)
}

/// Charge-model coordination numbers, bounded smoothly by `cn_max`.
///
/// # Errors
///
/// Returns [`Error::NumericalFailure`] if a coordination number is not finite.
pub fn eeq_cn(
    structure: &Structure,
    cutoff: f64,
    cn_max: f64,
    derivatives: bool,
) -> Result<CoordinationNumbers, Error> {
    let data = lookup(structure.numbers())?;
    let mut result = pair_sum(structure, cutoff, derivatives, |i, j, r| {
        let r0 = data[i].covalent_radius + data[j].covalent_radius;
        (erf_count(r, r0), derf_count(r, r0))
    });

    let scale: Vec<f64> = result
        .cn
        .iter()
        .map(|&cn| cn_max.exp() / (cn_max.exp() + cn.exp()))
        .collect();
    for cn in result.cn.iter_mut() {
        *cn = (1.0 + cn_max.exp()).ln() - (1.0 + (cn_max - *cn).exp()).ln();
    }
    if let Some(jac) = result.jacobian.as_mut() {
        jac.scale_columns(&scale);
    }

    ensure_finite("coordination number", result.cn.iter())?;
    Ok(result)
}

fn pair_sum<F>(structure: &Structure, cutoff: f64, derivatives: bool, count: F) -> CoordinationNumbers
where
    F: Fn(usize, usize, f64) -> (f64, f64),
{
    let n = structure.natoms();
    let positions = structure.positions();
    let trans = translations(structure.cell(), cutoff);
    let cutoff2 = cutoff * cutoff;

    let mut cn = vec![0.0; n];
    let mut jacobian = derivatives.then(|| Jacobian::zeros(n));

    for iat in 0..n {
        for jat in 0..=iat {
            let base: Vector3<f64> =
                minimum_image(structure.cell(), positions[iat] - positions[jat]);
            for t in &trans {
                let rij = base - t;
                let r2 = rij.norm_squared();
                if r2 > cutoff2 || r2 < 1.0e-12 {
                    continue;
                }
                let r = r2.sqrt();
                let (value, slope) = count(iat, jat, r);

                cn[iat] += value;
                if iat != jat {
                    cn[jat] += value;
                }

                if let Some(jac) = jacobian.as_mut() {
                    let dg = rij * (slope / r);
                    let ds = dg * rij.transpose();
                    if iat != jat {
                        jac.add_dr(iat, iat, &dg);
                        jac.add_dr(jat, jat, &(-dg));
                        jac.add_dr(jat, iat, &(-dg));
                        jac.add_dr(iat, jat, &dg);
                        jac.add_dl(jat, &ds);
                    }
                    jac.add_dl(iat, &ds);
                }
            }
        }
    }

    CoordinationNumbers { cn, jacobian }
}
