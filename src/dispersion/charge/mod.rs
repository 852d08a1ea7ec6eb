//! Partial charges from electronegativity equilibration.
//!
//! Molecular structures use the bare Gaussian Coulomb kernel; any structure
//! with at least one periodic direction is treated with an Ewald sum over
//! the full lattice.

mod eeq;
mod ewald;

use super::config::ChargeOptions;
use super::error::{Error, ensure_finite};
use super::jacobian::Jacobian;
use super::ncoord::eeq_cn;
use super::params::{EeqParams, lookup};
use crate::model::structure::Structure;
use eeq::Interaction;
use ewald::Ewald;
use nalgebra::DVector;

/// Partial charges with optional geometric derivatives.
#[derive(Debug, Clone)]
pub struct Charges {
    pub charges: Vec<f64>,
    pub jacobian: Option<Jacobian>,
}

/// Computes equilibrated partial charges.
///
/// The charges always sum to the total charge of `structure`.
///
/// # Arguments
///
/// * `structure` — Geometry and total charge
/// * `options` — Coordination number and Ewald settings
/// * `derivatives` — Whether to build the [`Jacobian`] of the charges
///
/// # Errors
///
/// Returns [`Error::NumericalFailure`] if the equilibration matrix is
/// singular or an intermediate is not finite.
pub fn get_charges(
    structure: &Structure,
    options: &ChargeOptions,
    derivatives: bool,
) -> Result<Charges, Error> {
    let n = structure.natoms();
    let params: Vec<&EeqParams> = lookup(structure.numbers())?
        .into_iter()
        .map(|el| &el.eeq)
        .collect();

    let cn = eeq_cn(structure, options.cn_cutoff, options.cn_max, derivatives)?;
    let (x, dxdcn) = eeq::electronegativities(&params, &cn.cn);

    let interaction = match structure.cell().filter(|c| c.is_periodic()) {
        Some(cell) => {
            let gamma_min = params
                .iter()
                .flat_map(|a| params.iter().map(move |b| eeq::gamma(a, b)))
                .fold(f64::INFINITY, f64::min);
            let ewald = Ewald::new(cell, gamma_min, options.ewald_tolerance);
            tracing::trace!(alpha = ewald.alpha(), "ewald split parameter");
            Interaction::Periodic(ewald)
        }
        None => Interaction::Molecular,
    };

    let matrix = eeq::coulomb_matrix(structure, &params, &interaction);
    let mut rhs = DVector::zeros(n + 1);
    rhs.rows_mut(0, n).copy_from_slice(&x);
    rhs[n] = structure.charge();

    let (solution, inverse) = eeq::solve(matrix, &rhs, derivatives)?;
    let charges: Vec<f64> = solution.rows(0, n).iter().copied().collect();
    ensure_finite("partial charge", charges.iter())?;
    tracing::debug!(
        natoms = n,
        total = charges.iter().sum::<f64>(),
        "equilibrated partial charges"
    );

    let jacobian = match (inverse, cn.jacobian) {
        (Some(inverse), Some(mut dx)) => {
            dx.scale_columns(&dxdcn);
            let dadq = eeq::coulomb_derivative(structure, &params, &interaction, &charges);
            let block = inverse.view((0, 0), (n, n));
            let jac = Jacobian {
                dr: (dx.dr - dadq.dr) * block,
                dl: (dx.dl - dadq.dl) * block,
            };
            ensure_finite("charge derivative", jac.dr.iter())?;
            Some(jac)
        }
        _ => None,
    };

    Ok(Charges { charges, jacobian })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispersion::testing::*;
    use approx::assert_abs_diff_eq;

    fn charges(mol: &Structure, derivatives: bool) -> Charges {
        get_charges(mol, &ChargeOptions::default(), derivatives).unwrap()
    }

    #[test]
    fn charges_sum_to_total_charge() {
        for mol in [water(), methanol(), hydroxide(), lithium_hydride_cell(), fluorine_slab()] {
            let q = charges(&mol, false).charges;
            assert_abs_diff_eq!(q.iter().sum::<f64>(), mol.charge(), epsilon = 1e-8);
        }
    }

    #[test]
    fn single_atom_carries_the_total_charge() {
        let ion = Structure::new(&[11], &[[0.0; 3]], Some(1.0), None, None).unwrap();
        assert_abs_diff_eq!(charges(&ion, false).charges[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn polar_bonds_are_polarized() {
        let q = charges(&lithium_fluoride(), false).charges;
        assert!(q[0] > 0.1);
        assert!(q[1] < -0.1);

        let q = charges(&water(), false).charges;
        assert!(q[0] < 0.0);
        assert_abs_diff_eq!(q[1], q[2], epsilon = 1e-10);
    }

    #[test]
    fn large_cell_approaches_molecular_limit() {
        let mol = lithium_fluoride();
        let positions: Vec<[f64; 3]> = mol.positions().iter().map(|p| [p.x, p.y, p.z]).collect();
        let boxed = Structure::new(
            mol.numbers(),
            &positions,
            None,
            Some([[60.0, 0.0, 0.0], [0.0, 60.0, 0.0], [0.0, 0.0, 60.0]]),
            Some([true; 3]),
        )
        .unwrap();
        let molecular = charges(&mol, false).charges;
        let periodic = charges(&boxed, false).charges;
        assert_abs_diff_eq!(molecular[0], periodic[0], epsilon = 1e-3);
    }

    #[test]
    fn periodic_charges_ignore_which_image_an_atom_is_given_in() {
        for mol in [lithium_hydride_cell(), fluorine_slab()] {
            let reference = charges(&mol, true);
            for n in [[1, 0, 0], [3, -1, 0], [10, 0, 0], [-6, 5, 0]] {
                let moved = charges(&shifted_by_lattice(&mol, 1, n), true);
                for i in 0..mol.natoms() {
                    assert_abs_diff_eq!(moved.charges[i], reference.charges[i], epsilon = 1e-9);
                }
                let diff = moved.jacobian.unwrap().dr - reference.jacobian.as_ref().unwrap().dr.clone();
                assert!(diff.amax() < 1e-8);
            }
        }
    }

    fn check_position_derivative(mol: &Structure) {
        let step = 1.0e-5;
        let jac = charges(mol, true).jacobian.unwrap();
        for k in 0..mol.natoms() {
            for c in 0..3 {
                let plus = charges(&displaced(mol, k, c, step), false).charges;
                let minus = charges(&displaced(mol, k, c, -step), false).charges;
                for i in 0..mol.natoms() {
                    let numeric = (plus[i] - minus[i]) / (2.0 * step);
                    assert_abs_diff_eq!(jac.dr[(3 * k + c, i)], numeric, epsilon = 1e-7);
                }
            }
        }
    }

    #[test]
    fn position_derivative_matches_finite_difference() {
        check_position_derivative(&lithium_fluoride());
        check_position_derivative(&methanol());
        check_position_derivative(&hydroxide());
    }

    #[test]
    fn periodic_position_derivative_matches_finite_difference() {
        check_position_derivative(&lithium_hydride_cell());
        check_position_derivative(&fluorine_slab());
    }

    #[test]
    fn strain_derivative_matches_finite_difference() {
        let mol = lithium_hydride_cell();
        let step = 1.0e-5;
        let jac = charges(&mol, true).jacobian.unwrap();
        for a in 0..3 {
            for b in 0..3 {
                let plus = charges(&strained(&mol, &unit_strain(a, b, step)), false).charges;
                let minus = charges(&strained(&mol, &unit_strain(a, b, -step)), false).charges;
                for i in 0..mol.natoms() {
                    let numeric = (plus[i] - minus[i]) / (2.0 * step);
                    assert_abs_diff_eq!(jac.dl[(3 * a + b, i)], numeric, epsilon = 1e-6);
                }
            }
        }
    }
}
