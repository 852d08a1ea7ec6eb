mod charge;
mod config;
mod contributions;
mod damping;
pub(crate) mod error;
mod jacobian;
mod model;
mod ncoord;
mod params;
mod threebody;
mod twobody;

#[cfg(test)]
mod testing;

pub use config::{ChargeOptions, ModelOptions, RealspaceCutoff};
pub use damping::{RationalDamping, damping_factor, damping_factor_derivative};
pub use error::Error;
pub use model::D4Model;
pub use params::{DampingTable, MethodEntry, load_damping_table};

use crate::model::lattice::translations;
use crate::model::result::{DispersionResult, PairwiseDispersion, Properties};
use crate::model::structure::Structure;
use contributions::Contributions;
use error::ensure_finite;
use model::DispersionCoefficients;
use nalgebra::{DMatrix, Matrix3, Vector3};

/// Per-geometry state shared by the energy, pairwise and property queries.
struct Evaluation {
    cn: ncoord::CoordinationNumbers,
    charges: charge::Charges,
    coeff: DispersionCoefficients,
    /// C6 at zero partial charges, only built for the three-body term.
    coeff3: Option<DispersionCoefficients>,
    r4r2: Vec<f64>,
}

impl Evaluation {
    fn new(
        structure: &Structure,
        model: &D4Model,
        three_body: bool,
        derivatives: bool,
    ) -> Result<Self, Error> {
        model.check_compatible(structure)?;
        let n = structure.natoms();

        let cn = ncoord::dispersion_cn(structure, model.cutoff().cn, derivatives)?;
        let charges = if model.options().charge_scaling {
            charge::get_charges(structure, model.charge_options(), derivatives)?
        } else {
            charge::Charges {
                charges: vec![0.0; n],
                jacobian: None,
            }
        };

        let weights = model.weight_references(&cn.cn, &charges.charges);
        let coeff = model.get_c6(&weights)?;
        let coeff3 = match three_body {
            true => {
                let neutral = model.weight_references(&cn.cn, &vec![0.0; n]);
                Some(model.get_c6(&neutral)?)
            }
            false => None,
        };

        Ok(Self {
            cn,
            charges,
            coeff,
            coeff3,
            r4r2: model.r4r2(),
        })
    }
}

/// Evaluates the dispersion energy and, optionally, its derivatives.
///
/// Coordination numbers, charges and C6 coefficients are recomputed from
/// the current geometry on every call. With `gradient` set the gradient is
/// propagated through the coordination numbers and partial charges, and the
/// strain derivative is returned alongside (zero for molecules).
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `model` was built for different
/// species, or [`Error::NumericalFailure`] if any intermediate is not finite.
pub fn get_dispersion(
    structure: &Structure,
    model: &D4Model,
    param: &RationalDamping,
    gradient: bool,
) -> Result<DispersionResult, Error> {
    let n = structure.natoms();
    let cutoff = model.cutoff();
    let eval = Evaluation::new(structure, model, param.has_three_body(), gradient)?;

    let trans = translations(structure.cell(), cutoff.disp2);
    let mut total = twobody::dispersion_2b(
        structure,
        &trans,
        cutoff.disp2,
        &eval.r4r2,
        param,
        &eval.coeff,
        gradient,
    );

    if let Some(coeff3) = &eval.coeff3 {
        let trans = translations(structure.cell(), cutoff.disp3);
        let three = threebody::dispersion_3b(
            structure,
            &trans,
            cutoff.disp3,
            &eval.r4r2,
            param,
            coeff3,
            gradient,
        );
        total = total.merge(three);
    }

    let energy = total.energy();
    ensure_finite("dispersion energy", [energy].iter())?;
    tracing::debug!(natoms = n, energy, "evaluated dispersion energy");

    if !gradient {
        return Ok(DispersionResult {
            energy,
            gradient: None,
            sigma: None,
        });
    }

    let (gradient, mut sigma) = chain_rule(&eval, total);
    if !structure.is_periodic() {
        sigma = Matrix3::zeros();
    }
    ensure_finite("gradient", gradient.iter().flat_map(|g| g.iter()))?;
    ensure_finite("sigma", sigma.iter())?;

    Ok(DispersionResult {
        energy,
        gradient: Some(gradient.iter().map(|g| [g.x, g.y, g.z]).collect()),
        sigma: Some([
            [sigma[(0, 0)], sigma[(0, 1)], sigma[(0, 2)]],
            [sigma[(1, 0)], sigma[(1, 1)], sigma[(1, 2)]],
            [sigma[(2, 0)], sigma[(2, 1)], sigma[(2, 2)]],
        ]),
    })
}

/// Adds the coordination-number and charge paths to the direct derivatives.
fn chain_rule(eval: &Evaluation, total: Contributions) -> (Vec<Vector3<f64>>, Matrix3<f64>) {
    let mut gradient = total.gradient;
    let mut sigma = total.sigma;
    let paths = [
        (eval.cn.jacobian.as_ref(), &total.dedcn),
        (eval.charges.jacobian.as_ref(), &total.dedq),
    ];
    for (jacobian, weights) in paths {
        if let Some(jac) = jacobian {
            let (g, s) = jac.contract(weights);
            for (lhs, rhs) in gradient.iter_mut().zip(&g) {
                *lhs += rhs;
            }
            sigma += s;
        }
    }
    (gradient, sigma)
}

/// Resolves the dispersion energy into atom-pair contributions.
///
/// # Errors
///
/// Same conditions as [`get_dispersion`].
pub fn get_pairwise_dispersion(
    structure: &Structure,
    model: &D4Model,
    param: &RationalDamping,
) -> Result<PairwiseDispersion, Error> {
    let n = structure.natoms();
    let cutoff = model.cutoff();
    let eval = Evaluation::new(structure, model, param.has_three_body(), false)?;

    let trans = translations(structure.cell(), cutoff.disp2);
    let pair2 = twobody::pairwise_2b(
        structure,
        &trans,
        cutoff.disp2,
        &eval.r4r2,
        param,
        &eval.coeff.c6,
    );
    let pair3 = match &eval.coeff3 {
        Some(coeff3) => {
            let trans = translations(structure.cell(), cutoff.disp3);
            threebody::pairwise_3b(structure, &trans, cutoff.disp3, &eval.r4r2, param, &coeff3.c6)
        }
        None => DMatrix::zeros(n, n),
    };
    ensure_finite("pair energy", pair2.iter().chain(pair3.iter()))?;

    Ok(PairwiseDispersion {
        pair_energy2: rows(&pair2),
        pair_energy3: rows(&pair3),
    })
}

/// Coordination numbers, charges, C6 coefficients and polarizabilities.
///
/// # Errors
///
/// Same conditions as [`get_dispersion`].
pub fn get_properties(structure: &Structure, model: &D4Model) -> Result<Properties, Error> {
    let eval = Evaluation::new(structure, model, false, false)?;
    let weights = model.weight_references(&eval.cn.cn, &eval.charges.charges);
    Ok(Properties {
        polarizabilities: model.polarizabilities(&weights),
        c6_coefficients: rows(&eval.coeff.c6),
        coordination_numbers: eval.cn.cn,
        partial_charges: eval.charges.charges,
    })
}

fn rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use testing::*;

    fn b3lyp_atm() -> RationalDamping {
        RationalDamping::from_method("b3lyp", true).unwrap()
    }

    fn energy(mol: &Structure, model: &D4Model, param: &RationalDamping) -> f64 {
        get_dispersion(mol, model, param, false).unwrap().energy
    }

    fn check_gradient(mol: &Structure, model: &D4Model, param: &RationalDamping, step: f64, tol: f64) {
        let result = get_dispersion(mol, model, param, true).unwrap();
        let gradient = result.gradient.unwrap();
        for k in 0..mol.natoms() {
            for c in 0..3 {
                let plus = energy(&displaced(mol, k, c, step), model, param);
                let minus = energy(&displaced(mol, k, c, -step), model, param);
                let numeric = (plus - minus) / (2.0 * step);
                assert_abs_diff_eq!(gradient[k][c], numeric, epsilon = tol);
            }
        }
    }

    fn check_sigma(mol: &Structure, model: &D4Model, param: &RationalDamping, step: f64, tol: f64) {
        let sigma = get_dispersion(mol, model, param, true).unwrap().sigma.unwrap();
        for a in 0..3 {
            for b in 0..3 {
                let plus = energy(&strained(mol, &unit_strain(a, b, step)), model, param);
                let minus = energy(&strained(mol, &unit_strain(a, b, -step)), model, param);
                let numeric = (plus - minus) / (2.0 * step);
                assert_abs_diff_eq!(sigma[a][b], numeric, epsilon = tol);
            }
        }
    }

    fn small_cutoff() -> RealspaceCutoff {
        RealspaceCutoff {
            cn: 20.0,
            disp2: 30.0,
            disp3: 12.0,
        }
    }

    #[test]
    fn separated_atoms_reduce_to_leading_term() {
        let r = 50.0;
        let mol = Structure::from_symbols(&["H", "H"], &[[0.0; 3], [0.0, 0.0, r]], None).unwrap();
        let model = D4Model::new(&mol).unwrap();
        let param = RationalDamping::from_method("pbe", false).unwrap();

        let c6 = get_properties(&mol, &model).unwrap().c6_coefficients[0][1];
        let e = energy(&mol, &model, &param);
        assert!(e < 0.0);
        assert_relative_eq!(e, -param.s6 * c6 / r.powi(6), max_relative = 0.01);
    }

    #[test]
    fn molecular_gradient_matches_finite_difference() {
        let param = b3lyp_atm();
        for mol in [water(), methanol(), lithium_fluoride(), hydroxide()] {
            let model = D4Model::new(&mol).unwrap();
            check_gradient(&mol, &model, &param, 1e-5, 1e-7);
        }
    }

    #[test]
    fn gradient_includes_charge_path_for_polar_molecules() {
        let mol = lithium_fluoride();
        let model = D4Model::new(&mol).unwrap();
        let props = get_properties(&mol, &model).unwrap();
        assert!(props.partial_charges[0] > 0.1);

        let param = b3lyp_atm();
        let eval = Evaluation::new(&mol, &model, true, true).unwrap();
        let trans = translations(None, model.cutoff().disp2);
        let direct = twobody::dispersion_2b(&mol, &trans, 60.0, &eval.r4r2, &param, &eval.coeff, true);
        let (charge_path, _) = eval.charges.jacobian.as_ref().unwrap().contract(&direct.dedq);
        assert!(charge_path[1].norm() > 1e-7);
    }

    #[test]
    fn gradient_without_charge_scaling_matches_finite_difference() {
        let mol = methanol();
        let options = ModelOptions {
            charge_scaling: false,
            ..Default::default()
        };
        let model = D4Model::with_options(&mol, options).unwrap();
        check_gradient(&mol, &model, &b3lyp_atm(), 1e-5, 1e-7);
    }

    #[test]
    fn molecular_gradient_is_translation_invariant() {
        let mol = methanol();
        let model = D4Model::new(&mol).unwrap();
        let result = get_dispersion(&mol, &model, &b3lyp_atm(), true).unwrap();
        let gradient = result.gradient.unwrap();
        for c in 0..3 {
            let total: f64 = gradient.iter().map(|g| g[c]).sum();
            assert_abs_diff_eq!(total, 0.0, epsilon = 1e-10);
        }
        assert_eq!(result.sigma.unwrap(), [[0.0; 3]; 3]);
    }

    #[test]
    fn periodic_gradient_and_sigma_match_finite_difference() {
        let mol = lithium_hydride_cell();
        let model = D4Model::new(&mol).unwrap().with_cutoff(small_cutoff());
        let param = b3lyp_atm();
        check_gradient(&mol, &model, &param, 1e-6, 1e-6);
        check_sigma(&mol, &model, &param, 1e-6, 1e-6);
    }

    #[test]
    fn periodic_results_ignore_which_image_an_atom_is_given_in() {
        let param = b3lyp_atm();
        for mol in [lithium_hydride_cell(), fluorine_slab()] {
            let model = D4Model::new(&mol).unwrap().with_cutoff(small_cutoff());
            let reference = get_dispersion(&mol, &model, &param, true).unwrap();
            let ref_charges = get_properties(&mol, &model).unwrap().partial_charges;
            for n in [[1, 0, 0], [3, 0, 0], [10, 0, 0], [-4, 7, 0]] {
                let moved = shifted_by_lattice(&mol, 1, n);
                let result = get_dispersion(&moved, &model, &param, true).unwrap();
                assert_relative_eq!(result.energy, reference.energy, max_relative = 1e-10);

                let charges = get_properties(&moved, &model).unwrap().partial_charges;
                for (a, b) in charges.iter().zip(&ref_charges) {
                    assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
                }

                let gradient = result.gradient.unwrap();
                for (a, b) in gradient.iter().zip(reference.gradient.as_ref().unwrap()) {
                    for c in 0..3 {
                        assert_abs_diff_eq!(a[c], b[c], epsilon = 1e-10);
                    }
                }
                let sigma = result.sigma.unwrap();
                let ref_sigma = reference.sigma.unwrap();
                for a in 0..3 {
                    for b in 0..3 {
                        assert_abs_diff_eq!(sigma[a][b], ref_sigma[a][b], epsilon = 1e-10);
                    }
                }
            }
        }
    }

    #[test]
    fn slab_gradient_matches_finite_difference() {
        let mol = fluorine_slab();
        let model = D4Model::new(&mol).unwrap().with_cutoff(small_cutoff());
        check_gradient(&mol, &model, &b3lyp_atm(), 1e-6, 1e-6);
    }

    #[test]
    fn periodic_energy_and_sigma_converge_with_cutoff() {
        let mol = Structure::new(
            &[2],
            &[[0.0; 3]],
            None,
            Some([[14.0, 0.0, 0.0], [0.0, 14.0, 0.0], [0.0, 0.0, 14.0]]),
            Some([true; 3]),
        )
        .unwrap();
        let param = RationalDamping::from_method("pbe", false).unwrap();
        let run = |disp2: f64| {
            let model = D4Model::new(&mol).unwrap().with_cutoff(RealspaceCutoff {
                disp2,
                ..Default::default()
            });
            let result = get_dispersion(&mol, &model, &param, true).unwrap();
            (result.energy, result.sigma.unwrap()[0][0])
        };

        let (e_ref, s_ref) = run(160.0);
        let mut last = (f64::INFINITY, f64::INFINITY);
        for cutoff in [20.0, 30.0, 40.0, 60.0, 80.0] {
            let (e, s) = run(cutoff);
            let residual = ((e - e_ref).abs(), (s - s_ref).abs());
            assert!(residual.0 <= last.0);
            assert!(residual.1 <= last.1);
            last = residual;
        }
        assert!(last.0 < 1e-8);
        assert!(last.1 < 1e-7);
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let mol = methanol();
        let model = D4Model::new(&mol).unwrap();
        let param = b3lyp_atm();
        let first = get_dispersion(&mol, &model, &param, true).unwrap();
        let second = get_dispersion(&mol, &model, &param, true).unwrap();
        assert_relative_eq!(first.energy, second.energy, max_relative = 1e-12);
        for (a, b) in first.gradient.unwrap().iter().zip(&second.gradient.unwrap()) {
            for c in 0..3 {
                assert_abs_diff_eq!(a[c], b[c], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn pairwise_energies_sum_to_total() {
        let param = b3lyp_atm();
        let mol = methanol();
        let model = D4Model::new(&mol).unwrap();
        let pairs = get_pairwise_dispersion(&mol, &model, &param).unwrap();
        let total: f64 = pairs
            .pair_energy2
            .iter()
            .chain(&pairs.pair_energy3)
            .flatten()
            .sum();
        assert_relative_eq!(total, energy(&mol, &model, &param), max_relative = 1e-10);
        assert!(pairs.pair_energy3.iter().flatten().any(|&e| e != 0.0));

        let cell = lithium_hydride_cell();
        let model = D4Model::new(&cell).unwrap().with_cutoff(small_cutoff());
        let pairs = get_pairwise_dispersion(&cell, &model, &param).unwrap();
        let total: f64 = pairs
            .pair_energy2
            .iter()
            .chain(&pairs.pair_energy3)
            .flatten()
            .sum();
        assert_relative_eq!(total, energy(&cell, &model, &param), max_relative = 1e-10);
    }

    #[test]
    fn three_body_flag_controls_the_atm_term() {
        let mol = methanol();
        let model = D4Model::new(&mol).unwrap();
        let with = b3lyp_atm();
        let without = with.with_three_body(false);
        let pairs = get_pairwise_dispersion(&mol, &model, &without).unwrap();
        assert!(pairs.pair_energy3.iter().flatten().all(|&e| e == 0.0));

        let e3: f64 = get_pairwise_dispersion(&mol, &model, &with)
            .unwrap()
            .pair_energy3
            .iter()
            .flatten()
            .sum();
        assert_relative_eq!(
            energy(&mol, &model, &with) - energy(&mol, &model, &without),
            e3,
            max_relative = 1e-10
        );
    }

    #[test]
    fn properties_are_consistent() {
        let mol = hydroxide();
        let model = D4Model::new(&mol).unwrap();
        let props = get_properties(&mol, &model).unwrap();
        assert_abs_diff_eq!(props.partial_charges.iter().sum::<f64>(), -1.0, epsilon = 1e-8);
        assert!(props.polarizabilities.iter().all(|&a| a > 0.0));
        assert!(props.coordination_numbers.iter().all(|&cn| cn > 0.5));
        assert_abs_diff_eq!(
            props.c6_coefficients[0][1],
            props.c6_coefficients[1][0],
            epsilon = 1e-12
        );
    }

    #[test]
    fn updated_geometry_is_not_cached() {
        let mut mol = water();
        let model = D4Model::new(&mol).unwrap();
        let param = b3lyp_atm();
        let before = energy(&mol, &model, &param);

        let stretched = [[0.0, 0.0, -0.7166], [0.0, 1.6, 0.5], [0.0, -1.6, 0.5]];
        mol.update(Some(&stretched), None).unwrap();
        let fresh = Structure::new(&[8, 1, 1], &stretched, None, None, None).unwrap();
        let after = energy(&mol, &model, &param);
        assert!((after - before).abs() > 1e-8);
        assert_relative_eq!(after, energy(&fresh, &model, &param), max_relative = 1e-12);
    }

    #[test]
    fn rejects_model_for_other_species() {
        let model = D4Model::new(&water()).unwrap();
        let err = get_dispersion(&methanol(), &model, &b3lyp_atm(), false).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
