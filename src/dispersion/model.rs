//! The D4 dispersion model.
//!
//! A [`D4Model`] is bound to the species of one [`Structure`]. On creation it
//! precomputes the Casimir-Polder C6 coefficients between every pair of
//! reference systems of those species; during a calculation the reference
//! systems are weighted by the current coordination numbers and charges.

use super::config::{ChargeOptions, ModelOptions, RealspaceCutoff};
use super::error::{Error, ensure_finite};
use super::params::{ElementData, NFREQ, frequency_weights, lookup};
use crate::model::structure::Structure;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::f64::consts::PI;

/// Reference weights of every atom, including the charge scaling.
#[derive(Debug, Clone)]
pub struct ReferenceWeights {
    pub gw: Vec<Vec<f64>>,
    pub dgwdcn: Vec<Vec<f64>>,
    pub dgwdq: Vec<Vec<f64>>,
}

/// Pairwise C6 coefficients.
///
/// `dc6dcn[(i, j)]` is the derivative of `c6[(i, j)]` with respect to the
/// coordination number of atom `i` with the weights of atom `j` held fixed.
/// For `i == j` the full derivative is twice that value. `dc6dq` follows the
/// same convention for the partial charges.
#[derive(Debug, Clone)]
pub struct DispersionCoefficients {
    pub c6: DMatrix<f64>,
    pub dc6dcn: DMatrix<f64>,
    pub dc6dq: DMatrix<f64>,
}

/// Dispersion model for the species of one structure.
///
/// # Examples
///
/// ```
/// use dftd4::{D4Model, RealspaceCutoff, Structure};
///
/// let mol = Structure::from_symbols(&["Ne", "Ne"], &[[0.0; 3], [0.0, 0.0, 5.8]], None)?;
/// let model = D4Model::new(&mol)?.with_cutoff(RealspaceCutoff {
///     disp2: 50.0,
///     ..Default::default()
/// });
/// assert_eq!(model.cutoff().disp2, 50.0);
/// # Ok::<(), dftd4::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct D4Model {
    numbers: Vec<u8>,
    species: Vec<&'static ElementData>,
    kinds: Vec<usize>,
    /// Reference C6 matrices, indexed by `ki * nspecies + kj`.
    c6ref: Vec<DMatrix<f64>>,
    options: ModelOptions,
    cutoff: RealspaceCutoff,
    charge_options: ChargeOptions,
}

impl D4Model {
    /// Creates a model with the default interpolation parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a species has no reference data.
    pub fn new(structure: &Structure) -> Result<Self, Error> {
        Self::with_options(structure, ModelOptions::default())
    }

    /// Creates a model with custom interpolation parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a parameter is not finite, `wf` is
    /// not positive, or a species has no reference data.
    pub fn with_options(structure: &Structure, options: ModelOptions) -> Result<Self, Error> {
        if ![options.ga, options.gc, options.wf].iter().all(|x| x.is_finite()) {
            return Err(Error::invalid_input("model parameters must be finite"));
        }
        if options.wf <= 0.0 {
            return Err(Error::invalid_input("weighting factor must be positive"));
        }

        let atoms = lookup(structure.numbers())?;
        let mut species: Vec<&'static ElementData> = Vec::new();
        let kinds = atoms
            .iter()
            .map(|el| {
                match species.iter().position(|s| s.element == el.element) {
                    Some(k) => k,
                    None => {
                        species.push(*el);
                        species.len() - 1
                    }
                }
            })
            .collect();

        let weights = frequency_weights();
        let c6ref = species
            .iter()
            .flat_map(|a| species.iter().map(move |b| (*a, *b)))
            .map(|(a, b)| reference_c6(a, b, &weights))
            .collect();

        tracing::debug!(
            natoms = structure.natoms(),
            nspecies = species.len(),
            "created D4 model"
        );

        Ok(Self {
            numbers: structure.numbers().to_vec(),
            species,
            kinds,
            c6ref,
            options,
            cutoff: RealspaceCutoff::default(),
            charge_options: ChargeOptions::default(),
        })
    }

    pub fn with_cutoff(mut self, cutoff: RealspaceCutoff) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_charge_options(mut self, options: ChargeOptions) -> Self {
        self.charge_options = options;
        self
    }

    #[inline]
    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    #[inline]
    pub fn cutoff(&self) -> &RealspaceCutoff {
        &self.cutoff
    }

    #[inline]
    pub fn charge_options(&self) -> &ChargeOptions {
        &self.charge_options
    }

    /// Fails unless `structure` has the species this model was built for.
    pub fn check_compatible(&self, structure: &Structure) -> Result<(), Error> {
        if structure.numbers() != self.numbers.as_slice() {
            return Err(Error::invalid_input(
                "structure does not match the species of the dispersion model",
            ));
        }
        Ok(())
    }

    #[inline]
    fn element(&self, atom: usize) -> &'static ElementData {
        self.species[self.kinds[atom]]
    }

    #[inline]
    fn c6ref(&self, i: usize, j: usize) -> &DMatrix<f64> {
        &self.c6ref[self.kinds[i] * self.species.len() + self.kinds[j]]
    }

    /// `sqrt(0.5 * <r4>/<r2> * sqrt(Z))` of every atom.
    pub fn r4r2(&self) -> Vec<f64> {
        (0..self.numbers.len()).map(|i| self.element(i).r4r2).collect()
    }

    /// Weights the reference systems of every atom.
    ///
    /// # Arguments
    ///
    /// * `cn` — Dispersion coordination numbers
    /// * `q` — Partial charges
    pub fn weight_references(&self, cn: &[f64], q: &[f64]) -> ReferenceWeights {
        let n = self.numbers.len();
        let mut gw = Vec::with_capacity(n);
        let mut dgwdcn = Vec::with_capacity(n);
        let mut dgwdq = Vec::with_capacity(n);

        for iat in 0..n {
            let el = self.element(iat);
            let wf = self.options.wf;
            let gi = self.options.gc * el.hardness;
            let zi = el.effective_charge;
            let maxcn = el.max_reference_cn();

            let (norm, dnorm) = el.references.iter().fold((0.0, 0.0), |(n, d), r| {
                let diff = cn[iat] - r.cn;
                let expw = (-wf * diff * diff).exp();
                (n + expw, d - 2.0 * wf * diff * expw)
            });
            let inv = 1.0 / norm;
            if !inv.is_finite() {
                tracing::warn!(
                    atom = iat,
                    cn = cn[iat],
                    "reference weights underflow, using the highest reference"
                );
            }

            let mut w = Vec::with_capacity(el.references.len());
            let mut dw = Vec::with_capacity(el.references.len());
            let mut dq = Vec::with_capacity(el.references.len());
            for r in &el.references {
                let diff = cn[iat] - r.cn;
                let expw = (-wf * diff * diff).exp();
                let expd = -2.0 * wf * diff * expw;

                let mut gwk = expw * inv;
                if !gwk.is_finite() {
                    gwk = if (maxcn - r.cn).abs() < 1.0e-12 { 1.0 } else { 0.0 };
                }
                let mut dgwk = (expd - expw * dnorm * inv) * inv;
                if !dgwk.is_finite() {
                    dgwk = 0.0;
                }

                let (zeta, dzeta) = if self.options.charge_scaling {
                    (
                        zeta(self.options.ga, gi, zi + r.charge, zi + q[iat]),
                        dzeta(self.options.ga, gi, zi + r.charge, zi + q[iat]),
                    )
                } else {
                    (1.0, 0.0)
                };

                w.push(gwk * zeta);
                dw.push(dgwk * zeta);
                dq.push(gwk * dzeta);
            }
            gw.push(w);
            dgwdcn.push(dw);
            dgwdq.push(dq);
        }

        ReferenceWeights { gw, dgwdcn, dgwdq }
    }

    /// Interpolates the pairwise C6 coefficients from the reference weights.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NumericalFailure`] if a coefficient is not finite.
    pub fn get_c6(&self, weights: &ReferenceWeights) -> Result<DispersionCoefficients, Error> {
        let n = self.numbers.len();
        let rows: Vec<Vec<(f64, f64, f64)>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let reference = self.c6ref(i, j);
                        let mut c6 = 0.0;
                        let mut dcn = 0.0;
                        let mut dq = 0.0;
                        for (r, row) in reference.row_iter().enumerate() {
                            let inner: f64 =
                                row.iter().zip(&weights.gw[j]).map(|(c, w)| c * w).sum();
                            c6 += weights.gw[i][r] * inner;
                            dcn += weights.dgwdcn[i][r] * inner;
                            dq += weights.dgwdq[i][r] * inner;
                        }
                        (c6, dcn, dq)
                    })
                    .collect()
            })
            .collect();

        let c6 = DMatrix::from_fn(n, n, |i, j| rows[i][j].0);
        let dc6dcn = DMatrix::from_fn(n, n, |i, j| rows[i][j].1);
        let dc6dq = DMatrix::from_fn(n, n, |i, j| rows[i][j].2);
        ensure_finite("C6 coefficient", c6.iter())?;
        Ok(DispersionCoefficients { c6, dc6dcn, dc6dq })
    }

    /// Static dipole polarizabilities of every atom.
    pub fn polarizabilities(&self, weights: &ReferenceWeights) -> Vec<f64> {
        (0..self.numbers.len())
            .map(|i| {
                self.element(i)
                    .references
                    .iter()
                    .zip(&weights.gw[i])
                    .map(|(r, w)| r.alpha * w)
                    .sum()
            })
            .collect()
    }
}

/// Charge scaling of a reference polarizability.
#[inline]
fn zeta(a: f64, c: f64, qref: f64, qmod: f64) -> f64 {
    if qmod <= 0.0 {
        a.exp()
    } else {
        (a * (1.0 - (c * (1.0 - qref / qmod)).exp())).exp()
    }
}

#[inline]
fn dzeta(a: f64, c: f64, qref: f64, qmod: f64) -> f64 {
    if qmod <= 0.0 {
        0.0
    } else {
        -a * c * (c * (1.0 - qref / qmod)).exp() * zeta(a, c, qref, qmod) * qref / (qmod * qmod)
    }
}

/// Casimir-Polder integration `3/π ∫ α_A(iω) α_B(iω) dω` for all reference pairs.
fn reference_c6(a: &ElementData, b: &ElementData, weights: &[f64; NFREQ]) -> DMatrix<f64> {
    DMatrix::from_fn(a.references.len(), b.references.len(), |r, s| {
        let ra = &a.references[r].alpha_iw;
        let rb = &b.references[s].alpha_iw;
        let integral: f64 = (0..NFREQ).map(|k| weights[k] * ra[k] * rb[k]).sum();
        3.0 / PI * integral
    })
}
