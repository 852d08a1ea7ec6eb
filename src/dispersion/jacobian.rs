use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

/// Derivatives of a per-atom quantity with respect to the geometry.
///
/// Column `i` belongs to the quantity of atom `i`. Rows of `dr` are the
/// Cartesian components of every atom (`3k + c`), rows of `dl` the strain
/// components (`3a + b`).
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian {
    pub dr: DMatrix<f64>,
    pub dl: DMatrix<f64>,
}

impl Jacobian {
    pub fn zeros(natoms: usize) -> Self {
        Self {
            dr: DMatrix::zeros(3 * natoms, natoms),
            dl: DMatrix::zeros(9, natoms),
        }
    }

    /// Adds `value` to the position derivative of quantity `i` w.r.t. atom `k`.
    #[inline]
    pub fn add_dr(&mut self, k: usize, i: usize, value: &Vector3<f64>) {
        for c in 0..3 {
            self.dr[(3 * k + c, i)] += value[c];
        }
    }

    /// Adds `value` to the strain derivative of quantity `i`.
    #[inline]
    pub fn add_dl(&mut self, i: usize, value: &Matrix3<f64>) {
        for a in 0..3 {
            for b in 0..3 {
                self.dl[(3 * a + b, i)] += value[(a, b)];
            }
        }
    }

    /// Multiplies column `i` of both blocks by `factors[i]`.
    pub fn scale_columns(&mut self, factors: &[f64]) {
        for (i, &f) in factors.iter().enumerate() {
            self.dr.column_mut(i).scale_mut(f);
            self.dl.column_mut(i).scale_mut(f);
        }
    }

    /// Applies the chain rule for an energy with `dE/dq_i = weights[i]`.
    ///
    /// Returns the gradient contribution per atom and the strain derivative.
    pub fn contract(&self, weights: &[f64]) -> (Vec<Vector3<f64>>, Matrix3<f64>) {
        let w = DVector::from_column_slice(weights);
        let g = &self.dr * &w;
        let s = &self.dl * &w;
        let gradient = g
            .as_slice()
            .chunks_exact(3)
            .map(|c| Vector3::new(c[0], c[1], c[2]))
            .collect();
        (gradient, Matrix3::from_fn(|a, b| s[3 * a + b]))
    }
}
