//! Ewald summation of the Gaussian-smeared Coulomb kernel.
//!
//! The interaction `erf(γ r) / r` is split into the short-ranged
//! `[erf(γ r) - erf(α r)] / r`, summed over real-space images, and the
//! smooth `erf(α r) / r`, summed in reciprocal space together with the
//! neutralizing background. The split parameter `α` never exceeds the
//! smallest `γ` of the system.

use crate::model::lattice::{minimum_image, translations};
use crate::model::structure::Cell;
use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

#[derive(Debug, Clone)]
pub struct Ewald {
    /// The cell with every direction periodic.
    cell: Cell,
    alpha: f64,
    volume: f64,
    /// Real-space images, zero vector first.
    real: Vec<Vector3<f64>>,
    /// Reciprocal vectors `G ≠ 0` with their prefactor `4π/V exp(-G²/4α²)/G²`.
    recip: Vec<(Vector3<f64>, f64)>,
}

impl Ewald {
    /// Sets up the sums for `cell`, converged to roughly `tolerance`.
    ///
    /// The kernel is treated as periodic in all three directions.
    pub fn new(cell: &Cell, gamma_min: f64, tolerance: f64) -> Self {
        let volume = cell.volume().abs();
        let alpha = (PI.sqrt() / volume.cbrt()).min(gamma_min);
        Self::with_alpha(cell, alpha, tolerance)
    }

    pub fn with_alpha(cell: &Cell, alpha: f64, tolerance: f64) -> Self {
        let volume = cell.volume().abs();
        let width = (-tolerance.ln()).sqrt();
        let full = Cell {
            lattice: cell.lattice,
            periodic: [true; 3],
        };
        let real = translations(Some(&full), width / alpha);

        let gcut = 2.0 * alpha * width;
        let recip = reciprocal_vectors(cell, gcut)
            .into_iter()
            .map(|g| {
                let g2 = g.norm_squared();
                let pref = 4.0 * PI / volume * (-g2 / (4.0 * alpha * alpha)).exp() / g2;
                (g, pref)
            })
            .collect();

        Self {
            cell: full,
            alpha,
            volume,
            real,
            recip,
        }
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Interaction between two distinct charge sites separated by `r`.
    pub fn pair(&self, gamma: f64, r: &Vector3<f64>) -> f64 {
        let r = &minimum_image(Some(&self.cell), *r);
        let real: f64 = self
            .real
            .iter()
            .map(|t| {
                let d = (r - t).norm();
                if d < 1.0e-12 { self.real_limit(gamma) } else { real_kernel(gamma, self.alpha, d) }
            })
            .sum();
        real + self.reciprocal(r) + self.background()
    }

    /// Derivative of [`Ewald::pair`] with respect to `r` and to strain.
    pub fn pair_derivative(&self, gamma: f64, r: &Vector3<f64>) -> (Vector3<f64>, Matrix3<f64>) {
        let r = &minimum_image(Some(&self.cell), *r);
        let mut dg = Vector3::zeros();
        let mut ds = Matrix3::zeros();
        for t in &self.real {
            let v = r - t;
            let d = v.norm();
            if d < 1.0e-12 {
                continue;
            }
            let g = real_kernel_derivative(gamma, self.alpha, d) / d;
            dg += v * g;
            ds += v * v.transpose() * g;
        }
        let (rg, rs) = self.reciprocal_derivative(r);
        (dg + rg, ds + rs + self.background_strain())
    }

    /// Interaction of a charge site with its own images, including the
    /// smeared self-interaction `2γ/√π`.
    pub fn self_interaction(&self, gamma: f64) -> f64 {
        let images: f64 = self
            .real
            .iter()
            .skip(1)
            .map(|t| real_kernel(gamma, self.alpha, t.norm()))
            .sum();
        self.real_limit(gamma) + images + self.reciprocal(&Vector3::zeros()) + self.background()
    }

    /// Strain derivative of [`Ewald::self_interaction`].
    pub fn self_interaction_strain(&self, gamma: f64) -> Matrix3<f64> {
        let mut ds = Matrix3::zeros();
        for t in self.real.iter().skip(1) {
            let d = t.norm();
            ds += t * t.transpose() * (real_kernel_derivative(gamma, self.alpha, d) / d);
        }
        ds + self.reciprocal_derivative(&Vector3::zeros()).1 + self.background_strain()
    }

    #[inline]
    fn real_limit(&self, gamma: f64) -> f64 {
        2.0 * (gamma - self.alpha) / PI.sqrt()
    }

    fn reciprocal(&self, r: &Vector3<f64>) -> f64 {
        self.recip
            .iter()
            .map(|(g, pref)| pref * g.dot(r).cos())
            .sum()
    }

    fn reciprocal_derivative(&self, r: &Vector3<f64>) -> (Vector3<f64>, Matrix3<f64>) {
        let a2 = 1.0 / (4.0 * self.alpha * self.alpha);
        let mut dg = Vector3::zeros();
        let mut ds = Matrix3::zeros();
        for (g, pref) in &self.recip {
            let gr = g.dot(r);
            let g2 = g.norm_squared();
            dg -= g * (pref * gr.sin());
            let c = pref * gr.cos();
            ds += g * g.transpose() * (2.0 * c * (a2 + 1.0 / g2)) - Matrix3::identity() * c;
        }
        (dg, ds)
    }

    #[inline]
    fn background(&self) -> f64 {
        -PI / (self.volume * self.alpha * self.alpha)
    }

    #[inline]
    fn background_strain(&self) -> Matrix3<f64> {
        Matrix3::identity() * (PI / (self.volume * self.alpha * self.alpha))
    }
}

#[inline]
fn real_kernel(gamma: f64, alpha: f64, d: f64) -> f64 {
    (libm::erf(gamma * d) - libm::erf(alpha * d)) / d
}

#[inline]
fn real_kernel_derivative(gamma: f64, alpha: f64, d: f64) -> f64 {
    let gauss = 2.0 / PI.sqrt()
        * (gamma * (-gamma * gamma * d * d).exp() - alpha * (-alpha * alpha * d * d).exp());
    (gauss - real_kernel(gamma, alpha, d)) / d
}

/// Reciprocal lattice vectors `G = 2π Σ m_j b_j` with `0 < |G| ≤ gcut`.
fn reciprocal_vectors(cell: &Cell, gcut: f64) -> Vec<Vector3<f64>> {
    let Some(inverse) = cell.lattice.try_inverse() else {
        return Vec::new();
    };
    let b = [
        inverse.column(0) * (2.0 * PI),
        inverse.column(1) * (2.0 * PI),
        inverse.column(2) * (2.0 * PI),
    ];
    let reps: Vec<i64> = (0..3)
        .map(|j| (gcut * cell.vector(j).norm() / (2.0 * PI)).ceil() as i64)
        .collect();

    let gcut2 = gcut * gcut;
    let mut out = Vec::new();
    for m0 in -reps[0]..=reps[0] {
        for m1 in -reps[1]..=reps[1] {
            for m2 in -reps[2]..=reps[2] {
                if m0 == 0 && m1 == 0 && m2 == 0 {
                    continue;
                }
                let g: Vector3<f64> = b[0] * m0 as f64 + b[1] * m1 as f64 + b[2] * m2 as f64;
                if g.norm_squared() <= gcut2 {
                    out.push(g);
                }
            }
        }
    }
    out
}
