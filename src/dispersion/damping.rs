//! Rational (Becke-Johnson) damping.

use super::error::Error;
use super::params::{DampingTable, get_default_damping_table};

/// Damping parameters of the D4 energy expression.
///
/// `s6`, `s8` and `s9` scale the dipole-dipole, dipole-quadrupole and
/// three-body terms, `a1` and `a2` define the critical radius
/// `R0 = a1 * sqrt(C8 / C6) + a2`, and `alp` is the exponent of the
/// three-body zero damping. The three-body term is only evaluated when
/// [`three_body`](Self::three_body) is set.
///
/// # Examples
///
/// ```
/// use dftd4::RationalDamping;
///
/// let pbe = RationalDamping::from_method("PBE", true)?;
/// assert_eq!(pbe.s9, 1.0);
/// assert!(pbe.three_body);
///
/// let twobody = pbe.with_three_body(false);
/// assert!(!twobody.three_body);
/// # Ok::<(), dftd4::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RationalDamping {
    pub s6: f64,
    pub s8: f64,
    pub s9: f64,
    pub a1: f64,
    pub a2: f64,
    pub alp: f64,
    pub three_body: bool,
}

impl RationalDamping {
    /// Creates damping parameters from explicit values.
    ///
    /// The three-body term is enabled; it vanishes for `s9 = 0`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if any value is not finite.
    pub fn new(s6: f64, s8: f64, s9: f64, a1: f64, a2: f64, alp: f64) -> Result<Self, Error> {
        if ![s6, s8, s9, a1, a2, alp].iter().all(|x| x.is_finite()) {
            return Err(Error::invalid_input("damping parameters must be finite"));
        }
        Ok(Self {
            s6,
            s8,
            s9,
            a1,
            a2,
            alp,
            three_body: true,
        })
    }

    /// Loads the parameters of a method from the built-in registry.
    ///
    /// With `three_body` set, `s9` is one, otherwise zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the method is not registered.
    pub fn from_method(method: &str, three_body: bool) -> Result<Self, Error> {
        Self::from_table(get_default_damping_table(), method, three_body)
    }

    /// Loads the parameters of a method from a custom registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the method is not in `table`.
    pub fn from_table(table: &DampingTable, method: &str, three_body: bool) -> Result<Self, Error> {
        let entry = table
            .find(method)
            .ok_or_else(|| Error::unknown_method(method))?;
        let s9 = if three_body { 1.0 } else { 0.0 };
        let params = Self::new(
            entry.s6.unwrap_or(table.defaults.s6),
            entry.s8,
            s9,
            entry.a1,
            entry.a2,
            entry.alp.unwrap_or(table.defaults.alp),
        )?;
        Ok(params.with_three_body(three_body))
    }

    pub fn with_three_body(mut self, three_body: bool) -> Self {
        self.three_body = three_body;
        self
    }

    /// Whether the three-body term contributes.
    #[inline]
    pub fn has_three_body(&self) -> bool {
        self.three_body && self.s9 != 0.0
    }

    /// Critical radius from the C8/C6 scaling factors of two atoms.
    #[inline]
    pub fn critical_radius(&self, r4r2_i: f64, r4r2_j: f64) -> f64 {
        self.a1 * (3.0 * r4r2_i * r4r2_j).sqrt() + self.a2
    }
}

/// Damping factor `f_n(r) = r^n / (r^n + r0^n)`.
///
/// The energy sums evaluate the damped inverse power `f_n(r) / r^n` in the
/// cancelled form `1 / (r^n + r0^n)`, which stays finite for `r → 0`; this
/// function exposes the damping factor of that same expression.
#[inline]
pub fn damping_factor(n: i32, r: f64, r0: f64) -> f64 {
    let rn = r.powi(n);
    rn / (rn + r0.powi(n))
}

/// Derivative of [`damping_factor`] with respect to `r`.
#[inline]
pub fn damping_factor_derivative(n: i32, r: f64, r0: f64) -> f64 {
    let rn = r.powi(n);
    let r0n = r0.powi(n);
    let denom = rn + r0n;
    f64::from(n) * r.powi(n - 1) * r0n / (denom * denom)
}

/// Damped inverse power `f_n(r) / r^n = 1 / (r^n + r0^n)` and its derivative
/// with respect to `r`, divided by `r`.
///
/// Equal to [`damping_factor`] and [`damping_factor_derivative`] combined by
/// the quotient rule, without dividing by `r^n`.
#[inline]
pub(crate) fn damped_kernel(n: i32, r: f64, r0: f64) -> (f64, f64) {
    let t = 1.0 / (r.powi(n) + r0.powi(n));
    (t, -f64::from(n) * r.powi(n - 2) * t * t)
}
