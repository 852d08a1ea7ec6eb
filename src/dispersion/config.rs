//! Calculation settings for the dispersion model.
//!
//! All lengths are in Bohr. The defaults reproduce the standard D4 setup.

/// Real-space cutoffs for the lattice sums.
///
/// # Examples
///
/// ```
/// use dftd4::RealspaceCutoff;
///
/// let cutoff = RealspaceCutoff::default();
/// assert_eq!(cutoff.disp2, 60.0);
///
/// let tight = RealspaceCutoff {
///     disp3: 25.0,
///     ..Default::default()
/// };
/// assert_eq!(tight.cn, 30.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealspaceCutoff {
    /// Cutoff for the coordination number used in the reference weighting.
    pub cn: f64,
    /// Cutoff for the two-body dispersion sum.
    pub disp2: f64,
    /// Cutoff for the three-body dispersion sum.
    pub disp3: f64,
}

impl Default for RealspaceCutoff {
    fn default() -> Self {
        Self {
            cn: 30.0,
            disp2: 60.0,
            disp3: 40.0,
        }
    }
}

/// Parameters of the reference interpolation in [`D4Model`](crate::D4Model).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOptions {
    /// Height of the charge scaling function.
    pub ga: f64,
    /// Steepness of the charge scaling function, multiplied by the
    /// chemical hardness of the element.
    pub gc: f64,
    /// Exponent of the Gaussian coordination-number weighting.
    pub wf: f64,
    /// Whether C6 coefficients depend on the partial charges.
    ///
    /// When disabled no charge equilibration is performed and every
    /// charge scaling factor is one.
    pub charge_scaling: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            ga: 3.0,
            gc: 2.0,
            wf: 6.0,
            charge_scaling: true,
        }
    }
}

/// Settings for the electronegativity-equilibration charge model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeOptions {
    /// Cutoff for the coordination number entering the electronegativities.
    pub cn_cutoff: f64,
    /// Soft upper bound applied to that coordination number.
    pub cn_max: f64,
    /// Target truncation error of the Ewald sums for periodic systems.
    pub ewald_tolerance: f64,
}

impl Default for ChargeOptions {
    fn default() -> Self {
        Self {
            cn_cutoff: 25.0,
            cn_max: 8.0,
            ewald_tolerance: 1.0e-12,
        }
    }
}
