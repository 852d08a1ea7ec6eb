/// Dispersion energy with optional derivatives, in atomic units.
///
/// `gradient` and `sigma` are present exactly when derivatives were
/// requested. For structures without periodic directions `sigma` is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DispersionResult {
    /// Dispersion energy in Hartree.
    pub energy: f64,
    /// Derivative of the energy with respect to every atom position (Hartree/Bohr).
    pub gradient: Option<Vec<[f64; 3]>>,
    /// Derivative of the energy with respect to strain (Hartree).
    pub sigma: Option<[[f64; 3]; 3]>,
}

/// Dispersion energy resolved into atom pairs.
///
/// Each matrix is `natoms × natoms`; the sum over all entries of both
/// matrices is the dispersion energy.
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseDispersion {
    /// Two-body contributions.
    pub pair_energy2: Vec<Vec<f64>>,
    /// Three-body contributions, zero when the three-body term is disabled.
    pub pair_energy3: Vec<Vec<f64>>,
}

/// Intermediate quantities of the dispersion model for one geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    pub coordination_numbers: Vec<f64>,
    /// Partial charges; all zero when charge scaling is disabled.
    pub partial_charges: Vec<f64>,
    /// Pairwise C6 coefficients, `natoms × natoms`.
    pub c6_coefficients: Vec<Vec<f64>>,
    /// Static dipole polarizabilities.
    pub polarizabilities: Vec<f64>,
}
