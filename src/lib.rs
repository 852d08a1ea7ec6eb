//! A pure Rust implementation of the D4 London dispersion correction.
//! It combines geometry-dependent coordination numbers, equilibrated partial charges,
//! and charge-scaled reference polarizabilities into rational-damped dispersion
//! energies with fully analytic gradients for molecules and periodic solids.
//!
//! The embedded reference polarizabilities use a single-pole model of
//! `α(iω)` for each element (H to Ar) instead of the published D4 reference
//! tables, so energies will not numerically match values computed with those
//! tables.
//!
//! # Features
//!
//! - **Coordination numbers** — Error-function counting with an
//!   electronegativity factor and exact derivatives
//! - **Partial charges** — Electronegativity equilibration, with Ewald
//!   summation for periodic systems
//! - **Dynamic C6 coefficients** — Gaussian-weighted reference systems with
//!   charge scaling and Casimir-Polder integration
//! - **Energies and derivatives** — Rational-damped two-body and
//!   Axilrod-Teller-Muto three-body terms, atomic gradients and the strain
//!   derivative (sigma), propagated through coordination numbers and charges
//! - **Parameter registry** — Damping parameters for common density
//!   functionals, or custom tables in TOML
//!
//! # Quick Start
//!
//! The main entry point is the [`get_dispersion`] function, which takes a
//! [`Structure`], a [`D4Model`] bound to its species and a set of
//! [`RationalDamping`] parameters:
//!
//! ```
//! use dftd4::{D4Model, RationalDamping, Structure};
//! use dftd4::{Error, get_dispersion};
//!
//! // Methanol, coordinates in Bohr
//! let mol = Structure::from_symbols(
//!     &["C", "O", "H", "H", "H", "H"],
//!     &[
//!         [-1.3425, 0.0000, 0.0000],
//!         [ 1.3425, 0.0000, 0.0000],
//!         [-2.0640, 1.9220, 0.0000],
//!         [-2.0640, -0.9610, 1.6645],
//!         [-2.0640, -0.9610, -1.6645],
//!         [ 2.0775, -1.7087, 0.0000],
//!     ],
//!     None,
//! )?;
//!
//! let model = D4Model::new(&mol)?;
//! let param = RationalDamping::from_method("b3lyp", true)?;
//!
//! let result = get_dispersion(&mol, &model, &param, true)?;
//! assert!(result.energy < 0.0);
//!
//! // One gradient vector per atom; sigma vanishes without periodicity
//! let gradient = result.gradient.expect("gradient was requested");
//! assert_eq!(gradient.len(), 6);
//! assert_eq!(result.sigma, Some([[0.0; 3]; 3]));
//! # Ok::<(), Error>(())
//! ```
//!
//! # Module Organization
//!
//! - [`get_dispersion`] — Energy, gradient and strain derivative
//! - [`get_pairwise_dispersion`] — Energy resolved into atom pairs
//! - [`get_properties`] — Coordination numbers, charges, C6 coefficients
//!   and polarizabilities
//! - [`api`] — Handle-style interface with error accumulation
//!
//! # Data Types
//!
//! ## Input Structures
//!
//! - [`Structure`] — Atomic numbers, positions, total charge and optional lattice
//! - [`Cell`] — Lattice vectors with per-direction periodicity
//! - [`Element`] — Chemical element (H through Ar)
//!
//! ## Models and Parameters
//!
//! - [`D4Model`] — Reference data and precomputed reference C6 for one set of species
//! - [`RationalDamping`] — Damping parameters and the three-body switch
//! - [`DampingTable`] — Registry of damping parameters by method name
//!
//! ## Configuration
//!
//! - [`ModelOptions`] — Charge scaling and reference weighting
//! - [`RealspaceCutoff`] — Cutoffs of the lattice sums
//! - [`ChargeOptions`] — Settings of the charge model
//!
//! ## Output Structures
//!
//! - [`DispersionResult`] — Energy with optional gradient and sigma
//! - [`PairwiseDispersion`] — Two- and three-body pair energies
//! - [`Properties`] — Intermediate model quantities

mod dispersion;
mod model;

pub mod api;

pub use model::structure::{Cell, Structure};
pub use model::types::{Element, ParseElementError};

pub use model::result::{DispersionResult, PairwiseDispersion, Properties};

pub use dispersion::{
    ChargeOptions, D4Model, DampingTable, MethodEntry, ModelOptions, RationalDamping,
    RealspaceCutoff, damping_factor, damping_factor_derivative, get_dispersion,
    get_pairwise_dispersion, get_properties, load_damping_table,
};

pub use dispersion::Error;

pub use api::get_version;
