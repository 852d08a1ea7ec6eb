//! Plain data flowing into and out of a dispersion calculation.
//!
//! - [`types`] – Chemical elements with D4 reference data.
//! - [`structure`] – Atomic structures with optional periodic lattice.
//! - [`lattice`] – Minimum-image folding and lattice translations within a
//!   real-space cutoff.
//! - [`result`] – Energies, derivatives and model properties.
//!
//! Geometry and results are kept apart from the dispersion engine so that a
//! [`Structure`] can be updated between calls without touching any model.
//!
//! [`Structure`]: structure::Structure

pub mod lattice;
pub mod result;
pub mod structure;
pub mod types;
