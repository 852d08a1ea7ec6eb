//! Error types for D4 dispersion calculations.
//!
//! This module defines the error type used throughout the crate.
//! Errors are categorized by source: malformed input, damping-table
//! lookups, numerical breakdown, and custom parameter parsing.

use thiserror::Error;

/// Errors that can occur while setting up or evaluating a D4 calculation.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed structure, parameters, or an incompatible model.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested damping method is not in the parameter registry.
    #[error("unknown damping method '{0}'")]
    UnknownMethod(String),

    /// A numerical step failed.
    ///
    /// Occurs when the charge-equilibration matrix is singular or when
    /// an intermediate quantity (coordination number, charge, C6,
    /// energy, gradient) is not finite.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    /// Failed to parse a custom damping parameter table.
    #[error("failed to parse damping parameter table: {0}")]
    ParameterParse(#[from] toml::de::Error),
}

impl Error {
    /// Creates an [`InvalidInput`](Error::InvalidInput) error.
    pub fn invalid_input(details: impl Into<String>) -> Self {
        Self::InvalidInput(details.into())
    }

    /// Creates a [`NumericalFailure`](Error::NumericalFailure) error.
    pub fn numerical(details: impl Into<String>) -> Self {
        Self::NumericalFailure(details.into())
    }

    /// Creates an [`UnknownMethod`](Error::UnknownMethod) error.
    pub fn unknown_method(method: &str) -> Self {
        Self::UnknownMethod(method.to_string())
    }
}

/// Fails with [`Error::NumericalFailure`] unless every value is finite.
///
/// # Arguments
///
/// * `what` — Name of the quantity, used in the error message
/// * `values` — Values to check
pub(crate) fn ensure_finite<'a>(
    what: &str,
    values: impl IntoIterator<Item = &'a f64>,
) -> Result<(), Error> {
    match values.into_iter().position(|v| !v.is_finite()) {
        Some(idx) => Err(Error::numerical(format!(
            "non-finite {what} encountered at index {idx}"
        ))),
        None => Ok(()),
    }
}
