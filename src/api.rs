//! Handle-style interface mirroring the flat D4 calling convention.
//!
//! Every fallible operation takes an [`ErrorHandle`] first and reports into
//! it instead of returning a `Result`. Once a handle has failed, further
//! operations on it do nothing until [`ErrorHandle::reset`] is called, and
//! outputs of a failed call are never touched. Objects are plain owned
//! values; dropping them releases them.
//!
//! Arrays are flat and row-major: positions are `natoms × 3` and the lattice
//! is `3 × 3` with one lattice vector per row, all in Bohr.
//!
//! # Examples
//!
//! ```
//! use dftd4::api::{self, ErrorHandle};
//!
//! let mut err = ErrorHandle::new();
//! let positions = [0.0, 0.0, -0.7166, 0.0, 1.4375, 0.3583, 0.0, -1.4375, 0.3583];
//! let mol = api::new_structure(&mut err, 3, &[8, 1, 1], &positions, None, None, None);
//! let disp = mol.as_ref().and_then(|mol| api::new_d4_model(&mut err, mol));
//! let param = api::load_rational_damping(&mut err, "pbe0", true);
//!
//! let mut energy = 0.0;
//! let mut gradient = [0.0; 9];
//! if let (Some(mol), Some(disp), Some(param)) = (&mol, &disp, &param) {
//!     api::get_dispersion(&mut err, mol, disp, param, &mut energy, Some(&mut gradient), None);
//! }
//! assert!(!err.check(), "{:?}", err.message());
//! assert!(energy < 0.0);
//! ```

use crate::dispersion::{self, D4Model, Error, ModelOptions, RationalDamping};
use crate::model::structure::Structure;
use crate::model::types::Element;

/// Holds the first failure reported by a sequence of calls.
#[derive(Debug, Default)]
pub struct ErrorHandle {
    error: Option<Error>,
}

impl ErrorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the handle holds a failure.
    #[inline]
    pub fn check(&self) -> bool {
        self.error.is_some()
    }

    /// Human-readable description of the stored failure.
    pub fn message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Clears the stored failure so the handle can be used again.
    pub fn reset(&mut self) {
        self.error = None;
    }

    /// Removes and returns the stored failure.
    pub fn take(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Runs `op` unless the handle has already failed, storing its error.
    fn run<T>(&mut self, op: impl FnOnce() -> Result<T, Error>) -> Option<T> {
        if self.check() {
            return None;
        }
        match op() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "boundary call failed");
                self.error = Some(e);
                None
            }
        }
    }
}

/// Version of the library as `major * 10000 + minor * 100 + patch`.
pub fn get_version() -> u32 {
    let part = |s: &str| s.parse::<u32>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 10000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

fn check_len(what: &str, values: usize, expected: usize) -> Result<(), Error> {
    if values != expected {
        return Err(Error::invalid_input(format!(
            "{what} has {values} entries, expected {expected}"
        )));
    }
    Ok(())
}

fn to_rows(values: &[f64]) -> Vec<[f64; 3]> {
    values
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect()
}

fn to_lattice(values: &[f64]) -> Result<[[f64; 3]; 3], Error> {
    check_len("lattice", values.len(), 9)?;
    let rows = to_rows(values);
    Ok([rows[0], rows[1], rows[2]])
}

/// Creates a structure from flat arrays.
///
/// Fails if `natoms` is not positive, an array has the wrong length, an
/// atomic number is unsupported, or only one of `lattice` and `periodic`
/// is given.
pub fn new_structure(
    err: &mut ErrorHandle,
    natoms: i32,
    numbers: &[i32],
    positions: &[f64],
    charge: Option<f64>,
    lattice: Option<&[f64]>,
    periodic: Option<&[bool]>,
) -> Option<Structure> {
    err.run(|| {
        let n = usize::try_from(natoms)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| Error::invalid_input("number of atoms must be positive"))?;
        check_len("atomic numbers", numbers.len(), n)?;
        check_len("positions", positions.len(), 3 * n)?;

        let numbers = numbers
            .iter()
            .map(|&z| {
                Element::from_atomic_number(i64::from(z))
                    .map(|el| el.atomic_number())
                    .ok_or_else(|| Error::invalid_input(format!("unsupported atomic number {z}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let lattice = lattice.map(to_lattice).transpose()?;
        let periodic = match periodic {
            Some(flags) => {
                check_len("periodicity", flags.len(), 3)?;
                Some([flags[0], flags[1], flags[2]])
            }
            None => None,
        };

        Structure::new(&numbers, &to_rows(positions), charge, lattice, periodic)
    })
}

/// Replaces the positions and/or lattice of a structure in place.
pub fn update_structure(
    err: &mut ErrorHandle,
    mol: &mut Structure,
    positions: Option<&[f64]>,
    lattice: Option<&[f64]>,
) {
    err.run(|| {
        if let Some(positions) = positions {
            check_len("positions", positions.len(), 3 * mol.natoms())?;
        }
        let positions = positions.map(to_rows);
        let lattice = lattice.map(to_lattice).transpose()?;
        mol.update(positions.as_deref(), lattice)
    });
}

/// Creates a dispersion model with the default parameters.
pub fn new_d4_model(err: &mut ErrorHandle, mol: &Structure) -> Option<D4Model> {
    err.run(|| D4Model::new(mol))
}

/// Creates a dispersion model with custom charge scaling and weighting.
pub fn custom_d4_model(
    err: &mut ErrorHandle,
    mol: &Structure,
    ga: f64,
    gc: f64,
    wf: f64,
) -> Option<D4Model> {
    err.run(|| {
        let options = ModelOptions {
            ga,
            gc,
            wf,
            ..Default::default()
        };
        D4Model::with_options(mol, options)
    })
}

pub fn new_rational_damping(
    err: &mut ErrorHandle,
    s6: f64,
    s8: f64,
    s9: f64,
    a1: f64,
    a2: f64,
    alp: f64,
) -> Option<RationalDamping> {
    err.run(|| RationalDamping::new(s6, s8, s9, a1, a2, alp))
}

/// Loads the damping parameters of a method from the built-in registry.
pub fn load_rational_damping(
    err: &mut ErrorHandle,
    method: &str,
    three_body: bool,
) -> Option<RationalDamping> {
    err.run(|| RationalDamping::from_method(method, three_body))
}

/// Evaluates the dispersion energy into caller-owned buffers.
///
/// Passing a `gradient` (`natoms × 3`) or `sigma` (`3 × 3`) buffer requests
/// the derivatives. On failure none of the outputs are written.
pub fn get_dispersion(
    err: &mut ErrorHandle,
    mol: &Structure,
    disp: &D4Model,
    param: &RationalDamping,
    energy: &mut f64,
    gradient: Option<&mut [f64]>,
    sigma: Option<&mut [f64]>,
) {
    let result = err.run(|| {
        if let Some(g) = gradient.as_deref() {
            check_len("gradient", g.len(), 3 * mol.natoms())?;
        }
        if let Some(s) = sigma.as_deref() {
            check_len("sigma", s.len(), 9)?;
        }
        let derivatives = gradient.is_some() || sigma.is_some();
        dispersion::get_dispersion(mol, disp, param, derivatives)
    });
    let Some(result) = result else {
        return;
    };

    *energy = result.energy;
    if let (Some(out), Some(values)) = (gradient, &result.gradient) {
        for (dst, src) in out.iter_mut().zip(values.iter().flatten()) {
            *dst = *src;
        }
    }
    if let (Some(out), Some(values)) = (sigma, &result.sigma) {
        for (dst, src) in out.iter_mut().zip(values.iter().flatten()) {
            *dst = *src;
        }
    }
}
