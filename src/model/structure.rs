use super::types::Element;
use crate::dispersion::error::Error;
use nalgebra::{Matrix3, Vector3};

/// Periodic cell of a [`Structure`].
///
/// Lattice vectors are stored as the rows of `lattice`, in Bohr.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub lattice: Matrix3<f64>,
    pub periodic: [bool; 3],
}

impl Cell {
    /// Returns lattice vector `i` as a column vector.
    #[inline]
    pub fn vector(&self, i: usize) -> Vector3<f64> {
        self.lattice.row(i).transpose()
    }

    /// Signed cell volume in Bohr³.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.lattice.determinant()
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.periodic.iter().any(|&p| p)
    }
}

/// Atomic structure in atomic units.
///
/// Species and the atom count are fixed at construction; positions and the
/// lattice can be replaced through [`Structure::update`]. Everything derived
/// from the geometry is recomputed on each calculation.
///
/// # Examples
///
/// ```
/// use dftd4::Structure;
///
/// // Hydrogen fluoride, 1.733 Bohr bond length
/// let hf = Structure::new(&[1, 9], &[[0.0, 0.0, 0.0], [0.0, 0.0, 1.733]], None, None, None)?;
/// assert_eq!(hf.natoms(), 2);
/// assert!(!hf.is_periodic());
/// # Ok::<(), dftd4::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    numbers: Vec<u8>,
    positions: Vec<Vector3<f64>>,
    charge: f64,
    cell: Option<Cell>,
}

impl Structure {
    /// Creates a new structure.
    ///
    /// # Arguments
    ///
    /// * `numbers` — Atomic numbers, one per atom
    /// * `positions` — Cartesian coordinates in Bohr, one per atom
    /// * `charge` — Total charge, zero when `None`
    /// * `lattice` — Lattice vectors as rows, in Bohr
    /// * `periodic` — Periodicity per lattice direction
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the structure is empty, the arrays
    /// disagree in length, an atomic number is unsupported, a value is not
    /// finite, only one of `lattice` and `periodic` is given, or a periodic
    /// lattice is singular.
    pub fn new(
        numbers: &[u8],
        positions: &[[f64; 3]],
        charge: Option<f64>,
        lattice: Option<[[f64; 3]; 3]>,
        periodic: Option<[bool; 3]>,
    ) -> Result<Self, Error> {
        if numbers.is_empty() {
            return Err(Error::invalid_input("structure must contain at least one atom"));
        }
        if numbers.len() != positions.len() {
            return Err(Error::invalid_input(format!(
                "got {} atomic numbers but {} positions",
                numbers.len(),
                positions.len()
            )));
        }
        for (idx, &z) in numbers.iter().enumerate() {
            if Element::from_atomic_number(i64::from(z)).is_none() {
                return Err(Error::invalid_input(format!(
                    "unsupported atomic number {z} for atom {}",
                    idx + 1
                )));
            }
        }
        let charge = charge.unwrap_or(0.0);
        if !charge.is_finite() {
            return Err(Error::invalid_input("total charge must be finite"));
        }
        let cell = match (lattice, periodic) {
            (Some(lattice), Some(periodic)) => Some(make_cell(lattice, periodic)?),
            (None, None) => None,
            (Some(_), None) => {
                return Err(Error::invalid_input(
                    "lattice given without periodicity flags",
                ));
            }
            (None, Some(_)) => {
                return Err(Error::invalid_input(
                    "periodicity flags given without lattice",
                ));
            }
        };

        Ok(Self {
            numbers: numbers.to_vec(),
            positions: to_vectors(positions)?,
            charge,
            cell,
        })
    }

    /// Creates a structure from element symbols.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown symbols, plus every
    /// failure of [`Structure::new`].
    pub fn from_symbols(
        symbols: &[&str],
        positions: &[[f64; 3]],
        charge: Option<f64>,
    ) -> Result<Self, Error> {
        let numbers = symbols
            .iter()
            .map(|s| {
                s.parse::<Element>()
                    .map(|el| el.atomic_number())
                    .map_err(|e| Error::invalid_input(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(&numbers, positions, charge, None, None)
    }

    /// Replaces positions and/or the lattice in place.
    ///
    /// Nothing is modified unless every supplied array is valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the number of positions changes,
    /// a value is not finite, a lattice is given for a structure created
    /// without one, or the new periodic lattice is singular.
    pub fn update(
        &mut self,
        positions: Option<&[[f64; 3]]>,
        lattice: Option<[[f64; 3]; 3]>,
    ) -> Result<(), Error> {
        let new_positions = match positions {
            Some(positions) if positions.len() != self.natoms() => {
                return Err(Error::invalid_input(format!(
                    "expected {} positions, got {}",
                    self.natoms(),
                    positions.len()
                )));
            }
            Some(positions) => Some(to_vectors(positions)?),
            None => None,
        };
        let new_cell = match (lattice, self.cell) {
            (Some(lattice), Some(cell)) => Some(make_cell(lattice, cell.periodic)?),
            (Some(_), None) => {
                return Err(Error::invalid_input(
                    "cannot update the lattice of a structure without one",
                ));
            }
            (None, _) => None,
        };

        if let Some(positions) = new_positions {
            self.positions = positions;
        }
        if new_cell.is_some() {
            self.cell = new_cell;
        }
        Ok(())
    }

    #[inline]
    pub fn natoms(&self) -> usize {
        self.numbers.len()
    }

    #[inline]
    pub fn numbers(&self) -> &[u8] {
        &self.numbers
    }

    #[inline]
    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    #[inline]
    pub fn charge(&self) -> f64 {
        self.charge
    }

    #[inline]
    pub fn cell(&self) -> Option<&Cell> {
        self.cell.as_ref()
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.cell.is_some_and(|c| c.is_periodic())
    }
}

fn to_vectors(positions: &[[f64; 3]]) -> Result<Vec<Vector3<f64>>, Error> {
    positions
        .iter()
        .enumerate()
        .map(|(idx, p)| {
            if p.iter().all(|x| x.is_finite()) {
                Ok(Vector3::from(*p))
            } else {
                Err(Error::invalid_input(format!(
                    "non-finite position for atom {}",
                    idx + 1
                )))
            }
        })
        .collect()
}

fn make_cell(lattice: [[f64; 3]; 3], periodic: [bool; 3]) -> Result<Cell, Error> {
    if lattice.iter().flatten().any(|x| !x.is_finite()) {
        return Err(Error::invalid_input("lattice contains non-finite values"));
    }
    let lattice = Matrix3::from_fn(|i, j| lattice[i][j]);
    let cell = Cell { lattice, periodic };
    if cell.is_periodic() && cell.volume().abs() < 1.0e-8 {
        return Err(Error::invalid_input("lattice vectors are linearly dependent"));
    }
    Ok(cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water_positions() -> Vec<[f64; 3]> {
        vec![
            [0.0, 0.0, -0.7166],
            [0.0, 1.4375, 0.3583],
            [0.0, -1.4375, 0.3583],
        ]
    }

    #[test]
    fn creates_molecular_structure_with_default_charge() {
        let mol = Structure::new(&[8, 1, 1], &water_positions(), None, None, None).unwrap();
        assert_eq!(mol.natoms(), 3);
        assert_eq!(mol.numbers(), &[8, 1, 1]);
        assert_eq!(mol.charge(), 0.0);
        assert!(mol.cell().is_none());
        assert!(!mol.is_periodic());
    }

    #[test]
    fn rejects_empty_structure() {
        let err = Structure::new(&[], &[], None, None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Structure::new(&[8, 1], &water_positions(), None, None, None).unwrap_err();
        assert!(err.to_string().contains("2 atomic numbers but 3 positions"));
    }

    #[test]
    fn rejects_unsupported_atomic_numbers() {
        assert!(Structure::new(&[0], &[[0.0; 3]], None, None, None).is_err());
        assert!(Structure::new(&[26], &[[0.0; 3]], None, None, None).is_err());
    }

    #[test]
    fn rejects_lattice_periodicity_mismatch() {
        let lattice = [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]];
        assert!(Structure::new(&[18], &[[0.0; 3]], None, Some(lattice), None).is_err());
        assert!(Structure::new(&[18], &[[0.0; 3]], None, None, Some([true; 3])).is_err());
        assert!(Structure::new(&[18], &[[0.0; 3]], None, Some(lattice), Some([true; 3])).is_ok());
    }

    #[test]
    fn rejects_singular_periodic_lattice() {
        let lattice = [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(Structure::new(&[18], &[[0.0; 3]], None, Some(lattice), Some([true; 3])).is_err());
    }

    #[test]
    fn rejects_non_finite_input() {
        assert!(Structure::new(&[1], &[[f64::NAN, 0.0, 0.0]], None, None, None).is_err());
        assert!(Structure::new(&[1], &[[0.0; 3]], Some(f64::INFINITY), None, None).is_err());
    }

    #[test]
    fn from_symbols_maps_elements() {
        let mol = Structure::from_symbols(&["O", "H", "H"], &water_positions(), Some(-1.0)).unwrap();
        assert_eq!(mol.numbers(), &[8, 1, 1]);
        assert_eq!(mol.charge(), -1.0);
        assert!(Structure::from_symbols(&["Xx"], &[[0.0; 3]], None).is_err());
    }

    #[test]
    fn update_replaces_positions_and_keeps_species() {
        let mut mol = Structure::new(&[8, 1, 1], &water_positions(), None, None, None).unwrap();
        let mut shifted = water_positions();
        shifted[0][2] += 0.1;
        mol.update(Some(&shifted), None).unwrap();
        assert_eq!(mol.positions()[0].z, -0.7166 + 0.1);
        assert_eq!(mol.numbers(), &[8, 1, 1]);
    }

    #[test]
    fn failed_update_leaves_structure_untouched() {
        let mut mol = Structure::new(&[8, 1, 1], &water_positions(), None, None, None).unwrap();
        let before = mol.clone();
        assert!(mol.update(Some(&water_positions()[..2]), None).is_err());
        let lattice = [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]];
        assert!(mol.update(Some(&water_positions()), Some(lattice)).is_err());
        assert_eq!(mol, before);
    }

    #[test]
    fn update_replaces_lattice_of_periodic_structure() {
        let lattice = [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]];
        let mut solid =
            Structure::new(&[18], &[[0.0; 3]], None, Some(lattice), Some([true; 3])).unwrap();
        let larger = [[11.0, 0.0, 0.0], [0.0, 11.0, 0.0], [0.0, 0.0, 11.0]];
        solid.update(None, Some(larger)).unwrap();
        assert!((solid.cell().unwrap().volume() - 1331.0).abs() < 1e-9);
        assert!(solid.is_periodic());
    }
}
