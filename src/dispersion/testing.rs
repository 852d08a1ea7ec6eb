//! Shared structures and finite-difference helpers for unit tests.

use crate::model::structure::Structure;
use nalgebra::{Matrix3, Vector3};

fn to_arrays(positions: &[Vector3<f64>]) -> Vec<[f64; 3]> {
    positions.iter().map(|p| [p.x, p.y, p.z]).collect()
}

pub fn water() -> Structure {
    Structure::new(
        &[8, 1, 1],
        &[
            [0.0, 0.0, -0.7166],
            [0.0, 1.4375, 0.3583],
            [0.0, -1.4375, 0.3583],
        ],
        None,
        None,
        None,
    )
    .unwrap()
}

/// Lithium fluoride at 3 Bohr, strongly polar.
pub fn lithium_fluoride() -> Structure {
    Structure::new(&[3, 9], &[[0.0, 0.0, 0.0], [0.1, 0.2, 3.0]], None, None, None).unwrap()
}

/// Distorted methanol, no symmetry.
pub fn methanol() -> Structure {
    Structure::new(
        &[6, 8, 1, 1, 1, 1],
        &[
            [0.0, 0.0, 0.0],
            [2.65, 0.3, 0.05],
            [-0.7, 1.9, 0.2],
            [-0.6, -0.9, 1.7],
            [-0.65, -1.0, -1.6],
            [3.2, -1.4, 0.2],
        ],
        None,
        None,
        None,
    )
    .unwrap()
}

/// Hydroxide anion, exercises a non-zero total charge.
pub fn hydroxide() -> Structure {
    Structure::new(
        &[8, 1],
        &[[0.0, 0.0, 0.0], [0.3, 0.1, 1.83]],
        Some(-1.0),
        None,
        None,
    )
    .unwrap()
}

/// Two-atom triclinic cell with all directions periodic.
pub fn lithium_hydride_cell() -> Structure {
    Structure::new(
        &[3, 1],
        &[[0.1, 0.0, 0.2], [3.4, 0.3, 0.1]],
        None,
        Some([[6.8, 0.0, 0.0], [0.4, 7.1, 0.0], [0.2, 0.3, 7.4]]),
        Some([true; 3]),
    )
    .unwrap()
}

/// Monolayer with one non-periodic direction.
pub fn fluorine_slab() -> Structure {
    Structure::new(
        &[9, 9],
        &[[0.0, 0.0, 0.0], [2.7, 0.1, 0.2]],
        None,
        Some([[6.5, 0.0, 0.0], [0.3, 6.9, 0.0], [0.0, 0.0, 30.0]]),
        Some([true, true, false]),
    )
    .unwrap()
}

/// Copy of `mol` with one Cartesian coordinate of one atom shifted.
pub fn displaced(mol: &Structure, atom: usize, component: usize, step: f64) -> Structure {
    let mut positions = to_arrays(mol.positions());
    positions[atom][component] += step;
    let mut out = mol.clone();
    out.update(Some(&positions), None).unwrap();
    out
}

/// Copy of `mol` with one atom moved by the lattice vector `n · L`.
pub fn shifted_by_lattice(mol: &Structure, atom: usize, n: [i32; 3]) -> Structure {
    let mut positions = to_arrays(mol.positions());
    if let Some(cell) = mol.cell() {
        let shift: Vector3<f64> = (0..3).map(|j| cell.vector(j) * f64::from(n[j])).sum();
        for c in 0..3 {
            positions[atom][c] += shift[c];
        }
    }
    let mut out = mol.clone();
    out.update(Some(&positions), None).unwrap();
    out
}

/// Copy of `mol` under the homogeneous deformation `x -> (1 + eps) x`.
pub fn strained(mol: &Structure, eps: &Matrix3<f64>) -> Structure {
    let deform = Matrix3::identity() + eps;
    let positions: Vec<Vector3<f64>> = mol.positions().iter().map(|p| deform * p).collect();
    let mut out = mol.clone();
    let lattice = mol.cell().map(|cell| {
        let mut rows = [[0.0; 3]; 3];
        for (i, row) in rows.iter_mut().enumerate() {
            let v = deform * cell.vector(i);
            *row = [v.x, v.y, v.z];
        }
        rows
    });
    out.update(Some(&to_arrays(&positions)), lattice).unwrap();
    out
}

/// Strain tensor with a single non-zero component.
pub fn unit_strain(a: usize, b: usize, step: f64) -> Matrix3<f64> {
    let mut eps = Matrix3::zeros();
    eps[(a, b)] = step;
    eps
}
