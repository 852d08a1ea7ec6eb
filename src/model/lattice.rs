use super::structure::Cell;
use nalgebra::Vector3;

/// Reduces a separation vector to its minimum image.
///
/// Along every periodic direction the fractional coordinate of the result
/// lies in `[-0.5, 0.5]`; non-periodic components are left unchanged. The
/// result differs from `v` by a lattice vector only, so any lattice sum over
/// `v - t` is unaffected while the images within a cutoff stay inside the
/// range generated by [`translations`].
pub fn minimum_image(cell: Option<&Cell>, v: Vector3<f64>) -> Vector3<f64> {
    let Some(cell) = cell.filter(|c| c.is_periodic()) else {
        return v;
    };
    let Some(inverse) = cell.lattice.try_inverse() else {
        return v;
    };
    // lattice vectors are rows, so v = Lᵀ f
    let frac = inverse.transpose() * v;
    let mut shift = Vector3::zeros();
    for j in 0..3 {
        if cell.periodic[j] {
            shift[j] = frac[j].round();
        }
    }
    if shift == Vector3::zeros() {
        return v;
    }
    v - cell.lattice.transpose() * shift
}

/// Generates the lattice translations needed for a real-space sum.
///
/// For every periodic direction `j` the number of repetitions is
/// `ceil(cutoff * |b_j|)`, where `b_j` is column `j` of the inverse lattice.
/// Combined with a separation vector reduced by [`minimum_image`], this
/// covers every image within `cutoff`. Without a cell, or for non-periodic
/// directions, only the zero translation is used.
///
/// The zero vector is always the first element.
pub fn translations(cell: Option<&Cell>, cutoff: f64) -> Vec<Vector3<f64>> {
    let Some(cell) = cell.filter(|c| c.is_periodic()) else {
        return vec![Vector3::zeros()];
    };
    let Some(inverse) = cell.lattice.try_inverse() else {
        return vec![Vector3::zeros()];
    };

    let mut reps = [0i64; 3];
    for (j, rep) in reps.iter_mut().enumerate() {
        if cell.periodic[j] {
            *rep = (cutoff * inverse.column(j).norm()).ceil() as i64;
        }
    }

    let vectors = [cell.vector(0), cell.vector(1), cell.vector(2)];
    let mut out = vec![Vector3::zeros()];
    for n0 in -reps[0]..=reps[0] {
        for n1 in -reps[1]..=reps[1] {
            for n2 in -reps[2]..=reps[2] {
                if n0 == 0 && n1 == 0 && n2 == 0 {
                    continue;
                }
                out.push(
                    vectors[0] * n0 as f64 + vectors[1] * n1 as f64 + vectors[2] * n2 as f64,
                );
            }
        }
    }
    out
}
