use nalgebra::{Matrix3, Vector3};

/// Partial results of an energy term, reduced across worker threads.
///
/// `dedcn` and `dedq` collect the derivatives with respect to the
/// coordination numbers and partial charges; they are folded into the
/// gradient through the chain rule once every term has been evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Contributions {
    pub energies: Vec<f64>,
    pub dedcn: Vec<f64>,
    pub dedq: Vec<f64>,
    pub gradient: Vec<Vector3<f64>>,
    pub sigma: Matrix3<f64>,
}

impl Contributions {
    pub fn zeros(natoms: usize) -> Self {
        Self {
            energies: vec![0.0; natoms],
            dedcn: vec![0.0; natoms],
            dedq: vec![0.0; natoms],
            gradient: vec![Vector3::zeros(); natoms],
            sigma: Matrix3::zeros(),
        }
    }

    /// Adds `other` element-wise.
    pub fn merge(mut self, other: Self) -> Self {
        add_assign(&mut self.energies, &other.energies);
        add_assign(&mut self.dedcn, &other.dedcn);
        add_assign(&mut self.dedq, &other.dedq);
        for (g, o) in self.gradient.iter_mut().zip(&other.gradient) {
            *g += o;
        }
        self.sigma += other.sigma;
        self
    }

    pub fn energy(&self) -> f64 {
        self.energies.iter().sum()
    }
}

fn add_assign(lhs: &mut [f64], rhs: &[f64]) {
    for (l, r) in lhs.iter_mut().zip(rhs) {
        *l += r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_every_field() {
        let mut a = Contributions::zeros(2);
        a.energies[0] = 1.0;
        a.gradient[1] = Vector3::new(1.0, 0.0, 0.0);
        let mut b = Contributions::zeros(2);
        b.energies[0] = 2.0;
        b.dedq[1] = -1.0;
        b.sigma[(0, 1)] = 0.5;

        let c = a.merge(b);
        assert_eq!(c.energies, vec![3.0, 0.0]);
        assert_eq!(c.dedq, vec![0.0, -1.0]);
        assert_eq!(c.gradient[1].x, 1.0);
        assert_eq!(c.sigma[(0, 1)], 0.5);
        assert_eq!(c.energy(), 3.0);
    }
}
