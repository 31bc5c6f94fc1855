use base::math::relative_difference;
use nalgebra::{DMatrix, DVector};

/// Normal equations `AᵀA x = Aᵀy_c` of a linear least squares problem with
/// several right-hand sides (one per colour channel).
///
/// Systems built from disjoint sets of observations can be merged by
/// addition; merging is associative and commutative up to round-off.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSystem {
    /// `AᵀA`, symmetric positive semi-definite.
    pub lhs: DMatrix<f64>,
    /// `Aᵀy_c` for each channel.
    pub rhs: Vec<DVector<f64>>,
}

impl MatrixSystem {
    /// Creates a zeroed system of `size` unknowns and `channel_count`
    /// right-hand sides.
    pub fn new(size: usize, channel_count: usize) -> Self {
        Self {
            lhs: DMatrix::zeros(size, size),
            rhs: vec![DVector::zeros(size); channel_count],
        }
    }

    /// Number of unknowns.
    pub fn size(&self) -> usize { self.lhs.nrows() }

    /// Number of right-hand sides.
    pub fn channel_count(&self) -> usize { self.rhs.len() }

    /// Adds a value to an entry of the left-hand side.
    #[inline]
    pub fn add_to_lhs(&mut self, row: usize, col: usize, value: f64) { self.lhs[(row, col)] += value; }

    /// Adds a value to an entry of the right-hand side of a channel.
    #[inline]
    pub fn add_to_rhs(&mut self, row: usize, channel: usize, value: f64) {
        self.rhs[channel][row] += value;
    }

    /// Adds the contribution of another system of the same shape.
    pub fn add_contribution(&mut self, other: &MatrixSystem) {
        debug_assert_eq!(self.size(), other.size());
        debug_assert_eq!(self.channel_count(), other.channel_count());
        self.lhs += &other.lhs;
        for (rhs, other_rhs) in self.rhs.iter_mut().zip(other.rhs.iter()) {
            *rhs += other_rhs;
        }
    }

    /// Consumes both systems and returns their sum, for use in reductions.
    pub fn merged(mut self, other: MatrixSystem) -> MatrixSystem {
        self.add_contribution(&other);
        self
    }

    /// Largest relative difference between the entries of this system and a
    /// reference system.
    ///
    /// Entries are compared relative to their reference value, with a floor
    /// of `1e-9` times the largest reference magnitude of the same matrix or
    /// vector so that round-off on structurally zero entries is ignored.
    pub fn max_relative_difference(&self, reference: &MatrixSystem) -> f64 {
        let lhs_floor = reference.lhs.amax().max(f64::MIN_POSITIVE) * 1e-9;
        let lhs_diff = self
            .lhs
            .iter()
            .zip(reference.lhs.iter())
            .map(|(v, r)| relative_difference(*v, *r, lhs_floor))
            .fold(0.0, f64::max);
        self.rhs
            .iter()
            .zip(reference.rhs.iter())
            .map(|(rhs, reference)| {
                let floor = reference.amax().max(f64::MIN_POSITIVE) * 1e-9;
                rhs.iter()
                    .zip(reference.iter())
                    .map(|(v, r)| relative_difference(*v, *r, floor))
                    .fold(0.0, f64::max)
            })
            .fold(lhs_diff, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn system_from(values: &[f64], size: usize) -> MatrixSystem {
        let mut system = MatrixSystem::new(size, 3);
        for (i, v) in values.iter().enumerate() {
            let row = i % size;
            let col = (i / size) % size;
            system.add_to_lhs(row, col, *v);
            system.add_to_rhs(row, i % 3, *v);
        }
        system
    }

    #[test]
    fn test_add_contribution() {
        let mut a = MatrixSystem::new(2, 3);
        a.add_to_lhs(0, 1, 1.0);
        a.add_to_rhs(1, 2, 3.0);
        let mut b = MatrixSystem::new(2, 3);
        b.add_to_lhs(0, 1, 2.0);
        b.add_to_rhs(1, 2, -1.0);
        a.add_contribution(&b);
        assert_eq!(a.lhs[(0, 1)], 3.0);
        assert_eq!(a.rhs[2][1], 2.0);
        assert_eq!(a.rhs[0][1], 0.0);
    }

    #[test]
    fn test_max_relative_difference() {
        let mut a = MatrixSystem::new(2, 1);
        a.add_to_lhs(0, 0, 1000.0);
        a.add_to_rhs(0, 0, 10.0);
        let mut b = a.clone();
        assert_eq!(a.max_relative_difference(&b), 0.0);
        b.add_to_lhs(0, 0, 1.0);
        assert!((a.max_relative_difference(&b) - 1.0 / 1001.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn test_merge_commutative_associative(
            x in prop::collection::vec(-10.0f64..10.0, 16),
            y in prop::collection::vec(-10.0f64..10.0, 16),
            z in prop::collection::vec(-10.0f64..10.0, 16),
        ) {
            let (a, b, c) = (system_from(&x, 4), system_from(&y, 4), system_from(&z, 4));
            let left = a.clone().merged(b.clone()).merged(c.clone());
            let right = c.merged(b.merged(a));
            prop_assert!(left.max_relative_difference(&right) < 1e-5);
        }
    }
}
