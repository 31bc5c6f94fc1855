use crate::{
    basis::BasisFunctions,
    nnls::{self, NnlsError},
    system::MatrixSystem,
};
use base::math::median_positive;
use nalgebra::DVector;
use rayon::prelude::*;

/// Non-negative solution of a basis fitting system, one vector per colour
/// channel, laid out as produced by [`crate::MatrixBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedFunctions {
    solutions: Vec<DVector<f64>>,
    instance_count: usize,
}

impl OptimizedFunctions {
    /// Solves every channel of the system with non-negative least squares.
    ///
    /// The NNLS tolerance of each channel is `tolerance_scale` times the
    /// first positive right-hand side entry at or above the median (see
    /// [`median_positive`]), or times one if there is none. Channels are
    /// solved in parallel.
    pub fn solve_system_non_negative(
        system: &MatrixSystem,
        instance_count: usize,
        tolerance_scale: f64,
    ) -> Result<Self, NnlsError> {
        let solutions = system
            .rhs
            .par_iter()
            .map(|rhs| {
                let tolerance = tolerance_scale * median_positive(rhs.iter().copied()).unwrap_or(1.0);
                nnls::solve_premultiplied(&system.lhs, rhs, tolerance)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            solutions,
            instance_count,
        })
    }

    /// Wraps already solved channel vectors.
    pub fn from_solutions(solutions: Vec<DVector<f64>>, instance_count: usize) -> Self {
        Self {
            solutions,
            instance_count,
        }
    }

    /// Solution vector of a channel.
    pub fn solution(&self, channel: usize) -> &DVector<f64> { &self.solutions[channel] }

    /// Number of instances of the system.
    pub fn instance_count(&self) -> usize { self.instance_count }

    /// Whether any coefficient of instance `b` is positive in any channel.
    pub fn is_instance_non_zero(&self, b: usize) -> bool {
        self.solutions.iter().any(|solution| {
            solution
                .iter()
                .skip(b)
                .step_by(self.instance_count)
                .any(|v| *v > 0.0)
        })
    }

    /// Raw coefficient of the constant function of instance `b`.
    pub fn constant_term(&self, b: usize, channel: usize) -> f64 { self.solutions[channel][b] }

    /// Part of the constant coefficient that is independent of the geometric
    /// ratio, i.e. the diffuse reflectance scaled by 1/π.
    pub fn true_constant_term<F: BasisFunctions + ?Sized>(
        &self,
        basis: &F,
        b: usize,
        channel: usize,
    ) -> f64 {
        (1.0 - basis.metallicity()) * self.constant_term(b, channel)
    }

    /// Decodes the specular curve of instance `b` for a channel.
    pub fn evaluate_non_constant<F: BasisFunctions + ?Sized>(
        &self,
        basis: &F,
        b: usize,
        channel: usize,
    ) -> Vec<f64> {
        let solution = &self.solutions[channel];
        let n = self.instance_count;
        basis.evaluate_solution(solution[b], &|k| solution[n * (k + 1) + b])
    }
}
