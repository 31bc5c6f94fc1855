/// A library of basis functions over a discretised domain, used to express
/// a specular curve as a non-negative combination of functions.
///
/// Every function is expected to be non-increasing over the domain: 1.0 for
/// small domain values and 0.0 beyond some point. Solutions are decoded into
/// `function_count() + 1` samples, the last of which only depends on the
/// constant term.
pub trait BasisFunctions: Send + Sync {
    /// Evaluates the function `function_index` at the domain value `value`.
    fn evaluate(&self, function_index: usize, value: usize) -> f64;

    /// Number of functions in the library.
    fn function_count(&self) -> usize;

    /// Blend between fully diffuse (0) and fully specular-driven (1) diffuse
    /// attenuation.
    fn metallicity(&self) -> f64;

    /// Decodes a solution into discretised curve samples.
    ///
    /// # Arguments
    ///
    /// * `constant_term` - Solved coefficient of the constant function.
    /// * `non_constant` - Solved coefficient of each library function.
    ///
    /// Returns `function_count() + 1` samples.
    fn evaluate_solution(&self, constant_term: f64, non_constant: &dyn Fn(usize) -> f64) -> Vec<f64>;
}

/// Unit step functions: function `k` is 1.0 for every value up to and
/// including `k`, 0.0 above.
///
/// With linear interpolation between adjacent domain values, a sample
/// falling between buckets `m` and `m + 1` touches at most one partially
/// weighted function; all functions above it are fully on.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StepBasis {
    resolution: usize,
    metallicity: f64,
}

impl StepBasis {
    /// Creates a step basis with `resolution` functions; the metallicity is
    /// clamped into `[0, 1]`.
    pub fn new(resolution: usize, metallicity: f64) -> Self {
        Self {
            resolution,
            metallicity: metallicity.clamp(0.0, 1.0),
        }
    }

    /// Number of step functions, also the index of the last curve sample.
    pub const fn resolution(&self) -> usize { self.resolution }
}

impl BasisFunctions for StepBasis {
    fn evaluate(&self, function_index: usize, value: usize) -> f64 {
        if value <= function_index {
            1.0
        } else {
            0.0
        }
    }

    fn function_count(&self) -> usize { self.resolution }

    fn metallicity(&self) -> f64 { self.metallicity }

    fn evaluate_solution(&self, constant_term: f64, non_constant: &dyn Fn(usize) -> f64) -> Vec<f64> {
        let mut samples = vec![0.0; self.resolution + 1];
        // f[R] only depends on the constant term.
        samples[self.resolution] = constant_term * self.metallicity;
        // f[m] = f[m + 1] + step coefficient m.
        for m in (0..self.resolution).rev() {
            samples[m] = samples[m + 1] + non_constant(m);
        }
        samples
    }
}
