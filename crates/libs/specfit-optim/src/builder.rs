//! Closed-form accumulation of normal equations for step-basis reflectance
//! fitting.
//!
//! The unknowns of the system are laid out as `instance_count * (R + 1)`
//! values: index `b` holds the constant (diffuse) coefficient of instance
//! `b`, and index `instance_count * (k + 1) + b` the coefficient of step
//! function `k` of instance `b`.
//!
//! A sample with microfacet bucket `m_exact = halfway * R` is linearly
//! interpolated between buckets `m = min(R - 1, floor(m_exact))` and `m + 1`
//! with weight `t = 1 + m - m_exact` on the lower bucket. For step functions
//! this gives step `k` the value 0 for `k < m`, `t` for `k == m` and 1 for
//! `k > m`. Every product of two step values therefore only depends on the
//! lower of the two steps, and the full `AᵀA` can be reconstructed from
//! per-bucket sums of `1`, `t` and `t²` weighted terms with prefix sums over
//! buckets, without ever forming the design matrix.

use crate::{basis::StepBasis, system::MatrixSystem};

/// One observation accepted by a [`MatrixBuilder`].
#[derive(Debug, Copy, Clone)]
pub struct BuilderSample<'a> {
    /// Normalised halfway angle in `[0, 1]`.
    pub halfway: f64,
    /// Geometric attenuation ratio.
    pub geom_ratio: f64,
    /// Regression weight of the observation (already squared).
    pub weight: f64,
    /// Observed RGB value.
    pub color: [f64; 3],
    /// Mixing weight of every instance at the observed location.
    pub instance_weights: &'a [f64],
}

/// Accumulates observations into per-bucket running sums.
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    basis: StepBasis,
    instance_count: usize,
    /// `Σ w·w1·w2·d²` over every sample, `d` being the diffuse factor.
    diffuse: Vec<f64>,
    /// `Σ w·wb·d·y_c` over every sample, indexed `[c][b]`.
    diffuse_rhs: Vec<f64>,
    /// `Σ w·w1·w2·g²` per bucket, `g` being the geometric ratio.
    spec: Vec<f64>,
    /// `Σ w·w1·w2·g²·t` per bucket.
    spec_blended: Vec<f64>,
    /// `Σ w·w1·w2·g²·t²` per bucket.
    spec_blended_sq: Vec<f64>,
    /// `Σ w·w1·w2·g·d` per bucket.
    cross: Vec<f64>,
    /// `Σ w·w1·w2·g·d·t` per bucket.
    cross_blended: Vec<f64>,
    /// `Σ w·wb·g·y_c` per bucket, indexed `[m][c][b]`.
    spec_rhs: Vec<f64>,
    /// `Σ w·wb·g·y_c·t` per bucket.
    spec_rhs_blended: Vec<f64>,
    sample_count: usize,
}

impl MatrixBuilder {
    /// Creates an empty builder for `instance_count` instances of the given
    /// basis.
    pub fn new(instance_count: usize, basis: StepBasis) -> Self {
        let r = basis.resolution();
        let pairs = instance_count * instance_count;
        let rhs = 3 * instance_count;
        Self {
            basis,
            instance_count,
            diffuse: vec![0.0; pairs],
            diffuse_rhs: vec![0.0; rhs],
            spec: vec![0.0; r * pairs],
            spec_blended: vec![0.0; r * pairs],
            spec_blended_sq: vec![0.0; r * pairs],
            cross: vec![0.0; r * pairs],
            cross_blended: vec![0.0; r * pairs],
            spec_rhs: vec![0.0; r * rhs],
            spec_rhs_blended: vec![0.0; r * rhs],
            sample_count: 0,
        }
    }

    /// Basis functions of the fitted curves.
    pub fn basis(&self) -> &StepBasis { &self.basis }

    /// Number of instances (basis materials).
    pub fn instance_count(&self) -> usize { self.instance_count }

    /// Number of samples accepted so far.
    pub fn sample_count(&self) -> usize { self.sample_count }

    /// Size of the system produced by [`MatrixBuilder::build_into`].
    pub fn system_size(&self) -> usize { self.instance_count * (self.basis.resolution() + 1) }

    /// Index of the unknown holding step `k` of instance `b`.
    #[inline]
    pub fn step_index(&self, k: usize, b: usize) -> usize { self.instance_count * (k + 1) + b }

    /// Diffuse factor blending between fully diffuse and specular-driven
    /// attenuation.
    #[inline]
    pub fn diffuse_factor(&self, geom_ratio: f64) -> f64 {
        let metallicity = crate::BasisFunctions::metallicity(&self.basis);
        metallicity * geom_ratio + (1.0 - metallicity)
    }

    /// Returns the lower bucket and the interpolation weight of that bucket
    /// for a halfway value, or `None` if the value lies beyond the last
    /// bucket.
    #[inline]
    pub fn bucket(&self, halfway: f64) -> Option<(usize, f64)> {
        let r = self.basis.resolution();
        let m_exact = halfway * r as f64;
        if r == 0 || m_exact >= r as f64 {
            return None;
        }
        let m_floor = (m_exact.floor().max(0.0) as usize).min(r - 1);
        let t = (1.0 + m_floor as f64 - m_exact).clamp(0.0, 1.0);
        Some((m_floor, t))
    }

    /// Adds one observation to the running sums.
    pub fn accept(&mut self, sample: &BuilderSample) {
        let n = self.instance_count;
        debug_assert_eq!(sample.instance_weights.len(), n);
        let w = sample.weight;
        let g = sample.geom_ratio;
        let d = self.diffuse_factor(g);
        let weights = sample.instance_weights;

        for b1 in 0..n {
            let w1 = w * weights[b1];
            if w1 == 0.0 {
                continue;
            }
            for c in 0..3 {
                self.diffuse_rhs[c * n + b1] += w1 * d * sample.color[c];
            }
            for b2 in 0..n {
                self.diffuse[b1 * n + b2] += w1 * weights[b2] * d * d;
            }
        }

        if let Some((m, t)) = self.bucket(sample.halfway) {
            let pairs = m * n * n;
            for b1 in 0..n {
                let w1 = w * weights[b1];
                if w1 == 0.0 {
                    continue;
                }
                for b2 in 0..n {
                    let idx = pairs + b1 * n + b2;
                    let spec = w1 * weights[b2] * g * g;
                    self.spec[idx] += spec;
                    self.spec_blended[idx] += spec * t;
                    self.spec_blended_sq[idx] += spec * t * t;
                    let cross = w1 * weights[b2] * g * d;
                    self.cross[idx] += cross;
                    self.cross_blended[idx] += cross * t;
                }
                for c in 0..3 {
                    let idx = (m * 3 + c) * n + b1;
                    let rhs = w1 * g * sample.color[c];
                    self.spec_rhs[idx] += rhs;
                    self.spec_rhs_blended[idx] += rhs * t;
                }
            }
        }

        self.sample_count += 1;
    }

    /// Adds the accumulated normal equations into a system of size
    /// [`MatrixBuilder::system_size`] with three channels.
    pub fn build_into(&self, system: &mut MatrixSystem) {
        let n = self.instance_count;
        let r = self.basis.resolution();
        debug_assert_eq!(system.size(), self.system_size());

        // Diffuse-diffuse block and diffuse right-hand sides.
        for b1 in 0..n {
            for b2 in 0..n {
                system.add_to_lhs(b1, b2, self.diffuse[b1 * n + b2]);
            }
            for c in 0..3 {
                system.add_to_rhs(b1, c, self.diffuse_rhs[c * n + b1]);
            }
        }

        // Running totals over the buckets strictly below the current step.
        let mut spec_below = vec![0.0; n * n];
        let mut cross_below = vec![0.0; n * n];
        let mut rhs_below = vec![0.0; 3 * n];

        for k in 0..r {
            let pairs = k * n * n;
            for b1 in 0..n {
                let i = self.step_index(k, b1);
                for b2 in 0..n {
                    let idx = b1 * n + b2;

                    let cross = cross_below[idx] + self.cross_blended[pairs + idx];
                    system.add_to_lhs(i, b2, cross);
                    system.add_to_lhs(b2, i, cross);

                    let diagonal = spec_below[idx] + self.spec_blended_sq[pairs + idx];
                    system.add_to_lhs(i, self.step_index(k, b2), diagonal);

                    let upper = spec_below[idx] + self.spec_blended[pairs + idx];
                    for k2 in k + 1..r {
                        let j = self.step_index(k2, b2);
                        system.add_to_lhs(i, j, upper);
                        system.add_to_lhs(j, i, upper);
                    }
                }
                for c in 0..3 {
                    let idx = c * n + b1;
                    system.add_to_rhs(i, c, rhs_below[idx] + self.spec_rhs_blended[k * 3 * n + idx]);
                }
            }

            for idx in 0..n * n {
                spec_below[idx] += self.spec[pairs + idx];
                cross_below[idx] += self.cross[pairs + idx];
            }
            for idx in 0..3 * n {
                rhs_below[idx] += self.spec_rhs[k * 3 * n + idx];
            }
        }
    }

    /// Builds a fresh system from the accumulated sums.
    pub fn build(&self) -> MatrixSystem {
        let mut system = MatrixSystem::new(self.system_size(), 3);
        self.build_into(&mut system);
        system
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BasisFunctions;
    use nalgebra::{DMatrix, DVector};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Dense design matrix row of a sample, built directly from the basis
    /// function definition.
    fn dense_row(builder: &MatrixBuilder, sample: &BuilderSample) -> (Vec<f64>, [f64; 3]) {
        let n = builder.instance_count();
        let r = builder.basis().resolution();
        let a = sample.weight.sqrt();
        let mut row = vec![0.0; builder.system_size()];
        let d = builder.diffuse_factor(sample.geom_ratio);
        for b in 0..n {
            row[b] = a * sample.instance_weights[b] * d;
        }
        let m_exact = sample.halfway * r as f64;
        if m_exact < r as f64 {
            let m = (m_exact.floor() as usize).min(r - 1);
            let t = (1.0 + m as f64 - m_exact).clamp(0.0, 1.0);
            for k in 0..r {
                let f = t * builder.basis().evaluate(k, m)
                    + (1.0 - t) * builder.basis().evaluate(k, m + 1);
                for b in 0..n {
                    row[builder.step_index(k, b)] =
                        a * sample.geom_ratio * sample.instance_weights[b] * f;
                }
            }
        }
        let y = sample.color.map(|c| a * c);
        (row, y)
    }

    #[test]
    fn test_closed_form_matches_dense_product() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for metallicity in [0.0, 0.4, 1.0] {
            let mut builder = MatrixBuilder::new(3, StepBasis::new(6, metallicity));
            let mut rows = Vec::new();
            let mut ys = Vec::new();
            for _ in 0..150 {
                let weights: Vec<f64> = (0..3).map(|_| rng.gen_range(0.0..1.0)).collect();
                let sample = BuilderSample {
                    halfway: rng.gen_range(0.0..1.05f64).min(1.0),
                    geom_ratio: rng.gen_range(0.1..2.0),
                    weight: rng.gen_range(0.2..1.5),
                    color: [rng.gen(), rng.gen(), rng.gen()],
                    instance_weights: &weights,
                };
                builder.accept(&sample);
                let (row, y) = dense_row(&builder, &sample);
                rows.push(row);
                ys.push(y);
            }
            let a = DMatrix::from_fn(rows.len(), builder.system_size(), |i, j| rows[i][j]);
            let mut reference = MatrixSystem::new(builder.system_size(), 3);
            reference.lhs = a.tr_mul(&a);
            for c in 0..3 {
                let y = DVector::from_fn(ys.len(), |i, _| ys[i][c]);
                reference.rhs[c] = a.tr_mul(&y);
            }
            let system = builder.build();
            assert!(system.max_relative_difference(&reference) < 1e-9);
            assert_eq!(builder.sample_count(), 150);
        }
    }

    #[test]
    fn test_bucket() {
        let builder = MatrixBuilder::new(1, StepBasis::new(4, 0.0));
        assert_eq!(builder.bucket(0.0), Some((0, 1.0)));
        let (m, t) = builder.bucket(0.6).unwrap();
        assert_eq!(m, 2);
        assert!((t - 0.6).abs() < 1e-12);
        assert_eq!(builder.bucket(1.0), None);
    }

    #[test]
    fn test_build_is_symmetric() {
        let mut builder = MatrixBuilder::new(2, StepBasis::new(5, 0.3));
        let weights = [0.25, 0.75];
        for i in 0..20 {
            builder.accept(&BuilderSample {
                halfway: i as f64 / 20.0,
                geom_ratio: 0.5 + i as f64 * 0.05,
                weight: 1.0,
                color: [0.2, 0.3, 0.4],
                instance_weights: &weights,
            });
        }
        let system = builder.build();
        assert!((&system.lhs - system.lhs.transpose()).amax() < 1e-12);
    }
}
