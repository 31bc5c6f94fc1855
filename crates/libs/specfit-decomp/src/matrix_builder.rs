use crate::{decomposition::TexelWeights, reflectance::ReflectanceData};
use base::error::RuntimeError;
use nalgebra::{DMatrix, DVector};
use optim::{BasisFunctions, BuilderSample, MatrixBuilder, MatrixSystem, StepBasis};

/// Relative tolerance of the dense validation.
pub const VALIDATION_TOLERANCE: f64 = 1e-3;

/// Accumulates the normal equations of one view for the basis
/// reconstruction, given the current texel weights.
pub struct ReflectanceMatrixBuilder<'a, R, W>
where
    R: ReflectanceData + ?Sized,
    W: TexelWeights + ?Sized,
{
    reflectance: &'a R,
    weights: &'a W,
    basis: StepBasis,
    validate: bool,
}

impl<'a, R, W> ReflectanceMatrixBuilder<'a, R, W>
where
    R: ReflectanceData + ?Sized,
    W: TexelWeights + ?Sized,
{
    /// Creates a builder for one view.
    pub fn new(reflectance: &'a R, weights: &'a W, basis: StepBasis) -> Self {
        Self {
            reflectance,
            weights,
            basis,
            validate: false,
        }
    }

    /// Enables checking the accumulated system against a dense reference.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Size of the system built by this builder.
    pub fn system_size(&self) -> usize {
        self.weights.weight_count() * (self.basis.resolution() + 1)
    }

    fn builder_sample(&self, p: usize) -> BuilderSample<'a> {
        let r = self.reflectance;
        BuilderSample {
            halfway: r.halfway_index(p) as f64,
            geom_ratio: r.geom_ratio(p) as f64,
            weight: r.additional_weight(p) as f64,
            color: [r.red(p) as f64, r.green(p) as f64, r.blue(p) as f64],
            instance_weights: self.weights.texel_weights(p),
        }
    }

    /// Adds the contribution of the view to `system`.
    ///
    /// Texels with zero visibility are skipped.
    pub fn execute(&self, system: &mut MatrixSystem) -> Result<(), RuntimeError> {
        let mut builder = MatrixBuilder::new(self.weights.weight_count(), self.basis);
        for p in 0..self.reflectance.size() {
            if self.reflectance.is_visible(p) {
                builder.accept(&self.builder_sample(p));
            }
        }

        if self.validate {
            let contribution = builder.build();
            self.validate(&contribution)?;
            system.add_contribution(&contribution);
        } else {
            builder.build_into(system);
        }
        Ok(())
    }

    /// Computes the contribution of the view through an explicit dense
    /// design matrix. Cost is proportional to the number of samples times
    /// the squared system size.
    pub fn dense_reference(&self) -> MatrixSystem {
        let n = self.weights.weight_count();
        let r = self.basis.resolution();
        let size = self.system_size();
        let visible = (0..self.reflectance.size())
            .filter(|p| self.reflectance.is_visible(*p))
            .collect::<Vec<_>>();

        let mut a = DMatrix::zeros(visible.len(), size);
        let mut y = vec![DVector::zeros(visible.len()); 3];
        let metallicity = self.basis.metallicity();
        for (row, &p) in visible.iter().enumerate() {
            let sample = self.builder_sample(p);
            // Rows are scaled by the square root of the sample weight.
            let scale = sample.weight.sqrt();
            let d = metallicity * sample.geom_ratio + (1.0 - metallicity);
            for b in 0..n {
                a[(row, b)] = scale * sample.instance_weights[b] * d;
            }
            let m_exact = sample.halfway * r as f64;
            if m_exact < r as f64 {
                let m = (m_exact.floor().max(0.0) as usize).min(r - 1);
                let t = (1.0 + m as f64 - m_exact).clamp(0.0, 1.0);
                for k in 0..r {
                    let f = t * self.basis.evaluate(k, m) + (1.0 - t) * self.basis.evaluate(k, m + 1);
                    for b in 0..n {
                        a[(row, n * (k + 1) + b)] =
                            scale * sample.geom_ratio * sample.instance_weights[b] * f;
                    }
                }
            }
            for c in 0..3 {
                y[c][row] = scale * sample.color[c];
            }
        }

        MatrixSystem {
            lhs: a.tr_mul(&a),
            rhs: y.iter().map(|y| a.tr_mul(y)).collect(),
        }
    }

    /// Compares an accumulated contribution of this view against the dense
    /// reference, reporting the first entry whose relative difference
    /// exceeds [`VALIDATION_TOLERANCE`].
    pub fn validate(&self, contribution: &MatrixSystem) -> Result<(), RuntimeError> {
        let reference = self.dense_reference();
        let lhs_floor = reference.lhs.amax().max(f64::MIN_POSITIVE) * 1e-9;
        for col in 0..reference.size() {
            for row in 0..reference.size() {
                let expected = reference.lhs[(row, col)];
                let actual = contribution.lhs[(row, col)];
                if (actual - expected).abs() > VALIDATION_TOLERANCE * expected.abs().max(lhs_floor) {
                    return Err(RuntimeError::ValidationMismatch {
                        row,
                        col,
                        actual,
                        expected,
                    });
                }
            }
        }
        for (c, (rhs, reference)) in contribution.rhs.iter().zip(reference.rhs.iter()).enumerate() {
            let floor = reference.amax().max(f64::MIN_POSITIVE) * 1e-9;
            for row in 0..reference.len() {
                let (actual, expected) = (rhs[row], reference[row]);
                if (actual - expected).abs() > VALIDATION_TOLERANCE * expected.abs().max(floor) {
                    return Err(RuntimeError::ValidationMismatch {
                        row,
                        col: c,
                        actual,
                        expected,
                    });
                }
            }
        }
        log::debug!("Reflectance matrix validated against dense reference.");
        Ok(())
    }
}
