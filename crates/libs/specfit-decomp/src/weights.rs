use crate::{
    decomposition::SpecularDecomposition,
    material::MaterialBasis,
    reconstruction::check_view_sizes,
    reflectance::ReflectanceData,
};
use base::{
    error::SpecFitError,
    math::{median_positive, DVec3, INV_PI},
    progress::{ProgressCounter, ProgressMonitor},
};
use nalgebra::{DMatrix, DVector};
use optim::nnls;
use rayon::prelude::*;

/// Predicts reflectance as a mix of basis materials and accumulates the
/// per-texel least squares problem of the mixing weights.
pub struct SpecularWeightModel<'a, M: MaterialBasis + ?Sized> {
    basis: &'a M,
    metallicity: f64,
}

impl<'a, M: MaterialBasis + ?Sized> SpecularWeightModel<'a, M> {
    /// Creates a model over a fixed material basis.
    pub fn new(basis: &'a M, metallicity: f64) -> Self { Self { basis, metallicity } }

    /// Number of basis materials.
    pub fn basis_count(&self) -> usize { self.basis.material_count() }

    /// Reflectance of material `b` for an observation.
    ///
    /// The specular curve is linearly interpolated between the two buckets
    /// around `halfway * resolution`. Beyond the last bucket the last
    /// sample is used for metallic materials, and only the diffuse term
    /// remains otherwise.
    pub fn feature(&self, b: usize, halfway: f64, geom_ratio: f64) -> DVec3 {
        let r = self.basis.specular_resolution();
        let diffuse = self.basis.diffuse_color(b) * INV_PI;
        let m_exact = (halfway * r as f64).max(0.0);
        let m1 = m_exact.floor() as usize;
        if m1 < r {
            let t = m_exact - m1 as f64;
            let specular =
                (1.0 - t) * self.basis.specular_color(b, m1) + t * self.basis.specular_color(b, m1 + 1);
            diffuse + specular * geom_ratio
        } else if self.metallicity > 0.0 {
            diffuse + self.basis.specular_color(b, r) * geom_ratio
        } else {
            diffuse
        }
    }

    /// Reflectance of every basis material for an observation.
    pub fn features(&self, halfway: f64, geom_ratio: f64) -> Vec<DVec3> {
        (0..self.basis_count())
            .map(|b| self.feature(b, halfway, geom_ratio))
            .collect()
    }

    /// Predicted reflectance of a texel with the given mixing weights.
    pub fn predict(&self, weights: &[f64], halfway: f64, geom_ratio: f64) -> DVec3 {
        weights
            .iter()
            .enumerate()
            .filter(|(_, w)| **w != 0.0)
            .fold(DVec3::ZERO, |acc, (b, w)| acc + *w * self.feature(b, halfway, geom_ratio))
    }

    /// Adds the observation of texel `p` in a view to the normal equations
    /// `QᵀQ w = Qᵀy` of the texel's weights.
    ///
    /// Returns whether the texel is visible in the view; invisible texels
    /// do not contribute.
    pub fn accumulate<R: ReflectanceData + ?Sized>(
        &self,
        view: &R,
        p: usize,
        qtq: &mut DMatrix<f64>,
        qty: &mut DVector<f64>,
    ) -> bool {
        if !view.is_visible(p) {
            return false;
        }
        let n = self.basis_count();
        let halfway = view.halfway_index(p) as f64;
        let geom_ratio = view.geom_ratio(p) as f64;
        let weight = view.additional_weight(p) as f64;
        let observed = view.color(p);
        let features = self.features(halfway, geom_ratio);
        for b1 in 0..n {
            qty[b1] += weight * features[b1].dot(observed);
            for b2 in 0..n {
                qtq[(b1, b2)] += weight * features[b1].dot(features[b2]);
            }
        }
        true
    }
}

/// Outcome of the weight solve of one texel.
#[derive(Debug, Clone, PartialEq)]
enum TexelOutcome {
    /// No view observed the texel.
    Unobserved,
    /// The weights were solved.
    Solved(Vec<f64>),
    /// The texel was observed but its system could not be solved.
    Failed,
}

/// Summary of a weight optimisation pass.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct WeightOptimizationReport {
    /// Texels whose weights were solved.
    pub solved: usize,
    /// Observed texels whose solve failed; they keep their previous weights.
    pub failed: usize,
    /// Texels without any visible observation.
    pub unobserved: usize,
}

/// Optimises the per-texel mixing weights for a fixed material basis.
///
/// Every texel solves a small NNLS problem constrained to weights summing
/// to one. Texels are processed in blocks; texels within a block are solved
/// in parallel.
#[derive(Debug, Copy, Clone)]
pub struct SpecularWeightOptimization {
    block_size: usize,
    nnls_tolerance_scale: f64,
}

impl SpecularWeightOptimization {
    /// Creates a weight optimisation pass with the given block size (at
    /// least one texel) and NNLS tolerance scale.
    pub fn new(block_size: usize, nnls_tolerance_scale: f64) -> Self {
        Self {
            block_size: block_size.max(1),
            nnls_tolerance_scale,
        }
    }

    /// Runs the optimisation.
    ///
    /// All texels are invalidated first; each texel observed by at least one
    /// view becomes valid again. Texels never observed keep their previous
    /// weights.
    pub fn execute<V: ReflectanceData>(
        &self,
        views: &[V],
        decomposition: &mut SpecularDecomposition,
        progress: &dyn ProgressMonitor,
    ) -> Result<WeightOptimizationReport, SpecFitError> {
        check_view_sizes(views, decomposition.texel_count())?;
        let basis = decomposition.material_basis().clone();
        let model = SpecularWeightModel::new(&basis, decomposition.metallicity());
        let texel_count = decomposition.texel_count();

        decomposition.invalidate_weights();

        log::info!(
            "Optimizing weights of {} texels in blocks of {}...",
            texel_count,
            self.block_size
        );
        let counter = ProgressCounter::new(texel_count.div_ceil(self.block_size), progress);
        let mut report = WeightOptimizationReport::default();
        for start in (0..texel_count).step_by(self.block_size) {
            let end = (start + self.block_size).min(texel_count);
            let outcomes = (start..end)
                .into_par_iter()
                .map(|p| self.solve_texel(&model, views, p))
                .collect::<Vec<_>>();

            for (p, outcome) in (start..end).zip(outcomes) {
                match outcome {
                    TexelOutcome::Unobserved => report.unobserved += 1,
                    TexelOutcome::Solved(weights) => {
                        decomposition.set_weights(p, &weights);
                        decomposition.set_weights_validity(p, true);
                        report.solved += 1;
                    },
                    TexelOutcome::Failed => {
                        decomposition.set_weights_validity(p, true);
                        report.failed += 1;
                    },
                }
            }
            counter.increment("Optimizing weights");
        }

        if report.failed > 0 {
            log::warn!(
                "Weight solve failed for {} texels; previous weights kept.",
                report.failed
            );
        }
        log::info!(
            "Weights optimized: {} solved, {} unobserved.",
            report.solved,
            report.unobserved
        );
        Ok(report)
    }

    fn solve_texel<M, V>(&self, model: &SpecularWeightModel<M>, views: &[V], p: usize) -> TexelOutcome
    where
        M: MaterialBasis + ?Sized,
        V: ReflectanceData,
    {
        let n = model.basis_count();
        // One extra row and column for the sum-to-one constraint.
        let mut qtq = DMatrix::zeros(n + 1, n + 1);
        let mut qty = DVector::zeros(n + 1);
        let mut observed = false;
        for view in views {
            observed |= model.accumulate(view, p, &mut qtq, &mut qty);
        }
        if !observed {
            return TexelOutcome::Unobserved;
        }

        for b in 0..n {
            qtq[(n, b)] = 1.0;
            qtq[(b, n)] = 1.0;
        }
        qty[n] = 1.0;

        let tolerance = self.nnls_tolerance_scale
            * median_positive(qty.rows(0, n).iter().copied()).unwrap_or(1.0);
        match nnls::solve_premultiplied_with_equality_constraints(&qtq, &qty, tolerance, 1) {
            // Drop the Lagrange multiplier.
            Ok(solution) => TexelOutcome::Solved(solution.rows(0, n).iter().copied().collect()),
            Err(err) => {
                log::debug!("Weight solve of texel {} failed: {}", p, err);
                TexelOutcome::Failed
            },
        }
    }
}
