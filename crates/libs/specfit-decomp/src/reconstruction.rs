use crate::{
    decomposition::{BasisOrigin, SpecularDecomposition},
    material::MaterialBasis,
    matrix_builder::ReflectanceMatrixBuilder,
    reflectance::ReflectanceData,
};
use base::{
    error::{RuntimeError, SpecFitError},
    progress::{ProgressCounter, ProgressMonitor},
    Channel,
};
use optim::{MatrixSystem, OptimizedFunctions};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Reconstructs the basis BRDFs of a decomposition from all views, keeping
/// the texel weights fixed.
#[derive(Debug, Copy, Clone)]
pub struct BrdfReconstruction {
    nnls_tolerance_scale: f64,
    validate: bool,
}

impl BrdfReconstruction {
    /// Creates a reconstruction pass.
    ///
    /// # Arguments
    ///
    /// * `nnls_tolerance_scale` - Scale applied to the median right-hand
    ///   side entry to obtain the NNLS tolerance.
    /// * `validate` - Whether every view's contribution is checked against
    ///   a dense reference computation.
    pub fn new(nnls_tolerance_scale: f64, validate: bool) -> Self {
        Self {
            nnls_tolerance_scale,
            validate,
        }
    }

    /// Runs the reconstruction.
    ///
    /// Views are accumulated in parallel and merged. The merged system is
    /// solved with NNLS per channel and the solution is written into the
    /// decomposition's basis; materials whose solution is entirely zero are
    /// left untouched. On error the decomposition is not modified.
    pub fn execute<V: ReflectanceData>(
        &self,
        views: &[V],
        decomposition: &mut SpecularDecomposition,
        progress: &dyn ProgressMonitor,
    ) -> Result<(), SpecFitError> {
        if decomposition.origin() != BasisOrigin::FromScratch {
            return Err(SpecFitError::from_runtime_error(
                RuntimeError::BasisNotReconstructible,
                "Failed to reconstruct basis BRDFs",
            ));
        }
        check_view_sizes(views, decomposition.texel_count())?;

        let basis_count = decomposition.basis_count();
        let basis = decomposition.basis_functions();
        let size = basis_count * (basis.resolution() + 1);

        log::info!("Building reflectance fitting matrix...");
        let counter = ProgressCounter::new(views.len(), progress);
        let shared: &SpecularDecomposition = decomposition;
        let system = views
            .par_iter()
            .enumerate()
            .map(|(i, view)| {
                let mut contribution = MatrixSystem::new(size, Channel::COUNT);
                ReflectanceMatrixBuilder::new(view, shared, basis)
                    .with_validation(self.validate)
                    .execute(&mut contribution)
                    .map_err(|err| {
                        SpecFitError::from_runtime_error(
                            err,
                            format!("Failed to build reflectance matrix of view {}", i),
                        )
                    })?;
                let done = counter.increment("Building reflectance fitting matrix");
                log::info!("Finished view {} ({}/{}).", i, done, counter.total());
                Ok(contribution)
            })
            .try_reduce(
                || MatrixSystem::new(size, Channel::COUNT),
                |a, b| Ok(a.merged(b)),
            )?;
        log::info!("Finished building matrix; solving now...");

        for (c, rhs) in system.rhs.iter().enumerate() {
            log::debug!("RHS, channel {}: {}", c, rhs.transpose());
        }

        let solution =
            OptimizedFunctions::solve_system_non_negative(&system, basis_count, self.nnls_tolerance_scale)
                .map_err(|err| {
                    SpecFitError::new(
                        "Failed to solve the basis reconstruction system",
                        Some(Box::new(err)),
                    )
                })?;

        let mut updated = decomposition.material_basis().clone();
        for b in 0..basis_count {
            if !solution.is_instance_non_zero(b) {
                log::debug!("Basis {} received no contribution; keeping previous BRDF.", b);
                continue;
            }
            let mut diffuse = [0.0; Channel::COUNT];
            for channel in Channel::ALL {
                diffuse[channel.index()] = PI * solution.true_constant_term(&basis, b, channel.index());
                let curve = solution.evaluate_non_constant(&basis, b, channel.index());
                updated.set_specular_curve(channel, b, &curve);
            }
            updated.set_diffuse_color(b, diffuse.into());
            log::debug!(
                "Basis {}: diffuse albedo {:?}, specular peak {:?}",
                b,
                updated.diffuse_color(b),
                updated.specular_color(b, 0)
            );
        }
        decomposition.set_material_basis(updated);

        log::info!("DONE!");
        Ok(())
    }
}

/// Checks that every view has one record per texel.
pub(crate) fn check_view_sizes<V: ReflectanceData>(
    views: &[V],
    texel_count: usize,
) -> Result<(), SpecFitError> {
    match views.iter().find(|view| view.size() != texel_count) {
        Some(view) => Err(SpecFitError::from_runtime_error(
            RuntimeError::ReflectanceSizeMismatch {
                expected: texel_count,
                actual: view.size(),
            },
            "Reflectance data does not match the texture resolution",
        )),
        None => Ok(()),
    }
}
