use crate::{
    clustering::initialize_clusters,
    decomposition::SpecularDecomposition,
    error_calc::{FitError, FitErrorCalculator},
    hole_fill::HoleFillReport,
    material::MaterialBasis,
    reconstruction::BrdfReconstruction,
    reflectance::ReflectanceData,
    weights::SpecularWeightOptimization,
};
use base::{
    error::{RuntimeError, SpecFitError},
    progress::ProgressMonitor,
    settings::SpecularFitSettings,
};

/// Outcome of a full decomposition run.
#[derive(Debug, Clone)]
pub struct SpecularFitReport {
    /// The fitted basis and weights.
    pub decomposition: SpecularDecomposition,
    /// Fit error after every iteration.
    pub error_history: Vec<FitError>,
    /// Number of basis/weight alternations run.
    pub iterations: usize,
    /// Result of the final hole filling.
    pub hole_fill: HoleFillReport,
}

impl SpecularFitReport {
    /// Error after the last iteration.
    pub fn final_error(&self) -> Option<FitError> { self.error_history.last().copied() }
}

/// Drives the decomposition: alternates basis reconstruction and weight
/// optimisation until the fit error stops improving, then fills the texels
/// that were never observed.
#[derive(Debug, Clone)]
pub struct SpecularFitProcess {
    settings: SpecularFitSettings,
}

impl SpecularFitProcess {
    /// Creates a fitting process; fails if the settings are invalid.
    pub fn new(settings: SpecularFitSettings) -> Result<Self, SpecFitError> {
        settings.validate().map_err(|err| {
            SpecFitError::from_runtime_error(err, "Cannot start the specular fit")
        })?;
        Ok(Self { settings })
    }

    /// Settings of the process.
    pub fn settings(&self) -> &SpecularFitSettings { &self.settings }

    fn reconstruction(&self) -> BrdfReconstruction {
        BrdfReconstruction::new(self.settings.nnls_tolerance_scale, self.settings.validate_matrices)
    }

    fn weight_optimization(&self) -> SpecularWeightOptimization {
        SpecularWeightOptimization::new(
            self.settings.weight_block_size(),
            self.settings.nnls_tolerance_scale,
        )
    }

    /// Fits both the material basis and the weights.
    ///
    /// Weights are initialised by clustering the observed colours. With a
    /// single basis material the weights are fixed to one and a single
    /// reconstruction is run.
    pub fn optimize_from_scratch<V: ReflectanceData>(
        &self,
        views: &[V],
        progress: &dyn ProgressMonitor,
    ) -> Result<SpecularFitReport, SpecFitError> {
        let settings = &self.settings;
        log::info!(
            "Specular fit from scratch: {} views, {}x{} texels, {} basis functions of resolution {}",
            views.len(),
            settings.texture.width,
            settings.texture.height,
            settings.basis.basis_count,
            settings.basis.basis_resolution
        );
        let mut decomposition = SpecularDecomposition::from_scratch(settings.texture, &settings.basis);

        progress.set_stage(0, "Initializing weights");
        initialize_clusters(views, &mut decomposition, settings.clustering_seed)?;

        let mut error_history: Vec<FitError> = Vec::new();
        let mut iterations = 0;
        while iterations < settings.max_iterations {
            iterations += 1;
            log::info!("Iteration {}", iterations);

            progress.set_stage(1, "Reconstructing basis");
            self.reconstruction().execute(views, &mut decomposition, progress)?;

            if decomposition.basis_count() > 1 {
                progress.set_stage(2, "Optimizing weights");
                self.weight_optimization().execute(views, &mut decomposition, progress)?;
            }

            let error = FitErrorCalculator::calculate(views, &decomposition)?;
            let converged = match error_history.last() {
                Some(previous) => !error.improves_on(previous, settings.convergence_tolerance),
                None => false,
            };
            error_history.push(error);
            if decomposition.basis_count() == 1 || converged {
                break;
            }
        }

        Ok(self.finish(decomposition, error_history, iterations, progress))
    }

    /// Fits the weights against a previously fitted material basis; the
    /// basis itself is not modified.
    pub fn optimize_from_existing_basis<V, M>(
        &self,
        views: &[V],
        basis: &M,
        progress: &dyn ProgressMonitor,
    ) -> Result<SpecularFitReport, SpecFitError>
    where
        V: ReflectanceData,
        M: MaterialBasis + ?Sized,
    {
        let settings = &self.settings;
        if basis.material_count() == 0 {
            return Err(SpecFitError::from_runtime_error(
                RuntimeError::InvalidSettings(String::from("the existing basis is empty")),
                "Cannot fit weights",
            ));
        }
        if basis.material_count() != settings.basis.basis_count
            || basis.specular_resolution() != settings.basis.basis_resolution
        {
            log::warn!(
                "Existing basis has {} functions of resolution {}; settings ask for {} of resolution {}. Using the basis as is.",
                basis.material_count(),
                basis.specular_resolution(),
                settings.basis.basis_count,
                settings.basis.basis_resolution
            );
        }
        let mut decomposition =
            SpecularDecomposition::from_existing_basis(settings.texture, basis, settings.basis.metallicity);

        progress.set_stage(0, "Optimizing weights");
        self.weight_optimization().execute(views, &mut decomposition, progress)?;
        let error = FitErrorCalculator::calculate(views, &decomposition)?;

        Ok(self.finish(decomposition, vec![error], 1, progress))
    }

    fn finish(
        &self,
        mut decomposition: SpecularDecomposition,
        error_history: Vec<FitError>,
        iterations: usize,
        progress: &dyn ProgressMonitor,
    ) -> SpecularFitReport {
        progress.set_stage(3, "Filling holes");
        log::info!("Filling holes...");
        let hole_fill = decomposition.fill_holes();
        progress.complete();
        log::info!(
            "Specular fit finished after {} iterations; {} of {} texels valid.",
            iterations,
            decomposition.valid_count(),
            decomposition.texel_count()
        );
        SpecularFitReport {
            decomposition,
            error_history,
            iterations,
            hole_fill,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        reflectance::ReflectanceSamples,
        synthetic::{demo_basis, CaptureOptions, SyntheticCapture},
    };
    use base::{
        math::DVec3,
        progress::NoProgress,
        settings::{SpecularBasisSettings, TextureResolution},
        Channel,
    };

    fn single_material_capture(texture: TextureResolution, resolution: usize) -> SyntheticCapture {
        let mut basis = crate::material::SimpleMaterialBasis::new(1, resolution);
        basis.set_diffuse_color(0, DVec3::splat(0.5));
        let mut curve = vec![0.3; resolution + 1];
        curve[resolution] = 0.0;
        for channel in Channel::ALL {
            basis.set_specular_curve(channel, 0, &curve);
        }
        SyntheticCapture::new(texture, basis, 0.0)
    }

    #[test]
    fn test_single_material_recovered() {
        let texture = TextureResolution::new(6, 5);
        let resolution = 8;
        let capture = single_material_capture(texture, resolution);
        let views = capture.render(&CaptureOptions {
            view_count: 6,
            visibility: 0.7,
            max_halfway: (resolution - 1) as f64 / resolution as f64,
            seed: 3,
            ..Default::default()
        });

        let settings = SpecularFitSettings::new(texture, SpecularBasisSettings::new(1, resolution, 0.0));
        let report = SpecularFitProcess::new(settings)
            .unwrap()
            .optimize_from_scratch(&views, &NoProgress)
            .unwrap();

        assert_eq!(report.iterations, 1);
        let decomposition = &report.decomposition;
        let basis = decomposition.material_basis();
        for c in 0..3 {
            assert!((basis.diffuse_color(0)[c] - 0.5).abs() < 0.01);
        }
        for p in 0..texture.texel_count() {
            assert!(decomposition.are_weights_valid(p));
            assert!((decomposition.weight(0, p) - 1.0).abs() < 1e-9);
        }
        assert!(report.final_error().unwrap().rmse < 1e-4);
    }

    #[test]
    fn test_metallic_material_recovered() {
        let texture = TextureResolution::new(6, 5);
        let resolution = 8;
        let metallicity = 0.5;
        let truth = demo_basis(1, resolution, metallicity);
        let capture = SyntheticCapture::new(texture, truth.clone(), metallicity);
        let views = capture.render(&CaptureOptions {
            view_count: 8,
            visibility: 0.8,
            seed: 3,
            ..Default::default()
        });

        let settings =
            SpecularFitSettings::new(texture, SpecularBasisSettings::new(1, resolution, metallicity));
        let report = SpecularFitProcess::new(settings)
            .unwrap()
            .optimize_from_scratch(&views, &NoProgress)
            .unwrap();

        let basis = report.decomposition.material_basis();
        for c in 0..3 {
            assert!((basis.diffuse_color(0)[c] - truth.diffuse_color(0)[c]).abs() < 1e-3);
        }
        for channel in Channel::ALL {
            let fitted = basis.specular_curve(channel, 0);
            let expected = truth.specular_curve(channel, 0);
            assert_eq!(fitted.len(), resolution + 1);
            for (f, e) in fitted.iter().zip(expected) {
                assert!((f - e).abs() < 1e-3, "{:?}: {} vs {}", channel, f, e);
            }
            // The tail is tied to the diffuse albedo through the metallicity.
            let tail = metallicity * truth.diffuse_color(0)[channel.index()] * base::math::INV_PI
                / (1.0 - metallicity);
            assert!((fitted[resolution] - tail).abs() < 1e-3);
        }
        assert!(report.final_error().unwrap().rmse < 1e-4);
    }

    #[test]
    fn test_two_materials_error_never_increases() {
        let texture = TextureResolution::new(8, 4);
        let resolution = 6;
        let capture = SyntheticCapture::striped(texture, demo_basis(2, resolution, 0.0), 0.0);
        let views = capture.render(&CaptureOptions {
            view_count: 12,
            visibility: 0.8,
            seed: 5,
            ..Default::default()
        });

        let mut settings =
            SpecularFitSettings::new(texture, SpecularBasisSettings::new(2, resolution, 0.0));
        settings.max_iterations = 4;
        settings.weight_block_size = Some(7);
        let report = SpecularFitProcess::new(settings)
            .unwrap()
            .optimize_from_scratch(&views, &NoProgress)
            .unwrap();

        assert!(report.iterations >= 1 && report.iterations <= 4);
        assert_eq!(report.error_history.len(), report.iterations);
        assert_eq!(report.decomposition.valid_count(), texture.texel_count());
        for p in 0..texture.texel_count() {
            let w = report.decomposition.weights(p);
            assert!(w.iter().all(|v| *v >= 0.0));
            assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        }
        // Each half step minimises the same weighted error.
        for pair in report.error_history.windows(2) {
            assert!(pair[1].rmse <= pair[0].rmse + 1e-6);
        }
    }

    #[test]
    fn test_existing_basis_keeps_basis_and_fills_holes() {
        let texture = TextureResolution::new(4, 4);
        let basis = demo_basis(2, 5, 0.0);
        let mut capture = SyntheticCapture::striped(texture, basis.clone(), 0.0);
        capture.set_weights(5, &[0.4, 0.6]);
        let mut views = capture.render(&CaptureOptions {
            view_count: 8,
            visibility: 1.0,
            seed: 9,
            ..Default::default()
        });
        // Texel 10 is never observed.
        for view in views.iter_mut() {
            view.set(10, crate::reflectance::ReflectanceSample::INVISIBLE);
        }

        let settings = SpecularFitSettings::new(texture, SpecularBasisSettings::new(2, 5, 0.0));
        let report = SpecularFitProcess::new(settings)
            .unwrap()
            .optimize_from_existing_basis(&views, &basis, &NoProgress)
            .unwrap();

        let decomposition = &report.decomposition;
        assert_eq!(decomposition.material_basis(), &basis);
        assert_eq!(report.hole_fill.filled, 1);
        assert!(decomposition.are_weights_valid(10));
        assert!((decomposition.weight(0, 5) - 0.4).abs() < 1e-4);
        assert!((decomposition.weight(1, 5) - 0.6).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = SpecularFitSettings::new(
            TextureResolution::new(4, 4),
            SpecularBasisSettings::new(0, 5, 0.0),
        );
        assert!(SpecularFitProcess::new(settings).is_err());
    }

    #[test]
    fn test_no_observations() {
        let texture = TextureResolution::new(2, 2);
        let views = vec![ReflectanceSamples::new(4)];
        let settings = SpecularFitSettings::new(texture, SpecularBasisSettings::new(1, 4, 0.0));
        let err = SpecularFitProcess::new(settings)
            .unwrap()
            .optimize_from_scratch(&views, &NoProgress)
            .unwrap_err();
        assert!(matches!(err.cause::<RuntimeError>(), Some(RuntimeError::NoVisibleSamples)));
    }
}
