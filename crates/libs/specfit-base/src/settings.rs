//! Settings of a specular decomposition run.
//!
//! Settings are plain values passed explicitly to the fitting pipeline; they
//! can be loaded from and saved to TOML files.

use crate::error::{RuntimeError, SpecFitError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Resolution of the texture-space grid on which weights are solved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureResolution {
    /// Number of texel columns.
    pub width: usize,
    /// Number of texel rows.
    pub height: usize,
}

impl TextureResolution {
    /// Creates a new texture resolution.
    pub const fn new(width: usize, height: usize) -> Self { Self { width, height } }

    /// Total number of texels.
    pub const fn texel_count(&self) -> usize { self.width * self.height }
}

impl Default for TextureResolution {
    fn default() -> Self { Self::new(512, 512) }
}

/// Shape of the material basis.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecularBasisSettings {
    /// Number of basis materials.
    pub basis_count: usize,
    /// Number of discretised microfacet-angle steps; every specular curve
    /// holds `basis_resolution + 1` samples.
    pub basis_resolution: usize,
    /// Blend between a fully diffuse (0) and a fully specular-driven (1)
    /// diffuse attenuation.
    pub metallicity: f64,
}

impl SpecularBasisSettings {
    /// Creates basis settings, clamping the metallicity into `[0, 1]`.
    pub fn new(basis_count: usize, basis_resolution: usize, metallicity: f64) -> Self {
        Self {
            basis_count,
            basis_resolution,
            metallicity: metallicity.clamp(0.0, 1.0),
        }
    }

    /// Number of unknowns of the basis reconstruction system:
    /// `basis_count * (basis_resolution + 1)`.
    pub const fn system_size(&self) -> usize { self.basis_count * (self.basis_resolution + 1) }
}

impl Default for SpecularBasisSettings {
    fn default() -> Self { Self::new(8, 90, 0.0) }
}

fn default_max_iterations() -> usize { 10 }

fn default_convergence_tolerance() -> f64 { 1e-4 }

fn default_nnls_tolerance_scale() -> f64 { 1e-12 }

/// Options of a specular decomposition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecularFitSettings {
    /// Maximum number of basis/weight alternations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// The alternation stops once the error improves by no more than this.
    #[serde(default = "default_convergence_tolerance")]
    pub convergence_tolerance: f64,

    /// Number of texels solved together during weight optimisation.
    /// If not set, the whole texture is one block.
    #[serde(default)]
    pub weight_block_size: Option<usize>,

    /// Scale applied to the median right-hand side to obtain the NNLS
    /// tolerance.
    #[serde(default = "default_nnls_tolerance_scale")]
    pub nnls_tolerance_scale: f64,

    /// Whether to check every accumulated system against a dense reference.
    /// Very slow; meant for debugging.
    #[serde(default)]
    pub validate_matrices: bool,

    /// Seed of the random generator used to initialise the clustering.
    #[serde(default)]
    pub clustering_seed: u64,

    /// Texture-space resolution.
    pub texture: TextureResolution,

    /// Shape of the material basis.
    pub basis: SpecularBasisSettings,
}

impl Default for SpecularFitSettings {
    fn default() -> Self {
        Self {
            texture: TextureResolution::default(),
            basis: SpecularBasisSettings::default(),
            max_iterations: default_max_iterations(),
            convergence_tolerance: default_convergence_tolerance(),
            weight_block_size: None,
            nnls_tolerance_scale: default_nnls_tolerance_scale(),
            validate_matrices: false,
            clustering_seed: 0,
        }
    }
}

impl SpecularFitSettings {
    /// Creates settings with default options for the given texture and basis
    /// shape.
    pub fn new(texture: TextureResolution, basis: SpecularBasisSettings) -> Self {
        Self {
            texture,
            basis,
            ..Default::default()
        }
    }

    /// Effective number of texels per weight optimisation block.
    pub fn weight_block_size(&self) -> usize {
        self.weight_block_size
            .unwrap_or(self.texture.texel_count())
            .clamp(1, self.texture.texel_count().max(1))
    }

    /// Checks that the settings describe a solvable problem.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        let invalid = |reason: &str| Err(RuntimeError::InvalidSettings(reason.to_string()));
        if self.texture.texel_count() == 0 {
            return invalid("texture resolution must be non-zero");
        }
        if self.basis.basis_count == 0 {
            return invalid("basis count must be at least 1");
        }
        if self.basis.basis_resolution == 0 {
            return invalid("basis resolution must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.basis.metallicity) {
            return invalid("metallicity must lie in [0, 1]");
        }
        if self.weight_block_size == Some(0) {
            return invalid("weight block size must be positive");
        }
        if self.nnls_tolerance_scale.is_nan() || self.nnls_tolerance_scale <= 0.0 {
            return invalid("NNLS tolerance scale must be positive");
        }
        if !(self.convergence_tolerance >= 0.0) {
            return invalid("convergence tolerance must not be negative");
        }
        Ok(())
    }

    /// Loads [`SpecularFitSettings`] from a .toml file.
    pub fn load(path: &Path) -> Result<Self, SpecFitError> {
        let string = std::fs::read_to_string(path).map_err(|err| {
            SpecFitError::from_io_error(
                err,
                format!("Failed to read fitting settings file: {}", path.display()),
            )
        })?;
        let settings: SpecularFitSettings = toml::from_str(&string).map_err(|err| {
            SpecFitError::from_runtime_error(
                RuntimeError::from(err),
                format!("Failed to parse fitting settings file: {}", path.display()),
            )
        })?;
        settings.validate().map_err(|err| {
            SpecFitError::from_runtime_error(
                err,
                format!("Invalid fitting settings in {}", path.display()),
            )
        })?;
        log::info!(
            "    - Texture resolution: {}x{}",
            settings.texture.width,
            settings.texture.height
        );
        log::info!(
            "    - Basis: {} materials, {} steps, metallicity {}",
            settings.basis.basis_count,
            settings.basis.basis_resolution,
            settings.basis.metallicity
        );
        log::info!("    - Max iterations: {}", settings.max_iterations);
        log::info!("    - Weight block size: {}", settings.weight_block_size());
        Ok(settings)
    }

    /// Saves the settings to a .toml file.
    pub fn save(&self, path: &Path) -> Result<(), SpecFitError> {
        let string = toml::to_string_pretty(self).map_err(|err| {
            SpecFitError::from_runtime_error(
                RuntimeError::from(err),
                "Failed to serialise fitting settings",
            )
        })?;
        std::fs::write(path, string).map_err(|err| {
            SpecFitError::from_io_error(
                err,
                format!("Failed to write fitting settings file: {}", path.display()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metallicity_clamped() {
        assert_eq!(SpecularBasisSettings::new(2, 4, 1.5).metallicity, 1.0);
        assert_eq!(SpecularBasisSettings::new(2, 4, -0.5).metallicity, 0.0);
        assert_eq!(SpecularBasisSettings::new(3, 4, 0.5).system_size(), 15);
    }

    #[test]
    fn test_weight_block_size() {
        let mut settings = SpecularFitSettings::new(
            TextureResolution::new(4, 3),
            SpecularBasisSettings::new(2, 4, 0.0),
        );
        assert_eq!(settings.weight_block_size(), 12);
        settings.weight_block_size = Some(5);
        assert_eq!(settings.weight_block_size(), 5);
        settings.weight_block_size = Some(100);
        assert_eq!(settings.weight_block_size(), 12);
    }

    #[test]
    fn test_validate() {
        let mut settings = SpecularFitSettings::default();
        assert!(settings.validate().is_ok());
        settings.basis.basis_count = 0;
        assert!(matches!(
            settings.validate(),
            Err(RuntimeError::InvalidSettings(_))
        ));
        settings.basis.basis_count = 2;
        settings.nnls_tolerance_scale = 0.0;
        assert!(settings.validate().is_err());
        settings.nnls_tolerance_scale = 1e-12;
        settings.convergence_tolerance = f64::NAN;
        assert!(settings.validate().is_err());
        settings.convergence_tolerance = -1.0;
        assert!(settings.validate().is_err());
        settings.convergence_tolerance = 0.0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_with_defaults() {
        let text = r#"
            [texture]
            width = 16
            height = 8

            [basis]
            basis_count = 4
            basis_resolution = 30
            metallicity = 0.25
        "#;
        let settings: SpecularFitSettings = toml::from_str(text).unwrap();
        assert_eq!(settings.texture, TextureResolution::new(16, 8));
        assert_eq!(settings.basis.basis_count, 4);
        assert_eq!(settings.max_iterations, 10);
        assert_eq!(settings.nnls_tolerance_scale, 1e-12);
        assert_eq!(settings.weight_block_size, None);
        assert!(!settings.validate_matrices);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("specfit.toml");
        let mut settings = SpecularFitSettings::default();
        settings.weight_block_size = Some(1024);
        settings.clustering_seed = 42;
        settings.save(&path).unwrap();
        let loaded = SpecularFitSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }
}
