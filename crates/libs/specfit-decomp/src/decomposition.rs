use crate::material::{MaterialBasis, SimpleMaterialBasis};
use base::{
    error::SpecFitError,
    math::DVec3,
    settings::{SpecularBasisSettings, TextureResolution},
};
use optim::StepBasis;
use std::path::Path;

/// Read-only access to the per-texel mixing weights.
pub trait TexelWeights: Sync {
    /// Number of weights per texel.
    fn weight_count(&self) -> usize;

    /// Mixing weights of texel `p`.
    fn texel_weights(&self, p: usize) -> &[f64];
}

/// Where the material basis of a decomposition comes from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BasisOrigin {
    /// The basis is reconstructed from the observations.
    FromScratch,
    /// The basis was fitted beforehand; only the weights are optimised.
    FromExistingBasis,
}

/// Per-texel mixing weights over a set of basis materials.
///
/// Each texel carries a weight vector and a validity flag. All texels start
/// invalid; a texel becomes valid once a weight solve saw at least one
/// observation of it (or once hole filling assigned it an estimate).
#[derive(Debug, Clone)]
pub struct SpecularDecomposition {
    origin: BasisOrigin,
    texture: TextureResolution,
    metallicity: f64,
    basis: SimpleMaterialBasis,
    /// Weights laid out as `[p][b]`.
    weights: Box<[f64]>,
    validity: Box<[bool]>,
}

impl SpecularDecomposition {
    /// Creates a decomposition whose basis will be reconstructed from the
    /// observations. Basis materials start black and weights zero.
    pub fn from_scratch(texture: TextureResolution, settings: &SpecularBasisSettings) -> Self {
        let basis = SimpleMaterialBasis::new(settings.basis_count, settings.basis_resolution);
        Self::with_basis(BasisOrigin::FromScratch, texture, settings.metallicity, basis)
    }

    /// Creates a decomposition over an existing basis.
    pub fn from_existing_basis<M: MaterialBasis + ?Sized>(
        texture: TextureResolution,
        basis: &M,
        metallicity: f64,
    ) -> Self {
        Self::with_basis(
            BasisOrigin::FromExistingBasis,
            texture,
            metallicity.clamp(0.0, 1.0),
            SimpleMaterialBasis::from_basis(basis),
        )
    }

    fn with_basis(
        origin: BasisOrigin,
        texture: TextureResolution,
        metallicity: f64,
        basis: SimpleMaterialBasis,
    ) -> Self {
        let texel_count = texture.texel_count();
        let weights = vec![0.0; texel_count * basis.material_count()].into_boxed_slice();
        Self {
            origin,
            texture,
            metallicity,
            basis,
            weights,
            validity: vec![false; texel_count].into_boxed_slice(),
        }
    }

    /// Where the basis comes from.
    pub fn origin(&self) -> BasisOrigin { self.origin }

    /// Texture-space resolution.
    pub fn texture(&self) -> TextureResolution { self.texture }

    /// Total number of texels.
    pub fn texel_count(&self) -> usize { self.validity.len() }

    /// Number of basis materials.
    pub fn basis_count(&self) -> usize { self.basis.material_count() }

    /// Number of specular steps of the basis.
    pub fn specular_resolution(&self) -> usize { self.basis.specular_resolution() }

    /// Metallicity of the basis materials.
    pub fn metallicity(&self) -> f64 { self.metallicity }

    /// Step functions used to reconstruct the specular curves.
    pub fn basis_functions(&self) -> StepBasis {
        StepBasis::new(self.specular_resolution(), self.metallicity)
    }

    /// Current material basis.
    pub fn material_basis(&self) -> &SimpleMaterialBasis { &self.basis }

    /// Replaces the material basis wholesale.
    pub(crate) fn set_material_basis(&mut self, basis: SimpleMaterialBasis) {
        debug_assert_eq!(basis.material_count(), self.basis.material_count());
        debug_assert_eq!(basis.specular_resolution(), self.basis.specular_resolution());
        self.basis = basis;
    }

    /// Mixing weights of texel `p`.
    pub fn weights(&self, p: usize) -> &[f64] {
        let n = self.basis_count();
        &self.weights[p * n..(p + 1) * n]
    }

    /// Weight of material `b` at texel `p`.
    pub fn weight(&self, b: usize, p: usize) -> f64 { self.weights[p * self.basis_count() + b] }

    /// Overwrites the mixing weights of texel `p`.
    pub fn set_weights(&mut self, p: usize, weights: &[f64]) {
        let n = self.basis_count();
        self.weights[p * n..(p + 1) * n].copy_from_slice(weights);
    }

    /// Overwrites the weight of material `b` at texel `p`.
    pub fn set_weight(&mut self, b: usize, p: usize, weight: f64) {
        let n = self.basis_count();
        self.weights[p * n + b] = weight;
    }

    /// Whether texel `p` holds a valid weight estimate.
    pub fn are_weights_valid(&self, p: usize) -> bool { self.validity[p] }

    /// Sets the validity of texel `p`.
    pub fn set_weights_validity(&mut self, p: usize, valid: bool) { self.validity[p] = valid; }

    /// Marks every texel invalid; weights are kept.
    pub fn invalidate_weights(&mut self) { self.validity.fill(false); }

    /// Number of valid texels.
    pub fn valid_count(&self) -> usize { self.validity.iter().filter(|v| **v).count() }

    /// Diffuse albedo of texel `p`, blended by its mixing weights.
    pub fn blended_diffuse(&self, p: usize) -> DVec3 {
        self.weights(p)
            .iter()
            .enumerate()
            .fold(DVec3::ZERO, |acc, (b, w)| acc + *w * self.basis.diffuse_color(b))
    }

    /// Saves the material basis and the weights into a directory.
    pub fn save(&self, dir: &Path) -> Result<(), SpecFitError> {
        self.basis.save(dir)?;
        crate::io::save_weights(self, dir)
    }
}

impl TexelWeights for SpecularDecomposition {
    fn weight_count(&self) -> usize { self.basis_count() }

    fn texel_weights(&self, p: usize) -> &[f64] { self.weights(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decomposition_weights_and_validity() {
        let mut decomposition = SpecularDecomposition::from_scratch(
            TextureResolution::new(2, 2),
            &SpecularBasisSettings::new(3, 4, 0.0),
        );
        assert_eq!(decomposition.origin(), BasisOrigin::FromScratch);
        assert_eq!(decomposition.texel_count(), 4);
        assert_eq!(decomposition.valid_count(), 0);

        decomposition.set_weights(2, &[0.2, 0.3, 0.5]);
        decomposition.set_weights_validity(2, true);
        assert_eq!(decomposition.weight(1, 2), 0.3);
        assert_eq!(decomposition.texel_weights(2), &[0.2, 0.3, 0.5]);
        assert_eq!(decomposition.weights(1), &[0.0; 3]);
        assert!(decomposition.are_weights_valid(2));

        decomposition.invalidate_weights();
        assert_eq!(decomposition.valid_count(), 0);
        assert_eq!(decomposition.weights(2), &[0.2, 0.3, 0.5]);
    }

    #[test]
    fn test_blended_diffuse() {
        let mut basis = SimpleMaterialBasis::new(2, 2);
        basis.set_diffuse_color(0, DVec3::new(1.0, 0.0, 0.0));
        basis.set_diffuse_color(1, DVec3::new(0.0, 0.0, 1.0));
        let mut decomposition =
            SpecularDecomposition::from_existing_basis(TextureResolution::new(1, 1), &basis, 0.0);
        assert_eq!(decomposition.origin(), BasisOrigin::FromExistingBasis);
        decomposition.set_weights(0, &[0.25, 0.75]);
        assert_eq!(decomposition.blended_diffuse(0), DVec3::new(0.25, 0.0, 0.75));
    }
}
