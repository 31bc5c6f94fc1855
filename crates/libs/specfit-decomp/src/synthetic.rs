//! Synthetic captures rendered from known materials.
//!
//! Used to exercise the decomposition end to end without acquisition data.

use crate::{
    material::{MaterialBasis, SimpleMaterialBasis},
    reflectance::{ReflectanceSample, ReflectanceSamples},
    weights::SpecularWeightModel,
};
use base::{
    math::{DVec3, INV_PI},
    settings::TextureResolution,
    Channel,
};
use rand::{
    distributions::{Distribution, Uniform},
    Rng, SeedableRng,
};
use rand_chacha::ChaCha8Rng;

/// How observations of a synthetic capture are drawn.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CaptureOptions {
    /// Number of views.
    pub view_count: usize,
    /// Probability that a texel is visible in a view.
    pub visibility: f64,
    /// Upper bound (exclusive) of the normalised halfway angle.
    pub max_halfway: f64,
    /// Range of the geometric attenuation ratio.
    pub geom_ratio_range: (f64, f64),
    /// Forces every texel to be visible in the first view.
    pub ensure_coverage: bool,
    /// Seed of the random generator; each view draws from its own stream.
    pub seed: u64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            view_count: 16,
            visibility: 0.8,
            max_halfway: 1.0,
            geom_ratio_range: (0.2, 1.0),
            ensure_coverage: true,
            seed: 0,
        }
    }
}

/// Ground truth of a synthetic capture: a material basis and the mixing
/// weights of every texel.
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    texture: TextureResolution,
    basis: SimpleMaterialBasis,
    metallicity: f64,
    weights: Vec<f64>,
}

impl SyntheticCapture {
    /// Creates a capture where every texel is made of material 0.
    pub fn new(texture: TextureResolution, basis: SimpleMaterialBasis, metallicity: f64) -> Self {
        let n = basis.material_count();
        let mut weights = vec![0.0; texture.texel_count() * n];
        if n > 0 {
            weights.iter_mut().step_by(n).for_each(|w| *w = 1.0);
        }
        Self {
            texture,
            basis,
            metallicity: metallicity.clamp(0.0, 1.0),
            weights,
        }
    }

    /// Creates a capture whose texture is split into vertical bands, one per
    /// material.
    pub fn striped(texture: TextureResolution, basis: SimpleMaterialBasis, metallicity: f64) -> Self {
        let mut capture = Self::new(texture, basis, metallicity);
        let n = capture.basis.material_count();
        if n == 0 {
            return capture;
        }
        let mut one_hot = vec![0.0; n];
        for p in 0..texture.texel_count() {
            let column = p % texture.width;
            one_hot.fill(0.0);
            one_hot[(column * n / texture.width).min(n - 1)] = 1.0;
            capture.set_weights(p, &one_hot);
        }
        capture
    }

    /// Texture resolution of the capture.
    pub fn texture(&self) -> TextureResolution { self.texture }

    /// Ground-truth material basis.
    pub fn basis(&self) -> &SimpleMaterialBasis { &self.basis }

    /// Metallicity used to render the capture.
    pub fn metallicity(&self) -> f64 { self.metallicity }

    /// Ground-truth weights of texel `p`.
    pub fn weights(&self, p: usize) -> &[f64] {
        let n = self.basis.material_count();
        &self.weights[p * n..(p + 1) * n]
    }

    /// Overwrites the ground-truth weights of texel `p`.
    pub fn set_weights(&mut self, p: usize, weights: &[f64]) {
        let n = self.basis.material_count();
        self.weights[p * n..(p + 1) * n].copy_from_slice(weights);
    }

    /// Renders the views of the capture.
    pub fn render(&self, options: &CaptureOptions) -> Vec<ReflectanceSamples> {
        let model = SpecularWeightModel::new(&self.basis, self.metallicity);
        let max_halfway = if options.max_halfway.is_nan() {
            1.0
        } else {
            options.max_halfway.clamp(f64::EPSILON, 1.0)
        };
        let visibility = if options.visibility.is_nan() {
            0.0
        } else {
            options.visibility.clamp(0.0, 1.0)
        };
        let halfway = Uniform::new(0.0, max_halfway);
        let (lo, hi) = options.geom_ratio_range;
        let geom_ratio = Uniform::new_inclusive(lo.min(hi), hi.max(lo));
        (0..options.view_count)
            .map(|v| {
                let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
                rng.set_stream(v as u64);
                (0..self.texture.texel_count())
                    .map(|p| {
                        let forced = options.ensure_coverage && v == 0;
                        if !forced && !rng.gen_bool(visibility) {
                            return ReflectanceSample::INVISIBLE;
                        }
                        let h = halfway.sample(&mut rng);
                        let g = geom_ratio.sample(&mut rng);
                        let color = model.predict(self.weights(p), h, g);
                        ReflectanceSample {
                            visibility: 1.0,
                            halfway: h as f32,
                            geom_ratio: g as f32,
                            weight: 1.0,
                            color: color.to_array().map(|c| c as f32),
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Builds a basis of `count` plausible materials with decreasing specular
/// lobes of varying width.
///
/// Curves are non-increasing; with a non-zero metallicity the last sample
/// equals `metallicity * albedo / (pi * (1 - metallicity))` so that the
/// diffuse and specular terms share the same constant coefficient.
pub fn demo_basis(count: usize, resolution: usize, metallicity: f64) -> SimpleMaterialBasis {
    let mut basis = SimpleMaterialBasis::new(count, resolution);
    for b in 0..count {
        let t = if count > 1 { b as f64 / (count - 1) as f64 } else { 0.0 };
        let diffuse = DVec3::new(0.2 + 0.6 * t, 0.5 - 0.3 * t, 0.7 - 0.5 * t);
        basis.set_diffuse_color(b, diffuse);
        let width = 0.1 + 0.3 * t;
        let peak = 2.0 - 1.5 * t;
        for channel in Channel::ALL {
            let albedo = diffuse[channel.index()];
            let tail = if metallicity > 0.0 && metallicity < 1.0 {
                metallicity * albedo * INV_PI / (1.0 - metallicity)
            } else {
                0.0
            };
            for m in 0..=resolution {
                let x = m as f64 / resolution.max(1) as f64;
                let lobe = if m == resolution {
                    0.0
                } else {
                    peak * (-0.5 * (x / width).powi(2)).exp()
                };
                basis.set_specular(channel, b, m, lobe + tail);
            }
        }
    }
    basis
}

/// Draws a random convex combination of `count` weights.
pub fn random_mix(count: usize, rng: &mut impl Rng) -> Vec<f64> {
    let raw = (0..count).map(|_| rng.gen_range(0.0..1.0)).collect::<Vec<f64>>();
    let sum: f64 = raw.iter().sum();
    if sum > 0.0 {
        raw.iter().map(|w| w / sum).collect()
    } else {
        vec![1.0 / count as f64; count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflectance::ReflectanceData;

    #[test]
    fn test_render_is_deterministic_and_covers_texels() {
        let texture = TextureResolution::new(8, 4);
        let capture = SyntheticCapture::striped(texture, demo_basis(2, 6, 0.0), 0.0);
        let options = CaptureOptions {
            view_count: 3,
            visibility: 0.3,
            seed: 11,
            ..Default::default()
        };
        let views = capture.render(&options);
        assert_eq!(views.len(), 3);
        assert_eq!(views, capture.render(&options));
        assert!((0..texture.texel_count()).all(|p| views[0].is_visible(p)));
        assert!(views[1].visible_count() < texture.texel_count());
        for view in &views {
            for p in 0..view.size() {
                if !view.is_visible(p) {
                    assert_eq!(*view.get(p), ReflectanceSample::INVISIBLE);
                }
            }
        }
    }

    #[test]
    fn test_render_tolerates_nan_options() {
        let texture = TextureResolution::new(4, 2);
        let capture = SyntheticCapture::new(texture, demo_basis(1, 4, 0.0), 0.0);
        let views = capture.render(&CaptureOptions {
            view_count: 2,
            visibility: f64::NAN,
            max_halfway: f64::NAN,
            ..Default::default()
        });
        // Only the coverage view is observed.
        assert_eq!(views[0].visible_count(), texture.texel_count());
        assert_eq!(views[1].visible_count(), 0);
        assert!((0..texture.texel_count()).all(|p| views[0].halfway_index(p) < 1.0));
    }

    #[test]
    fn test_striped_weights() {
        let capture = SyntheticCapture::striped(TextureResolution::new(4, 2), demo_basis(2, 4, 0.0), 0.0);
        assert_eq!(capture.weights(0), &[1.0, 0.0]);
        assert_eq!(capture.weights(3), &[0.0, 1.0]);
        assert_eq!(capture.weights(6), &[0.0, 1.0]);
    }

    #[test]
    fn test_demo_basis_curves_non_increasing() {
        let basis = demo_basis(3, 10, 0.4);
        for b in 0..3 {
            for channel in Channel::ALL {
                let curve = basis.specular_curve(channel, b);
                assert!(curve.windows(2).all(|w| w[0] >= w[1]));
                let albedo = basis.diffuse_color(b)[channel.index()];
                assert!((curve[10] - 0.4 * albedo * INV_PI / 0.6).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_random_mix_is_convex() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..20 {
            let mix = random_mix(4, &mut rng);
            assert!(mix.iter().all(|w| *w >= 0.0));
            assert!((mix.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }
}
