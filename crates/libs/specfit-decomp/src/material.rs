use base::{error::SpecFitError, math::DVec3, Channel};
use std::path::Path;

/// A set of basis materials, each made of a diffuse albedo and a specular
/// curve per colour channel discretised over `specular_resolution() + 1`
/// microfacet-angle buckets.
pub trait MaterialBasis: Send + Sync {
    /// Diffuse albedo of material `b`.
    fn diffuse_color(&self, b: usize) -> DVec3;

    /// Specular curve sample of material `b` at bucket `m`.
    fn evaluate_specular(&self, channel: Channel, b: usize, m: usize) -> f64;

    /// Number of materials.
    fn material_count(&self) -> usize;

    /// Index of the last bucket of the specular curves.
    fn specular_resolution(&self) -> usize;

    /// Specular curve sample of material `b` at bucket `m` for all channels.
    fn specular_color(&self, b: usize, m: usize) -> DVec3 {
        DVec3::new(
            self.evaluate_specular(Channel::Red, b, m),
            self.evaluate_specular(Channel::Green, b, m),
            self.evaluate_specular(Channel::Blue, b, m),
        )
    }

    /// Saves the basis into a directory.
    fn save(&self, dir: &Path) -> Result<(), SpecFitError> { crate::io::save_basis(self, dir) }
}

/// Material basis stored in plain arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleMaterialBasis {
    resolution: usize,
    diffuse: Vec<DVec3>,
    /// Specular samples laid out as `[b][channel][m]`.
    specular: Box<[f64]>,
}

impl SimpleMaterialBasis {
    /// Creates a basis of `material_count` black materials.
    pub fn new(material_count: usize, resolution: usize) -> Self {
        Self {
            resolution,
            diffuse: vec![DVec3::ZERO; material_count],
            specular: vec![0.0; material_count * Channel::COUNT * (resolution + 1)]
                .into_boxed_slice(),
        }
    }

    /// Copies any material basis into plain arrays.
    pub fn from_basis<M: MaterialBasis + ?Sized>(basis: &M) -> Self {
        let mut copy = Self::new(basis.material_count(), basis.specular_resolution());
        for b in 0..basis.material_count() {
            copy.set_diffuse_color(b, basis.diffuse_color(b));
            for channel in Channel::ALL {
                for m in 0..=basis.specular_resolution() {
                    copy.set_specular(channel, b, m, basis.evaluate_specular(channel, b, m));
                }
            }
        }
        copy
    }

    #[inline]
    fn curve_offset(&self, channel: Channel, b: usize) -> usize {
        (b * Channel::COUNT + channel.index()) * (self.resolution + 1)
    }

    /// Sets the diffuse albedo of material `b`.
    pub fn set_diffuse_color(&mut self, b: usize, color: DVec3) { self.diffuse[b] = color; }

    /// Sets one specular curve sample.
    pub fn set_specular(&mut self, channel: Channel, b: usize, m: usize, value: f64) {
        let offset = self.curve_offset(channel, b);
        self.specular[offset + m] = value;
    }

    /// Specular curve of material `b` for a channel.
    pub fn specular_curve(&self, channel: Channel, b: usize) -> &[f64] {
        let offset = self.curve_offset(channel, b);
        &self.specular[offset..offset + self.resolution + 1]
    }

    /// Replaces the specular curve of material `b` for a channel.
    ///
    /// # Panics
    ///
    /// Panics if the curve does not hold `resolution + 1` samples.
    pub fn set_specular_curve(&mut self, channel: Channel, b: usize, curve: &[f64]) {
        let offset = self.curve_offset(channel, b);
        self.specular[offset..offset + self.resolution + 1].copy_from_slice(curve);
    }
}

impl MaterialBasis for SimpleMaterialBasis {
    fn diffuse_color(&self, b: usize) -> DVec3 { self.diffuse[b] }

    fn evaluate_specular(&self, channel: Channel, b: usize, m: usize) -> f64 {
        self.specular[self.curve_offset(channel, b) + m]
    }

    fn material_count(&self) -> usize { self.diffuse.len() }

    fn specular_resolution(&self) -> usize { self.resolution }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_material_basis_layout() {
        let mut basis = SimpleMaterialBasis::new(2, 3);
        basis.set_specular_curve(Channel::Green, 1, &[4.0, 3.0, 2.0, 1.0]);
        basis.set_specular(Channel::Red, 0, 3, 0.5);
        basis.set_diffuse_color(1, DVec3::new(0.1, 0.2, 0.3));

        assert_eq!(basis.material_count(), 2);
        assert_eq!(basis.specular_resolution(), 3);
        assert_eq!(basis.evaluate_specular(Channel::Green, 1, 1), 3.0);
        assert_eq!(basis.evaluate_specular(Channel::Red, 1, 1), 0.0);
        assert_eq!(basis.evaluate_specular(Channel::Red, 0, 3), 0.5);
        assert_eq!(basis.specular_color(1, 0), DVec3::new(0.0, 4.0, 0.0));
        assert_eq!(SimpleMaterialBasis::from_basis(&basis), basis);
    }
}
