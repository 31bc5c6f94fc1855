use base::math::DVec3;

/// Read-only reflectance observations of one captured view, one record per
/// texel.
pub trait ReflectanceData: Sync {
    /// Number of records (texels).
    fn size(&self) -> usize;

    /// Visibility of the texel; zero means the texel was not observed.
    fn visibility(&self, p: usize) -> f32;

    /// Normalised halfway angle in `[0, 1]`.
    fn halfway_index(&self, p: usize) -> f32;

    /// Geometric attenuation ratio.
    fn geom_ratio(&self, p: usize) -> f32;

    /// Non-negative regression weight of the observation.
    fn additional_weight(&self, p: usize) -> f32;

    /// Observed red reflectance.
    fn red(&self, p: usize) -> f32;

    /// Observed green reflectance.
    fn green(&self, p: usize) -> f32;

    /// Observed blue reflectance.
    fn blue(&self, p: usize) -> f32;

    /// Whether the texel was observed in this view.
    fn is_visible(&self, p: usize) -> bool { self.visibility(p) > 0.0 }

    /// Observed reflectance as a colour.
    fn color(&self, p: usize) -> DVec3 {
        DVec3::new(self.red(p) as f64, self.green(p) as f64, self.blue(p) as f64)
    }
}

/// A single reflectance observation.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ReflectanceSample {
    /// Visibility; zero means not observed.
    pub visibility: f32,
    /// Normalised halfway angle.
    pub halfway: f32,
    /// Geometric attenuation ratio.
    pub geom_ratio: f32,
    /// Regression weight.
    pub weight: f32,
    /// Observed RGB reflectance.
    pub color: [f32; 3],
}

impl ReflectanceSample {
    /// A sample that was not observed.
    pub const INVISIBLE: Self = Self {
        visibility: 0.0,
        halfway: 0.0,
        geom_ratio: 0.0,
        weight: 0.0,
        color: [0.0; 3],
    };
}

/// Owned reflectance observations of one view.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectanceSamples {
    samples: Box<[ReflectanceSample]>,
}

impl ReflectanceSamples {
    /// Creates a view of `size` unobserved texels.
    pub fn new(size: usize) -> Self {
        Self {
            samples: vec![ReflectanceSample::INVISIBLE; size].into_boxed_slice(),
        }
    }

    /// Sets the observation of a texel.
    pub fn set(&mut self, p: usize, sample: ReflectanceSample) { self.samples[p] = sample; }

    /// Returns the observation of a texel.
    pub fn get(&self, p: usize) -> &ReflectanceSample { &self.samples[p] }

    /// Number of observed texels.
    pub fn visible_count(&self) -> usize {
        self.samples.iter().filter(|s| s.visibility > 0.0).count()
    }
}

impl FromIterator<ReflectanceSample> for ReflectanceSamples {
    fn from_iter<T: IntoIterator<Item = ReflectanceSample>>(iter: T) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl ReflectanceData for ReflectanceSamples {
    fn size(&self) -> usize { self.samples.len() }

    fn visibility(&self, p: usize) -> f32 { self.samples[p].visibility }

    fn halfway_index(&self, p: usize) -> f32 { self.samples[p].halfway }

    fn geom_ratio(&self, p: usize) -> f32 { self.samples[p].geom_ratio }

    fn additional_weight(&self, p: usize) -> f32 { self.samples[p].weight }

    fn red(&self, p: usize) -> f32 { self.samples[p].color[0] }

    fn green(&self, p: usize) -> f32 { self.samples[p].color[1] }

    fn blue(&self, p: usize) -> f32 { self.samples[p].color[2] }
}
