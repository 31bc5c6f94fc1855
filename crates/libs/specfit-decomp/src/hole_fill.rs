use crate::decomposition::SpecularDecomposition;

/// Summary of a hole filling run.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HoleFillReport {
    /// Number of passes that filled at least one texel.
    pub passes: usize,
    /// Number of texels that received weights.
    pub filled: usize,
}

impl SpecularDecomposition {
    /// Fills texels without a valid weight estimate from their neighbours.
    ///
    /// Each pass assigns every invalid texel the average of its valid
    /// neighbours (left, right, up and down in linear texel order, wrapping
    /// around the texture). Texels filled in a pass become valid only after
    /// the pass, so information spreads one texel per pass. Runs at most
    /// `max(width, height)` passes and stops as soon as a pass fills nothing.
    pub fn fill_holes(&mut self) -> HoleFillReport {
        let texture = self.texture();
        let n = self.texel_count();
        let w = texture.width;
        let basis_count = self.basis_count();
        let mut report = HoleFillReport::default();
        if n == 0 {
            return report;
        }

        for _ in 0..texture.width.max(texture.height) {
            let invalid: Vec<usize> = (0..n).filter(|p| !self.are_weights_valid(*p)).collect();
            let mut filled = Vec::new();
            for p in invalid {
                let neighbours = [(n + p - 1) % n, (p + 1) % n, (n + p - w) % n, (p + w) % n];
                let mut sums = vec![0.0; basis_count];
                let mut count = 0usize;
                for q in neighbours.into_iter().filter(|q| self.are_weights_valid(*q)) {
                    for (sum, weight) in sums.iter_mut().zip(self.weights(q)) {
                        *sum += weight;
                    }
                    count += 1;
                }
                if count > 0 {
                    for (b, sum) in sums.iter().enumerate() {
                        if *sum > 0.0 {
                            self.set_weight(b, p, sum / count as f64);
                        }
                    }
                    filled.push(p);
                }
            }

            if filled.is_empty() {
                break;
            }
            report.passes += 1;
            report.filled += filled.len();
            for p in filled {
                self.set_weights_validity(p, true);
            }
        }

        log::debug!(
            "Hole filling: {} texels filled in {} passes, {} still invalid.",
            report.filled,
            report.passes,
            n - self.valid_count()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::settings::{SpecularBasisSettings, TextureResolution};

    fn grid(width: usize, height: usize) -> SpecularDecomposition {
        SpecularDecomposition::from_scratch(
            TextureResolution::new(width, height),
            &SpecularBasisSettings::new(2, 4, 0.0),
        )
    }

    #[test]
    fn test_single_hole_gets_neighbour_mean() {
        let mut decomposition = grid(3, 3);
        for p in 0..9 {
            if p != 4 {
                decomposition.set_weights(p, &[p as f64, 0.0]);
                decomposition.set_weights_validity(p, true);
            }
        }
        decomposition.set_weights(4, &[0.0, 0.7]);
        let report = decomposition.fill_holes();
        assert_eq!(report, HoleFillReport { passes: 1, filled: 1 });
        assert!(decomposition.are_weights_valid(4));
        // Neighbours 3, 5, 1 and 7.
        assert_eq!(decomposition.weight(0, 4), 4.0);
        // All neighbours have a zero second weight, so it is left as is.
        assert_eq!(decomposition.weight(1, 4), 0.7);
    }

    #[test]
    fn test_fill_spreads_one_texel_per_pass() {
        let mut decomposition = grid(5, 1);
        decomposition.set_weights(0, &[0.25, 0.75]);
        decomposition.set_weights_validity(0, true);
        let report = decomposition.fill_holes();
        // Texels 1 and 4 in the first pass, 2 and 3 in the second.
        assert_eq!(report, HoleFillReport { passes: 2, filled: 4 });
        assert_eq!(decomposition.valid_count(), 5);
        for p in 0..5 {
            assert_eq!(decomposition.weights(p), &[0.25, 0.75]);
        }
    }

    #[test]
    fn test_nothing_to_fill_from() {
        let mut decomposition = grid(4, 4);
        assert_eq!(decomposition.fill_holes(), HoleFillReport::default());
        assert_eq!(decomposition.valid_count(), 0);
    }
}
