use crate::{
    decomposition::SpecularDecomposition, reconstruction::check_view_sizes,
    reflectance::ReflectanceData,
};
use base::{
    error::{RuntimeError, SpecFitError},
    math::DVec3,
};
use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng, SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Centres moving less than this between two iterations stop the clustering.
pub const CLUSTERING_TOLERANCE: f64 = 1e-4;

/// Maximum number of Lloyd iterations.
pub const MAX_CLUSTERING_ITERATIONS: usize = 100;

/// Result of the k-means initialisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Final cluster centres (average observed colours).
    pub centers: Vec<DVec3>,
    /// Number of Lloyd iterations run.
    pub iterations: usize,
}

/// Average visible colour of every texel; `None` for texels never observed.
fn average_colors<V: ReflectanceData>(views: &[V], texel_count: usize) -> Vec<Option<DVec3>> {
    (0..texel_count)
        .into_par_iter()
        .map(|p| {
            let (sum, count) = views
                .iter()
                .filter(|view| view.is_visible(p))
                .fold((DVec3::ZERO, 0usize), |(sum, count), view| (sum + view.color(p), count + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect()
}

fn nearest(centers: &[DVec3], color: DVec3) -> usize {
    centers
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.distance_squared(color).total_cmp(&b.distance_squared(color)))
        .map_or(0, |(b, _)| b)
}

/// k-means++ seeding: the first centre is uniform, each further centre is
/// drawn with probability proportional to the squared distance to the
/// closest centre chosen so far.
fn seed_centers(colors: &[DVec3], count: usize, rng: &mut ChaCha8Rng) -> Vec<DVec3> {
    let mut centers = Vec::with_capacity(count);
    centers.push(colors[rng.gen_range(0..colors.len())]);
    while centers.len() < count {
        let distances = colors
            .iter()
            .map(|c| centers.iter().map(|center| center.distance_squared(*c)).fold(f64::MAX, f64::min))
            .collect::<Vec<_>>();
        let index = match WeightedIndex::new(&distances) {
            Ok(dist) => dist.sample(rng),
            // Every colour already coincides with a centre.
            Err(_) => rng.gen_range(0..colors.len()),
        };
        centers.push(colors[index]);
    }
    centers
}

/// Initialises the weights of a decomposition by clustering the average
/// observed colour of every texel into `basis_count` groups.
///
/// Every observed texel receives a one-hot weight vector selecting its
/// cluster and becomes valid; unobserved texels are left invalid. Fails if
/// no texel has a visible sample.
pub fn initialize_clusters<V: ReflectanceData>(
    views: &[V],
    decomposition: &mut SpecularDecomposition,
    seed: u64,
) -> Result<Clustering, SpecFitError> {
    check_view_sizes(views, decomposition.texel_count())?;
    let averages = average_colors(views, decomposition.texel_count());
    let observed = averages
        .iter()
        .enumerate()
        .filter_map(|(p, c)| c.map(|c| (p, c)))
        .collect::<Vec<_>>();
    if observed.is_empty() {
        return Err(SpecFitError::from_runtime_error(
            RuntimeError::NoVisibleSamples,
            "Failed to initialise weights by clustering",
        ));
    }
    let colors = observed.iter().map(|(_, c)| *c).collect::<Vec<_>>();

    let basis_count = decomposition.basis_count();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centers = seed_centers(&colors, basis_count, &mut rng);
    log::debug!("Initial centers: {:?}", centers);

    let mut iterations = 0;
    while iterations < MAX_CLUSTERING_ITERATIONS {
        iterations += 1;
        let (sums, counts) = colors
            .par_iter()
            .fold(
                || (vec![DVec3::ZERO; basis_count], vec![0usize; basis_count]),
                |(mut sums, mut counts), color| {
                    let b = nearest(&centers, *color);
                    sums[b] += *color;
                    counts[b] += 1;
                    (sums, counts)
                },
            )
            .reduce(
                || (vec![DVec3::ZERO; basis_count], vec![0usize; basis_count]),
                |(mut sums, mut counts), (other_sums, other_counts)| {
                    for b in 0..basis_count {
                        sums[b] += other_sums[b];
                        counts[b] += other_counts[b];
                    }
                    (sums, counts)
                },
            );

        let mut shift = 0.0f64;
        for b in 0..basis_count {
            // Empty clusters keep their centre.
            if counts[b] > 0 {
                let center = sums[b] / counts[b] as f64;
                shift = shift.max(center.distance(centers[b]));
                centers[b] = center;
            }
        }
        if shift < CLUSTERING_TOLERANCE {
            break;
        }
    }
    log::info!("Clustering converged after {} iterations.", iterations);
    for (b, center) in centers.iter().enumerate() {
        log::info!("    - center {}: {}", b, center);
    }

    let mut one_hot = vec![0.0; basis_count];
    for (p, color) in observed {
        one_hot.fill(0.0);
        one_hot[nearest(&centers, color)] = 1.0;
        decomposition.set_weights(p, &one_hot);
        decomposition.set_weights_validity(p, true);
    }

    Ok(Clustering { centers, iterations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflectance::{ReflectanceSample, ReflectanceSamples};
    use base::settings::{SpecularBasisSettings, TextureResolution};

    fn sample(color: [f32; 3]) -> ReflectanceSample {
        ReflectanceSample {
            visibility: 1.0,
            halfway: 0.5,
            geom_ratio: 1.0,
            weight: 1.0,
            color,
        }
    }

    #[test]
    fn test_two_color_groups_are_separated() {
        let texels = 20;
        let views = (0..2)
            .map(|v| {
                (0..texels)
                    .map(|p| {
                        let jitter = 0.01 * ((p + v) % 3) as f32;
                        if p == texels - 1 {
                            ReflectanceSample::INVISIBLE
                        } else if p % 2 == 0 {
                            sample([0.9 + jitter, 0.1, 0.1])
                        } else {
                            sample([0.1, 0.1, 0.8 + jitter])
                        }
                    })
                    .collect::<ReflectanceSamples>()
            })
            .collect::<Vec<_>>();
        let mut decomposition = SpecularDecomposition::from_scratch(
            TextureResolution::new(texels, 1),
            &SpecularBasisSettings::new(2, 4, 0.0),
        );
        let clustering = initialize_clusters(&views, &mut decomposition, 42).unwrap();
        assert_eq!(clustering.centers.len(), 2);
        assert!(clustering.iterations <= MAX_CLUSTERING_ITERATIONS);

        let red = decomposition.weights(0).to_vec();
        let blue = decomposition.weights(1).to_vec();
        assert_ne!(red, blue);
        for p in 0..texels - 1 {
            assert!(decomposition.are_weights_valid(p));
            assert_eq!(decomposition.weights(p).iter().sum::<f64>(), 1.0);
            let expected = if p % 2 == 0 { &red } else { &blue };
            assert_eq!(decomposition.weights(p), expected.as_slice());
        }
        assert!(!decomposition.are_weights_valid(texels - 1));
    }

    #[test]
    fn test_same_seed_same_clusters() {
        let views = vec![(0..30)
            .map(|p| sample([(p % 7) as f32 / 7.0, (p % 5) as f32 / 5.0, 0.3]))
            .collect::<ReflectanceSamples>()];
        let settings = SpecularBasisSettings::new(3, 4, 0.0);
        let texture = TextureResolution::new(30, 1);
        let mut a = SpecularDecomposition::from_scratch(texture, &settings);
        let mut b = SpecularDecomposition::from_scratch(texture, &settings);
        assert_eq!(
            initialize_clusters(&views, &mut a, 7).unwrap(),
            initialize_clusters(&views, &mut b, 7).unwrap()
        );
    }

    #[test]
    fn test_more_clusters_than_distinct_colors() {
        let views = vec![(0..4).map(|_| sample([0.5; 3])).collect::<ReflectanceSamples>()];
        let mut decomposition = SpecularDecomposition::from_scratch(
            TextureResolution::new(2, 2),
            &SpecularBasisSettings::new(3, 4, 0.0),
        );
        initialize_clusters(&views, &mut decomposition, 1).unwrap();
        assert_eq!(decomposition.valid_count(), 4);
    }

    #[test]
    fn test_no_visible_samples() {
        let views = vec![ReflectanceSamples::new(4)];
        let mut decomposition = SpecularDecomposition::from_scratch(
            TextureResolution::new(2, 2),
            &SpecularBasisSettings::new(2, 4, 0.0),
        );
        let err = initialize_clusters(&views, &mut decomposition, 0).unwrap_err();
        assert!(matches!(err.cause::<RuntimeError>(), Some(RuntimeError::NoVisibleSamples)));
    }
}
