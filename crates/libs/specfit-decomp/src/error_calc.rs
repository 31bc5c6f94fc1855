use crate::{
    decomposition::SpecularDecomposition, reconstruction::check_view_sizes,
    reflectance::ReflectanceData, weights::SpecularWeightModel,
};
use base::{error::SpecFitError, Channel};
use rayon::prelude::*;

/// Weighted reconstruction error of a decomposition.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct FitError {
    /// Root of the weighted mean squared error per channel.
    pub rmse: f64,
    /// Number of visible samples the error was computed from.
    pub sample_count: usize,
    /// Sum of the sample weights.
    pub weight_sum: f64,
}

impl FitError {
    /// Whether `self` improves on `previous` by more than `tolerance`.
    pub fn improves_on(&self, previous: &FitError, tolerance: f64) -> bool {
        previous.rmse - self.rmse > tolerance
    }
}

/// Evaluates how well a decomposition predicts the observations.
pub struct FitErrorCalculator;

impl FitErrorCalculator {
    /// Computes the weighted RMSE of the current basis and weights over all
    /// visible samples of all views.
    pub fn calculate<V: ReflectanceData>(
        views: &[V],
        decomposition: &SpecularDecomposition,
    ) -> Result<FitError, SpecFitError> {
        check_view_sizes(views, decomposition.texel_count())?;
        let model =
            SpecularWeightModel::new(decomposition.material_basis(), decomposition.metallicity());
        let (squared, weight_sum, sample_count) = views
            .par_iter()
            .map(|view| {
                (0..view.size())
                    .filter(|p| view.is_visible(*p))
                    .fold((0.0, 0.0, 0usize), |(squared, weight_sum, count), p| {
                        let weight = view.additional_weight(p) as f64;
                        let predicted = model.predict(
                            decomposition.weights(p),
                            view.halfway_index(p) as f64,
                            view.geom_ratio(p) as f64,
                        );
                        let residual = view.color(p) - predicted;
                        (squared + weight * residual.length_squared(), weight_sum + weight, count + 1)
                    })
            })
            .reduce(|| (0.0, 0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

        let rmse = if weight_sum > 0.0 {
            (squared / (weight_sum * Channel::COUNT as f64)).sqrt()
        } else {
            0.0
        };
        log::info!("Fit error: RMSE {:.6} over {} samples.", rmse, sample_count);
        Ok(FitError {
            rmse,
            sample_count,
            weight_sum,
        })
    }
}
