//! Small numeric helpers shared across the fitting crates.

pub use glam::DVec3;
use std::f64::consts::PI;

/// Reciprocal of π, used to convert albedo into irradiance-domain
/// reflectance.
pub const INV_PI: f64 = 1.0 / PI;

/// Returns the first strictly positive value at or above the median of all
/// finite values, or `None` if there is none.
///
/// For sparse inputs (mostly zeros) this is the smallest positive value in
/// the upper half rather than the median of the positive values.
pub fn median_positive<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut sorted = values
        .into_iter()
        .filter(|v| v.is_finite())
        .collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[sorted.len() / 2..].iter().copied().find(|v| *v > 0.0)
}

/// Relative difference between a value and its reference.
///
/// Differences against a zero reference are measured relative to `floor`
/// so that round-off noise on structurally zero entries does not count as
/// a mismatch.
pub fn relative_difference(value: f64, reference: f64, floor: f64) -> f64 {
    (value - reference).abs() / reference.abs().max(floor)
}
