//! This module defines the geometry the clustering runs in: points of R^n held as `f64` slices.
//!  - the squared Euclidian distance function
//!  - the weighted barycentre function

/// Computes the squared Euclidian distance in R^n.
///
/// The square root is left out: nearest-centroid searches only compare distances.
pub fn euclid_dist(p1: &[f64], p2: &[f64]) -> f64 {
    p1.iter()
        .zip(p2)
        .map(|(x1, x2)| {
            let d = x1 - x2;
            d * d
        })
        .sum()
}

/// Computes the weighted center of two points, writing it into `p1`.
pub fn real_combine(p1: &mut [f64], w1: f64, p2: &[f64], w2: f64) {
    let w = w1 + w2;
    p1.iter_mut()
        .zip(p2)
        .for_each(|(x1, x2)| *x1 = (*x1 * w1 + x2 * w2) / w);
}
