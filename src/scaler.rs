//! Running standardization of feature vectors.

/// Online estimator of one feature's mean and variance (Welford).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FeatureStats {
    /// samples seen
    count: u64,
    /// running mean
    mean: f64,
    /// sum of squared deviations from the running mean
    m2: f64,
}

impl FeatureStats {
    /// Incorporates one sample.
    fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Number of samples seen.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean; 0 until a sample is seen.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance, `None` until a sample is seen.
    pub fn variance(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.m2 / self.count as f64)
        } else {
            None
        }
    }

    /// Standard deviation usable as a divisor: at least two samples, finite and non zero.
    fn scale(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        self.variance()
            .map(f64::sqrt)
            .filter(|deviation| deviation.is_finite() && *deviation > 0.)
    }

    /// Divisor of the standardization: 1 without a usable deviation, so the value is only centred.
    fn unit(&self) -> f64 {
        self.scale().unwrap_or(1.)
    }

    fn standardize(&self, x: f64) -> f64 {
        (x - self.mean) / self.unit()
    }
}

/// Standardizes `D`-dimensional vectors with running per-feature statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct RunningScaler<const D: usize> {
    stats: [FeatureStats; D],
}

impl<const D: usize> Default for RunningScaler<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> RunningScaler<D> {
    /// Builds a scaler that has seen nothing.
    pub fn new() -> Self {
        Self {
            stats: [FeatureStats::default(); D],
        }
    }

    /// Standardizes `raw` with the statistics of the samples seen so far.
    pub fn standardize(&self, raw: &[f64; D]) -> [f64; D] {
        let mut standardized = [0.; D];
        for (i, x) in raw.iter().enumerate() {
            standardized[i] = self.stats[i].standardize(*x);
        }
        standardized
    }

    /// Folds `raw` into the statistics.
    pub fn update(&mut self, raw: &[f64; D]) {
        self.stats
            .iter_mut()
            .zip(raw)
            .for_each(|(stats, x)| stats.update(*x));
    }

    /// Re-expresses `point`, standardized with the `previous` statistics, in the current ones.
    pub fn rebase(&self, previous: &RunningScaler<D>, point: &mut [f64; D]) {
        for (i, z) in point.iter_mut().enumerate() {
            let raw = *z * previous.stats[i].unit() + previous.stats[i].mean;
            *z = self.stats[i].standardize(raw);
        }
    }

    /// Per-feature statistics.
    pub fn stats(&self) -> &[FeatureStats; D] {
        &self.stats
    }

    /// Samples seen.
    pub fn count(&self) -> u64 {
        self.stats.first().map_or(0, FeatureStats::count)
    }
}

#[cfg(test)]
mod tests {
    use crate::scaler::*;
    use approx_eq::assert_approx_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn closed_form(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn test_convergence() {
        let temperature = Normal::new(55.0, 12.0).unwrap();
        let precipitation = Normal::new(30.0, 8.0).unwrap();
        let mut rng = StdRng::seed_from_u64(9787043385113690);
        let points: Vec<[f64; 2]> = (0..500)
            .map(|_| [temperature.sample(&mut rng), precipitation.sample(&mut rng)])
            .collect();
        let mut scaler = RunningScaler::<2>::new();
        for n in 1..=points.len() {
            scaler.update(&points[n - 1]);
            if n < 2 {
                continue;
            }
            for f in 0..2 {
                let values: Vec<f64> = points[..n].iter().map(|p| p[f]).collect();
                let (mean, var) = closed_form(&values);
                let stats = scaler.stats()[f];
                assert_eq!(n as u64, stats.count());
                assert_approx_eq!(mean, stats.mean(), 1E-9);
                assert_approx_eq!(var, stats.variance().unwrap(), 1E-9);
            }
        }
    }

    #[test]
    fn test_two_samples() {
        let mut scaler = RunningScaler::<1>::new();
        scaler.update(&[10.]);
        scaler.update(&[12.]);
        let stats = scaler.stats()[0];
        assert_eq!(11., stats.mean());
        assert_eq!(1., stats.variance().unwrap());
        assert_eq!([2.], scaler.standardize(&[13.]));
    }

    #[test]
    fn test_standardize_cold() {
        let scaler = RunningScaler::<2>::new();
        assert_eq!(0, scaler.count());
        assert_eq!([10., -3.], scaler.standardize(&[10., -3.]));
    }

    #[test]
    fn test_standardize_single_sample_is_centred_only() {
        let mut scaler = RunningScaler::<2>::new();
        scaler.update(&[10., 0.]);
        assert_eq!([2., 1.], scaler.standardize(&[12., 1.]));
    }

    #[test]
    fn test_standardize_constant_feature() {
        let mut scaler = RunningScaler::<2>::new();
        scaler.update(&[10., 0.]);
        scaler.update(&[12., 0.]);
        scaler.update(&[11., 0.]);
        let z = scaler.standardize(&[11., 4.]);
        assert_eq!(0., z[0]);
        assert_eq!(4., z[1]);
        assert!(z.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_rebase() {
        let mut scaler = RunningScaler::<2>::new();
        scaler.update(&[10., 0.]);
        scaler.update(&[12., 0.]);
        let previous = scaler.clone();
        let raw = [13., 2.];
        let mut point = previous.standardize(&raw);
        scaler.update(&[14., 4.]);
        scaler.rebase(&previous, &mut point);
        let expected = scaler.standardize(&raw);
        assert_approx_eq!(expected[0], point[0], 1E-12);
        assert_approx_eq!(expected[1], point[1], 1E-12);
    }

    #[test]
    fn test_count_is_monotonic() {
        let mut scaler = RunningScaler::<2>::new();
        for i in 0..10 {
            assert_eq!(i, scaler.count());
            scaler.update(&[i as f64, 1.]);
        }
    }
}
