pub struct StatsHelper;

impl StatsHelper {
    /// Median of the finite values, `None` when there are none.
    pub fn median(samples: &[f64]) -> Option<f64> {
        let mut values: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            Some((values[mid - 1] + values[mid]) / 2.0)
        } else {
            Some(values[mid])
        }
    }

    /// Sum ignoring NaN entries.
    pub fn nan_sum(samples: impl IntoIterator<Item = f64>) -> f64 {
        samples.into_iter().filter(|v| !v.is_nan()).sum()
    }

    pub fn round_to(value: f64, decimals: i32) -> f64 {
        let scale = 10f64.powi(decimals);
        (value * scale).round() / scale
    }

    /// Mean, min and max of the non-NaN values.
    pub fn finite_summary<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<(f64, f64, f64)> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in values.into_iter().filter(|v| !v.is_nan()) {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| (sum / count as f64, min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_even_odd_and_empty() {
        assert_eq!(StatsHelper::median(&[]), None);
        assert_eq!(StatsHelper::median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(StatsHelper::median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(StatsHelper::median(&[f64::NAN, 5.0]), Some(5.0));
    }

    #[test]
    fn nan_sum_skips_missing() {
        assert_eq!(StatsHelper::nan_sum([1.0, f64::NAN, 2.5]), 3.5);
        assert_eq!(StatsHelper::nan_sum([f64::NAN]), 0.0);
    }

    #[test]
    fn rounds_to_three_decimals() {
        assert_eq!(StatsHelper::round_to(104.123_56, 3), 104.124);
        assert_eq!(StatsHelper::round_to(-0.0004, 3), -0.0);
    }

    #[test]
    fn summary_ignores_nan() {
        let values = [1.0, f64::NAN, 3.0];
        assert_eq!(StatsHelper::finite_summary(values.iter()), Some((2.0, 1.0, 3.0)));
        assert_eq!(StatsHelper::finite_summary([f64::NAN].iter()), None);
    }
}
