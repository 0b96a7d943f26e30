//! Small numeric helpers shared by the pattern detectors.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Standard deviation over mean. Zero for an empty or zero-mean series.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    variance(values).sqrt() / m.abs()
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Clamp into [0, 1]; NaN collapses to 0.
#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// True when `a` and `b` differ by no more than `tolerance` relative to `b`.
#[inline]
pub fn within_relative(a: f64, b: f64, tolerance: f64) -> bool {
    if b.abs() < f64::EPSILON {
        return a.abs() < f64::EPSILON;
    }
    ((a - b) / b).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variance_and_cv() {
        let values = vec![10.0, 10.0, 10.0];
        assert_eq!(variance(&values), 0.0);
        assert_eq!(coefficient_of_variation(&values), 0.0);

        let values = vec![9.0, 11.0];
        assert!((variance(&values) - 1.0).abs() < 1e-12);
        assert!((coefficient_of_variation(&values) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_clamp_unit_handles_nan() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
    }

    #[test]
    fn test_within_relative() {
        assert!(within_relative(100.05, 100.0, 0.001));
        assert!(!within_relative(100.5, 100.0, 0.001));
    }
}
