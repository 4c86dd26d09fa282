// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::cmp::Ordering;

/// Relative size under which a sum of squared deviations is rounding noise.
pub const SPREAD_TOLERANCE: f64 = f64::EPSILON;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Unbiased sample variance (denominator `n - 1`).
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mu = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - mu) * (v - mu)).sum();
    Some(ss / (values.len() - 1) as f64)
}

pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Whether `sum_sq_dev` is negligible next to the magnitude of `values`.
///
/// The test is relative, so samples of tiny proportions still count as
/// varying while a constant sample of any scale does not.
pub fn negligible_spread(sum_sq_dev: f64, values: &[f64]) -> bool {
    let scale: f64 = values.iter().map(|v| v * v).sum();
    sum_sq_dev <= SPREAD_TOLERANCE * scale
}

/// Sample standard deviation, or `None` for short or constant samples.
pub fn non_constant_std(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    if values.len() < 2 {
        return None;
    }
    let ss: f64 = values.iter().map(|v| (v - mu) * (v - mu)).sum();
    if negligible_spread(ss, values) {
        return None;
    }
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Pearson product-moment correlation of two equal-length samples.
///
/// Returns `None` for fewer than two pairs or when either side is constant.
/// The result is clamped to `[-1, 1]` to absorb rounding.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if negligible_spread(sxx, x) || negligible_spread(syy, y) {
        return None;
    }
    Some((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// Two-sample Kolmogorov-Smirnov comparison.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KsTest {
    /// Largest gap between the two empirical CDFs, in `[0, 1]`.
    pub statistic: f64,
    /// Asymptotic p-value of the statistic.
    pub p_value: f64,
}

/// Runs a two-sample KS test. Returns `None` when either sample is empty.
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Option<KsTest> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
    b.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));

    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut statistic = 0.0f64;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        statistic = statistic.max((i as f64 / na - j as f64 / nb).abs());
    }

    let effective = (na * nb / (na + nb)).sqrt();
    let lambda = (effective + 0.12 + 0.11 / effective) * statistic;
    Some(KsTest {
        statistic,
        p_value: kolmogorov_survival(lambda),
    })
}

/// Survival function of the Kolmogorov distribution.
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous = 0.0;
    for j in 1..=100 {
        let j = f64::from(j);
        let term = sign * (a2 * j * j).exp();
        sum += term;
        if term.abs() <= 1e-3 * previous || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous = term.abs();
    }
    1.0
}

#[cfg(test)]
mod tests {
    use super::{
        ks_two_sample, mean, non_constant_std, pearson, sample_std, sample_variance,
    };

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn moments_match_hand_computation() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_close(mean(&values).expect("mean"), 5.0);
        assert_close(sample_variance(&values).expect("variance"), 32.0 / 7.0);
        assert_close(sample_std(&values).expect("std"), (32.0f64 / 7.0).sqrt());
        assert!(sample_variance(&[1.0]).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn pearson_detects_perfect_linear_relationships() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_close(pearson(&x, &[2.0, 4.0, 6.0, 8.0]).expect("r"), 1.0);
        assert_close(pearson(&x, &[8.0, 6.0, 4.0, 2.0]).expect("r"), -1.0);
    }

    #[test]
    fn pearson_two_points_is_plus_or_minus_one() {
        assert_close(pearson(&[0.1, 0.2], &[5.0, 3.0]).expect("r"), -1.0);
    }

    #[test]
    fn pearson_is_undefined_for_constant_or_short_input() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(pearson(&[1.0], &[2.0]).is_none());
        assert!(pearson(&[1.0, 2.0], &[1.0]).is_none());
    }

    #[test]
    fn pearson_handles_proportions_near_one_in_ten_million() {
        let rare: Vec<f64> = (0..12).map(|i| f64::from(i + 1) * 1e-7).collect();
        let rest: Vec<f64> = rare.iter().map(|v| 1.0 - v).collect();
        let x: Vec<f64> = (0..12).map(f64::from).collect();
        assert_close(pearson(&rare, &x).expect("rare cause varies"), 1.0);
        assert_close(pearson(&rest, &x).expect("complement varies"), -1.0);
    }

    #[test]
    fn constant_samples_are_detected_at_any_scale() {
        assert!(non_constant_std(&[0.1; 8]).is_none());
        assert!(non_constant_std(&[3.0e9; 5]).is_none());
        assert!(non_constant_std(&[0.0; 4]).is_none());
        assert!(non_constant_std(&[1.0]).is_none());
        let tiny = [1e-7, 2e-7, 3e-7];
        assert_close(non_constant_std(&tiny).expect("sd") / 1e-7, 1.0);
    }

    #[test]
    fn ks_identical_samples_have_zero_statistic() {
        let a: Vec<f64> = (0..50).map(f64::from).collect();
        let test = ks_two_sample(&a, &a).expect("ks");
        assert_close(test.statistic, 0.0);
        assert_close(test.p_value, 1.0);
    }

    #[test]
    fn ks_disjoint_samples_are_significant() {
        let a: Vec<f64> = (0..40).map(f64::from).collect();
        let b: Vec<f64> = (100..140).map(f64::from).collect();
        let test = ks_two_sample(&a, &b).expect("ks");
        assert_close(test.statistic, 1.0);
        assert!(test.p_value < 1e-6, "p={}", test.p_value);
    }

    #[test]
    fn ks_interleaved_samples_are_not_significant() {
        let a: Vec<f64> = (0..60).map(|v| f64::from(v) * 2.0).collect();
        let b: Vec<f64> = (0..60).map(|v| f64::from(v) * 2.0 + 1.0).collect();
        let test = ks_two_sample(&a, &b).expect("ks");
        assert!(test.statistic <= 1.0 / 60.0 + 1e-12);
        assert!(test.p_value > 0.5);
    }

    #[test]
    fn ks_requires_non_empty_samples() {
        assert!(ks_two_sample(&[], &[1.0]).is_none());
    }
}
