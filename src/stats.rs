//! Aggregate statistics computed by walking a histogram's slots.
//!
//! Every slot stands for its median equivalent value, so results carry
//! the histogram's configured precision rather than exact sample values.

use super::*;

pub fn min(histo: &Histo) -> i64 {
    histo.min()
}

pub fn max(histo: &Histo) -> i64 {
    histo.max()
}

/// The highest value, at slot resolution, below which `percentile`
/// percent of the recorded values fall. `percentile` is clamped to
/// `[0, 100]`; an empty histogram yields 0.
pub fn value_at_percentile(histo: &Histo, percentile: f64) -> i64 {
    let target = count_at_percentile(histo.total_count(), percentile);

    let mut total: u64 = 0;
    for step in histo.iter_all() {
        total = total.saturating_add(step.count);
        if total >= target {
            return step.highest_equivalent_value;
        }
    }
    0
}

/// Mean of the recorded values. NaN when nothing was recorded.
pub fn mean(histo: &Histo) -> f64 {
    let total: i128 = histo
        .iter_all()
        .filter(|step| step.count != 0)
        .map(|step| i128::from(step.count) * i128::from(step.median_equivalent_value))
        .sum();
    total as f64 / histo.total_count() as f64
}

/// Population standard deviation of the recorded values. NaN when
/// nothing was recorded.
pub fn stddev(histo: &Histo) -> f64 {
    let mean = mean(histo);

    let mut deviation_total = 0.0;
    for step in histo.iter_all().filter(|step| step.count != 0) {
        let deviation = step.median_equivalent_value as f64 - mean;
        deviation_total += deviation * deviation * step.count as f64;
    }
    (deviation_total / histo.total_count() as f64).sqrt()
}

// Number of recorded values at or below `percentile`, rounded to the
// nearest count and never below one.
fn count_at_percentile(total_count: u64, percentile: f64) -> u64 {
    let percentile = percentile.max(0.0).min(100.0);
    let count = (percentile * total_count as f64 / 100.0 + 0.5) as u64;
    count.max(1)
}

#[cfg(test)]
fn one_to_hundred_thousand() -> Histo {
    let mut h = Histo::new(1, 100_000, 4).unwrap();
    for v in 1..=100_000 {
        assert!(h.record_value(v));
    }
    h
}

#[test]
fn percentiles_of_uniform_values() {
    let h = one_to_hundred_thousand();
    assert_eq!(min(&h), 1);
    assert_eq!(max(&h), 100_003);

    assert_eq!(value_at_percentile(&h, 50.0), 50_001);
    assert_eq!(value_at_percentile(&h, 75.0), 75_003);
    assert_eq!(value_at_percentile(&h, 90.0), 90_003);
    assert_eq!(value_at_percentile(&h, 95.0), 95_003);
    assert_eq!(value_at_percentile(&h, 99.0), 99_003);
    assert_eq!(value_at_percentile(&h, 99.9), 99_903);
    assert_eq!(value_at_percentile(&h, 99.99), 99_991);
}

#[test]
fn mean_and_stddev_of_uniform_values() {
    let h = one_to_hundred_thousand();
    approx::assert_relative_eq!(mean(&h), 50_000.836_18, epsilon = 1e-6);
    approx::assert_relative_eq!(stddev(&h), 28_867.704_262_911_586, epsilon = 1e-6);
    assert_eq!(h.mean(), mean(&h));
    assert_eq!(h.stddev(), stddev(&h));
}

#[test]
fn empty_histogram_is_nan() {
    let h = Histo::new(1, 100_000, 3).unwrap();
    assert!(mean(&h).is_nan());
    assert!(stddev(&h).is_nan());
    assert_eq!(value_at_percentile(&h, 50.0), 0);
    assert_eq!(min(&h), i64::MAX);
    assert_eq!(max(&h), 0);
}

#[test]
fn percentile_is_clamped() {
    let mut h = Histo::new(1, 1000, 3).unwrap();
    for v in &[10, 20, 30] {
        assert!(h.record_value(*v));
    }
    assert_eq!(value_at_percentile(&h, -5.0), 10);
    assert_eq!(value_at_percentile(&h, 0.0), 10);
    assert_eq!(value_at_percentile(&h, 100.0), 30);
    assert_eq!(value_at_percentile(&h, 250.0), 30);
}

#[test]
fn high_significant_figures() {
    let values = [
        459_876, 669_187, 711_612, 816_326, 931_423, 1_033_197, 1_131_895, 2_477_317, 3_964_974,
        12_718_782,
    ];
    let mut h = Histo::new(459_876, 12_718_782, 5).unwrap();
    for v in &values {
        assert!(h.record_value(*v));
    }
    assert_eq!(value_at_percentile(&h, 50.0), 1_048_575);
}

#[test]
fn single_value_statistics() {
    let mut h = Histo::new(1, 3_600_000_000, 3).unwrap();
    assert!(h.record_values(1_000, 4));
    assert_eq!(mean(&h), 1_000.0);
    assert_eq!(stddev(&h), 0.0);
    assert_eq!(value_at_percentile(&h, 1.0), 1_000);
    assert_eq!(value_at_percentile(&h, 100.0), 1_000);
}

#[test]
fn count_at_percentile_rounds() {
    assert_eq!(count_at_percentile(0, 50.0), 1);
    assert_eq!(count_at_percentile(3, 50.0), 2);
    assert_eq!(count_at_percentile(3, 83.33), 2);
    assert_eq!(count_at_percentile(3, 83.34), 3);
    assert_eq!(count_at_percentile(10, 100.0), 10);
}
