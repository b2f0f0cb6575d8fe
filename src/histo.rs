use std::fmt::{self, Debug};

use super::*;

/// A fixed-precision histogram over logarithmic buckets.
///
/// Memory is allocated once at construction and recording never
/// allocates. Values outside `[0, highest_trackable_value]` (rounded up
/// to the end of the last bucket) are rejected.
#[derive(Clone)]
pub struct Histo {
    geometry: Geometry,
    counts: Vec<u64>,
    index_offset: usize,
    min_value: i64,
    max_value: i64,
    total_count: u64,
}

impl Debug for Histo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const PS: [f64; 10] = [0., 50., 75., 90., 95., 97.5, 99., 99.9, 99.99, 100.];
        f.write_str("Histogram[")?;

        for p in &PS {
            let res = self.value_at_percentile(*p);
            let line = format!("({} -> {}) ", p, res);
            f.write_str(&*line)?;
        }

        f.write_str("]")
    }
}

impl Histo {
    /// Create an empty histogram tracking `[lowest, highest]` at
    /// `significant_figures` digits of precision.
    pub fn new(lowest: i64, highest: i64, significant_figures: u32) -> Result<Histo> {
        let geometry = Geometry::new(lowest, highest, significant_figures)?;
        Ok(Histo::with_geometry(geometry))
    }

    pub fn with_geometry(geometry: Geometry) -> Histo {
        Histo::with_index_offset(geometry, 0)
    }

    /// Create an empty histogram whose counts array is rotated by
    /// `index_offset` slots. The rotation is invisible through every
    /// read and write operation.
    pub fn with_index_offset(geometry: Geometry, index_offset: usize) -> Histo {
        let counts_len = geometry.counts_len();
        Histo {
            geometry,
            counts: vec![0; counts_len],
            index_offset: index_offset % counts_len,
            min_value: i64::MAX,
            max_value: 0,
            total_count: 0,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Record a value. Returns false, leaving the histogram untouched, if
    /// the value is negative or beyond the tracked range.
    #[inline]
    pub fn record_value(&mut self, value: i64) -> bool {
        self.record_values(value, 1)
    }

    /// Record `count` occurrences of a value. A `count` of zero for an
    /// in-range value returns true and leaves min and max alone, so they
    /// only ever describe values that hold a count.
    pub fn record_values(&mut self, value: i64, count: u64) -> bool {
        let index = match self.geometry.counts_index_for(value) {
            Some(index) => index,
            None => {
                tracing::trace!(value, "dropping value outside the trackable range");
                return false;
            }
        };
        if count == 0 {
            return true;
        }

        let slot = self.normalize_index(index);
        self.counts[slot] = self.counts[slot].saturating_add(count);
        self.total_count = self.total_count.saturating_add(count);
        self.update_min_max(value);
        true
    }

    /// Clear all recorded values. The geometry and index offset are kept.
    pub fn reset(&mut self) {
        self.counts.fill(0);
        self.total_count = 0;
        self.min_value = i64::MAX;
        self.max_value = 0;
    }

    /// Lowest recorded value, at slot resolution. `i64::MAX` when empty.
    pub fn min(&self) -> i64 {
        if self.count_at_index(0) > 0 {
            return 0;
        }
        self.non_zero_min()
    }

    /// Highest recorded value, at slot resolution. 0 when empty.
    pub fn max(&self) -> i64 {
        if self.max_value == 0 {
            return 0;
        }
        self.geometry.highest_equivalent_value(self.max_value)
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn count_at_value(&self, value: i64) -> u64 {
        self.geometry
            .counts_index_for(value)
            .map_or(0, |index| self.count_at_index(index))
    }

    pub fn count_at_index(&self, index: usize) -> u64 {
        if index >= self.counts.len() {
            return 0;
        }
        self.counts[self.normalize_index(index)]
    }

    pub fn value_at_index(&self, index: usize) -> i64 {
        self.geometry.value_at_index(index)
    }

    pub fn lowest_equivalent_value(&self, value: i64) -> i64 {
        self.geometry.lowest_equivalent_value(value)
    }

    pub fn highest_equivalent_value(&self, value: i64) -> i64 {
        self.geometry.highest_equivalent_value(value)
    }

    pub fn median_equivalent_value(&self, value: i64) -> i64 {
        self.geometry.median_equivalent_value(value)
    }

    pub fn size_of_equivalent_value_range(&self, value: i64) -> i64 {
        self.geometry.size_of_equivalent_value_range(value)
    }

    pub fn next_non_equivalent_value(&self, value: i64) -> i64 {
        self.geometry.next_non_equivalent_value(value)
    }

    pub fn values_are_equivalent(&self, a: i64, b: i64) -> bool {
        self.geometry.values_are_equivalent(a, b)
    }

    pub fn lowest_trackable_value(&self) -> i64 {
        self.geometry.lowest_trackable_value()
    }

    pub fn highest_trackable_value(&self) -> i64 {
        self.geometry.highest_trackable_value()
    }

    pub fn significant_figures(&self) -> u32 {
        self.geometry.significant_figures()
    }

    pub fn bucket_count(&self) -> usize {
        self.geometry.bucket_count()
    }

    pub fn sub_bucket_count(&self) -> usize {
        self.geometry.sub_bucket_count()
    }

    pub fn counts_len(&self) -> usize {
        self.counts.len()
    }

    /// See [`stats::value_at_percentile`].
    pub fn value_at_percentile(&self, percentile: f64) -> i64 {
        stats::value_at_percentile(self, percentile)
    }

    pub fn mean(&self) -> f64 {
        stats::mean(self)
    }

    pub fn stddev(&self) -> f64 {
        stats::stddev(self)
    }

    /// Visit every slot, recorded or not.
    pub fn iter_all(&self) -> Iter<'_> {
        Iter::all(self)
    }

    /// Visit only slots holding recorded values.
    pub fn iter_recorded(&self) -> Iter<'_> {
        Iter::recorded(self)
    }

    /// Visit percentile levels, `ticks_per_half_distance` ticks per halving
    /// of the distance to 100%.
    pub fn iter_percentiles(&self, ticks_per_half_distance: u32) -> Iter<'_> {
        Iter::percentiles(self, ticks_per_half_distance)
    }

    /// Visit value levels spaced `value_units_per_bucket` apart.
    pub fn iter_linear(&self, value_units_per_bucket: i64) -> Iter<'_> {
        Iter::linear(self, value_units_per_bucket)
    }

    /// Visit value levels starting at `value_units_first_bucket` and
    /// growing by `log_base` each step.
    pub fn iter_log(&self, value_units_first_bucket: i64, log_base: f64) -> Iter<'_> {
        Iter::log(self, value_units_first_bucket, log_base)
    }

    // Rotate a logical slot index onto the counts array.
    #[inline(always)]
    fn normalize_index(&self, index: usize) -> usize {
        if self.index_offset == 0 {
            return index;
        }
        if index >= self.index_offset {
            index - self.index_offset
        } else {
            index + self.counts.len() - self.index_offset
        }
    }

    fn non_zero_min(&self) -> i64 {
        if self.min_value == i64::MAX {
            return i64::MAX;
        }
        self.geometry.lowest_equivalent_value(self.min_value)
    }

    fn update_min_max(&mut self, value: i64) {
        if value != 0 && value < self.min_value {
            self.min_value = value;
        }
        if value > self.max_value {
            self.max_value = value;
        }
    }
}

#[test]
fn it_works() {
    let mut h = Histo::new(1, 3_600_000_000, 3).unwrap();
    assert!(h.record_value(4));
    assert_eq!(h.count_at_value(4), 1);
    assert_eq!(h.total_count(), 1);
    assert_eq!(h.min(), 4);
    assert_eq!(h.max(), 4);
}

#[test]
fn empty_sentinels() {
    let h = Histo::new(1, 100_000_000, 1).unwrap();
    assert_eq!(h.min(), i64::MAX);
    assert_eq!(h.max(), 0);
    assert_eq!(h.total_count(), 0);
    assert_eq!(h.count_at_value(12), 0);
}

#[test]
fn record_in_range_always_counts() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let highest = 3_600_000_000;
    let mut h = Histo::new(1, highest, 3).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..5_000 {
        let value: i64 = rng.random_range(0..=highest);
        let before_total = h.total_count();
        let before_slot = h.count_at_value(value);
        assert!(h.record_value(value));
        assert_eq!(h.total_count(), before_total + 1);
        assert_eq!(h.count_at_value(value), before_slot + 1);
    }
    assert!(h.record_value(0));
    assert!(h.record_value(highest));
}

#[test]
fn record_out_of_range_is_rejected() {
    let mut h = Histo::new(1, 1000, 4).unwrap();
    assert!(h.record_value(32767));
    assert!(!h.record_value(32768));
    assert!(!h.record_value(-1));
    assert!(!h.record_value(i64::MAX));
    assert!(!h.record_values(32768, 10));
    assert_eq!(h.total_count(), 1);
    assert_eq!(h.max(), 32767);
}

#[test]
fn record_many() {
    let mut h = Histo::new(1, 3_600_000_000, 3).unwrap();
    assert!(h.record_values(300_000, 6));
    assert!(h.record_values(11, 2));
    assert!(h.record_values(5, 0));
    assert_eq!(h.total_count(), 8);
    assert_eq!(h.count_at_value(300_000), 6);
    assert_eq!(h.count_at_value(5), 0);
    assert_eq!(h.min(), 11);
    assert_eq!(h.max(), h.highest_equivalent_value(300_000));
    assert_eq!(h.counts.iter().sum::<u64>(), h.total_count());
}

#[test]
fn zero_count_leaves_min_and_max() {
    let mut h = Histo::new(1, 3_600_000_000, 3).unwrap();
    assert!(h.record_values(1_000, 0));
    assert_eq!(h.min(), i64::MAX);
    assert_eq!(h.max(), 0);

    assert!(h.record_value(50));
    assert!(h.record_values(7, 0));
    assert!(h.record_values(90_000, 0));
    assert_eq!(h.min(), 50);
    assert_eq!(h.max(), 50);
    assert_eq!(h.total_count(), 1);
}

#[test]
fn zero_is_tracked_apart_from_min() {
    let mut h = Histo::new(1, 3_600_000_000, 3).unwrap();
    assert!(h.record_value(0));
    assert_eq!(h.min(), 0);
    assert_eq!(h.max(), 0);
    assert_eq!(h.min_value, i64::MAX);

    assert!(h.record_value(7));
    assert_eq!(h.min(), 0);
    assert_eq!(h.non_zero_min(), 7);
}

#[test]
fn reset_restores_empty_state() {
    let mut h = Histo::new(1, 3_600_000_000, 3).unwrap();
    for v in &[0, 1, 1_000, 2_000_000] {
        assert!(h.record_value(*v));
    }
    h.reset();
    assert_eq!(h.min(), i64::MAX);
    assert_eq!(h.max(), 0);
    assert_eq!(h.total_count(), 0);
    assert!(h.counts.iter().all(|c| *c == 0));

    assert!(h.record_value(9));
    assert_eq!(h.min(), 9);
}

#[test]
fn rotation_is_transparent() {
    let geometry = Geometry::new(1, 100_000, 2).unwrap();
    let mut plain = Histo::with_geometry(geometry);
    let mut rotated = Histo::with_index_offset(geometry, 100);

    for v in &[0_i64, 1, 99, 100, 101, 5_000, 99_999, 100_000] {
        assert!(plain.record_value(*v));
        assert!(rotated.record_value(*v));
    }
    assert_eq!(rotated.counts[0], 1);
    assert_ne!(plain.counts, rotated.counts);

    for index in 0..plain.counts_len() {
        assert_eq!(plain.count_at_index(index), rotated.count_at_index(index));
    }
    assert_eq!(plain.min(), rotated.min());
    assert_eq!(plain.max(), rotated.max());
    assert_eq!(plain.value_at_percentile(50.), rotated.value_at_percentile(50.));
    assert_eq!(
        plain.iter_recorded().collect::<Vec<_>>(),
        rotated.iter_recorded().collect::<Vec<_>>()
    );

    rotated.reset();
    assert_eq!(rotated.index_offset, 100);
}

#[test]
fn large_values_keep_precision() {
    let mut h = Histo::new(20_000_000, 100_000_000, 5).unwrap();
    assert!(h.record_value(100_000_000));
    assert!(h.record_value(20_000_000));
    assert!(h.record_value(30_000_000));

    assert!(h.values_are_equivalent(h.value_at_percentile(50.0), 20_000_000));
    assert!(h.values_are_equivalent(h.value_at_percentile(83.33), 30_000_000));
    assert!(h.values_are_equivalent(h.value_at_percentile(83.34), 100_000_000));
    assert!(h.values_are_equivalent(h.value_at_percentile(99.0), 100_000_000));
}

#[test]
fn count_at_index_outside_range() {
    let mut h = Histo::new(1, 255, 2).unwrap();
    assert!(h.record_value(255));
    assert_eq!(h.count_at_index(255), 1);
    assert_eq!(h.count_at_index(h.counts_len()), 0);
    assert_eq!(h.count_at_index(usize::MAX), 0);
}

#[test]
fn debug_lists_percentiles() {
    let mut h = Histo::new(1, 1000, 3).unwrap();
    assert!(h.record_value(2));
    assert!(h.record_value(3));
    let printed = format!("{:?}", h);
    assert!(printed.starts_with("Histogram[(0 -> 2) (50 -> 2)"));
    assert!(printed.ends_with("(100 -> 3) ]"));
}
