//! Bucket geometry and the index algebra that maps values onto a dense
//! keyspace of counts slots.
//!
//! A value is split into a power-of-two `bucket` and a linear
//! `sub_bucket` inside it. Bucket 0 holds `sub_bucket_count` slots at
//! unit resolution; every later bucket only needs its upper half, since
//! its lower half is covered at finer resolution by the bucket before.

use super::*;

/// Sizing constants derived from the three tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    lowest_trackable_value: i64,
    highest_trackable_value: i64,
    significant_figures: u32,
    unit_magnitude: u32,
    sub_bucket_half_count_magnitude: u32,
    sub_bucket_count: usize,
    sub_bucket_half_count: usize,
    sub_bucket_mask: i64,
    bucket_count: usize,
    counts_len: usize,
}

impl Geometry {
    /// Compute the geometry for values in `[lowest, highest]` kept at
    /// `significant_figures` decimal digits of precision.
    pub fn new(lowest: i64, highest: i64, significant_figures: u32) -> Result<Geometry> {
        if lowest < 1 {
            return Err(Error::LowestTooSmall { lowest });
        }
        if significant_figures < 1 || significant_figures > 5 {
            return Err(Error::SignificantFigures {
                significant_figures,
            });
        }
        if lowest.checked_mul(2).map_or(true, |double| highest < double) {
            return Err(Error::HighestTooSmall { lowest, highest });
        }

        let unit_magnitude = 63 - lowest.leading_zeros();
        let sub_bucket_half_count_magnitude = sub_bucket_half_count_magnitude(significant_figures);
        if unit_magnitude + sub_bucket_half_count_magnitude > 61 {
            return Err(Error::Magnitude {
                unit_magnitude,
                sub_bucket_magnitude: sub_bucket_half_count_magnitude,
            });
        }

        let sub_bucket_count = 1_usize << (sub_bucket_half_count_magnitude + 1);
        let sub_bucket_half_count = sub_bucket_count / 2;
        let sub_bucket_mask = (sub_bucket_count as i64 - 1) << unit_magnitude;
        let bucket_count = buckets_needed(highest, sub_bucket_count, unit_magnitude);
        let counts_len = (bucket_count + 1) * sub_bucket_half_count;

        tracing::debug!(
            lowest,
            highest,
            significant_figures,
            bucket_count,
            sub_bucket_count,
            counts_len,
            "computed histogram geometry"
        );

        Ok(Geometry {
            lowest_trackable_value: lowest,
            highest_trackable_value: highest,
            significant_figures,
            unit_magnitude,
            sub_bucket_half_count_magnitude,
            sub_bucket_count,
            sub_bucket_half_count,
            sub_bucket_mask,
            bucket_count,
            counts_len,
        })
    }

    pub fn lowest_trackable_value(&self) -> i64 {
        self.lowest_trackable_value
    }

    pub fn highest_trackable_value(&self) -> i64 {
        self.highest_trackable_value
    }

    pub fn significant_figures(&self) -> u32 {
        self.significant_figures
    }

    pub fn unit_magnitude(&self) -> u32 {
        self.unit_magnitude
    }

    pub fn sub_bucket_half_count_magnitude(&self) -> u32 {
        self.sub_bucket_half_count_magnitude
    }

    pub fn sub_bucket_count(&self) -> usize {
        self.sub_bucket_count
    }

    pub fn sub_bucket_half_count(&self) -> usize {
        self.sub_bucket_half_count
    }

    pub fn sub_bucket_mask(&self) -> i64 {
        self.sub_bucket_mask
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Number of counts slots a histogram with this geometry allocates.
    pub fn counts_len(&self) -> usize {
        self.counts_len
    }

    /// The power-of-two bucket holding `value`.
    #[inline(always)]
    pub fn bucket_index(&self, value: i64) -> u32 {
        // bit length of the smallest power of two containing the value,
        // never below what a full sub-bucket span needs
        let pow2_ceiling = 64 - (value | self.sub_bucket_mask).leading_zeros();
        pow2_ceiling.saturating_sub(self.unit_magnitude + self.sub_bucket_half_count_magnitude + 1)
    }

    #[inline(always)]
    pub fn sub_bucket_index(&self, value: i64, bucket_index: u32) -> i64 {
        value >> (bucket_index + self.unit_magnitude)
    }

    /// Composite slot index of a `(bucket, sub_bucket)` pair.
    #[inline(always)]
    pub fn counts_index(&self, bucket_index: u32, sub_bucket_index: i64) -> i64 {
        let bucket_base_index = (i64::from(bucket_index) + 1) << self.sub_bucket_half_count_magnitude;
        let offset_in_bucket = sub_bucket_index - self.sub_bucket_half_count as i64;
        bucket_base_index + offset_in_bucket
    }

    /// Slot index for `value`, or `None` when the value is negative or
    /// beyond the tracked range.
    #[inline]
    pub fn counts_index_for(&self, value: i64) -> Option<usize> {
        if value < 0 {
            return None;
        }
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        let index = self.counts_index(bucket_index, sub_bucket_index);
        if index < 0 || index as usize >= self.counts_len {
            None
        } else {
            Some(index as usize)
        }
    }

    /// Lowest value mapping to slot `index`. Exact inverse of
    /// `counts_index_for` for every index below `counts_len`.
    pub fn value_at_index(&self, index: usize) -> i64 {
        let half = self.sub_bucket_half_count as i64;
        let mut bucket_index = (index >> self.sub_bucket_half_count_magnitude) as i64 - 1;
        let mut sub_bucket_index = (index & (self.sub_bucket_half_count - 1)) as i64 + half;

        if bucket_index < 0 {
            sub_bucket_index -= half;
            bucket_index = 0;
        }

        let shift = bucket_index as u64 + u64::from(self.unit_magnitude);
        if shift >= 63 {
            return i64::MAX;
        }
        sub_bucket_index << shift
    }

    /// Width of the range of values sharing `value`'s slot.
    pub fn size_of_equivalent_value_range(&self, value: i64) -> i64 {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        let adjusted_bucket = if sub_bucket_index >= self.sub_bucket_count as i64 {
            bucket_index + 1
        } else {
            bucket_index
        };
        1_i64 << (self.unit_magnitude + adjusted_bucket)
    }

    pub fn lowest_equivalent_value(&self, value: i64) -> i64 {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        sub_bucket_index << (bucket_index + self.unit_magnitude)
    }

    pub fn highest_equivalent_value(&self, value: i64) -> i64 {
        self.next_non_equivalent_value(value) - 1
    }

    pub fn median_equivalent_value(&self, value: i64) -> i64 {
        self.lowest_equivalent_value(value)
            .saturating_add(self.size_of_equivalent_value_range(value) >> 1)
    }

    /// Smallest value that lands in a different slot than `value`.
    pub fn next_non_equivalent_value(&self, value: i64) -> i64 {
        self.lowest_equivalent_value(value)
            .saturating_add(self.size_of_equivalent_value_range(value))
    }

    pub fn values_are_equivalent(&self, a: i64, b: i64) -> bool {
        self.lowest_equivalent_value(a) == self.lowest_equivalent_value(b)
    }
}

fn sub_bucket_half_count_magnitude(significant_figures: u32) -> u32 {
    let largest_value_with_single_unit_resolution =
        2.0 * 10_f64.powi(significant_figures as i32);
    let sub_bucket_count_magnitude = largest_value_with_single_unit_resolution.log2().ceil() as u32;
    if sub_bucket_count_magnitude > 1 {
        sub_bucket_count_magnitude - 1
    } else {
        0
    }
}

fn buckets_needed(highest: i64, sub_bucket_count: usize, unit_magnitude: u32) -> usize {
    let mut smallest_untrackable_value = (sub_bucket_count as i64) << unit_magnitude;
    let mut buckets_needed = 1;
    while smallest_untrackable_value <= highest {
        if smallest_untrackable_value > i64::MAX / 2 {
            return buckets_needed + 1;
        }
        smallest_untrackable_value <<= 1;
        buckets_needed += 1;
    }
    buckets_needed
}

#[test]
fn one_hour_of_nanos_at_three_figures() {
    let g = Geometry::new(1, 3_600_000_000, 3).unwrap();
    assert_eq!(g.unit_magnitude(), 0);
    assert_eq!(g.sub_bucket_half_count_magnitude(), 10);
    assert_eq!(g.sub_bucket_count(), 2048);
    assert_eq!(g.sub_bucket_half_count(), 1024);
    assert_eq!(g.sub_bucket_mask(), 2047);
    assert_eq!(g.bucket_count(), 22);
    assert_eq!(g.counts_len(), 23552);
}

#[test]
fn unit_magnitude_shifts_the_mask() {
    let g = Geometry::new(1000, 10_000_000, 2).unwrap();
    assert_eq!(g.unit_magnitude(), 9);
    assert_eq!(g.sub_bucket_count(), 256);
    assert_eq!(g.sub_bucket_mask(), 255 << 9);
    assert_eq!(g.lowest_equivalent_value(1000), 512);
}

#[test]
fn invalid_arguments() {
    assert_eq!(Geometry::new(0, 100, 3), Err(Error::LowestTooSmall { lowest: 0 }));
    assert_eq!(
        Geometry::new(1, 100, 0),
        Err(Error::SignificantFigures {
            significant_figures: 0
        })
    );
    assert_eq!(
        Geometry::new(1, 100, 6),
        Err(Error::SignificantFigures {
            significant_figures: 6
        })
    );
    assert_eq!(
        Geometry::new(10, 19, 3),
        Err(Error::HighestTooSmall {
            lowest: 10,
            highest: 19
        })
    );
    assert!(Geometry::new(10, 20, 3).is_ok());
    assert_eq!(
        Geometry::new(i64::MAX / 2 + 1, i64::MAX, 1),
        Err(Error::HighestTooSmall {
            lowest: i64::MAX / 2 + 1,
            highest: i64::MAX
        })
    );
    assert_eq!(
        Geometry::new(1 << 50, i64::MAX, 5),
        Err(Error::Magnitude {
            unit_magnitude: 50,
            sub_bucket_magnitude: 17
        })
    );
}

#[test]
fn full_range_stops_doubling_before_overflow() {
    let g = Geometry::new(1, i64::MAX, 3).unwrap();
    assert_eq!(g.bucket_count(), 53);
    assert_eq!(g.counts_len(), 54 * 1024);
    assert!(g.counts_index_for(i64::MAX).is_some());
}

#[test]
fn counts_len_and_minimal_bucket_count() {
    for &lowest in &[1_i64, 2, 7, 1000, 1 << 20] {
        for &highest_factor in &[2_i64, 3, 1000, 1 << 20] {
            for sf in 1..=5 {
                let highest = lowest * highest_factor;
                let g = Geometry::new(lowest, highest, sf).unwrap();
                assert_eq!(g.counts_len(), (g.bucket_count() + 1) * g.sub_bucket_count() / 2);

                let first = (g.sub_bucket_count() as i64) << g.unit_magnitude();
                assert!(first << (g.bucket_count() - 1) > highest);
                if g.bucket_count() > 1 {
                    assert!(first << (g.bucket_count() - 2) <= highest);
                }
            }
        }
    }
}

#[test]
fn index_round_trip() {
    let geometries = [
        Geometry::new(1, 3_600_000_000, 3).unwrap(),
        Geometry::new(1, 255, 2).unwrap(),
        Geometry::new(1000, 1_000_000_000, 1).unwrap(),
        Geometry::new(20_000_000, 100_000_000, 5).unwrap(),
    ];
    for g in &geometries {
        for index in 0..g.counts_len() {
            let value = g.value_at_index(index);
            assert_eq!(g.counts_index_for(value), Some(index), "value {}", value);
            assert_eq!(g.lowest_equivalent_value(value), value);
        }
        assert_eq!(g.counts_index_for(g.value_at_index(g.counts_len())), None);
    }
}

#[test]
fn lowest_equivalent_is_idempotent() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let g = Geometry::new(1, 3_600_000_000, 3).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..10_000 {
        let value: i64 = rng.random_range(0..=3_600_000_000);
        let lowest = g.lowest_equivalent_value(value);
        assert_eq!(g.lowest_equivalent_value(lowest), lowest);
        assert!(lowest <= value && value <= g.highest_equivalent_value(value));
        assert!(g.values_are_equivalent(value, lowest));
        assert!(!g.values_are_equivalent(value, g.next_non_equivalent_value(value)));
    }
}

#[test]
fn equivalent_ranges() {
    let g = Geometry::new(1, 3_600_000_000, 3).unwrap();
    assert_eq!(g.highest_equivalent_value(8180 * 1024), 8183 * 1024 + 1023);
    assert_eq!(g.highest_equivalent_value(8191 * 1024), 8191 * 1024 + 1023);
    assert_eq!(g.highest_equivalent_value(8193 * 1024), 8199 * 1024 + 1023);
    assert_eq!(g.highest_equivalent_value(9995 * 1024), 9999 * 1024 + 1023);
    assert_eq!(g.highest_equivalent_value(10007 * 1024), 10007 * 1024 + 1023);
    assert_eq!(g.highest_equivalent_value(10008 * 1024), 10015 * 1024 + 1023);

    assert_eq!(g.size_of_equivalent_value_range(1), 1);
    assert_eq!(g.size_of_equivalent_value_range(2047), 1);
    assert_eq!(g.size_of_equivalent_value_range(2048), 2);
    assert_eq!(g.size_of_equivalent_value_range(8180 * 1024), 4096);

    assert_eq!(g.lowest_equivalent_value(10007), 10000);
    assert_eq!(g.median_equivalent_value(10007), 10004);
    assert_eq!(g.next_non_equivalent_value(10007), 10008);
}
