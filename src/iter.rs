//! Cursors over a histogram's counts slots.
//!
//! Every cursor walks the same slot sequence in ascending value order;
//! the variants differ only in when they stop to report a step.

use std::iter::FusedIterator;

use super::*;

/// The values a cursor reports after a successful [`Iter::advance`].
///
/// `count`, `value` and the equivalent-value fields describe the slot the
/// cursor currently rests on.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Step {
    /// Count held by the current slot.
    pub count: u64,
    /// Counts of every slot visited so far, the current one included.
    pub cumulative_count: u64,
    /// Lowest value of the current slot.
    pub value: i64,
    pub lowest_equivalent_value: i64,
    pub highest_equivalent_value: i64,
    pub median_equivalent_value: i64,
    pub value_iterated_from: i64,
    pub value_iterated_to: i64,
    /// Counts of the slots consumed while producing this step.
    pub count_added_in_this_iteration_step: u64,
    /// Percentile level of this step: the reporting level for percentile
    /// cursors, the cumulative share of the total for every other cursor.
    pub percentile: f64,
}

#[derive(Debug, Clone, Copy)]
struct Percentiles {
    ticks_per_half_distance: u32,
    percentile_to_iterate_to: f64,
    seen_last_value: bool,
}

#[derive(Debug, Clone, Copy)]
struct Level {
    value: i64,
    lowest_equivalent: i64,
}

impl Level {
    fn at(histo: &Histo, value: i64) -> Level {
        Level {
            value,
            lowest_equivalent: histo.lowest_equivalent_value(value),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Policy {
    All,
    Recorded,
    Percentile(Percentiles),
    Linear {
        value_units_per_bucket: i64,
        level: Level,
    },
    Log {
        log_base: f64,
        next_level: f64,
        level: Level,
    },
}

/// A read-only cursor over one histogram.
///
/// The histogram stays borrowed for the cursor's lifetime, so the counts
/// cannot change under it. Once `advance()` returns false it keeps doing so.
pub struct Iter<'a> {
    histo: &'a Histo,
    policy: Policy,
    counts_index: isize,
    total_count: u64,
    exhausted: bool,
    step: Step,
}

impl<'a> Iter<'a> {
    fn new(histo: &'a Histo, policy: Policy) -> Iter<'a> {
        Iter {
            histo,
            policy,
            counts_index: -1,
            total_count: histo.total_count(),
            exhausted: false,
            step: Step::default(),
        }
    }

    /// Step through every slot, recorded or not.
    pub fn all(histo: &'a Histo) -> Iter<'a> {
        Iter::new(histo, Policy::All)
    }

    /// Step through slots holding at least one recorded value.
    pub fn recorded(histo: &'a Histo) -> Iter<'a> {
        Iter::new(histo, Policy::Recorded)
    }

    /// Step through percentile levels. The distance to 100% is halved
    /// `ticks_per_half_distance` steps at a time, so levels get denser
    /// towards the tail. A final step always reports 100%.
    pub fn percentiles(histo: &'a Histo, ticks_per_half_distance: u32) -> Iter<'a> {
        let ticks_per_half_distance = if ticks_per_half_distance == 0 {
            tracing::warn!("percentile ticks per half distance must be positive, using 1");
            1
        } else {
            ticks_per_half_distance
        };
        Iter::new(
            histo,
            Policy::Percentile(Percentiles {
                ticks_per_half_distance,
                percentile_to_iterate_to: 0.0,
                seen_last_value: false,
            }),
        )
    }

    /// Step through value levels `value_units_per_bucket` apart. Each step
    /// adds up the slots not already reported, up to and including the
    /// slot holding its level.
    pub fn linear(histo: &'a Histo, value_units_per_bucket: i64) -> Iter<'a> {
        let value_units_per_bucket = if value_units_per_bucket < 1 {
            tracing::warn!(value_units_per_bucket, "linear bucket width must be positive, using 1");
            1
        } else {
            value_units_per_bucket
        };
        Iter::new(
            histo,
            Policy::Linear {
                value_units_per_bucket,
                level: Level::at(histo, value_units_per_bucket),
            },
        )
    }

    /// Step through value levels starting at `value_units_first_bucket`
    /// and multiplied by `log_base` after each step.
    pub fn log(histo: &'a Histo, value_units_first_bucket: i64, log_base: f64) -> Iter<'a> {
        let value_units_first_bucket = if value_units_first_bucket < 1 {
            tracing::warn!(value_units_first_bucket, "first log bucket must be positive, using 1");
            1
        } else {
            value_units_first_bucket
        };
        let log_base = if log_base > 1.0 {
            log_base
        } else {
            tracing::warn!(log_base, "log base must exceed 1, using 2");
            2.0
        };
        Iter::new(
            histo,
            Policy::Log {
                log_base,
                next_level: value_units_first_bucket as f64,
                level: Level::at(histo, value_units_first_bucket),
            },
        )
    }

    /// Move to the next step. Returns false once the cursor is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }

        let advanced = match self.policy {
            Policy::All => self.advance_all(),
            Policy::Recorded => self.advance_recorded(),
            Policy::Percentile(mut percentiles) => {
                let advanced = self.advance_percentile(&mut percentiles);
                self.policy = Policy::Percentile(percentiles);
                advanced
            }
            Policy::Linear {
                value_units_per_bucket,
                level,
            } => {
                let advanced = self.advance_to_level(level);
                if advanced {
                    match level.value.checked_add(value_units_per_bucket) {
                        Some(next) => {
                            self.policy = Policy::Linear {
                                value_units_per_bucket,
                                level: Level::at(self.histo, next),
                            }
                        }
                        // no level left to report
                        None => self.exhausted = true,
                    }
                }
                advanced
            }
            Policy::Log {
                log_base,
                next_level,
                level,
            } => {
                let advanced = self.advance_to_level(level);
                if advanced {
                    let next_level = next_level * log_base;
                    if next_level >= i64::MAX as f64 {
                        self.exhausted = true;
                    }
                    self.policy = Policy::Log {
                        log_base,
                        next_level,
                        level: Level::at(self.histo, next_level as i64),
                    };
                }
                advanced
            }
        };

        if !advanced {
            self.exhausted = true;
        }
        advanced
    }

    /// The most recent step.
    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn advance_all(&mut self) -> bool {
        if !self.move_next() {
            return false;
        }
        self.update_iterated_values(self.step.value);
        self.step.count_added_in_this_iteration_step = self.step.count;
        true
    }

    fn advance_recorded(&mut self) -> bool {
        while self.basic_next() {
            if self.step.count != 0 {
                self.update_iterated_values(self.step.value);
                self.step.count_added_in_this_iteration_step = self.step.count;
                return true;
            }
        }
        false
    }

    fn advance_percentile(&mut self, percentiles: &mut Percentiles) -> bool {
        if !self.has_next() {
            return self.last_percentile_step(percentiles);
        }

        loop {
            if self.counts_index >= 0 && self.step.count != 0 {
                let current_percentile =
                    100.0 * self.step.cumulative_count as f64 / self.total_count as f64;
                if percentiles.percentile_to_iterate_to <= current_percentile {
                    self.update_iterated_values(self.step.highest_equivalent_value);
                    self.step.percentile = percentiles.percentile_to_iterate_to;
                    percentiles.percentile_to_iterate_to += percentile_step(
                        percentiles.percentile_to_iterate_to,
                        percentiles.ticks_per_half_distance,
                    );
                    return true;
                }
            }
            if !self.basic_next() {
                return self.last_percentile_step(percentiles);
            }
        }
    }

    // One extra step reporting 100%, after all recorded values.
    fn last_percentile_step(&mut self, percentiles: &mut Percentiles) -> bool {
        if percentiles.seen_last_value {
            return false;
        }
        percentiles.seen_last_value = true;
        self.step.percentile = 100.0;
        true
    }

    // Consume slots until the current one reaches `level`, then report the
    // level. Once the counts run out, levels inside the last consumed slot
    // are still reported, with nothing added.
    fn advance_to_level(&mut self, level: Level) -> bool {
        self.step.count_added_in_this_iteration_step = 0;
        if !self.has_next() && !self.next_value_exceeds(level.lowest_equivalent) {
            return false;
        }

        while self.step.value < level.lowest_equivalent {
            if !self.move_next() {
                break;
            }
            self.step.count_added_in_this_iteration_step += self.step.count;
        }

        self.update_iterated_values(level.value);
        true
    }

    fn has_next(&self) -> bool {
        self.step.cumulative_count < self.total_count
    }

    fn basic_next(&mut self) -> bool {
        self.has_next() && self.move_next()
    }

    fn next_value_exceeds(&self, value: i64) -> bool {
        let next = self.counts_index + 1;
        if next > self.histo.counts_len() as isize {
            return false;
        }
        self.histo.value_at_index(next as usize) > value
    }

    fn move_next(&mut self) -> bool {
        let counts_len = self.histo.counts_len() as isize;
        if self.counts_index + 1 >= counts_len {
            self.counts_index = counts_len;
            return false;
        }
        self.counts_index += 1;

        let index = self.counts_index as usize;
        let count = self.histo.count_at_index(index);
        let value = self.histo.value_at_index(index);
        let cumulative_count = self.step.cumulative_count.saturating_add(count);

        self.step.count = count;
        self.step.cumulative_count = cumulative_count;
        self.step.value = value;
        self.step.lowest_equivalent_value = self.histo.lowest_equivalent_value(value);
        self.step.highest_equivalent_value = self.histo.highest_equivalent_value(value);
        self.step.median_equivalent_value = self.histo.median_equivalent_value(value);
        self.step.percentile = if self.total_count == 0 {
            0.0
        } else {
            100.0 * cumulative_count as f64 / self.total_count as f64
        };
        true
    }

    fn update_iterated_values(&mut self, value_iterated_to: i64) {
        self.step.value_iterated_from = self.step.value_iterated_to;
        self.step.value_iterated_to = value_iterated_to;
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        if self.advance() {
            Some(self.step)
        } else {
            None
        }
    }
}

impl<'a> FusedIterator for Iter<'a> {}

// Distance to the next percentile level: `ticks` levels for each halving
// of the remaining distance to 100%.
fn percentile_step(percentile: f64, ticks_per_half_distance: u32) -> f64 {
    let halvings = (100.0 / (100.0 - percentile)).log2().floor() + 1.0;
    let half_distance = 2_f64.powf(halvings) as i64;
    let reporting_ticks = i64::from(ticks_per_half_distance).saturating_mul(half_distance);
    100.0 / reporting_ticks as f64
}

#[cfg(test)]
fn scattered() -> Histo {
    let mut h = Histo::new(1, 255, 2).unwrap();
    for v in &[193, 255, 0, 1, 64, 128] {
        assert!(h.record_value(*v));
    }
    h
}

#[test]
fn empty_percentiles_emit_one_final_step() {
    let h = Histo::new(1, 3_600_000_000, 3).unwrap();
    let mut iter = h.iter_percentiles(5);
    assert!(iter.advance());
    assert_eq!(iter.step().percentile, 100.0);
    assert_eq!(iter.step().cumulative_count, 0);
    assert!(!iter.advance());
    assert!(!iter.advance());
    assert!(iter.is_exhausted());
}

#[test]
fn full_mass_in_last_bucket_emits_final_step_once() {
    let mut h = Histo::new(1, 3_600_000_000, 3).unwrap();
    assert!(h.record_values(1_000, 10));

    let steps: Vec<Step> = h.iter_percentiles(5).collect();
    let percentiles: Vec<f64> = steps.iter().map(|s| s.percentile).collect();
    assert_eq!(percentiles, vec![0.0, 100.0]);
    assert_eq!(steps[0].value_iterated_to, 1_000);
    assert_eq!(steps[1].highest_equivalent_value, 1_000);
    assert_eq!(steps[1].cumulative_count, 10);
}

#[test]
fn percentile_levels_halve_towards_the_tail() {
    let mut h = Histo::new(1, 1000, 3).unwrap();
    for v in 1..=100 {
        assert!(h.record_value(v));
    }

    let steps: Vec<(f64, i64)> = h
        .iter_percentiles(5)
        .take(8)
        .map(|s| (s.percentile, s.value_iterated_to))
        .collect();
    assert_eq!(
        steps,
        vec![
            (0.0, 1),
            (10.0, 10),
            (20.0, 20),
            (30.0, 30),
            (40.0, 40),
            (50.0, 50),
            (55.0, 55),
            (60.0, 60)
        ]
    );
}

#[test]
fn percentile_steps_are_monotonic() {
    let mut h = Histo::new(1, 100_000, 4).unwrap();
    for v in 1..=100_000 {
        assert!(h.record_value(v));
    }

    let steps: Vec<Step> = h.iter_percentiles(5).collect();
    assert!(steps.len() < h.counts_len() / 100);
    for pair in steps.windows(2) {
        assert!(pair[0].percentile < pair[1].percentile);
        assert!(pair[0].cumulative_count <= pair[1].cumulative_count);
        assert!(pair[0].highest_equivalent_value <= pair[1].highest_equivalent_value);
    }
    assert_eq!(steps.iter().filter(|s| s.percentile == 100.0).count(), 1);
    let last = steps.last().unwrap();
    assert_eq!(last.percentile, 100.0);
    assert_eq!(last.cumulative_count, h.total_count());
}

#[test]
fn recorded_skips_empty_slots() {
    let h = scattered();
    let steps: Vec<Step> = h.iter_recorded().collect();
    let values: Vec<i64> = steps.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![0, 1, 64, 128, 193, 255]);
    assert!(steps.iter().all(|s| s.count_added_in_this_iteration_step == 1));
    assert_eq!(steps[3].value_iterated_from, 64);
    assert_eq!(steps[3].value_iterated_to, 128);
    assert_eq!(steps[5].cumulative_count, 6);
    assert_eq!(steps[5].percentile, 100.0);
}

#[test]
fn all_visits_every_slot() {
    let h = scattered();
    let steps: Vec<Step> = h.iter_all().collect();
    assert_eq!(steps.len(), h.counts_len());
    assert_eq!(steps.iter().map(|s| s.count).sum::<u64>(), 6);
    assert_eq!(steps.last().unwrap().cumulative_count, 6);

    let empty = Histo::new(1, 255, 2).unwrap();
    assert_eq!(empty.iter_all().count(), empty.counts_len());
}

#[test]
fn linear_partitions_value_range() {
    let h = scattered();
    let steps: Vec<(i64, i64, u64)> = h
        .iter_linear(64)
        .map(|s| {
            (
                s.value_iterated_from,
                s.value_iterated_to,
                s.count_added_in_this_iteration_step,
            )
        })
        .collect();
    // a value sitting on a level belongs to the step ending there
    assert_eq!(
        steps,
        vec![(0, 64, 3), (64, 128, 1), (128, 192, 0), (192, 256, 2)]
    );
}

#[test]
fn linear_continues_through_a_wide_last_slot() {
    let mut h = Histo::new(1, 10_000, 1).unwrap();
    assert!(h.record_value(1000));
    assert_eq!(h.lowest_equivalent_value(1000), 992);
    assert_eq!(h.next_non_equivalent_value(1000), 1024);

    let steps: Vec<Step> = h.iter_linear(8).collect();
    assert_eq!(steps.len(), 127);

    let counted: Vec<(i64, u64)> = steps
        .iter()
        .filter(|s| s.count_added_in_this_iteration_step != 0)
        .map(|s| (s.value_iterated_to, s.count_added_in_this_iteration_step))
        .collect();
    assert_eq!(counted, vec![(992, 1)]);

    let tail: Vec<i64> = steps[123..].iter().map(|s| s.value_iterated_to).collect();
    assert_eq!(tail, vec![992, 1000, 1008, 1016]);
    assert!(steps[124..].iter().all(|s| s.cumulative_count == 1));
}

#[test]
fn log_levels_grow_geometrically() {
    let h = scattered();
    let steps: Vec<(i64, u64)> = h
        .iter_log(1, 2.0)
        .map(|s| (s.value_iterated_to, s.count_added_in_this_iteration_step))
        .collect();
    assert_eq!(
        steps,
        vec![
            (1, 2),
            (2, 0),
            (4, 0),
            (8, 0),
            (16, 0),
            (32, 0),
            (64, 1),
            (128, 1),
            (256, 2)
        ]
    );
}

#[test]
fn linear_stops_at_the_top_of_the_value_range() {
    let mut h = Histo::new(1, i64::MAX, 1).unwrap();
    assert!(h.record_value(i64::MAX - 1));

    let steps: Vec<Step> = h.iter_linear(i64::MAX / 2).collect();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].count_added_in_this_iteration_step, 1);
    assert_eq!(steps[1].value_iterated_to, i64::MAX - 1);
}

#[test]
fn added_counts_cover_the_total() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut h = Histo::new(1, 1_000_000, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..2_000 {
        let value: i64 = rng.random_range(0..=1_000_000);
        assert!(h.record_value(value));
    }

    let added = |iter: Iter| -> u64 { iter.map(|s| s.count_added_in_this_iteration_step).sum() };
    assert_eq!(added(h.iter_linear(1_000)), 2_000);
    assert_eq!(added(h.iter_linear(7)), 2_000);
    assert_eq!(added(h.iter_log(10, 1.5)), 2_000);
    assert_eq!(added(h.iter_recorded()), 2_000);
}

#[test]
fn degenerate_parameters_are_replaced() {
    let h = scattered();
    assert_eq!(h.iter_linear(0).count(), h.iter_linear(1).count());
    assert_eq!(h.iter_log(0, 0.5).count(), h.iter_log(1, 2.0).count());
    assert_eq!(h.iter_percentiles(0).count(), h.iter_percentiles(1).count());
}

#[test]
fn empty_histogram_has_no_value_steps() {
    let h = Histo::new(1, 255, 2).unwrap();
    assert_eq!(h.iter_recorded().count(), 0);
    assert_eq!(h.iter_linear(64).count(), 0);
    assert_eq!(h.iter_log(1, 2.0).count(), 0);
}
