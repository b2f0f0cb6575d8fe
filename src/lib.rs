//! A fixed-precision histogram over logarithmic buckets, for recording
//! latency or size distributions across a wide dynamic range in bounded
//! memory.
//!
//! Values are tracked with a configurable number of significant figures:
//! a histogram covering 1ns to one hour at 3 significant figures keeps
//! every recorded value within 0.1% and uses 23,552 counters.
//!
//! ```
//! use loghisto::{stats, Histo};
//!
//! let mut h = Histo::new(1, 3_600_000_000, 3).unwrap();
//! assert!(h.record_value(1_250));
//! assert!(h.record_values(80_000, 3));
//! assert!(!h.record_value(-1));
//!
//! assert_eq!(stats::value_at_percentile(&h, 50.0), 80_063);
//! for step in h.iter_percentiles(5) {
//!     println!("{:>8.3}% <= {}", step.percentile, step.highest_equivalent_value);
//! }
//! ```
//!
//! Recording is O(1) and allocation-free. A histogram has no internal
//! synchronization; share it across threads behind a lock, or keep one
//! per thread.

pub use config::Config;
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use histo::Histo;
pub use iter::{Iter, Step};

mod config;
mod error;
mod geometry;
mod histo;
mod iter;
pub mod stats;
