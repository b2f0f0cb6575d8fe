use serde::{Deserialize, Serialize};

use super::*;

/// Construction parameters for a [`Histo`].
///
/// Missing fields fall back to the defaults, which track 1ns to one hour
/// at three significant figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lowest_trackable_value: i64,
    pub highest_trackable_value: i64,
    pub significant_figures: u32,
    /// Circular rotation applied to every counts slot. Zero is the
    /// identity and the only value recording ever needs; a non-zero
    /// offset is reserved for ring-buffered reuse of the counts array.
    pub index_offset: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            lowest_trackable_value: 1,
            highest_trackable_value: 3_600_000_000,
            significant_figures: 3,
            index_offset: 0,
        }
    }
}

impl Config {
    /// Validate the parameters and compute the bucket geometry.
    pub fn geometry(&self) -> Result<Geometry> {
        Geometry::new(
            self.lowest_trackable_value,
            self.highest_trackable_value,
            self.significant_figures,
        )
    }

    /// Build an empty histogram from this configuration.
    pub fn build(&self) -> Result<Histo> {
        let geometry = self.geometry()?;
        Ok(Histo::with_index_offset(geometry, self.index_offset))
    }
}

#[test]
fn defaults_fill_missing_fields() {
    let config: Config = serde_json::from_str(r#"{"significant_figures": 2}"#).unwrap();
    assert_eq!(config.significant_figures, 2);
    assert_eq!(config.lowest_trackable_value, 1);
    assert_eq!(config.highest_trackable_value, 3_600_000_000);
    assert_eq!(config.index_offset, 0);

    let histo = config.build().unwrap();
    assert_eq!(histo.significant_figures(), 2);
}

#[test]
fn serialized_config_reads_back() {
    let config = Config {
        lowest_trackable_value: 1000,
        highest_trackable_value: 60_000_000_000,
        significant_figures: 4,
        index_offset: 17,
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn invalid_config_is_rejected() {
    let config = Config {
        significant_figures: 6,
        ..Config::default()
    };
    assert_eq!(
        config.build().unwrap_err(),
        Error::SignificantFigures {
            significant_figures: 6
        }
    );
}
