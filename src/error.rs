use thiserror::Error;

/// Reasons a histogram geometry cannot be constructed.
///
/// Every variant is an invalid argument: the caller has to pick
/// different construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("lowest trackable value must be at least 1, got {lowest}")]
    LowestTooSmall { lowest: i64 },

    #[error("significant figures must be between 1 and 5, got {significant_figures}")]
    SignificantFigures { significant_figures: u32 },

    #[error("highest trackable value {highest} must be at least twice the lowest ({lowest})")]
    HighestTooSmall { lowest: i64, highest: i64 },

    #[error("unit magnitude {unit_magnitude} plus sub-bucket magnitude {sub_bucket_magnitude} exceeds 61")]
    Magnitude {
        unit_magnitude: u32,
        sub_bucket_magnitude: u32,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[test]
fn error_messages_name_the_argument() {
    let err = Error::LowestTooSmall { lowest: 0 };
    assert_eq!(err.to_string(), "lowest trackable value must be at least 1, got 0");

    let err = Error::HighestTooSmall {
        lowest: 10,
        highest: 15,
    };
    assert!(err.to_string().contains("15"));
}
