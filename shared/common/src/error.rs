//! Shared error type for the common crate's pure-function utilities.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("value {0} does not fit in {1} base-36 digits")]
    Base36Overflow(u64, usize),

    #[error("invalid declination {0}: must be in [-90, 90]")]
    InvalidDeclination(f64),

    #[error("invalid right ascension {0}: must be in [0, 360)")]
    InvalidRightAscension(f64),
}

pub type Result<T> = std::result::Result<T, Error>;
