//! Content identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest id the store will ever hand out (2^32)
pub const MAX_CONTENT_ID: u64 = 1 << 32;

/// Identifier of a stored content object.
///
/// Always in `[1, 2^32]`. On disk it is the decimal name of the content's
/// directory, so `Display` and `FromStr` must stay symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ContentId(u64);

/// Rejected content id value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidContentId {
    #[error("Content id out of range [1, {MAX_CONTENT_ID}]: {0}")]
    OutOfRange(u64),

    #[error("Content id is not a decimal integer: {0:?}")]
    NotANumber(String),
}

impl ContentId {
    /// Create an id, checking the range
    pub fn new(value: u64) -> Result<Self, InvalidContentId> {
        if (1..=MAX_CONTENT_ID).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidContentId::OutOfRange(value))
        }
    }

    /// Wrap a value already known to be in range
    pub(crate) fn from_raw(value: u64) -> Self {
        debug_assert!((1..=MAX_CONTENT_ID).contains(&value));
        Self(value)
    }

    /// Get the raw integer value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for ContentId {
    type Error = InvalidContentId;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentId> for u64 {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = InvalidContentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Only plain digits: "+7" or "007" would not round-trip to the same directory name
        if s.is_empty()
            || !s.bytes().all(|b| b.is_ascii_digit())
            || (s.len() > 1 && s.starts_with('0'))
        {
            return Err(InvalidContentId::NotANumber(s.to_string()));
        }
        let value: u64 = s
            .parse()
            .map_err(|_| InvalidContentId::NotANumber(s.to_string()))?;
        Self::new(value)
    }
}
