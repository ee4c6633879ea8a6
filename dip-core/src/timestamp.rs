//! UTC timestamps used for change detection and deposit bookkeeping.
//!
//! Every persisted timestamp uses a single canonical form,
//! `YYYY-MM-DDTHH:MM:SS.ffffffZ` (microsecond precision). Values in any other
//! precision are rejected on read rather than silently mixed.

use crate::error::{DipError, Result};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Canonical on-disk format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

const FRACTION_DIGITS: usize = 6;

/// A point in time, always UTC, truncated to microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current time.
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(FRACTION_DIGITS as u16))
    }

    /// Convert a filesystem time (e.g. a modification time).
    pub fn from_system_time(time: SystemTime) -> Self {
        Self(DateTime::<Utc>::from(time).trunc_subsecs(FRACTION_DIGITS as u16))
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(FRACTION_DIGITS as u16))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Parse the canonical form.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: &str| DipError::Timestamp {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let body = value
            .strip_suffix('Z')
            .ok_or_else(|| invalid("missing trailing 'Z' (timestamps must be UTC)"))?;
        match body.split_once('.') {
            None => {
                return Err(invalid(
                    "second precision found; expected microsecond precision",
                ));
            }
            Some((_, fraction)) => {
                if fraction.len() != FRACTION_DIGITS
                    || !fraction.bytes().all(|b| b.is_ascii_digit())
                {
                    return Err(invalid(&format!(
                        "fraction has {} digits; expected {}",
                        fraction.len(),
                        FRACTION_DIGITS
                    )));
                }
            }
        }

        let naive = NaiveDateTime::parse_from_str(value, PARSE_FORMAT)
            .map_err(|e| invalid(&e.to_string()))?;
        Ok(Self(naive.and_utc()))
    }

    /// Form safe for use in file names on every platform (no ':').
    pub fn to_file_stem(&self) -> String {
        self.to_string().replace(':', "-")
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = DipError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
