// ABOUTME: Release version ids derived from creation timestamps.
// ABOUTME: Versions are monotonic so newer releases always sort after older ones.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SECONDS_FORMAT: &str = "%Y%m%d%H%M%S";
const DIGITS: usize = 17;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseVersionError {
    #[error("release version must be 17 digits, got {0:?}")]
    Format(String),
}

/// Identifier of one release attempt: its creation time at millisecond precision.
///
/// Rendered as 17 digits (`YYYYMMDDhhmmssSSS`), so lexical and chronological
/// order agree and the value can be embedded in container names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseVersion(DateTime<Utc>);

impl ReleaseVersion {
    /// A version for `now`, truncated to milliseconds.
    pub fn at(now: DateTime<Utc>) -> Self {
        let millis = now.timestamp_millis();
        Self(DateTime::from_timestamp_millis(millis).unwrap_or(now))
    }

    /// The next version, strictly after `latest` even if the clock went backwards.
    pub fn next(latest: Option<&ReleaseVersion>) -> Self {
        let candidate = Self::at(Utc::now());
        match latest {
            Some(latest) if candidate <= *latest => Self(latest.0 + TimeDelta::milliseconds(1)),
            _ => candidate,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:03}",
            self.0.format(SECONDS_FORMAT),
            self.0.timestamp_subsec_millis()
        )
    }
}

impl FromStr for ReleaseVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseVersionError::Format(s.to_string()));
        }
        let (seconds, millis) = s.split_at(DIGITS - 3);
        let naive = NaiveDateTime::parse_from_str(seconds, SECONDS_FORMAT)
            .map_err(|_| ParseVersionError::Format(s.to_string()))?;
        let millis: i64 = millis
            .parse()
            .map_err(|_| ParseVersionError::Format(s.to_string()))?;
        Ok(Self(naive.and_utc() + TimeDelta::milliseconds(millis)))
    }
}

impl Serialize for ReleaseVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReleaseVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_seventeen_digits() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 5, 7).unwrap() + TimeDelta::milliseconds(42);
        assert_eq!(ReleaseVersion::at(at).to_string(), "20261016090507042");
    }

    #[test]
    fn parses_what_it_renders() {
        let v = ReleaseVersion::next(None);
        let parsed: ReleaseVersion = v.to_string().parse().unwrap();
        assert_eq!(parsed, v);
    }

    #[test]
    fn next_is_strictly_after_a_future_latest() {
        let future = ReleaseVersion::at(Utc::now() + TimeDelta::hours(1));
        let next = ReleaseVersion::next(Some(&future));
        assert!(next > future);
        assert_eq!(next.created_at() - future.created_at(), TimeDelta::milliseconds(1));
    }

    #[test]
    fn rejects_malformed_versions() {
        assert!("2026".parse::<ReleaseVersion>().is_err());
        assert!("2026101609050704x".parse::<ReleaseVersion>().is_err());
        assert!("20261399090507042".parse::<ReleaseVersion>().is_err());
    }
}
