//! Match formats and the format→duration policy.
//!
//! The policy is a pure function injected into the engine; the standard
//! mapping is one hour per 5-a-side match, two for 7-a-side and three for
//! 11-a-side.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::value_objects::DomainError;

/// Shortest bookable slot in hours.
pub const MIN_DURATION_HOURS: u8 = 1;
/// Longest bookable slot in hours.
pub const MAX_DURATION_HOURS: u8 = 3;

/// Team format of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchFormat {
    /// 5-a-side (8 player squad)
    #[serde(rename = "5-a-side")]
    FiveASide,
    /// 7-a-side (11 player squad)
    #[serde(rename = "7-a-side")]
    SevenASide,
    /// 11-a-side (14 player squad)
    #[serde(rename = "11-a-side")]
    ElevenASide,
}

impl MatchFormat {
    /// Canonical string form used in storage and the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchFormat::FiveASide => "5-a-side",
            MatchFormat::SevenASide => "7-a-side",
            MatchFormat::ElevenASide => "11-a-side",
        }
    }
}

impl FromStr for MatchFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "5-a-side" | "five_a_side" => Ok(MatchFormat::FiveASide),
            "7-a-side" | "seven_a_side" => Ok(MatchFormat::SevenASide),
            "11-a-side" | "eleven_a_side" => Ok(MatchFormat::ElevenASide),
            other => Err(DomainError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for MatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a match format to the number of hours it occupies a venue.
pub trait DurationPolicy: Send + Sync {
    /// Hours a match of `format` occupies.
    fn duration_hours(&self, format: MatchFormat) -> u8;

    /// Duration for `format`, checked against the bookable range.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidDuration` if the policy yields a
    /// duration outside `1..=3`.
    fn checked_duration(&self, format: MatchFormat) -> Result<u8, DomainError> {
        let hours = self.duration_hours(format);
        if !(MIN_DURATION_HOURS..=MAX_DURATION_HOURS).contains(&hours) {
            return Err(DomainError::InvalidDuration(format!(
                "{} maps to {}h, expected {}..={}h",
                format, hours, MIN_DURATION_HOURS, MAX_DURATION_HOURS
            )));
        }
        Ok(hours)
    }
}

/// The standard format→duration mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDurations;

impl DurationPolicy for StandardDurations {
    fn duration_hours(&self, format: MatchFormat) -> u8 {
        match format {
            MatchFormat::FiveASide => 1,
            MatchFormat::SevenASide => 2,
            MatchFormat::ElevenASide => 3,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
