//! Human-facing incident codes (`"<number>/<year>"`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sequential incident code, unique within a year once it reaches the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IncidentCode {
    /// Sequence number within the year, starting at 1
    pub number: u32,
    /// Year the record was stamped in
    pub year: i32,
}

impl IncidentCode {
    pub const fn new(number: u32, year: i32) -> Self {
        Self { number, year }
    }

    /// Parse a code, returning `None` for anything that is not `<n>/<year>`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ronda_core::models::IncidentCode;
    ///
    /// assert_eq!(IncidentCode::parse(" 12/2025 "), Some(IncidentCode::new(12, 2025)));
    /// assert_eq!(IncidentCode::parse("A-12/2025"), None);
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let (number, year) = raw.trim().split_once('/')?;
        let number = number.trim();
        let year = year.trim();
        if number.is_empty() || !number.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        if year.len() != 4 || !year.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            number: number.parse().ok()?,
            year: year.parse().ok()?,
        })
    }
}

impl fmt::Display for IncidentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.year)
    }
}

impl FromStr for IncidentCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid incident code '{s}' (expected <n>/<year>)"))
    }
}

impl Serialize for IncidentCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IncidentCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
