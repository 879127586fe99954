//! Canonical plate identifiers and OCR candidate extraction
//!
//! A canonical plate is exactly 7 characters: a 3-letter uppercase prefix
//! beginning with the country marker "RA", 3 digits, and 1 uppercase letter
//! (e.g. "RAB123C"). Raw OCR text is a noisy oracle: extraction filters it
//! down to zero or one canonical candidate, it never raises.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Country marker that every valid plate starts with.
pub const COUNTRY_MARKER: &str = "RA";

/// Length of a canonical plate string.
pub const PLATE_LEN: usize = 7;

/// Validated canonical plate identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Plate(String);

impl Plate {
    /// Validate an exact canonical plate string.
    ///
    /// Accepts only the 7-character shape: uppercase letters x3 (starting
    /// with the country marker), digits x3, uppercase letter x1.
    pub fn parse(s: &str) -> Option<Plate> {
        if s.len() != PLATE_LEN || !s.starts_with(COUNTRY_MARKER) {
            return None;
        }

        let bytes = s.as_bytes();
        let prefix_ok = bytes[..3].iter().all(|b| b.is_ascii_uppercase());
        let digits_ok = bytes[3..6].iter().all(|b| b.is_ascii_digit());
        let suffix_ok = bytes[6].is_ascii_uppercase();

        if prefix_ok && digits_ok && suffix_ok {
            Some(Plate(s.to_string()))
        } else {
            None
        }
    }

    /// Extract a canonical candidate from raw OCR text.
    ///
    /// Whitespace and non-ASCII noise are stripped, then the text is scanned
    /// for the country marker anywhere in the string. At least 7 characters
    /// must remain from the marker onward; the window is truncated to
    /// exactly 7 and shape checked. Any failure yields None - garbage input
    /// is expected here.
    pub fn extract(raw: &str) -> Option<Plate> {
        let cleaned: String =
            raw.chars().filter(|c| c.is_ascii() && !c.is_whitespace()).collect();

        let start = cleaned.find(COUNTRY_MARKER)?;
        let candidate = &cleaned[start..];
        if candidate.len() < PLATE_LEN {
            return None;
        }

        Self::parse(&candidate[..PLATE_LEN])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Plate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plate::parse(s).ok_or_else(|| format!("invalid plate: {s}"))
    }
}

impl TryFrom<String> for Plate {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Plate> for String {
    fn from(p: Plate) -> String {
        p.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        assert!(Plate::parse("RAB123C").is_some());
        assert!(Plate::parse("RAA999Z").is_some());
    }

    #[test]
    fn test_parse_rejects_bad_shape() {
        assert!(Plate::parse("RAB12C").is_none()); // too short
        assert!(Plate::parse("RAB1234C").is_none()); // too long
        assert!(Plate::parse("RAb123C").is_none()); // lowercase prefix
        assert!(Plate::parse("RABX23C").is_none()); // letter in digits
        assert!(Plate::parse("RAB1233").is_none()); // digit suffix
        assert!(Plate::parse("XAB123C").is_none()); // missing marker
    }

    #[test]
    fn test_extract_exact() {
        let plate = Plate::extract("RAB123C").unwrap();
        assert_eq!(plate.as_str(), "RAB123C");
    }

    #[test]
    fn test_extract_marker_mid_string() {
        // OCR noise before the marker is skipped
        let plate = Plate::extract("XXRAB123C").unwrap();
        assert_eq!(plate.as_str(), "RAB123C");
    }

    #[test]
    fn test_extract_truncates_trailing_noise() {
        let plate = Plate::extract("RAB123CZZ").unwrap();
        assert_eq!(plate.as_str(), "RAB123C");
    }

    #[test]
    fn test_extract_strips_whitespace() {
        let plate = Plate::extract("  RA B 123 C \n").unwrap();
        assert_eq!(plate.as_str(), "RAB123C");
    }

    #[test]
    fn test_extract_rejects_short_window() {
        assert!(Plate::extract("RAB12C").is_none());
        assert!(Plate::extract("ZZZRA1").is_none());
    }

    #[test]
    fn test_extract_rejects_lowercase() {
        assert!(Plate::extract("RAb123C").is_none());
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(Plate::extract("").is_none());
        assert!(Plate::extract("no plate here").is_none());
        assert!(Plate::extract("1234567").is_none());
    }

    #[test]
    fn test_extract_drops_non_ascii_noise() {
        let plate = Plate::extract("ØØRAB123C").unwrap();
        assert_eq!(plate.as_str(), "RAB123C");
        assert!(Plate::extract("ØØRAB12C").is_none());
    }

    #[test]
    fn test_serde_round_trip() {
        let plate = Plate::parse("RAB123C").unwrap();
        let json = serde_json::to_string(&plate).unwrap();
        assert_eq!(json, "\"RAB123C\"");
        let back: Plate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plate);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<Plate, _> = serde_json::from_str("\"garbage\"");
        assert!(result.is_err());
    }
}
