//! Device identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// A device IMEI: exactly 15 ASCII decimal digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Imei(String);

impl Imei {
    pub const DIGITS: usize = 15;

    /// Parse an IMEI from its decimal representation.
    ///
    /// A 16-digit input with a leading zero (the packed-BCD form padded to
    /// eight bytes) is accepted and normalized to 15 digits.
    pub fn parse(digits: &str) -> Option<Self> {
        let digits = match digits.len() {
            16 if digits.starts_with('0') => &digits[1..],
            _ => digits,
        };

        if digits.len() != Self::DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Imei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Imei {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Imei::parse(&value).ok_or_else(|| format!("invalid IMEI: {value}"))
    }
}

impl From<Imei> for String {
    fn from(imei: Imei) -> Self {
        imei.0
    }
}
