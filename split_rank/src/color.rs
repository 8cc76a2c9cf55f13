//! 24-bit colors and linear interpolation between them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::RankError;

/// 24-bit RGB color, written as `#rrggbb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `rrggbb`, with or without a leading `#`.
    pub fn from_hex(hex: &str) -> Result<Self, RankError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RankError::InvalidColor(hex.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| RankError::InvalidColor(hex.to_string()))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn to_hex(self) -> String {
        self.to_string()
    }

    /// Per-channel linear interpolation from `self` (t = 0) to `other` (t = 1).
    ///
    /// `t` is applied as given; callers clamp it. Channels round half-up and
    /// saturate at the `u8` bounds.
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let mix = |a: u8, b: u8| -> u8 {
            let v = a as f64 + (b as f64 - a as f64) * t;
            (v + 0.5).floor().clamp(0.0, 255.0) as u8
        };
        Rgb {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }
}

/// Interpolate between two hex strings, returning `#rrggbb`.
pub fn lerp_hex(a: &str, b: &str, t: f64) -> Result<String, RankError> {
    Ok(Rgb::from_hex(a)?.lerp(Rgb::from_hex(b)?, t).to_hex())
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgb::from_hex(s)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Rgb::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip_forms() {
        let c = Rgb::from_hex("#FFFCB6").unwrap();
        assert_eq!(c, Rgb::new(0xff, 0xfc, 0xb6));
        assert_eq!(c.to_hex(), "#fffcb6");
        assert_eq!("4be04b".parse::<Rgb>().unwrap(), Rgb::new(0x4b, 0xe0, 0x4b));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(matches!(Rgb::from_hex("#fff"), Err(RankError::InvalidColor(_))));
        assert!(Rgb::from_hex("zzzzzz").is_err());
        assert!(Rgb::from_hex("#1234567").is_err());
    }

    #[test]
    fn midpoint_rounds_half_up() {
        // g: 252 -> 75 gives 163.5, b: 182 -> 75 gives 128.5
        assert_eq!(lerp_hex("fffcb6", "ff4b4b", 0.5).unwrap(), "#ffa481");
    }

    #[test]
    fn endpoints() {
        let a = Rgb::from_hex("fffcb6").unwrap();
        let b = Rgb::from_hex("4be04b").unwrap();
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn serde_uses_hex_strings() {
        let json = serde_json::to_string(&Rgb::new(1, 2, 3)).unwrap();
        assert_eq!(json, "\"#010203\"");
        let back: Rgb = serde_json::from_str("\"ff4b4b\"").unwrap();
        assert_eq!(back, Rgb::new(0xff, 0x4b, 0x4b));
    }
}
