//! Colors and color ramps.
//!
//! Ramps are configured as hex strings (`#9db5ce`, `#ccc`) and sampled by linear
//! interpolation in RGB space, the way the map front ends blend their palettes.

use crate::error::{Result, StyleError};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Color used for features without data.
pub const FALLBACK_HEX: &str = "#cccccc";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const BLACK: Rgb8 = Rgb8 { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        static HEX: OnceLock<Regex> = OnceLock::new();
        let re = HEX.get_or_init(|| {
            Regex::new(r"^#?([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("valid hex color regex")
        });
        let digits = re
            .captures(hex.trim())
            .and_then(|c| c.get(1))
            .ok_or_else(|| StyleError::InvalidColor(hex.to_string()))?
            .as_str();

        // #abc expands to #aabbcc
        let expanded: String = if digits.len() == 3 {
            digits.chars().flat_map(|c| [c, c]).collect()
        } else {
            digits.to_string()
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map_err(|_| StyleError::InvalidColor(hex.to_string()))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Linear blend, `t` clamped to [0, 1].
    pub fn lerp(self, other: Rgb8, t: f64) -> Rgb8 {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb8 {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }

    pub fn fallback() -> Rgb8 {
        Rgb8::new(0xcc, 0xcc, 0xcc)
    }
}

impl fmt::Display for Rgb8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb8 {
    type Err = StyleError;

    fn from_str(s: &str) -> Result<Self> {
        Rgb8::from_hex(s)
    }
}

impl Serialize for Rgb8 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb8 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Rgb8::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Ordered color stops for one indicator.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorRamp {
    stops: Vec<Rgb8>,
}

impl ColorRamp {
    pub fn new(stops: Vec<Rgb8>) -> Result<Self> {
        if stops.len() < 2 {
            return Err(StyleError::ShortRamp(stops.len()));
        }
        Ok(Self { stops })
    }

    pub fn from_hex<S: AsRef<str>>(colors: &[S]) -> Result<Self> {
        let stops = colors
            .iter()
            .map(|c| Rgb8::from_hex(c.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(stops)
    }

    pub fn stops(&self) -> &[Rgb8] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Color at position `t` in [0, 1] along the ramp (clamped).
    pub fn sample(&self, t: f64) -> Rgb8 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let segments = (self.stops.len() - 1) as f64;
        let pos = t * segments;
        let i = (pos.floor() as usize).min(self.stops.len() - 2);
        self.stops[i].lerp(self.stops[i + 1], pos - i as f64)
    }

    /// `n` colors evenly spaced from the first to the last stop.
    pub fn resample(&self, n: usize) -> Vec<Rgb8> {
        match n {
            0 => Vec::new(),
            1 => vec![self.stops[0]],
            _ => (0..n)
                .map(|i| self.sample(i as f64 / (n - 1) as f64))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_hex() {
        assert_eq!(Rgb8::from_hex("#ccc").unwrap(), Rgb8::new(204, 204, 204));
        assert_eq!(Rgb8::from_hex("#4d7596").unwrap(), Rgb8::new(0x4d, 0x75, 0x96));
        assert_eq!(Rgb8::from_hex("023858").unwrap().to_hex(), "#023858");
        assert!(matches!(Rgb8::from_hex("#12"), Err(StyleError::InvalidColor(_))));
        assert!(Rgb8::from_hex("blue").is_err());
    }

    #[test]
    fn ramp_sampling_hits_stops() {
        let ramp = ColorRamp::from_hex(&["#000000", "#ffffff", "#ff0000"]).unwrap();
        assert_eq!(ramp.sample(0.0), Rgb8::BLACK);
        assert_eq!(ramp.sample(0.5), Rgb8::new(255, 255, 255));
        assert_eq!(ramp.sample(1.0), Rgb8::new(255, 0, 0));
        assert_eq!(ramp.sample(0.25), Rgb8::new(128, 128, 128));
        assert_eq!(ramp.resample(3), ramp.stops().to_vec());
    }

    #[test]
    fn single_color_ramp_is_rejected() {
        assert_eq!(
            ColorRamp::from_hex(&["#fff"]),
            Err(StyleError::ShortRamp(1))
        );
    }
}
