//! Value → color and value → radius lookups built from class breaks.

use crate::color::{ColorRamp, Rgb8};
use crate::error::{Result, StyleError};
use crate::models::NumericValue;
use serde::{Deserialize, Serialize};

/// How colors are assigned between breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// One flat color per class.
    #[default]
    Step,
    /// Colors blend linearly between break stops.
    Linear,
}

/// Radius range for circles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusTier {
    pub zoom: f64,
    pub min: f64,
    pub max: f64,
}

impl RadiusTier {
    pub const fn new(zoom: f64, min: f64, max: f64) -> Self {
        Self { zoom, min, max }
    }
}

/// Zoom tiers used when an indicator configures radii without zoom levels.
pub const DEFAULT_TIER_ZOOMS: [f64; 2] = [3.0, 10.0];

#[derive(Debug, Clone, PartialEq)]
pub struct ColorLookup {
    mode: Interpolation,
    breaks: Vec<f64>,
    colors: Vec<Rgb8>,
    fallback: Rgb8,
}

impl ColorLookup {
    pub fn new(mode: Interpolation, breaks: &[f64], ramp: &ColorRamp, fallback: Rgb8) -> Result<Self> {
        match mode {
            Interpolation::Step => Self::stepwise(breaks, ramp, fallback),
            Interpolation::Linear => Self::continuous(breaks, ramp, fallback),
        }
    }

    /// One color per class (`breaks.len() - 1` classes). The ramp is used directly when
    /// it already has one color per class, otherwise it is resampled.
    pub fn stepwise(breaks: &[f64], ramp: &ColorRamp, fallback: Rgb8) -> Result<Self> {
        if breaks.len() < 2 {
            return Err(StyleError::InsufficientData);
        }
        let classes = breaks.len() - 1;
        let colors = if ramp.len() == classes {
            ramp.stops().to_vec()
        } else {
            ramp.resample(classes)
        };
        Ok(Self {
            mode: Interpolation::Step,
            breaks: breaks.to_vec(),
            colors,
            fallback,
        })
    }

    /// One color stop per break, spread evenly over the ramp.
    pub fn continuous(breaks: &[f64], ramp: &ColorRamp, fallback: Rgb8) -> Result<Self> {
        if breaks.len() < 2 {
            return Err(StyleError::InsufficientData);
        }
        Ok(Self {
            mode: Interpolation::Linear,
            breaks: breaks.to_vec(),
            colors: ramp.resample(breaks.len()),
            fallback,
        })
    }

    pub fn mode(&self) -> Interpolation {
        self.mode
    }

    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    pub fn colors(&self) -> &[Rgb8] {
        &self.colors
    }

    pub fn fallback(&self) -> Rgb8 {
        self.fallback
    }

    /// Class of `value` under the stepwise rule: inclusive lower bound, exclusive upper,
    /// values below the first threshold in class 0 and above the last in the top class.
    pub fn class_index(&self, value: f64) -> usize {
        let classes = self.breaks.len() - 1;
        self.breaks[1..classes]
            .iter()
            .take_while(|&&threshold| value >= threshold)
            .count()
    }

    pub fn color_for(&self, value: NumericValue) -> Rgb8 {
        let NumericValue::Present(v) = value else {
            return self.fallback;
        };
        match self.mode {
            Interpolation::Step => self.colors[self.class_index(v)],
            Interpolation::Linear => self.interpolate(v),
        }
    }

    fn interpolate(&self, v: f64) -> Rgb8 {
        let last = self.breaks.len() - 1;
        if v <= self.breaks[0] {
            return self.colors[0];
        }
        if v >= self.breaks[last] {
            return self.colors[last];
        }
        let i = self
            .breaks
            .windows(2)
            .position(|w| v >= w[0] && v <= w[1])
            .unwrap_or(last - 1);
        let (lo, hi) = (self.breaks[i], self.breaks[i + 1]);
        let t = if hi > lo { (v - lo) / (hi - lo) } else { 1.0 };
        self.colors[i].lerp(self.colors[i + 1], t)
    }
}

/// Circle radius by value, per zoom tier.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusLookup {
    low: f64,
    high: f64,
    tiers: Vec<RadiusTier>,
}

impl RadiusLookup {
    /// Radii run from each tier's `min` at `breaks[0]` to its `max` at the last break.
    pub fn new(breaks: &[f64], tiers: &[RadiusTier]) -> Result<Self> {
        let (Some(&low), Some(&high)) = (breaks.first(), breaks.last()) else {
            return Err(StyleError::InsufficientData);
        };
        let mut tiers = tiers.to_vec();
        tiers.sort_by(|a, b| a.zoom.total_cmp(&b.zoom));
        Ok(Self { low, high, tiers })
    }

    pub fn tiers(&self) -> &[RadiusTier] {
        &self.tiers
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    /// Radius for `value` within one tier, clamped to the tier's range.
    pub fn radius_in_tier(&self, tier: &RadiusTier, value: NumericValue) -> f64 {
        let NumericValue::Present(v) = value else {
            return 0.0;
        };
        if self.high <= self.low {
            return if v >= self.high { tier.max } else { tier.min };
        }
        let t = ((v - self.low) / (self.high - self.low)).clamp(0.0, 1.0);
        tier.min + (tier.max - tier.min) * t
    }

    /// Radius at an arbitrary zoom: linear between tiers, clamped beyond the outer tiers.
    pub fn radius(&self, value: NumericValue, zoom: f64) -> f64 {
        let (Some(first), Some(last)) = (self.tiers.first(), self.tiers.last()) else {
            return 0.0;
        };
        if zoom <= first.zoom {
            return self.radius_in_tier(first, value);
        }
        if zoom >= last.zoom {
            return self.radius_in_tier(last, value);
        }
        for pair in self.tiers.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if zoom >= a.zoom && zoom <= b.zoom {
                let ra = self.radius_in_tier(a, value);
                let rb = self.radius_in_tier(b, value);
                let t = if b.zoom > a.zoom {
                    (zoom - a.zoom) / (b.zoom - a.zoom)
                } else {
                    1.0
                };
                return ra + (rb - ra) * t;
            }
        }
        self.radius_in_tier(last, value)
    }
}
