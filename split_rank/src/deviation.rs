//! Gradient coloring of a checkpoint placing against the row's overall placing.

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::RankError;

/// Three-stop gradient with a symmetric neutral zone around zero deviation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviationScale {
    /// Deviations within ±this percentage get the neutral color.
    pub dead_zone_percent: f64,
    /// Deviation (in percent) at which the gradient reaches its end color.
    pub max_percent: f64,
    pub neutral: Rgb,
    /// End color for measured values above the reference (a worse placing).
    pub worse: Rgb,
    /// End color for measured values below the reference (a better placing).
    pub better: Rgb,
}

impl Default for DeviationScale {
    fn default() -> Self {
        Self {
            dead_zone_percent: 10.0,
            max_percent: 50.0,
            neutral: Rgb::new(0xff, 0xfc, 0xb6),
            worse: Rgb::new(0xff, 0x4b, 0x4b),
            better: Rgb::new(0x4b, 0xe0, 0x4b),
        }
    }
}

impl DeviationScale {
    pub fn validate(&self) -> Result<(), RankError> {
        if !self.dead_zone_percent.is_finite() || self.dead_zone_percent < 0.0 {
            return Err(RankError::InvalidParameter(format!(
                "dead_zone_percent must be a non-negative number, got {}",
                self.dead_zone_percent
            )));
        }
        if !self.max_percent.is_finite() || self.max_percent <= self.dead_zone_percent {
            return Err(RankError::InvalidParameter(format!(
                "max_percent ({}) must exceed dead_zone_percent ({})",
                self.max_percent, self.dead_zone_percent
            )));
        }
        Ok(())
    }

    /// Color for a signed deviation percentage.
    pub fn color_for_percent(&self, percent: f64) -> Rgb {
        let span = self.max_percent - self.dead_zone_percent;
        let ramp = |excess: f64| {
            if span > 0.0 {
                (excess / span).min(1.0)
            } else {
                1.0
            }
        };
        if percent.abs() <= self.dead_zone_percent {
            self.neutral
        } else if percent > 0.0 {
            self.neutral
                .lerp(self.worse, ramp(percent - self.dead_zone_percent))
        } else {
            self.neutral
                .lerp(self.better, ramp(-percent - self.dead_zone_percent))
        }
    }
}

/// Signed percentage by which `measured` deviates from `reference`.
///
/// `None` when either value is missing or the reference is zero.
pub fn deviation_percent(reference: Option<u32>, measured: Option<u32>) -> Option<f64> {
    let reference = reference.filter(|r| *r != 0)?;
    let measured = measured?;
    let diff = measured as f64 - reference as f64;
    Some(diff / reference as f64 * 100.0)
}

pub fn deviation_color(
    reference: Option<u32>,
    measured: Option<u32>,
    scale: &DeviationScale,
) -> Option<Rgb> {
    deviation_percent(reference, measured).map(|percent| scale.color_for_percent(percent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(reference: u32, measured: u32) -> Option<String> {
        deviation_color(Some(reference), Some(measured), &DeviationScale::default())
            .map(Rgb::to_hex)
    }

    #[test]
    fn dead_zone_boundary_is_neutral() {
        assert_eq!(hex(40, 44).as_deref(), Some("#fffcb6"));
        assert_eq!(hex(40, 36).as_deref(), Some("#fffcb6"));
        assert_eq!(hex(40, 40).as_deref(), Some("#fffcb6"));
    }

    #[test]
    fn saturates_at_max_percent() {
        assert_eq!(hex(40, 60).as_deref(), Some("#ff4b4b"));
        assert_eq!(hex(40, 20).as_deref(), Some("#4be04b"));
        assert_eq!(hex(10, 100).as_deref(), Some("#ff4b4b"));
        assert_eq!(hex(10, 1).as_deref(), Some("#4be04b"));
    }

    #[test]
    fn midway_is_gradient_midpoint() {
        // +30% sits halfway between the dead zone and the cap
        assert_eq!(hex(10, 13).as_deref(), Some("#ffa481"));
    }

    #[test]
    fn ratio_is_taken_before_scaling_to_percent() {
        // (23 - 36) / 36 * 100 lands the green channel on a .5 boundary
        assert_eq!(hex(36, 23).as_deref(), Some("#8aea70"));
        assert_eq!(hex(72, 46).as_deref(), hex(36, 23).as_deref());
    }

    #[test]
    fn degenerate_reference_has_no_color() {
        let scale = DeviationScale::default();
        assert_eq!(deviation_color(Some(0), Some(5), &scale), None);
        assert_eq!(deviation_color(None, Some(5), &scale), None);
        assert_eq!(deviation_color(Some(5), None, &scale), None);
    }

    #[test]
    fn custom_scale() {
        let scale = DeviationScale {
            dead_zone_percent: 0.0,
            max_percent: 100.0,
            ..DeviationScale::default()
        };
        assert!(scale.validate().is_ok());
        assert_eq!(scale.color_for_percent(100.0), scale.worse);
        assert_ne!(scale.color_for_percent(1.0), scale.neutral);
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let scale = DeviationScale {
            dead_zone_percent: 20.0,
            max_percent: 20.0,
            ..DeviationScale::default()
        };
        assert!(matches!(scale.validate(), Err(RankError::InvalidParameter(_))));
    }
}
