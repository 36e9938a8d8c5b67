use crate::error::{GroupShotError, GroupShotResult};

/// Radius of the mask softening kernel, in pixels.
pub const DEFAULT_BLUR_RADIUS: u32 = 2;

/// Largest accepted blur radius. The kernel holds `2 * radius + 1` weights.
pub const MAX_BLUR_RADIUS: u32 = 64;

/// Settings for turning a frame plus mask into a person layer.
///
/// Both steps are optional: a radius of 0 disables softening and
/// brightness/contrast of 1.0 leave colors untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorSettings {
    pub blur_radius: u32,
    /// Gaussian sigma; `None` derives it from the radius.
    pub blur_sigma: Option<f32>,
    pub brightness: f32,
    pub contrast: f32,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            blur_radius: DEFAULT_BLUR_RADIUS,
            blur_sigma: None,
            brightness: 1.0,
            contrast: 1.0,
        }
    }
}

impl ExtractorSettings {
    /// No softening, no tone adjustment.
    pub fn passthrough() -> Self {
        Self {
            blur_radius: 0,
            blur_sigma: None,
            brightness: 1.0,
            contrast: 1.0,
        }
    }

    pub fn sigma(&self) -> f32 {
        self.blur_sigma
            .unwrap_or_else(|| (self.blur_radius as f32 / 2.0).max(0.5))
    }

    pub fn adjusts_tone(&self) -> bool {
        self.brightness != 1.0 || self.contrast != 1.0
    }

    pub fn validate(&self) -> GroupShotResult<()> {
        if self.blur_radius > MAX_BLUR_RADIUS {
            return Err(GroupShotError::settings(format!(
                "blur radius {} exceeds {}",
                self.blur_radius, MAX_BLUR_RADIUS
            )));
        }
        let sigma = self.sigma();
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(GroupShotError::settings("blur sigma must be > 0"));
        }
        if !self.brightness.is_finite() || self.brightness < 0.0 {
            return Err(GroupShotError::settings("brightness must be >= 0"));
        }
        if !self.contrast.is_finite() || self.contrast < 0.0 {
            return Err(GroupShotError::settings("contrast must be >= 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ExtractorSettings::default().validate().is_ok());
        assert!(ExtractorSettings::passthrough().validate().is_ok());
        assert!(!ExtractorSettings::default().adjusts_tone());
    }

    #[test]
    fn rejects_bad_values() {
        let mut s = ExtractorSettings::default();
        s.brightness = f32::NAN;
        assert!(s.validate().is_err());

        let mut s = ExtractorSettings::default();
        s.contrast = -0.5;
        assert!(s.validate().is_err());

        let mut s = ExtractorSettings::default();
        s.blur_sigma = Some(0.0);
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_oversized_blur_radius() {
        for radius in [MAX_BLUR_RADIUS + 1, 1 << 31, u32::MAX] {
            let s = ExtractorSettings {
                blur_radius: radius,
                ..ExtractorSettings::default()
            };
            assert!(
                matches!(s.validate(), Err(GroupShotError::InvalidSettings(_))),
                "radius {radius} accepted"
            );
        }

        let s = ExtractorSettings {
            blur_radius: MAX_BLUR_RADIUS,
            ..ExtractorSettings::default()
        };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn sigma_follows_radius() {
        let s = ExtractorSettings {
            blur_radius: 6,
            ..ExtractorSettings::default()
        };
        assert_eq!(s.sigma(), 3.0);
    }
}
