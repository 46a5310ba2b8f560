//! Construction-time renderer parameters.

use ash::vk;
use thiserror::Error;

use pathview_rhi::RhiError;

/// Frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Fixed resolution of the ray-traced output image.
pub const OUTPUT_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 512,
    height: 512,
};

/// Local workgroup size of the compute shader along x and y.
pub const WORKGROUP_TILE: u32 = 16;

/// Clear colour of the presentation pass.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// A [`RendererSettings`] value the frame loop cannot run with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("frames_in_flight must be at least 1")]
    NoFramesInFlight,

    #[error("workgroup_tile must be non-zero")]
    ZeroWorkgroupTile,

    #[error("output extent {width}x{height} has a zero dimension")]
    ZeroOutputExtent { width: u32, height: u32 },
}

impl From<SettingsError> for RhiError {
    fn from(e: SettingsError) -> Self {
        RhiError::InvalidConfig(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererSettings {
    pub frames_in_flight: usize,
    pub output_extent: vk::Extent2D,
    pub workgroup_tile: u32,
    /// Enables the Khronos validation layer when it is installed.
    pub validation: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: FRAMES_IN_FLIGHT,
            output_extent: OUTPUT_EXTENT,
            workgroup_tile: WORKGROUP_TILE,
            validation: cfg!(debug_assertions),
        }
    }
}

impl RendererSettings {
    /// Rejects values the frame loop cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.frames_in_flight == 0 {
            return Err(SettingsError::NoFramesInFlight);
        }
        if self.workgroup_tile == 0 {
            return Err(SettingsError::ZeroWorkgroupTile);
        }
        if self.output_extent.width == 0 || self.output_extent.height == 0 {
            return Err(SettingsError::ZeroOutputExtent {
                width: self.output_extent.width,
                height: self.output_extent.height,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RendererSettings::default();
        assert_eq!(settings.frames_in_flight, 2);
        assert_eq!(settings.output_extent.width, 512);
        assert_eq!(settings.output_extent.height, 512);
        assert_eq!(settings.workgroup_tile, 16);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut settings = RendererSettings {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::NoFramesInFlight));

        settings.frames_in_flight = 3;
        settings.workgroup_tile = 0;
        assert_eq!(settings.validate(), Err(SettingsError::ZeroWorkgroupTile));

        settings.workgroup_tile = 8;
        settings.output_extent.height = 0;
        assert_eq!(
            settings.validate(),
            Err(SettingsError::ZeroOutputExtent {
                width: 512,
                height: 0
            })
        );
    }

    #[test]
    fn test_invalid_settings_map_to_config_error() {
        let err = RhiError::from(SettingsError::NoFramesInFlight);
        assert!(matches!(err, RhiError::InvalidConfig(_)));
        assert_eq!(
            err.to_string(),
            "Invalid configuration: frames_in_flight must be at least 1"
        );
    }
}
