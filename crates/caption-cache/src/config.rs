//! Configuration for the caption runtime
//!
//! All times are in seconds, all sizes in pixels unless stated otherwise.

use crate::style::Rgb;
use crate::{CaptionError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the caption runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Maximum bytes of resident block data before eviction
    pub cache_budget_bytes: usize,

    /// Lifespan used when neither the request nor `<len>` gives one
    pub default_duration: f32,

    /// Added to every duration hint
    pub linger_time: f32,

    /// Leading window during which an item is fully transparent
    pub fade_in_hidden: f32,

    /// Linear fade-in after the hidden window
    pub fade_in: f32,

    /// Linear fade-out at the end of an item's life
    pub fade_out: f32,

    /// Cross-fade at each pan-scroll step
    pub pan_crossfade: f32,

    /// Time for the caption box to grow or shrink to a new height
    pub box_resize_time: f32,

    /// Time for the caption box to fade in or out
    pub box_fade_time: f32,

    /// Width available to layout
    pub viewport_width: u32,

    /// Visible height of the caption box
    pub viewport_height: u32,

    /// Vertical gap between stacked items
    pub item_spacing: u32,

    /// Base colour of every caption
    pub default_color: Rgb,

    /// Show captions marked `<sfx>`
    pub show_sound_effects: bool,

    /// Use the single reduced font for all text
    pub reduced_font: bool,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: 512 * 1024, // 512 KiB
            default_duration: 4.0,
            linger_time: 0.0,
            fade_in_hidden: 0.0,
            fade_in: 0.25,
            fade_out: 0.5,
            pan_crossfade: 0.25,
            box_resize_time: 0.25,
            box_fade_time: 0.5,
            viewport_width: 640,
            viewport_height: 120,
            item_spacing: 2,
            default_color: Rgb::WHITE,
            show_sound_effects: true,
            reduced_font: false,
        }
    }
}

impl CaptionConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON, filling omitted fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CaptionError::Config(e.to_string()))?;
        config.validate().map_err(CaptionError::Config)?;
        Ok(config)
    }

    /// Set the resident-byte budget
    #[must_use]
    pub const fn with_cache_budget(mut self, bytes: usize) -> Self {
        self.cache_budget_bytes = bytes;
        self
    }

    /// Set the layout viewport
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set the default caption lifespan
    #[must_use]
    pub const fn with_default_duration(mut self, seconds: f32) -> Self {
        self.default_duration = seconds;
        self
    }

    /// Set the fade windows
    #[must_use]
    pub const fn with_fades(mut self, hidden: f32, fade_in: f32, fade_out: f32) -> Self {
        self.fade_in_hidden = hidden;
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    /// Enable or disable sound-effect captions
    #[must_use]
    pub const fn with_sound_effects(mut self, show: bool) -> Self {
        self.show_sound_effects = show;
        self
    }

    /// Use the reduced font on constrained surfaces
    #[must_use]
    pub const fn with_reduced_font(mut self, reduced: bool) -> Self {
        self.reduced_font = reduced;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.cache_budget_bytes == 0 {
            return Err("cache_budget_bytes must be greater than 0".to_string());
        }

        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err("viewport dimensions must be greater than 0".to_string());
        }

        if self.default_duration.is_nan() || self.default_duration <= 0.0 {
            return Err("default_duration must be greater than 0".to_string());
        }

        let times = [
            ("linger_time", self.linger_time),
            ("fade_in_hidden", self.fade_in_hidden),
            ("fade_in", self.fade_in),
            ("fade_out", self.fade_out),
            ("pan_crossfade", self.pan_crossfade),
            ("box_resize_time", self.box_resize_time),
            ("box_fade_time", self.box_fade_time),
        ];
        if let Some((name, _)) = times.iter().find(|(_, t)| t.is_nan() || *t < 0.0) {
            return Err(format!("{name} must not be negative"));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CaptionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CaptionConfig::new()
            .with_cache_budget(4096)
            .with_viewport(320, 60)
            .with_sound_effects(false);
        assert_eq!(config.cache_budget_bytes, 4096);
        assert_eq!((config.viewport_width, config.viewport_height), (320, 60));
        assert!(!config.show_sound_effects);
    }

    #[test]
    fn test_validation_failures() {
        assert!(CaptionConfig::new().with_cache_budget(0).validate().is_err());
        assert!(CaptionConfig::new().with_viewport(0, 10).validate().is_err());
        assert!(
            CaptionConfig::new()
                .with_default_duration(0.0)
                .validate()
                .is_err()
        );
        let err = CaptionConfig::new()
            .with_fades(-1.0, 0.0, 0.0)
            .validate()
            .unwrap_err();
        assert!(err.contains("fade_in_hidden"));
        assert!(
            CaptionConfig::new()
                .with_default_duration(f32::NAN)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_from_json_partial() {
        let config = CaptionConfig::from_json_str(
            r#"{ "cache_budget_bytes": 8192, "default_color": { "r": 1, "g": 2, "b": 3 } }"#,
        )
        .expect("parse");
        assert_eq!(config.cache_budget_bytes, 8192);
        assert_eq!(config.default_color, Rgb::new(1, 2, 3));
        assert_eq!(config.viewport_width, 640);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(CaptionConfig::from_json_str(r#"{ "viewport_height": 0 }"#).is_err());
        assert!(CaptionConfig::from_json_str("not json").is_err());
    }
}
