use crate::error::PagewrightError;
use crate::types::Color;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Raster and output settings shared by measurement, compositing and assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Device pixels per CSS pixel.
    pub scale: f32,
    /// JPEG quality in `0.0..=1.0`.
    pub quality: f32,
    /// Upper bound on embedded raster density. Denser page rasters are
    /// downsampled at assembly time.
    pub dpi: Option<u32>,
    /// Rasterize text glyph by glyph instead of word by word.
    pub letter_rendering: bool,
    /// Diagnostics only: keeps preview PNGs on pages and logs per-block detail.
    pub show_preview: bool,
    /// Measure blocks on the rayon pool. Heights are still consumed in order.
    pub parallel_measure: bool,
    pub background: Color,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::standard()
    }
}

impl RenderOptions {
    pub fn high_quality() -> Self {
        Self {
            scale: 3.0,
            quality: 0.95,
            dpi: Some(300),
            letter_rendering: true,
            ..Self::base()
        }
    }

    pub fn standard() -> Self {
        Self::base()
    }

    pub fn compact() -> Self {
        Self {
            scale: 1.5,
            quality: 0.7,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            scale: 2.0,
            quality: 0.85,
            dpi: None,
            letter_rendering: false,
            show_preview: false,
            parallel_measure: false,
            background: Color::WHITE,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, PagewrightError> {
        let options: RenderOptions = serde_json::from_str(raw)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), PagewrightError> {
        if !self.scale.is_finite() || self.scale <= 0.0 || self.scale > 8.0 {
            return Err(PagewrightError::InvalidConfiguration(format!(
                "scale must be in (0, 8], got {}",
                self.scale
            )));
        }
        if !self.quality.is_finite() || self.quality <= 0.0 || self.quality > 1.0 {
            return Err(PagewrightError::InvalidConfiguration(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        if self.dpi == Some(0) {
            return Err(PagewrightError::InvalidConfiguration(
                "dpi must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    HighQuality,
    Standard,
    Compact,
}

impl Preset {
    pub fn options(self) -> RenderOptions {
        match self {
            Preset::HighQuality => RenderOptions::high_quality(),
            Preset::Standard => RenderOptions::standard(),
            Preset::Compact => RenderOptions::compact(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::HighQuality => "high",
            Preset::Standard => "standard",
            Preset::Compact => "compact",
        }
    }
}

impl FromStr for Preset {
    type Err = PagewrightError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "high-quality" | "high_quality" => Ok(Preset::HighQuality),
            "standard" => Ok(Preset::Standard),
            "compact" => Ok(Preset::Compact),
            other => Err(PagewrightError::InvalidConfiguration(format!(
                "unknown preset '{other}' (expected high, standard or compact)"
            ))),
        }
    }
}
