use crate::error::PagewrightError;
use serde::{Deserialize, Serialize};

/// CSS pixels per millimetre used to turn the physical content width into the
/// logical width blocks are laid out at.
pub const CSS_PX_PER_MM: f32 = 3.78;

pub const PT_PER_MM: f32 = 72.0 / 25.4;

pub fn mm_to_pt(mm: f32) -> f32 {
    mm * PT_PER_MM
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Margins {
    pub fn all(value: f32) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    pub fn symmetric(vertical: f32, horizontal: f32) -> Self {
        Self {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Margins::all(20.0)
    }
}

/// Physical page size and margins in millimetres. Fixed for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width_mm: f32,
    pub height_mm: f32,
    #[serde(default)]
    pub margins: Margins,
}

impl PageGeometry {
    pub fn new(width_mm: f32, height_mm: f32, margins: Margins) -> Self {
        Self {
            width_mm,
            height_mm,
            margins,
        }
    }

    pub fn a4() -> Self {
        Self::new(210.0, 297.0, Margins::default())
    }

    pub fn a5() -> Self {
        Self::new(148.0, 210.0, Margins::default())
    }

    pub fn letter() -> Self {
        // 8.5in x 11in.
        Self::new(215.9, 279.4, Margins::default())
    }

    pub fn legal() -> Self {
        Self::new(215.9, 355.6, Margins::default())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "a4" => Some(Self::a4()),
            "a5" => Some(Self::a5()),
            "letter" => Some(Self::letter()),
            "legal" => Some(Self::legal()),
            _ => None,
        }
    }

    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn content_width_mm(&self) -> f32 {
        self.width_mm - self.margins.left - self.margins.right
    }

    pub fn content_height_mm(&self) -> f32 {
        self.height_mm - self.margins.top - self.margins.bottom
    }

    /// Width in CSS pixels that every block and page group is laid out at.
    pub fn logical_width_px(&self) -> u32 {
        (self.content_width_mm() * CSS_PX_PER_MM).round().max(1.0) as u32
    }

    pub fn validate(&self) -> Result<(), PagewrightError> {
        let values = [
            ("width_mm", self.width_mm),
            ("height_mm", self.height_mm),
            ("margins.top", self.margins.top),
            ("margins.right", self.margins.right),
            ("margins.bottom", self.margins.bottom),
            ("margins.left", self.margins.left),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(PagewrightError::InvalidConfiguration(format!(
                    "{name} must be a finite non-negative length, got {value}"
                )));
            }
        }
        if self.content_width_mm() <= 0.0 {
            return Err(PagewrightError::InvalidConfiguration(
                "left/right margins leave no content width".to_string(),
            ));
        }
        if self.content_height_mm() <= 0.0 {
            return Err(PagewrightError::InvalidConfiguration(
                "top/bottom margins leave no content height".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [c(self.r), c(self.g), c(self.b)]
    }

    pub fn parse_hex(raw: &str) -> Option<Color> {
        let hex = raw.trim().strip_prefix('#')?;
        let digits: Vec<u8> = hex
            .chars()
            .map(|ch| ch.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()?;
        match digits.len() {
            3 | 4 => Some(Color::from_rgb8(
                digits[0] * 17,
                digits[1] * 17,
                digits[2] * 17,
            )),
            6 | 8 => Some(Color::from_rgb8(
                digits[0] * 16 + digits[1],
                digits[2] * 16 + digits[3],
                digits[4] * 16 + digits[5],
            )),
            _ => None,
        }
    }
}
