use crate::extract::BlockKind;
use std::fmt;
use thiserror::Error;

/// The unit of work a renderer was asked to rasterize when it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderUnit {
    Block { index: usize, kind: BlockKind },
    Page { number: usize },
    Document,
}

impl fmt::Display for RenderUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderUnit::Block { index, kind } => write!(f, "block #{} <{}>", index, kind.tag()),
            RenderUnit::Page { number } => write!(f, "page {}", number),
            RenderUnit::Document => write!(f, "document"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PagewrightError {
    #[error("render failed for {unit}: {message}")]
    RenderFailure { unit: RenderUnit, message: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("image error: {0}")]
    Image(String),
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PagewrightError {
    pub(crate) fn render(unit: RenderUnit, message: impl Into<String>) -> Self {
        PagewrightError::RenderFailure {
            unit,
            message: message.into(),
        }
    }

    /// The failing unit, when this is a render failure.
    pub fn render_unit(&self) -> Option<&RenderUnit> {
        match self {
            PagewrightError::RenderFailure { unit, .. } => Some(unit),
            _ => None,
        }
    }
}

impl From<image::ImageError> for PagewrightError {
    fn from(value: image::ImageError) -> Self {
        PagewrightError::Image(value.to_string())
    }
}
