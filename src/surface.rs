use crate::options::RenderOptions;
use crate::raster::Raster;
use crate::stylesheet::Stylesheet;
use crate::types::Color;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        RenderError(message.into())
    }
}

/// Turns the content of an off-screen surface into pixels.
///
/// Implementations must be deterministic: the same surface content, width and
/// scale must always produce a raster of the same dimensions.
pub trait Renderer: Send + Sync {
    fn render(&self, surface: &Surface<'_>) -> Result<Raster, RenderError>;
}

impl<R: Renderer + ?Sized> Renderer for &R {
    fn render(&self, surface: &Surface<'_>) -> Result<Raster, RenderError> {
        (**self).render(surface)
    }
}

impl<R: Renderer + ?Sized> Renderer for std::sync::Arc<R> {
    fn render(&self, surface: &Surface<'_>) -> Result<Raster, RenderError> {
        (**self).render(surface)
    }
}

/// Counts live off-screen surfaces. Every surface is released when its guard
/// drops, whether the render it served succeeded or not.
#[derive(Debug, Default)]
pub struct SurfaceTracker {
    active: AtomicUsize,
    created: AtomicU64,
}

impl SurfaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire<'a>(
        &'a self,
        markup: String,
        stylesheet: &'a Stylesheet,
        width_px: u32,
        options: &RenderOptions,
    ) -> Surface<'a> {
        let id = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        self.active.fetch_add(1, Ordering::AcqRel);
        Surface {
            tracker: self,
            id,
            markup,
            stylesheet,
            width_px: width_px.max(1),
            scale: options.scale,
            letter_rendering: options.letter_rendering,
            background: options.background,
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An isolated rendering container holding markup laid out at a fixed
/// logical width, never attached to any persistent view.
#[derive(Debug)]
pub struct Surface<'a> {
    tracker: &'a SurfaceTracker,
    id: u64,
    markup: String,
    stylesheet: &'a Stylesheet,
    width_px: u32,
    scale: f32,
    letter_rendering: bool,
    background: Color,
}

impl Surface<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        self.stylesheet
    }

    /// Layout width in CSS pixels.
    pub fn width_px(&self) -> u32 {
        self.width_px
    }

    /// Device pixels per CSS pixel.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn device_width_px(&self) -> u32 {
        ((self.width_px as f32 * self.scale).round() as u32).max(1)
    }

    pub fn letter_rendering(&self) -> bool {
        self.letter_rendering
    }

    pub fn background(&self) -> Color {
        self.background
    }
}

impl Drop for Surface<'_> {
    fn drop(&mut self) {
        self.tracker.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaces_release_on_drop() {
        let tracker = SurfaceTracker::new();
        let sheet = Stylesheet::default();
        let options = RenderOptions::standard();
        {
            let first = tracker.acquire("<p>a</p>".to_string(), &sheet, 643, &options);
            let second = tracker.acquire("<p>b</p>".to_string(), &sheet, 643, &options);
            assert_eq!(tracker.active(), 2);
            assert_ne!(first.id(), second.id());
            assert_eq!(first.device_width_px(), 1286);
        }
        assert_eq!(tracker.active(), 0);
        assert_eq!(tracker.created(), 2);
    }

    #[test]
    fn surfaces_release_when_a_render_fails() {
        struct Failing;
        impl Renderer for Failing {
            fn render(&self, _surface: &Surface<'_>) -> Result<Raster, RenderError> {
                Err(RenderError::new("boom"))
            }
        }
        let tracker = SurfaceTracker::new();
        let sheet = Stylesheet::default();
        let result = {
            let surface = tracker.acquire(String::new(), &sheet, 10, &RenderOptions::default());
            Failing.render(&surface)
        };
        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert_eq!(tracker.active(), 0);
    }
}
