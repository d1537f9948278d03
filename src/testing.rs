//! Test doubles for the [`Renderer`] seam.

use crate::raster::Raster;
use crate::surface::{RenderError, Renderer, Surface};
use crate::types::CSS_PX_PER_MM;
use kuchiki::iter::NodeIterator;
use kuchiki::traits::TendrilSink;
use std::sync::Mutex;

/// Renders blank rasters whose height is scripted by the markup.
///
/// Every element carrying `data-mm="<millimetres>"` contributes that height;
/// the raster is as tall as their sum, or `default_mm` when none is present.
/// An element with `data-fail="<message>"` makes the render fail.
#[derive(Debug)]
pub struct ScriptedRenderer {
    default_mm: f32,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedRenderer {
    fn default() -> Self {
        Self {
            default_mm: 10.0,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_mm(mut self, mm: f32) -> Self {
        self.default_mm = mm.max(0.0);
        self
    }

    /// Markup of every render request, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

impl Renderer for ScriptedRenderer {
    fn render(&self, surface: &Surface<'_>) -> Result<Raster, RenderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(surface.markup().to_string());
        }
        let document = kuchiki::parse_html().one(surface.markup());
        let mut total_mm = 0.0f32;
        let mut scripted = false;
        for element in document.descendants().elements() {
            let attrs = element.attributes.borrow();
            if let Some(message) = attrs.get("data-fail") {
                return Err(RenderError::new(message.to_string()));
            }
            if let Some(raw) = attrs.get("data-mm") {
                let mm: f32 = raw
                    .trim()
                    .parse()
                    .map_err(|_| RenderError::new(format!("bad data-mm value {raw:?}")))?;
                total_mm += mm.max(0.0);
                scripted = true;
            }
        }
        if !scripted {
            total_mm = self.default_mm;
        }
        let width = surface.device_width_px();
        let height = (total_mm * CSS_PX_PER_MM * surface.scale()).round() as u32;
        Ok(Raster::blank(width, height, surface.background()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RenderOptions;
    use crate::stylesheet::Stylesheet;
    use crate::surface::SurfaceTracker;

    #[test]
    fn heights_sum_over_scripted_elements() {
        let tracker = SurfaceTracker::new();
        let sheet = Stylesheet::default();
        let renderer = ScriptedRenderer::new();
        let surface = tracker.acquire(
            "<p data-mm=\"10\">a</p><p data-mm=\"5\">b</p>".to_string(),
            &sheet,
            643,
            &RenderOptions::standard(),
        );
        let raster = renderer.render(&surface).unwrap();
        assert_eq!(raster.width(), 1286);
        assert_eq!(raster.height(), 113);
        assert_eq!(renderer.call_count(), 1);
    }

    #[test]
    fn unscripted_markup_uses_the_default_height() {
        let tracker = SurfaceTracker::new();
        let sheet = Stylesheet::default();
        let renderer = ScriptedRenderer::new().with_default_mm(20.0);
        let surface = tracker.acquire("<p>x</p>".to_string(), &sheet, 643, &RenderOptions::compact());
        let raster = renderer.render(&surface).unwrap();
        assert_eq!(raster.height(), 113);
    }

    #[test]
    fn fail_attribute_fails_the_render() {
        let tracker = SurfaceTracker::new();
        let sheet = Stylesheet::default();
        let surface = tracker.acquire(
            "<div data-fail=\"no layout\"></div>".to_string(),
            &sheet,
            643,
            &RenderOptions::standard(),
        );
        let err = ScriptedRenderer::new().render(&surface).unwrap_err();
        assert_eq!(err.to_string(), "no layout");
    }
}
