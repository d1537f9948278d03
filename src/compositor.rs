use crate::error::{PagewrightError, RenderUnit};
use crate::oracle::{MeasureContext, render_isolated};
use crate::raster::Raster;
use log::debug;

/// Renders one page group as a single raster at the usable content width.
pub fn compose<S: AsRef<str>>(
    number: usize,
    markups: &[S],
    ctx: &MeasureContext<'_>,
) -> Result<Raster, PagewrightError> {
    let markup: String = markups.iter().map(AsRef::as_ref).collect();
    let raster = render_isolated(markup, RenderUnit::Page { number }, ctx)?;
    debug!(
        "composed page {} from {} blocks: {}x{}px",
        number,
        markups.len(),
        raster.width(),
        raster.height()
    );
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RenderOptions;
    use crate::stylesheet::Stylesheet;
    use crate::surface::SurfaceTracker;
    use crate::testing::ScriptedRenderer;
    use crate::types::PageGeometry;

    #[test]
    fn page_markup_is_rendered_once_in_order() {
        let geometry = PageGeometry::a4();
        let options = RenderOptions::standard();
        let sheet = Stylesheet::default();
        let tracker = SurfaceTracker::new();
        let renderer = ScriptedRenderer::new();
        let ctx = MeasureContext {
            geometry: &geometry,
            options: &options,
            renderer: &renderer,
            stylesheet: &sheet,
            tracker: &tracker,
        };
        let raster = compose(
            1,
            &["<p data-mm=\"30\">a</p>", "<p data-mm=\"20\">b</p>"],
            &ctx,
        )
        .unwrap();
        assert!((raster.height_at_width_mm(170.0) - 50.0).abs() < 0.2);
        assert_eq!(
            renderer.calls(),
            vec!["<p data-mm=\"30\">a</p><p data-mm=\"20\">b</p>".to_string()]
        );
        assert_eq!(tracker.active(), 0);
    }

    #[test]
    fn failures_identify_the_page() {
        let geometry = PageGeometry::a4();
        let options = RenderOptions::standard();
        let sheet = Stylesheet::default();
        let tracker = SurfaceTracker::new();
        let renderer = ScriptedRenderer::new();
        let ctx = MeasureContext {
            geometry: &geometry,
            options: &options,
            renderer: &renderer,
            stylesheet: &sheet,
            tracker: &tracker,
        };
        let err = compose(4, &["<p data-fail=\"gone\">x</p>"], &ctx).unwrap_err();
        assert_eq!(err.render_unit(), Some(&RenderUnit::Page { number: 4 }));
        assert_eq!(err.to_string(), "render failed for page 4: gone");
    }
}
