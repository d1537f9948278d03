use crate::error::{PagewrightError, RenderUnit};
use crate::extract::{BlockKind, ContentNode};
use crate::options::RenderOptions;
use crate::raster::Raster;
use crate::stylesheet::Stylesheet;
use crate::surface::{Renderer, SurfaceTracker};
use crate::types::PageGeometry;
use log::debug;
use rayon::prelude::*;

/// A block after measurement.
#[derive(Debug, Clone)]
pub struct RenderedBlock {
    pub index: usize,
    pub kind: BlockKind,
    pub height_mm: f32,
    /// Kept only when the caller asked for it.
    pub raster: Option<Raster>,
}

/// Everything a measurement needs besides the block itself.
#[derive(Clone, Copy)]
pub struct MeasureContext<'a> {
    pub geometry: &'a PageGeometry,
    pub options: &'a RenderOptions,
    pub renderer: &'a dyn Renderer,
    pub stylesheet: &'a Stylesheet,
    pub tracker: &'a SurfaceTracker,
}

/// Renders `block` alone at the usable content width and converts the raster
/// height to millimetres through the raster's aspect ratio.
pub fn measure(
    block: &ContentNode,
    ctx: &MeasureContext<'_>,
    keep_raster: bool,
) -> Result<RenderedBlock, PagewrightError> {
    let unit = RenderUnit::Block {
        index: block.index,
        kind: block.kind,
    };
    let raster = render_isolated(block.markup.clone(), unit, ctx)?;
    let height_mm = raster.height_at_width_mm(ctx.geometry.content_width_mm());
    debug!(
        "measured block #{} <{}>: {}x{}px -> {:.2}mm",
        block.index,
        block.kind.tag(),
        raster.width(),
        raster.height(),
        height_mm
    );
    Ok(RenderedBlock {
        index: block.index,
        kind: block.kind,
        height_mm,
        raster: keep_raster.then_some(raster),
    })
}

/// Renders markup alone in a fresh surface at the usable content width,
/// failing on an empty raster.
pub(crate) fn render_isolated(
    markup: String,
    unit: RenderUnit,
    ctx: &MeasureContext<'_>,
) -> Result<Raster, PagewrightError> {
    let surface = ctx.tracker.acquire(
        markup,
        ctx.stylesheet,
        ctx.geometry.logical_width_px(),
        ctx.options,
    );
    let raster = ctx
        .renderer
        .render(&surface)
        .map_err(|err| PagewrightError::render(unit.clone(), err.to_string()))?;
    if raster.is_empty() {
        return Err(PagewrightError::render(
            unit,
            format!("zero-size raster {}x{}", raster.width(), raster.height()),
        ));
    }
    Ok(raster)
}

/// Measures every block, in document order. With `parallel_measure` the
/// renders run on the rayon pool; results are still returned in order and
/// the first failing block (by index) is reported.
pub fn measure_all(
    blocks: &[ContentNode],
    ctx: &MeasureContext<'_>,
    keep_rasters: bool,
) -> Result<Vec<RenderedBlock>, PagewrightError> {
    if ctx.options.parallel_measure && blocks.len() > 1 {
        let results: Vec<Result<RenderedBlock, PagewrightError>> = blocks
            .par_iter()
            .map(|block| measure(block, ctx, keep_rasters))
            .collect();
        return results.into_iter().collect();
    }
    blocks
        .iter()
        .map(|block| measure(block, ctx, keep_rasters))
        .collect()
}
