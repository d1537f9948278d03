mod assemble;
mod compositor;
mod error;
mod extract;
mod inspect;
mod metrics;
mod native;
mod options;
mod oracle;
mod perf;
mod pipeline;
mod planner;
mod raster;
mod stylesheet;
mod surface;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod types;

pub use assemble::{OutputDocument, SliceRecord, assemble};
pub use compositor::compose;
pub use error::{PagewrightError, RenderUnit};
pub use extract::{BlockKind, ContentNode, extract_blocks};
pub use inspect::{
    ImagePlacement, PageReport, PdfInspectError, PdfInspectErrorCode, PdfInspectReport,
    inspect_pdf_bytes, inspect_pdf_path,
};
pub use metrics::{PageMetrics, PaginationMetrics};
pub use native::NativeRasterizer;
pub use options::{Preset, RenderOptions};
pub use oracle::{MeasureContext, RenderedBlock, measure, measure_all};
pub use pipeline::{
    DISCREPANCY_TOLERANCE_MM, HeightDiscrepancy, Page, PagePlan, PaginationResult, PlannedPage,
    assignment_digest,
};
pub use planner::{PageGroup, Phase, PlannerState, PushResult, plan};
pub use raster::Raster;
pub use stylesheet::{BlockStyle, Stylesheet};
pub use surface::{RenderError, Renderer, Surface, SurfaceTracker};
pub use types::{CSS_PX_PER_MM, Color, Margins, PT_PER_MM, PageGeometry, mm_to_pt};

use log::debug;
use perf::PerfLogger;
use pipeline::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Paginates block markup into fixed-size pages and assembles them into a
/// raster PDF.
///
/// ```no_run
/// use pagewright::{Pagewright, RenderOptions};
///
/// let engine = Pagewright::builder()
///     .options(RenderOptions::high_quality())
///     .stylesheet("h1 { color: #1d4ed8 }")
///     .build()?;
/// let result = engine.paginate("<h1>Report</h1><p>Body text.</p>")?;
/// println!("{} pages", result.total_pages);
/// engine.render_to_file("<h1>Report</h1>", "report.pdf")?;
/// # Ok::<(), pagewright::PagewrightError>(())
/// ```
pub struct Pagewright {
    geometry: PageGeometry,
    options: RenderOptions,
    stylesheet: Stylesheet,
    renderer: Arc<dyn Renderer>,
    perf: Option<Arc<PerfLogger>>,
    tracker: SurfaceTracker,
    runs: AtomicU64,
}

#[derive(Clone)]
pub struct PagewrightBuilder {
    geometry: PageGeometry,
    options: RenderOptions,
    stylesheet: Option<String>,
    renderer: Option<Arc<dyn Renderer>>,
    perf_path: Option<PathBuf>,
}

impl Default for PagewrightBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PagewrightBuilder {
    pub fn new() -> Self {
        Self {
            geometry: PageGeometry::a4(),
            options: RenderOptions::default(),
            stylesheet: None,
            renderer: None,
            perf_path: None,
        }
    }

    pub fn page_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Replaces the margins of the current page geometry.
    pub fn margins(mut self, margins: Margins) -> Self {
        self.geometry.margins = margins;
        self
    }

    pub fn options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn preset(mut self, preset: Preset) -> Self {
        self.options = preset.options();
        self
    }

    /// Custom CSS applied to every measurement and page composition.
    pub fn stylesheet(mut self, css: impl Into<String>) -> Self {
        self.stylesheet = Some(css.into());
        self
    }

    /// Overrides the default [`NativeRasterizer`].
    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn shared_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    // Enable performance logging to a JSONL file for timing/counter inspection.
    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Pagewright, PagewrightError> {
        self.geometry.validate()?;
        self.options.validate()?;
        let stylesheet = match self.stylesheet.as_deref() {
            Some(css) => Stylesheet::parse(css),
            None => Stylesheet::default(),
        };
        let perf = match self.perf_path {
            Some(path) => Some(Arc::new(PerfLogger::new(path)?)),
            None => None,
        };
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(NativeRasterizer::new()));
        debug!(
            "engine ready: {}x{}mm page, {:.1}x{:.1}mm content, scale {}",
            self.geometry.width_mm,
            self.geometry.height_mm,
            self.geometry.content_width_mm(),
            self.geometry.content_height_mm(),
            self.options.scale
        );
        Ok(Pagewright {
            geometry: self.geometry,
            options: self.options,
            stylesheet,
            renderer,
            perf,
            tracker: SurfaceTracker::new(),
            runs: AtomicU64::new(0),
        })
    }
}

impl Pagewright {
    pub fn builder() -> PagewrightBuilder {
        PagewrightBuilder::new()
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }

    /// Surfaces currently alive. Zero whenever no run is in progress.
    pub fn active_surfaces(&self) -> usize {
        self.tracker.active()
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            ctx: MeasureContext {
                geometry: &self.geometry,
                options: &self.options,
                renderer: self.renderer.as_ref(),
                stylesheet: &self.stylesheet,
                tracker: &self.tracker,
            },
            perf: self.perf.as_deref(),
            run_id: self.runs.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    /// Measures, plans, composes and assembles `markup`.
    pub fn paginate(&self, markup: &str) -> Result<PaginationResult, PagewrightError> {
        self.pipeline().paginate(markup)
    }

    /// Runs [`paginate`](Self::paginate) with previews kept on every page.
    pub fn generate_preview(&self, markup: &str) -> Result<PaginationResult, PagewrightError> {
        let options = RenderOptions {
            show_preview: true,
            ..self.options.clone()
        };
        let mut pipeline = self.pipeline();
        pipeline.ctx.options = &options;
        pipeline.paginate(markup)
    }

    /// Page assignment only; nothing is composed or assembled.
    pub fn plan(&self, markup: &str) -> Result<PagePlan, PagewrightError> {
        self.pipeline().plan_only(markup)
    }

    pub fn render_to_buffer(&self, markup: &str) -> Result<Vec<u8>, PagewrightError> {
        Ok(self.paginate(markup)?.document.bytes)
    }

    /// Paginates `markup` and writes the PDF to `path`. Nothing is written
    /// when the run fails.
    pub fn render_to_file(
        &self,
        markup: &str,
        path: impl AsRef<Path>,
    ) -> Result<PaginationResult, PagewrightError> {
        let result = self.paginate(markup)?;
        result.document.save(path)?;
        Ok(result)
    }

    /// Renders the whole markup as one raster and slices it over as many
    /// pages as it needs, ignoring block boundaries.
    pub fn render_unpaginated(&self, markup: &str) -> Result<OutputDocument, PagewrightError> {
        self.pipeline().render_unpaginated(markup)
    }

    pub fn flush_perf(&self) {
        if let Some(perf) = self.perf.as_deref() {
            perf.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRenderer;

    fn scripted() -> Pagewright {
        Pagewright::builder()
            .renderer(ScriptedRenderer::new())
            .build()
            .unwrap()
    }

    #[test]
    fn build_rejects_invalid_configuration() {
        let err = Pagewright::builder()
            .margins(Margins::all(120.0))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PagewrightError::InvalidConfiguration(_)));

        let err = Pagewright::builder()
            .options(RenderOptions {
                quality: 1.5,
                ..RenderOptions::standard()
            })
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PagewrightError::InvalidConfiguration(_)));
    }

    #[test]
    fn paginate_and_plan_agree() {
        let engine = scripted();
        let markup = "<p data-mm=\"100\">a</p><p data-mm=\"100\">b</p><p data-mm=\"100\">c</p>";
        let result = engine.paginate(markup).unwrap();
        let plan = engine.plan(markup).unwrap();
        assert_eq!(result.total_pages, 2);
        assert_eq!(plan.pages.len(), 2);
        assert_eq!(plan.digest, result.assignment_digest());
        assert_eq!(engine.active_surfaces(), 0);
    }

    #[test]
    fn preview_generation_keeps_data_uris() {
        let engine = scripted();
        let result = engine.generate_preview("<h1 data-mm=\"30\">t</h1>").unwrap();
        assert_eq!(result.total_pages, 1);
        assert!(result.pages[0].preview.is_some());
        assert!(!engine.options().show_preview);
    }

    #[test]
    fn render_to_file_writes_the_document() {
        let engine = scripted();
        let path = std::env::temp_dir().join(format!("pagewright_lib_{}.pdf", std::process::id()));
        let result = engine
            .render_to_file("<p data-mm=\"20\">a</p>", &path)
            .unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, result.document.bytes);
        let report = inspect_pdf_bytes(&written).unwrap();
        assert_eq!(report.page_count, 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn failed_runs_write_nothing() {
        let engine = scripted();
        let path = std::env::temp_dir().join(format!(
            "pagewright_lib_failed_{}.pdf",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let err = engine
            .render_to_file("<p data-fail=\"x\">a</p>", &path)
            .unwrap_err();
        assert!(err.render_unit().is_some());
        assert!(!path.exists());
        assert_eq!(engine.active_surfaces(), 0);
    }

    #[test]
    fn unpaginated_flow_slices_one_raster() {
        let engine = scripted();
        let doc = engine
            .render_unpaginated("<p data-mm=\"300\">a</p><p data-mm=\"300\">b</p>")
            .unwrap();
        assert_eq!(doc.physical_pages, 3);
        assert!(doc.slices.iter().all(|slice| slice.page == 1));
    }

    #[test]
    fn perf_log_records_run_phases() {
        let dir = std::env::temp_dir().join(format!("pagewright_lib_perf_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("perf.log");
        {
            let engine = Pagewright::builder()
                .renderer(ScriptedRenderer::new())
                .perf_log(&path)
                .build()
                .unwrap();
            engine.paginate("<p data-mm=\"10\">a</p>").unwrap();
            engine.flush_perf();
        }
        let log = std::fs::read_to_string(&path).unwrap();
        for phase in ["\"measure\"", "\"plan\"", "\"compose\"", "\"assemble\"", "\"run\""] {
            assert!(log.contains(phase), "missing {phase} in {log}");
        }
        assert!(dir.join("perf_hot.log").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn native_rasterizer_paginates_real_markup() {
        let engine = Pagewright::builder()
            .options(RenderOptions::compact())
            .stylesheet("p { margin: 4px 0 }")
            .build()
            .unwrap();
        let paragraphs: String = (0..60)
            .map(|i| format!("<p>Paragraph {i} {}</p>", "lorem ipsum ".repeat(30)))
            .collect();
        let markup = format!("<h1>Title</h1>{paragraphs}<table><tr><td>a</td></tr></table>");
        let result = engine.paginate(&markup).unwrap();
        assert!(result.total_pages > 1);
        let flattened: Vec<usize> = result.assignment().into_iter().flatten().collect();
        assert_eq!(flattened, (0..62).collect::<Vec<_>>());
        assert!(result.document.physical_pages >= result.total_pages);
    }

    #[test]
    fn long_documents_render_unpaginated() {
        let engine = Pagewright::builder()
            .renderer(NativeRasterizer::new().with_max_device_height(12_000))
            .build()
            .unwrap();
        let markup: String = (0..400)
            .map(|i| format!("<p>Paragraph {i} {}</p>", "lorem ipsum ".repeat(30)))
            .collect();
        let doc = engine.render_unpaginated(&markup).unwrap();
        assert!(doc.physical_pages >= 40, "{} pages", doc.physical_pages);
        assert_eq!(inspect_pdf_bytes(&doc.bytes).unwrap().page_count, doc.physical_pages);
        assert_eq!(engine.active_surfaces(), 0);
    }
}
