use crate::assemble::{OutputDocument, assemble};
use crate::compositor::compose;
use crate::error::{PagewrightError, RenderUnit};
use crate::extract::{ContentNode, extract_blocks};
use crate::metrics::{PageMetrics, PaginationMetrics};
use crate::oracle::{MeasureContext, measure_all, render_isolated};
use crate::perf::PerfLogger;
use crate::planner::{PageGroup, plan};
use crate::raster::Raster;
use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Instant;

/// Planned and composed heights of one page may disagree by this much before
/// the difference is reported.
pub const DISCREPANCY_TOLERANCE_MM: f32 = 1.0;

/// A finished page: the committed blocks and their one composed raster.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based.
    pub number: usize,
    pub blocks: Vec<String>,
    pub block_indices: Vec<usize>,
    pub block_heights: Vec<f32>,
    pub planned_mm: f32,
    pub composed_mm: f32,
    /// A lone block taller than the usable height.
    pub overflow: bool,
    pub raster: Raster,
    /// PNG data URI of the raster, kept when previews are enabled.
    pub preview: Option<String>,
}

impl Page {
    pub fn preview_data_uri(&self) -> Result<String, PagewrightError> {
        match &self.preview {
            Some(uri) => Ok(uri.clone()),
            None => self.raster.png_data_uri(),
        }
    }
}

/// A page whose composed raster is not as tall as its measured blocks add up to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeightDiscrepancy {
    pub page: usize,
    pub planned_mm: f32,
    pub composed_mm: f32,
}

impl HeightDiscrepancy {
    pub fn delta_mm(&self) -> f32 {
        self.composed_mm - self.planned_mm
    }
}

#[derive(Debug, Clone)]
pub struct PaginationResult {
    pub pages: Vec<Page>,
    pub total_pages: usize,
    pub document: OutputDocument,
    pub discrepancies: Vec<HeightDiscrepancy>,
    pub metrics: PaginationMetrics,
}

impl PaginationResult {
    /// Block indices per page, in page order.
    pub fn assignment(&self) -> Vec<Vec<usize>> {
        self.pages
            .iter()
            .map(|page| page.block_indices.clone())
            .collect()
    }

    /// SHA-256 over the page assignment. Equal digests mean equal page breaks.
    pub fn assignment_digest(&self) -> String {
        assignment_digest(&self.assignment())
    }
}

pub fn assignment_digest(assignment: &[Vec<usize>]) -> String {
    let mut hasher = Sha256::new();
    for (position, indices) in assignment.iter().enumerate() {
        hasher.update(format!("{}:", position + 1).as_bytes());
        for index in indices {
            hasher.update(format!("{index},").as_bytes());
        }
        hasher.update(b";");
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// The page assignment without compositing or assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagePlan {
    pub usable_height_mm: f32,
    pub pages: Vec<PlannedPage>,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedPage {
    pub number: usize,
    pub blocks: Vec<usize>,
    pub heights_mm: Vec<f32>,
    pub total_mm: f32,
    pub overflow: bool,
}

pub(crate) struct Pipeline<'a> {
    pub ctx: MeasureContext<'a>,
    pub perf: Option<&'a PerfLogger>,
    pub run_id: u64,
}

impl Pipeline<'_> {
    fn span(&self, name: &str, started: Instant) -> f64 {
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Some(perf) = self.perf {
            perf.log_span_ms(name, Some(self.run_id), ms);
        }
        ms
    }

    fn measure_and_plan(
        &self,
        markup: &str,
    ) -> Result<(Vec<ContentNode>, Vec<PageGroup>, f64, f64), PagewrightError> {
        let started = Instant::now();
        let blocks = extract_blocks(markup);
        let measured = measure_all(&blocks, &self.ctx, false)?;
        let measure_ms = self.span("measure", started);

        let started = Instant::now();
        let usable = self.ctx.geometry.content_height_mm();
        let groups = plan(
            measured.iter().map(|block| (block.index, block.height_mm)),
            usable,
        );
        let plan_ms = self.span("plan", started);
        debug!(
            "planned {} blocks onto {} pages ({:.2}mm usable)",
            blocks.len(),
            groups.len(),
            usable
        );
        Ok((blocks, groups, measure_ms, plan_ms))
    }

    pub fn plan_only(&self, markup: &str) -> Result<PagePlan, PagewrightError> {
        let (_, groups, _, _) = self.measure_and_plan(markup)?;
        let pages: Vec<PlannedPage> = groups
            .into_iter()
            .map(|group| PlannedPage {
                number: group.number,
                blocks: group.block_indices,
                heights_mm: group.heights,
                total_mm: group.total_mm,
                overflow: group.overflow,
            })
            .collect();
        let assignment: Vec<Vec<usize>> = pages.iter().map(|page| page.blocks.clone()).collect();
        Ok(PagePlan {
            usable_height_mm: self.ctx.geometry.content_height_mm(),
            digest: assignment_digest(&assignment),
            pages,
        })
    }

    pub fn paginate(&self, markup: &str) -> Result<PaginationResult, PagewrightError> {
        let run_started = Instant::now();
        let surfaces_before = self.ctx.tracker.created();
        let options = self.ctx.options;
        let (blocks, groups, measure_ms, plan_ms) = self.measure_and_plan(markup)?;

        let started = Instant::now();
        let content_width_mm = self.ctx.geometry.content_width_mm();
        let mut pages = Vec::with_capacity(groups.len());
        let mut page_metrics = Vec::with_capacity(groups.len());
        let mut discrepancies = Vec::new();
        for group in groups {
            let page_started = Instant::now();
            let markups: Vec<&str> = group
                .block_indices
                .iter()
                .map(|&index| blocks[index].markup.as_str())
                .collect();
            let raster = compose(group.number, &markups, &self.ctx)?;
            let composed_mm = raster.height_at_width_mm(content_width_mm);
            if (composed_mm - group.total_mm).abs() > DISCREPANCY_TOLERANCE_MM {
                warn!(
                    "page {}: measured blocks add up to {:.2}mm but the composed page is {:.2}mm",
                    group.number, group.total_mm, composed_mm
                );
                discrepancies.push(HeightDiscrepancy {
                    page: group.number,
                    planned_mm: group.total_mm,
                    composed_mm,
                });
            }
            let preview = if options.show_preview {
                debug!(
                    "page {} preview: blocks {:?}, heights {:?}",
                    group.number, group.block_indices, group.heights
                );
                Some(raster.png_data_uri()?)
            } else {
                None
            };
            page_metrics.push(PageMetrics {
                page_number: group.number,
                block_count: group.len(),
                planned_mm: group.total_mm,
                composed_mm,
                compose_ms: page_started.elapsed().as_secs_f64() * 1000.0,
            });
            pages.push(Page {
                number: group.number,
                blocks: markups.iter().map(|markup| markup.to_string()).collect(),
                block_indices: group.block_indices,
                block_heights: group.heights,
                planned_mm: group.total_mm,
                composed_mm,
                overflow: group.overflow,
                raster,
                preview,
            });
        }
        let compose_ms = self.span("compose", started);

        let started = Instant::now();
        let rasters: Vec<&Raster> = pages.iter().map(|page| &page.raster).collect();
        let document = assemble(&rasters, self.ctx.geometry, options)?;
        let assemble_ms = self.span("assemble", started);

        let total_ms = run_started.elapsed().as_secs_f64() * 1000.0;
        let metrics = PaginationMetrics {
            pages: page_metrics,
            block_count: blocks.len(),
            physical_pages: document.physical_pages,
            surfaces_created: self.ctx.tracker.created() - surfaces_before,
            measure_ms,
            plan_ms,
            compose_ms,
            assemble_ms,
            total_ms,
            output_bytes: document.bytes.len(),
        };
        if let Some(perf) = self.perf {
            perf.log_counts(
                "run",
                Some(self.run_id),
                &[
                    ("blocks", blocks.len() as u64),
                    ("pages", pages.len() as u64),
                    ("physical_pages", document.physical_pages as u64),
                    ("discrepancies", discrepancies.len() as u64),
                ],
            );
            perf.flush();
        }
        info!(
            "paginated {} blocks into {} pages ({} physical) in {:.1}ms",
            blocks.len(),
            pages.len(),
            document.physical_pages,
            total_ms
        );

        Ok(PaginationResult {
            total_pages: pages.len(),
            pages,
            document,
            discrepancies,
            metrics,
        })
    }

    /// Renders the whole markup as one raster and slices it across pages
    /// without consulting block boundaries.
    pub fn render_unpaginated(&self, markup: &str) -> Result<OutputDocument, PagewrightError> {
        let started = Instant::now();
        let raster = render_isolated(markup.to_string(), RenderUnit::Document, &self.ctx)?;
        self.span("compose", started);
        let started = Instant::now();
        let document = assemble(&[&raster], self.ctx.geometry, self.ctx.options)?;
        self.span("assemble", started);
        if let Some(perf) = self.perf {
            perf.log_counts(
                "unpaginated",
                Some(self.run_id),
                &[("physical_pages", document.physical_pages as u64)],
            );
            perf.flush();
        }
        info!(
            "rendered unpaginated document onto {} physical pages",
            document.physical_pages
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RenderOptions;
    use crate::stylesheet::Stylesheet;
    use crate::surface::SurfaceTracker;
    use crate::testing::ScriptedRenderer;
    use crate::types::PageGeometry;

    fn run(markup: &str, options: RenderOptions) -> Result<PaginationResult, PagewrightError> {
        let geometry = PageGeometry::a4();
        let sheet = Stylesheet::default();
        let tracker = SurfaceTracker::new();
        let renderer = ScriptedRenderer::new();
        let pipeline = Pipeline {
            ctx: MeasureContext {
                geometry: &geometry,
                options: &options,
                renderer: &renderer,
                stylesheet: &sheet,
                tracker: &tracker,
            },
            perf: None,
            run_id: 1,
        };
        let result = pipeline.paginate(markup);
        assert_eq!(tracker.active(), 0);
        result
    }

    fn blocks_mm(heights: &[f32]) -> String {
        heights
            .iter()
            .map(|mm| format!("<p data-mm=\"{mm}\">x</p>"))
            .collect()
    }

    #[test]
    fn three_blocks_of_100mm_make_two_pages() {
        let result = run(&blocks_mm(&[100.0, 100.0, 100.0]), RenderOptions::standard()).unwrap();
        assert_eq!(result.total_pages, 2);
        assert_eq!(result.assignment(), vec![vec![0, 1], vec![2]]);
        assert_eq!(result.pages[0].blocks.len(), 2);
        assert_eq!(result.document.physical_pages, 2);
        assert!(result.discrepancies.is_empty());
        assert_eq!(result.metrics.block_count, 3);
        // One surface per measured block plus one per composed page.
        assert_eq!(result.metrics.surfaces_created, 5);
    }

    #[test]
    fn over_tall_block_gets_its_own_sliced_page() {
        let result = run(&blocks_mm(&[20.0, 400.0, 20.0]), RenderOptions::standard()).unwrap();
        assert_eq!(result.assignment(), vec![vec![0], vec![1], vec![2]]);
        assert!(result.pages[1].overflow);
        assert_eq!(result.document.physical_pages, 4);
        assert!(result.document.physical_pages >= result.total_pages);
    }

    #[test]
    fn empty_input_yields_zero_pages_and_a_valid_pdf() {
        let result = run("", RenderOptions::standard()).unwrap();
        assert_eq!(result.total_pages, 0);
        assert!(result.pages.is_empty());
        assert_eq!(result.document.physical_pages, 0);
        assert!(result.document.bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn page_numbers_are_contiguous_and_heights_conserved() {
        let heights: Vec<f32> = (0..40).map(|i| 5.0 + (i * 13 % 70) as f32).collect();
        let result = run(&blocks_mm(&heights), RenderOptions::compact()).unwrap();
        let numbers: Vec<usize> = result.pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, (1..=result.total_pages).collect::<Vec<_>>());
        let committed: Vec<f32> = result
            .pages
            .iter()
            .flat_map(|p| p.block_heights.iter().copied())
            .collect();
        assert_eq!(committed.len(), heights.len());
        for (measured, scripted) in committed.iter().zip(&heights) {
            assert!((measured - scripted).abs() < 0.2);
        }
        for page in &result.pages {
            let sum: f32 = page.block_heights.iter().sum();
            assert!((sum - page.planned_mm).abs() < 1e-3);
            assert!(page.planned_mm <= 257.0 || page.overflow);
        }
    }

    #[test]
    fn preview_flag_does_not_change_output() {
        let markup = blocks_mm(&[120.0, 90.0, 60.0, 200.0, 10.0]);
        let plain = run(&markup, RenderOptions::standard()).unwrap();
        let preview = run(
            &markup,
            RenderOptions {
                show_preview: true,
                ..RenderOptions::standard()
            },
        )
        .unwrap();
        assert_eq!(plain.assignment_digest(), preview.assignment_digest());
        assert_eq!(plain.document.bytes, preview.document.bytes);
        assert!(plain.pages.iter().all(|p| p.preview.is_none()));
        assert!(preview.pages.iter().all(|p| p.preview.is_some()));
        assert!(plain.pages[0].preview_data_uri().unwrap().starts_with("data:image/png"));
    }

    #[test]
    fn runs_are_idempotent() {
        let markup = blocks_mm(&[80.0, 120.0, 90.0, 30.0]);
        let first = run(&markup, RenderOptions::standard()).unwrap();
        let second = run(&markup, RenderOptions::standard()).unwrap();
        assert_eq!(first.assignment(), second.assignment());
        assert_eq!(first.document.bytes, second.document.bytes);
    }

    #[test]
    fn failing_block_aborts_the_run() {
        let err = run(
            "<p data-mm=\"10\">a</p><pre data-fail=\"no fonts\">b</pre>",
            RenderOptions::standard(),
        )
        .unwrap_err();
        assert!(matches!(
            err.render_unit(),
            Some(RenderUnit::Block { index: 1, .. })
        ));
    }

    #[test]
    fn digest_depends_on_page_breaks() {
        let a = assignment_digest(&[vec![0, 1], vec![2]]);
        let b = assignment_digest(&[vec![0], vec![1, 2]]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
