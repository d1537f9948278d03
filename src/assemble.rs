use crate::error::PagewrightError;
use crate::options::RenderOptions;
use crate::raster::Raster;
use crate::types::{PageGeometry, mm_to_pt};
use log::{debug, info};
use lopdf::content::{Content, Operation};
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId, Stream as LoStream, dictionary};
use std::path::Path;

/// Tolerance below which a raster taller than the content box still counts
/// as fitting on one physical page.
const FIT_EPSILON_MM: f32 = 0.05;

/// One physical page's view into a logical page raster.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceRecord {
    /// 1-based logical page the raster belongs to.
    pub page: usize,
    /// 1-based physical page in the output document.
    pub physical_page: usize,
    /// Distance from the raster's top edge to the top of this slice.
    pub offset_mm: f32,
}

/// The assembled output document.
#[derive(Debug, Clone)]
pub struct OutputDocument {
    pub bytes: Vec<u8>,
    pub physical_pages: usize,
    pub slices: Vec<SliceRecord>,
}

impl OutputDocument {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PagewrightError> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    /// Physical pages spent on rasters taller than the content box.
    pub fn extra_slices(&self) -> usize {
        self.slices.iter().filter(|slice| slice.offset_mm > 0.0).count()
    }
}

/// Places each raster on its own physical page, scaled to the content width
/// and anchored at the top margin. Rasters taller than the content box are
/// drawn again on following pages, shifted up by one content height per page
/// and clipped to the content box.
pub fn assemble(
    rasters: &[&Raster],
    geometry: &PageGeometry,
    options: &RenderOptions,
) -> Result<OutputDocument, PagewrightError> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_width_pt = mm_to_pt(geometry.width_mm);
    let page_height_pt = mm_to_pt(geometry.height_mm);
    let content_width_mm = geometry.content_width_mm();
    let content_height_mm = geometry.content_height_mm();
    let left_pt = mm_to_pt(geometry.margins.left);
    let top_pt = mm_to_pt(geometry.margins.top);
    let content_width_pt = mm_to_pt(content_width_mm);
    let content_height_pt = mm_to_pt(content_height_mm);
    let clip_bottom_pt = page_height_pt - top_pt - content_height_pt;

    let mut kids: Vec<LoObject> = Vec::new();
    let mut slices = Vec::new();
    for (position, raster) in rasters.iter().enumerate() {
        let page = position + 1;
        let height_mm = raster.height_at_width_mm(content_width_mm);
        let image_id = embed_raster(&mut doc, raster, geometry, options)?;
        let image_name = format!("Im{page}");
        let image_height_pt = mm_to_pt(height_mm);
        let slice_count = slice_count(height_mm, content_height_mm);
        if slice_count > 1 {
            debug!(
                "page {} raster is {:.2}mm tall; slicing over {} physical pages",
                page, height_mm, slice_count
            );
        }
        for slice in 0..slice_count {
            let offset_mm = slice as f32 * content_height_mm;
            let image_bottom_pt =
                page_height_pt - top_pt - image_height_pt + mm_to_pt(offset_mm);
            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "re",
                        vec![
                            left_pt.into(),
                            clip_bottom_pt.into(),
                            content_width_pt.into(),
                            content_height_pt.into(),
                        ],
                    ),
                    Operation::new("W", vec![]),
                    Operation::new("n", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            content_width_pt.into(),
                            0.into(),
                            0.into(),
                            image_height_pt.into(),
                            left_pt.into(),
                            image_bottom_pt.into(),
                        ],
                    ),
                    Operation::new("Do", vec![LoObject::Name(image_name.as_bytes().to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_id = doc.add_object(LoStream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), page_width_pt.into(), page_height_pt.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! {
                        image_name.as_str() => image_id,
                    },
                },
            });
            kids.push(page_id.into());
            slices.push(SliceRecord {
                page,
                physical_page: kids.len(),
                offset_mm,
            });
        }
    }

    let physical_pages = kids.len();
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => physical_pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Producer" => LoObject::string_literal("pagewright"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    info!(
        "assembled {} logical pages into {} physical pages ({} bytes)",
        rasters.len(),
        physical_pages,
        bytes.len()
    );
    Ok(OutputDocument {
        bytes,
        physical_pages,
        slices,
    })
}

fn slice_count(height_mm: f32, content_height_mm: f32) -> usize {
    if height_mm <= content_height_mm + FIT_EPSILON_MM || content_height_mm <= 0.0 {
        return 1;
    }
    ((height_mm - FIT_EPSILON_MM) / content_height_mm).ceil().max(1.0) as usize
}

/// Encodes the raster as a JPEG image XObject, first capping its density at
/// `options.dpi` when set.
fn embed_raster(
    doc: &mut LoDocument,
    raster: &Raster,
    geometry: &PageGeometry,
    options: &RenderOptions,
) -> Result<ObjectId, PagewrightError> {
    let capped;
    let raster = match options.dpi {
        Some(dpi) => {
            let max_width = (geometry.content_width_mm() / 25.4 * dpi as f32).ceil() as u32;
            if raster.width() > max_width {
                capped = raster.downsampled_to_width(max_width);
                &capped
            } else {
                raster
            }
        }
        None => raster,
    };
    let jpeg = raster.encode_jpeg(options.jpeg_quality(), options.background)?;
    let stream = LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => raster.width() as i64,
            "Height" => raster.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    )
    .with_compression(false);
    Ok(doc.add_object(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::inspect_pdf_bytes;
    use crate::types::Color;

    fn raster_mm(height_mm: f32) -> Raster {
        let width = 340;
        let height = (height_mm * width as f32 / 170.0).round() as u32;
        Raster::blank(width, height, Color::from_rgb8(200, 220, 240))
    }

    #[test]
    fn one_physical_page_per_fitting_raster() {
        let first = raster_mm(200.0);
        let second = raster_mm(100.0);
        let out = assemble(&[&first, &second], &PageGeometry::a4(), &RenderOptions::standard())
            .unwrap();
        assert_eq!(out.physical_pages, 2);
        assert_eq!(out.extra_slices(), 0);
        let report = inspect_pdf_bytes(&out.bytes).unwrap();
        assert_eq!(report.page_count, 2);
        assert!((report.pages[0].width_pt - 595.28).abs() < 0.1);
        assert!((report.pages[0].height_pt - 841.89).abs() < 0.1);
        assert_eq!(report.pages[0].images.len(), 1);
        assert_eq!(report.pages[0].images[0].filter.as_deref(), Some("DCTDecode"));
    }

    #[test]
    fn over_tall_raster_is_sliced_with_negative_offsets() {
        let tall = raster_mm(600.0);
        let out =
            assemble(&[&tall], &PageGeometry::a4(), &RenderOptions::standard()).unwrap();
        assert_eq!(out.physical_pages, 3);
        let offsets: Vec<f32> = out.slices.iter().map(|s| s.offset_mm).collect();
        assert_eq!(offsets, vec![0.0, 257.0, 514.0]);
        assert!(out.slices.iter().all(|s| s.page == 1));
        let report = inspect_pdf_bytes(&out.bytes).unwrap();
        assert_eq!(report.page_count, 3);
        assert!(report.pages.iter().all(|p| p.images.len() == 1));
    }

    #[test]
    fn zero_pages_still_produce_a_valid_pdf() {
        let out = assemble(&[], &PageGeometry::a4(), &RenderOptions::standard()).unwrap();
        assert_eq!(out.physical_pages, 0);
        assert!(out.bytes.starts_with(b"%PDF-"));
        let report = inspect_pdf_bytes(&out.bytes).unwrap();
        assert_eq!(report.page_count, 0);
    }

    #[test]
    fn dpi_caps_embedded_density() {
        let wide = Raster::blank(4000, 400, Color::WHITE);
        let options = RenderOptions {
            dpi: Some(150),
            ..RenderOptions::standard()
        };
        let out = assemble(&[&wide], &PageGeometry::a4(), &options).unwrap();
        let report = inspect_pdf_bytes(&out.bytes).unwrap();
        // 170mm at 150dpi.
        assert_eq!(report.pages[0].images[0].width, 1004);
    }

    #[test]
    fn slice_count_tolerates_rounding() {
        assert_eq!(slice_count(257.02, 257.0), 1);
        assert_eq!(slice_count(257.5, 257.0), 2);
        assert_eq!(slice_count(514.0, 257.0), 2);
        assert_eq!(slice_count(0.0, 257.0), 1);
    }

    #[test]
    fn saves_to_disk() {
        let raster = raster_mm(50.0);
        let out = assemble(&[&raster], &PageGeometry::a4(), &RenderOptions::compact()).unwrap();
        let path = std::env::temp_dir().join(format!(
            "pagewright_assemble_{}.pdf",
            std::process::id()
        ));
        out.save(&path).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, out.bytes);
        let _ = std::fs::remove_file(&path);
    }
}
