use crate::error::PagewrightError;
use crate::types::Color;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ColorType, ImageEncoder, RgbImage, RgbaImage};

/// A rendered pixel image of a block or page group.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    image: RgbaImage,
}

impl Raster {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn blank(width: u32, height: u32, color: Color) -> Self {
        let [r, g, b] = color.to_rgb8();
        Self {
            image: RgbaImage::from_pixel(width, height, image::Rgba([r, g, b, 255])),
        }
    }

    /// Takes ownership of a tiny-skia pixmap. Pixmaps painted on an opaque
    /// background hold identical premultiplied and straight values.
    pub fn from_pixmap(pixmap: tiny_skia::Pixmap) -> Result<Self, PagewrightError> {
        let (width, height) = (pixmap.width(), pixmap.height());
        let image = RgbaImage::from_raw(width, height, pixmap.take()).ok_or_else(|| {
            PagewrightError::Image(format!("pixmap buffer does not match {width}x{height}"))
        })?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Height in millimetres once the raster is scaled to `content_width_mm`.
    /// Derived from the raster's own aspect ratio only.
    pub fn height_at_width_mm(&self, content_width_mm: f32) -> f32 {
        if self.width() == 0 {
            return 0.0;
        }
        self.height() as f32 * content_width_mm / self.width() as f32
    }

    /// Returns a copy no wider than `max_width`, keeping the aspect ratio.
    pub fn downsampled_to_width(&self, max_width: u32) -> Raster {
        if max_width == 0 || self.width() <= max_width {
            return self.clone();
        }
        let ratio = max_width as f64 / self.width() as f64;
        let height = ((self.height() as f64 * ratio).round() as u32).max(1);
        Raster {
            image: image::imageops::resize(&self.image, max_width, height, FilterType::Triangle),
        }
    }

    pub fn encode_jpeg(&self, quality: u8, background: Color) -> Result<Vec<u8>, PagewrightError> {
        let rgb = flatten(&self.image, background);
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode_image(&rgb)?;
        Ok(out)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, PagewrightError> {
        let mut png = Vec::new();
        PngEncoder::new(&mut png).write_image(
            self.image.as_raw(),
            self.width(),
            self.height(),
            ColorType::Rgba8.into(),
        )?;
        Ok(png)
    }

    pub fn png_data_uri(&self) -> Result<String, PagewrightError> {
        let png = self.encode_png()?;
        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }
}

fn flatten(image: &RgbaImage, background: Color) -> RgbImage {
    let [br, bg, bb] = background.to_rgb8();
    let blend = |c: u8, under: u8, a: u8| -> u8 {
        ((c as u16 * a as u16 + under as u16 * (255 - a as u16) + 127) / 255) as u8
    };
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        image::Rgb([blend(r, br, a), blend(g, bg, a), blend(b, bb, a)])
    })
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_height_comes_from_aspect_ratio() {
        let raster = Raster::blank(1286, 756, Color::WHITE);
        let height = raster.height_at_width_mm(170.0);
        assert!((height - 99.93).abs() < 0.01, "height {height}");
        assert_eq!(Raster::blank(0, 10, Color::WHITE).height_at_width_mm(170.0), 0.0);
        assert!(Raster::blank(0, 10, Color::WHITE).is_empty());
    }

    #[test]
    fn jpeg_and_png_round_trip_dimensions() {
        let raster = Raster::blank(40, 20, Color::from_rgb8(10, 20, 30));
        let jpeg = raster.encode_jpeg(85, Color::WHITE).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));

        let uri = raster.png_data_uri().unwrap();
        let (mime, data) = parse_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        let decoded = image::load_from_memory(&data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));
    }

    #[test]
    fn transparent_pixels_flatten_onto_background() {
        let image = RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 0]));
        let rgb = flatten(&image, Color::WHITE);
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn downsampling_keeps_aspect_ratio() {
        let raster = Raster::blank(400, 1000, Color::WHITE);
        let smaller = raster.downsampled_to_width(200);
        assert_eq!((smaller.width(), smaller.height()), (200, 500));
        assert_eq!(raster.downsampled_to_width(800).width(), 400);
    }
}
