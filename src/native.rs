use crate::extract::element_tag;
use crate::raster::{Raster, parse_data_uri};
use crate::stylesheet::{BlockStyle, Stylesheet};
use crate::surface::{RenderError, Renderer, Surface};
use crate::types::Color;
use kuchiki::traits::TendrilSink;
use log::debug;
use kuchiki::{NodeData, NodeRef};
use tiny_skia::{FilterQuality, Paint, Pixmap, PixmapPaint, Rect, Transform};

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "img", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "ul",
];

const SKIPPED: &[&str] = &["head", "style", "script", "template", "noscript", "title"];

const GRID: Color = Color {
    r: 0.8,
    g: 0.8,
    b: 0.8,
};

/// Deterministic block-layout rasterizer.
///
/// Lays out block boxes with fixed per-character advances and paints text as
/// glyph bars ("greeked" text). It honours the custom stylesheet's tag rules,
/// margins, padding, backgrounds, left borders, list markers, table grids and
/// `data:` images. Any other image source is reported as inaccessible.
#[derive(Debug, Clone)]
pub struct NativeRasterizer {
    max_device_height: u32,
}

impl Default for NativeRasterizer {
    fn default() -> Self {
        Self {
            max_device_height: 60_000,
        }
    }
}

impl NativeRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the device height of one surface. Taller content is drawn at a
    /// lower scale instead of failing.
    pub fn with_max_device_height(mut self, pixels: u32) -> Self {
        self.max_device_height = pixels.max(1);
        self
    }
}

impl Renderer for NativeRasterizer {
    fn render(&self, surface: &Surface<'_>) -> Result<Raster, RenderError> {
        let document = kuchiki::parse_html().one(surface.markup());
        let root = match document.select_first("body") {
            Ok(body) => body.as_node().clone(),
            Err(()) => document,
        };
        let sheet = surface.stylesheet();
        let root_style = sheet.root_style();
        let mut layout = Layout {
            sheet,
            items: Vec::new(),
            letter_rendering: surface.letter_rendering(),
        };
        let width = surface.width_px() as f32;
        let height = layout.flow_children(&root, &root_style, 0.0, width, 0.0)?;

        if height <= 0.0 {
            return Err(RenderError::new("content rendered to an empty raster"));
        }
        // Past the height cap the whole surface is drawn at a lower density.
        // Physical height comes from the aspect ratio, so it is unchanged.
        let scale = surface.scale().min(self.max_device_height as f32 / height);
        let device_width = ((width * scale).round() as u32).max(1);
        let device_height = ((height * scale).ceil() as u32).clamp(1, self.max_device_height);
        if scale < surface.scale() {
            debug!(
                "surface {} is {height:.0}px tall; drawing at scale {scale:.3} instead of {}",
                surface.id(),
                surface.scale()
            );
        }
        let mut pixmap = Pixmap::new(device_width, device_height).ok_or_else(|| {
            RenderError::new(format!(
                "invalid raster size {device_width}x{device_height}"
            ))
        })?;
        pixmap.fill(to_sk_color(root_style.background.unwrap_or(surface.background())));
        paint_items(&mut pixmap, &layout.items, scale);
        Raster::from_pixmap(pixmap).map_err(|err| RenderError::new(err.to_string()))
    }
}

enum Item {
    Fill {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        pixmap: Pixmap,
    },
}

fn fill(x: f32, y: f32, width: f32, height: f32, color: Color) -> Item {
    Item::Fill {
        x,
        y,
        width,
        height,
        color,
    }
}

struct Layout<'a> {
    sheet: &'a Stylesheet,
    items: Vec<Item>,
    letter_rendering: bool,
}

impl Layout<'_> {
    /// Lays out the children of `parent` top to bottom and returns the bottom
    /// edge, including the last child's bottom margin.
    fn flow_children(
        &mut self,
        parent: &NodeRef,
        style: &BlockStyle,
        x: f32,
        width: f32,
        top: f32,
    ) -> Result<f32, RenderError> {
        let mut y = top;
        let mut pending_margin = 0.0f32;
        let mut inline = String::new();
        for child in parent.children() {
            match child.data() {
                NodeData::Text(text) => inline.push_str(&text.borrow()),
                NodeData::Element(el) => {
                    let tag = el.name.local.as_ref().to_ascii_lowercase();
                    if SKIPPED.contains(&tag.as_str()) {
                        continue;
                    }
                    if tag == "br" {
                        inline.push('\n');
                        continue;
                    }
                    if !BLOCK_TAGS.contains(&tag.as_str()) && !contains_image(&child) {
                        collect_inline_text(&child, &mut inline);
                        continue;
                    }
                    y = self.flush_inline(&mut inline, style, x, width, y, &mut pending_margin);
                    let child_style = self.sheet.style_for(&tag, style);
                    y += pending_margin.max(child_style.margin_top);
                    y = self.layout_block(&child, &tag, &child_style, x, width, y)?;
                    pending_margin = child_style.margin_bottom;
                }
                _ => {}
            }
        }
        y = self.flush_inline(&mut inline, style, x, width, y, &mut pending_margin);
        Ok(y + pending_margin)
    }

    fn flush_inline(
        &mut self,
        inline: &mut String,
        style: &BlockStyle,
        x: f32,
        width: f32,
        y: f32,
        pending_margin: &mut f32,
    ) -> f32 {
        if inline.trim().is_empty() {
            inline.clear();
            return y;
        }
        let y = y + *pending_margin;
        *pending_margin = 0.0;
        let bottom = self.layout_text(inline, style, x, width, y);
        inline.clear();
        bottom
    }

    fn layout_block(
        &mut self,
        node: &NodeRef,
        tag: &str,
        style: &BlockStyle,
        x: f32,
        width: f32,
        y: f32,
    ) -> Result<f32, RenderError> {
        match tag {
            "hr" => {
                let height = 2.0;
                self.items
                    .push(fill(x, y, width, height, style.background.unwrap_or(GRID)));
                Ok(y + height)
            }
            "img" => self.layout_image(node, x, width, y),
            "table" => self.layout_table(node, style, x, width, y),
            "pre" => self.layout_box(style, x, width, y, |this, ix, iw, iy| {
                Ok(this.layout_preformatted(&node.text_contents(), style, ix, iw, iy))
            }),
            "ul" | "ol" => {
                let ordered = tag == "ol";
                self.layout_box(style, x, width, y, |this, ix, iw, iy| {
                    this.layout_list(node, style, ordered, ix, iw, iy)
                })
            }
            _ => self.layout_box(style, x, width, y, |this, ix, iw, iy| {
                this.flow_children(node, style, ix, iw, iy)
            }),
        }
    }

    /// Applies padding, background and left border around `content`.
    fn layout_box<F>(
        &mut self,
        style: &BlockStyle,
        x: f32,
        width: f32,
        y: f32,
        content: F,
    ) -> Result<f32, RenderError>
    where
        F: FnOnce(&mut Self, f32, f32, f32) -> Result<f32, RenderError>,
    {
        let border = style.border_left.map(|(w, _)| w).unwrap_or(0.0);
        let [pad_top, pad_right, pad_bottom, pad_left] = style.padding;
        let inner_x = x + border + pad_left;
        let inner_width = (width - border - pad_left - pad_right).max(1.0);
        let mark = self.items.len();
        let bottom = content(self, inner_x, inner_width, y + pad_top)? + pad_bottom;
        let height = bottom - y;
        let mut decorations = Vec::new();
        if let Some(background) = style.background {
            decorations.push(fill(x, y, width, height, background));
        }
        if let Some((border_width, color)) = style.border_left {
            decorations.push(fill(x, y, border_width, height, color));
        }
        self.items.splice(mark..mark, decorations);
        Ok(bottom)
    }

    fn layout_list(
        &mut self,
        list: &NodeRef,
        style: &BlockStyle,
        ordered: bool,
        x: f32,
        width: f32,
        top: f32,
    ) -> Result<f32, RenderError> {
        let mut y = top;
        let mut pending_margin = 0.0f32;
        let mut number = 0usize;
        for child in list.children() {
            let Some(tag) = element_tag(&child) else {
                continue;
            };
            let item_style = self.sheet.style_for(&tag, style);
            y += pending_margin.max(item_style.margin_top);
            if tag == "li" {
                number += 1;
                self.draw_marker(&item_style, ordered, number, x, y);
            }
            y = self.layout_box(&item_style, x, width, y, |this, ix, iw, iy| {
                this.flow_children(&child, &item_style, ix, iw, iy)
            })?;
            pending_margin = item_style.margin_bottom;
        }
        Ok(y + pending_margin)
    }

    fn draw_marker(&mut self, style: &BlockStyle, ordered: bool, number: usize, x: f32, y: f32) {
        let line = style.line_px();
        if ordered {
            let advance = char_advance(style);
            let label = format!("{number}.");
            let start = (x - (label.len() as f32 + 1.0) * advance).max(0.0);
            let glyph = style.font_size * 0.62;
            self.draw_run(&label, style, start, y + (line - glyph) / 2.0, advance, glyph);
        } else {
            let size = style.font_size * 0.35;
            let start = (x - style.font_size * 1.1).max(0.0);
            self.items
                .push(fill(start, y + (line - size) / 2.0, size, size, style.color));
        }
    }

    fn layout_table(
        &mut self,
        table: &NodeRef,
        style: &BlockStyle,
        x: f32,
        width: f32,
        top: f32,
    ) -> Result<f32, RenderError> {
        let rows = table_rows(table);
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return Ok(top);
        }
        let column_width = width / columns as f32;
        let mut y = top;
        self.items.push(fill(x, y, width, 1.0, GRID));
        y += 1.0;
        for row in rows {
            let mark = self.items.len();
            let mut bottom = y;
            let mut backgrounds = Vec::new();
            for (column, cell) in row.iter().enumerate() {
                let tag = element_tag(cell).unwrap_or_default();
                let cell_style = self.sheet.style_for(&tag, style);
                let cell_x = x + column as f32 * column_width;
                let [pad_top, pad_right, pad_bottom, pad_left] = cell_style.padding;
                let inner_bottom = self.flow_children(
                    cell,
                    &cell_style,
                    cell_x + 1.0 + pad_left,
                    (column_width - 1.0 - pad_left - pad_right).max(1.0),
                    y + pad_top,
                )?;
                bottom = bottom.max(inner_bottom + pad_bottom);
                if let Some(background) = cell_style.background {
                    backgrounds.push((cell_x, background));
                }
            }
            let row_height = bottom - y;
            let decorations: Vec<Item> = backgrounds
                .into_iter()
                .map(|(cell_x, color)| fill(cell_x, y, column_width, row_height, color))
                .collect();
            self.items.splice(mark..mark, decorations);
            for column in 0..=columns {
                let line_x = (x + column as f32 * column_width).min(x + width - 1.0);
                self.items.push(fill(line_x, y, 1.0, row_height, GRID));
            }
            y = bottom;
            self.items.push(fill(x, y, width, 1.0, GRID));
            y += 1.0;
        }
        Ok(y)
    }

    fn layout_image(
        &mut self,
        node: &NodeRef,
        x: f32,
        width: f32,
        y: f32,
    ) -> Result<f32, RenderError> {
        let Some(element) = node.as_element() else {
            return Ok(y);
        };
        let (src, attr_width, attr_height) = {
            let attrs = element.attributes.borrow();
            (
                attrs.get("src").map(str::to_string),
                attrs.get("width").and_then(parse_dimension),
                attrs.get("height").and_then(parse_dimension),
            )
        };
        let Some(src) = src else {
            return Ok(y);
        };
        let Some((mime, data)) = parse_data_uri(&src) else {
            return Err(RenderError::new(format!(
                "external resource is not accessible: {}",
                truncate(&src, 80)
            )));
        };
        let pixmap = decode_image_to_pixmap(&data, Some(&mime))
            .ok_or_else(|| RenderError::new(format!("cannot decode embedded {mime} image")))?;
        let natural_width = pixmap.width() as f32;
        let natural_height = pixmap.height() as f32;
        let (mut image_width, mut image_height) = match (attr_width, attr_height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w * natural_height / natural_width),
            (None, Some(h)) => (h * natural_width / natural_height, h),
            (None, None) => (natural_width, natural_height),
        };
        if image_width > width {
            image_height *= width / image_width;
            image_width = width;
        }
        self.items.push(Item::Image {
            x,
            y,
            width: image_width,
            height: image_height,
            pixmap,
        });
        Ok(y + image_height)
    }

    fn layout_text(&mut self, text: &str, style: &BlockStyle, x: f32, width: f32, top: f32) -> f32 {
        let advance = char_advance(style);
        let line = style.line_px();
        let glyph = style.font_size * 0.62;
        let max_chars = ((width / advance).floor() as usize).max(1);
        let mut y = top;
        for paragraph in text.split('\n') {
            let words: Vec<&str> = paragraph.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }
            for line_text in wrap_words(&words, max_chars) {
                self.draw_run(&line_text, style, x, y + (line - glyph) / 2.0, advance, glyph);
                y += line;
            }
        }
        y
    }

    fn layout_preformatted(
        &mut self,
        text: &str,
        style: &BlockStyle,
        x: f32,
        width: f32,
        top: f32,
    ) -> f32 {
        let advance = char_advance(style);
        let line = style.line_px();
        let glyph = style.font_size * 0.62;
        let max_chars = ((width / advance).floor() as usize).max(1);
        let text = text.replace('\t', "    ");
        let text = text.strip_prefix('\n').unwrap_or(&text);
        let text = text.strip_suffix('\n').unwrap_or(text);
        let mut y = top;
        for raw_line in text.split('\n') {
            let clipped: String = raw_line.chars().take(max_chars).collect();
            self.draw_run(&clipped, style, x, y + (line - glyph) / 2.0, advance, glyph);
            y += line;
        }
        y
    }

    /// Paints one line of text as bars: one per word, or one per glyph with
    /// letter rendering.
    fn draw_run(&mut self, text: &str, style: &BlockStyle, x: f32, y: f32, advance: f32, glyph: f32) {
        let mut run_start: Option<usize> = None;
        let mut count = 0usize;
        for (index, ch) in text.chars().enumerate() {
            count = index + 1;
            if ch.is_whitespace() {
                if let Some(start) = run_start.take() {
                    self.push_run(start, index, style, x, y, advance, glyph);
                }
                continue;
            }
            if self.letter_rendering {
                self.items.push(fill(
                    x + index as f32 * advance,
                    y,
                    advance * 0.78,
                    glyph,
                    style.color,
                ));
            } else if run_start.is_none() {
                run_start = Some(index);
            }
        }
        if let Some(start) = run_start {
            self.push_run(start, count, style, x, y, advance, glyph);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_run(
        &mut self,
        start: usize,
        end: usize,
        style: &BlockStyle,
        x: f32,
        y: f32,
        advance: f32,
        glyph: f32,
    ) {
        let weight = if style.bold { 1.0 } else { 0.82 };
        self.items.push(fill(
            x + start as f32 * advance,
            y + glyph * (1.0 - weight) / 2.0,
            (end - start) as f32 * advance,
            glyph * weight,
            style.color,
        ));
    }
}

fn char_advance(style: &BlockStyle) -> f32 {
    let factor = if style.monospace {
        0.6
    } else if style.bold {
        0.56
    } else {
        0.5
    };
    style.font_size * factor
}

fn wrap_words(words: &[&str], max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for word in words {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > max_chars {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            lines.push(chars.drain(..max_chars).collect());
        }
        if chars.is_empty() {
            continue;
        }
        let word_len = chars.len();
        if current_len == 0 {
            current.extend(chars);
            current_len = word_len;
        } else if current_len + 1 + word_len <= max_chars {
            current.push(' ');
            current.extend(chars);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.extend(chars);
            current_len = word_len;
        }
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

fn collect_inline_text(node: &NodeRef, out: &mut String) {
    for descendant in node.descendants() {
        match descendant.data() {
            NodeData::Text(text) => out.push_str(&text.borrow()),
            NodeData::Element(el) if el.name.local.as_ref().eq_ignore_ascii_case("br") => {
                out.push('\n')
            }
            _ => {}
        }
    }
}

fn contains_image(node: &NodeRef) -> bool {
    node.descendants()
        .any(|descendant| element_tag(&descendant).as_deref() == Some("img"))
}

fn table_rows(table: &NodeRef) -> Vec<Vec<NodeRef>> {
    let mut rows = Vec::new();
    for child in table.children() {
        match element_tag(&child).as_deref() {
            Some("tr") => rows.push(row_cells(&child)),
            Some("thead") | Some("tbody") | Some("tfoot") => {
                for row in child.children() {
                    if element_tag(&row).as_deref() == Some("tr") {
                        rows.push(row_cells(&row));
                    }
                }
            }
            _ => {}
        }
    }
    rows
}

fn row_cells(row: &NodeRef) -> Vec<NodeRef> {
    row.children()
        .filter(|cell| matches!(element_tag(cell).as_deref(), Some("td") | Some("th")))
        .collect()
}

fn parse_dimension(raw: &str) -> Option<f32> {
    let value: f32 = raw.trim().trim_end_matches("px").parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn paint_items(pixmap: &mut Pixmap, items: &[Item], scale: f32) {
    let transform = Transform::from_scale(scale, scale);
    for item in items {
        match item {
            Item::Fill {
                x,
                y,
                width,
                height,
                color,
            } => {
                if let Some(rect) = Rect::from_xywh(*x, *y, *width, *height) {
                    let mut paint = Paint::default();
                    paint.set_color(to_sk_color(*color));
                    pixmap.fill_rect(rect, &paint, transform, None);
                }
            }
            Item::Image {
                x,
                y,
                width,
                height,
                pixmap: image,
            } => {
                let sx = width / image.width() as f32;
                let sy = height / image.height() as f32;
                let placement = transform.pre_concat(Transform::from_row(sx, 0.0, 0.0, sy, *x, *y));
                let mut paint = PixmapPaint::default();
                paint.quality = FilterQuality::Bilinear;
                pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, placement, None);
            }
        }
    }
}

fn to_sk_color(color: Color) -> tiny_skia::Color {
    let [r, g, b] = color.to_rgb8();
    tiny_skia::Color::from_rgba8(r, g, b, 255)
}

fn decode_image_to_pixmap(data: &[u8], mime: Option<&str>) -> Option<Pixmap> {
    let guessed_format = match mime {
        Some(mime) if mime.contains("png") => Some(image::ImageFormat::Png),
        Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => {
            Some(image::ImageFormat::Jpeg)
        }
        _ => image::guess_format(data).ok(),
    };
    let decoded = match guessed_format {
        Some(format) => image::load_from_memory_with_format(data, format).ok()?,
        None => image::load_from_memory(data).ok()?,
    };
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    for (src, dst) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let alpha = src[3];
        dst[0] = premul_u8(src[0], alpha);
        dst[1] = premul_u8(src[1], alpha);
        dst[2] = premul_u8(src[2], alpha);
        dst[3] = alpha;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RenderOptions;
    use crate::surface::SurfaceTracker;
    use base64::Engine;

    fn render(markup: &str, css: &str, options: &RenderOptions) -> Result<Raster, RenderError> {
        render_with(&NativeRasterizer::new(), markup, css, options)
    }

    fn render_with(
        rasterizer: &NativeRasterizer,
        markup: &str,
        css: &str,
        options: &RenderOptions,
    ) -> Result<Raster, RenderError> {
        let tracker = SurfaceTracker::new();
        let sheet = Stylesheet::parse(css);
        let surface = tracker.acquire(markup.to_string(), &sheet, 643, options);
        rasterizer.render(&surface)
    }

    fn has_dark_pixel(raster: &Raster) -> bool {
        raster.image().pixels().any(|p| p.0[0] < 128)
    }

    #[test]
    fn paragraph_height_follows_line_metrics() {
        let options = RenderOptions {
            scale: 1.0,
            ..RenderOptions::standard()
        };
        let raster = render("<p>Hello world</p>", "", &options).unwrap();
        assert_eq!(raster.width(), 643);
        // 14px margins above and below one 22.4px line.
        assert_eq!(raster.height(), 51);
        assert!(has_dark_pixel(&raster));
    }

    #[test]
    fn scale_multiplies_device_pixels() {
        let one = render("<h1>Title</h1>", "", &RenderOptions::compact()).unwrap();
        let two = render("<h1>Title</h1>", "", &RenderOptions::standard()).unwrap();
        assert_eq!(two.width(), 1286);
        assert!(two.height() > one.height());
        let ratio_one = one.height_at_width_mm(170.0);
        let ratio_two = two.height_at_width_mm(170.0);
        assert!((ratio_one - ratio_two).abs() < 0.5);
    }

    #[test]
    fn long_text_wraps_onto_more_lines() {
        let options = RenderOptions::standard();
        let short = render("<p>word</p>", "", &options).unwrap();
        let long = render(&format!("<p>{}</p>", "word ".repeat(400)), "", &options).unwrap();
        assert!(long.height() > short.height() * 5);
    }

    #[test]
    fn custom_stylesheet_changes_block_height() {
        let options = RenderOptions::standard();
        let plain = render("<p>text</p>", "", &options).unwrap();
        let tight = render("<p>text</p>", "p { margin: 0 }", &options).unwrap();
        assert!(tight.height() < plain.height());
    }

    #[test]
    fn tables_lists_and_code_render() {
        let options = RenderOptions::standard();
        let table = render(
            "<table><thead><tr><th>A</th><th>B</th></tr></thead><tbody><tr><td>1</td><td>2</td></tr></tbody></table>",
            "",
            &options,
        )
        .unwrap();
        assert!(table.height() > 0);
        let list = render("<ol><li>one</li><li>two</li></ol>", "", &options).unwrap();
        let single = render("<ol><li>one</li></ol>", "", &options).unwrap();
        assert!(list.height() > single.height());
        let code = render("<pre>fn main() {\n    run();\n}</pre>", "", &options).unwrap();
        assert!(has_dark_pixel(&code));
    }

    #[test]
    fn external_images_fail_and_data_images_render() {
        let options = RenderOptions::standard();
        let err = render("<p><img src=\"https://example.com/a.png\"></p>", "", &options)
            .unwrap_err();
        assert!(err.to_string().contains("not accessible"));

        let mut png = Vec::new();
        image::RgbaImage::from_pixel(10, 5, image::Rgba([0, 0, 0, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let raster = render(&format!("<div><img src=\"{uri}\" width=\"100\"></div>"), "", &options)
            .unwrap();
        // 10x5 natural size at 100px wide, drawn at scale 2.
        assert_eq!(raster.height(), 100);
    }

    #[test]
    fn empty_markup_is_an_error() {
        let err = render("", "", &RenderOptions::standard()).unwrap_err();
        assert!(err.to_string().contains("empty raster"));
    }

    #[test]
    fn letter_rendering_keeps_geometry() {
        let words = render("<p>abc def</p>", "", &RenderOptions::standard()).unwrap();
        let letters = render(
            "<p>abc def</p>",
            "",
            &RenderOptions {
                letter_rendering: true,
                ..RenderOptions::standard()
            },
        )
        .unwrap();
        assert_eq!(words.height(), letters.height());
        assert_ne!(words.image(), letters.image());
    }

    #[test]
    fn wrapping_splits_oversized_words() {
        let lines = wrap_words(&["abcdefgh", "ij"], 3);
        assert_eq!(lines, vec!["abc", "def", "gh", "ij"]);
        let lines = wrap_words(&["a", "b", "c"], 3);
        assert_eq!(lines, vec!["a b", "c"]);
    }

    #[test]
    fn long_code_block_renders_under_the_height_cap() {
        let options = RenderOptions::standard();
        let code = format!("<pre>{}</pre>", "let total = count + 1;\n".repeat(4000));
        let raster = render(&code, "", &options).unwrap();
        assert!(raster.height() <= 60_000);
        assert!(raster.width() < 1286);
        assert!(has_dark_pixel(&raster));
    }

    #[test]
    fn capped_surfaces_keep_their_physical_height() {
        let options = RenderOptions::standard();
        let code = format!("<pre>{}</pre>", "let total = count + 1;\n".repeat(200));
        let full = render(&code, "", &options).unwrap();
        let capped = render_with(
            &NativeRasterizer::new().with_max_device_height(2_000),
            &code,
            "",
            &options,
        )
        .unwrap();
        assert!(full.height() > 2_000);
        assert!(capped.height() <= 2_000);
        let full_mm = full.height_at_width_mm(170.0);
        let capped_mm = capped.height_at_width_mm(170.0);
        assert!((full_mm - capped_mm).abs() / full_mm < 0.01);
    }
}
