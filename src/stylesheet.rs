use crate::types::Color;
use lightningcss::rules::CssRule;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::traits::ToCss;
use log::{debug, warn};
use std::collections::HashMap;

const ROOT_FONT_SIZE: f32 = 14.0;
const ROOT_LINE_HEIGHT: f32 = 1.6;

/// Resolved box and text style of one element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockStyle {
    pub font_size: f32,
    /// Multiplier of `font_size`.
    pub line_height: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    /// top, right, bottom, left
    pub padding: [f32; 4],
    pub color: Color,
    pub background: Option<Color>,
    pub border_left: Option<(f32, Color)>,
    pub bold: bool,
    pub monospace: bool,
}

impl BlockStyle {
    pub fn root() -> Self {
        Self {
            font_size: ROOT_FONT_SIZE,
            line_height: ROOT_LINE_HEIGHT,
            margin_top: 0.0,
            margin_bottom: 0.0,
            padding: [0.0; 4],
            color: Color::from_rgb8(0x33, 0x33, 0x33),
            background: None,
            border_left: None,
            bold: false,
            monospace: false,
        }
    }

    pub fn line_px(&self) -> f32 {
        self.font_size * self.line_height
    }

    fn inherit(parent: &BlockStyle) -> Self {
        Self {
            font_size: parent.font_size,
            line_height: parent.line_height,
            margin_top: 0.0,
            margin_bottom: 0.0,
            padding: [0.0; 4],
            color: parent.color,
            background: None,
            border_left: None,
            bold: parent.bold,
            monospace: parent.monospace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Length {
    Px(f32),
    Em(f32),
}

impl Length {
    fn parse(raw: &str) -> Option<Length> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw == "0" {
            return Some(Length::Px(0.0));
        }
        let split = raw
            .find(|ch: char| !(ch.is_ascii_digit() || ch == '.' || ch == '-'))
            .unwrap_or(raw.len());
        let (number, unit) = raw.split_at(split);
        let value: f32 = number.parse().ok()?;
        match unit {
            "px" => Some(Length::Px(value)),
            "pt" => Some(Length::Px(value * 96.0 / 72.0)),
            "mm" => Some(Length::Px(value * crate::types::CSS_PX_PER_MM)),
            "em" | "rem" => Some(Length::Em(value)),
            "" => Some(Length::Px(value)),
            _ => None,
        }
    }

    fn resolve(self, font_size: f32) -> f32 {
        match self {
            Length::Px(v) => v,
            Length::Em(v) => v * font_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LineHeight {
    Factor(f32),
    Absolute(Length),
}

/// Declarations collected for one selector. Later declarations win.
#[derive(Debug, Clone, Default, PartialEq)]
struct StyleDelta {
    font_size: Option<Length>,
    line_height: Option<LineHeight>,
    margin_top: Option<Length>,
    margin_bottom: Option<Length>,
    padding: [Option<Length>; 4],
    color: Option<Color>,
    background: Option<Option<Color>>,
    border_left: Option<Option<(Length, Color)>>,
    bold: Option<bool>,
    monospace: Option<bool>,
}

impl StyleDelta {
    fn apply_declaration(&mut self, name: &str, value: &str) -> bool {
        match name {
            "font-size" => self.font_size = Length::parse(value),
            "line-height" => {
                let value = value.trim();
                self.line_height = if value.eq_ignore_ascii_case("normal") {
                    Some(LineHeight::Factor(1.2))
                } else if let Ok(factor) = value.parse::<f32>() {
                    Some(LineHeight::Factor(factor))
                } else {
                    Length::parse(value).map(LineHeight::Absolute)
                };
            }
            "margin" => {
                let sides = box_sides(value);
                self.margin_top = sides[0];
                self.margin_bottom = sides[2];
            }
            "margin-top" | "margin-block-start" => self.margin_top = Length::parse(value),
            "margin-bottom" | "margin-block-end" => self.margin_bottom = Length::parse(value),
            "padding" => self.padding = box_sides(value),
            "padding-top" => self.padding[0] = Length::parse(value),
            "padding-right" => self.padding[1] = Length::parse(value),
            "padding-bottom" => self.padding[2] = Length::parse(value),
            "padding-left" => self.padding[3] = Length::parse(value),
            "color" => self.color = parse_color(value),
            "background-color" | "background" => {
                self.background = Some(value.split_whitespace().find_map(parse_color));
            }
            "border-left" => {
                let width = value.split_whitespace().find_map(Length::parse);
                let color = value
                    .split_whitespace()
                    .find_map(parse_color)
                    .unwrap_or(Color::BLACK);
                self.border_left = Some(width.map(|w| (w, color)));
            }
            "font-weight" => {
                let value = value.trim().to_ascii_lowercase();
                self.bold = Some(
                    value == "bold"
                        || value == "bolder"
                        || value.parse::<u32>().map(|w| w >= 600).unwrap_or(false),
                );
            }
            "font-family" => {
                let value = value.to_ascii_lowercase();
                self.monospace = Some(value.contains("mono") || value.contains("courier"));
            }
            _ => return false,
        }
        true
    }

    fn merge(&mut self, other: &StyleDelta) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(font_size);
        take!(line_height);
        take!(margin_top);
        take!(margin_bottom);
        take!(color);
        take!(background);
        take!(border_left);
        take!(bold);
        take!(monospace);
        for (side, value) in other.padding.iter().enumerate() {
            if value.is_some() {
                self.padding[side] = *value;
            }
        }
    }

    fn apply_to(&self, style: &mut BlockStyle, parent_font_size: f32) {
        if let Some(size) = self.font_size {
            style.font_size = size.resolve(parent_font_size).max(1.0);
        }
        let font_size = style.font_size;
        match self.line_height {
            Some(LineHeight::Factor(factor)) => style.line_height = factor.max(0.5),
            Some(LineHeight::Absolute(length)) => {
                style.line_height = (length.resolve(font_size) / font_size).max(0.5)
            }
            None => {}
        }
        if let Some(margin) = self.margin_top {
            style.margin_top = margin.resolve(font_size).max(0.0);
        }
        if let Some(margin) = self.margin_bottom {
            style.margin_bottom = margin.resolve(font_size).max(0.0);
        }
        for (side, value) in self.padding.iter().enumerate() {
            if let Some(value) = value {
                style.padding[side] = value.resolve(font_size).max(0.0);
            }
        }
        if let Some(color) = self.color {
            style.color = color;
        }
        if let Some(background) = self.background {
            style.background = background;
        }
        if let Some(border) = self.border_left {
            style.border_left = border.map(|(w, c)| (w.resolve(font_size).max(0.0), c));
        }
        if let Some(bold) = self.bold {
            style.bold = bold;
        }
        if let Some(monospace) = self.monospace {
            style.monospace = monospace;
        }
    }
}

/// Tag-selector rules from a custom stylesheet layered over built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: HashMap<String, StyleDelta>,
    source: String,
}

impl Stylesheet {
    pub fn parse(css: &str) -> Self {
        let mut rules: HashMap<String, StyleDelta> = HashMap::new();
        if css.trim().is_empty() {
            return Self::default();
        }
        let sheet = match StyleSheet::parse(css, ParserOptions::default()) {
            Ok(sheet) => sheet,
            Err(err) => {
                warn!("custom stylesheet ignored: {err}");
                return Self {
                    rules,
                    source: css.to_string(),
                };
            }
        };
        for rule in sheet.rules.0.iter() {
            let CssRule::Style(style) = rule else {
                continue;
            };
            let selectors = style
                .selectors
                .to_css_string(PrinterOptions::default())
                .unwrap_or_default();
            let mut delta = StyleDelta::default();
            let declarations = style
                .declarations
                .declarations
                .iter()
                .chain(style.declarations.important_declarations.iter());
            for property in declarations {
                let id = property.property_id();
                let name = id.name().to_ascii_lowercase();
                let Ok(value) = property.value_to_css_string(PrinterOptions::default()) else {
                    continue;
                };
                if !delta.apply_declaration(&name, &value) {
                    debug!("css property '{name}' has no effect on rasterization");
                }
            }
            for selector in selectors.split(',') {
                let selector = selector.trim().to_ascii_lowercase();
                let key = match selector.as_str() {
                    "*" | "html" | "body" | ":root" => "body".to_string(),
                    tag if tag.chars().all(|ch| ch.is_ascii_alphanumeric()) => tag.to_string(),
                    _ => {
                        debug!("css selector '{selector}' is not a plain tag selector; ignored");
                        continue;
                    }
                };
                rules.entry(key).or_default().merge(&delta);
            }
        }
        Self {
            rules,
            source: css.to_string(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn root_style(&self) -> BlockStyle {
        let mut style = BlockStyle::root();
        if let Some(delta) = self.rules.get("body") {
            delta.apply_to(&mut style, ROOT_FONT_SIZE);
        }
        style
    }

    /// Computes the style of `tag` nested in an element styled `parent`.
    pub fn style_for(&self, tag: &str, parent: &BlockStyle) -> BlockStyle {
        let mut style = BlockStyle::inherit(parent);
        default_delta(tag).apply_to(&mut style, parent.font_size);
        if let Some(delta) = self.rules.get(tag) {
            delta.apply_to(&mut style, parent.font_size);
        }
        style
    }
}

fn default_delta(tag: &str) -> StyleDelta {
    let mut delta = StyleDelta::default();
    let heading = |size: f32, margin: f32| StyleDelta {
        font_size: Some(Length::Em(size)),
        margin_top: Some(Length::Em(margin)),
        margin_bottom: Some(Length::Em(margin)),
        bold: Some(true),
        ..StyleDelta::default()
    };
    match tag {
        "h1" => return heading(2.0, 0.67),
        "h2" => return heading(1.5, 0.83),
        "h3" => return heading(1.17, 1.0),
        "h4" => return heading(1.0, 1.33),
        "h5" => return heading(0.83, 1.67),
        "h6" => return heading(0.67, 2.33),
        "p" => {
            delta.margin_top = Some(Length::Em(1.0));
            delta.margin_bottom = Some(Length::Em(1.0));
        }
        "blockquote" => {
            delta.margin_top = Some(Length::Em(1.0));
            delta.margin_bottom = Some(Length::Em(1.0));
            delta.padding = [None, None, None, Some(Length::Px(12.0))];
            delta.border_left = Some(Some((Length::Px(4.0), Color::from_rgb8(0xdd, 0xdd, 0xdd))));
            delta.color = Some(Color::from_rgb8(0x66, 0x66, 0x66));
        }
        "pre" => {
            delta.font_size = Some(Length::Px(13.0));
            delta.line_height = Some(LineHeight::Factor(1.45));
            delta.margin_top = Some(Length::Em(1.0));
            delta.margin_bottom = Some(Length::Em(1.0));
            delta.padding = [Some(Length::Px(12.0)); 4];
            delta.background = Some(Some(Color::from_rgb8(0xf6, 0xf8, 0xfa)));
            delta.monospace = Some(true);
        }
        "ul" | "ol" => {
            delta.margin_top = Some(Length::Em(1.0));
            delta.margin_bottom = Some(Length::Em(1.0));
            delta.padding = [None, None, None, Some(Length::Px(40.0))];
        }
        "table" => {
            delta.margin_top = Some(Length::Em(1.0));
            delta.margin_bottom = Some(Length::Em(1.0));
        }
        "th" | "td" => {
            delta.padding = [Some(Length::Px(6.0)); 4];
            delta.bold = Some(tag == "th");
            if tag == "th" {
                delta.background = Some(Some(Color::from_rgb8(0xf3, 0xf4, 0xf6)));
            }
        }
        "hr" => {
            delta.margin_top = Some(Length::Px(8.0));
            delta.margin_bottom = Some(Length::Px(8.0));
            delta.background = Some(Some(Color::from_rgb8(0xcc, 0xcc, 0xcc)));
        }
        "strong" | "b" => delta.bold = Some(true),
        "code" => delta.monospace = Some(true),
        _ => {}
    }
    delta
}

fn box_sides(raw: &str) -> [Option<Length>; 4] {
    let values: Vec<Option<Length>> = raw.split_whitespace().map(Length::parse).collect();
    match values.as_slice() {
        [all] => [*all; 4],
        [v, h] => [*v, *h, *v, *h],
        [t, h, b] => [*t, *h, *b, *h],
        [t, r, b, l, ..] => [*t, *r, *b, *l],
        [] => [None; 4],
    }
}

fn parse_color(raw: &str) -> Option<Color> {
    let raw = raw.trim().trim_end_matches(',');
    if let Some(color) = Color::parse_hex(raw) {
        return Some(color);
    }
    let lower = raw.to_ascii_lowercase();
    match lower.as_str() {
        "black" => return Some(Color::BLACK),
        "white" => return Some(Color::WHITE),
        "red" => return Some(Color::from_rgb8(255, 0, 0)),
        "green" => return Some(Color::from_rgb8(0, 128, 0)),
        "blue" => return Some(Color::from_rgb8(0, 0, 255)),
        "gray" | "grey" => return Some(Color::from_rgb8(128, 128, 128)),
        "silver" => return Some(Color::from_rgb8(192, 192, 192)),
        "navy" => return Some(Color::from_rgb8(0, 0, 128)),
        "maroon" => return Some(Color::from_rgb8(128, 0, 0)),
        "purple" => return Some(Color::from_rgb8(128, 0, 128)),
        "teal" => return Some(Color::from_rgb8(0, 128, 128)),
        "olive" => return Some(Color::from_rgb8(128, 128, 0)),
        "orange" => return Some(Color::from_rgb8(255, 165, 0)),
        _ => {}
    }
    if lower.starts_with("rgb(") || lower.starts_with("rgba(") {
        let inner = lower
            .trim_start_matches("rgba(")
            .trim_start_matches("rgb(")
            .trim_end_matches(')');
        let parts: Vec<f32> = inner
            .split(|ch: char| ch == ',' || ch == '/' || ch.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<f32>().ok())
            .collect::<Option<Vec<f32>>>()?;
        if parts.len() < 3 {
            return None;
        }
        return Some(Color::rgb(parts[0] / 255.0, parts[1] / 255.0, parts[2] / 255.0));
    }
    None
}
