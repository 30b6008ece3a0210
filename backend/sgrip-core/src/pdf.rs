// src/pdf.rs
//
// A4 report pages on top of pdf-writer: the standard Helvetica faces, filled
// rectangles and raster images. Coordinates are millimetres from the top-left
// corner of the page.
use image::ImageFormat;
use miniz_oxide::deflate::compress_to_vec_zlib;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, Str};
use thiserror::Error;
use tracing::debug;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;

const PT_PER_MM: f32 = 72.0 / 25.4;
const DEFLATE_LEVEL: u8 = 6;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
    #[error("Image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    /// Parses `#rrggbb`; anything else is black.
    pub fn from_hex(hex: &str) -> Rgb {
        let digits = hex.trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Rgb::BLACK;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).unwrap_or(0);
        Rgb(channel(0), channel(2), channel(4))
    }

    fn components(&self) -> (f32, f32, f32) {
        (
            self.0 as f32 / 255.0,
            self.1 as f32 / 255.0,
            self.2 as f32 / 255.0,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Italic];

    fn resource(&self) -> Name<'static> {
        match self {
            Font::Regular => Name(b"F1"),
            Font::Bold => Name(b"F2"),
            Font::Italic => Name(b"F3"),
        }
    }

    fn base_font(&self) -> Name<'static> {
        match self {
            Font::Regular => Name(b"Helvetica"),
            Font::Bold => Name(b"Helvetica-Bold"),
            Font::Italic => Name(b"Helvetica-Oblique"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy)]
pub struct TextStyle {
    pub size: f32,
    pub font: Font,
    pub color: Rgb,
    pub align: Align,
}

impl TextStyle {
    pub fn new(size: f32, font: Font) -> Self {
        Self {
            size,
            font,
            color: Rgb::BLACK,
            align: Align::Left,
        }
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }
}

/// Rough Helvetica advance widths in thousandths of an em.
fn glyph_width(c: char, font: Font) -> u32 {
    let base = match c {
        ' ' | '.' | ',' | ':' | ';' | '!' | '|' | 'i' | 'j' | 'l' | 'I' | '\'' => 278,
        'f' | 't' | 'r' | '(' | ')' | '/' | '-' => 333,
        'm' | 'M' | 'W' => 833,
        'w' | '%' => 889,
        '0'..='9' | '$' | '?' | '_' => 556,
        'A'..='Z' => 667,
        'a'..='z' => 556,
        _ => 584,
    };
    match font {
        Font::Bold => base + base / 12,
        _ => base,
    }
}

/// Approximate rendered width of `text` in millimetres.
pub fn text_width(text: &str, size: f32, font: Font) -> f32 {
    let units: u32 = text.chars().map(|c| glyph_width(c, font)).sum();
    units as f32 / 1000.0 * size / PT_PER_MM
}

/// Greedy word wrap to `max_width` millimetres.
pub fn wrap_text(text: &str, max_width: f32, size: f32, font: Font) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if text_width(&candidate, size, font) > max_width && !current.is_empty() {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// WinAnsiEncoding bytes for the standard fonts. Unmappable characters become '?'.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

/// Decoded 8-bit RGB pixels, alpha flattened onto white.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RasterImage {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

/// Accepts any PNG layout the `image` decoder reads (palette, grey, 16-bit,
/// interlaced, with or without alpha).
fn decode_png(png: &[u8]) -> Result<RasterImage, PdfError> {
    let rgba = image::load_from_memory_with_format(png, ImageFormat::Png)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(PdfError::EmptyImage { width, height });
    }
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        for channel in [r, g, b] {
            rgb.push(((channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8);
        }
    }
    Ok(RasterImage { width, height, rgb })
}

fn pt(mm: f32) -> f32 {
    mm * PT_PER_MM
}

fn image_name(index: usize) -> String {
    format!("Im{}", index)
}

struct Page {
    content: Content,
    images: Vec<usize>,
}

impl Page {
    fn new() -> Self {
        Self {
            content: Content::new(),
            images: Vec::new(),
        }
    }
}

pub struct PdfDocument {
    pages: Vec<Page>,
    images: Vec<RasterImage>,
}

impl Default for PdfDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfDocument {
    /// Starts a document with one empty page.
    pub fn new() -> Self {
        Self {
            pages: vec![Page::new()],
            images: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn add_page(&mut self) {
        self.pages.push(Page::new());
    }

    fn current(&mut self) -> &mut Page {
        if self.pages.is_empty() {
            self.pages.push(Page::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb) {
        let (r, g, b) = color.components();
        let content = &mut self.current().content;
        content.set_fill_rgb(r, g, b);
        content.rect(pt(x), pt(PAGE_HEIGHT_MM - y - h), pt(w), pt(h));
        content.fill_nonzero();
    }

    /// Draws one line of text; `y` is the baseline.
    pub fn text(&mut self, x: f32, y: f32, style: TextStyle, text: &str) {
        let width = text_width(text, style.size, style.font);
        let left = match style.align {
            Align::Left => x,
            Align::Center => x - width / 2.0,
            Align::Right => x - width,
        };
        let (r, g, b) = style.color.components();
        let encoded = win_ansi(text);
        let content = &mut self.current().content;
        content.begin_text();
        content.set_font(style.font.resource(), style.size);
        content.set_fill_rgb(r, g, b);
        content.next_line(pt(left), pt(PAGE_HEIGHT_MM - y));
        content.show(Str(&encoded));
        content.end_text();
    }

    /// Places a PNG in the box at (x, y) sized w × h.
    pub fn image(&mut self, png: &[u8], x: f32, y: f32, w: f32, h: f32) -> Result<(), PdfError> {
        let image = decode_png(png)?;
        let index = self.images.len();
        self.images.push(image);
        let name = image_name(index);
        let page = self.current();
        page.images.push(index);
        page.content.save_state();
        page.content.transform([
            pt(w),
            0.0,
            0.0,
            pt(h),
            pt(x),
            pt(PAGE_HEIGHT_MM - y - h),
        ]);
        page.content.x_object(Name(name.as_bytes()));
        page.content.restore_state();
        Ok(())
    }

    /// Serializes the document.
    pub fn finish(self) -> Vec<u8> {
        let mut next_id = 1;
        let mut alloc = || {
            let id = Ref::new(next_id);
            next_id += 1;
            id
        };
        let catalog_id = alloc();
        let tree_id = alloc();
        let font_ids: Vec<Ref> = Font::ALL.iter().map(|_| alloc()).collect();
        let image_ids: Vec<Ref> = self.images.iter().map(|_| alloc()).collect();
        let page_ids: Vec<(Ref, Ref)> = self.pages.iter().map(|_| (alloc(), alloc())).collect();

        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(tree_id);
        pdf.pages(tree_id)
            .kids(page_ids.iter().map(|(page_id, _)| *page_id))
            .count(page_ids.len() as i32);

        for (font, id) in Font::ALL.iter().zip(&font_ids) {
            pdf.type1_font(*id)
                .base_font(font.base_font())
                .encoding_predefined(Name(b"WinAnsiEncoding"));
        }

        for (image, id) in self.images.iter().zip(&image_ids) {
            let compressed = compress_to_vec_zlib(&image.rgb, DEFLATE_LEVEL);
            let mut xobject = pdf.image_xobject(*id, &compressed);
            xobject.filter(Filter::FlateDecode);
            xobject.width(image.width as i32);
            xobject.height(image.height as i32);
            xobject.color_space().device_rgb();
            xobject.bits_per_component(8);
            xobject.finish();
        }

        let page_count = self.pages.len();
        for (page, (page_id, content_id)) in self.pages.into_iter().zip(&page_ids) {
            let names: Vec<String> = page.images.iter().map(|i| image_name(*i)).collect();
            let mut writer = pdf.page(*page_id);
            writer.media_box(Rect::new(0.0, 0.0, pt(PAGE_WIDTH_MM), pt(PAGE_HEIGHT_MM)));
            writer.parent(tree_id);
            writer.contents(*content_id);
            let mut resources = writer.resources();
            let mut fonts = resources.fonts();
            for (font, id) in Font::ALL.iter().zip(&font_ids) {
                fonts.pair(font.resource(), *id);
            }
            fonts.finish();
            let mut xobjects = resources.x_objects();
            for (name, index) in names.iter().zip(&page.images) {
                xobjects.pair(Name(name.as_bytes()), image_ids[*index]);
            }
            xobjects.finish();
            resources.finish();
            writer.finish();

            let ops = compress_to_vec_zlib(&page.content.finish(), DEFLATE_LEVEL);
            pdf.stream(*content_id, &ops).filter(Filter::FlateDecode);
        }

        let bytes = pdf.finish();
        debug!(
            "PDF written: {} pages, {} images, {} bytes",
            page_count,
            self.images.len(),
            bytes.len()
        );
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, LumaA, RgbImage, RgbaImage};
    use miniz_oxide::inflate::decompress_to_vec_zlib;
    use std::io::Cursor;

    fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Two-pixel indexed PNG: red then blue.
    fn palette_png() -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buf, 2, 1);
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_palette(vec![255, 0, 0, 0, 0, 255]);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0, 1]).unwrap();
        }
        buf
    }

    fn as_text(pdf: &[u8]) -> String {
        pdf.iter()
            .map(|&b| if b.is_ascii() { b as char } else { '.' })
            .collect()
    }

    /// Inflated content streams, in file order.
    fn content_streams(pdf: &[u8]) -> Vec<String> {
        let mut streams = Vec::new();
        let mut rest = pdf;
        while let Some(start) = find(rest, b"stream\n") {
            let body = &rest[start + b"stream\n".len()..];
            let Some(end) = find(body, b"\nendstream") else {
                break;
            };
            if let Ok(raw) = decompress_to_vec_zlib(&body[..end]) {
                streams.push(as_text(&raw));
            }
            rest = &body[end + b"\nendstream".len()..];
        }
        streams
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn empty_document_has_one_page_and_the_standard_fonts() {
        let pdf = PdfDocument::new().finish();
        let text = as_text(&pdf);
        assert!(text.starts_with("%PDF-1."));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("/Count 1"));
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert!(text.contains("/WinAnsiEncoding"));
    }

    #[test]
    fn pages_carry_their_own_drawing_operations() {
        let mut doc = PdfDocument::new();
        doc.text(10.0, 20.0, TextStyle::new(12.0, Font::Bold), "Weekly report");
        doc.add_page();
        doc.fill_rect(0.0, 0.0, PAGE_WIDTH_MM, 35.0, Rgb::from_hex("#1e40af"));
        assert_eq!(doc.page_count(), 2);
        let pdf = doc.finish();
        assert!(as_text(&pdf).contains("/Count 2"));

        let streams = content_streams(&pdf);
        assert_eq!(streams.len(), 2);
        assert!(streams[0].contains("/F2"));
        assert!(streams[0].contains("Tj\n"));
        assert!(!streams[0].contains(" re\n"));
        assert!(streams[1].contains(" re\n"));
        assert!(!streams[1].contains("Tj\n"));
    }

    #[test]
    fn text_uses_win_ansi_bytes() {
        assert_eq!(win_ansi("Hé•"), vec![0x48, 0xE9, 0x95]);
        assert_eq!(win_ansi("日"), vec![b'?']);
    }

    #[test]
    fn png_images_are_embedded_as_rgb_xobjects() {
        let png = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            4,
            3,
            image::Rgb([30, 64, 175]),
        )));
        let mut doc = PdfDocument::new();
        doc.image(&png, 15.0, 50.0, 180.0, 110.0).unwrap();
        let pdf = doc.finish();
        let text = as_text(&pdf);
        assert_eq!(text.matches("/Subtype /Image").count(), 1);
        assert!(text.contains("/Width 4"));
        assert!(text.contains("/Height 3"));
        assert!(text.contains("/DeviceRGB"));
        assert!(text.contains("/Im0"));
        assert!(content_streams(&pdf).iter().any(|s| s.contains("/Im0 Do")));
    }

    #[test]
    fn palette_grey_and_alpha_pngs_are_normalised_to_rgb() {
        let palette = decode_png(&palette_png()).unwrap();
        assert_eq!((palette.width, palette.height), (2, 1));
        assert_eq!(palette.rgb, vec![255, 0, 0, 0, 0, 255]);

        let grey: ImageBuffer<LumaA<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(1, 1, LumaA([100, 255]));
        let grey = decode_png(&png_bytes(DynamicImage::ImageLumaA8(grey))).unwrap();
        assert_eq!(grey.rgb, vec![100, 100, 100]);

        // Fully transparent pixels become white, not black.
        let clear = decode_png(&png_bytes(DynamicImage::ImageRgba8(RgbaImage::new(2, 2)))).unwrap();
        assert!(clear.rgb.iter().all(|&c| c == 255));
    }

    #[test]
    fn broken_png_is_rejected() {
        let mut doc = PdfDocument::new();
        assert!(matches!(
            doc.image(b"GIF89a", 0.0, 0.0, 10.0, 10.0),
            Err(PdfError::Image(_))
        ));
        assert!(doc.images.is_empty());
    }

    #[test]
    fn wrap_text_breaks_on_words() {
        let lines = wrap_text("Project: 12.0h (40.0%) • Training: 4.0h (13.3%)", 40.0, 10.0, Font::Regular);
        assert!(lines.len() >= 2);
        assert!(lines
            .iter()
            .all(|l| text_width(l, 10.0, Font::Regular) <= 40.0 || !l.contains(' ')));
        assert_eq!(wrap_text("", 40.0, 10.0, Font::Regular), Vec::<String>::new());
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(Rgb::from_hex("#059669"), Rgb(5, 150, 105));
        assert_eq!(Rgb::from_hex("nope"), Rgb::BLACK);
    }
}
