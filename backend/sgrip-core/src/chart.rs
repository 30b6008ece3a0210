// src/chart.rs
use image::{DynamicImage, ImageFormat, RgbImage};
use once_cell::sync::Lazy;
use resvg::{tiny_skia, usvg};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub const PALETTE: [&str; 15] = [
    "#1e40af", "#059669", "#dc2626", "#d97706", "#0891b2", "#16a34a", "#7c3aed", "#e11d48",
    "#0d9488", "#4f46e5", "#9333ea", "#db2777", "#65a30d", "#ca8a04", "#0284c7",
];

const FONT_FAMILY: &str = "DejaVu Sans, Liberation Sans, Arial, Helvetica, sans-serif";

const BAR_WIDTH: f64 = 1200.0;
const BAR_HEIGHT: f64 = 700.0;
const BAR_MARGIN_TOP: f64 = 90.0;
const BAR_MARGIN_RIGHT: f64 = 60.0;
const BAR_MARGIN_BOTTOM: f64 = 90.0;
const BAR_MARGIN_LEFT: f64 = 90.0;
const BAR_TICKS: usize = 6;

const PIE_WIDTH: f64 = 900.0;
const PIE_HEIGHT: f64 = 600.0;
/// Slices narrower than this get no percentage label.
const PIE_LABEL_MIN_DEGREES: f64 = 15.0;

static FONT_DB: Lazy<Arc<usvg::fontdb::Database>> = Lazy::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    debug!("Loaded {} font faces for chart rendering", db.len());
    Arc::new(db)
});

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Invalid chart SVG: {0}")]
    Svg(#[from] usvg::Error),
    #[error("Chart size {width}x{height} at scale {scale} cannot be rasterized")]
    InvalidSize { width: f32, height: f32, scale: f32 },
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// One labelled value of a chart.
pub type Series = Vec<(String, f64)>;

pub fn series<K: ToString>(map: &BTreeMap<K, Decimal>) -> Series {
    map.iter()
        .map(|(k, v)| (k.to_string(), v.to_f64().unwrap_or(0.0)))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ChartOptions<'a> {
    pub title: Option<&'a str>,
    pub x_axis_title: Option<&'a str>,
    pub y_axis_title: Option<&'a str>,
}

pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn svg_open(out: &mut String, width: f64, height: f64) {
    let _ = write!(
        out,
        r#"<svg width="{w}" height="{h}" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg" font-family="{FONT_FAMILY}">"#,
        w = width,
        h = height
    );
    out.push_str(r##"<rect width="100%" height="100%" fill="#ffffff" rx="8" ry="8"/>"##);
}

pub fn bar_chart_svg(data: &[(String, f64)], options: &ChartOptions<'_>) -> String {
    let inner_width = BAR_WIDTH - BAR_MARGIN_LEFT - BAR_MARGIN_RIGHT;
    let inner_height = BAR_HEIGHT - BAR_MARGIN_TOP - BAR_MARGIN_BOTTOM;
    let max_value = data.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let y_scale = if max_value > 0.0 {
        inner_height / max_value
    } else {
        1.0
    };
    let count = data.len().max(1) as f64;
    let baseline = BAR_MARGIN_TOP + inner_height;

    let mut out = String::new();
    svg_open(&mut out, BAR_WIDTH, BAR_HEIGHT);

    if let Some(title) = options.title {
        let _ = write!(
            out,
            r##"<text x="{}" y="{}" text-anchor="middle" font-size="24" font-weight="bold" fill="#1f2937">{}</text>"##,
            BAR_WIDTH / 2.0,
            BAR_MARGIN_TOP / 2.0,
            escape_xml(title)
        );
    }

    // Y axis, grid lines and ticks
    let _ = write!(
        out,
        r##"<line x1="{x}" y1="{top}" x2="{x}" y2="{baseline}" stroke="#6b7280" stroke-width="2"/>"##,
        x = BAR_MARGIN_LEFT,
        top = BAR_MARGIN_TOP,
    );
    for i in 0..=BAR_TICKS {
        let value = max_value * i as f64 / BAR_TICKS as f64;
        let y = baseline - value * y_scale;
        let _ = write!(
            out,
            r##"<line x1="{l}" y1="{y:.2}" x2="{r}" y2="{y:.2}" stroke="#e5e7eb" stroke-width="1"/><line x1="{m}" y1="{y:.2}" x2="{l}" y2="{y:.2}" stroke="#6b7280" stroke-width="2"/><text x="{t}" y="{ty:.2}" text-anchor="end" font-size="16" fill="#6b7280">{value:.1}</text>"##,
            l = BAR_MARGIN_LEFT,
            r = BAR_MARGIN_LEFT + inner_width,
            m = BAR_MARGIN_LEFT - 10.0,
            t = BAR_MARGIN_LEFT - 20.0,
            ty = y + 6.0,
        );
    }
    if let Some(y_title) = options.y_axis_title {
        let (x, y) = (BAR_MARGIN_LEFT - 60.0, BAR_MARGIN_TOP + inner_height / 2.0);
        let _ = write!(
            out,
            r##"<text x="{x}" y="{y}" text-anchor="middle" transform="rotate(-90, {x}, {y})" font-size="18" font-weight="bold" fill="#374151">{}</text>"##,
            escape_xml(y_title)
        );
    }

    // X axis
    let _ = write!(
        out,
        r##"<line x1="{l}" y1="{baseline}" x2="{r}" y2="{baseline}" stroke="#6b7280" stroke-width="2"/>"##,
        l = BAR_MARGIN_LEFT,
        r = BAR_MARGIN_LEFT + inner_width,
    );
    for (i, (label, _)) in data.iter().enumerate() {
        let x = BAR_MARGIN_LEFT + i as f64 * inner_width / count + inner_width / (2.0 * count);
        let _ = write!(
            out,
            r##"<text x="{x:.2}" y="{y}" text-anchor="middle" font-size="16" font-weight="600" fill="#374151">{}</text>"##,
            escape_xml(label),
            y = baseline + 30.0,
        );
    }
    if let Some(x_title) = options.x_axis_title {
        let _ = write!(
            out,
            r##"<text x="{}" y="{}" text-anchor="middle" font-size="18" font-weight="bold" fill="#374151">{}</text>"##,
            BAR_MARGIN_LEFT + inner_width / 2.0,
            BAR_HEIGHT - 25.0,
            escape_xml(x_title)
        );
    }

    // Bars
    for (i, (_, value)) in data.iter().enumerate() {
        let bar_height = value.max(0.0) * y_scale;
        let x = BAR_MARGIN_LEFT + i as f64 * inner_width / count;
        let y = baseline - bar_height;
        let bar_width = (inner_width / count - 15.0).max(1.0);
        let _ = write!(
            out,
            r##"<rect x="{sx:.2}" y="{sy:.2}" width="{bar_width:.2}" height="{bar_height:.2}" fill="rgba(0,0,0,0.2)" rx="4" ry="4"/><rect x="{bx:.2}" y="{y:.2}" width="{bar_width:.2}" height="{bar_height:.2}" fill="{color}" rx="4" ry="4" stroke="#ffffff" stroke-width="3"/><text x="{tx:.2}" y="{ty:.2}" text-anchor="middle" font-size="18" font-weight="bold" fill="#1f2937">{value:.1}h</text>"##,
            sx = x + 8.0,
            sy = y + 5.0,
            bx = x + 5.0,
            color = PALETTE[i % PALETTE.len()],
            tx = x + bar_width / 2.0 + 5.0,
            ty = y - 12.0,
        );
    }

    let _ = write!(
        out,
        r##"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="#d1d5db" stroke-width="1" rx="4" ry="4"/></svg>"##,
        BAR_MARGIN_LEFT, BAR_MARGIN_TOP, inner_width, inner_height
    );
    out
}

pub fn pie_chart_svg(data: &[(String, f64)], title: Option<&str>) -> String {
    let valid: Vec<&(String, f64)> = data
        .iter()
        .filter(|(_, v)| v.is_finite() && *v > 0.0)
        .collect();

    let mut out = String::new();
    svg_open(&mut out, PIE_WIDTH, PIE_HEIGHT);

    if valid.is_empty() {
        out.push_str(r##"<text x="50%" y="50%" text-anchor="middle" fill="#6b7280" font-size="20" font-weight="600">No data available</text></svg>"##);
        return out;
    }

    if let Some(title) = title {
        let _ = write!(
            out,
            r##"<text x="{}" y="40" text-anchor="middle" font-size="24" font-weight="bold" fill="#1f2937">{}</text>"##,
            PIE_WIDTH / 2.0,
            escape_xml(title)
        );
    }

    let radius = PIE_WIDTH.min(PIE_HEIGHT) / 2.0 - 80.0;
    let (cx, cy) = (PIE_WIDTH / 2.0, PIE_HEIGHT / 2.0);
    let total: f64 = valid.iter().map(|(_, v)| *v).sum();

    let mut cumulative = 0.0_f64;
    for (i, (_, value)) in valid.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let angle = value / total * 360.0;
        let start = cumulative;
        cumulative += angle;

        if valid.len() == 1 {
            // A full circle cannot be drawn as a single arc.
            let _ = write!(
                out,
                r##"<circle cx="{cx}" cy="{cy}" r="{radius}" fill="{color}" stroke="#ffffff" stroke-width="4"/>"##
            );
        } else {
            let start_rad = (start - 90.0).to_radians();
            let end_rad = (start + angle - 90.0).to_radians();
            let (x1, y1) = (cx + radius * start_rad.cos(), cy + radius * start_rad.sin());
            let (x2, y2) = (cx + radius * end_rad.cos(), cy + radius * end_rad.sin());
            let large_arc = if angle > 180.0 { 1 } else { 0 };
            let _ = write!(
                out,
                r##"<path d="M {cx} {cy} L {x1:.2} {y1:.2} A {radius} {radius} 0 {large_arc} 1 {x2:.2} {y2:.2} Z" fill="rgba(0,0,0,0.1)" transform="translate(5,5)"/><path d="M {cx} {cy} L {x1:.2} {y1:.2} A {radius} {radius} 0 {large_arc} 1 {x2:.2} {y2:.2} Z" fill="{color}" stroke="#ffffff" stroke-width="4"/>"##
            );
        }

        if angle > PIE_LABEL_MIN_DEGREES {
            let mid = (start + angle / 2.0 - 90.0).to_radians();
            let label_radius = if valid.len() == 1 { 0.0 } else { radius * 0.6 };
            let _ = write!(
                out,
                r##"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-size="16" font-weight="bold" fill="#ffffff">{:.0}%</text>"##,
                cx + label_radius * mid.cos(),
                cy + label_radius * mid.sin(),
                value / total * 100.0
            );
        }
    }

    let legend_x = cx + radius + 40.0;
    let legend_y = cy - (valid.len() as f64 * 35.0) / 2.0;
    for (i, (label, value)) in valid.iter().enumerate() {
        let y = legend_y + i as f64 * 35.0;
        let _ = write!(
            out,
            r##"<rect x="{legend_x}" y="{ry:.2}" width="20" height="20" fill="{color}" rx="3" stroke="#ffffff" stroke-width="2"/><text x="{tx}" y="{ly:.2}" font-size="16" font-weight="600" fill="#374151">{label}</text><text x="{tx}" y="{dy:.2}" font-size="14" fill="#6b7280">{value:.1}h ({pct:.1}%)</text>"##,
            ry = y - 10.0,
            color = PALETTE[i % PALETTE.len()],
            tx = legend_x + 30.0,
            ly = y + 5.0,
            dy = y + 20.0,
            label = escape_xml(label),
            pct = value / total * 100.0,
        );
    }

    out.push_str("</svg>");
    out
}

/// A chart rendered to PNG bytes.
#[derive(Debug, Clone)]
pub struct RasterChart {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Renders an SVG document onto a white background and encodes it as 8-bit RGB PNG.
pub fn rasterize_png(svg: &str, scale: f32) -> Result<RasterChart, ChartError> {
    let options = usvg::Options {
        fontdb: FONT_DB.clone(),
        ..usvg::Options::default()
    };
    let tree = usvg::Tree::from_str(svg, &options)?;
    let size = tree.size();
    let invalid = || ChartError::InvalidSize {
        width: size.width(),
        height: size.height(),
        scale,
    };
    let target = size.to_int_size().scale_by(scale).ok_or_else(invalid)?;
    let mut pixmap =
        tiny_skia::Pixmap::new(target.width(), target.height()).ok_or_else(invalid)?;
    pixmap.fill(tiny_skia::Color::WHITE);
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    // Opaque background, so premultiplied RGBA equals straight RGB.
    let rgb: Vec<u8> = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    let image = RgbImage::from_raw(target.width(), target.height(), rgb).ok_or_else(invalid)?;

    let mut png = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    debug!(
        "Rasterized chart {}x{} ({} bytes)",
        target.width(),
        target.height(),
        png.len()
    );
    Ok(RasterChart {
        png,
        width: target.width(),
        height: target.height(),
    })
}
