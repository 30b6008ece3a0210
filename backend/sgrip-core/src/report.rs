// src/report.rs
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregation::{Performance, ProjectLoad, ReportRow, TeamMetrics, Totals, WeekReportData};
use crate::chart::{self, ChartError, ChartOptions};
use crate::imputation::{weekday_name, Category};
use crate::pdf::{
    wrap_text, Align, Font, PdfDocument, PdfError, Rgb, TextStyle, PAGE_HEIGHT_MM, PAGE_WIDTH_MM,
};

const PRIMARY: &str = "#1e40af";
const SECONDARY: &str = "#059669";
const DANGER: &str = "#dc2626";
const WARNING: &str = "#d97706";
const INFO: &str = "#0891b2";
const SUCCESS: &str = "#16a34a";
const PURPLE: &str = "#7c3aed";
const INDIGO: &str = "#4f46e5";
const GRAY_50: Rgb = Rgb(249, 250, 251);
const GRAY_100: Rgb = Rgb(243, 244, 246);
const GRAY_600: Rgb = Rgb(75, 85, 99);
const TEXT_DARK: Rgb = Rgb(31, 41, 55);

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error while writing report: {0}")]
    Io(#[from] std::io::Error),
    #[error("Chart rendering failed: {0}")]
    Chart(#[from] ChartError),
    #[error("PDF generation failed: {0}")]
    Pdf(#[from] PdfError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
    Pdf,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ReportFormat::Json => "application/json",
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Pdf => "application/pdf",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            "pdf" => Ok(ReportFormat::Pdf),
            other => Err(format!("Unknown report format '{}'", other)),
        }
    }
}

/// Layout of the manager PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    #[default]
    Detailed,
    Summary,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Detailed => "detailed",
            ReportKind::Summary => "summary",
        }
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "detailed" => Ok(ReportKind::Detailed),
            "summary" => Ok(ReportKind::Summary),
            other => Err(format!("Unknown report kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    /// Chart rasterization scale; 1.0 keeps the SVG pixel size.
    pub chart_scale: f32,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub file_name: String,
    pub format: ReportFormat,
    pub bytes: Vec<u8>,
}

/// Data behind the manager reporting screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub project: Option<String>,
    pub rows: Vec<ReportRow>,
    pub totals: Totals,
    pub project_loads: BTreeMap<String, ProjectLoad>,
    pub metrics: TeamMetrics,
}

fn slug(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn weekly_report_file_name(employee: &str, monday: NaiveDate, format: ReportFormat) -> String {
    format!(
        "weekly_report_{}_{}.{}",
        slug(employee),
        monday,
        format.extension()
    )
}

pub fn team_report_file_name(
    kind: ReportKind,
    from: NaiveDate,
    to: NaiveDate,
    format: ReportFormat,
) -> String {
    format!(
        "team_report_{}_{}_{}.{}",
        kind.as_str(),
        from,
        to,
        format.extension()
    )
}

fn csv_bytes<T: Serialize>(records: &[T]) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    writer.into_inner().map_err(|e| ReportError::Io(e.into_error()))
}

pub fn render_week_report(
    data: &WeekReportData,
    format: ReportFormat,
    settings: &RenderSettings,
) -> Result<RenderedReport, ReportError> {
    let bytes = match format {
        ReportFormat::Json => serde_json::to_vec_pretty(data)?,
        ReportFormat::Csv => csv_bytes(&data.activities)?,
        ReportFormat::Pdf => week_pdf(data, settings)?,
    };
    let file_name = weekly_report_file_name(&data.employee, data.week.monday(), format);
    info!("Rendered {} ({} bytes)", file_name, bytes.len());
    Ok(RenderedReport {
        file_name,
        format,
        bytes,
    })
}

pub fn render_team_report(
    report: &TeamReport,
    kind: ReportKind,
    format: ReportFormat,
    settings: &RenderSettings,
) -> Result<RenderedReport, ReportError> {
    let bytes = match format {
        ReportFormat::Json => serde_json::to_vec_pretty(report)?,
        ReportFormat::Csv => csv_bytes(&report.rows)?,
        ReportFormat::Pdf => match kind {
            ReportKind::Detailed => team_detailed_pdf(report, settings)?,
            ReportKind::Summary => team_summary_pdf(report, settings)?,
        },
    };
    let file_name = team_report_file_name(kind, report.from, report.to, format);
    info!("Rendered {} ({} bytes)", file_name, bytes.len());
    Ok(RenderedReport {
        file_name,
        format,
        bytes,
    })
}

// --- PDF building blocks ---

fn hours(value: Decimal) -> String {
    format!("{:.1}h", value)
}

fn percent(part: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        Decimal::ZERO
    } else {
        part * Decimal::ONE_HUNDRED / total
    }
}

fn header_band(doc: &mut PdfDocument, color: &str, title: &str, subtitle: &str) {
    doc.fill_rect(0.0, 0.0, PAGE_WIDTH_MM, 35.0, Rgb::from_hex(color));
    let center = PAGE_WIDTH_MM / 2.0;
    doc.text(
        center,
        20.0,
        TextStyle::new(20.0, Font::Bold)
            .color(Rgb::WHITE)
            .align(Align::Center),
        title,
    );
    doc.text(
        center,
        30.0,
        TextStyle::new(11.0, Font::Regular)
            .color(Rgb::WHITE)
            .align(Align::Center),
        subtitle,
    );
}

fn section_title(doc: &mut PdfDocument, y: f32, title: &str) {
    doc.fill_rect(15.0, y - 5.0, PAGE_WIDTH_MM - 30.0, 15.0, GRAY_100);
    doc.text(20.0, y + 5.0, TextStyle::new(14.0, Font::Bold), title);
}

struct MetricBox {
    value: String,
    label: String,
    sublabel: Option<String>,
    color: &'static str,
}

impl MetricBox {
    fn new(value: String, label: &str, color: &'static str) -> Self {
        Self {
            value,
            label: label.to_string(),
            sublabel: None,
            color,
        }
    }

    fn with_sublabel(mut self, sublabel: String) -> Self {
        self.sublabel = Some(sublabel);
        self
    }
}

/// Draws a centred row of coloured boxes and returns their height.
fn metric_boxes(doc: &mut PdfDocument, y: f32, boxes: &[MetricBox], width: f32, spacing: f32) -> f32 {
    let height = if boxes.iter().any(|b| b.sublabel.is_some()) {
        30.0
    } else {
        25.0
    };
    let total = (width + spacing) * boxes.len() as f32 - spacing;
    let start = (PAGE_WIDTH_MM - total) / 2.0;
    for (i, metric) in boxes.iter().enumerate() {
        let x = start + i as f32 * (width + spacing);
        let center = x + width / 2.0;
        doc.fill_rect(x, y, width, height, Rgb::from_hex(metric.color));
        let white = |size: f32, font: Font| {
            TextStyle::new(size, font)
                .color(Rgb::WHITE)
                .align(Align::Center)
        };
        doc.text(center, y + 11.0, white(14.0, Font::Bold), &metric.value);
        doc.text(center, y + 18.0, white(8.0, Font::Regular), &metric.label);
        if let Some(sublabel) = &metric.sublabel {
            doc.text(center, y + 25.0, white(7.0, Font::Regular), sublabel);
        }
    }
    height
}

/// Rasterizes a chart and places it `width` mm wide, keeping its aspect ratio.
fn place_chart(
    doc: &mut PdfDocument,
    svg: &str,
    x: f32,
    y: f32,
    width: f32,
    settings: &RenderSettings,
) -> Result<f32, ReportError> {
    let raster = chart::rasterize_png(svg, settings.chart_scale)?;
    let height = width * raster.height as f32 / raster.width.max(1) as f32;
    doc.image(&raster.png, x, y, width, height)?;
    Ok(height)
}

fn paragraph(doc: &mut PdfDocument, x: f32, y: f32, max_width: f32, size: f32, text: &str) -> f32 {
    let style = TextStyle::new(size, Font::Regular).color(TEXT_DARK);
    let line_height = size * 0.45;
    let lines = wrap_text(text, max_width, size, Font::Regular);
    for (i, line) in lines.iter().enumerate() {
        doc.text(x, y + i as f32 * line_height, style, line);
    }
    lines.len() as f32 * line_height
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

fn footer(doc: &mut PdfDocument, generated_at: DateTime<Utc>) {
    doc.fill_rect(0.0, PAGE_HEIGHT_MM - 20.0, PAGE_WIDTH_MM, 20.0, GRAY_100);
    doc.text(
        PAGE_WIDTH_MM / 2.0,
        PAGE_HEIGHT_MM - 10.0,
        TextStyle::new(8.0, Font::Italic)
            .color(GRAY_600)
            .align(Align::Center),
        &format!(
            "Generated on {}",
            generated_at.format("%d/%m/%Y at %H:%M")
        ),
    );
}

struct Table<'a> {
    title: &'a str,
    headers: &'a [&'a str],
    columns: &'a [f32],
}

/// Draws a table with a title band, starting new pages as rows overflow.
fn draw_table(doc: &mut PdfDocument, start_y: f32, table: &Table<'_>, rows: &[Vec<String>]) -> f32 {
    let mut y = start_y;
    doc.fill_rect(15.0, y - 5.0, PAGE_WIDTH_MM - 30.0, 15.0, Rgb::from_hex(PRIMARY));
    doc.text(
        20.0,
        y + 5.0,
        TextStyle::new(13.0, Font::Bold).color(Rgb::WHITE),
        table.title,
    );
    y += 20.0;

    doc.fill_rect(15.0, y - 3.0, PAGE_WIDTH_MM - 30.0, 12.0, GRAY_100);
    for (header, x) in table.headers.iter().zip(table.columns) {
        doc.text(*x, y + 5.0, TextStyle::new(10.0, Font::Bold), header);
    }
    y += 15.0;

    let cell = TextStyle::new(9.0, Font::Regular);
    for (index, row) in rows.iter().enumerate() {
        if y > PAGE_HEIGHT_MM - 30.0 {
            doc.add_page();
            y = 30.0;
        }
        if index % 2 == 0 {
            doc.fill_rect(15.0, y - 2.0, PAGE_WIDTH_MM - 30.0, 10.0, GRAY_50);
        }
        for (value, x) in row.iter().zip(table.columns) {
            doc.text(*x, y + 5.0, cell, value);
        }
        y += 10.0;
    }
    y
}

fn day_label(date: NaiveDate) -> String {
    let name = weekday_name(date);
    format!("{} {}", &name[..3], date.format("%d/%m"))
}

// --- Employee weekly PDF ---

fn week_pdf(data: &WeekReportData, settings: &RenderSettings) -> Result<Vec<u8>, ReportError> {
    let mut doc = PdfDocument::new();

    // Page 1: headline figures and daily hours
    header_band(
        &mut doc,
        PRIMARY,
        "WEEKLY TIME REPORT",
        &format!("Period: {} - {}", data.period, data.employee),
    );
    let mut y = 50.0;
    y += metric_boxes(
        &mut doc,
        y,
        &[
            MetricBox::new(hours(data.total_hours), "Total hours", PRIMARY),
            MetricBox::new(data.working_days.to_string(), "Days worked", SECONDARY),
            MetricBox::new(data.total_activities.to_string(), "Activities", WARNING),
            MetricBox::new(hours(data.average_per_day), "Average/day", INFO),
        ],
        40.0,
        5.0,
    ) + 15.0;
    if !data.daily_hours.is_empty() {
        let daily: chart::Series = data
            .daily_hours
            .iter()
            .map(|(date, h)| (day_label(*date), h.to_f64().unwrap_or(0.0)))
            .collect();
        let svg = chart::bar_chart_svg(
            &daily,
            &ChartOptions {
                title: Some("Hours per day"),
                x_axis_title: Some("Day"),
                y_axis_title: Some("Hours"),
            },
        );
        place_chart(&mut doc, &svg, 15.0, y, 180.0, settings)?;
    }

    // Page 2: categories, projects, indicators
    doc.add_page();
    header_band(
        &mut doc,
        SECONDARY,
        "DETAILED ANALYSIS",
        "Time distribution and performance indicators",
    );
    let mut y = 50.0;
    section_title(&mut doc, y, "CATEGORY ANALYSIS");
    y += 17.0;
    if !data.category_distribution.is_empty() {
        let categories = chart::series(&data.category_distribution);
        let pie = chart::pie_chart_svg(&categories, Some("Hours by category"));
        let bar = chart::bar_chart_svg(
            &categories,
            &ChartOptions {
                title: Some("Hours by category"),
                ..ChartOptions::default()
            },
        );
        let pie_height = place_chart(&mut doc, &pie, 15.0, y, 85.0, settings)?;
        let bar_height = place_chart(&mut doc, &bar, 110.0, y, 85.0, settings)?;
        y += pie_height.max(bar_height) + 5.0;
    }
    let detail = data
        .category_distribution
        .iter()
        .map(|(category, h)| {
            format!(
                "{}: {} ({:.1}%)",
                category,
                hours(*h),
                percent(*h, data.total_hours)
            )
        })
        .collect::<Vec<_>>()
        .join(" • ");
    doc.fill_rect(15.0, y, PAGE_WIDTH_MM - 30.0, 22.0, GRAY_50);
    doc.text(20.0, y + 8.0, TextStyle::new(11.0, Font::Bold), "Per category:");
    paragraph(&mut doc, 20.0, y + 14.0, PAGE_WIDTH_MM - 40.0, 9.0, &detail);
    y += 30.0;

    if !data.project_distribution.is_empty() {
        section_title(&mut doc, y, "PROJECT ANALYSIS");
        y += 17.0;
        let pie = chart::pie_chart_svg(
            &chart::series(&data.project_distribution),
            Some("Hours by project"),
        );
        y += place_chart(&mut doc, &pie, 65.0, y, 80.0, settings)? + 5.0;
    }

    section_title(&mut doc, y, "PERFORMANCE INDICATORS");
    y += 17.0;
    let perf = &data.performance;
    let productivity_color = match perf.productivity {
        Performance::Excellent => SUCCESS,
        Performance::Good => WARNING,
        Performance::NeedsImprovement => DANGER,
    };
    metric_boxes(
        &mut doc,
        y,
        &[
            MetricBox::new(perf.productivity.label().to_string(), "Productivity", productivity_color)
                .with_sublabel(format!("{}/day", hours(data.average_per_day))),
            MetricBox::new(format!("{:.0}%", perf.regularity), "Regularity", INFO)
                .with_sublabel(format!("{}/5 days", data.working_days)),
            MetricBox::new(perf.active_projects.to_string(), "Diversity", PURPLE)
                .with_sublabel("active projects".to_string()),
        ],
        55.0,
        10.0,
    );

    // Page 3+: activity table
    doc.add_page();
    let rows: Vec<Vec<String>> = data
        .activities
        .iter()
        .map(|a| {
            vec![
                a.date.format("%d/%m").to_string(),
                a.category.clone(),
                truncate(&a.activity, 30),
                hours(a.hours),
            ]
        })
        .collect();
    draw_table(
        &mut doc,
        20.0,
        &Table {
            title: "ACTIVITY DETAILS",
            headers: &["Date", "Category", "Project/Training", "Hours"],
            columns: &[20.0, 45.0, 90.0, 175.0],
        },
        &rows,
    );
    footer(&mut doc, settings.generated_at);

    debug!("Weekly PDF laid out on {} pages", doc.page_count());
    Ok(doc.finish())
}

// --- Manager PDFs ---

fn team_subtitle(report: &TeamReport) -> String {
    format!(
        "From {} to {} | Project: {}",
        report.from.format("%d/%m/%Y"),
        report.to.format("%d/%m/%Y"),
        report.project.as_deref().unwrap_or("All projects")
    )
}

fn team_detailed_pdf(report: &TeamReport, settings: &RenderSettings) -> Result<Vec<u8>, ReportError> {
    let metrics = &report.metrics;
    let mut doc = PdfDocument::new();
    header_band(
        &mut doc,
        PRIMARY,
        "TEAM REPORT - DETAILED",
        &team_subtitle(report),
    );
    let mut y = 50.0;
    y += metric_boxes(
        &mut doc,
        y,
        &[
            MetricBox::new(metrics.employee_count.to_string(), "Employees", PRIMARY),
            MetricBox::new(hours(metrics.total_hours), "Total hours", SECONDARY),
            MetricBox::new(hours(metrics.average_per_employee), "Average/employee", WARNING),
            MetricBox::new(format!("{:.1}%", metrics.productivity_rate), "Productivity", INFO),
        ],
        40.0,
        5.0,
    ) + 12.0;

    section_title(&mut doc, y, "HOURS PER EMPLOYEE");
    y += 17.0;
    let per_employee: chart::Series = report
        .totals
        .employee_series()
        .into_iter()
        .map(|(name, hours)| (name, hours.to_f64().unwrap_or(0.0)))
        .collect();
    let svg = chart::bar_chart_svg(
        &per_employee,
        &ChartOptions {
            title: Some("Hours per employee"),
            x_axis_title: Some("Employee"),
            y_axis_title: Some("Hours"),
        },
    );
    y += place_chart(&mut doc, &svg, 15.0, y, 180.0, settings)? + 8.0;
    doc.text(
        15.0,
        y,
        TextStyle::new(10.0, Font::Regular).color(TEXT_DARK),
        &format!(
            "Statistics: average {} | maximum {} | minimum {}",
            hours(metrics.average_per_employee),
            hours(metrics.max_hours),
            hours(metrics.min_hours)
        ),
    );

    // Page 2: category split and per-employee table
    doc.add_page();
    header_band(
        &mut doc,
        SECONDARY,
        "CATEGORY ANALYSIS",
        "Where the team's time goes",
    );
    let mut y = 45.0;
    let categories: BTreeMap<&'static str, Decimal> = report
        .totals
        .by_category
        .iter()
        .map(|(c, h)| (c.label(), *h))
        .collect();
    let pie = chart::pie_chart_svg(&chart::series(&categories), Some("Hours by category"));
    y += place_chart(&mut doc, &pie, 40.0, y, 130.0, settings)? + 8.0;

    let non_productive = metrics.total_hours - metrics.productive_hours;
    let analysis = [
        format!(
            "Productivity: {:.1}% of the time spent on projects",
            metrics.productivity_rate
        ),
        format!(
            "Non-productive time: {} out of {} in total",
            hours(non_productive),
            hours(metrics.total_hours)
        ),
    ];
    for line in &analysis {
        y += paragraph(&mut doc, 20.0, y, PAGE_WIDTH_MM - 40.0, 10.0, line) + 2.0;
    }
    y += 6.0;

    let rows: Vec<Vec<String>> = metrics
        .employees
        .iter()
        .map(|e| {
            let sign = if e.deviation > Decimal::ZERO { "+" } else { "" };
            vec![
                truncate(&e.name, 28),
                hours(e.hours),
                if e.above_average {
                    "Above average".to_string()
                } else {
                    "Below average".to_string()
                },
                format!("{}{}", sign, hours(e.deviation)),
            ]
        })
        .collect();
    draw_table(
        &mut doc,
        y,
        &Table {
            title: "EMPLOYEE PERFORMANCE",
            headers: &["Employee", "Hours", "Performance", "Deviation"],
            columns: &[20.0, 85.0, 115.0, 165.0],
        },
        &rows,
    );
    footer(&mut doc, settings.generated_at);
    debug!("Detailed team PDF laid out on {} pages", doc.page_count());
    Ok(doc.finish())
}

fn team_summary_pdf(report: &TeamReport, settings: &RenderSettings) -> Result<Vec<u8>, ReportError> {
    let metrics = &report.metrics;
    let mut doc = PdfDocument::new();
    header_band(
        &mut doc,
        PRIMARY,
        "TEAM REPORT - SUMMARY",
        &team_subtitle(report),
    );
    let mut y = 50.0;
    y += metric_boxes(
        &mut doc,
        y,
        &[
            MetricBox::new(metrics.employee_count.to_string(), "Employees", PRIMARY),
            MetricBox::new(hours(metrics.total_hours), "Total hours", SECONDARY),
            MetricBox::new(metrics.pending_weeks.to_string(), "Pending weeks", WARNING),
            MetricBox::new(format!("{:.1}%", metrics.productivity_rate), "Productivity", INFO),
            MetricBox::new(hours(metrics.productive_hours), "Productive hours", SUCCESS),
        ],
        34.0,
        4.0,
    ) + 12.0;

    section_title(&mut doc, y, "PROJECT DISTRIBUTION");
    y += 17.0;
    let projects: BTreeMap<String, Decimal> = report
        .project_loads
        .iter()
        .map(|(name, load)| (name.clone(), load.hours))
        .collect();
    let pie = chart::pie_chart_svg(&chart::series(&projects), Some("Hours by project"));
    place_chart(&mut doc, &pie, 40.0, y, 130.0, settings)?;

    doc.add_page();
    header_band(
        &mut doc,
        SECONDARY,
        "GLOBAL PERFORMANCE",
        "Team indicators and recommendations",
    );
    let mut y = 50.0;
    let band_color = match metrics.team_performance {
        Performance::Excellent => SUCCESS,
        Performance::Good => WARNING,
        Performance::NeedsImprovement => DANGER,
    };
    y += metric_boxes(
        &mut doc,
        y,
        &[
            MetricBox::new(metrics.team_performance.label().to_string(), "Team performance", band_color)
                .with_sublabel(format!("{}/employee", hours(metrics.average_per_employee))),
            MetricBox::new(format!("{:.1}", metrics.validation_backlog), "Backlog", INFO)
                .with_sublabel("weeks/employee".to_string()),
            MetricBox::new(metrics.project_count.to_string(), "Projects", PURPLE)
                .with_sublabel("in parallel".to_string()),
            MetricBox::new(hours(metrics.daily_load), "Daily load", INDIGO)
                .with_sublabel("per working day".to_string()),
        ],
        45.0,
        6.0,
    ) + 15.0;

    section_title(&mut doc, y, "TRENDS");
    y += 17.0;
    let trends = [
        format!(
            "• Overall productivity: {:.1}% ({} productive out of {})",
            metrics.productivity_rate,
            hours(metrics.productive_hours),
            hours(metrics.total_hours)
        ),
        format!(
            "• Workload: {} per employee on average",
            hours(metrics.average_per_employee)
        ),
        format!(
            "• Spread: {} project(s) for {} employee(s)",
            metrics.project_count, metrics.employee_count
        ),
        format!(
            "• Awaiting validation: {} week(s)",
            metrics.pending_weeks
        ),
    ];
    for line in &trends {
        y += paragraph(&mut doc, 20.0, y, PAGE_WIDTH_MM - 40.0, 10.0, line) + 3.0;
    }
    y += 8.0;

    section_title(&mut doc, y, "RECOMMENDATIONS");
    y += 17.0;
    for rec in &metrics.recommendations {
        y += paragraph(&mut doc, 20.0, y, PAGE_WIDTH_MM - 40.0, 10.0, &format!("• {}", rec)) + 3.0;
    }

    footer(&mut doc, settings.generated_at);
    debug!("Summary team PDF laid out on {} pages", doc.page_count());
    Ok(doc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{self, samples::team_week, ActivityLine};
    use crate::directory::fixtures::{directory, ALICE};
    use crate::imputation::WeekKey;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn category_totals_from_csv(bytes: &[u8]) -> Result<BTreeMap<Category, Decimal>, ReportError> {
        let mut reader = csv::Reader::from_reader(bytes);
        let mut sums = BTreeMap::new();
        for row in reader.deserialize::<ReportRow>() {
            let row = row?;
            *sums.entry(row.category).or_insert(Decimal::ZERO) += row.hours;
        }
        Ok(sums)
    }

    fn settings() -> RenderSettings {
        RenderSettings {
            chart_scale: 0.25,
            generated_at: Utc.with_ymd_and_hms(2024, 3, 11, 9, 30, 0).unwrap(),
        }
    }

    fn alice_week() -> WeekReportData {
        let alice: Vec<_> = team_week()
            .into_iter()
            .filter(|i| i.employee_id == ALICE)
            .collect();
        aggregation::week_report(
            WeekKey::new(2024, 10).unwrap(),
            "Alice Martin",
            &alice,
            &directory(),
        )
    }

    fn team_report() -> TeamReport {
        let dir = directory();
        let imputations = team_week();
        let totals = aggregation::totals(&imputations, &dir);
        let metrics = aggregation::team_metrics(&totals, 1);
        TeamReport {
            from: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            project: None,
            rows: aggregation::report_rows(&imputations, &dir),
            project_loads: aggregation::project_loads(&imputations, &dir),
            totals,
            metrics,
        }
    }

    fn page_count(pdf: &[u8]) -> usize {
        let text: String = pdf
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '.' })
            .collect();
        let start = text.find("/Count ").unwrap() + "/Count ".len();
        text[start..]
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .unwrap()
            .parse()
            .unwrap()
    }

    #[test]
    fn file_names_follow_report_conventions() {
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(
            weekly_report_file_name("Alice Martin", monday, ReportFormat::Pdf),
            "weekly_report_alice_martin_2024-03-04.pdf"
        );
        assert_eq!(
            team_report_file_name(
                ReportKind::Summary,
                monday,
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                ReportFormat::Csv
            ),
            "team_report_summary_2024-03-04_2024-03-31.csv"
        );
        assert_eq!(ReportFormat::Csv.mime_type(), "text/csv; charset=utf-8");
    }

    #[test]
    fn week_report_json_round_trips_category_totals() {
        let data = alice_week();
        let rendered = render_week_report(&data, ReportFormat::Json, &settings()).unwrap();
        let back: WeekReportData = serde_json::from_slice(&rendered.bytes).unwrap();
        assert_eq!(back, data);
        let sum: Decimal = back.category_distribution.values().copied().sum();
        assert_eq!(sum, data.total_hours);
    }

    #[test]
    fn week_report_csv_re_sums_to_category_distribution() {
        let data = alice_week();
        let rendered = render_week_report(&data, ReportFormat::Csv, &settings()).unwrap();
        let mut reader = csv::Reader::from_reader(rendered.bytes.as_slice());
        let mut sums: BTreeMap<String, Decimal> = BTreeMap::new();
        for line in reader.deserialize::<ActivityLine>() {
            let line = line.unwrap();
            *sums.entry(line.category).or_default() += line.hours;
        }
        assert_eq!(sums, data.category_distribution);
        assert_eq!(rendered.file_name, "weekly_report_alice_martin_2024-03-04.csv");
    }

    #[test]
    fn team_csv_and_json_re_sum_to_raw_totals() {
        let report = team_report();
        let raw = aggregation::totals(&team_week(), &directory()).by_category;

        let csv = render_team_report(&report, ReportKind::Detailed, ReportFormat::Csv, &settings())
            .unwrap();
        assert_eq!(category_totals_from_csv(&csv.bytes).unwrap(), raw);

        let json = render_team_report(&report, ReportKind::Detailed, ReportFormat::Json, &settings())
            .unwrap();
        let back: TeamReport = serde_json::from_slice(&json.bytes).unwrap();
        assert_eq!(aggregation::samples::category_totals_of_rows(&back.rows), raw);
        assert_eq!(back.totals.by_category, raw);
        assert_eq!(back.metrics.total_hours, dec!(32.75));
    }

    #[test]
    fn week_pdf_has_three_pages_and_embedded_charts() {
        let rendered = render_week_report(&alice_week(), ReportFormat::Pdf, &settings()).unwrap();
        assert!(rendered.bytes.starts_with(b"%PDF-1."));
        assert_eq!(page_count(&rendered.bytes), 3);
        // Daily bars, category pie and bar, project pie.
        let text = String::from_utf8_lossy(&rendered.bytes);
        assert_eq!(text.matches("/Subtype /Image").count(), 4);
    }

    #[test]
    fn long_activity_tables_flow_onto_extra_pages() {
        let mut data = alice_week();
        let template = data.activities[0].clone();
        data.activities = (0..60).map(|_| template.clone()).collect();
        let rendered = render_week_report(&data, ReportFormat::Pdf, &settings()).unwrap();
        assert!(page_count(&rendered.bytes) >= 5);
    }

    #[test]
    fn team_pdfs_render_both_kinds() {
        let report = team_report();
        let detailed =
            render_team_report(&report, ReportKind::Detailed, ReportFormat::Pdf, &settings())
                .unwrap();
        assert_eq!(page_count(&detailed.bytes), 2);
        assert_eq!(
            detailed.file_name,
            "team_report_detailed_2024-03-04_2024-03-10.pdf"
        );
        let summary =
            render_team_report(&report, ReportKind::Summary, ReportFormat::Pdf, &settings())
                .unwrap();
        assert_eq!(page_count(&summary.bytes), 2);
    }

    #[test]
    fn empty_team_report_still_renders() {
        let mut report = team_report();
        report.rows.clear();
        report.totals = Totals::default();
        report.project_loads.clear();
        report.metrics = aggregation::team_metrics(&report.totals, 0);
        let summary =
            render_team_report(&report, ReportKind::Summary, ReportFormat::Pdf, &settings())
                .unwrap();
        assert!(summary.bytes.ends_with(b"%%EOF\n"));
    }
}
