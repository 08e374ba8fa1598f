use std::{
    fmt::{self, Write},
    future::Future,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use crate::{
    daemon::storage::entities::{ActivityKey, ActivityStore},
    fs::operations::write_atomically,
    utils::time::month_name,
};

use super::{format_minutes, monthly_top};

const MAX_LABEL_CHARS: usize = 30;
const LABEL_WIDTH: u32 = 260;
const BAR_AREA_WIDTH: u32 = 560;
const VALUE_WIDTH: u32 = 100;
const BAR_HEIGHT: u32 = 28;
const BAR_GAP: u32 = 10;
const TITLE_HEIGHT: u32 = 60;
const AXIS_HEIGHT: u32 = 40;

/// Produces a visual summary of a month.
pub trait ChartRenderer {
    /// `entries` are (activity, minutes) pairs, largest first. Returns where the chart was put.
    fn render(
        &self,
        month: NaiveDate,
        entries: &[(ActivityKey, f64)],
    ) -> impl Future<Output = Result<PathBuf>>;
}

/// Aggregates the month and renders it. Nothing is rendered for a month without data.
pub async fn render_monthly_chart(
    store: &ActivityStore,
    month: NaiveDate,
    top_n: usize,
    renderer: &impl ChartRenderer,
) -> Result<Option<PathBuf>> {
    let top = monthly_top(store, month, top_n);
    if top.is_empty() {
        info!("No data available for the {} chart", month_name(month));
        return Ok(None);
    }
    let path = renderer.render(month, &top).await?;
    info!("Monthly chart saved to {path:?}");
    Ok(Some(path))
}

/// Chart file name for a month, e.g. `activity_report_2024_03.svg`.
pub fn chart_file_name(month: NaiveDate) -> String {
    month.format("activity_report_%Y_%m.svg").to_string()
}

/// Draws a horizontal bar chart of hours per activity as an SVG document.
pub struct SvgChartRenderer {
    dir: PathBuf,
}

impl SvgChartRenderer {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ChartRenderer for SvgChartRenderer {
    async fn render(&self, month: NaiveDate, entries: &[(ActivityKey, f64)]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(chart_file_name(month));
        let title = format!("Top {} Applications - {}", entries.len(), month_name(month));
        let svg = bar_chart_svg(&title, entries)?;
        write_atomically(&path, svg.as_bytes()).await?;
        Ok(path)
    }
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn truncate_label(value: &str) -> String {
    value.chars().take(MAX_LABEL_CHARS).collect()
}

fn bar_chart_svg(title: &str, entries: &[(ActivityKey, f64)]) -> Result<String, fmt::Error> {
    let width = LABEL_WIDTH + BAR_AREA_WIDTH + VALUE_WIDTH;
    let rows = entries.len() as u32;
    let height = TITLE_HEIGHT + rows * (BAR_HEIGHT + BAR_GAP) + AXIS_HEIGHT;
    let max_hours = entries
        .iter()
        .map(|v| v.1 / 60.)
        .fold(0., f64::max)
        .max(f64::EPSILON);

    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" font-family="sans-serif" font-size="13">"#
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text x="{}" y="36" font-size="18" text-anchor="middle">{}</text>"#,
        width / 2,
        escape_xml(title)
    )?;

    for (row, (key, minutes)) in entries.iter().enumerate() {
        let y = TITLE_HEIGHT + row as u32 * (BAR_HEIGHT + BAR_GAP);
        let hours = minutes / 60.;
        let bar_width = (hours / max_hours * BAR_AREA_WIDTH as f64).round().max(1.);
        let text_y = y + BAR_HEIGHT / 2 + 5;
        writeln!(
            svg,
            r#"<text x="{}" y="{text_y}" text-anchor="end">{}</text>"#,
            LABEL_WIDTH - 8,
            escape_xml(&truncate_label(key.as_str()))
        )?;
        writeln!(
            svg,
            r#"<rect x="{LABEL_WIDTH}" y="{y}" width="{bar_width}" height="{BAR_HEIGHT}" fill="steelblue"/>"#
        )?;
        writeln!(
            svg,
            r#"<text x="{}" y="{text_y}">{}</text>"#,
            LABEL_WIDTH as f64 + bar_width + 6.,
            format_minutes(*minutes)
        )?;
    }

    let axis_y = TITLE_HEIGHT + rows * (BAR_HEIGHT + BAR_GAP) + 24;
    writeln!(
        svg,
        r#"<text x="{}" y="{axis_y}" text-anchor="middle">Hours Spent</text>"#,
        LABEL_WIDTH + BAR_AREA_WIDTH / 2
    )?;
    svg.push_str("</svg>\n");
    Ok(svg)
}
