//! Minimal hand-rolled SVG writers for the chart battery.
//!
//! Only what the report needs: vertical bars, a donut pie, and a stacked
//! area chart. Layout is deliberately plain; the figures are summaries,
//! not publication graphics.

use std::f64::consts::PI;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};

const WIDTH: f64 = 960.0;
const HEIGHT: f64 = 600.0;
const MARGIN: f64 = 70.0;

/// Title and axis labelling shared by all chart kinds.
#[derive(Debug, Clone, Default)]
pub struct ChartOptions {
    pub title: String,
    pub y_label: Option<String>,
    /// Per-series fill colors; cycled when shorter than the data.
    pub colors: Vec<String>,
}

fn color(opts: &ChartOptions, idx: usize) -> &str {
    if opts.colors.is_empty() {
        "#4c72b0"
    } else {
        &opts.colors[idx % opts.colors.len()]
    }
}

fn document(body: String, opts: &ChartOptions) -> String {
    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = WIDTH,
        h = HEIGHT
    );
    let _ = write!(
        svg,
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        WIDTH, HEIGHT
    );
    let _ = write!(
        svg,
        r#"<text x="{}" y="32" font-size="22" text-anchor="middle" font-family="sans-serif">{}</text>"#,
        WIDTH / 2.0,
        escape(&opts.title)
    );
    if let Some(label) = &opts.y_label {
        let _ = write!(
            svg,
            r#"<text x="20" y="{}" font-size="14" text-anchor="middle" font-family="sans-serif" transform="rotate(-90 20 {})">{}</text>"#,
            HEIGHT / 2.0,
            HEIGHT / 2.0,
            escape(label)
        );
    }
    svg.push_str(&body);
    svg.push_str("</svg>");
    svg
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn write_svg(path: &Path, svg: &str) -> Result<()> {
    fs::write(path, svg).with_context(|| format!("Failed to write chart to {}", path.display()))?;
    log::debug!("wrote chart {}", path.display());
    Ok(())
}

/// Vertical bar chart, one bar per label, values printed above the bars.
pub fn bar_chart(path: &Path, opts: &ChartOptions, labels: &[String], values: &[f64]) -> Result<()> {
    let mut body = String::new();
    let plot_w = WIDTH - 2.0 * MARGIN;
    let plot_h = HEIGHT - 2.0 * MARGIN;
    let max = values.iter().cloned().fold(0.0_f64, f64::max).max(1.0);
    let n = values.len().max(1) as f64;
    let slot = plot_w / n;
    let bar_w = (slot * 0.7).max(1.0);

    // Axes.
    let _ = write!(
        body,
        r#"<line x1="{m}" y1="{b}" x2="{r}" y2="{b}" stroke="black"/><line x1="{m}" y1="{t}" x2="{m}" y2="{b}" stroke="black"/>"#,
        m = MARGIN,
        t = MARGIN,
        b = HEIGHT - MARGIN,
        r = WIDTH - MARGIN
    );

    for (i, value) in values.iter().enumerate() {
        let h = (value / max) * plot_h;
        let x = MARGIN + i as f64 * slot + (slot - bar_w) / 2.0;
        let y = HEIGHT - MARGIN - h;
        let _ = write!(
            body,
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
            x,
            y,
            bar_w,
            h,
            color(opts, i)
        );
        let _ = write!(
            body,
            r#"<text x="{:.1}" y="{:.1}" font-size="12" text-anchor="middle" font-family="sans-serif">{}</text>"#,
            x + bar_w / 2.0,
            y - 5.0,
            format_value(*value)
        );
        if let Some(label) = labels.get(i) {
            let lx = x + bar_w / 2.0;
            let ly = HEIGHT - MARGIN + 16.0;
            let _ = write!(
                body,
                r#"<text x="{:.1}" y="{:.1}" font-size="12" text-anchor="end" font-family="sans-serif" transform="rotate(-45 {:.1} {:.1})">{}</text>"#,
                lx,
                ly,
                lx,
                ly,
                escape(label)
            );
        }
    }

    write_svg(path, &document(body, opts))
}

/// Donut pie chart with a simple legend on the right.
pub fn pie_chart(path: &Path, opts: &ChartOptions, labels: &[String], values: &[f64]) -> Result<()> {
    let mut body = String::new();
    let total: f64 = values.iter().filter(|v| **v > 0.0).sum();
    let cx = WIDTH / 2.0 - 80.0;
    let cy = HEIGHT / 2.0 + 10.0;
    let r_outer = 200.0;
    let r_inner = 110.0;

    if total > 0.0 {
        let mut angle = -PI / 2.0;
        for (i, value) in values.iter().enumerate() {
            if *value <= 0.0 {
                continue;
            }
            let sweep = value / total * 2.0 * PI;
            // Full-circle arcs degenerate in SVG; cap just under 2*pi.
            let end = angle + sweep.min(2.0 * PI - 1e-4);
            let large = if sweep > PI { 1 } else { 0 };
            let (x0, y0) = (cx + r_outer * angle.cos(), cy + r_outer * angle.sin());
            let (x1, y1) = (cx + r_outer * end.cos(), cy + r_outer * end.sin());
            let (x2, y2) = (cx + r_inner * end.cos(), cy + r_inner * end.sin());
            let (x3, y3) = (cx + r_inner * angle.cos(), cy + r_inner * angle.sin());
            let _ = write!(
                body,
                r#"<path d="M {x0:.1} {y0:.1} A {ro:.1} {ro:.1} 0 {large} 1 {x1:.1} {y1:.1} L {x2:.1} {y2:.1} A {ri:.1} {ri:.1} 0 {large} 0 {x3:.1} {y3:.1} Z" fill="{fill}" stroke="white"/>"#,
                ro = r_outer,
                ri = r_inner,
                fill = color(opts, i)
            );
            angle = end;
        }
    }

    // Legend.
    for (i, label) in labels.iter().enumerate() {
        let y = 90.0 + i as f64 * 24.0;
        let _ = write!(
            body,
            r#"<rect x="{x}" y="{y:.1}" width="14" height="14" fill="{fill}"/><text x="{tx}" y="{ty:.1}" font-size="14" font-family="sans-serif">{label} ({value})</text>"#,
            x = WIDTH - 230.0,
            tx = WIDTH - 210.0,
            ty = y + 12.0,
            fill = color(opts, i),
            label = escape(label),
            value = format_value(values.get(i).copied().unwrap_or(0.0))
        );
    }

    write_svg(path, &document(body, opts))
}

/// Stacked area chart: one x position per date, series stacked bottom-up.
pub fn stacked_area_chart(
    path: &Path,
    opts: &ChartOptions,
    dates: &[String],
    series_labels: &[&str],
    series: &[Vec<f64>],
) -> Result<()> {
    let mut body = String::new();
    let plot_w = WIDTH - 2.0 * MARGIN;
    let plot_h = HEIGHT - 2.0 * MARGIN;
    let n = dates.len();

    let max_total = (0..n)
        .map(|i| series.iter().map(|s| s.get(i).copied().unwrap_or(0.0)).sum::<f64>())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    let x_at = |i: usize| {
        if n <= 1 {
            MARGIN + plot_w / 2.0
        } else {
            MARGIN + plot_w * i as f64 / (n - 1) as f64
        }
    };
    let y_at = |v: f64| HEIGHT - MARGIN - (v / max_total) * plot_h;

    if n > 0 {
        let mut base = vec![0.0; n];
        for (s, values) in series.iter().enumerate() {
            let top: Vec<f64> = (0..n)
                .map(|i| base[i] + values.get(i).copied().unwrap_or(0.0))
                .collect();

            let mut d = String::new();
            let _ = write!(d, "M {:.1} {:.1}", x_at(0), y_at(top[0]));
            for i in 1..n {
                let _ = write!(d, " L {:.1} {:.1}", x_at(i), y_at(top[i]));
            }
            for i in (0..n).rev() {
                let _ = write!(d, " L {:.1} {:.1}", x_at(i), y_at(base[i]));
            }
            d.push_str(" Z");
            let _ = write!(
                body,
                r#"<path d="{}" fill="{}" fill-opacity="0.85" stroke="none"/>"#,
                d,
                color(opts, s)
            );
            base = top;
        }
    }

    // X labels and legend.
    for (i, date) in dates.iter().enumerate() {
        let lx = x_at(i);
        let ly = HEIGHT - MARGIN + 16.0;
        let _ = write!(
            body,
            r#"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end" font-family="sans-serif" transform="rotate(-60 {:.1} {:.1})">{}</text>"#,
            lx,
            ly,
            lx,
            ly,
            escape(date)
        );
    }
    for (i, label) in series_labels.iter().enumerate() {
        let x = MARGIN + i as f64 * 130.0;
        let _ = write!(
            body,
            r#"<rect x="{x:.1}" y="48" width="14" height="14" fill="{fill}"/><text x="{tx:.1}" y="60" font-size="13" font-family="sans-serif">{label}</text>"#,
            x = x,
            tx = x + 18.0,
            fill = color(opts, i),
            label = escape(label)
        );
    }

    write_svg(path, &document(body, opts))
}

fn format_value(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.1}", value)
    }
}
