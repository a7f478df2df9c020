use anyhow::{Context, Result};
use image::ImageEncoder;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontStyle;
use std::f64::consts::PI;
use tracing::warn;

use crate::chart::ChartConfig;
use crate::selection::ChartType;
use crate::{OutputFormat, RenderOptions};

const LEGEND_COLUMN_WIDTH: u32 = 180;
const LEGEND_ROW_HEIGHT: u32 = 22;
const MAX_LABEL_CHARS: usize = 24;
/// Largest canvas drawn, in pixels (8192 x 8192)
const MAX_PIXELS: usize = 8192 * 8192;

/// Draw a chart config into the bytes of the requested output format
pub fn render_chart(config: &ChartConfig, options: &RenderOptions) -> Result<Vec<u8>> {
    match options.format {
        OutputFormat::Png => render_png(config, options.width, options.height),
        OutputFormat::Svg => render_svg(config, options.width, options.height),
        OutputFormat::Json => {
            serde_json::to_vec_pretty(config).context("Failed to serialize chart config")
        }
    }
}

/// Validate the canvas and return the RGB buffer length it needs.
fn check_size(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        anyhow::bail!("Canvas size must be non-zero (got {}x{})", width, height);
    }
    match (width as usize).checked_mul(height as usize) {
        Some(pixels) if pixels <= MAX_PIXELS => Ok(pixels * 3),
        _ => anyhow::bail!(
            "Canvas {}x{} exceeds the {} pixel limit",
            width,
            height,
            MAX_PIXELS
        ),
    }
}

fn render_png(config: &ChartConfig, width: u32, height: u32) -> Result<Vec<u8>> {
    let len = check_size(width, height)?;
    let mut buffer = vec![0u8; len];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        draw(&root, config)?;
        root.present().context("Failed to present drawing")?;
    }

    let mut png_bytes = Vec::new();
    {
        let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
        encoder
            .write_image(&buffer, width, height, image::ColorType::Rgb8)
            .context("Failed to encode PNG")?;
    }

    Ok(png_bytes)
}

fn render_svg(config: &ChartConfig, width: u32, height: u32) -> Result<Vec<u8>> {
    check_size(width, height)?;
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
        draw(&root, config)?;
        root.present().context("Failed to present drawing")?;
    }
    Ok(svg.into_bytes())
}

/// Text needs fonts; when none are available the chart is still drawn.
fn soft<E: std::fmt::Display>(result: Result<(), E>, what: &str) {
    if let Err(e) = result {
        warn!(error = %e, "could not draw {}", what);
    }
}

fn draw<DB>(root: &DrawingArea<DB, Shift>, config: &ChartConfig) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).context("Failed to fill background")?;

    // Title, plus the legend row for bar charts
    let header_height = match config.kind {
        ChartType::Doughnut => 36,
        ChartType::Bar => 60,
    };
    let (width, height) = root.dim_in_pixel();
    let header_height = header_height.min(height / 2);
    let (header, body) = root.split_vertically(header_height);

    let title = &config.options.plugins.title.text;
    let title_style = TextStyle::from(("sans-serif", 16.0, FontStyle::Bold));
    let title_x = (width as i32 - title.chars().count() as i32 * 9) / 2;
    soft(
        header.draw_text(title, &title_style, (title_x.max(4), 8)),
        "title",
    );

    match config.kind {
        ChartType::Doughnut => draw_doughnut(&body, config),
        ChartType::Bar => {
            if let Some(dataset) = config.data.datasets.first() {
                let color = parse_color(dataset.background_color.at(0));
                let label_style = TextStyle::from(("sans-serif", 13.0));
                let x = (width as i32 / 2 - 40).max(4);
                header
                    .draw(&Rectangle::new([(x, 36), (x + 14, 50)], color.filled()))
                    .context("Failed to draw legend")?;
                soft(
                    header.draw_text(&dataset.label, &label_style, (x + 20, 36)),
                    "legend",
                );
            }
            draw_bar(&body, config)
        }
    }
}

fn draw_doughnut<DB>(area: &DrawingArea<DB, Shift>, config: &ChartConfig) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let Some(dataset) = config.data.datasets.first() else {
        return Ok(());
    };
    let labels = &config.data.labels;
    let (width, height) = area.dim_in_pixel();

    // Legend sits below the ring
    let per_row = (width / LEGEND_COLUMN_WIDTH).max(1) as usize;
    let rows = labels.len().div_ceil(per_row) as u32;
    let legend_height = (rows * LEGEND_ROW_HEIGHT + 10).min(height / 2);
    let (plot, legend) = area.split_vertically(height - legend_height);

    let (plot_w, plot_h) = plot.dim_in_pixel();
    let cx = plot_w as i32 / 2;
    let cy = plot_h as i32 / 2;
    let radius = ((plot_w.min(plot_h) as i32) / 2 - 10).max(2);

    let total: f64 = dataset.data.iter().filter(|v| **v > 0.0).sum();
    if total > 0.0 {
        let mut start = -PI / 2.0;
        for (i, &value) in dataset.data.iter().enumerate() {
            if value <= 0.0 {
                continue;
            }
            let sweep = value / total * 2.0 * PI;
            let steps = ((sweep / (2.0 * PI)) * 120.0).ceil().max(2.0) as usize;

            let mut points = Vec::with_capacity(steps + 2);
            points.push((cx, cy));
            for s in 0..=steps {
                let angle = start + sweep * s as f64 / steps as f64;
                points.push((
                    cx + (radius as f64 * angle.cos()).round() as i32,
                    cy + (radius as f64 * angle.sin()).round() as i32,
                ));
            }

            let color = parse_color(dataset.background_color.at(i));
            plot.draw(&Polygon::new(points, color.filled()))
                .context("Failed to draw slice")?;
            start += sweep;
        }

        // 50% cutout
        plot.draw(&Circle::new((cx, cy), radius / 2, WHITE.filled()))
            .context("Failed to draw cutout")?;
    }

    let tooltip = config.options.plugins.tooltip.as_ref();
    let label_style = TextStyle::from(("sans-serif", 13.0));
    for (i, label) in labels.iter().enumerate() {
        let x = (i % per_row) as i32 * LEGEND_COLUMN_WIDTH as i32 + 10;
        let y = (i / per_row) as i32 * LEGEND_ROW_HEIGHT as i32 + 5;
        let color = parse_color(dataset.background_color.at(i));

        legend
            .draw(&Rectangle::new([(x, y), (x + 14, y + 14)], color.filled()))
            .context("Failed to draw legend")?;

        let text = match tooltip.and_then(|t| t.labels.get(i)) {
            Some(detail) => format!("{}: {}", truncate(label), detail),
            None => truncate(label),
        };
        soft(legend.draw_text(&text, &label_style, (x + 20, y)), "legend");
    }

    Ok(())
}

fn draw_bar<DB>(area: &DrawingArea<DB, Shift>, config: &ChartConfig) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let Some(dataset) = config.data.datasets.first() else {
        return Ok(());
    };
    let labels = config.data.labels.clone();
    let n = labels.len().max(1);
    let (y_min, y_max) = bar_range(&dataset.data);

    // Bars centred on integer positions so axis ticks line up with labels
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), y_min..y_max)
        .context("Failed to build chart")?;

    let (x_title, y_title) = match &config.options.scales {
        Some(scales) => (scales.x.title.text.clone(), scales.y.title.text.clone()),
        None => (String::new(), String::new()),
    };

    soft(
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n)
            .x_label_formatter(&|x| {
                let idx = x.round();
                if (x - idx).abs() > 1e-6 || idx < 0.0 {
                    return String::new();
                }
                labels
                    .get(idx as usize)
                    .map(|l| truncate(l))
                    .unwrap_or_default()
            })
            .x_desc(x_title)
            .y_desc(y_title)
            .draw(),
        "axes",
    );

    let color = parse_color(dataset.background_color.at(0));
    chart
        .draw_series(dataset.data.iter().enumerate().map(|(i, &v)| {
            let x = i as f64;
            Rectangle::new([(x - 0.4, 0.0), (x + 0.4, v)], color.filled())
        }))
        .context("Failed to draw bars")?;

    Ok(())
}

/// Y range always includes zero, padded 5% past the largest magnitude
fn bar_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().cloned().fold(0.0, f64::min);
    let max = values.iter().cloned().fold(0.0, f64::max);
    if min == max {
        return (min, min + 1.0);
    }
    let padding = (max - min) * 0.05;
    let lower = if min < 0.0 { min - padding } else { min };
    (lower, max + padding)
}

fn truncate(label: &str) -> String {
    if label.chars().count() <= MAX_LABEL_CHARS {
        label.to_string()
    } else {
        let cut: String = label.chars().take(MAX_LABEL_CHARS - 1).collect();
        format!("{}…", cut)
    }
}

/// Parse `#RRGGBB` or a basic colour name to RGBColor
pub fn parse_color(color: &str) -> RGBColor {
    if let Some(hex) = color.strip_prefix('#') {
        if hex.len() == 6 {
            if let Ok(v) = u32::from_str_radix(hex, 16) {
                return RGBColor((v >> 16) as u8, (v >> 8) as u8, v as u8);
            }
        }
    }
    match color {
        "red" => RED,
        "green" => GREEN,
        "blue" => BLUE,
        "black" => BLACK,
        "yellow" => YELLOW,
        "cyan" => CYAN,
        "magenta" => MAGENTA,
        "white" => WHITE,
        _ => BLUE, // default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationResult;
    use crate::chart::{build_config, RendererOptions};

    const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

    fn result() -> AggregationResult {
        AggregationResult {
            labels: vec!["Residential".into(), "Commercial".into(), "N/A".into()],
            values: vec![5.0, 3.0, 1.0],
        }
    }

    fn small(format: OutputFormat) -> RenderOptions {
        RenderOptions {
            width: 320,
            height: 240,
            format,
        }
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#419400"), RGBColor(0x41, 0x94, 0x00));
        assert_eq!(parse_color("red"), RED);
        assert_eq!(parse_color("#zzzzzz"), BLUE);
        assert_eq!(parse_color("unknown"), BLUE);
    }

    #[test]
    fn test_bar_range() {
        assert_eq!(bar_range(&[]), (0.0, 1.0));
        assert_eq!(bar_range(&[0.0, 0.0]), (0.0, 1.0));
        let (lo, hi) = bar_range(&[10.0, 20.0]);
        assert_eq!(lo, 0.0);
        assert!((hi - 21.0).abs() < 1e-9);
        let (lo, _) = bar_range(&[-10.0, 10.0]);
        assert!(lo < -10.0);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short"), "short");
        let long = "a".repeat(40);
        assert_eq!(truncate(&long).chars().count(), MAX_LABEL_CHARS);
    }

    #[test]
    fn test_render_doughnut_png() {
        let config = build_config("zone", None, ChartType::Doughnut, result(), &RendererOptions::default());
        let bytes = render_chart(&config, &small(OutputFormat::Png)).unwrap();
        assert!(bytes.len() > 8);
        assert_eq!(&bytes[0..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_render_bar_png() {
        let config = build_config("zone", Some("area"), ChartType::Bar, result(), &RendererOptions::default());
        let bytes = render_chart(&config, &small(OutputFormat::Png)).unwrap();
        assert_eq!(&bytes[0..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_render_svg() {
        let config = build_config("zone", None, ChartType::Doughnut, result(), &RendererOptions::default());
        let bytes = render_chart(&config, &small(OutputFormat::Svg)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<svg"));
    }

    #[test]
    fn test_render_json() {
        let config = build_config("zone", None, ChartType::Doughnut, result(), &RendererOptions::default());
        let bytes = render_chart(&config, &small(OutputFormat::Json)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "doughnut");
    }

    #[test]
    fn test_render_empty_doughnut() {
        let config = build_config(
            "zone",
            None,
            ChartType::Doughnut,
            AggregationResult::default(),
            &RendererOptions::default(),
        );
        assert!(render_chart(&config, &small(OutputFormat::Png)).is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        let config = build_config("zone", None, ChartType::Doughnut, result(), &RendererOptions::default());
        let options = RenderOptions {
            width: 0,
            height: 100,
            format: OutputFormat::Png,
        };
        assert!(render_chart(&config, &options).is_err());
    }

    #[test]
    fn test_oversized_canvas_rejected() {
        let config = build_config("zone", None, ChartType::Doughnut, result(), &RendererOptions::default());
        for (width, height) in [(40000, 40000), (u32::MAX, u32::MAX), (8193, 8192)] {
            let png = RenderOptions {
                width,
                height,
                format: OutputFormat::Png,
            };
            assert!(render_chart(&config, &png).is_err());
            let svg = RenderOptions {
                format: OutputFormat::Svg,
                ..png
            };
            assert!(render_chart(&config, &svg).is_err());
        }
        assert_eq!(check_size(8192, 8192).unwrap(), MAX_PIXELS * 3);
    }
}
