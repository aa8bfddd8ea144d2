//! Software chart renderer backed by an RGBA canvas.
//!
//! Draws without fonts: the title band, grid, series and legend swatches are
//! shapes only. Rendering finishes inside `mount`, so `ready` resolves at once.

use image::{ImageEncoder as _, Rgba, RgbaImage};

use super::RenderTarget;
use crate::client::{ClientError, ClientResult};
use crate::config::RasterConfig;
use crate::models::{ChartDescriptor, ChartKind};

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TITLE_BAND: Rgba<u8> = Rgba([241, 243, 245, 255]);
const GRID: Rgba<u8> = Rgba([226, 229, 233, 255]);
const AXIS: Rgba<u8> = Rgba([102, 102, 102, 255]);
const FALLBACK_SERIES: Rgba<u8> = Rgba([136, 132, 216, 255]);

const GRID_LINES: u32 = 5;
const TITLE_HEIGHT: u32 = 36;
const LEGEND_HEIGHT: u32 = 28;
const SWATCH: u32 = 12;

/// Renders charts in-process with the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct CanvasTarget {
    width: u32,
    height: u32,
}

impl CanvasTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(64),
            height: height.max(64),
        }
    }

    pub fn from_config(config: &RasterConfig) -> Self {
        Self::new(config.width, config.height)
    }

    /// Draws `chart` into a fresh canvas.
    ///
    /// # Errors
    /// Returns a `Capture` error when the chart has no plottable values.
    pub fn render(&self, chart: &ChartDescriptor) -> ClientResult<RgbaImage> {
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BACKGROUND);
        let options = chart.options();
        let series = Series::collect(chart);
        if series.is_empty() {
            return Err(ClientError::capture(format!(
                "chart '{}' has no numeric values",
                chart.title
            )));
        }

        fill_rect(&mut canvas, 0, 0, self.width, TITLE_HEIGHT, TITLE_BAND);

        let legend_height = if options.legend { LEGEND_HEIGHT } else { 0 };
        let plot = Plot {
            left: 56,
            top: TITLE_HEIGHT + 16,
            right: self.width.saturating_sub(24),
            bottom: self.height.saturating_sub(28 + legend_height),
        };

        if chart.chart_type == ChartKind::Pie {
            draw_pie(&mut canvas, chart, &series, &plot);
        } else {
            if options.grid {
                draw_grid(&mut canvas, &plot);
            }
            draw_axes(&mut canvas, &plot);
            let scale = Scale::fit(&series);
            match chart.chart_type {
                ChartKind::Bar => draw_bars(&mut canvas, chart, &series, &plot, &scale),
                ChartKind::Line => draw_lines(&mut canvas, chart, &series, &plot, &scale, false),
                ChartKind::Area => draw_lines(&mut canvas, chart, &series, &plot, &scale, true),
                ChartKind::Scatter => draw_points(&mut canvas, chart, &series, &plot, &scale),
                ChartKind::Pie => {}
            }
        }

        if options.legend {
            let entries = if chart.chart_type == ChartKind::Pie {
                series.first().map_or(0, |s| s.values.len())
            } else {
                series.len()
            };
            draw_legend(&mut canvas, chart, entries, self.height - legend_height + 8);
        }

        Ok(canvas)
    }
}

impl Default for CanvasTarget {
    fn default() -> Self {
        Self::from_config(&RasterConfig::default())
    }
}

impl RenderTarget for CanvasTarget {
    type Mounted = RgbaImage;

    fn mount(&self, chart: &ChartDescriptor) -> ClientResult<RgbaImage> {
        self.render(chart)
    }

    async fn capture(&self, mounted: &RgbaImage) -> ClientResult<Vec<u8>> {
        encode_png_fast(mounted)
    }

    fn unmount(&self, mounted: RgbaImage) {
        drop(mounted);
    }

    async fn ready(&self) {}
}

fn encode_png_fast(img: &RgbaImage) -> ClientResult<Vec<u8>> {
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};

    let mut buf = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, FilterType::Adaptive);
    encoder
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| ClientError::capture(format!("png encode: {e}")))?;
    Ok(buf)
}

/// One y-axis key's values, aligned with the chart's records.
struct Series {
    values: Vec<Option<f64>>,
}

impl Series {
    /// Series that have at least one value; all-empty charts yield none.
    fn collect(chart: &ChartDescriptor) -> Vec<Series> {
        let series: Vec<Series> = chart
            .y_axis_keys
            .iter()
            .map(|key| Series {
                values: chart
                    .data
                    .iter()
                    .map(|record| ChartDescriptor::value(record, key))
                    .collect(),
            })
            .collect();
        if series.iter().all(|s| s.values.iter().all(Option::is_none)) {
            return Vec::new();
        }
        series
    }
}

#[derive(Debug, Clone, Copy)]
struct Plot {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl Plot {
    fn width(&self) -> f64 {
        f64::from(self.right.saturating_sub(self.left))
    }

    fn height(&self) -> f64 {
        f64::from(self.bottom.saturating_sub(self.top))
    }

    /// Center x of slot `index` out of `slots`.
    fn slot_x(&self, index: usize, slots: usize) -> f64 {
        let step = self.width() / slots.max(1) as f64;
        f64::from(self.left) + step * (index as f64 + 0.5)
    }
}

/// Maps values onto the plot's vertical range. Always includes zero.
struct Scale {
    min: f64,
    max: f64,
}

impl Scale {
    fn fit(series: &[Series]) -> Self {
        let values = series.iter().flat_map(|s| s.values.iter().flatten().copied());
        let (min, max) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let max = if (max - min).abs() < f64::EPSILON {
            min + 1.0
        } else {
            max
        };
        Self { min, max }
    }

    fn y(&self, value: f64, plot: &Plot) -> f64 {
        let t = (value - self.min) / (self.max - self.min);
        f64::from(plot.bottom) - t * plot.height()
    }
}

fn parse_color(hex: &str) -> Rgba<u8> {
    let digits = hex.trim().trim_start_matches('#');
    if !digits.is_ascii() {
        return FALLBACK_SERIES;
    }
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return FALLBACK_SERIES,
    };
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => Rgba([r, g, b, 255]),
        _ => FALLBACK_SERIES,
    }
}

fn with_alpha(color: Rgba<u8>, alpha: u8) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], alpha])
}

fn blend(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
        return;
    };
    if x >= canvas.width() || y >= canvas.height() {
        return;
    }
    let alpha = u16::from(color[3]);
    let pixel = canvas.get_pixel_mut(x, y);
    for c in 0..3 {
        let mixed = (u16::from(color[c]) * alpha + u16::from(pixel[c]) * (255 - alpha)) / 255;
        pixel[c] = mixed as u8;
    }
    pixel[3] = 255;
}

fn fill_rect(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    for py in y..y.saturating_add(h).min(canvas.height()) {
        for px in x..x.saturating_add(w).min(canvas.width()) {
            blend(canvas, i64::from(px), i64::from(py), color);
        }
    }
}

/// Bresenham line, `thickness` pixels wide.
fn draw_line(
    canvas: &mut RgbaImage,
    from: (f64, f64),
    to: (f64, f64),
    color: Rgba<u8>,
    thickness: i64,
) {
    let (mut x0, mut y0) = (from.0.round() as i64, from.1.round() as i64);
    let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let half = thickness / 2;
    loop {
        for oy in -half..=half {
            for ox in -half..=half {
                blend(canvas, x0 + ox, y0 + oy, color);
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_grid(canvas: &mut RgbaImage, plot: &Plot) {
    for i in 0..=GRID_LINES {
        let y = f64::from(plot.top) + plot.height() * f64::from(i) / f64::from(GRID_LINES);
        draw_line(
            canvas,
            (f64::from(plot.left), y),
            (f64::from(plot.right), y),
            GRID,
            1,
        );
    }
}

fn draw_axes(canvas: &mut RgbaImage, plot: &Plot) {
    let (left, top) = (f64::from(plot.left), f64::from(plot.top));
    let (right, bottom) = (f64::from(plot.right), f64::from(plot.bottom));
    draw_line(canvas, (left, top), (left, bottom), AXIS, 1);
    draw_line(canvas, (left, bottom), (right, bottom), AXIS, 1);
}

fn draw_bars(
    canvas: &mut RgbaImage,
    chart: &ChartDescriptor,
    series: &[Series],
    plot: &Plot,
    scale: &Scale,
) {
    let groups = chart.data.len();
    if groups == 0 {
        return;
    }
    let group_width = plot.width() / groups as f64;
    let bar_width = (group_width * 0.8 / series.len() as f64).max(1.0);
    let baseline = scale.y(0.0, plot);

    for (s, line) in series.iter().enumerate() {
        let color = parse_color(chart.series_color(s));
        for (g, value) in line.values.iter().enumerate() {
            let Some(value) = value else { continue };
            let x = f64::from(plot.left) + group_width * (g as f64 + 0.1) + bar_width * s as f64;
            let y = scale.y(*value, plot);
            let (top, bottom) = if y < baseline { (y, baseline) } else { (baseline, y) };
            fill_rect(
                canvas,
                x.round() as u32,
                top.round() as u32,
                bar_width.round().max(1.0) as u32,
                (bottom - top).round().max(1.0) as u32,
                color,
            );
        }
    }
}

fn series_points(line: &Series, plot: &Plot, scale: &Scale) -> Vec<(f64, f64)> {
    let slots = line.values.len();
    line.values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (plot.slot_x(i, slots), scale.y(v, plot))))
        .collect()
}

fn draw_lines(
    canvas: &mut RgbaImage,
    chart: &ChartDescriptor,
    series: &[Series],
    plot: &Plot,
    scale: &Scale,
    filled: bool,
) {
    let baseline = scale.y(0.0, plot);
    for (s, line) in series.iter().enumerate() {
        let color = parse_color(chart.series_color(s));
        let points = series_points(line, plot, scale);

        if filled {
            let fill = with_alpha(color, 96);
            for pair in points.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let (x_start, x_end) = (a.0.round() as i64, b.0.round() as i64);
                for x in x_start..x_end {
                    let t = (x as f64 - a.0) / (b.0 - a.0);
                    let y = a.1 + (b.1 - a.1) * t;
                    let (from, to) = if y < baseline { (y, baseline) } else { (baseline, y) };
                    for py in from.round() as i64..to.round() as i64 {
                        blend(canvas, x, py, fill);
                    }
                }
            }
        }

        for pair in points.windows(2) {
            draw_line(canvas, pair[0], pair[1], color, 3);
        }
        for point in &points {
            draw_marker(canvas, *point, color);
        }
    }
}

fn draw_points(
    canvas: &mut RgbaImage,
    chart: &ChartDescriptor,
    series: &[Series],
    plot: &Plot,
    scale: &Scale,
) {
    for (s, line) in series.iter().enumerate() {
        let color = parse_color(chart.series_color(s));
        for point in series_points(line, plot, scale) {
            draw_marker(canvas, point, color);
        }
    }
}

fn draw_marker(canvas: &mut RgbaImage, (x, y): (f64, f64), color: Rgba<u8>) {
    let (cx, cy) = (x.round() as i64, y.round() as i64);
    for oy in -3..=3_i64 {
        for ox in -3..=3_i64 {
            if ox * ox + oy * oy <= 9 {
                blend(canvas, cx + ox, cy + oy, color);
            }
        }
    }
}

/// Pie of the first series; one slice per record, palette cycling per slice.
fn draw_pie(canvas: &mut RgbaImage, chart: &ChartDescriptor, series: &[Series], plot: &Plot) {
    let Some(first) = series.first() else {
        return;
    };
    let values: Vec<f64> = first
        .values
        .iter()
        .map(|v| v.unwrap_or(0.0).max(0.0))
        .collect();
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return;
    }

    let mut bounds = Vec::with_capacity(values.len());
    let mut acc = 0.0;
    for value in &values {
        acc += value / total;
        bounds.push(acc);
    }

    let cx = f64::from(plot.left) + plot.width() / 2.0;
    let cy = f64::from(plot.top) + plot.height() / 2.0;
    let radius = plot.width().min(plot.height()) / 2.0;
    let (x_min, x_max) = ((cx - radius).floor() as i64, (cx + radius).ceil() as i64);
    let (y_min, y_max) = ((cy - radius).floor() as i64, (cy + radius).ceil() as i64);

    for py in y_min..=y_max {
        for px in x_min..=x_max {
            let (dx, dy) = (px as f64 - cx, py as f64 - cy);
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            // Clockwise from twelve o'clock, in turns.
            let turn = (dx.atan2(-dy) / std::f64::consts::TAU).rem_euclid(1.0);
            let slice = bounds.iter().position(|b| turn < *b).unwrap_or(values.len() - 1);
            blend(canvas, px, py, parse_color(chart.series_color(slice)));
        }
    }
}

fn draw_legend(canvas: &mut RgbaImage, chart: &ChartDescriptor, entries: usize, y: u32) {
    let spacing = SWATCH * 3;
    let total = spacing * entries as u32;
    let start = canvas.width().saturating_sub(total) / 2;
    for i in 0..entries {
        let x = start + spacing * i as u32;
        fill_rect(canvas, x, y, SWATCH, SWATCH, parse_color(chart.series_color(i)));
    }
}
