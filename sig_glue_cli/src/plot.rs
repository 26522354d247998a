use std::panic;
use std::path::Path;

use anyhow::Result;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use sig_glue::{GlueResult, Part, Sample};

pub enum ChartKind {
    Png,
    Svg,
}

/// Render the glued signal, catching backend panics so a broken font setup
/// never takes the CSV output down with it.
pub fn render_chart_guard(result: &GlueResult, path: &Path, kind: ChartKind) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_chart(result, path, kind).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_chart(result: &GlueResult, path: &Path, kind: ChartKind) -> Result<()> {
    let samples = &result.signal.samples;
    if samples.is_empty() {
        return Ok(());
    }

    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, (1280, 720)).into_drawing_area();
            draw_chart(root, result)?;
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, (1280, 720)).into_drawing_area();
            draw_chart(root, result)?;
        }
    }
    Ok(())
}

fn series_color(part: Part) -> RGBColor {
    match part {
        Part::Left => RGBColor(30, 144, 255),
        Part::Bridge => RGBColor(200, 0, 100),
        Part::Right => RGBColor(34, 139, 34),
    }
}

/// Samples of one part; the bridge borrows its neighbours so the line joins up.
fn part_points(result: &GlueResult, part: Part) -> &[Sample] {
    let samples = &result.signal.samples;
    let layout = &result.layout;
    let range = match part {
        Part::Left => layout.left.clone(),
        Part::Bridge => {
            layout.bridge.start.saturating_sub(1)..(layout.bridge.end + 1).min(samples.len())
        }
        Part::Right => layout.right.clone(),
    };
    &samples[range]
}

fn draw_chart<DB>(root: DrawingArea<DB, plotters::coord::Shift>, result: &GlueResult) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let samples = &result.signal.samples;
    let x_min = samples[0].t;
    let mut x_max = samples[samples.len() - 1].t;
    if x_max <= x_min {
        x_max = x_min + 1.0;
    }
    let y_lo = samples.iter().map(|s| s.value).fold(f64::INFINITY, f64::min);
    let y_hi = samples.iter().map(|s| s.value).fold(f64::NEG_INFINITY, f64::max);
    let pad = ((y_hi - y_lo) * 0.05).max(1e-3);

    root.fill(&WHITE)?;
    let caption_font = FontDesc::new(FontFamily::SansSerif, 24.0, FontStyle::Normal);
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Glued signal ({:?}, {:?} bridge)", result.classification.relation, result.bridge),
            caption_font,
        )
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_min..x_max, (y_lo - pad)..(y_hi + pad))?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .x_desc("t (s)")
        .y_desc("value")
        .x_label_formatter(&|v| format!("{:.2}", v))
        .y_label_formatter(&|v| format!("{:.2}", v))
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    for part in [Part::Left, Part::Bridge, Part::Right] {
        let points = part_points(result, part);
        if points.is_empty() {
            continue;
        }
        let color = series_color(part);
        let style = ShapeStyle {
            color: color.to_rgba(),
            filled: false,
            stroke_width: if part == Part::Bridge { 3 } else { 2 },
        };
        chart
            .draw_series(LineSeries::new(points.iter().map(|s| (s.t, s.value)), style))?
            .label(part.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));
    }

    let legend_font = FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal);
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(legend_font.color(&BLACK))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}
