use std::fs::write;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::sweep::SweepSummary;

fn plot_error<T: Into<String>>(what: T) -> Error {
    Error::Plot { what: what.into() }
}

/// Conventional colours for gating variables, activation in red, the rest
/// by customary letter.
pub fn state_color(gate: &str) -> RGBColor {
    match gate.chars().next() {
        Some('m') | Some('a') => RED,
        Some('h') | Some('b') => GREEN,
        Some('n') | Some('c') => BLUE,
        Some('q') => MAGENTA,
        _ => BLACK,
    }
}

fn pad_range(lo: f64, hi: f64) -> (f64, f64) {
    if lo == hi {
        (lo - 1.0, hi + 1.0)
    } else {
        let pad = 0.05 * (hi - lo);
        (lo - pad, hi + pad)
    }
}

/// Draw labelled curves into a PNG. Empty series are dropped from the
/// legend; if nothing is left the figure is skipped with a warning.
pub fn plot_curves(
    path: &Path,
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[(String, RGBColor, Vec<(f64, f64)>)],
) -> Result<()> {
    let series = series
        .iter()
        .filter(|(_, _, points)| !points.is_empty())
        .collect::<Vec<_>>();
    if series.is_empty() {
        warn!("Nothing to plot for {:?}, skipping figure", path);
        return Ok(());
    }
    draw_curves(path, title, x_label, y_label, &series)
        .map_err(|e| plot_error(format!("Could not plot {:?}: {}", path, e)))?;
    info!("Written figure to {:?}", path);
    Ok(())
}

fn draw_curves(
    path: &Path,
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[&(String, RGBColor, Vec<(f64, f64)>)],
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for (_, _, points) in series {
        for (x, y) in points {
            x_min = x_min.min(*x);
            x_max = x_max.max(*x);
            y_min = y_min.min(*y);
            y_max = y_max.max(*y);
        }
    }
    let (x_min, x_max) = pad_range(x_min, x_max);
    let (y_min, y_max) = pad_range(y_min, y_max);

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()?;
    for (label, color, points) in series {
        let color = *color;
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color))?
            .label(label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        chart.draw_series(
            points
                .iter()
                .map(|(x, y)| Circle::new((*x, *y), 3, color.filled())),
        )?;
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// The two summary figures for one channel, steady state and time course
/// against voltage. Returns the paths actually written.
pub fn plot_kinetics(dir: &Path, summary: &SweepSummary) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let inf = summary
        .gates
        .iter()
        .map(|gate| {
            (
                format!("{} {} inf", summary.channel, gate),
                state_color(gate),
                summary.inf_curve(gate),
            )
        })
        .collect::<Vec<_>>();
    let path = dir.join(format!("{}.inf.png", summary.channel));
    plot_curves(
        &path,
        &format!(
            "Steady state(s) of activation variables of {} at {} degC",
            summary.channel, summary.temperature
        ),
        "Membrane potential (mV)",
        "Steady state - inf",
        &inf,
    )?;
    if path.is_file() {
        written.push(path);
    }
    let tau = summary
        .gates
        .iter()
        .map(|gate| {
            (
                format!("{} {} tau", summary.channel, gate),
                state_color(gate),
                summary.tau_curve(gate),
            )
        })
        .collect::<Vec<_>>();
    let path = dir.join(format!("{}.tau.png", summary.channel));
    plot_curves(
        &path,
        &format!(
            "Time course(s) of activation variables of {} at {} degC",
            summary.channel, summary.temperature
        ),
        "Membrane potential (mV)",
        "Time course - tau (ms)",
        &tau,
    )?;
    if path.is_file() {
        written.push(path);
    }
    Ok(written)
}

/// One channel's entry on the HTML overview page.
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlEntry {
    pub id: String,
    pub file: String,
    pub notes: Option<String>,
}

/// Accumulates analysed channels and renders the overview page with the
/// embedded figures.
#[derive(Debug, Clone, Default)]
pub struct HtmlReport {
    channels: Vec<HtmlEntry>,
}

impl HtmlReport {
    pub fn new() -> Self {
        HtmlReport {
            channels: Vec::new(),
        }
    }

    pub fn add(&mut self, id: &str, file: &str, notes: Option<&str>) {
        self.channels.push(HtmlEntry {
            id: id.to_string(),
            file: file.to_string(),
            notes: notes.map(|n| n.to_string()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn render(&self) -> String {
        let mut body = String::new();
        for channel in &self.channels {
            let notes = match &channel.notes {
                Some(notes) => format!("    <p class=\"notes\">{}</p>\n", notes),
                None => String::new(),
            };
            body.push_str(&format!(
                r#"  <div class="channel">
    <h2>{id}</h2>
    <p class="file">Defined in: {file}</p>
{notes}    <img src="{id}.inf.png" alt="{id} steady state"/>
    <img src="{id}.tau.png" alt="{id} time course"/>
  </div>
"#,
                id = channel.id,
                file = channel.file,
                notes = notes
            ));
        }
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <title>Channel information</title>
  <style>
    body {{ font-family: sans-serif; margin: 2em; }}
    .channel {{ border-top: 1px solid #ccc; padding: 1em 0; }}
    .file {{ color: #555; font-size: small; }}
    .notes {{ font-style: italic; }}
    img {{ max-width: 48%; }}
  </style>
</head>
<body>
  <h1>Channel information</h1>
{body}</body>
</html>
"#,
            body = body
        )
    }

    /// Write `ChannelInfo.html` under `dir`, next to the figures.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join("ChannelInfo.html");
        write(&path, self.render())?;
        info!("Written channel report to {:?}", path);
        Ok(path)
    }
}
