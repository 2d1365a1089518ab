use std::fs::create_dir_all;
use std::path::PathBuf;

use plotters::prelude::BLACK;
use tracing::info;

use crate::data::{write_xy, Trace};
use crate::error::{Error, Result};
use crate::lems::{colour_hex, LemsSimulation};
use crate::report::plot_curves;
use crate::sim::{self, Engine};

fn if_error<T: Into<String>>(what: T) -> Error {
    Error::Lems { what: what.into() }
}

/// Membrane potential counts as a spike when it crosses this, in mV.
pub const SPIKE_THRESHOLD: f64 = 0.0;

/// Current injection sweep over one cell.
#[derive(Debug, Clone)]
pub struct IfOptions {
    pub cell_file: String,
    pub cell_id: String,
    /// Injection grid in nA, inclusive.
    pub start_amp: f64,
    pub end_amp: f64,
    pub step_amp: f64,
    /// Settling time before spikes are counted, ms.
    pub delay: f64,
    /// Length of the counting window, ms.
    pub duration: f64,
    pub dt: f64,
    pub temperature: f64,
    pub dir: PathBuf,
    pub engine: Engine,
    pub no_run: bool,
    pub no_plot: bool,
}

/// The inclusive amplitude grid, computed by index so step rounding cannot
/// drop the last point.
pub fn amplitudes(start: f64, end: f64, step: f64) -> Result<Vec<f64>> {
    if !(step > 0.0) {
        return Err(if_error(format!(
            "Amplitude step must be positive, got {}",
            step
        )));
    }
    if end < start {
        return Err(if_error(format!(
            "Amplitude range is empty: {} nA to {} nA",
            start, end
        )));
    }
    let mut amps = Vec::new();
    let mut ix = 0;
    loop {
        let amp = start + ix as f64 * step;
        if amp > end + 1e-9 {
            break;
        }
        amps.push(amp);
        ix += 1;
    }
    Ok(amps)
}

/// Short decimal form for ids and attributes, `0.030000000000000002`
/// becomes `0.03`.
fn amp_str(amp: f64) -> String {
    let s = format!("{:.6}", amp);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

fn input_id(amp: f64) -> String {
    format!("input_{}nA", amp_str(amp))
        .replace('.', "_")
        .replace('-', "min")
}

/// Upward crossings of `threshold` within `[window.0, window.1)`.
pub fn count_spikes(t: &[f64], v: &[f64], threshold: f64, window: (f64, f64)) -> usize {
    let mut count = 0;
    for ix in 1..t.len().min(v.len()) {
        if v[ix - 1] < threshold
            && v[ix] >= threshold
            && t[ix] >= window.0
            && t[ix] < window.1
        {
            count += 1;
        }
    }
    count
}

fn stimulus_network(opts: &IfOptions, amps: &[f64], length: f64) -> String {
    let population = format!("population_of_{}", opts.cell_id);
    let mut result = Vec::new();
    for amp in amps {
        result.push(format!(
            "<pulseGenerator id=\"{}\" delay=\"0ms\" duration=\"{}ms\" amplitude=\"{}nA\"/>",
            input_id(*amp),
            length,
            amp_str(*amp)
        ));
    }
    result.push(format!(
        "<network id=\"network_of_{}\" type=\"networkWithTemperature\" temperature=\"{}degC\">",
        opts.cell_id, opts.temperature
    ));
    result.push(format!(
        "    <population id=\"{}\" component=\"{}\" size=\"{}\"/>",
        population,
        opts.cell_id,
        amps.len()
    ));
    for (ix, amp) in amps.iter().enumerate() {
        result.push(format!(
            "    <explicitInput target=\"{}[{}]\" input=\"{}\"/>",
            population,
            ix,
            input_id(*amp)
        ));
    }
    result.push(String::from("</network>"));
    result.join("\n")
}

/// Run one cell through the amplitude grid and reduce every trace to a
/// firing frequency. Writes `<cell>.if.dat` and, unless suppressed, the
/// matching figure.
pub fn export_if_curve(opts: &IfOptions) -> Result<()> {
    std::fs::metadata(&opts.cell_file)?;
    let amps = amplitudes(opts.start_amp, opts.end_amp, opts.step_amp)?;
    let length = opts.delay + opts.duration;
    let population = format!("population_of_{}", opts.cell_id);

    let mut lems = LemsSimulation::new(
        &format!("iv_{}", opts.cell_id),
        length,
        opts.dt,
        &format!("network_of_{}", opts.cell_id),
    );
    lems.include_file(&opts.cell_file);
    lems.add_component(&stimulus_network(opts, &amps, length));
    let display = "Voltage_display";
    lems.create_display(display, "Voltages", "-90", "50");
    let output = "Volts_file";
    lems.create_output_file(output, &format!("iv_{}.v.dat", opts.cell_id));
    let n = amps.len();
    for ix in 0..n {
        let fract = if n > 1 { ix as f64 / (n - 1) as f64 } else { 1.0 };
        let quantity = format!("{}[{}]/v", population, ix);
        lems.add_line(
            display,
            &format!("v_cell{}", ix),
            &quantity,
            "1mV",
            &colour_hex(fract),
        )?;
        lems.add_column(output, &format!("v_cell{}", ix), &quantity)?;
    }

    create_dir_all(&opts.dir)?;
    let path = lems.write(&opts.dir)?;
    if opts.no_run {
        info!("Not running the generated file, as requested");
        return Ok(());
    }

    let outputs = lems.outputs();
    let series = sim::run(opts.engine, &path, &outputs)?;
    let recording = series
        .first()
        .ok_or_else(|| if_error("No recording came back from the simulation"))?;
    let window = (opts.delay, opts.delay + opts.duration);
    let mut curve = Vec::new();
    for (ix, amp) in amps.iter().enumerate() {
        let quantity = format!("{}[{}]/v", population, ix);
        let v = recording.columns.get(&quantity).ok_or_else(|| {
            if_error(format!("Quantity '{}' missing from the recording", quantity))
        })?;
        // Recordings come back in SI units, the spike window is ms over mV.
        let mv = v.iter().map(|v| v * 1000.0).collect::<Vec<_>>();
        let trace = Trace::new(recording.t.clone(), mv)?.scale_time(1000.0);
        let spikes = count_spikes(&trace.t, &trace.x, SPIKE_THRESHOLD, window);
        let freq = 1000.0 * spikes as f64 / opts.duration;
        curve.push((*amp, freq));
    }

    let dat = opts.dir.join(format!("{}.if.dat", opts.cell_id));
    write_xy(&dat, &curve)?;
    info!("Written IF curve to {:?}", dat);
    if !opts.no_plot {
        let png = opts.dir.join(format!("{}.if.png", opts.cell_id));
        plot_curves(
            &png,
            &format!(
                "Firing frequency of {} at {} degC",
                opts.cell_id, opts.temperature
            ),
            "Current injection (nA)",
            "Firing frequency (Hz)",
            &[(opts.cell_id.clone(), BLACK, curve)],
        )?;
    }
    Ok(())
}
