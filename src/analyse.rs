use std::fs::{create_dir_all, write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::data::{write_xy, Trace};
use crate::detect::Settings;
use crate::error::{Error, Result};
use crate::lems::{clamp_simulation, quantity_path, states_file_name, ClampSettings};
use crate::neuroml::{read_channels, Channel};
use crate::report::{plot_kinetics, HtmlReport};
use crate::sim::{self, Engine};
use crate::sweep::{SweepScan, SweepSummary};

fn sim_error<T: Into<String>>(what: T) -> Error {
    Error::Sim { what: what.into() }
}

/// Everything one `analyse` invocation needs.
#[derive(Debug, Clone)]
pub struct Options {
    pub channel_files: Vec<String>,
    pub dir: PathBuf,
    pub clamp: ClampSettings,
    pub tolerance: f64,
    pub engine: Engine,
    pub no_run: bool,
    pub no_plot: bool,
    pub html: bool,
}

/// Analyse every channel in the given files: generate the voltage clamp
/// simulation, run it, detect each gate's kinetics per voltage, and write
/// curves, figures and the report. Channels without gates are skipped.
pub fn export(opts: &Options) -> Result<()> {
    let channels = read_channels(&opts.channel_files)?;
    if channels.is_empty() {
        warn!("No ion channels found in the given files");
        return Ok(());
    }
    create_dir_all(&opts.dir)?;
    let plot_dir = if opts.html {
        opts.dir.join("html")
    } else {
        opts.dir.clone()
    };
    if opts.html {
        create_dir_all(&plot_dir)?;
    }
    let mut report = HtmlReport::new();
    for channel in &channels {
        if channel.gates.is_empty() {
            warn!("No gates found in channel '{}', skipping", channel.id);
            continue;
        }
        let summary = match analyse_channel(channel, opts)? {
            Some(summary) => summary,
            None => continue,
        };
        for gate in summary.degenerate_gates() {
            warn!(
                "Initial slope for gate '{}' of channel '{}' is zero; consider a smaller timestep than {} ms",
                gate, channel.id, opts.clamp.dt
            );
        }
        write_summary(&summary, &opts.dir)?;
        if !opts.no_plot {
            plot_kinetics(&plot_dir, &summary)?;
        }
        if opts.html {
            report.add(&channel.id, &channel.file, channel.notes.as_deref());
        }
    }
    if opts.html && !report.is_empty() {
        report.write(&plot_dir)?;
    }
    Ok(())
}

/// Generate and run the clamp simulation for one channel, then reduce the
/// recordings to kinetics per gate and voltage. `None` when generation was
/// all that was asked for.
fn analyse_channel(channel: &Channel, opts: &Options) -> Result<Option<SweepSummary>> {
    let (lems, plan) = clamp_simulation(channel, &opts.clamp)?;
    let path = lems.write(&opts.dir)?;
    if opts.no_run {
        info!("Not running the generated file, as requested");
        return Ok(None);
    }
    let outputs = lems.outputs();
    let series = sim::run(opts.engine, &path, &outputs)?;
    let gates = channel.gate_ids();
    let settings =
        Settings::clamped_at(opts.clamp.clamp_delay, opts.clamp.dt).with_tolerance(opts.tolerance);
    // The clamp releases back to base here; the tail of the recording is a
    // different transient and must not reach the detectors.
    let release = opts.clamp.clamp_delay + opts.clamp.clamp_duration;
    let mut summary = SweepSummary::new(&channel.id, opts.clamp.temperature, &gates);
    for target in &plan {
        let file = states_file_name(&channel.id, &target.label);
        let recording = series
            .iter()
            .find(|s| s.file == file)
            .ok_or_else(|| sim_error(format!("No recording found for '{}'", file)))?;
        let traces = gates
            .iter()
            .map(|gate| {
                let quantity = quantity_path(&target.label, &channel.id, gate);
                let xs = recording.columns.get(&quantity).cloned().ok_or_else(|| {
                    sim_error(format!("Quantity '{}' missing from '{}'", quantity, file))
                })?;
                Ok(Trace::new(recording.t.clone(), xs)?
                    .scale_time(1000.0)
                    .clip(release))
            })
            .collect::<Result<Vec<_>>>()?;
        let scan = SweepScan::new(&gates, settings)?;
        let outcome = scan.run(&traces)?;
        if let Some(at) = outcome.stopped_at {
            debug!(
                "All gates of '{}' latched by {} ms at {} mV",
                channel.id, at, target.v
            );
        }
        for gate in &outcome.unsettled {
            warn!(
                "Gate '{}' of channel '{}' never settled at {} mV; taking the last sample before release as its steady state",
                gate, channel.id, target.v
            );
        }
        for (gate, kinetics) in &outcome.results {
            summary.record(target.v, gate, *kinetics)?;
        }
    }
    Ok(Some(summary))
}

/// The flat curve files plus the JSON record of the whole sweep.
fn write_summary(summary: &SweepSummary, dir: &Path) -> Result<()> {
    for gate in &summary.gates {
        let path = dir.join(format!("{}.{}.inf.dat", summary.channel, gate));
        write_xy(&path, &summary.inf_curve(gate))?;
        info!("Written steady states to {:?}", path);
        let path = dir.join(format!("{}.{}.tau.dat", summary.channel, gate));
        write_xy(&path, &summary.tau_curve(gate))?;
        info!("Written time courses to {:?}", path);
    }
    let json = serde_json::to_string_pretty(summary).map_err(|e| Error::Data {
        what: format!("Could not serialise kinetics of '{}': {}", summary.channel, e),
    })?;
    let path = dir.join(format!("{}.kinetics.json", summary.channel));
    write(&path, json)?;
    info!("Written kinetics to {:?}", path);
    Ok(())
}
