use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Level;

use nmlchan::analyse;
use nmlchan::ifcurve;
use nmlchan::lems::ClampSettings;
use nmlchan::sim::Engine;

#[derive(Parser)]
#[clap(name = "nmlchan", version)]
#[clap(about = "Voltage clamp analysis of NeuroML2 ion channels")]
struct Cli {
    /// Verbosity, repeat for more detail
    #[clap(short, long, parse(from_occurrences), global = true)]
    verbose: usize,
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generate, run and reduce a voltage clamp protocol per channel
    Analyse {
        /// NeuroML2 file(s) defining the channels to test
        #[clap(required = true)]
        channel_files: Vec<String>,
        /// Minimum voltage to test, mV
        #[clap(long, default_value_t = -100, allow_hyphen_values = true)]
        min_v: i64,
        /// Maximum voltage to test, mV
        #[clap(long, default_value_t = 100, allow_hyphen_values = true)]
        max_v: i64,
        /// Voltage increment between clamps, mV
        #[clap(long, default_value_t = 20)]
        step_v: i64,
        /// Temperature of the simulated bath, degC
        #[clap(long, default_value_t = 6.3)]
        temperature: f64,
        /// Total simulated time, ms
        #[clap(long, default_value_t = 100.0)]
        duration: f64,
        /// Time before the clamp steps to its target, ms
        #[clap(long, default_value_t = 10.0)]
        clamp_delay: f64,
        /// How long the clamp holds its target, ms
        #[clap(long, default_value_t = 80.0)]
        clamp_duration: f64,
        /// Holding voltage before and after the step, mV
        #[clap(long, default_value_t = -70.0, allow_hyphen_values = true)]
        clamp_base_voltage: f64,
        /// Reversal potential of the channel, mV
        #[clap(long, default_value_t = 0.0, allow_hyphen_values = true)]
        erev: f64,
        /// Internal calcium concentration, mM
        #[clap(long, default_value_t = 5e-5)]
        ca_conc: f64,
        /// Simulation timestep, ms
        #[clap(long, default_value_t = 0.01)]
        dt: f64,
        /// Relative tolerance for steady state detection
        #[clap(long, default_value_t = 1e-5)]
        tolerance: f64,
        /// Simulator backend, 'jneuroml' or 'jneuroml-neuron'
        #[clap(long, default_value = "jneuroml")]
        engine: Engine,
        /// Directory the generated and recorded files go to
        #[clap(long, default_value = ".")]
        dir: PathBuf,
        /// Only generate the LEMS file, do not run it
        #[clap(long)]
        no_run: bool,
        /// Skip the summary figures
        #[clap(long)]
        no_plot: bool,
        /// Write an HTML overview page with the figures
        #[clap(long)]
        html: bool,
    },
    /// Map injected current to firing frequency for a cell
    IfCurve {
        /// NeuroML2 file defining the cell
        cell_file: String,
        /// Id of the cell component to drive
        cell_id: String,
        /// Smallest injection, nA
        #[clap(long, default_value_t = 0.01, allow_hyphen_values = true)]
        start_amp: f64,
        /// Largest injection, nA
        #[clap(long, default_value_t = 0.2, allow_hyphen_values = true)]
        end_amp: f64,
        /// Injection increment, nA
        #[clap(long, default_value_t = 0.01)]
        step_amp: f64,
        /// Settling time before spikes are counted, ms
        #[clap(long, default_value_t = 50.0)]
        delay: f64,
        /// Length of the counting window, ms
        #[clap(long, default_value_t = 1000.0)]
        duration: f64,
        /// Simulation timestep, ms
        #[clap(long, default_value_t = 0.05)]
        dt: f64,
        /// Temperature of the simulated bath, degC
        #[clap(long, default_value_t = 32.0)]
        temperature: f64,
        /// Simulator backend, 'jneuroml' or 'jneuroml-neuron'
        #[clap(long, default_value = "jneuroml")]
        engine: Engine,
        /// Directory the generated and recorded files go to
        #[clap(long, default_value = ".")]
        dir: PathBuf,
        /// Only generate the LEMS file, do not run it
        #[clap(long)]
        no_run: bool,
        /// Skip the IF curve figure
        #[clap(long)]
        no_plot: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    match cli.cmd {
        Cmd::Analyse {
            channel_files,
            min_v,
            max_v,
            step_v,
            temperature,
            duration,
            clamp_delay,
            clamp_duration,
            clamp_base_voltage,
            erev,
            ca_conc,
            dt,
            tolerance,
            engine,
            dir,
            no_run,
            no_plot,
            html,
        } => {
            let opts = analyse::Options {
                channel_files,
                dir,
                clamp: ClampSettings {
                    min_v,
                    max_v,
                    step_v,
                    clamp_delay,
                    clamp_duration,
                    clamp_base: clamp_base_voltage,
                    duration,
                    dt,
                    erev,
                    temperature,
                    ca_conc,
                },
                tolerance,
                engine,
                no_run,
                no_plot,
                html,
            };
            analyse::export(&opts).context("Failed to analyse channels")?;
        }
        Cmd::IfCurve {
            cell_file,
            cell_id,
            start_amp,
            end_amp,
            step_amp,
            delay,
            duration,
            dt,
            temperature,
            engine,
            dir,
            no_run,
            no_plot,
        } => {
            let opts = ifcurve::IfOptions {
                cell_file,
                cell_id,
                start_amp,
                end_amp,
                step_amp,
                delay,
                duration,
                dt,
                temperature,
                dir,
                engine,
                no_run,
                no_plot,
            };
            ifcurve::export_if_curve(&opts).context("Failed to build the IF curve")?;
        }
    }
    Ok(())
}
