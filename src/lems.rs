use std::fs::write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::neuroml::Channel;

fn lems_error<T: Into<String>>(what: T) -> Error {
    Error::Lems { what: what.into() }
}

/// Core type definitions every generated simulation pulls in.
pub const STANDARD_INCLUDES: [&str; 3] = ["Cells.xml", "Networks.xml", "Simulation.xml"];

/// Colour ramp endpoints for the voltage grid, yellow up to red.
const MIN_COLOUR: (f64, f64, f64) = (255.0, 255.0, 0.0);
const MAX_COLOUR: (f64, f64, f64) = (255.0, 0.0, 0.0);

#[derive(Debug, Clone, PartialEq)]
struct Line {
    id: String,
    quantity: String,
    scale: String,
    color: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Display {
    id: String,
    title: String,
    ymin: String,
    ymax: String,
    lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq)]
struct OutputFile {
    id: String,
    file_name: String,
    columns: Vec<(String, String)>,
}

/// Declared recording of one LEMS OutputFile: the file the simulator will
/// write and the quantity paths of its columns, time excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub file: String,
    pub quantities: Vec<String>,
}

/// Builder for a LEMS simulation file. Components are collected as XML
/// fragments and spliced between the includes and the Simulation element.
#[derive(Debug, Clone)]
pub struct LemsSimulation {
    sim_id: String,
    duration: f64,
    dt: f64,
    target: String,
    comment: String,
    includes: Vec<String>,
    components: Vec<String>,
    displays: Vec<Display>,
    output_files: Vec<OutputFile>,
}

impl LemsSimulation {
    pub fn new(sim_id: &str, duration: f64, dt: f64, target: &str) -> Self {
        LemsSimulation {
            sim_id: sim_id.to_string(),
            duration,
            dt,
            target: target.to_string(),
            comment: format!(
                "This LEMS file has been generated by {} v{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
            includes: Vec::new(),
            components: Vec::new(),
            displays: Vec::new(),
            output_files: Vec::new(),
        }
    }

    pub fn include_file(&mut self, file: &str) {
        let file = file.to_string();
        if !self.includes.contains(&file) {
            self.includes.push(file);
        }
    }

    pub fn add_component(&mut self, xml: &str) {
        self.components.push(xml.trim_end().to_string());
    }

    pub fn create_display(&mut self, id: &str, title: &str, ymin: &str, ymax: &str) {
        self.displays.push(Display {
            id: id.to_string(),
            title: title.to_string(),
            ymin: ymin.to_string(),
            ymax: ymax.to_string(),
            lines: Vec::new(),
        });
    }

    pub fn add_line(
        &mut self,
        display_id: &str,
        line_id: &str,
        quantity: &str,
        scale: &str,
        color: &str,
    ) -> Result<()> {
        let display = self
            .displays
            .iter_mut()
            .find(|d| d.id == display_id)
            .ok_or_else(|| lems_error(format!("No display with id '{}'", display_id)))?;
        display.lines.push(Line {
            id: line_id.to_string(),
            quantity: quantity.to_string(),
            scale: scale.to_string(),
            color: color.to_string(),
        });
        Ok(())
    }

    pub fn create_output_file(&mut self, id: &str, file_name: &str) {
        self.output_files.push(OutputFile {
            id: id.to_string(),
            file_name: file_name.to_string(),
            columns: Vec::new(),
        });
    }

    pub fn add_column(&mut self, output_file_id: &str, column_id: &str, quantity: &str) -> Result<()> {
        let output = self
            .output_files
            .iter_mut()
            .find(|o| o.id == output_file_id)
            .ok_or_else(|| lems_error(format!("No output file with id '{}'", output_file_id)))?;
        output
            .columns
            .push((column_id.to_string(), quantity.to_string()));
        Ok(())
    }

    /// The recordings this simulation will produce, for the runner to pick
    /// up afterwards.
    pub fn outputs(&self) -> Vec<Output> {
        self.output_files
            .iter()
            .map(|of| Output {
                file: of.file_name.clone(),
                quantities: of.columns.iter().map(|(_, q)| q.clone()).collect(),
            })
            .collect()
    }

    pub fn to_xml(&self) -> String {
        let mut result = Vec::new();
        result.push(String::from("<Lems>"));
        result.push(String::new());
        result.push(format!("<!-- {} -->", self.comment));
        result.push(String::new());
        result.push(format!("<Target component=\"{}\"/>", self.sim_id));
        result.push(String::new());
        for include in STANDARD_INCLUDES {
            result.push(format!("<Include file=\"{}\"/>", include));
        }
        for include in &self.includes {
            result.push(format!("<Include file=\"{}\"/>", include));
        }
        for component in &self.components {
            result.push(String::new());
            result.push(component.clone());
        }
        result.push(String::new());
        result.push(format!(
            "<Simulation id=\"{}\" length=\"{}ms\" step=\"{}ms\" target=\"{}\">",
            self.sim_id, self.duration, self.dt, self.target
        ));
        for display in &self.displays {
            result.push(String::new());
            result.push(format!(
                "  <Display id=\"{}\" title=\"{}\" timeScale=\"1ms\" xmin=\"0\" xmax=\"{}\" ymin=\"{}\" ymax=\"{}\">",
                display.id, display.title, self.duration, display.ymin, display.ymax
            ));
            for line in &display.lines {
                result.push(format!(
                    "    <Line id=\"{}\" quantity=\"{}\" scale=\"{}\" color=\"{}\" timeScale=\"1ms\"/>",
                    line.id, line.quantity, line.scale, line.color
                ));
            }
            result.push(String::from("  </Display>"));
        }
        for output in &self.output_files {
            result.push(String::new());
            result.push(format!(
                "  <OutputFile id=\"{}\" fileName=\"{}\">",
                output.id, output.file_name
            ));
            for (id, quantity) in &output.columns {
                result.push(format!(
                    "    <OutputColumn id=\"{}\" quantity=\"{}\"/>",
                    id, quantity
                ));
            }
            result.push(String::from("  </OutputFile>"));
        }
        result.push(String::new());
        result.push(String::from("</Simulation>"));
        result.push(String::new());
        result.push(String::from("</Lems>"));
        let mut xml = result.join("\n");
        xml.push('\n');
        xml
    }

    /// Write `LEMS_<sim id>.xml` under `dir` and hand back the full path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("LEMS_{}.xml", self.sim_id));
        write(&path, self.to_xml())?;
        info!("Written LEMS simulation {} to {:?}", self.sim_id, path);
        Ok(path)
    }
}

/// Voltage step protocol around one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampSettings {
    /// Voltage grid, inclusive, in mV.
    pub min_v: i64,
    pub max_v: i64,
    pub step_v: i64,
    /// Time before the step lands, ms.
    pub clamp_delay: f64,
    /// How long the step holds, ms.
    pub clamp_duration: f64,
    /// Holding voltage outside the step, mV.
    pub clamp_base: f64,
    /// Total simulated time, ms.
    pub duration: f64,
    pub dt: f64,
    /// Reversal potential of the channel, mV.
    pub erev: f64,
    /// Bath temperature, degC.
    pub temperature: f64,
    /// Internal calcium concentration, mM.
    pub ca_conc: f64,
}

impl Default for ClampSettings {
    fn default() -> Self {
        ClampSettings {
            min_v: -100,
            max_v: 100,
            step_v: 20,
            clamp_delay: 10.0,
            clamp_duration: 80.0,
            clamp_base: -70.0,
            duration: 100.0,
            dt: 0.01,
            erev: 0.0,
            temperature: 6.3,
            ca_conc: 5e-5,
        }
    }
}

/// One holding voltage of the grid, with its file system safe label and its
/// position on the colour ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetVoltage {
    pub v: i64,
    pub label: String,
    pub color: String,
}

/// Label safe for ids and file names, `-80` becomes `min80`.
pub fn v_label(v: i64) -> String {
    format!("{}", v).replace('-', "min")
}

/// Point on the yellow to red ramp, truncated to byte channels.
pub fn colour_hex(fract: f64) -> String {
    let (r0, g0, b0) = MIN_COLOUR;
    let (r1, g1, b1) = MAX_COLOUR;
    let r = (r0 + (r1 - r0) * fract) as u8;
    let g = (g0 + (g1 - g0) * fract) as u8;
    let b = (b0 + (b1 - b0) * fract) as u8;
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// The inclusive voltage grid with labels and colours. A single voltage
/// sits at the red end of the ramp.
pub fn plan_voltages(cfg: &ClampSettings) -> Result<Vec<TargetVoltage>> {
    if cfg.step_v <= 0 {
        return Err(lems_error(format!(
            "Voltage step must be positive, got {}",
            cfg.step_v
        )));
    }
    if cfg.max_v < cfg.min_v {
        return Err(lems_error(format!(
            "Voltage range is empty: {} mV to {} mV",
            cfg.min_v, cfg.max_v
        )));
    }
    let mut volts = Vec::new();
    let mut v = cfg.min_v;
    while v <= cfg.max_v {
        volts.push(v);
        v += cfg.step_v;
    }
    let n = volts.len();
    let plan = volts
        .iter()
        .enumerate()
        .map(|(ix, v)| {
            let fract = if n > 1 {
                ix as f64 / (n - 1) as f64
            } else {
                1.0
            };
            TargetVoltage {
                v: *v,
                label: v_label(*v),
                color: colour_hex(fract),
            }
        })
        .collect();
    Ok(plan)
}

pub fn lems_file_name(channel: &str) -> String {
    format!("LEMS_Test_{}.xml", channel)
}

pub fn states_file_name(channel: &str, label: &str) -> String {
    format!("{}.states.{}.dat", channel, label)
}

/// LEMS path of a gate's activation variable in the generated network.
pub fn quantity_path(label: &str, channel: &str, gate: &str) -> String {
    format!("pop_{}[0]/test/{}/{}/q", label, channel, gate)
}

fn clamped_cell_type() -> String {
    String::from(
        r#"<ComponentType name="clampedTestCell" extends="baseCellMembPot">
    <Parameter name="delay" dimension="time"/>
    <Parameter name="duration" dimension="time"/>
    <Parameter name="baseVoltage" dimension="voltage"/>
    <Parameter name="targetVoltage" dimension="voltage"/>
    <Parameter name="ca" dimension="concentration"/>
    <Children name="populations" type="channelPopulation"/>
    <Exposure name="caConc" dimension="concentration"/>
    <Dynamics>
        <StateVariable name="v" exposure="v" dimension="voltage"/>
        <DerivedVariable name="caConc" exposure="caConc" dimension="concentration" value="ca"/>
        <OnStart>
            <StateAssignment variable="v" value="baseVoltage"/>
        </OnStart>
        <OnCondition test="t .geq. delay .and. t .lt. delay + duration">
            <StateAssignment variable="v" value="targetVoltage"/>
        </OnCondition>
        <OnCondition test="t .geq. delay + duration">
            <StateAssignment variable="v" value="baseVoltage"/>
        </OnCondition>
    </Dynamics>
</ComponentType>"#,
    )
}

fn clamped_cell(target: &TargetVoltage, channel: &Channel, cfg: &ClampSettings) -> String {
    let mut result = Vec::new();
    result.push(format!(
        "<clampedTestCell id=\"test_{}\" delay=\"{}ms\" duration=\"{}ms\" baseVoltage=\"{}mV\" targetVoltage=\"{}mV\" ca=\"{}mM\">",
        target.label, cfg.clamp_delay, cfg.clamp_duration, cfg.clamp_base, target.v, cfg.ca_conc
    ));
    result.push(format!(
        "    <channelPopulation id=\"test\" ionChannel=\"{}\" number=\"1\" erev=\"{}mV\"/>",
        channel.id, cfg.erev
    ));
    result.push(String::from("</clampedTestCell>"));
    result.join("\n")
}

fn clamped_network(plan: &[TargetVoltage], cfg: &ClampSettings) -> String {
    let mut result = Vec::new();
    result.push(format!(
        "<network id=\"net1\" type=\"networkWithTemperature\" temperature=\"{}degC\">",
        cfg.temperature
    ));
    for target in plan {
        result.push(format!(
            "    <population id=\"pop_{}\" component=\"test_{}\" size=\"1\"/>",
            target.label, target.label
        ));
    }
    result.push(String::from("</network>"));
    result.join("\n")
}

/// Build the whole voltage clamp simulation for one channel: a clamped cell
/// per grid voltage, a display per gate with one ramp coloured line per
/// voltage, and an output file per voltage carrying every gate's activation.
pub fn clamp_simulation(
    channel: &Channel,
    cfg: &ClampSettings,
) -> Result<(LemsSimulation, Vec<TargetVoltage>)> {
    if channel.gates.is_empty() {
        return Err(lems_error(format!(
            "Channel '{}' has no gates to test",
            channel.id
        )));
    }
    let plan = plan_voltages(cfg)?;
    let mut sim = LemsSimulation::new(
        &format!("Test_{}", channel.id),
        cfg.duration,
        cfg.dt,
        "net1",
    );
    sim.include_file(&channel.file);
    sim.add_component(&clamped_cell_type());
    for target in &plan {
        sim.add_component(&clamped_cell(target, channel, cfg));
    }
    sim.add_component(&clamped_network(&plan, cfg));
    for gate in &channel.gates {
        let display = format!("d_{}", gate.id);
        sim.create_display(
            &display,
            &format!("{} {} activation", channel.id, gate.id),
            "0",
            "1",
        );
        for target in &plan {
            sim.add_line(
                &display,
                &target.label,
                &quantity_path(&target.label, &channel.id, &gate.id),
                "1",
                &target.color,
            )?;
        }
    }
    for target in &plan {
        let output = format!("of_{}", target.label);
        sim.create_output_file(&output, &states_file_name(&channel.id, &target.label));
        for gate in &channel.gates {
            sim.add_column(
                &output,
                &gate.id,
                &quantity_path(&target.label, &channel.id, &gate.id),
            )?;
        }
    }
    Ok((sim, plan))
}
