use std::collections::BTreeMap as Map;
use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use tracing::{debug, info};

use crate::data::Table;
use crate::error::{Error, Result};
use crate::lems::Output;

fn sim_error<T: Into<String>>(what: T) -> Error {
    Error::Sim { what: what.into() }
}

/// Override for the jNeuroML executable, default `jnml`.
pub const JNML_ENV: &str = "NMLCHAN_JNML";
const DEFAULT_JNML: &str = "jnml";

/// Backend jNeuroML hands the simulation to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    JNeuroml,
    JNeuromlNeuron,
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "jneuroml" => Ok(Engine::JNeuroml),
            "jneuroml-neuron" | "neuron" => Ok(Engine::JNeuromlNeuron),
            _ => Err(format!(
                "Unknown engine '{}', expected 'jneuroml' or 'jneuroml-neuron'",
                s
            )),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::JNeuroml => write!(f, "jneuroml"),
            Engine::JNeuromlNeuron => write!(f, "jneuroml-neuron"),
        }
    }
}

/// One recorded output file, time in seconds plus one value column per
/// declared quantity path.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub file: String,
    pub t: Vec<f64>,
    pub columns: Map<String, Vec<f64>>,
}

fn executable() -> String {
    std::env::var(JNML_ENV).unwrap_or_else(|_| DEFAULT_JNML.to_string())
}

/// Run a LEMS file through jNeuroML and gather the declared recordings.
/// The simulator is invoked in the directory holding the file, where it
/// also drops its outputs.
pub fn run(engine: Engine, lems: &Path, outputs: &[Output]) -> Result<Vec<Series>> {
    let exe = executable();
    let file = lems
        .file_name()
        .ok_or_else(|| sim_error(format!("Not a LEMS file path: {:?}", lems)))?;
    let dir = match lems.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    info!("Running {} as {} on {:?}", exe, engine, lems);
    let mut cmd = Command::new(&exe);
    cmd.current_dir(dir).arg(file).arg("-nogui");
    if Engine::JNeuromlNeuron == engine {
        cmd.args(["-neuron", "-run"]);
    }
    let out = cmd.output().map_err(|e| {
        sim_error(format!(
            "Could not execute '{}' (set {} to override): {}",
            exe, JNML_ENV, e
        ))
    })?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
        let detail = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            format!("exit status {}", out.status)
        };
        return Err(sim_error(format!(
            "Simulation of {:?} via '{}' failed: {}",
            lems, exe, detail
        )));
    }
    debug!("Simulator finished, reading {} output file(s)", outputs.len());
    collect(dir, outputs)
}

/// Read the recordings a finished simulation left under `dir`. The first
/// column of every file is time in seconds, the rest follow the declared
/// quantity order.
pub fn collect(dir: &Path, outputs: &[Output]) -> Result<Vec<Series>> {
    let mut series = Vec::new();
    for output in outputs {
        let path = dir.join(&output.file);
        let table = Table::read(&path, 1 + output.quantities.len())?;
        let mut cols = table.columns.into_iter();
        let t = match cols.next() {
            Some(t) => t,
            None => return Err(sim_error(format!("No time column in '{}'", output.file))),
        };
        let mut columns = Map::new();
        for (quantity, col) in output.quantities.iter().zip(cols) {
            if columns.insert(quantity.clone(), col).is_some() {
                return Err(sim_error(format!(
                    "Quantity '{}' recorded twice in '{}'",
                    quantity, output.file
                )));
            }
        }
        series.push(Series {
            file: output.file.clone(),
            t,
            columns,
        });
    }
    Ok(series)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_engine_from_str() {
        assert_eq!("jneuroml".parse::<Engine>(), Ok(Engine::JNeuroml));
        assert_eq!("neuron".parse::<Engine>(), Ok(Engine::JNeuromlNeuron));
        assert_eq!(
            "jneuroml-neuron".parse::<Engine>(),
            Ok(Engine::JNeuromlNeuron)
        );
        assert!("brian".parse::<Engine>().is_err());
        assert_eq!(Engine::JNeuroml.to_string(), "jneuroml");
        assert_eq!(Engine::JNeuromlNeuron.to_string(), "jneuroml-neuron");
    }

    #[test]
    fn test_collect() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("na.states.min80.dat"),
            "0.0 0.1 0.9\n0.0001 0.2 0.8\n0.0002 0.3 0.7\n",
        )
        .unwrap();
        let outputs = vec![Output {
            file: "na.states.min80.dat".to_string(),
            quantities: vec!["pop[0]/m/q".to_string(), "pop[0]/h/q".to_string()],
        }];
        let series = collect(dir.path(), &outputs).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].t, vec![0.0, 0.0001, 0.0002]);
        assert_eq!(series[0].columns["pop[0]/m/q"], vec![0.1, 0.2, 0.3]);
        assert_eq!(series[0].columns["pop[0]/h/q"], vec![0.9, 0.8, 0.7]);
    }

    #[test]
    fn test_collect_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = vec![Output {
            file: "gone.dat".to_string(),
            quantities: vec!["pop[0]/v".to_string()],
        }];
        assert!(collect(dir.path(), &outputs).is_err());
    }

    #[test]
    fn test_collect_column_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("short.dat"), "0.0 0.1\n").unwrap();
        let outputs = vec![Output {
            file: "short.dat".to_string(),
            quantities: vec!["a".to_string(), "b".to_string()],
        }];
        assert!(collect(dir.path(), &outputs).is_err());
    }

    #[test]
    fn test_collect_duplicate_quantity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dup.dat"), "0.0 0.1 0.2\n").unwrap();
        let outputs = vec![Output {
            file: "dup.dat".to_string(),
            quantities: vec!["a".to_string(), "a".to_string()],
        }];
        assert!(collect(dir.path(), &outputs).is_err());
    }
}
