use std::collections::BTreeMap as Map;
use std::collections::BTreeSet as Set;

use serde::Serialize;

use crate::data::Trace;
use crate::detect::{GateKinetics, KineticsDetector, Settings, TauOutcome};
use crate::error::{Error, Result};

fn sweep_error<T: Into<String>>(what: T) -> Error {
    Error::Detect { what: what.into() }
}

/// One detector per gate, fed in lockstep from the gate traces of a single
/// voltage step recording.
pub struct SweepScan {
    gates: Vec<String>,
    detectors: Vec<KineticsDetector>,
}

/// Results of one voltage step. `stopped_at` is set when every gate latched
/// before the recording ran out; `unsettled` lists gates whose steady state
/// never passed a tolerance check and reports the trailing sample instead.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    pub results: Map<String, GateKinetics>,
    pub stopped_at: Option<f64>,
    pub unsettled: Vec<String>,
}

impl SweepScan {
    pub fn new(gates: &[String], settings: Settings) -> Result<Self> {
        if gates.is_empty() {
            return Err(sweep_error("No gates to track"));
        }
        let detectors = gates
            .iter()
            .map(|_| KineticsDetector::new(settings))
            .collect::<Result<Vec<_>>>()?;
        Ok(SweepScan {
            gates: gates.to_vec(),
            detectors,
        })
    }

    pub fn run(mut self, traces: &[Trace]) -> Result<SweepOutcome> {
        if traces.len() != self.gates.len() {
            return Err(sweep_error(format!(
                "Expected {} gate traces, found {}",
                self.gates.len(),
                traces.len()
            )));
        }
        let n = traces[0].len();
        for (gate, trace) in self.gates.iter().zip(traces.iter()) {
            if trace.len() != n {
                return Err(sweep_error(format!(
                    "Gate '{}' has {} samples, expected {}",
                    gate,
                    trace.len(),
                    n
                )));
            }
        }
        let mut stopped_at = None;
        for ix in 0..n {
            for (detector, trace) in self.detectors.iter_mut().zip(traces.iter()) {
                detector.feed(trace.t[ix], trace.x[ix]);
            }
            if self.detectors.iter().all(|d| d.done()) {
                stopped_at = Some(traces[0].t[ix]);
                break;
            }
        }
        let unsettled = self
            .gates
            .iter()
            .zip(self.detectors.iter())
            .filter(|(_, d)| !d.settled())
            .map(|(gate, _)| gate.clone())
            .collect();
        let results = self
            .gates
            .into_iter()
            .zip(self.detectors.into_iter().map(|d| d.finish()))
            .collect();
        Ok(SweepOutcome {
            results,
            stopped_at,
            unsettled,
        })
    }
}

/// Kinetics of every gate of one channel across the whole voltage range,
/// keyed by holding voltage in mV.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub channel: String,
    pub temperature: f64,
    pub gates: Vec<String>,
    pub volts: Vec<i64>,
    pub records: Map<String, Map<i64, GateKinetics>>,
}

impl SweepSummary {
    pub fn new(channel: &str, temperature: f64, gates: &[String]) -> Self {
        SweepSummary {
            channel: channel.to_string(),
            temperature,
            gates: gates.to_vec(),
            volts: Vec::new(),
            records: Map::new(),
        }
    }

    pub fn record(&mut self, v: i64, gate: &str, kinetics: GateKinetics) -> Result<()> {
        if !self.gates.iter().any(|g| g == gate) {
            return Err(sweep_error(format!(
                "Gate '{}' is not tracked for channel '{}'",
                gate, self.channel
            )));
        }
        if !self.volts.contains(&v) {
            self.volts.push(v);
        }
        let row = self.records.entry(gate.to_string()).or_insert_with(Map::new);
        if row.insert(v, kinetics).is_some() {
            return Err(sweep_error(format!(
                "Gate '{}' already recorded at {} mV",
                gate, v
            )));
        }
        Ok(())
    }

    /// Steady state over voltage, one point per recorded step.
    pub fn inf_curve(&self, gate: &str) -> Vec<(f64, f64)> {
        let mut curve = Vec::new();
        if let Some(row) = self.records.get(gate) {
            for (v, kinetics) in row {
                if let Some(inf) = kinetics.inf {
                    curve.push((*v as f64, inf));
                }
            }
        }
        curve
    }

    /// Time course over voltage. Steps where no crossing was seen are left
    /// out rather than padded.
    pub fn tau_curve(&self, gate: &str) -> Vec<(f64, f64)> {
        let mut curve = Vec::new();
        if let Some(row) = self.records.get(gate) {
            for (v, kinetics) in row {
                if let Some(tau) = kinetics.tau.value() {
                    curve.push((*v as f64, tau));
                }
            }
        }
        curve
    }

    /// Gates that hit a zero initial slope at any voltage.
    pub fn degenerate_gates(&self) -> Set<String> {
        let mut gates = Set::new();
        for (gate, row) in &self.records {
            if row.values().any(|k| TauOutcome::DegenerateStep == k.tau) {
                gates.insert(gate.clone());
            }
        }
        gates
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn trace(tstop: f64, dt: f64, f: impl Fn(f64) -> f64) -> Trace {
        let n = (tstop / dt) as usize;
        let t = (0..=n).map(|i| i as f64 * dt).collect::<Vec<_>>();
        let x = t.iter().map(|t| f(*t)).collect();
        Trace::new(t, x).unwrap()
    }

    #[test]
    fn test_lockstep_early_stop() {
        let dt = 0.01;
        let fast = trace(100.0, dt, |t| (-t / 2.0).exp() + 0.1);
        let slow = trace(100.0, dt, |t| (-t / 5.0).exp() + 0.7);
        let gates = vec!["m".to_string(), "h".to_string()];
        let scan = SweepScan::new(&gates, Settings::clamped_at(0.0, dt)).unwrap();
        let out = scan.run(&[fast, slow]).unwrap();
        assert!(out.stopped_at.is_some());
        assert!(out.stopped_at.unwrap() < 100.0);
        assert!(out.unsettled.is_empty());
        let m = &out.results["m"];
        let h = &out.results["h"];
        let tau_m = m.tau.value().unwrap();
        let tau_h = h.tau.value().unwrap();
        assert!((tau_m - 2.0).abs() <= 0.1, "tau_m = {}", tau_m);
        assert!((tau_h - 5.0).abs() <= 0.25, "tau_h = {}", tau_h);
        assert!((m.inf.unwrap() - 0.1).abs() <= 1e-5);
        assert!((h.inf.unwrap() - 0.7).abs() <= 1e-5);
    }

    #[test]
    fn test_unsettled_gate_keeps_its_curve() {
        // tau=200 cannot settle inside an 80 ms window; the record still
        // carries a steady state, read off the end of the trace.
        let dt = 0.01;
        let slow = trace(80.0, dt, |t| (-t / 200.0).exp());
        let last = *slow.x.last().unwrap();
        let gates = vec!["m".to_string()];
        let scan = SweepScan::new(&gates, Settings::clamped_at(0.0, dt)).unwrap();
        let out = scan.run(&[slow]).unwrap();
        assert_eq!(out.unsettled, vec!["m".to_string()]);
        assert_eq!(out.results["m"].tau, TauOutcome::NotSeen);
        assert_eq!(out.results["m"].inf, Some(last));
        let mut summary = SweepSummary::new("k", 6.3, &gates);
        summary.record(-40, "m", out.results["m"]).unwrap();
        assert_eq!(summary.inf_curve("m"), vec![(-40.0, last)]);
    }

    #[test]
    fn test_shape_mismatch() {
        let gates = vec!["m".to_string(), "h".to_string()];
        let settings = Settings::clamped_at(0.0, 0.01);
        let scan = SweepScan::new(&gates, settings).unwrap();
        assert!(scan.run(&[]).is_err());
        let scan = SweepScan::new(&gates, settings).unwrap();
        let two = Trace::new(vec![0.0, 0.01], vec![1.0, 1.0]).unwrap();
        let one = Trace::new(vec![0.0], vec![1.0]).unwrap();
        assert!(scan.run(&[two, one]).is_err());
        assert!(SweepScan::new(&[], settings).is_err());
    }

    #[test]
    fn test_summary_record() {
        let gates = vec!["m".to_string()];
        let mut summary = SweepSummary::new("na", 6.3, &gates);
        let k = GateKinetics {
            inf: Some(0.5),
            tau: TauOutcome::Found(2.5),
        };
        summary.record(-80, "m", k).unwrap();
        assert!(summary.record(-80, "m", k).is_err());
        assert!(summary.record(-60, "q", k).is_err());
        summary.record(-60, "m", k).unwrap();
        assert_eq!(summary.volts, vec![-80, -60]);
    }

    #[test]
    fn test_summary_curves() {
        let gates = vec!["m".to_string()];
        let mut summary = SweepSummary::new("na", 6.3, &gates);
        summary
            .record(
                -80,
                "m",
                GateKinetics {
                    inf: Some(0.1),
                    tau: TauOutcome::Found(3.0),
                },
            )
            .unwrap();
        summary
            .record(
                -60,
                "m",
                GateKinetics {
                    inf: Some(0.4),
                    tau: TauOutcome::NotSeen,
                },
            )
            .unwrap();
        summary
            .record(
                -40,
                "m",
                GateKinetics {
                    inf: Some(0.9),
                    tau: TauOutcome::DegenerateStep,
                },
            )
            .unwrap();
        assert_eq!(
            summary.inf_curve("m"),
            vec![(-80.0, 0.1), (-60.0, 0.4), (-40.0, 0.9)]
        );
        assert_eq!(summary.tau_curve("m"), vec![(-80.0, 3.0)]);
        assert_eq!(
            summary.degenerate_gates().into_iter().collect::<Vec<_>>(),
            vec!["m".to_string()]
        );
        assert!(summary.inf_curve("h").is_empty());
    }
}
