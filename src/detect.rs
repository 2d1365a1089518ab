use serde::Serialize;

use crate::error::{Error, Result};

fn detect_error<T: Into<String>>(what: T) -> Error {
    Error::Detect { what: what.into() }
}

/// Slope ratio at which the transient is considered over, ie 1/e.
pub const DECAY_FRACTION: f64 = 0.367879441;
/// Spacing of steady state polls, in ms.
pub const CHECK_INTERVAL: f64 = 10.0;
/// Relative tolerance between consecutive polls for convergence.
pub const TOLERANCE: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    /// Time the voltage step lands, ms. Steady state polls start here.
    pub onset: f64,
    /// Time the initial slope is latched, ms. Must not precede `onset`.
    pub baseline_at: f64,
    pub check_interval: f64,
    pub tolerance: f64,
    pub decay_fraction: f64,
}

impl Settings {
    /// Defaults for a step clamp landing at `onset`, sampled every `dt` ms.
    /// The slope baseline sits ten samples past the step so the clamp
    /// artefact has passed.
    pub fn clamped_at(onset: f64, dt: f64) -> Self {
        Settings {
            onset,
            baseline_at: onset + 10.0 * dt,
            check_interval: CHECK_INTERVAL,
            tolerance: TOLERANCE,
            decay_fraction: DECAY_FRACTION,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Fate of the time constant search over one stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TauOutcome {
    /// Slope ratio crossed the decay fraction; elapsed ms since the baseline.
    Found(f64),
    /// Stream ended before the ratio crossed.
    NotSeen,
    /// Initial slope was exactly zero, the sample step is too coarse to
    /// resolve the transient. Tracking stops rather than divide by zero.
    DegenerateStep,
}

impl TauOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            TauOutcome::Found(tau) => Some(*tau),
            _ => None,
        }
    }
}

/// Latched results for one gating variable at one holding voltage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateKinetics {
    pub inf: Option<f64>,
    pub tau: TauOutcome,
}

/// Online detector for the steady state and time constant of a gating
/// variable under a voltage step. Feed samples in time order; both results
/// latch on first detection and never revise.
#[derive(Debug, Clone)]
pub struct KineticsDetector {
    settings: Settings,
    prev: Option<(f64, f64)>,
    init_slope: Option<f64>,
    checkpoint: Option<f64>,
    next_check: f64,
    inf: Option<f64>,
    tau: TauOutcome,
}

impl KineticsDetector {
    pub fn new(settings: Settings) -> Result<Self> {
        if !(settings.check_interval > 0.0) {
            return Err(detect_error(format!(
                "Check interval must be positive, got {}",
                settings.check_interval
            )));
        }
        if !(settings.tolerance > 0.0) {
            return Err(detect_error(format!(
                "Tolerance must be positive, got {}",
                settings.tolerance
            )));
        }
        if !(0.0 < settings.decay_fraction && settings.decay_fraction < 1.0) {
            return Err(detect_error(format!(
                "Decay fraction must lie in (0, 1), got {}",
                settings.decay_fraction
            )));
        }
        if settings.baseline_at < settings.onset {
            return Err(detect_error(format!(
                "Baseline time {} precedes onset {}",
                settings.baseline_at, settings.onset
            )));
        }
        Ok(KineticsDetector {
            next_check: settings.onset,
            settings,
            prev: None,
            init_slope: None,
            checkpoint: None,
            inf: None,
            tau: TauOutcome::NotSeen,
        })
    }

    pub fn feed(&mut self, t: f64, x: f64) {
        self.feed_tau(t, x);
        self.feed_inf(t, x);
        self.prev = Some((t, x));
    }

    fn feed_tau(&mut self, t: f64, x: f64) {
        if TauOutcome::NotSeen != self.tau || t < self.settings.baseline_at {
            return;
        }
        let (t0, x0) = match self.prev {
            Some(prev) => prev,
            None => return,
        };
        let dt = t - t0;
        if dt <= 0.0 {
            return;
        }
        let slope = (x - x0) / dt;
        match self.init_slope {
            None => {
                if slope == 0.0 {
                    self.tau = TauOutcome::DegenerateStep;
                } else {
                    self.init_slope = Some(slope);
                }
            }
            Some(init) => {
                if slope / init < self.settings.decay_fraction {
                    self.tau = TauOutcome::Found(t - self.settings.baseline_at);
                }
            }
        }
    }

    fn feed_inf(&mut self, t: f64, x: f64) {
        if self.inf.is_some() || t < self.next_check {
            return;
        }
        self.next_check = t + self.settings.check_interval;
        match self.checkpoint {
            None => self.checkpoint = Some(x),
            Some(last) => {
                if x == last || (x - last).abs() <= self.settings.tolerance * x.abs() {
                    self.inf = Some(x);
                } else {
                    self.checkpoint = Some(x);
                }
            }
        }
    }

    /// Both quantities latched; the stream carries no further information.
    pub fn done(&self) -> bool {
        self.inf.is_some() && TauOutcome::NotSeen != self.tau
    }

    /// The steady state passed a tolerance check, rather than being read off
    /// the end of the stream.
    pub fn settled(&self) -> bool {
        self.inf.is_some()
    }

    /// A steady state that never settled reports the last observed sample.
    pub fn finish(self) -> GateKinetics {
        GateKinetics {
            inf: self.inf.or_else(|| self.prev.map(|(_, x)| x)),
            tau: self.tau,
        }
    }
}

/// Run a detector over a whole stream, stopping early once both quantities
/// have latched.
pub fn scan<I>(stream: I, settings: Settings) -> Result<GateKinetics>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut detector = KineticsDetector::new(settings)?;
    for (t, x) in stream {
        detector.feed(t, x);
        if detector.done() {
            break;
        }
    }
    Ok(detector.finish())
}

#[cfg(test)]
mod test {
    use super::*;

    fn exponential(a: f64, tau: f64, b: f64, dt: f64, tstop: f64) -> Vec<(f64, f64)> {
        let n = (tstop / dt) as usize;
        (0..=n)
            .map(|i| {
                let t = i as f64 * dt;
                (t, a * (-t / tau).exp() + b)
            })
            .collect()
    }

    fn constant(x: f64, dt: f64, tstop: f64) -> Vec<(f64, f64)> {
        let n = (tstop / dt) as usize;
        (0..=n).map(|i| (i as f64 * dt, x)).collect()
    }

    fn settings(onset: f64, dt: f64) -> Settings {
        Settings::clamped_at(onset, dt)
    }

    #[test]
    fn test_exponential_decay() {
        // A=1, tau=5, B=0.2 at dt=0.01, baseline latched just past the start.
        let stream = exponential(1.0, 5.0, 0.2, 0.01, 100.0);
        let got = scan(stream, settings(0.0, 0.01)).unwrap();
        let tau = got.tau.value().unwrap();
        assert!(4.75 <= tau && tau <= 5.25, "tau = {}", tau);
        let inf = got.inf.unwrap();
        assert!((inf - 0.2).abs() <= 1e-5 * 0.2, "inf = {}", inf);
    }

    #[test]
    fn test_delayed_baseline() {
        // Same decay, but the slope baseline is only latched at t=10.0, well
        // into the transient. Detection still recovers tau and B.
        let stream = exponential(1.0, 5.0, 0.2, 0.01, 100.0);
        let settings = Settings {
            onset: 0.0,
            baseline_at: 10.0,
            check_interval: CHECK_INTERVAL,
            tolerance: TOLERANCE,
            decay_fraction: DECAY_FRACTION,
        };
        let got = scan(stream, settings).unwrap();
        let tau = got.tau.value().unwrap();
        assert!(4.75 <= tau && tau <= 5.25, "tau = {}", tau);
        let inf = got.inf.unwrap();
        assert!((inf - 0.2).abs() <= 1e-5 * 0.2, "inf = {}", inf);
    }

    #[test]
    fn test_decay_after_onset() {
        // Flat hold, then an exponential approach from the step at t=50.
        let dt = 0.01;
        let n = (200.0 / dt) as usize;
        let stream = (0..=n).map(|i| {
            let t = i as f64 * dt;
            let x = if t < 50.0 {
                1.2
            } else {
                (-(t - 50.0) / 5.0).exp() + 0.2
            };
            (t, x)
        });
        let got = scan(stream, settings(50.0, dt)).unwrap();
        let tau = got.tau.value().unwrap();
        assert!(4.75 <= tau && tau <= 5.25, "tau = {}", tau);
        let inf = got.inf.unwrap();
        assert!((inf - 0.2).abs() <= 1e-5 * 0.2, "inf = {}", inf);
    }

    #[test]
    fn test_constant_stream() {
        let got = scan(constant(0.42, 0.01, 100.0), settings(0.0, 0.01)).unwrap();
        // Second poll sees the checkpoint unchanged and latches exactly.
        assert_eq!(got.inf, Some(0.42));
        // Zero slope at the baseline flags the step size, never a crossing.
        assert_eq!(got.tau, TauOutcome::DegenerateStep);
    }

    #[test]
    fn test_flat_baseline_is_degenerate() {
        // Value only starts moving after the baseline latch, too late.
        let dt = 0.01;
        let n = (100.0 / dt) as usize;
        let stream = (0..=n).map(|i| {
            let t = i as f64 * dt;
            let x = if t < 20.0 { 1.0 } else { (-(t - 20.0) / 5.0).exp() };
            (t, x)
        });
        let got = scan(stream, settings(0.0, dt)).unwrap();
        assert_eq!(got.tau, TauOutcome::DegenerateStep);
    }

    #[test]
    fn test_short_stream() {
        // Ratio cannot fall below 1/e within 4 ms for tau=5; the steady
        // state never settles and reports the trailing sample instead.
        let stream = exponential(1.0, 5.0, 0.2, 0.01, 4.0);
        let last = stream.last().copied().unwrap();
        let got = scan(stream, settings(0.0, 0.01)).unwrap();
        assert_eq!(got.tau, TauOutcome::NotSeen);
        assert_eq!(got.inf, Some(last.1));
    }

    #[test]
    fn test_unsettled_stream_reports_last_sample() {
        // tau=200 barely moves over an 80 ms window; no poll passes the
        // tolerance, so the fallback carries the final value.
        let stream = exponential(1.0, 200.0, 0.2, 0.01, 80.0);
        let last = stream.last().copied().unwrap();
        let mut detector = KineticsDetector::new(settings(0.0, 0.01)).unwrap();
        for (t, x) in stream {
            detector.feed(t, x);
        }
        assert!(!detector.settled());
        let got = detector.finish();
        assert_eq!(got.tau, TauOutcome::NotSeen);
        assert_eq!(got.inf, Some(last.1));
    }

    #[test]
    fn test_idempotent() {
        let stream = exponential(1.0, 5.0, 0.2, 0.01, 100.0);
        let one = scan(stream.clone(), settings(0.0, 0.01)).unwrap();
        let two = scan(stream, settings(0.0, 0.01)).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn test_converges_to_zero() {
        // Ramp hitting exactly zero. The equality escape latches where the
        // relative test alone would divide nothing by nothing.
        let dt = 0.01;
        let n = (100.0 / dt) as usize;
        let stream = (0..=n).map(|i| {
            let t = i as f64 * dt;
            (t, (1.0 - t / 20.0).max(0.0))
        });
        let got = scan(stream, settings(0.0, dt)).unwrap();
        assert_eq!(got.inf, Some(0.0));
        assert!(got.tau.value().is_some());
    }

    #[test]
    fn test_settings_validation() {
        let base = settings(0.0, 0.01);
        assert!(KineticsDetector::new(Settings {
            check_interval: 0.0,
            ..base
        })
        .is_err());
        assert!(KineticsDetector::new(Settings {
            tolerance: -1e-5,
            ..base
        })
        .is_err());
        assert!(KineticsDetector::new(Settings {
            decay_fraction: 1.5,
            ..base
        })
        .is_err());
        assert!(KineticsDetector::new(Settings {
            baseline_at: -1.0,
            ..base
        })
        .is_err());
    }

    #[test]
    fn test_clamped_settings() {
        let s = Settings::clamped_at(10.0, 0.01).with_tolerance(1e-3);
        assert_eq!(s.onset, 10.0);
        assert_eq!(s.baseline_at, 10.1);
        assert_eq!(s.tolerance, 1e-3);
        assert_eq!(s.decay_fraction, DECAY_FRACTION);
    }
}
