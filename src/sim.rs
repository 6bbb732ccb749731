//! Stochastic sensor models and the per-tick simulation advance (spec §4.3).
//!
//! Sensors are a tagged variant rather than a boxed closure: detectors need
//! to read `BL02:RING:CURRENT` during their own update, and a closure
//! capturing `&Registry` while also being stored *in* the registry would
//! need aliasing the kernel can't express cleanly. A handle captured at
//! registration time plus a match in [`Simulation::tick`] does the same job
//! without it (see DESIGN.md).

use rand::rngs::StdRng;
use rand::Rng;

use crate::registry::{PvHandle, Registry};

#[derive(Debug, Clone)]
pub enum Sensor {
    RingCurrent,
    VacuumPressure,
    HutchTemp,
    Detector {
        base: f64,
        noise_amp: f64,
        ring_current: PvHandle,
    },
    ShutterStatus {
        cmd: PvHandle,
    },
}

/// Owns the PRNG and the one piece of cross-tick sensor state (temperature
/// drift, spec §4.3 "process-global"). Injected so tests can seed it and
/// assert exact trajectories (spec §9, "Random number source").
pub struct Simulation {
    rng: StdRng,
    temp_drift: f64,
    sensors: Vec<(PvHandle, Sensor)>,
}

impl Simulation {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng,
            temp_drift: 0.0,
            sensors: Vec::new(),
        }
    }

    pub fn attach(&mut self, handle: PvHandle, sensor: Sensor) {
        self.sensors.push((handle, sensor));
    }

    /// Advances every attached sensor by one tick. Motor kinematics are
    /// advanced separately by [`crate::motor::MotorTable::tick`]; the
    /// event loop calls both under the same `dt`.
    pub fn tick(&mut self, registry: &mut Registry, dt: f64) {
        let _ = dt; // sensors here are memoryless except temperature drift
        for i in 0..self.sensors.len() {
            let (handle, sensor) = self.sensors[i].clone();
            let value = match sensor {
                Sensor::RingCurrent => 350.0 + self.rng.gen_range(-2.0..=2.0),
                Sensor::VacuumPressure => {
                    let log_p = -8.3 + self.rng.gen_range(-0.1..=0.1);
                    10f64.powf(log_p)
                }
                Sensor::HutchTemp => {
                    self.temp_drift += self.rng.gen_range(-0.005..=0.005);
                    23.0 + self.temp_drift
                }
                Sensor::Detector {
                    base,
                    noise_amp,
                    ring_current,
                } => {
                    let ring = registry.get(ring_current);
                    let factor = ring / 350.0;
                    base * factor + self.rng.gen_range(-noise_amp..=noise_amp)
                }
                Sensor::ShutterStatus { cmd } => registry.get(cmd),
            };
            registry.write_internal(handle, value);
        }
    }
}
