//! Builds the concrete PV and motor namespace (spec §6, SPEC_FULL §3).
//! Separated from [`crate::registry`] / [`crate::motor`] the way the
//! teacher separates its generic PLC machinery from a concrete PLC's
//! generated `Context` — here there is exactly one beamline to build, so
//! it is a plain function instead of a codegen target.

use rand::rngs::StdRng;

use crate::motor::MotorTable;
use crate::registry::{PvKind, Registry};
use crate::sim::{Sensor, Simulation};

pub struct Devices {
    pub registry: Registry,
    pub motors: MotorTable,
    pub sim: Simulation,
}

/// Registers every PV and motor named in spec §6 plus the shutter pair
/// recovered from `original_source/device/src/devices.c` (SPEC_FULL §3),
/// and wires up their sensor models.
pub fn init(rng: StdRng) -> Devices {
    let mut registry = Registry::new();
    let mut motors = MotorTable::new();
    let mut sim = Simulation::new(rng);

    let ring = registry
        .register("BL02:RING:CURRENT", PvKind::AnalogInput, 0.0, 400.0)
        .expect("registry capacity");
    sim.attach(ring, Sensor::RingCurrent);

    let vacuum = registry
        .register("BL02:VACUUM:PRESSURE", PvKind::AnalogInput, 1e-10, 1e-8)
        .expect("registry capacity");
    sim.attach(vacuum, Sensor::VacuumPressure);

    let temp = registry
        .register("BL02:HUTCH:TEMP", PvKind::AnalogInput, 20.0, 26.0)
        .expect("registry capacity");
    sim.attach(temp, Sensor::HutchTemp);

    let i0 = registry
        .register("BL02:DET:I0", PvKind::AnalogInput, 0.0, 1e6)
        .expect("registry capacity");
    sim.attach(
        i0,
        Sensor::Detector {
            base: 500_000.0,
            noise_amp: 5000.0,
            ring_current: ring,
        },
    );

    let it = registry
        .register("BL02:DET:IT", PvKind::AnalogInput, 0.0, 1e6)
        .expect("registry capacity");
    sim.attach(
        it,
        Sensor::Detector {
            base: 450_000.0,
            noise_amp: 5000.0,
            ring_current: ring,
        },
    );

    let iff = registry
        .register("BL02:DET:IF", PvKind::AnalogInput, 0.0, 1e5)
        .expect("registry capacity");
    sim.attach(
        iff,
        Sensor::Detector {
            base: 50_000.0,
            noise_amp: 500.0,
            ring_current: ring,
        },
    );

    let shutter_cmd = registry
        .register_with_writable("BL02:SHUTTER:CMD", PvKind::BinaryOutput, 0.0, 1.0, true)
        .expect("registry capacity");
    let shutter_status = registry
        .register("BL02:SHUTTER:STATUS", PvKind::BinaryInput, 0.0, 1.0)
        .expect("registry capacity");
    sim.attach(
        shutter_status,
        Sensor::ShutterStatus { cmd: shutter_cmd },
    );

    register_motor(
        &mut registry,
        &mut motors,
        "BL02:SAMPLE:X",
        -10000.0,
        10000.0,
        1000.0,
    );
    register_motor(
        &mut registry,
        &mut motors,
        "BL02:SAMPLE:Y",
        -10000.0,
        10000.0,
        1000.0,
    );
    register_motor(
        &mut registry,
        &mut motors,
        "BL02:SAMPLE:Z",
        -5000.0,
        5000.0,
        1000.0,
    );
    register_motor(
        &mut registry,
        &mut motors,
        "BL02:SAMPLE:THETA",
        -180.0,
        180.0,
        10.0,
    );

    // Monochromator energy starts at 8000 eV on both setpoint and readback
    // (spec §6; original_source/devices.c initializes the readback
    // explicitly since it otherwise defaults to 0).
    let energy_sp = registry
        .register_with_writable("BL02:MONO:ENERGY", PvKind::AnalogOutput, 4000.0, 20000.0, true)
        .expect("registry capacity");
    let energy_rbv = registry
        .register_with_writable(
            "BL02:MONO:ENERGY.RBV",
            PvKind::AnalogInput,
            4000.0,
            20000.0,
            false,
        )
        .expect("registry capacity");
    let energy_dmov = registry
        .register_with_writable("BL02:MONO:ENERGY.DMOV", PvKind::BinaryInput, 0.0, 1.0, false)
        .expect("registry capacity");
    registry.write_internal(energy_sp, 8000.0);
    let energy_motor = motors.register(energy_sp, energy_rbv, energy_dmov, 100.0);
    motors.init_at(&mut registry, energy_motor, 8000.0);

    log::info!(
        "initialized {} process variables, {} motors",
        registry.len(),
        motors.len()
    );

    Devices {
        registry,
        motors,
        sim,
    }
}

fn register_motor(
    registry: &mut Registry,
    motors: &mut MotorTable,
    name: &str,
    min: f64,
    max: f64,
    velocity: f64,
) {
    let setpoint = registry
        .register_with_writable(name, PvKind::AnalogOutput, min, max, true)
        .expect("registry capacity");
    let readback = registry
        .register_with_writable(&format!("{name}.RBV"), PvKind::AnalogInput, min, max, false)
        .expect("registry capacity");
    let dmov = registry
        .register_with_writable(&format!("{name}.DMOV"), PvKind::BinaryInput, 0.0, 1.0, false)
        .expect("registry capacity");
    motors.register(setpoint, readback, dmov, velocity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn registers_expected_namespace() {
        let devices = init(StdRng::seed_from_u64(1));
        for name in [
            "BL02:RING:CURRENT",
            "BL02:VACUUM:PRESSURE",
            "BL02:HUTCH:TEMP",
            "BL02:DET:I0",
            "BL02:DET:IT",
            "BL02:DET:IF",
            "BL02:SHUTTER:STATUS",
            "BL02:SHUTTER:CMD",
            "BL02:SAMPLE:X",
            "BL02:SAMPLE:X.RBV",
            "BL02:SAMPLE:X.DMOV",
            "BL02:SAMPLE:Y",
            "BL02:SAMPLE:Z",
            "BL02:SAMPLE:THETA",
            "BL02:MONO:ENERGY",
            "BL02:MONO:ENERGY.RBV",
            "BL02:MONO:ENERGY.DMOV",
        ] {
            assert!(devices.registry.find(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn energy_starts_at_8000() {
        let devices = init(StdRng::seed_from_u64(1));
        let sp = devices.registry.find("BL02:MONO:ENERGY").unwrap();
        let rbv = devices.registry.find("BL02:MONO:ENERGY.RBV").unwrap();
        assert_eq!(devices.registry.get(sp), 8000.0);
        assert_eq!(devices.registry.get(rbv), 8000.0);
        let motor = devices
            .motors
            .find_by_setpoint_name(&devices.registry, "BL02:MONO:ENERGY")
            .unwrap();
        assert!(!devices.motors.is_moving(motor));
    }
}
