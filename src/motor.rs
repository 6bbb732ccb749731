//! Motor table and linear-interpolation kinematics (spec §3, §4.2).

use crate::error::DispatchError;
use crate::registry::{PvHandle, Registry};

/// Snap-to-target tolerance; also the "moving ⇒ readback ≠ target"
/// threshold (spec §3, §4.2).
pub const EPSILON: f64 = 1e-3;

/// Stable handle into the motor table, analogous to [`PvHandle`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MotorHandle(usize);

#[derive(Debug, Clone)]
pub struct Motor {
    pub setpoint: PvHandle,
    pub readback: PvHandle,
    /// Done-moving flag. Carries the source's literal (inverted) mapping:
    /// `1.0` while actively moving, `0.0` while idle (spec §3, Open
    /// Questions — preserved intentionally, not "fixed").
    pub dmov: PvHandle,
    pub velocity: f64,
    pub target: f64,
    pub moving: bool,
}

#[derive(Debug, Default)]
pub struct MotorTable {
    motors: Vec<Motor>,
}

impl MotorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        setpoint: PvHandle,
        readback: PvHandle,
        dmov: PvHandle,
        velocity: f64,
    ) -> MotorHandle {
        let handle = MotorHandle(self.motors.len());
        self.motors.push(Motor {
            setpoint,
            readback,
            dmov,
            velocity,
            target: 0.0,
            moving: false,
        });
        handle
    }

    pub fn motor(&self, handle: MotorHandle) -> &Motor {
        &self.motors[handle.0]
    }

    /// Looked up by setpoint PV name only — not by readback or `.DMOV`
    /// (spec §4.2).
    pub fn find_by_setpoint_name(&self, registry: &Registry, name: &str) -> Option<MotorHandle> {
        self.motors
            .iter()
            .position(|m| registry.pv(m.setpoint).name == name)
            .map(MotorHandle)
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_moving(&self, handle: MotorHandle) -> bool {
        self.motors[handle.0].moving
    }

    /// Starts a move: validates `target` against the setpoint's own bounds,
    /// stores it, writes it into the setpoint PV, and marks the motor
    /// moving with `DMOV = 1.0` (spec §4.2).
    pub fn move_to(
        &mut self,
        registry: &mut Registry,
        handle: MotorHandle,
        target: f64,
    ) -> Result<(), DispatchError> {
        let motor = &self.motors[handle.0];
        let setpoint_pv = registry.pv(motor.setpoint);
        if target < setpoint_pv.min || target > setpoint_pv.max {
            return Err(DispatchError::InvalidValue);
        }
        let (setpoint, dmov) = (motor.setpoint, motor.dmov);
        self.motors[handle.0].target = target;
        self.motors[handle.0].moving = true;
        registry.write_internal(setpoint, target);
        registry.write_internal(dmov, 1.0);
        Ok(())
    }

    /// Sets a motor's resting state directly, bypassing the moving/`DMOV`
    /// transition `move_to` triggers. Used only at startup to seed the
    /// monochromator's initial 8000 eV setpoint (spec §6), mirroring
    /// `devices_init` writing `target` and the readback directly rather
    /// than calling `motor_move`.
    pub fn init_at(&mut self, registry: &mut Registry, handle: MotorHandle, value: f64) {
        let motor = &mut self.motors[handle.0];
        motor.target = value;
        motor.moving = false;
        registry.write_internal(motor.readback, value);
        registry.write_internal(motor.dmov, 0.0);
    }

    /// Advances every moving motor by `dt` seconds (spec §4.2 Tick).
    pub fn tick(&mut self, registry: &mut Registry, dt: f64) {
        for motor in &mut self.motors {
            if !motor.moving {
                continue;
            }
            let current = registry.get(motor.readback);
            let diff = motor.target - current;
            if diff.abs() < EPSILON {
                motor.moving = false;
                registry.write_internal(motor.readback, motor.target);
                registry.write_internal(motor.dmov, 0.0);
                continue;
            }
            let step = motor.velocity * dt;
            if diff.abs() < step {
                motor.moving = false;
                registry.write_internal(motor.readback, motor.target);
                registry.write_internal(motor.dmov, 0.0);
            } else {
                let next = current + diff.signum() * step;
                registry.write_internal(motor.readback, next);
                registry.write_internal(motor.dmov, 1.0);
            }
        }
    }
}
